use std::collections::hash_map::Entry;

use eyre::{eyre, Result as EyreResult};
use libp2p::swarm::dial_opts::DialOpts;
use multiaddr::{Multiaddr, Protocol};
use tokio::sync::oneshot;
use tracing::debug;

use crate::EventLoop;

#[allow(
    clippy::multiple_inherent_impl,
    reason = "Currently necessary due to code structure"
)]
impl EventLoop {
    /// Dials `peer_addr`, which must end in `/p2p/<peer>`.
    ///
    /// Resolves `Ok(None)` when a dial to the same peer is already in flight
    /// and `Ok(Some(()))` once a connection to the peer exists.
    pub(crate) fn dial(
        &mut self,
        mut peer_addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<Option<()>>>,
    ) {
        let Some(Protocol::P2p(peer_id)) = peer_addr.pop() else {
            let _ignored = sender.send(Err(eyre!("No peer ID in address: {}", peer_addr)));
            return;
        };

        if self.swarm.is_connected(&peer_id) {
            debug!(%peer_id, "already connected");
            let _ignored = sender.send(Ok(Some(())));
            return;
        }

        match self.pending_dial.entry(peer_id) {
            Entry::Occupied(_) => {
                let _ignored = sender.send(Ok(None));
            }
            Entry::Vacant(entry) => {
                let opts = DialOpts::peer_id(peer_id)
                    .addresses(vec![peer_addr])
                    .build();

                match self.swarm.dial(opts) {
                    Ok(()) => {
                        let _ignored = entry.insert(sender);
                    }
                    Err(err) => {
                        let _ignored = sender.send(Err(eyre!(err)));
                    }
                }
            }
        }
    }
}
