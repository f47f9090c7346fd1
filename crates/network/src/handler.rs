use eyre::Result as EyreResult;
use libp2p::PeerId;
use multiaddr::Multiaddr;
use tokio::sync::oneshot;

use crate::EventLoop;

mod commands;

#[derive(Debug)]
pub(crate) enum Command {
    Dial {
        peer_addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<Option<()>>>,
    },
    ListenOn {
        addr: Multiaddr,
        sender: oneshot::Sender<EyreResult<()>>,
    },
    ListenAddrs {
        sender: oneshot::Sender<Vec<Multiaddr>>,
    },
    ConnectedPeers {
        sender: oneshot::Sender<Vec<PeerId>>,
    },
}

#[allow(
    clippy::multiple_inherent_impl,
    reason = "Currently necessary due to code structure"
)]
impl EventLoop {
    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer_addr, sender } => self.dial(peer_addr, sender),
            Command::ListenOn { addr, sender } => {
                let _ignored = sender.send(self.listen_on(addr));
            }
            Command::ListenAddrs { sender } => {
                let _ignored = sender.send(self.listen_addrs());
            }
            Command::ConnectedPeers { sender } => {
                let _ignored = sender.send(self.connected_peers());
            }
        }
    }
}
