use eyre::eyre;
use libp2p::swarm::SwarmEvent;
use owo_colors::OwoColorize;
use tracing::{debug, info, trace};

use crate::{BehaviourEvent, EventLoop};

mod identify;
mod ping;

pub(crate) trait EventHandler<E> {
    async fn handle(&mut self, event: E);
}

#[allow(
    clippy::multiple_inherent_impl,
    reason = "Currently necessary due to code structure"
)]
impl EventLoop {
    pub(crate) async fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(event) => match event {
                BehaviourEvent::Identify(event) => {
                    EventHandler::handle(self, event).await;
                }
                BehaviourEvent::Ping(event) => {
                    EventHandler::handle(self, event).await;
                }
                BehaviourEvent::Stream(()) => {}
            },
            SwarmEvent::NewListenAddr { address, .. } => {
                let local_peer_id = *self.swarm.local_peer_id();
                info!("Listening on {}/p2p/{}", address, local_peer_id);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id, endpoint, ..
            } => {
                debug!("{}: {} via {:?}", "connected".green(), peer_id, endpoint);

                if endpoint.is_dialer() {
                    if let Some(sender) = self.pending_dial.remove(&peer_id) {
                        let _ignored = sender.send(Ok(Some(())));
                    }
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                debug!(
                    "{}: {} ({:?}, {} left)",
                    "disconnected".red(),
                    peer_id,
                    cause,
                    num_established
                );
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                debug!(%error, ?peer_id, "Outgoing connection error");

                if let Some(peer_id) = peer_id {
                    if let Some(sender) = self.pending_dial.remove(&peer_id) {
                        let _ignored = sender.send(Err(eyre!(error)));
                    }
                }
            }
            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                debug!(%error, %send_back_addr, "Incoming connection error");
            }
            SwarmEvent::ListenerError { error, .. } => {
                debug!(%error, "Listener error");
            }
            event => trace!("{}: {:?}", "swarm".blue(), event),
        }
    }
}
