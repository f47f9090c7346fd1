use eyre::{eyre, Result as EyreResult};
use libp2p::PeerId;
use multiaddr::Multiaddr;
use tokio::sync::{mpsc, oneshot};

use crate::handler::Command;
use crate::sessions::Sessions;

#[derive(Clone, Debug)]
pub struct NetworkClient {
    sender: mpsc::Sender<Command>,
    sessions: Sessions,
}

impl NetworkClient {
    pub(crate) const fn new(sender: mpsc::Sender<Command>, sessions: Sessions) -> Self {
        Self { sender, sessions }
    }

    /// Dials a target given as `/.../p2p/<peer>`.
    ///
    /// `Ok(None)` means a dial to that peer was already in progress.
    pub async fn connect(&self, peer_addr: Multiaddr) -> EyreResult<Option<()>> {
        self.request(|sender| Command::Dial { peer_addr, sender })
            .await?
    }

    pub async fn listen_on(&self, addr: Multiaddr) -> EyreResult<()> {
        self.request(|sender| Command::ListenOn { addr, sender })
            .await?
    }

    /// Addresses the swarm currently listens on. Empty until the listeners
    /// have been bound.
    pub async fn listen_addrs(&self) -> EyreResult<Vec<Multiaddr>> {
        self.request(|sender| Command::ListenAddrs { sender }).await
    }

    pub async fn connected_peers(&self) -> EyreResult<Vec<PeerId>> {
        self.request(|sender| Command::ConnectedPeers { sender })
            .await
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn active_peers(&self) -> Vec<PeerId> {
        self.sessions.peers()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> EyreResult<T> {
        let (sender, receiver) = oneshot::channel();

        self.sender
            .send(command(sender))
            .await
            .map_err(|_| eyre!("network event loop is not running"))?;

        receiver
            .await
            .map_err(|_| eyre!("network event loop dropped the request"))
    }
}
