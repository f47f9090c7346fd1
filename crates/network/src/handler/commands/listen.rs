use eyre::Result as EyreResult;
use multiaddr::Multiaddr;

use crate::EventLoop;

#[allow(
    clippy::multiple_inherent_impl,
    reason = "Currently necessary due to code structure"
)]
impl EventLoop {
    pub(crate) fn listen_on(&mut self, addr: Multiaddr) -> EyreResult<()> {
        let _ignored = self.swarm.listen_on(addr)?;

        Ok(())
    }

    pub(crate) fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.swarm.listeners().cloned().collect()
    }
}
