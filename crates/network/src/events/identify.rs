use libp2p::identify::Event;
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};

impl EventHandler<Event> for EventLoop {
    async fn handle(&mut self, event: Event) {
        debug!("{}: {:?}", "identify".yellow(), event);

        if let Event::Received { peer_id, info, .. } = event {
            let speaks_pubsub = info.protocols.contains(&self.protocol);

            debug!(
                %peer_id,
                agent = %info.agent_version,
                speaks_pubsub,
                "Identified peer"
            );
        }
    }
}
