use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Router options handed through to the honest pubsub implementation the
/// node runs next to. Queue sizes of zero mean "use the router default".
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct PubsubOptions {
    pub validate_queue_size: usize,
    pub outbound_queue_size: usize,
    /// Where router trace events are written.
    pub event_tracer: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PubsubOption {
    EventTracer(Utf8PathBuf),
    ValidateQueueSize(usize),
    PeerOutboundQueueSize(usize),
}

impl PubsubOptions {
    #[must_use]
    pub fn options(&self) -> Vec<PubsubOption> {
        let mut options = Vec::new();

        if let Some(tracer) = &self.event_tracer {
            options.push(PubsubOption::EventTracer(tracer.clone()));
        }

        if self.validate_queue_size > 0 {
            options.push(PubsubOption::ValidateQueueSize(self.validate_queue_size));
        }

        if self.outbound_queue_size > 0 {
            options.push(PubsubOption::PeerOutboundQueueSize(
                self.outbound_queue_size,
            ));
        }

        options
    }
}
