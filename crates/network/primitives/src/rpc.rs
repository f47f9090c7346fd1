//! Typed view of a pubsub RPC frame.
//!
//! A frame on the wire is one struct whose three sections may each be
//! present or absent. [`Rpc`] instead holds the present sections as explicit
//! [`Payload`] variants, so consumers match on what a peer actually sent
//! rather than probing slices for emptiness. Each kind appears at most once
//! and always in wire order: subscriptions, publish, control.

pub mod proto;

/// A published content message. The sybil never looks inside these.
pub type PublishedMessage = proto::Message;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub subscribe: bool,
}

impl Subscription {
    #[must_use]
    pub fn new(topic: impl Into<String>, subscribe: bool) -> Self {
        Self {
            topic: topic.into(),
            subscribe,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graft {
    pub topic: String,
}

impl Graft {
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prune {
    pub topic: String,
    pub peers: Vec<proto::PeerInfo>,
    pub backoff: Option<u64>,
}

/// Mesh management directives. Only grafts and prunes are modelled; gossip
/// announcements are carried opaquely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlMessage {
    pub ihave: Vec<proto::ControlIHave>,
    pub iwant: Vec<proto::ControlIWant>,
    pub graft: Vec<Graft>,
    pub prune: Vec<Prune>,
}

impl ControlMessage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ihave.is_empty()
            && self.iwant.is_empty()
            && self.graft.is_empty()
            && self.prune.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Subscriptions(Vec<Subscription>),
    Publish(Vec<PublishedMessage>),
    Control(ControlMessage),
}

impl Payload {
    const fn rank(&self) -> u8 {
        match self {
            Self::Subscriptions(_) => 0,
            Self::Publish(_) => 1,
            Self::Control(_) => 2,
        }
    }

    fn merge(&mut self, other: Self) {
        match (self, other) {
            (Self::Subscriptions(present), Self::Subscriptions(more)) => present.extend(more),
            (Self::Publish(present), Self::Publish(more)) => present.extend(more),
            (Self::Control(present), Self::Control(more)) => {
                present.ihave.extend(more.ihave);
                present.iwant.extend(more.iwant);
                present.graft.extend(more.graft);
                present.prune.extend(more.prune);
            }
            _ => {}
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Subscriptions(subscriptions) => subscriptions.is_empty(),
            Self::Publish(messages) => messages.is_empty(),
            Self::Control(control) => control.is_empty(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rpc {
    payloads: Vec<Payload>,
}

impl Rpc {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            payloads: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_subscriptions(mut self, subscriptions: Vec<Subscription>) -> Self {
        self.push(Payload::Subscriptions(subscriptions));
        self
    }

    #[must_use]
    pub fn with_publish(mut self, messages: Vec<PublishedMessage>) -> Self {
        self.push(Payload::Publish(messages));
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: ControlMessage) -> Self {
        self.push(Payload::Control(control));
        self
    }

    /// Adds a payload section. Empty sections are dropped and a second
    /// section of an already present kind is merged into the first.
    pub fn push(&mut self, payload: Payload) {
        if payload.is_empty() {
            return;
        }

        let rank = payload.rank();

        match self
            .payloads
            .iter_mut()
            .find(|present| present.rank() == rank)
        {
            Some(present) => present.merge(payload),
            None => {
                self.payloads.push(payload);
                self.payloads.sort_by_key(Payload::rank);
            }
        }
    }

    #[must_use]
    pub fn payloads(&self) -> &[Payload] {
        &self.payloads
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        self.payloads
            .iter()
            .find_map(|payload| match payload {
                Payload::Subscriptions(subscriptions) => Some(subscriptions.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn publish(&self) -> &[PublishedMessage] {
        self.payloads
            .iter()
            .find_map(|payload| match payload {
                Payload::Publish(messages) => Some(messages.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn control(&self) -> Option<&ControlMessage> {
        self.payloads.iter().find_map(|payload| match payload {
            Payload::Control(control) => Some(control),
            _ => None,
        })
    }
}

// Absent scalars decode the way go-libp2p-pubsub's getters read them: an
// unset topic is the empty string, an unset subscribe flag is `false`.
impl From<proto::Rpc> for Rpc {
    fn from(rpc: proto::Rpc) -> Self {
        let subscriptions = rpc
            .subscriptions
            .into_iter()
            .map(|opts| Subscription {
                topic: opts.topic_id.unwrap_or_default(),
                subscribe: opts.subscribe.unwrap_or_default(),
            })
            .collect();

        let control = rpc.control.map(|control| ControlMessage {
            ihave: control.ihave,
            iwant: control.iwant,
            graft: control
                .graft
                .into_iter()
                .map(|graft| Graft {
                    topic: graft.topic_id.unwrap_or_default(),
                })
                .collect(),
            prune: control
                .prune
                .into_iter()
                .map(|prune| Prune {
                    topic: prune.topic_id.unwrap_or_default(),
                    peers: prune.peers,
                    backoff: prune.backoff,
                })
                .collect(),
        });

        Self::new()
            .with_subscriptions(subscriptions)
            .with_publish(rpc.publish)
            .with_control(control.unwrap_or_default())
    }
}

impl From<Rpc> for proto::Rpc {
    fn from(rpc: Rpc) -> Self {
        let mut out = Self::default();

        for payload in rpc.payloads {
            match payload {
                Payload::Subscriptions(subscriptions) => {
                    out.subscriptions = subscriptions
                        .into_iter()
                        .map(|sub| proto::SubOpts {
                            subscribe: Some(sub.subscribe),
                            topic_id: Some(sub.topic),
                        })
                        .collect();
                }
                Payload::Publish(messages) => out.publish = messages,
                Payload::Control(control) => {
                    out.control = Some(proto::ControlMessage {
                        ihave: control.ihave,
                        iwant: control.iwant,
                        graft: control
                            .graft
                            .into_iter()
                            .map(|graft| proto::ControlGraft {
                                topic_id: Some(graft.topic),
                            })
                            .collect(),
                        prune: control
                            .prune
                            .into_iter()
                            .map(|prune| proto::ControlPrune {
                                topic_id: Some(prune.topic),
                                peers: prune.peers,
                                backoff: prune.backoff,
                            })
                            .collect(),
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(data: &[u8]) -> PublishedMessage {
        PublishedMessage {
            data: Some(data.to_vec()),
            topic_ids: vec!["t1".to_owned()],
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_sections_are_not_payloads() {
        let rpc = Rpc::new()
            .with_subscriptions(vec![])
            .with_publish(vec![])
            .with_control(ControlMessage::default());

        assert!(rpc.is_empty());
        assert!(rpc.subscriptions().is_empty());
        assert_eq!(rpc.control(), None);
    }

    #[test]
    fn test_payloads_keep_wire_order() {
        let rpc = Rpc::new()
            .with_control(ControlMessage {
                graft: vec![Graft::new("t1")],
                ..Default::default()
            })
            .with_publish(vec![message(b"m1")])
            .with_subscriptions(vec![Subscription::new("t1", true)]);

        let kinds: Vec<_> = rpc.payloads().iter().map(Payload::rank).collect();
        assert_eq!(kinds, [0, 1, 2]);
    }

    #[test]
    fn test_repeated_section_is_merged() {
        let rpc = Rpc::new()
            .with_subscriptions(vec![Subscription::new("a", true)])
            .with_subscriptions(vec![Subscription::new("b", false)]);

        assert_eq!(rpc.payloads().len(), 1);
        assert_eq!(
            rpc.subscriptions(),
            [Subscription::new("a", true), Subscription::new("b", false)]
        );
    }

    #[test]
    fn test_missing_scalars_read_as_defaults() {
        let wire = proto::Rpc {
            subscriptions: vec![proto::SubOpts {
                subscribe: None,
                topic_id: Some("t1".to_owned()),
            }],
            publish: vec![],
            control: Some(proto::ControlMessage {
                graft: vec![proto::ControlGraft { topic_id: None }],
                ..Default::default()
            }),
        };

        let rpc = Rpc::from(wire);

        assert_eq!(rpc.subscriptions(), [Subscription::new("t1", false)]);
        assert_eq!(rpc.control().unwrap().graft, [Graft::new("")]);
    }

    #[test]
    fn test_outbound_conversion_sets_every_scalar() {
        let rpc = Rpc::new()
            .with_subscriptions(vec![Subscription::new("t1", false)])
            .with_control(ControlMessage {
                graft: vec![Graft::new("t1")],
                ..Default::default()
            });

        let wire = proto::Rpc::from(rpc);

        assert_eq!(wire.subscriptions[0].subscribe, Some(false));
        assert_eq!(wire.subscriptions[0].topic_id.as_deref(), Some("t1"));
        assert_eq!(
            wire.control.unwrap().graft[0].topic_id.as_deref(),
            Some("t1")
        );
        assert!(wire.publish.is_empty());
    }
}
