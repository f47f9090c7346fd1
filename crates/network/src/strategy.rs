//! Decision logic of the sybil.
//!
//! Every peer that announces interest in a topic gets that interest echoed
//! back together with a graft request, so the sybil looks like the most
//! eager mesh candidate it could be. Published content is swallowed: it is
//! never relayed, stored or re-published. The rules are deterministic and
//! stateless so their effect on mesh topology is reproducible.

use sybil_network_primitives::rpc::{ControlMessage, Graft, Payload, Rpc, Subscription};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Send `rpc` back to the peer. `discarded` counts published messages
    /// that arrived in the same frame and were dropped.
    Respond { rpc: Rpc, discarded: usize },
    /// The frame only carried published content; nothing is sent back.
    Discard { messages: usize },
    /// Nothing to act on.
    Ignore,
}

impl Verdict {
    #[must_use]
    pub const fn response(&self) -> Option<&Rpc> {
        match self {
            Self::Respond { rpc, .. } => Some(rpc),
            Self::Discard { .. } | Self::Ignore => None,
        }
    }
}

#[must_use]
pub fn evaluate(rpc: &Rpc) -> Verdict {
    let mut subscriptions = None;
    let mut published = 0_usize;

    for payload in rpc.payloads() {
        match payload {
            Payload::Subscriptions(announced) => subscriptions = Some(announced),
            Payload::Publish(messages) => published = published.saturating_add(messages.len()),
            // Grafts and prunes aimed at us carry no information we act on:
            // mesh membership is requested on our own initiative.
            Payload::Control(_) => {}
        }
    }

    match subscriptions {
        Some(announced) => Verdict::Respond {
            rpc: mirror(announced),
            discarded: published,
        },
        None if published > 0 => Verdict::Discard {
            messages: published,
        },
        None => Verdict::Ignore,
    }
}

fn mirror(announced: &[Subscription]) -> Rpc {
    let graft = announced
        .iter()
        .filter(|sub| sub.subscribe)
        .map(|sub| Graft::new(sub.topic.clone()))
        .collect();

    Rpc::new()
        .with_subscriptions(announced.to_vec())
        .with_control(ControlMessage {
            graft,
            ..ControlMessage::default()
        })
}

#[cfg(test)]
mod tests {
    use sybil_network_primitives::rpc::{Prune, PublishedMessage};

    use super::*;

    fn message(data: &[u8]) -> PublishedMessage {
        PublishedMessage {
            data: Some(data.to_vec()),
            topic_ids: vec!["t1".to_owned()],
            ..PublishedMessage::default()
        }
    }

    fn grafts(rpc: &Rpc) -> Vec<&str> {
        rpc.control()
            .map(|control| control.graft.iter().map(|g| g.topic.as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_subscribe_is_mirrored_and_grafted() {
        let inbound = Rpc::new().with_subscriptions(vec![Subscription::new("t1", true)]);

        let verdict = evaluate(&inbound);

        let expected = Rpc::new()
            .with_subscriptions(vec![Subscription::new("t1", true)])
            .with_control(ControlMessage {
                graft: vec![Graft::new("t1")],
                ..ControlMessage::default()
            });
        assert_eq!(
            verdict,
            Verdict::Respond {
                rpc: expected,
                discarded: 0
            }
        );
    }

    #[test]
    fn test_unsubscribe_is_mirrored_without_graft() {
        let inbound = Rpc::new().with_subscriptions(vec![Subscription::new("t1", false)]);

        let verdict = evaluate(&inbound);

        let rpc = verdict.response().unwrap();
        assert_eq!(rpc.subscriptions(), [Subscription::new("t1", false)]);
        assert!(grafts(rpc).is_empty());
        assert_eq!(rpc.control(), None);
    }

    #[test]
    fn test_mirror_preserves_every_entry_in_order() {
        let announced = vec![
            Subscription::new("b", true),
            Subscription::new("a", false),
            Subscription::new("c", true),
            Subscription::new("b", false),
            Subscription::new("", true),
        ];
        let inbound = Rpc::new().with_subscriptions(announced.clone());

        let verdict = evaluate(&inbound);
        let rpc = verdict.response().unwrap();

        assert_eq!(rpc.subscriptions(), announced.as_slice());
        assert_eq!(grafts(rpc), ["b", "c", ""]);
    }

    #[test]
    fn test_publish_only_is_swallowed() {
        let inbound = Rpc::new().with_publish(vec![message(b"msg1"), message(b"msg2")]);

        assert_eq!(evaluate(&inbound), Verdict::Discard { messages: 2 });
    }

    #[test]
    fn test_publish_alongside_subscriptions_is_counted() {
        let inbound = Rpc::new()
            .with_subscriptions(vec![Subscription::new("t1", true)])
            .with_publish(vec![message(b"msg1")]);

        let Verdict::Respond { rpc, discarded } = evaluate(&inbound) else {
            panic!("expected a response");
        };

        assert_eq!(discarded, 1);
        assert!(rpc.publish().is_empty());
        assert_eq!(grafts(&rpc), ["t1"]);
    }

    #[test]
    fn test_empty_frame_is_ignored() {
        assert_eq!(evaluate(&Rpc::new()), Verdict::Ignore);
    }

    #[test]
    fn test_control_only_is_ignored() {
        let inbound = Rpc::new().with_control(ControlMessage {
            graft: vec![Graft::new("t1")],
            prune: vec![Prune {
                topic: "t2".to_owned(),
                peers: vec![],
                backoff: Some(60),
            }],
            ..ControlMessage::default()
        });

        assert_eq!(evaluate(&inbound), Verdict::Ignore);
    }

    #[test]
    fn test_control_with_publish_is_discarded() {
        let inbound = Rpc::new()
            .with_publish(vec![message(b"msg1")])
            .with_control(ControlMessage {
                prune: vec![Prune {
                    topic: "t1".to_owned(),
                    peers: vec![],
                    backoff: None,
                }],
                ..ControlMessage::default()
            });

        assert_eq!(evaluate(&inbound), Verdict::Discard { messages: 1 });
    }
}
