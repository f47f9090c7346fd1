use core::time::Duration;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;

use libp2p::PeerId;
use parking_lot::Mutex;
use sybil_network_primitives::stream::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::session::{Session, SessionContext, SessionId, SessionReport};

#[derive(Debug)]
struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    sessions: HashMap<PeerId, SessionHandle>,
}

/// Active sessions keyed by remote peer, at most one per peer.
#[derive(Clone, Debug, Default)]
pub(crate) struct SessionTable {
    inner: Arc<Mutex<Inner>>,
}

impl SessionTable {
    /// Registers a new session for `peer`, cancelling the one it replaces.
    pub(crate) fn register(
        &self,
        peer: PeerId,
        parent: &CancellationToken,
    ) -> (SessionId, CancellationToken) {
        let mut inner = self.inner.lock();

        let id = SessionId::new(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1);

        let cancel = parent.child_token();
        let handle = SessionHandle {
            id,
            cancel: cancel.clone(),
            started_at: Instant::now(),
        };

        match inner.sessions.entry(peer) {
            Entry::Occupied(mut entry) => {
                let replaced = entry.insert(handle);
                replaced.cancel.cancel();

                debug!(%peer, session = %id, replaced = %replaced.id, "replacing session");
            }
            Entry::Vacant(entry) => {
                let _ = entry.insert(handle);
            }
        }

        (id, cancel)
    }

    /// Forgets the session `id` of `peer`, returning how long it lived.
    ///
    /// A session that was already replaced leaves its successor untouched.
    pub(crate) fn release(&self, peer: &PeerId, id: SessionId) -> Option<Duration> {
        let mut inner = self.inner.lock();

        let Entry::Occupied(entry) = inner.sessions.entry(*peer) else {
            return None;
        };

        if entry.get().id != id {
            return None;
        }

        Some(entry.remove().started_at.elapsed())
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub(crate) fn peers(&self) -> Vec<PeerId> {
        self.inner.lock().sessions.keys().copied().collect()
    }

    pub(crate) fn contains(&self, peer: &PeerId) -> bool {
        self.inner.lock().sessions.contains_key(peer)
    }
}

/// Spawns and tracks one session task per inbound stream.
#[derive(Clone, Debug)]
pub struct Sessions {
    table: SessionTable,
    tracker: TaskTracker,
    context: SessionContext,
    shutdown: CancellationToken,
}

impl Sessions {
    #[must_use]
    pub fn new(context: SessionContext, shutdown: CancellationToken) -> Self {
        Self {
            table: SessionTable::default(),
            tracker: TaskTracker::new(),
            context,
            shutdown,
        }
    }

    /// Starts serving `stream` for `peer`. An existing session for the same
    /// peer is cancelled and replaced.
    pub fn accept<T>(&self, peer: PeerId, stream: Stream<T>) -> JoinHandle<SessionReport>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (id, cancel) = self.table.register(peer, &self.shutdown);
        let session = Session::new(id, peer, stream, self.context.clone(), cancel);
        let table = self.table.clone();

        self.tracker.spawn(async move {
            let report = session.run().await;

            if let Some(lifetime) = table.release(&peer, id) {
                debug!(%peer, session = %id, ?lifetime, "session released");
            }

            report
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        self.table.peers()
    }

    #[must_use]
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.table.contains(peer)
    }

    /// Cancels every session and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces_and_cancels_previous_session() {
        let table = SessionTable::default();
        let parent = CancellationToken::new();
        let peer = PeerId::random();

        let (first, first_cancel) = table.register(peer, &parent);
        let (second, second_cancel) = table.register(peer, &parent);

        assert_ne!(first, second);
        assert!(first_cancel.is_cancelled());
        assert!(!second_cancel.is_cancelled());
        assert_eq!(table.len(), 1);

        assert_eq!(table.release(&peer, first), None);
        assert!(table.contains(&peer));

        assert!(table.release(&peer, second).is_some());
        assert!(!table.contains(&peer));
    }

    #[test]
    fn test_parent_cancellation_reaches_every_session() {
        let table = SessionTable::default();
        let parent = CancellationToken::new();

        let (_, a) = table.register(PeerId::random(), &parent);
        let (_, b) = table.register(PeerId::random(), &parent);
        assert_eq!(table.len(), 2);

        parent.cancel();

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_release_of_unknown_peer_is_a_noop() {
        let table = SessionTable::default();

        assert_eq!(table.release(&PeerId::random(), SessionId::new(0)), None);
        assert!(table.peers().is_empty());
    }
}
