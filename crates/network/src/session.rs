use core::fmt::{self, Display, Formatter};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use libp2p::PeerId;
use sybil_network_primitives::rpc::Rpc;
use sybil_network_primitives::stream::{CodecError, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::gate::AttackGate;
use crate::sender::RpcSender;
use crate::strategy::{evaluate, Verdict};

#[cfg(test)]
#[path = "tests/session.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    /// Open is always left through Closing, and Closed is terminal.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Open => Self::Closing,
            Self::Closing | Self::Closed => Self::Closed,
        }
    }
}

/// How a session came to an end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Teardown {
    /// The remote ended the stream at a frame boundary.
    Graceful,
    /// The stream failed or carried an invalid frame and was reset.
    Reset,
    /// The node shut down or a newer stream from the same peer took over.
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionStats {
    pub frames: u64,
    pub responses: u64,
    pub subscriptions_mirrored: u64,
    pub grafts_sent: u64,
    pub messages_discarded: u64,
    pub send_failures: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionReport {
    pub id: SessionId,
    pub peer: PeerId,
    pub teardown: Teardown,
    /// State the session ended in.
    pub state: SessionState,
    pub stats: SessionStats,
}

/// Everything a session needs from the node it runs in.
#[derive(Clone)]
pub struct SessionContext {
    seq: u64,
    sender: Arc<dyn RpcSender>,
    gate: AttackGate,
}

impl SessionContext {
    #[must_use]
    pub fn new(seq: u64, sender: Arc<dyn RpcSender>, gate: AttackGate) -> Self {
        Self { seq, sender, gate }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("seq", &self.seq)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

enum Next {
    Frame(Rpc),
    Eof,
    Failed(CodecError),
    Cancelled,
}

enum Flow {
    Continue,
    Cancelled,
}

/// Serves one inbound pubsub stream until it ends, fails or is cancelled.
#[derive(Debug)]
pub struct Session<T> {
    id: SessionId,
    peer: PeerId,
    prefix: String,
    stream: Option<Stream<T>>,
    state: SessionState,
    stats: SessionStats,
    context: SessionContext,
    cancel: CancellationToken,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Session<T> {
    #[must_use]
    pub fn new(
        id: SessionId,
        peer: PeerId,
        stream: Stream<T>,
        context: SessionContext,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            prefix: log_prefix(context.seq, &peer),
            stream: Some(stream),
            state: SessionState::Open,
            stats: SessionStats::default(),
            context,
            cancel,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub async fn run(mut self) -> SessionReport {
        debug!(peer = %self.peer, session = %self.id, "{} session opened", self.prefix);

        let teardown = loop {
            let next = {
                let Some(stream) = self.stream.as_mut() else {
                    break Teardown::Graceful;
                };

                select! {
                    biased;
                    () = self.cancel.cancelled() => Next::Cancelled,
                    frame = stream.next() => match frame {
                        Some(Ok(rpc)) => Next::Frame(rpc),
                        Some(Err(err)) => Next::Failed(err),
                        None => Next::Eof,
                    },
                }
            };

            match next {
                Next::Frame(rpc) => {
                    if let Flow::Cancelled = self.handle(rpc).await {
                        self.reset();
                        break Teardown::Cancelled;
                    }
                }
                Next::Eof => {
                    debug!(
                        peer = %self.peer,
                        session = %self.id,
                        "{} remote closed the stream",
                        self.prefix
                    );
                    self.close().await;
                    break Teardown::Graceful;
                }
                Next::Failed(err) => {
                    warn!(
                        %err,
                        peer = %self.peer,
                        session = %self.id,
                        protocol_violation = err.is_protocol_violation(),
                        "{} stream failed, resetting",
                        self.prefix
                    );
                    self.reset();
                    break Teardown::Reset;
                }
                Next::Cancelled => {
                    debug!(peer = %self.peer, session = %self.id, "{} session cancelled", self.prefix);
                    self.reset();
                    break Teardown::Cancelled;
                }
            }
        };

        debug!(
            peer = %self.peer,
            session = %self.id,
            ?teardown,
            stats = ?self.stats,
            "{} session closed",
            self.prefix
        );

        SessionReport {
            id: self.id,
            peer: self.peer,
            teardown,
            state: self.state,
            stats: self.stats,
        }
    }

    async fn handle(&mut self, rpc: Rpc) -> Flow {
        self.stats.frames = self.stats.frames.saturating_add(1);

        match evaluate(&rpc) {
            Verdict::Respond { rpc, discarded } => {
                self.count_discarded(discarded);
                self.respond(rpc).await
            }
            Verdict::Discard { messages } => {
                self.count_discarded(messages);
                trace!(peer = %self.peer, messages, "{} swallowed published messages", self.prefix);
                Flow::Continue
            }
            Verdict::Ignore => {
                trace!(peer = %self.peer, "{} nothing to answer", self.prefix);
                Flow::Continue
            }
        }
    }

    async fn respond(&mut self, rpc: Rpc) -> Flow {
        let gate = self.context.gate;

        if !gate.is_open() {
            debug!(
                peer = %self.peer,
                remaining = ?gate.remaining(),
                "{} holding response until the attack starts",
                self.prefix
            );

            select! {
                biased;
                () = self.cancel.cancelled() => return Flow::Cancelled,
                () = gate.wait() => {}
            }
        }

        let mirrored = count(rpc.subscriptions().len());
        let grafts = count(rpc.control().map_or(0, |control| control.graft.len()));

        let sent = select! {
            biased;
            () = self.cancel.cancelled() => return Flow::Cancelled,
            sent = self.context.sender.send(self.peer, rpc) => sent,
        };

        match sent {
            Ok(()) => {
                self.stats.responses = self.stats.responses.saturating_add(1);
                self.stats.subscriptions_mirrored =
                    self.stats.subscriptions_mirrored.saturating_add(mirrored);
                self.stats.grafts_sent = self.stats.grafts_sent.saturating_add(grafts);

                debug!(
                    peer = %self.peer,
                    mirrored,
                    grafts,
                    "{} mirrored subscriptions",
                    self.prefix
                );
            }
            Err(err) => {
                self.stats.send_failures = self.stats.send_failures.saturating_add(1);

                warn!(%err, peer = %self.peer, "{} failed to send response", self.prefix);
            }
        }

        Flow::Continue
    }

    fn count_discarded(&mut self, messages: usize) {
        self.stats.messages_discarded = self
            .stats
            .messages_discarded
            .saturating_add(count(messages));
    }

    /// Releases the stream with an orderly close. Idempotent.
    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        self.advance();

        let closed = select! {
            biased;
            () = self.cancel.cancelled() => None,
            closed = stream.close() => Some(closed),
        };

        match closed {
            None => stream.reset(),
            Some(Err(err)) => {
                debug!(%err, peer = %self.peer, "{} close did not complete", self.prefix);
            }
            Some(Ok(())) => {}
        }

        self.advance();
    }

    /// Drops the stream without a close handshake. Idempotent.
    fn reset(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        self.advance();
        stream.reset();
        self.advance();
    }

    fn advance(&mut self) {
        let next = self.state.next();
        trace!(peer = %self.peer, from = ?self.state, to = ?next, "{} session state", self.prefix);
        self.state = next;
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn log_prefix(seq: u64, peer: &PeerId) -> String {
    let peer = peer.to_base58();
    // every ed25519 peer id shares its leading characters
    let short: String = peer.chars().skip(peer.len().saturating_sub(8)).collect();

    format!("[sybil {seq} {short}]")
}
