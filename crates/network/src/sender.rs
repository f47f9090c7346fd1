use core::fmt::{self, Debug, Formatter};

use async_trait::async_trait;
use futures_util::SinkExt;
use libp2p::{PeerId, StreamProtocol};
use libp2p_stream::{Control, OpenStreamError};
use sybil_network_primitives::rpc::Rpc;
use sybil_network_primitives::stream::{CodecError, Stream};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to open outbound stream: {0}")]
    Open(#[from] OpenStreamError),
    #[error("failed to write rpc: {0}")]
    Codec(#[from] CodecError),
}

/// Delivers a response to a remote peer.
#[async_trait]
pub trait RpcSender: Send + Sync {
    async fn send(&self, peer: PeerId, rpc: Rpc) -> Result<(), SendError>;
}

/// Opens a fresh outbound stream for every message, writes a single frame and
/// closes it again.
#[derive(Clone)]
pub struct StreamSender {
    control: Control,
    protocol: StreamProtocol,
}

impl StreamSender {
    #[must_use]
    pub const fn new(control: Control, protocol: StreamProtocol) -> Self {
        Self { control, protocol }
    }
}

impl Debug for StreamSender {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RpcSender for StreamSender {
    async fn send(&self, peer: PeerId, rpc: Rpc) -> Result<(), SendError> {
        let mut control = self.control.clone();

        let stream = control.open_stream(peer, self.protocol.clone()).await?;
        let mut stream = Stream::new(stream);

        let sent = stream.send(rpc).await;
        let closed = stream.close().await;

        sent?;
        closed?;

        Ok(())
    }
}
