use core::pin::Pin;
use core::task::{Context, Poll};

use futures_util::{Sink as FuturesSink, SinkExt, Stream as FuturesStream, StreamExt};
use libp2p::{Stream as P2pStream, StreamProtocol};
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio_util::codec::Framed;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

mod codec;

use codec::RpcCodec;
pub use codec::CodecError;

use crate::rpc::Rpc;

pub const MAX_FRAME_SIZE: usize = 1_024 * 1_024;

pub const MESHSUB_PROTOCOL: StreamProtocol = StreamProtocol::new("/meshsub/1.0.0");

/// A pubsub stream yielding decoded [`Rpc`] frames and accepting frames to
/// write. `None` from the stream half is a clean end of stream; every other
/// failure surfaces as a [`CodecError`].
#[derive(Debug)]
pub struct Stream<T = BufStream<Compat<P2pStream>>> {
    inner: Framed<T, RpcCodec>,
}

impl Stream {
    #[must_use]
    pub fn new(stream: P2pStream) -> Self {
        Self::from_io(BufStream::new(stream.compat()))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Stream<T> {
    /// Frames an arbitrary byte stream, e.g. an in-memory duplex pipe.
    #[must_use]
    pub fn from_io(io: T) -> Self {
        Self {
            inner: Framed::new(io, RpcCodec::new(MAX_FRAME_SIZE)),
        }
    }

    /// Tears the stream down without a close handshake.
    ///
    /// Buffered output is discarded and the multiplexer sees the substream
    /// vanish, which the remote observes as a reset rather than an orderly
    /// end of stream.
    pub fn reset(self) {
        drop(self.inner);
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FuturesStream for Stream<T> {
    type Item = Result<Rpc, CodecError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FuturesSink<Rpc> for Stream<T> {
    type Error = CodecError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready_unpin(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Rpc) -> Result<(), Self::Error> {
        self.inner.start_send_unpin(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_flush_unpin(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_close_unpin(cx)
    }
}
