use core::fmt::{self, Debug, Formatter};
use std::io;

use bytes::BytesMut;
use prost::Message as _;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use unsigned_varint::codec::Uvi;

use crate::rpc::{proto, Rpc};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed length prefix: {0}")]
    BadPrefix(#[source] io::Error),
    #[error("frame of {declared} bytes exceeds the {max} byte limit")]
    FrameTooLarge { declared: usize, max: usize },
    #[error("malformed rpc frame: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("failed to encode rpc frame: {0}")]
    Encode(#[from] prost::EncodeError),
}

impl CodecError {
    /// Whether the remote peer broke the framing or schema rules, as opposed
    /// to the transport failing underneath us.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::BadPrefix(_) | Self::FrameTooLarge { .. } | Self::Malformed(_)
        )
    }
}

/// Unsigned-varint length prefix followed by one protobuf `RPC`.
pub(crate) struct RpcCodec {
    prefix: Uvi<usize>,
    /// Length of the frame whose prefix has been consumed but whose body has
    /// not fully arrived yet.
    pending_len: Option<usize>,
    max_frame_size: usize,
}

impl RpcCodec {
    pub(crate) fn new(max_frame_size: usize) -> Self {
        Self {
            prefix: Uvi::default(),
            pending_len: None,
            max_frame_size,
        }
    }

    fn frame_len(&mut self, src: &mut BytesMut) -> Result<Option<usize>, CodecError> {
        if let Some(len) = self.pending_len {
            return Ok(Some(len));
        }

        let Some(len) = self.prefix.decode(src).map_err(CodecError::BadPrefix)? else {
            return Ok(None);
        };

        // checked before anything is reserved for the body
        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                declared: len,
                max: self.max_frame_size,
            });
        }

        self.pending_len = Some(len);

        Ok(Some(len))
    }
}

impl Debug for RpcCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcCodec")
            .field("pending_len", &self.pending_len)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

impl Decoder for RpcCodec {
    type Item = Rpc;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(len) = self.frame_len(src)? else {
            return Ok(None);
        };

        if src.len() < len {
            src.reserve(len.saturating_sub(src.len()));
            return Ok(None);
        }

        self.pending_len = None;

        let frame = src.split_to(len);
        let rpc = proto::Rpc::decode(frame.freeze())?;

        Ok(Some(rpc.into()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(rpc) = self.decode(src)? {
            return Ok(Some(rpc));
        }

        if src.is_empty() && self.pending_len.is_none() {
            return Ok(None);
        }

        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended mid-frame").into())
    }
}

impl Encoder<Rpc> for RpcCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Rpc, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let rpc = proto::Rpc::from(item);
        let len = rpc.encoded_len();

        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                declared: len,
                max: self.max_frame_size,
            });
        }

        self.prefix.encode(len, dst)?;
        dst.reserve(len);
        rpc.encode(dst)?;

        Ok(())
    }
}
