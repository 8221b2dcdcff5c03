//! Length-prefixed framing over a byte stream: `[type_byte][u32 big-endian
//! length][protobuf payload]`. Used on both ends of a UDF subprocess's
//! stdin/stdout pipes.

use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("unknown frame type byte {0}")]
    UnknownType(u8),
    #[error("frame of {0} bytes exceeds the {1}-byte limit")]
    TooLarge(u32, u32),
}

/// Frame size ceiling: guards against a misbehaving UDF sending a bogus
/// length prefix and the reader trying to allocate gigabytes for it.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Init = 0,
    InitResponse = 1,
    Point = 2,
    Batch = 3,
    Keepalive = 4,
    Abort = 5,
}

impl FrameType {
    fn from_byte(b: u8) -> Result<Self, FramingError> {
        match b {
            0 => Ok(FrameType::Init),
            1 => Ok(FrameType::InitResponse),
            2 => Ok(FrameType::Point),
            3 => Ok(FrameType::Batch),
            4 => Ok(FrameType::Keepalive),
            5 => Ok(FrameType::Abort),
            other => Err(FramingError::UnknownType(other)),
        }
    }
}

/// A decoded frame, tagged by kind. Forwarding code matches on this rather
/// than re-deriving the type byte from context.
pub enum Frame {
    Init(wire::Init),
    InitResponse(wire::InitResponse),
    Point(wire::WirePoint),
    Batch(wire::WireBatch),
    Keepalive(wire::Keepalive),
    Abort(wire::Abort),
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, kind: FrameType, payload: &[u8]) -> Result<(), FramingError> {
    w.write_u8(kind as u8).await?;
    w.write_u32(payload.len() as u32).await?;
    w.write_all(payload).await?;
    w.flush().await?;
    Ok(())
}

macro_rules! write_fn {
    ($name:ident, $ty:ty, $kind:expr) => {
        pub async fn $name<W: AsyncWrite + Unpin>(w: &mut W, msg: &$ty) -> Result<(), FramingError> {
            let mut buf = Vec::with_capacity(msg.encoded_len());
            msg.encode(&mut buf).expect("Vec<u8> buffers never overflow prost encoding");
            write_frame(w, $kind, &buf).await
        }
    };
}

write_fn!(write_init, wire::Init, FrameType::Init);
write_fn!(write_init_response, wire::InitResponse, FrameType::InitResponse);
write_fn!(write_point, wire::WirePoint, FrameType::Point);
write_fn!(write_batch, wire::WireBatch, FrameType::Batch);
write_fn!(write_keepalive, wire::Keepalive, FrameType::Keepalive);
write_fn!(write_abort, wire::Abort, FrameType::Abort);

/// Read one frame. Returns `Ok(None)` on a clean EOF at a frame boundary
/// (the subprocess closed its stdout), distinct from a mid-frame error.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<Frame>, FramingError> {
    let kind_byte = match r.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let kind = FrameType::from_byte(kind_byte)?;
    let len = r.read_u32().await?;
    if len > MAX_FRAME_BYTES {
        return Err(FramingError::TooLarge(len, MAX_FRAME_BYTES));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;

    let frame = match kind {
        FrameType::Init => Frame::Init(wire::Init::decode(buf.as_slice())?),
        FrameType::InitResponse => Frame::InitResponse(wire::InitResponse::decode(buf.as_slice())?),
        FrameType::Point => Frame::Point(wire::WirePoint::decode(buf.as_slice())?),
        FrameType::Batch => Frame::Batch(wire::WireBatch::decode(buf.as_slice())?),
        FrameType::Keepalive => Frame::Keepalive(wire::Keepalive::decode(buf.as_slice())?),
        FrameType::Abort => Frame::Abort(wire::Abort::decode(buf.as_slice())?),
    };
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn point_frame_roundtrips_through_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let p = wire::WirePoint {
            name: "cpu".to_string(),
            time: 42,
            group: 0,
            tags: vec![],
            fields: vec![],
        };
        write_point(&mut client, &p).await.unwrap();
        match read_frame(&mut server).await.unwrap().unwrap() {
            Frame::Point(decoded) => assert_eq!(decoded.time, 42),
            _ => panic!("expected a point frame"),
        }
    }

    #[tokio::test]
    async fn eof_at_frame_boundary_yields_none() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(8);
        tokio::spawn(async move {
            let _ = client.write_u8(FrameType::Point as u8).await;
            let _ = client.write_u32(MAX_FRAME_BYTES + 1).await;
        });
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FramingError::TooLarge(_, _)));
    }
}
