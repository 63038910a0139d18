//! Message framing.
//!
//! Frames are length-prefixed: [4 bytes big-endian u32][payload]. Oversized
//! frames are refused before the payload is read, and payloads carrying a
//! gzip or zlib stream are refused outright: the bridge never negotiates
//! compression, so a compressed frame is either a broken client or an
//! attempt to smuggle one past the size accounting.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{BridgeError, ProtocolErrorKind};

/// Maximum frame size used where no configured limit applies.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1_048_576;

fn looks_compressed(payload: &[u8]) -> bool {
    // gzip magic, or a zlib header with any of its defined flag bytes.
    matches!(payload, [0x1f, 0x8b, ..])
        || matches!(payload, [0x78, 0x01 | 0x5e | 0x9c | 0xda, ..])
}

/// Read a length-prefixed frame from the reader.
///
/// Returns the raw payload bytes. Fails before allocating if the declared
/// length exceeds `max_size`.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, BridgeError>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(BridgeError::Protocol {
                kind: ProtocolErrorKind::ConnectionClosed,
            });
        }
        Err(e) => return Err(BridgeError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Err(BridgeError::Protocol {
            kind: ProtocolErrorKind::InvalidMessageFormat {
                message: "Empty frame".to_string(),
            },
        });
    }

    if len > max_size {
        return Err(BridgeError::Protocol {
            kind: ProtocolErrorKind::MessageTooLarge {
                size: len,
                max: max_size,
            },
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    if looks_compressed(&buf) {
        return Err(BridgeError::Protocol {
            kind: ProtocolErrorKind::CompressedPayload,
        });
    }

    Ok(buf)
}

/// Write a length-prefixed frame to the writer.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<(), BridgeError>
where
    W: AsyncWriteExt + Unpin,
{
    let len = (data.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a frame with a timeout.
pub async fn read_frame_with_timeout<R>(
    reader: &mut R,
    max_size: usize,
    timeout_duration: Duration,
) -> Result<Vec<u8>, BridgeError>
where
    R: AsyncReadExt + Unpin,
{
    timeout(timeout_duration, read_frame(reader, max_size))
        .await
        .map_err(|_| BridgeError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}

/// Write a frame with a timeout.
pub async fn write_frame_with_timeout<W>(
    writer: &mut W,
    data: &[u8],
    timeout_duration: Duration,
) -> Result<(), BridgeError>
where
    W: AsyncWriteExt + Unpin,
{
    timeout(timeout_duration, write_frame(writer, data))
        .await
        .map_err(|_| BridgeError::Protocol {
            kind: ProtocolErrorKind::ConnectionTimeout,
        })?
}
