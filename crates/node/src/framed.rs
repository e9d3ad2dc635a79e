//! Length-delimited frame transfer over raw byte streams.
//!
//! The transport hands the node plain byte streams with no message
//! boundaries, so each wire frame is prefixed with its length as a
//! big-endian `u32`. Everything after the prefix is the frame exactly as
//! produced by [`peerwire_protocol::FrameCodec`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NodeError, Result};

/// Upper bound on a single wire frame, prefix excluded.
pub const MAX_WIRE_FRAME: usize = 16 * 1024 * 1024;

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_WIRE_FRAME {
        return Err(NodeError::FrameTooLarge(len));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Writes one length-prefixed frame and flushes.
///
/// Applies the same size bound as [`read_frame`], so an oversized frame
/// fails locally instead of being rejected by the peer.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > MAX_WIRE_FRAME {
        return Err(NodeError::FrameTooLarge(frame.len()));
    }
    writer.write_all(&(frame.len() as u32).to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
