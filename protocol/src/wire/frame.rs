//! # Frame Transport
//!
//! Turns a bidirectional byte stream into discrete messages:
//!
//! ```text
//! +----------------------+---------------------------+
//! | length: u32 (BE)     | payload: `length` bytes    |
//! +----------------------+---------------------------+
//! ```
//!
//! The prefix width and byte order are part of the wire contract. The
//! payload is never interpreted here.
//!
//! A clean end-of-stream before the first prefix byte is reported as
//! [`FrameError::PeerClosed`] so the handler can tell a finished
//! conversation apart from a peer that hung up mid-frame.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::config::{FrameConfig, LENGTH_PREFIX_SIZE};
use crate::wire::error::FrameError;

/// Reads one frame and returns its payload.
pub async fn read_frame<R>(reader: &mut R, config: &FrameConfig) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    with_deadline(config.read_timeout, read_frame_inner(reader, config.max_frame_size)).await
}

/// Writes `payload` as one frame and flushes the stream.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::Oversized {
        len: u32::MAX,
        max: config.max_frame_size,
    })?;
    if len > config.max_frame_size {
        return Err(FrameError::Oversized {
            len,
            max: config.max_frame_size,
        });
    }

    // Prefix and payload go out in a single write.
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);

    with_deadline(config.write_timeout, async {
        writer
            .write_all(&buf)
            .await
            .map_err(FrameError::WriteFailed)?;
        writer.flush().await.map_err(FrameError::WriteFailed)?;
        trace!(bytes = payload.len(), "frame written");
        Ok(())
    })
    .await
}

async fn read_frame_inner<R>(reader: &mut R, max_frame_size: u32) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let got = fill(reader, &mut prefix).await?;
    if got == 0 {
        return Err(FrameError::PeerClosed);
    }
    if got < LENGTH_PREFIX_SIZE {
        return Err(FrameError::TruncatedFrame {
            expected: LENGTH_PREFIX_SIZE,
            got,
        });
    }

    let len = u32::from_be_bytes(prefix);
    if len > max_frame_size {
        return Err(FrameError::Oversized {
            len,
            max: max_frame_size,
        });
    }

    // The buffer grows with bytes actually received, not with the prefix.
    let mut payload = Vec::new();
    let got = (&mut *reader)
        .take(u64::from(len))
        .read_to_end(&mut payload)
        .await
        .map_err(FrameError::ReadFailed)?;
    if got < len as usize {
        return Err(FrameError::TruncatedFrame {
            expected: len as usize,
            got,
        });
    }

    trace!(bytes = len, "frame read");
    Ok(payload)
}

/// Reads until `buf` is full or the stream ends. Returns the bytes read.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(FrameError::ReadFailed)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T, FrameError>
where
    F: Future<Output = Result<T, FrameError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| FrameError::Timeout)?,
        None => fut.await,
    }
}
