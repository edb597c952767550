//! Native messaging framing.
//!
//! Browser and host exchange messages framed as a 4-byte native-endian
//! length followed by a UTF-8 JSON payload, symmetric in both directions.
//! A zero-byte read at the header position is a clean end-of-stream and
//! ends the message loop; a partial header or payload is a per-request
//! error the loop recovers from.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum incoming frame size (64 MB). Safety valve against a desynced
/// or malicious peer.
pub const MAX_INCOMING: u32 = 64 * 1024 * 1024;

/// Maximum outgoing frame size (1 MB). Browsers reject larger host messages.
pub const MAX_OUTGOING: u32 = 1024 * 1024;

/// Framing failures. All variants are recoverable per-request; end-of-stream
/// is not an error and is signalled as `Ok(None)` from [`read_frame`].
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended mid-header or mid-payload.
    #[error("truncated frame: {0}")]
    Truncated(std::io::Error),

    /// Declared payload length exceeds the incoming cap.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    TooLarge { len: u32, max: u32 },

    /// Outgoing payload exceeds what the browser will accept.
    #[error("outgoing frame of {len} bytes exceeds maximum of {max}")]
    OutgoingTooLarge { len: usize, max: u32 },

    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` when the stream is cleanly closed (zero bytes at the
/// header position). Returns the raw payload bytes otherwise; JSON decoding
/// is the caller's concern.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let mut len_buf = [0u8; 4];

    // Distinguish clean EOF (nothing read) from a truncated header.
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed after {filled} header bytes"),
            )));
        }
        filled += n;
    }

    let len = u32::from_ne_bytes(len_buf);
    if len > MAX_INCOMING {
        return Err(FrameError::TooLarge { len, max: MAX_INCOMING });
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(FrameError::Truncated)?;
    Ok(Some(payload))
}

/// Write one length-prefixed frame and flush immediately so the peer
/// observes it without buffering delay.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::OutgoingTooLarge {
        len: payload.len(),
        max: MAX_OUTGOING,
    })?;
    if len > MAX_OUTGOING {
        return Err(FrameError::OutgoingTooLarge {
            len: payload.len(),
            max: MAX_OUTGOING,
        });
    }

    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_framing() {
        let payload = br#"{"action":"ping"}"#;
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let received = read_frame(&mut cursor).await.unwrap();
        assert_eq!(received.as_deref(), Some(payload.as_slice()));
    }

    #[tokio::test]
    async fn header_is_native_endian() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"abc").await.unwrap();
        assert_eq!(buf[..4], 3u32.to_ne_bytes());
        assert_eq!(&buf[4..], b"abc");
    }

    #[tokio::test]
    async fn empty_stream_is_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let frame = read_frame(&mut cursor).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn truncated_header_is_error() {
        // Two of the four header bytes, then EOF.
        let mut cursor = std::io::Cursor::new(vec![0x05, 0x00]);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated(_)));
    }

    #[tokio::test]
    async fn truncated_payload_is_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_ne_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated(_)));
    }

    #[tokio::test]
    async fn oversize_incoming_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_INCOMING + 1).to_ne_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn oversize_outgoing_rejected() {
        let payload = vec![b'x'; (MAX_OUTGOING + 1) as usize];
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &payload).await.unwrap_err();
        assert!(matches!(err, FrameError::OutgoingTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn empty_payload_roundtrips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let received = read_frame(&mut cursor).await.unwrap();
        assert_eq!(received.as_deref(), Some(&b""[..]));
    }
}
