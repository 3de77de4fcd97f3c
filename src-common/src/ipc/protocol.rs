//! Control-channel framing and transport addressing.

use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum control line size (64 KB), excluding the terminator
pub const MAX_MESSAGE_SIZE: usize = 65536;

/// Environment variable overriding the control channel address.
pub const CHANNEL_ENV: &str = "SCREENREC_CHANNEL";

/// Error type for control-channel I/O.
#[derive(Debug, Error)]
pub enum IpcError {
    /// I/O error during read/write
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    /// Line exceeds maximum size
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    /// Line is not valid UTF-8 or embeds a terminator
    #[error("Malformed message: {0}")]
    Malformed(String),
    /// Peer closed the channel
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => IpcError::ConnectionClosed,
            _ => IpcError::Io(e),
        }
    }
}

/// Get the platform-specific address of the control channel.
///
/// | Platform | Address |
/// |----------|---------|
/// | Linux | `$XDG_RUNTIME_DIR/screenrec/recorder.sock` or `/tmp/screenrec-<uid>/recorder.sock` |
/// | macOS | `$TMPDIR/screenrec/recorder.sock` |
/// | Windows | `\\.\pipe\screenrec-recorder` |
///
/// `SCREENREC_CHANNEL` overrides all of the above.
pub fn channel_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CHANNEL_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "linux")]
    {
        match std::env::var_os("XDG_RUNTIME_DIR").filter(|p| !p.is_empty()) {
            Some(runtime_dir) => PathBuf::from(runtime_dir)
                .join("screenrec")
                .join("recorder.sock"),
            None => PathBuf::from(format!("/tmp/screenrec-{}", unsafe { libc::getuid() }))
                .join("recorder.sock"),
        }
    }

    #[cfg(target_os = "macos")]
    {
        let tmpdir = std::env::var("TMPDIR").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(tmpdir).join("screenrec").join("recorder.sock")
    }

    #[cfg(target_os = "windows")]
    {
        PathBuf::from(r"\\.\pipe\screenrec-recorder")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        std::env::temp_dir().join("screenrec").join("recorder.sock")
    }
}

/// Read one `\n`-terminated control line with size validation.
///
/// The terminator (and a preceding `\r`, if any) is stripped. End of stream
/// before any byte, or in the middle of a line, is `ConnectionClosed`.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, IpcError> {
    let mut buf = Vec::new();
    // Bound the read before allocating past the limit
    let limit = (MAX_MESSAGE_SIZE + 1) as u64;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(IpcError::ConnectionClosed);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(IpcError::MessageTooLarge {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        return Err(IpcError::ConnectionClosed);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|e| IpcError::Malformed(e.to_string()))
}

/// Write one control line followed by `\n`.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), IpcError> {
    if line.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge {
            size: line.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    if line.contains('\n') {
        return Err(IpcError::Malformed("line contains a terminator".to_string()));
    }

    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_line_roundtrip() {
        let mut buf = Vec::new();
        write_line(&mut buf, "0 10 60 0 0").await.unwrap();
        write_line(&mut buf, "3").await.unwrap();
        assert_eq!(buf, b"0 10 60 0 0\n3\n");

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_line(&mut cursor).await.unwrap(), "0 10 60 0 0");
        assert_eq!(read_line(&mut cursor).await.unwrap(), "3");
        assert!(matches!(
            read_line(&mut cursor).await,
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_strips_carriage_return() {
        let mut cursor = Cursor::new(b"1 recording not started\r\n".to_vec());
        assert_eq!(
            read_line(&mut cursor).await.unwrap(),
            "1 recording not started"
        );
    }

    #[tokio::test]
    async fn test_partial_line_is_connection_closed() {
        let mut cursor = Cursor::new(b"0 10".to_vec());
        assert!(matches!(
            read_line(&mut cursor).await,
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let oversized = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let mut buf = Vec::new();
        let result = write_line(&mut buf, &oversized).await;
        assert!(matches!(result, Err(IpcError::MessageTooLarge { .. })));

        let mut cursor = Cursor::new(format!("{oversized}\n").into_bytes());
        let result = read_line(&mut cursor).await;
        assert!(matches!(result, Err(IpcError::MessageTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_rejects_embedded_terminator() {
        let mut buf = Vec::new();
        let result = write_line(&mut buf, "1 /tmp\n4").await;
        assert!(matches!(result, Err(IpcError::Malformed(_))));
        assert!(buf.is_empty());
    }
}
