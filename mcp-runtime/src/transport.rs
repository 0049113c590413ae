use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a `Content-Length` framed payload.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// How a message was delimited on the wire. Replies reuse the framing of
/// the request they answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line
    Line,
    /// `Content-Length` headers, blank line, then the payload
    ContentLength,
}

#[derive(Debug)]
pub struct IncomingMessage {
    pub framing: Framing,
    /// Parse failures are surfaced per message so the session can answer
    /// with a JSON-RPC parse error and keep going.
    pub payload: Result<Value, serde_json::Error>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to read MCP message: {0}")]
    Read(#[source] std::io::Error),
    #[error("Failed to write MCP response: {0}")]
    Write(#[source] std::io::Error),
}

pub async fn read_message<R>(reader: &mut R) -> Result<Option<IncomingMessage>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !saw_header {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !saw_header {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Ok(Some(IncomingMessage {
                    framing: Framing::Line,
                    payload: serde_json::from_str(trimmed),
                }));
            }
        }

        if trimmed.is_empty() {
            break;
        }
        saw_header = true;

        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    if content_length > MAX_MESSAGE_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds limit of {MAX_MESSAGE_BYTES} bytes"),
        ));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(IncomingMessage {
        framing: Framing::ContentLength,
        payload: serde_json::from_slice(&payload),
    }))
}

pub async fn write_message<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
