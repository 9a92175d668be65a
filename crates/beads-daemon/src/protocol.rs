//! Wire format for the daemon's RPC transport.
//!
//! Each request and response is a JSON object preceded by a `Content-Length`
//! header, the same framing
//! `examples/dwalleck-rivets/crates/tethys/src/lsp/transport.rs` uses for its
//! stdio-based LSP client, adapted here to read and write over a
//! [`std::os::unix::net::UnixStream`] instead of a child process's pipes.

use std::io::{BufRead, BufReader, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, Result};

/// One RPC request: an operation name, its arguments, and the acting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub op: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub actor: String,
}

/// The wire shape of an error, carrying the closed §7 taxonomy tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
}

/// One RPC response: either `data` on success, or `error` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorEnvelope {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }
}

/// Writes one framed message: `Content-Length: N\r\n\r\n<json body>`.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message).map_err(|e| DaemonError::Protocol(e.to_string()))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one framed message from a buffered reader, blocking until the
/// header and body have both arrived or the connection closes.
pub fn read_message<R: BufRead, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<Option<T>> {
    let content_length = match read_content_length(reader)? {
        Some(len) => len,
        None => return Ok(None),
    };
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;
    let value = serde_json::from_slice(&body).map_err(|e| DaemonError::Protocol(e.to_string()))?;
    Ok(Some(value))
}

fn read_content_length<R: BufRead>(reader: &mut R) -> Result<Option<usize>> {
    let mut content_length = None;
    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Ok(None); // connection closed before a full header arrived
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }
    content_length
        .map(Some)
        .ok_or_else(|| DaemonError::Protocol("missing Content-Length header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn request_roundtrips_through_framing() {
        let request = Request {
            op: "get_issue".to_string(),
            args: serde_json::json!({"id": "bd-abc1"}),
            actor: "alice".to_string(),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &request).unwrap();

        let mut reader = BufReader::new(Cursor::new(buf));
        let parsed: Request = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(parsed.op, "get_issue");
        assert_eq!(parsed.actor, "alice");
    }

    #[test]
    fn missing_header_is_a_protocol_error() {
        let mut reader = BufReader::new(Cursor::new(b"not a header\r\n\r\n{}".to_vec()));
        let err = read_content_length(&mut reader).unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)));
    }

    #[test]
    fn closed_connection_before_header_reads_as_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::<u8>::new()));
        let result: Option<Request> = read_message(&mut reader).unwrap();
        assert!(result.is_none());
    }
}
