//! Wire-Level Stream Parsing
//!
//! Shared line buffering for the two streaming formats providers speak:
//! Server-Sent Events (`data: ` lines) and chunked JSON lines (NDJSON).
//!
//! Both parsers:
//! - buffer incoming bytes and split on newlines, so payloads split
//!   across HTTP chunks reassemble correctly
//! - surface transport errors as `Err` items (the normalizer turns them
//!   into terminal fault events) and then end the stream
//! - never buffer more than the bytes of one in-flight line beyond what
//!   the consumer has pulled - backpressure reaches the connection

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::types::{ForgeError, Result};

/// Parse SSE lines from a byte stream and yield JSON data strings.
///
/// Extracts `data: ` payloads, skips comments, empty lines, and the
/// `[DONE]` marker. Any remaining buffer content at stream end is
/// processed as a final line.
pub fn sse_data_stream<S>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    line_stream(byte_stream, |line| extract_sse_data(line))
}

/// Parse chunked JSON lines (NDJSON) from a byte stream.
///
/// Yields every non-empty line verbatim for provider-specific decoding.
pub fn json_line_stream<S>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    line_stream(byte_stream, |line| {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Safely decode a JSON payload from a wire line.
///
/// A single malformed chunk is skipped with a warning rather than
/// failing the whole stream; subsequent chunks parse normally.
pub fn decode_json<T: serde::de::DeserializeOwned>(data: &str, provider: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                provider = provider,
                error = %e,
                "Skipping malformed stream chunk"
            );
            None
        }
    }
}

// =============================================================================
// Internal
// =============================================================================

/// Generic line splitter over a chunked byte stream.
///
/// `extract` maps a complete line to an item, or `None` to skip it.
fn line_stream<S, F>(byte_stream: S, extract: F) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    // Pin here so callers can hand over reqwest's stream unchanged
    futures::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(8192), false, extract),
        move |(mut stream, mut buffer, done, extract)| async move {
            if done {
                return None;
            }

            loop {
                // Check buffer for a complete line
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let item = match std::str::from_utf8(&line_bytes) {
                        Ok(line) => extract(line),
                        Err(_) => continue, // skip invalid UTF-8 lines
                    };

                    if let Some(item) = item {
                        return Some((Ok(item), (stream, buffer, false, extract)));
                    }
                    continue;
                }

                // Read next chunk
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        // Transport fault ends the stream; the caller
                        // decides what to do with partial output.
                        return Some((Err(ForgeError::Http(e)), (stream, buffer, true, extract)));
                    }
                    None => {
                        // Stream ended - process remaining buffer
                        if !buffer.is_empty() {
                            let line = match std::str::from_utf8(&buffer) {
                                Ok(s) => s.trim().to_string(),
                                Err(_) => return None,
                            };
                            buffer.clear();
                            if let Some(item) = extract(&line) {
                                return Some((Ok(item), (stream, buffer, true, extract)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract data payload from an SSE line.
///
/// Returns `Some(data)` for valid data lines, `None` for comments,
/// empty lines, non-data fields, and `[DONE]` markers.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?;
    let data = data.trim();

    if data == "[DONE]" || data.is_empty() {
        return None;
    }

    Some(data.to_string())
}

// =============================================================================
// Tests
// =============================================================================
