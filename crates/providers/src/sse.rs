//! SSE plumbing for streaming upstream responses.
//!
//! Upstream bodies arrive as a line-oriented event stream: lines
//! beginning with `data: ` carry a JSON chunk, the sentinel
//! `data: [DONE]` ends the stream, and everything else (blank lines,
//! `event:`/`id:` fields, comments) is ignored. Bytes are buffered so a
//! payload split across TCP reads is reassembled before parsing.

use mr_domain::error::{Error, Result};
use mr_domain::stream::{BoxStream, ChunkEvent};

use crate::util::from_reqwest;
use crate::wire::parse_chunk;

/// Pull complete `data:` payloads out of the buffer.
///
/// Consumed lines are drained in place; a trailing partial line stays in
/// the buffer for the next read.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() {
                payloads.push(data.to_string());
            }
        }
    }

    payloads
}

/// Bridge an upstream SSE `reqwest::Response` into a stream of
/// [`ChunkEvent`]s.
///
/// Terminates on `[DONE]`, on upstream close (a `Done` event is
/// synthesized so downstream always sees a terminator), or on the first
/// error. Malformed chunk JSON is a provider error with reason
/// `invalid_response`.
pub(crate) fn chunk_stream(
    response: reqwest::Response,
    provider: String,
) -> BoxStream<'static, Result<ChunkEvent>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        'read: loop {
            let bytes = match response.chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break 'read,
                Err(e) => {
                    yield Err(from_reqwest(&provider, e));
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            for data in drain_data_lines(&mut buffer) {
                if data == "[DONE]" {
                    yield Ok(ChunkEvent::Done);
                    return;
                }
                match parse_chunk(&data) {
                    Ok(chunk) => yield Ok(ChunkEvent::Chunk(chunk)),
                    Err(e) => {
                        yield Err(Error::Provider {
                            provider: provider.clone(),
                            status: None,
                            message: format!("invalid_response: {e}"),
                        });
                        return;
                    }
                }
            }
        }

        // Body closed without a [DONE] sentinel. Flush any buffered
        // partial line, then synthesize the terminator.
        if !buffer.trim().is_empty() {
            buffer.push('\n');
            for data in drain_data_lines(&mut buffer) {
                if data == "[DONE]" {
                    yield Ok(ChunkEvent::Done);
                    return;
                }
                if let Ok(chunk) = parse_chunk(&data) {
                    yield Ok(ChunkEvent::Chunk(chunk));
                }
            }
        }
        yield Ok(ChunkEvent::Done);
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_single_payload() {
        let mut buf = String::from("data: {\"a\":1}\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"a\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drains_multiple_payloads() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["first", "second"]);
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut buf = String::from("data: complete\ndata: parti");
        assert_eq!(drain_data_lines(&mut buf), vec!["complete"]);
        assert_eq!(buf, "data: parti");

        buf.push_str("al\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["partial"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut buf = String::from("event: ping\nid: 7\n: comment\ndata: payload\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut buf = String::from("data: {\"x\":2}\r\n\r\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"x\":2}"]);
    }

    #[test]
    fn done_sentinel_is_preserved() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn skips_empty_data_lines() {
        let mut buf = String::from("data: \n\n");
        assert!(drain_data_lines(&mut buf).is_empty());
        assert!(buf.is_empty());
    }
}
