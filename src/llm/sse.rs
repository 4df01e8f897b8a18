// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Server-sent event framing
//!
//! [`SseDecoder`] turns arbitrarily split byte chunks into `data:` payload
//! strings. Lines are reassembled as bytes, so a chunk boundary inside a
//! multi-byte character or inside the `data:` prefix is harmless.

use futures::{Stream, StreamExt};

use crate::error::{Result, RunGptError};

const DATA_PREFIX: &[u8] = b"data:";

/// Incremental decoder for `text/event-stream` bodies.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete
            .split(|&b| b == b'\n')
            .filter_map(parse_data_line)
            .collect()
    }

    /// Flush a trailing `data:` line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        parse_data_line(&rest)
    }

    /// Bytes held while waiting for the end of a line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_data_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let value = line.strip_prefix(DATA_PREFIX)?;
    let value = value.strip_prefix(b" ").unwrap_or(value);
    Some(String::from_utf8_lossy(value).into_owned())
}

/// Adapt a byte-chunk stream into a stream of data payloads.
///
/// Upstream errors are passed through and end the stream.
pub fn decode_frames<S, B, E>(chunks: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<RunGptError>,
{
    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Into::<RunGptError>::into)?;
            for payload in decoder.push(chunk.as_ref()) {
                tracing::trace!(target: "rungpt.llm.sse", payload = %payload, "frame");
                yield payload;
            }
        }
        if let Some(payload) = decoder.finish() {
            tracing::trace!(target: "rungpt.llm.sse", payload = %payload, "flushed frame");
            yield payload;
        }
    }
}

/// Encode one payload as an SSE event.
pub fn encode_data(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = SseDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_decodes_data_lines() {
        let body = b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n";
        assert_eq!(decode_all(&[body]), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_prefix_without_space() {
        assert_eq!(decode_all(&[b"data:x\n"]), vec!["x"]);
        // Only one space is part of the prefix.
        assert_eq!(decode_all(&[b"data:  x\n"]), vec![" x"]);
    }

    #[test]
    fn test_ignores_other_fields() {
        let body = b": keep-alive\nevent: message\nid: 4\ndata: kept\nretry: 10\n";
        assert_eq!(decode_all(&[body]), vec!["kept"]);
    }

    #[test]
    fn test_crlf_lines() {
        assert_eq!(decode_all(&[b"data: one\r\n\r\ndata: two\r\n"]), vec!["one", "two"]);
    }

    #[test]
    fn test_split_inside_prefix() {
        assert_eq!(decode_all(&[b"da", b"ta", b": hi\n"]), vec!["hi"]);
    }

    #[test]
    fn test_holds_incomplete_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: par").is_empty());
        assert_eq!(decoder.pending(), 9);
        assert_eq!(decoder.push(b"tial\n"), vec!["partial"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_flush_unterminated_data_line() {
        assert_eq!(decode_all(&[b"data: a\ndata: [DONE]"]), vec!["a", "[DONE]"]);
    }

    #[test]
    fn test_flush_discards_non_data_tail() {
        assert_eq!(decode_all(&[b"data: a\nevent: x"]), vec!["a"]);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let body = "data: héllo wörld\n".as_bytes();
        assert_eq!(decode_all(&[&body[..8], &body[8..]]), vec!["héllo wörld"]);
    }

    #[test]
    fn test_encode_data() {
        assert_eq!(encode_data("{\"index\":0}"), "data: {\"index\":0}\n\n");
    }

    #[tokio::test]
    async fn test_decode_frames_stream() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, RunGptError>(b"data: a\nda".to_vec()),
            Ok(b"ta: b\n".to_vec()),
            Ok(b"data: c".to_vec()),
        ]);
        let payloads: Vec<String> = decode_frames(chunks)
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(payloads, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_decode_frames_propagates_error() {
        let chunks = futures::stream::iter(vec![
            Ok(b"data: a\n".to_vec()),
            Err(RunGptError::InvalidInput("reset".to_string())),
            Ok(b"data: b\n".to_vec()),
        ]);
        let results: Vec<Result<String>> = decode_frames(chunks).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "a");
        assert!(results[1].is_err());
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_payloads(
            payloads in proptest::collection::vec("[a-zA-Z0-9 {}\":,é€]{0,24}", 0..6),
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let body: String = payloads
                .iter()
                .map(|p| format!("data: {}\n\n", p))
                .collect();
            let bytes = body.as_bytes();

            let whole = decode_all(&[bytes]);

            let mut offsets: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
            offsets.sort_unstable();
            offsets.dedup();
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for offset in offsets {
                chunks.push(&bytes[start..offset]);
                start = offset;
            }
            chunks.push(&bytes[start..]);

            prop_assert_eq!(decode_all(&chunks), whole.clone());
            prop_assert_eq!(whole, payloads);
        }

        #[test]
        fn prop_byte_at_a_time_matches_whole(payload in "[ -~]{0,40}") {
            let body = format!("data: {}\n", payload);
            let bytes = body.as_bytes();
            let singles: Vec<&[u8]> = bytes.chunks(1).collect();
            prop_assert_eq!(decode_all(&singles), decode_all(&[bytes]));
        }
    }
}
