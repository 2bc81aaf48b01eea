//! Line decoder for chunked response bodies.
//!
//! Chunks arrive with arbitrary boundaries: a line, the `data: ` prefix or a
//! single UTF-8 character may be split across two reads. The decoder keeps
//! the undecoded byte tail and the incomplete text line between pushes so the
//! produced lines do not depend on how the body was cut.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful bytes-to-lines decoder. One instance per exchange.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes of a UTF-8 sequence cut by a chunk boundary.
    pending_bytes: Vec<u8>,
    /// Text after the last line feed.
    carry: String,
}

impl LineDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the lines it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_into_carry(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.find('\n') {
            let rest = self.carry.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.carry, rest);
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Incomplete text held back (neither emitted nor discarded yet).
    #[must_use]
    pub fn carry(&self) -> &str {
        &self.carry
    }

    /// End of body: the unterminated tail is dropped, never emitted.
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(self) -> usize {
        self.carry.len() + self.pending_bytes.len()
    }

    fn decode_into_carry(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.carry.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    self.carry.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            self.carry.push(REPLACEMENT);
                            input = &rest[bad..];
                        }
                        None => {
                            self.pending_bytes = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Turn a stream of byte chunks into a lazy stream of decoded lines.
///
/// A source error is forwarded immediately and ends the stream; lines
/// already yielded stay valid.
pub fn decode_lines<S, B, E>(source: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (source, LineDecoder::new(), VecDeque::<String>::new(), false);
    futures::stream::unfold(state, |(mut source, mut decoder, mut ready, mut done)| async move {
        loop {
            if let Some(line) = ready.pop_front() {
                return Some((Ok(line), (source, decoder, ready, done)));
            }
            if done {
                return None;
            }
            match source.next().await {
                Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                Some(Err(err)) => {
                    done = true;
                    return Some((Err(err), (source, decoder, ready, done)));
                }
                None => {
                    let dropped = std::mem::take(&mut decoder).finish();
                    if dropped > 0 {
                        tracing::debug!("Discarded {dropped} bytes of unterminated tail");
                    }
                    return None;
                }
            }
        }
    })
}
