//! Streaming-response plumbing: byte chunks → lines → reply text.

pub mod assembler;
pub mod decoder;

pub use assembler::{DATA_PREFIX, DONE_SENTINEL, DeltaAssembler, Fold, LineEvent, classify_line};
pub use decoder::{LineDecoder, decode_lines};
