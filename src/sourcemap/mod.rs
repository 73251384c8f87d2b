//! Source map v3 model and lookup.
//!
//! - `model` - serde representation, lossless on re-serialization
//! - `vlq` - base64 VLQ decoding of the `mappings` field
//! - `consumer` - generated → original position lookup

mod consumer;
mod model;
mod vlq;

pub use consumer::{OriginalPosition, SourceMapConsumer};
pub use model::SourceMap;

use thiserror::Error;

/// A source map that cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceMapError {
    #[error("invalid base64 character `{0}` in mappings")]
    InvalidBase64(char),

    #[error("VLQ value truncated at end of segment")]
    Truncated,

    #[error("VLQ value overflows 32 bits")]
    Overflow,

    #[error("segment has {0} fields, expected 1, 4 or 5")]
    SegmentArity(usize),

    #[error("segment refers to source #{0}, map has {1}")]
    SourceOutOfRange(u32, usize),

    #[error("segment refers to name #{0}, map has {1}")]
    NameOutOfRange(u32, usize),

    #[error("negative position in mappings")]
    Negative,
}
