//! Precondition errors raised by the model and dataset layers
//!
//! Everything else in the crate propagates through `anyhow`; these variants
//! exist so callers can tell a bad input apart from a backend failure with
//! `err.downcast_ref::<GptTtsError>()`.

use thiserror::Error;

/// Input contract violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GptTtsError {
    /// A token id fell outside its vocabulary
    #[error("{vocab} token id {id} out of range (vocabulary size {size})")]
    TokenOutOfRange {
        vocab: &'static str,
        id: u32,
        size: usize,
    },

    /// A sequence exceeded the number of positions the model was built for
    #[error("{what} length {len} exceeds maximum {max}")]
    SequenceTooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Teacher forcing needs at least one input/target pair
    #[error("{what} length {len} is too short, need at least {min}")]
    SequenceTooShort {
        what: &'static str,
        len: usize,
        min: usize,
    },

    /// Model or decoding options that cannot describe a working model
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Tensor shapes disagree with each other
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Entry point that exists in the API but has no implementation
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}
