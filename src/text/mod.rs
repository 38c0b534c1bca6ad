//! Text symbol table
//!
//! - Fixed symbol inventory (padding, punctuation, letters, ARPAbet)
//! - Character / `{ARPAbet}` text to symbol id conversion

mod sequence;
mod symbols;

pub use sequence::{sequence_to_text, text_to_sequence};
pub use symbols::{symbol_id, SYMBOLS, NUMBER_SYMBOLS};
