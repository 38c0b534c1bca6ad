//! Neural network models
//!
//! - GPT-TTS joint text/mel transformer
//! - Name -> constructor registry used by the configuration layer

pub mod gpt;
pub mod registry;

// Re-exports
pub use gpt::GptTts;
pub use registry::{ModelFactory, ModelRegistry};
