//! GPT-style autoregressive text-to-mel-token model
//!
//! - Causal transformer backbone with optional KV-cache
//! - GptTts: text/mel embeddings, dual output heads, training loss
//! - Greedy autoregressive mel code generation

mod gpt_tts;
mod generation;
mod kv_cache;
mod transformer;

pub use gpt_tts::{
    GptTts, GptTtsOptions, TrainingOutput, DEFAULT_MAX_MEL_FRAMES, MAX_SYMBOLS_PER_PHRASE,
    MEL_CODE_LIMIT, MEL_DICTIONARY_SIZE, MEL_START_TOKEN, MEL_STOP_TOKEN, NUMBER_TEXT_TOKENS,
};
pub use generation::{generate, DecodeStrategy, Generation, GenerationConfig};
pub use kv_cache::{KVCache, LayerCache};
pub use transformer::{Transformer, TransformerConfig};
