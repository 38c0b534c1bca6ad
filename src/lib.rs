//! # gpt-tts
//!
//! An autoregressive transformer that models text tokens and discretized
//! mel-spectrogram tokens in one causal sequence, plus the unsupervised audio
//! dataset used to prepare training clips.
//!
//! ## Features
//!
//! - Teacher-forced training pass returning text/mel losses and VQ-ready mel codes
//! - Greedy autoregressive mel code generation, with optional KV-cache
//! - Explicit model registry driven by a YAML config
//! - Fixed-length clip loading with resampled views and similar-clip sampling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candle_core::{Device, Tensor};
//! use gpt_tts::text::text_to_sequence;
//! use gpt_tts::{ModelConfig, ModelRegistry};
//!
//! let device = Device::Cpu;
//! let config = ModelConfig::load("config.yaml")?;
//! let model = ModelRegistry::with_defaults().load(&config.network, "gpt_tts.safetensors", &device)?;
//! let ids = text_to_sequence("Hello, world!");
//! let text = Tensor::from_vec(ids.clone(), (1, ids.len()), &device)?;
//! let mel_codes = model.inference(&text)?;
//! ```

pub mod audio;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod text;
pub mod utils;

// Re-exports for convenience
pub use config::ModelConfig;
pub use error::GptTtsError;
pub use models::gpt::{GptTts, GptTtsOptions, TrainingOutput};
pub use models::ModelRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
