//! Audio processing modules
//!
//! - WAV loading to mono f32 at a requested sample rate
//! - Sample rate conversion (rubato sinc resampler)
//! - WAV output for inspecting dataset clips

mod loader;
mod output;
mod resampler;

pub use loader::{is_supported_audio, load_audio, AudioLoader};
pub use output::AudioOutput;
pub use resampler::Resampler;
