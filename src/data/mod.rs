//! Training data
//!
//! - Audio path discovery with a JSON path cache and exclusion lists
//! - Similar-clip sampling driven by per-directory `similarities.json`
//! - UnsupervisedAudioDataset: fixed-length clips, resampled views, alt clips

mod dataset;
mod paths;
mod similar;

pub use dataset::{AudioSample, UnsupervisedAudioDataset};
pub use paths::{find_audio_files, load_paths_from_cache};
pub use similar::{load_similar_clips, pad_or_crop, SimilarClipOptions, SIMILARITIES_FILE};
