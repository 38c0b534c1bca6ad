//! YAML configuration
//!
//! ```yaml
//! network:
//!   which_model: gpt_tts
//!   kwargs: { layers: 8, model_dim: 512, heads: 8 }
//! dataset:
//!   path: [/data/audio/books0]
//!   cache_path: /data/audio/books0-cache.json
//!   sampling_rate: 22050
//!   pad_to_samples: 40960
//!   extra_samples: 4
//!   resample_clip: true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub dataset: Option<DatasetConfig>,
}

impl ModelConfig {
    /// Load and parse a YAML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse config {:?}", path))
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Which registered model to build and with what constructor options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub which_model: String,
    /// Passed verbatim to the model factory
    #[serde(default)]
    pub kwargs: Mapping,
}

/// Options of the unsupervised audio dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Directories (or single files) to scan for audio
    pub path: Vec<PathBuf>,
    /// JSON list of audio paths; written on first scan, read afterwards
    pub cache_path: PathBuf,
    /// Text files listing paths to leave out, one per line
    #[serde(default)]
    pub exclusions: Vec<PathBuf>,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
    #[serde(default)]
    pub pad_to_seconds: Option<f32>,
    /// Takes precedence over `pad_to_seconds`
    #[serde(default)]
    pub pad_to_samples: Option<usize>,
    /// Clips must be strictly longer than this many samples
    #[serde(default)]
    pub min_length: usize,
    /// Also emit a second, differently cropped view of each clip
    #[serde(default)]
    pub resample_clip: bool,
    /// Number of similar clips to attach to each sample
    #[serde(default)]
    pub extra_samples: usize,
    #[serde(default = "default_extra_sample_length")]
    pub extra_sample_length: usize,
    #[serde(default = "default_true")]
    pub debug_loading_failures: bool,
    /// How many following indices to try when a file fails to load
    #[serde(default = "default_max_load_retries")]
    pub max_load_retries: usize,
    /// Seed for cropping / similar-clip sampling; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_sampling_rate() -> u32 {
    22050
}

fn default_extra_sample_length() -> usize {
    44000
}

fn default_true() -> bool {
    true
}

fn default_max_load_retries() -> usize {
    32
}

impl DatasetConfig {
    /// Minimal config for `paths`, everything else at its default
    pub fn new(path: Vec<PathBuf>, cache_path: PathBuf) -> Self {
        Self {
            path,
            cache_path,
            exclusions: Vec::new(),
            sampling_rate: default_sampling_rate(),
            pad_to_seconds: None,
            pad_to_samples: None,
            min_length: 0,
            resample_clip: false,
            extra_samples: 0,
            extra_sample_length: default_extra_sample_length(),
            debug_loading_failures: true,
            max_load_retries: default_max_load_retries(),
            seed: None,
        }
    }

    /// Fixed clip length in samples, if clips are padded/cropped
    pub fn pad_to(&self) -> Option<usize> {
        self.pad_to_samples.or_else(|| {
            self.pad_to_seconds
                .map(|seconds| (seconds * self.sampling_rate as f32).round() as usize)
        })
    }
}
