//! Unsupervised audio dataset
//!
//! Each sample is one audio file, optionally padded/cropped to a fixed
//! length, with an optional second crop of the same file ("resampled clip")
//! and optional similar clips from the same directory ("alt clips").

use anyhow::{anyhow, bail, Result};
use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use super::paths::load_paths_from_cache;
use super::similar::{load_similar_clips, SimilarClipOptions};
use crate::audio::load_audio;
use crate::config::DatasetConfig;

/// One dataset item
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// (1, pad_to) when padding is configured, else (1, clip_length)
    pub clip: Tensor,
    /// Length of the file in samples, before padding/cropping
    pub clip_length: usize,
    pub path: PathBuf,
    /// Second crop of the same file, present when `resample_clip` is set
    pub resampled_clip: Option<Tensor>,
    /// Similar clips, present when `extra_samples > 0`
    pub alt_clips: Option<Tensor>,
}

/// Dataset over every audio file found under the configured paths
pub struct UnsupervisedAudioDataset {
    audiopaths: Vec<PathBuf>,
    config: DatasetConfig,
    pad_to: Option<usize>,
    rng: Mutex<StdRng>,
}

impl UnsupervisedAudioDataset {
    /// Discover files (through the path cache) and build the dataset
    pub fn new(config: DatasetConfig) -> Result<Self> {
        let audiopaths = load_paths_from_cache(&config.path, &config.cache_path, &config.exclusions)?;
        info!("Unsupervised audio dataset with {} files", audiopaths.len());
        Ok(Self::from_paths(audiopaths, config))
    }

    /// Dataset over an explicit file list; `config.path` and `cache_path` are ignored
    pub fn from_paths(audiopaths: Vec<PathBuf>, config: DatasetConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            audiopaths,
            pad_to: config.pad_to(),
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.audiopaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audiopaths.is_empty()
    }

    /// Load item `index`
    ///
    /// A file that fails to load is skipped in favour of the next index
    /// (wrapping around), at most `max_load_retries` times.
    pub fn get(&self, index: usize) -> Result<AudioSample> {
        if self.audiopaths.is_empty() {
            bail!("Dataset is empty");
        }

        let mut rng = {
            let mut shared = self
                .rng
                .lock()
                .map_err(|_| anyhow!("Dataset RNG lock poisoned"))?;
            StdRng::from_rng(&mut *shared)?
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_load_retries {
            let i = (index + attempt) % self.audiopaths.len();
            match self.load_item(i, &mut rng) {
                Ok(sample) => return Ok(sample),
                Err(e) => {
                    if self.config.debug_loading_failures {
                        warn!("Error loading audio for file {:?}: {:#}", self.audiopaths[i], e);
                    }
                    last_error = Some(e);
                }
            }
        }

        let e = last_error.unwrap_or_else(|| anyhow!("no attempts made"));
        Err(e.context(format!(
            "Failed to load any of {} files starting at index {}",
            self.config.max_load_retries + 1,
            index
        )))
    }

    fn get_audio_for_index(&self, index: usize) -> Result<(Tensor, &Path)> {
        let path = self.audiopaths[index].as_path();
        let audio = load_audio(path, self.config.sampling_rate)?;
        let len = audio.dim(1)?;
        if len <= self.config.min_length {
            bail!(
                "{:?} has {} samples, need more than {}",
                path,
                len,
                self.config.min_length
            );
        }
        Ok((audio, path))
    }

    fn get_related_audio_for_index(&self, index: usize, rng: &mut StdRng) -> Result<Option<Tensor>> {
        if self.config.extra_samples == 0 {
            return Ok(None);
        }
        let options = SimilarClipOptions {
            n: self.config.extra_samples,
            ..Default::default()
        };
        load_similar_clips(
            &self.audiopaths[index],
            self.config.extra_sample_length,
            self.config.sampling_rate,
            options,
            rng,
        )
        .map(Some)
    }

    fn load_item(&self, index: usize, rng: &mut StdRng) -> Result<AudioSample> {
        let (audio, path) = self.get_audio_for_index(index)?;
        let alt_clips = self.get_related_audio_for_index(index, rng)?;
        let clip_length = audio.dim(1)?;

        // Skews push the two crops of a resampled pair towards opposite ends.
        let mut skews: Vec<i64> = if self.config.resample_clip {
            vec![-1, 1]
        } else {
            vec![0]
        };
        skews.shuffle(rng);

        let mut clips = skews
            .iter()
            .map(|&skew| self.crop_clip(&audio, skew, rng))
            .collect::<Result<Vec<_>>>()?
            .into_iter();

        let clip = clips.next().ok_or_else(|| anyhow!("no clip produced"))?;
        let resampled_clip = clips.next();

        Ok(AudioSample {
            clip,
            clip_length,
            path: path.to_path_buf(),
            resampled_clip,
            alt_clips,
        })
    }

    fn crop_clip(&self, audio: &Tensor, skew: i64, rng: &mut StdRng) -> Result<Tensor> {
        let Some(pad_to) = self.pad_to else {
            return Ok(audio.clone());
        };
        let len = audio.dim(1)?;
        if len <= pad_to {
            return Ok(audio.pad_with_zeros(1, 0, pad_to - len)?);
        }
        let gap = (len - pad_to) as i64;
        let start = skewed_start(rng.gen_range(0..gap), skew, gap);
        Ok(audio.narrow(1, start, pad_to)?)
    }
}

/// `min(max(base + floor(skew * gap / 2), 0), gap - 1)`
fn skewed_start(base: i64, skew: i64, gap: i64) -> usize {
    (base + (skew * gap).div_euclid(2)).clamp(0, gap - 1) as usize
}
