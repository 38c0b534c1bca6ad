//! Similar-clip sampling
//!
//! A directory may hold a `similarities.json` mapping each file name to the
//! names of acoustically similar files in the same directory:
//!
//! ```json
//! { "a.wav": ["b.wav", "c.wav"], "b.wav": ["a.wav"] }
//! ```

use anyhow::{bail, Context, Result};
use candle_core::Tensor;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::paths::find_audio_files;
use crate::audio::load_audio;

/// File name looked up next to each clip
pub const SIMILARITIES_FILE: &str = "similarities.json";

/// Upper bound on candidates; more means the "similar" list is not really that
const MAX_CANDIDATES: usize = 50_000;

/// How [`load_similar_clips`] picks candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarClipOptions {
    /// Number of clips to draw (with replacement)
    pub n: usize,
    /// Whether the clip itself may be drawn
    pub include_self: bool,
    /// With no similarity entry, use the clip itself rather than its whole directory
    pub fallback_to_self: bool,
}

impl Default for SimilarClipOptions {
    fn default() -> Self {
        Self {
            n: 3,
            include_self: true,
            fallback_to_self: true,
        }
    }
}

/// Pad with trailing zeros or randomly crop a (1, samples) clip to `length`
pub fn pad_or_crop<R: Rng + ?Sized>(clip: &Tensor, length: usize, rng: &mut R) -> Result<Tensor> {
    let len = clip.dim(1)?;
    if len < length {
        Ok(clip.pad_with_zeros(1, 0, length - len)?)
    } else if len > length {
        let start = rng.gen_range(0..=len - length);
        Ok(clip.narrow(1, start, length)?)
    } else {
        Ok(clip.clone())
    }
}

fn similar_candidates(path: &Path, fallback_to_self: bool) -> Result<Vec<PathBuf>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let sim_path = dir.join(SIMILARITIES_FILE);
    let mut candidates = Vec::new();

    if sim_path.exists() {
        let content = fs::read_to_string(&sim_path)
            .with_context(|| format!("Failed to read {:?}", sim_path))?;
        let similarities: HashMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid similarity table {:?}", sim_path))?;
        let fname = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or_default();
        match similarities.get(fname) {
            Some(names) => candidates.extend(names.iter().map(|name| dir.join(name))),
            None => warn!("Similarities list found for {:?} but {} was not in that list.", path, fname),
        }
    }

    if candidates.is_empty() {
        candidates = if fallback_to_self {
            vec![path.to_path_buf()]
        } else {
            find_audio_files(dir)?
        };
    }
    Ok(candidates)
}

/// Draw `options.n` clips similar to `path`, each padded/cropped to `sample_length`
///
/// Returns (n, 1, sample_length) when n > 1, otherwise (1, sample_length).
pub fn load_similar_clips<R: Rng + ?Sized>(
    path: &Path,
    sample_length: usize,
    sample_rate: u32,
    options: SimilarClipOptions,
    rng: &mut R,
) -> Result<Tensor> {
    if options.n == 0 {
        bail!("Asked for zero similar clips for {:?}", path);
    }

    let mut candidates = similar_candidates(path, options.fallback_to_self)?;
    if candidates.len() >= MAX_CANDIDATES {
        bail!(
            "{} similarity candidates for {:?}; these are unlikely to be related",
            candidates.len(),
            path
        );
    }
    if !options.include_self {
        candidates.retain(|c| c != path);
    }

    let mut clips = Vec::with_capacity(options.n);
    for _ in 0..options.n {
        let Some(candidate) = candidates.choose(rng) else {
            bail!("No conditioning candidates found for {:?}", path);
        };
        let clip = load_audio(candidate, sample_rate)
            .with_context(|| format!("Failed to load similar clip {:?}", candidate))?;
        clips.push(pad_or_crop(&clip, sample_length, rng)?);
    }

    if clips.len() > 1 {
        Ok(Tensor::stack(&clips, 0)?)
    } else {
        Ok(clips.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn write_wav(path: &Path, len: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..len {
            writer.write_sample(if i % 2 == 0 { 1000i16 } else { -1000 }).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_pad_or_crop() {
        let mut rng = StdRng::seed_from_u64(0);
        let clip = Tensor::new(&[[1f32, 2., 3.]], &Device::Cpu).unwrap();

        let padded: Vec<Vec<f32>> = pad_or_crop(&clip, 5, &mut rng).unwrap().to_vec2().unwrap();
        assert_eq!(padded, vec![vec![1., 2., 3., 0., 0.]]);

        let cropped = pad_or_crop(&clip, 2, &mut rng).unwrap();
        assert_eq!(cropped.dims2().unwrap(), (1, 2));
    }

    #[test]
    fn test_fallback_to_self_single_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 100);

        let mut rng = StdRng::seed_from_u64(1);
        let options = SimilarClipOptions {
            n: 1,
            ..Default::default()
        };
        let clips = load_similar_clips(&path, 64, 8000, options, &mut rng).unwrap();
        assert_eq!(clips.dims2().unwrap(), (1, 64));
    }

    #[test]
    fn test_similarity_table_used_and_stacked() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 50);
        write_wav(&b, 200);
        fs::write(dir.path().join(SIMILARITIES_FILE), r#"{"a.wav": ["b.wav"]}"#).unwrap();

        let mut rng = StdRng::seed_from_u64(2);
        let options = SimilarClipOptions {
            n: 3,
            include_self: false,
            fallback_to_self: true,
        };
        let clips = load_similar_clips(&a, 120, 8000, options, &mut rng).unwrap();
        assert_eq!(clips.dims3().unwrap(), (3, 1, 120));
    }

    #[test]
    fn test_no_candidates_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 10);

        let mut rng = StdRng::seed_from_u64(3);
        let options = SimilarClipOptions {
            n: 1,
            include_self: false,
            fallback_to_self: true,
        };
        assert!(load_similar_clips(&path, 10, 8000, options, &mut rng).is_err());
    }
}
