//! Audio file loading

use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use tracing::warn;

/// Extensions [`AudioLoader`] can decode
const SUPPORTED_EXTENSIONS: [&str; 1] = ["wav"];

/// Whether `path` has an extension the loader can decode
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Load a clip as a (1, samples) tensor at `sampling_rate`, clipped to [-1, 1]
pub fn load_audio(path: &Path, sampling_rate: u32) -> Result<Tensor> {
    let (samples, _) = AudioLoader::load(path, sampling_rate)?;
    let len = samples.len();
    Ok(Tensor::from_vec(samples, (1, len), &Device::Cpu)?)
}

/// WAV loader
pub struct AudioLoader;

impl AudioLoader {
    /// Load the first channel of a file and resample to `target_sr`
    ///
    /// Samples are clipped to [-1, 1]. A clip whose peak exceeds 2 or that has
    /// no negative sample is logged as suspicious but still returned.
    pub fn load<P: AsRef<Path>>(path: P, target_sr: u32) -> Result<(Vec<f32>, u32)> {
        let path = path.as_ref();
        if !is_supported_audio(path) {
            bail!("Unsupported audio format: {:?}", path);
        }

        let (samples, sample_rate) = Self::load_wav(path)?;
        let mut samples = if sample_rate != target_sr {
            super::Resampler::resample(&samples, sample_rate, target_sr)?
        } else {
            samples
        };

        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        if max > 2.0 || !samples.iter().any(|&s| s < 0.0) {
            warn!("Suspicious audio range in {:?}. Max={} min={}", path, max, min);
        }
        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }

        Ok((samples, target_sr))
    }

    /// Decode a WAV file to normalised f32, keeping channel 0 only
    fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {:?}", path))?;

        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Corrupt WAV data in {:?}", path))?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_value))
                    .collect::<std::result::Result<_, _>>()
                    .with_context(|| format!("Corrupt WAV data in {:?}", path))?
            }
        };

        let first_channel = interleaved.into_iter().step_by(channels).collect();
        Ok((first_channel, spec.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[[i16; 2]]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame.iter().take(channels as usize) {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_audio(Path::new("a/b.wav")));
        assert!(is_supported_audio(Path::new("a/b.WAV")));
        assert!(!is_supported_audio(Path::new("a/b.mp3")));
        assert!(!is_supported_audio(Path::new("a/b")));
    }

    #[test]
    fn test_keeps_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 8000, &[[16384, -16384], [-16384, 16384], [0, 0]]);

        let (samples, sr) = AudioLoader::load(&path, 8000).unwrap();
        assert_eq!(sr, 8000);
        assert_eq!(samples, vec![0.5, -0.5, 0.0]);
    }

    #[test]
    fn test_load_audio_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 1, 8000, &[[100, 0], [-100, 0], [50, 0], [-50, 0]]);

        let clip = load_audio(&path, 8000).unwrap();
        assert_eq!(clip.dims2().unwrap(), (1, 4));
    }

    #[test]
    fn test_unsupported_format_fails() {
        assert!(AudioLoader::load("clip.flac", 22050).is_err());
    }
}
