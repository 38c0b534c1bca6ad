//! WAV output

use anyhow::{Context, Result};
use candle_core::Tensor;
use std::path::Path;

/// Writes clips to disk as 16-bit mono WAV
pub struct AudioOutput;

impl AudioOutput {
    /// Save f32 samples in [-1, 1]
    pub fn save<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create {:?}", path))?;
        for &sample in samples {
            writer.write_sample((sample * 32767.0).clamp(-32767.0, 32767.0) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Save a (1, samples) or (samples,) clip tensor
    pub fn save_tensor<P: AsRef<Path>>(clip: &Tensor, sample_rate: u32, path: P) -> Result<()> {
        let samples: Vec<f32> = clip.flatten_all()?.to_vec1()?;
        Self::save(&samples, sample_rate, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_save_tensor_round_trips_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let clip = Tensor::new(&[[0.0f32, 0.5, -0.5, 1.0]], &Device::Cpu).unwrap();

        AudioOutput::save_tensor(&clip, 16000, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 4);
    }
}
