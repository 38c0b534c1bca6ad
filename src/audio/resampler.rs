//! Audio resampling using rubato

use anyhow::Result;
use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

const CHUNK_SIZE: usize = 1024;

/// Audio resampler
pub struct Resampler;

impl Resampler {
    /// Resample mono audio from one sample rate to another
    ///
    /// Output length is `round(len * to_sr / from_sr)`; the filter delay is
    /// removed so output sample 0 lines up with input sample 0.
    pub fn resample(samples: &[f32], from_sr: u32, to_sr: u32) -> Result<Vec<f32>> {
        if from_sr == to_sr || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let ratio = to_sr as f64 / from_sr as f64;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)?;

        let delay = resampler.output_delay();
        let expected = (samples.len() as f64 * ratio).round() as usize;
        let mut output = Vec::with_capacity(expected + delay);

        let mut pos = 0;
        while pos + resampler.input_frames_next() <= samples.len() {
            let n = resampler.input_frames_next();
            let chunk = resampler.process(&[&samples[pos..pos + n]], None)?;
            output.extend_from_slice(&chunk[0]);
            pos += n;
        }
        if pos < samples.len() {
            let tail: [&[f32]; 1] = [&samples[pos..]];
            let chunk = resampler.process_partial(Some(&tail[..]), None)?;
            output.extend_from_slice(&chunk[0]);
        }

        // Flush the filter tail
        while output.len() < expected + delay {
            let chunk = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
            if chunk[0].is_empty() {
                break;
            }
            output.extend_from_slice(&chunk[0]);
        }

        Ok(output.into_iter().skip(delay).take(expected).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_identity() {
        let samples = vec![0.1f32, -0.2, 0.3];
        assert_eq!(Resampler::resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_output_length_follows_ratio() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin())
            .collect();
        let out = Resampler::resample(&samples, 44100, 22050).unwrap();
        assert_eq!(out.len(), 2205);
    }
}
