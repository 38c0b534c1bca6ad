//! Greedy autoregressive mel code generation
//!
//! Every batch row advances in lockstep: a row that has produced its stop
//! token keeps receiving tokens until the whole batch has stopped or the
//! frame limit is reached. Trimming happens only after the loop.

use anyhow::Result;
use candle_core::{Tensor, D};
use tracing::{debug, warn};

use super::gpt_tts::{GptTts, MEL_CODE_LIMIT, MEL_START_TOKEN, MEL_STOP_TOKEN};
use crate::error::GptTtsError;
use crate::utils::tensor_utils::zero_ids_at_or_above;

/// How each decoding step feeds the backbone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeStrategy {
    /// Re-embed and re-run the whole text + mel sequence every step
    #[default]
    Recompute,
    /// Prefill once, then push one token per step through a key/value cache
    KvCache,
}

/// Generation configuration
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    /// Stop once the mel sequence (start token included) reaches this length
    pub max_mel_frames: usize,
    pub strategy: DecodeStrategy,
}

impl GenerationConfig {
    /// Frame limit taken from the model's mel position table
    pub fn for_model(model: &GptTts) -> Self {
        Self {
            max_mel_frames: model.max_mel_frames(),
            strategy: DecodeStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: DecodeStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Decoded mel codes plus loop diagnostics
#[derive(Debug, Clone)]
pub struct Generation {
    /// Start and final token stripped, ids >= 512 zeroed, (batch, steps - 1)
    pub codes: Tensor,
    /// Number of tokens appended by the loop
    pub steps: usize,
    /// Frame limit reached before every row emitted a stop token
    pub hit_frame_limit: bool,
}

/// Greedy decoding of mel codes for `text_inputs` (batch, text_len)
pub fn generate(model: &GptTts, text_inputs: &Tensor, config: &GenerationConfig) -> Result<Generation> {
    if config.max_mel_frames < 2 || config.max_mel_frames > model.max_mel_frames() {
        return Err(GptTtsError::InvalidOptions(format!(
            "max_mel_frames {} must be in 2..={}",
            config.max_mel_frames,
            model.max_mel_frames()
        ))
        .into());
    }

    let device = model.device();
    let (batch_size, text_len) = text_inputs.dims2()?;
    if batch_size == 0 {
        return Err(GptTtsError::ShapeMismatch("text batch is empty".to_string()).into());
    }
    let text_emb = model.embed_text(text_inputs)?;

    debug!(
        batch_size,
        text_len,
        max_mel_frames = config.max_mel_frames,
        strategy = ?config.strategy,
        "Starting greedy mel generation"
    );

    let mut mel_seq = Tensor::full(MEL_START_TOKEN, (batch_size, 1), device)?;
    let mut stop_encountered = vec![false; batch_size];
    let mut cache = match config.strategy {
        DecodeStrategy::KvCache => Some(model.backbone().new_cache()),
        DecodeStrategy::Recompute => None,
    };

    let mut steps = 0;
    while !stop_encountered.iter().all(|&s| s) && mel_seq.dim(1)? < config.max_mel_frames {
        let mel_len = mel_seq.dim(1)?;

        let last_hidden = match cache.as_mut() {
            None => {
                let mel_emb = model.embed_mel(&mel_seq)?;
                let emb = Tensor::cat(&[&text_emb, &mel_emb], 1)?;
                let enc = model.backbone().forward(&emb)?;
                enc.narrow(1, text_len + mel_len - 1, 1)?
            }
            Some(cache) if steps == 0 => {
                let mel_emb = model.embed_mel(&mel_seq)?;
                let emb = Tensor::cat(&[&text_emb, &mel_emb], 1)?;
                let enc = model.backbone().forward_cached(&emb, cache)?;
                enc.narrow(1, text_len + mel_len - 1, 1)?
            }
            Some(cache) => {
                let newest = mel_seq.narrow(1, mel_len - 1, 1)?;
                let emb = model.embed_mel_at(&newest, mel_len - 1)?;
                model.backbone().forward_cached(&emb, cache)?
            }
        };

        let mel_logits = model.project_mel(&last_hidden)?;
        let next = candle_nn::ops::softmax(&mel_logits, D::Minus1)?.argmax(D::Minus1)?;
        mel_seq = Tensor::cat(&[&mel_seq, &next], 1)?;

        let next_ids: Vec<u32> = next.flatten_all()?.to_vec1()?;
        for (stopped, &id) in stop_encountered.iter_mut().zip(next_ids.iter()) {
            *stopped |= id == MEL_STOP_TOKEN;
        }

        if steps % 50 == 0 {
            debug!(step = steps, ids = ?next_ids, "mel generation step");
        }
        steps += 1;
    }

    let hit_frame_limit = !stop_encountered.iter().all(|&s| s);
    if hit_frame_limit {
        warn!(
            "Encountered frame limit ({}) before a stop token. Output is likely wrong.",
            config.max_mel_frames
        );
    }

    let total = mel_seq.dim(1)?;
    let codes = mel_seq.narrow(1, 1, total - 2)?;
    let codes = zero_ids_at_or_above(&codes, MEL_CODE_LIMIT)?;

    debug!(steps, hit_frame_limit, "Generated {} mel codes", total - 2);

    Ok(Generation {
        codes,
        steps,
        hit_frame_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gpt::GptTtsOptions;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn tiny() -> GptTtsOptions {
        GptTtsOptions {
            layers: 1,
            model_dim: 8,
            heads: 2,
            max_mel_frames: 12,
        }
    }

    /// All weights zero except the mel head bias, which always favours `token`
    fn constant_model(token: u32) -> GptTts {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = GptTts::new(tiny(), vb).unwrap();

        for var in varmap.all_vars() {
            var.set(&var.zeros_like().unwrap()).unwrap();
        }
        let mut bias = vec![0f32; 515];
        bias[token as usize] = 10.0;
        varmap
            .set_one("mel_head.bias", Tensor::new(bias.as_slice(), &device).unwrap())
            .unwrap();
        model
    }

    #[test]
    fn test_generation_config_for_model() {
        let model = GptTts::random(tiny(), &Device::Cpu).unwrap();
        let config = GenerationConfig::for_model(&model);
        assert_eq!(config.max_mel_frames, 12);
        assert_eq!(config.strategy, DecodeStrategy::Recompute);
    }

    #[test]
    fn test_immediate_stop_yields_empty_sequence() {
        let model = constant_model(MEL_STOP_TOKEN);
        let text = Tensor::new(&[[1u32, 2, 3]], &Device::Cpu).unwrap();
        let out = generate(&model, &text, &GenerationConfig::for_model(&model)).unwrap();
        assert_eq!(out.steps, 1);
        assert!(!out.hit_frame_limit);
        assert_eq!(out.codes.dims2().unwrap(), (1, 0));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let model = constant_model(MEL_STOP_TOKEN);
        let text = Tensor::zeros((0, 3), DType::U32, &Device::Cpu).unwrap();

        let err = model.inference(&text).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GptTtsError>(),
            Some(GptTtsError::ShapeMismatch(_))
        ));
        let config = GenerationConfig::for_model(&model).with_strategy(DecodeStrategy::KvCache);
        assert!(generate(&model, &text, &config).is_err());
    }

    #[test]
    fn test_frame_limit_without_stop() {
        let model = constant_model(42);
        let text = Tensor::new(&[[1u32, 2]], &Device::Cpu).unwrap();
        let out = generate(&model, &text, &GenerationConfig::for_model(&model)).unwrap();
        assert!(out.hit_frame_limit);
        assert_eq!(out.steps, 11);
        let codes: Vec<Vec<u32>> = out.codes.to_vec2().unwrap();
        assert_eq!(codes, vec![vec![42; 10]]);
    }

    #[test]
    fn test_reserved_ids_are_zeroed() {
        let model = constant_model(514);
        let text = Tensor::new(&[[5u32]], &Device::Cpu).unwrap();
        let out = generate(&model, &text, &GenerationConfig::for_model(&model)).unwrap();
        let codes: Vec<Vec<u32>> = out.codes.to_vec2().unwrap();
        assert!(codes[0].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_rejects_frame_limit_beyond_position_table() {
        let model = GptTts::random(tiny(), &Device::Cpu).unwrap();
        let text = Tensor::new(&[[1u32]], &Device::Cpu).unwrap();
        let config = GenerationConfig {
            max_mel_frames: 13,
            strategy: DecodeStrategy::Recompute,
        };
        let err = generate(&model, &text, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GptTtsError>(),
            Some(GptTtsError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_kv_cache_matches_recompute() {
        let device = Device::Cpu;
        let options = GptTtsOptions {
            layers: 2,
            model_dim: 16,
            heads: 4,
            max_mel_frames: 10,
        };
        let model = GptTts::random(options, &device).unwrap();
        let text = Tensor::new(&[[3u32, 9, 27, 81], [1, 2, 4, 8]], &device).unwrap();

        let config = GenerationConfig::for_model(&model);
        let full = generate(&model, &text, &config).unwrap();
        let cached = generate(&model, &text, &config.with_strategy(DecodeStrategy::KvCache)).unwrap();

        assert_eq!(full.steps, cached.steps);
        let full: Vec<Vec<u32>> = full.codes.to_vec2().unwrap();
        let cached: Vec<Vec<u32>> = cached.codes.to_vec2().unwrap();
        assert_eq!(full, cached);
    }
}
