//! GPT-TTS - joint text + mel token transformer
//!
//! One causal backbone models the sequence `[text tokens][mel tokens]`:
//! - Separate content and position embeddings per modality
//! - Shared final LayerNorm, then a text head and a mel head
//! - Teacher-forced training path returning both losses and VQ-ready mel codes
//! - Greedy autoregressive inference (see [`super::generation`])
//!
//! Mel vocabulary (515):
//! - 0..512: codes from the quantizing audio encoder
//! - 512: start, 513: stop, 514: unused reserved slot

use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, Module, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::generation::{generate, GenerationConfig};
use super::transformer::{Transformer, TransformerConfig};
use crate::error::GptTtsError;
use crate::text::NUMBER_SYMBOLS;
use crate::utils::tensor_utils::{mask_from_lengths, zero_ids_at_or_above};

/// Longest text sequence the text position table covers
pub const MAX_SYMBOLS_PER_PHRASE: usize = 200;
/// Text vocabulary: symbols plus `MAX_SYMBOLS_PER_PHRASE + 2` reserved ids
pub const NUMBER_TEXT_TOKENS: usize = NUMBER_SYMBOLS + MAX_SYMBOLS_PER_PHRASE + 2;
/// 512 VQ codes + start + stop + one reserved id
pub const MEL_DICTIONARY_SIZE: usize = 512 + 3;
pub const MEL_START_TOKEN: u32 = (MEL_DICTIONARY_SIZE - 3) as u32;
pub const MEL_STOP_TOKEN: u32 = (MEL_DICTIONARY_SIZE - 2) as u32;
/// First id the downstream VQ decoder does not know about
pub const MEL_CODE_LIMIT: u32 = (MEL_DICTIONARY_SIZE - 3) as u32;
/// 900 mel frames, compressed 4x by the VQVAE
pub const DEFAULT_MAX_MEL_FRAMES: usize = 900 / 4;

const LAYER_NORM_EPS: f64 = 1e-5;

/// Constructor options, as found under `network.kwargs` in the config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GptTtsOptions {
    #[serde(default = "default_layers")]
    pub layers: usize,
    #[serde(default = "default_model_dim")]
    pub model_dim: usize,
    #[serde(default = "default_heads")]
    pub heads: usize,
    /// Size of the mel position table and the generation length limit
    #[serde(default = "default_max_mel_frames")]
    pub max_mel_frames: usize,
}

fn default_layers() -> usize {
    8
}

fn default_model_dim() -> usize {
    512
}

fn default_heads() -> usize {
    8
}

fn default_max_mel_frames() -> usize {
    DEFAULT_MAX_MEL_FRAMES
}

impl Default for GptTtsOptions {
    fn default() -> Self {
        Self {
            layers: default_layers(),
            model_dim: default_model_dim(),
            heads: default_heads(),
            max_mel_frames: default_max_mel_frames(),
        }
    }
}

impl GptTtsOptions {
    /// Backbone capacity: one slack position plus both position tables
    pub fn max_seq_len(&self) -> usize {
        1 + MAX_SYMBOLS_PER_PHRASE + self.max_mel_frames
    }
}

/// Result of a teacher-forced forward pass
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    /// Mean text cross-entropy (scalar)
    pub loss_text: Tensor,
    /// Mean mel cross-entropy (scalar)
    pub loss_mel: Tensor,
    /// Predicted codes, padding and reserved ids zeroed, (batch, mel_len - 1)
    pub mel_codes: Tensor,
    /// Codes the predictions are compared against, reserved ids zeroed, (batch, mel_len - 1)
    ///
    /// Entry `j` is input position `j + 1`, the token `mel_codes[j]` predicts.
    /// The start column is dropped rather than the last one.
    pub mel_targets: Tensor,
}

/// Autoregressive text-to-mel-token model
pub struct GptTts {
    device: Device,
    options: GptTtsOptions,
    text_embedding: Embedding,
    text_pos_embedding: Embedding,
    mel_embedding: Embedding,
    mel_pos_embedding: Embedding,
    gpt: Transformer,
    final_norm: LayerNorm,
    text_head: Linear,
    mel_head: Linear,
}

impl GptTts {
    /// Build from a var builder (checkpoint or fresh `VarMap`)
    pub fn new(options: GptTtsOptions, vb: VarBuilder) -> Result<Self> {
        if options.max_mel_frames < 2 {
            return Err(GptTtsError::InvalidOptions(format!(
                "max_mel_frames must be at least 2 (start + one generated token), got {}",
                options.max_mel_frames
            ))
            .into());
        }
        let dim = options.model_dim;

        let text_embedding = candle_nn::embedding(NUMBER_TEXT_TOKENS, dim, vb.pp("text_embedding"))?;
        let mel_embedding = candle_nn::embedding(MEL_DICTIONARY_SIZE, dim, vb.pp("mel_embedding"))?;
        let text_pos_embedding =
            candle_nn::embedding(MAX_SYMBOLS_PER_PHRASE, dim, vb.pp("text_pos_embedding"))?;
        let mel_pos_embedding =
            candle_nn::embedding(options.max_mel_frames, dim, vb.pp("mel_pos_embedding"))?;

        let gpt = Transformer::new(
            TransformerConfig {
                dim,
                depth: options.layers,
                heads: options.heads,
                seq_len: options.max_seq_len(),
            },
            vb.pp("gpt"),
        )?;

        let final_norm = candle_nn::layer_norm(dim, LAYER_NORM_EPS, vb.pp("final_norm"))?;
        let text_head = candle_nn::linear(dim, NUMBER_TEXT_TOKENS, vb.pp("text_head"))?;
        let mel_head = candle_nn::linear(dim, MEL_DICTIONARY_SIZE, vb.pp("mel_head"))?;

        Ok(Self {
            device: vb.device().clone(),
            options,
            text_embedding,
            text_pos_embedding,
            mel_embedding,
            mel_pos_embedding,
            gpt,
            final_norm,
            text_head,
            mel_head,
        })
    }

    /// Freshly initialised weights
    pub fn random(options: GptTtsOptions, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        Self::new(options, vb)
    }

    /// Text content + position embeddings, (batch, text_len, model_dim)
    pub fn embed_text(&self, text_ids: &Tensor) -> Result<Tensor> {
        let (_, text_len) = text_ids.dims2()?;
        check_len("text", text_len, MAX_SYMBOLS_PER_PHRASE)?;
        check_ids("text", text_ids, NUMBER_TEXT_TOKENS)?;

        let emb = self.text_embedding.forward(text_ids)?;
        let positions = Tensor::arange(0u32, text_len as u32, &self.device)?;
        let pos = self.text_pos_embedding.forward(&positions)?;
        Ok(emb.broadcast_add(&pos)?)
    }

    /// Mel content + position embeddings, (batch, mel_len, model_dim)
    pub fn embed_mel(&self, mel_ids: &Tensor) -> Result<Tensor> {
        let (_, mel_len) = mel_ids.dims2()?;
        self.embed_mel_from(mel_ids, 0, mel_len)
    }

    /// Embed `mel_ids` as if they sat at positions `offset..offset + len`
    pub(crate) fn embed_mel_at(&self, mel_ids: &Tensor, offset: usize) -> Result<Tensor> {
        let (_, mel_len) = mel_ids.dims2()?;
        self.embed_mel_from(mel_ids, offset, mel_len)
    }

    fn embed_mel_from(&self, mel_ids: &Tensor, offset: usize, len: usize) -> Result<Tensor> {
        check_len("mel", offset + len, self.options.max_mel_frames)?;
        check_ids("mel", mel_ids, MEL_DICTIONARY_SIZE)?;

        let emb = self.mel_embedding.forward(mel_ids)?;
        let positions = Tensor::arange(offset as u32, (offset + len) as u32, &self.device)?;
        let pos = self.mel_pos_embedding.forward(&positions)?;
        Ok(emb.broadcast_add(&pos)?)
    }

    /// Text-branch logits for backbone output positions, (.., NUMBER_TEXT_TOKENS)
    pub fn project_text(&self, hidden: &Tensor) -> Result<Tensor> {
        let normed = self.final_norm.forward(hidden)?;
        Ok(self.text_head.forward(&normed)?)
    }

    /// Mel-branch logits for backbone output positions, (.., MEL_DICTIONARY_SIZE)
    pub fn project_mel(&self, hidden: &Tensor) -> Result<Tensor> {
        let normed = self.final_norm.forward(hidden)?;
        Ok(self.mel_head.forward(&normed)?)
    }

    /// Run embeddings, backbone and both heads over `[text][mel]`
    ///
    /// Returns `(text_logits, mel_logits)` of shape (batch, text_len, 350)
    /// and (batch, mel_len, 515).
    pub fn logits(&self, text_inputs: &Tensor, mel_inputs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (text_batch, text_len) = text_inputs.dims2()?;
        let (mel_batch, mel_len) = mel_inputs.dims2()?;
        if text_batch != mel_batch {
            return Err(GptTtsError::ShapeMismatch(format!(
                "text batch {} != mel batch {}",
                text_batch, mel_batch
            ))
            .into());
        }

        let text_emb = self.embed_text(text_inputs)?;
        let mel_emb = self.embed_mel(mel_inputs)?;
        let emb = Tensor::cat(&[&text_emb, &mel_emb], 1)?;
        let enc = self.gpt.forward(&emb)?;

        let text_logits = self.project_text(&enc.narrow(1, 0, text_len)?)?;
        let mel_logits = self.project_mel(&enc.narrow(1, text_len, mel_len)?)?;
        Ok((text_logits, mel_logits))
    }

    /// Teacher-forced forward pass
    ///
    /// # Arguments
    /// * `text_inputs` - Text ids (batch, text_len)
    /// * `text_lengths` - Unpadded text lengths (batch). Checked for shape only:
    ///   the text loss is deliberately left unmasked.
    /// * `mel_targets` - Ground-truth mel ids (batch, mel_len), also the model input
    /// * `output_lengths` - Unpadded mel lengths (batch)
    pub fn forward(
        &self,
        text_inputs: &Tensor,
        text_lengths: &Tensor,
        mel_targets: &Tensor,
        output_lengths: &Tensor,
    ) -> Result<TrainingOutput> {
        let (batch, text_len) = text_inputs.dims2()?;
        let (_, mel_len) = mel_targets.dims2()?;
        check_min_len("text", text_len)?;
        check_min_len("mel", mel_len)?;
        check_lengths("text_lengths", text_lengths, batch)?;
        check_lengths("output_lengths", output_lengths, batch)?;

        let (text_logits, mel_logits) = self.logits(text_inputs, mel_targets)?;

        let loss_text = shifted_cross_entropy(&text_logits, text_inputs)?;
        let loss_mel = shifted_cross_entropy(&mel_logits, mel_targets)?;

        // Position j predicts mel_targets[j + 1]; the last position has nothing to predict.
        let mel_codes = candle_nn::ops::softmax(&mel_logits, D::Minus1)?.argmax(D::Minus1)?;
        let predicted_lengths: Vec<u32> = output_lengths
            .to_dtype(DType::U32)?
            .to_vec1::<u32>()?
            .into_iter()
            .map(|len| len.saturating_sub(1))
            .collect();
        let keep = mask_from_lengths(&predicted_lengths, mel_len, &self.device)?;
        let mel_codes = keep.where_cond(&mel_codes, &mel_codes.zeros_like()?)?;
        let mel_codes = mel_codes.narrow(1, 0, mel_len - 1)?;
        let mel_codes = zero_ids_at_or_above(&mel_codes, MEL_CODE_LIMIT)?;

        let shifted_targets = mel_targets.narrow(1, 1, mel_len - 1)?;
        let cleaned_targets = zero_ids_at_or_above(&shifted_targets, MEL_CODE_LIMIT)?;

        debug!(
            batch,
            text_len,
            mel_len,
            "GPT-TTS training forward complete"
        );

        Ok(TrainingOutput {
            loss_text,
            loss_mel,
            mel_codes,
            mel_targets: cleaned_targets,
        })
    }

    /// Greedy decoding with the default [`GenerationConfig`]
    ///
    /// Returns cleaned mel codes (batch, generated_len) with start/stop
    /// stripped and reserved ids zeroed.
    pub fn inference(&self, text_inputs: &Tensor) -> Result<Tensor> {
        let generation = generate(self, text_inputs, &GenerationConfig::for_model(self))?;
        Ok(generation.codes)
    }

    /// Beam search decoding
    pub fn inference_beam(&self, _text_inputs: &Tensor) -> Result<Tensor> {
        Err(GptTtsError::Unimplemented("beam search").into())
    }

    pub(crate) fn backbone(&self) -> &Transformer {
        &self.gpt
    }

    /// Constructor options
    pub fn options(&self) -> &GptTtsOptions {
        &self.options
    }

    /// Mel position table size, also the generation length limit
    pub fn max_mel_frames(&self) -> usize {
        self.options.max_mel_frames
    }

    /// Model dimension
    pub fn model_dim(&self) -> usize {
        self.options.model_dim
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Cross-entropy of logits[:, :-1] against targets[:, 1:], mean over all terms
fn shifted_cross_entropy(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let (batch, len, vocab) = logits.dims3()?;
    let inputs = logits.narrow(1, 0, len - 1)?.reshape((batch * (len - 1), vocab))?;
    let targets = targets.narrow(1, 1, len - 1)?.flatten_all()?;
    Ok(candle_nn::loss::cross_entropy(&inputs, &targets)?)
}

fn check_len(what: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(GptTtsError::SequenceTooLong { what, len, max }.into());
    }
    Ok(())
}

fn check_min_len(what: &'static str, len: usize) -> Result<()> {
    if len < 2 {
        return Err(GptTtsError::SequenceTooShort { what, len, min: 2 }.into());
    }
    Ok(())
}

fn check_ids(vocab: &'static str, ids: &Tensor, size: usize) -> Result<()> {
    if ids.elem_count() == 0 {
        return Ok(());
    }
    let max_id = ids.to_dtype(DType::U32)?.max_all()?.to_scalar::<u32>()?;
    if max_id as usize >= size {
        return Err(GptTtsError::TokenOutOfRange {
            vocab,
            id: max_id,
            size,
        }
        .into());
    }
    Ok(())
}

fn check_lengths(what: &str, lengths: &Tensor, batch: usize) -> Result<()> {
    let n = lengths.dims1()?;
    if n != batch {
        return Err(GptTtsError::ShapeMismatch(format!("{} has {} entries, batch is {}", what, n, batch)).into());
    }
    Ok(())
}
