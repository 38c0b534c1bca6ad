//! Causal transformer backbone
//!
//! Pre-norm GPT-style decoder stack shared by the text and mel streams.
//! Maps (batch, seq, dim) to (batch, seq, dim); positions never attend to
//! later positions. Positional information is added by the caller.

use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::{LayerNorm, Linear, Module, VarBuilder};

use super::kv_cache::{KVCache, LayerCache};
use crate::error::GptTtsError;
use crate::utils::tensor_utils::create_causal_mask_u8;

const LAYER_NORM_EPS: f64 = 1e-5;

/// Backbone hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerConfig {
    pub dim: usize,
    pub depth: usize,
    pub heads: usize,
    /// Longest sequence the backbone accepts
    pub seq_len: usize,
}

/// GPT-2 style decoder layer
struct DecoderLayer {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    attn_layer_norm: LayerNorm,
    fc1: Linear,
    fc2: Linear,
    ffn_layer_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl DecoderLayer {
    fn new(dim: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        let head_dim = dim / num_heads;

        Ok(Self {
            q_proj: candle_nn::linear(dim, dim, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(dim, dim, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(dim, dim, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(dim, dim, vb.pp("out_proj"))?,
            attn_layer_norm: candle_nn::layer_norm(dim, LAYER_NORM_EPS, vb.pp("attn_layer_norm"))?,
            fc1: candle_nn::linear(dim, dim * 4, vb.pp("fc1"))?,
            fc2: candle_nn::linear(dim * 4, dim, vb.pp("fc2"))?,
            ffn_layer_norm: candle_nn::layer_norm(dim, LAYER_NORM_EPS, vb.pp("ffn_layer_norm"))?,
            num_heads,
            head_dim,
        })
    }

    fn split_heads(&self, x: &Tensor, batch_size: usize, seq_len: usize) -> Result<Tensor> {
        Ok(x
            .reshape((batch_size, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// Forward pass; `cache` holds keys/values of earlier positions, if any
    fn forward(&self, x: &Tensor, cache: Option<&mut LayerCache>) -> Result<Tensor> {
        let (batch_size, seq_len, _) = x.dims3()?;

        // Pre-norm self-attention
        let normed = self.attn_layer_norm.forward(x)?;
        let q = self.split_heads(&self.q_proj.forward(&normed)?, batch_size, seq_len)?;
        let k = self.split_heads(&self.k_proj.forward(&normed)?, batch_size, seq_len)?;
        let v = self.split_heads(&self.v_proj.forward(&normed)?, batch_size, seq_len)?;

        let (k, v) = match cache {
            Some(cache) => cache.append(&k, &v)?,
            None => (k, v),
        };
        let kv_len = k.dim(2)?;

        let scale = (self.head_dim as f64).sqrt();
        let attn = (q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)? / scale)?;

        let mask = create_causal_mask_u8(seq_len, kv_len, x.device())?.broadcast_as(attn.shape())?;
        let neg_inf = Tensor::new(f32::NEG_INFINITY, x.device())?
            .to_dtype(attn.dtype())?
            .broadcast_as(attn.shape())?;
        let attn = mask.where_cond(&attn, &neg_inf)?;

        let attn = candle_nn::ops::softmax(&attn, D::Minus1)?;
        let attn_out = attn
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch_size, seq_len, self.num_heads * self.head_dim))?;
        let x = (x + self.out_proj.forward(&attn_out)?)?;

        // Pre-norm FFN
        let normed = self.ffn_layer_norm.forward(&x)?;
        let ffn_out = self.fc1.forward(&normed)?.gelu_erf()?;
        let ffn_out = self.fc2.forward(&ffn_out)?;

        Ok((&x + ffn_out)?)
    }
}

/// Stack of causal decoder layers
pub struct Transformer {
    layers: Vec<DecoderLayer>,
    config: TransformerConfig,
}

impl Transformer {
    /// Build the stack, reading parameters under `layers.{i}`
    pub fn new(config: TransformerConfig, vb: VarBuilder) -> Result<Self> {
        if config.heads == 0 || config.dim % config.heads != 0 {
            return Err(GptTtsError::InvalidOptions(format!(
                "model_dim {} must be a positive multiple of heads {}",
                config.dim, config.heads
            ))
            .into());
        }

        let vb = vb.pp("layers");
        let layers = (0..config.depth)
            .map(|i| DecoderLayer::new(config.dim, config.heads, vb.pp(i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layers, config })
    }

    /// Full-sequence causal forward pass
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.check_len(x.dim(1)?)?;

        let mut hidden = x.clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden, None)?;
        }
        Ok(hidden)
    }

    /// Forward only the new positions in `x`, attending to everything already in `cache`
    pub fn forward_cached(&self, x: &Tensor, cache: &mut KVCache) -> Result<Tensor> {
        if cache.layer_caches.len() != self.layers.len() {
            return Err(GptTtsError::ShapeMismatch(format!(
                "cache has {} layers, backbone has {}",
                cache.layer_caches.len(),
                self.layers.len()
            ))
            .into());
        }
        self.check_len(cache.seq_len() + x.dim(1)?)?;

        let mut hidden = x.clone();
        for (layer, layer_cache) in self.layers.iter().zip(cache.layer_caches.iter_mut()) {
            hidden = layer.forward(&hidden, Some(layer_cache))?;
        }
        Ok(hidden)
    }

    /// Empty cache sized for this backbone
    pub fn new_cache(&self) -> KVCache {
        KVCache::new(self.layers.len())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.config.seq_len {
            return Err(GptTtsError::SequenceTooLong {
                what: "joint sequence",
                len,
                max: self.config.seq_len,
            }
            .into());
        }
        Ok(())
    }
}
