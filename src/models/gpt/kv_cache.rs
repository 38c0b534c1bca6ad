//! Key/value cache for incremental decoding

use anyhow::Result;
use candle_core::Tensor;

/// Cached keys and values of one attention layer, (batch, heads, seq, head_dim)
#[derive(Debug, Clone, Default)]
pub struct LayerCache {
    k: Option<Tensor>,
    v: Option<Tensor>,
}

impl LayerCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Append new keys/values along the sequence axis and return the full history
    pub fn append(&mut self, k: &Tensor, v: &Tensor) -> Result<(Tensor, Tensor)> {
        let (k, v) = match (&self.k, &self.v) {
            (Some(prev_k), Some(prev_v)) => (
                Tensor::cat(&[prev_k, k], 2)?.contiguous()?,
                Tensor::cat(&[prev_v, v], 2)?.contiguous()?,
            ),
            _ => (k.clone(), v.clone()),
        };
        self.k = Some(k.clone());
        self.v = Some(v.clone());
        Ok((k, v))
    }

    /// Number of cached positions
    pub fn seq_len(&self) -> usize {
        self.k.as_ref().and_then(|k| k.dim(2).ok()).unwrap_or(0)
    }
}

/// One [`LayerCache`] per backbone layer
#[derive(Debug, Clone)]
pub struct KVCache {
    pub layer_caches: Vec<LayerCache>,
}

impl KVCache {
    /// Cache for `num_layers` layers
    pub fn new(num_layers: usize) -> Self {
        Self {
            layer_caches: (0..num_layers).map(|_| LayerCache::new()).collect(),
        }
    }

    /// Number of positions held (identical across layers)
    pub fn seq_len(&self) -> usize {
        self.layer_caches.first().map(LayerCache::seq_len).unwrap_or(0)
    }
}
