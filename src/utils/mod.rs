//! Utility functions and helpers
//!
//! Small tensor helpers shared by the backbone and the GPT-TTS heads.

/// Tensor utilities
pub mod tensor_utils {
    use candle_core::{Device, Result, Tensor};

    /// Create a causal mask as u8 tensor (1 = attend, 0 = mask)
    ///
    /// Queries are the last `query_len` positions of a `key_len` long sequence,
    /// so position i can attend to keys <= i. Shape (1, 1, query_len, key_len).
    pub fn create_causal_mask_u8(
        query_len: usize,
        key_len: usize,
        device: &Device,
    ) -> Result<Tensor> {
        let start_pos = key_len.saturating_sub(query_len);
        let mut mask_data = vec![0u8; query_len * key_len];

        for q in 0..query_len {
            for k in 0..=(start_pos + q).min(key_len.saturating_sub(1)) {
                mask_data[q * key_len + k] = 1;
            }
        }

        let mask = Tensor::from_slice(&mask_data, (query_len, key_len), device)?;
        mask.unsqueeze(0)?.unsqueeze(0)
    }

    /// Build a (batch, max_len) u8 mask that is 1 where `j < lengths[b]`
    pub fn mask_from_lengths(lengths: &[u32], max_len: usize, device: &Device) -> Result<Tensor> {
        let positions = Tensor::arange(0u32, max_len as u32, device)?.unsqueeze(0)?;
        let lengths = Tensor::from_slice(lengths, (lengths.len(), 1), device)?;
        positions.broadcast_lt(&lengths)
    }

    /// Replace every id >= `limit` with 0
    pub fn zero_ids_at_or_above(ids: &Tensor, limit: u32) -> Result<Tensor> {
        let keep = ids.lt(limit)?;
        keep.where_cond(ids, &ids.zeros_like()?)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_causal_mask_square() {
            let mask = create_causal_mask_u8(3, 3, &Device::Cpu).unwrap();
            let rows: Vec<Vec<u8>> = mask.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
            assert_eq!(rows, vec![vec![1, 0, 0], vec![1, 1, 0], vec![1, 1, 1]]);
        }

        #[test]
        fn test_causal_mask_single_query_sees_everything() {
            let mask = create_causal_mask_u8(1, 4, &Device::Cpu).unwrap();
            let rows: Vec<Vec<u8>> = mask.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
            assert_eq!(rows, vec![vec![1, 1, 1, 1]]);
        }

        #[test]
        fn test_mask_from_lengths() {
            let mask = mask_from_lengths(&[2, 0, 4], 4, &Device::Cpu).unwrap();
            let rows: Vec<Vec<u8>> = mask.to_vec2().unwrap();
            assert_eq!(rows, vec![vec![1, 1, 0, 0], vec![0, 0, 0, 0], vec![1, 1, 1, 1]]);
        }

        #[test]
        fn test_zero_ids_at_or_above() {
            let ids = Tensor::new(&[[3u32, 511, 512, 513, 514]], &Device::Cpu).unwrap();
            let cleaned: Vec<Vec<u32>> = zero_ids_at_or_above(&ids, 512).unwrap().to_vec2().unwrap();
            assert_eq!(cleaned, vec![vec![3, 511, 0, 0, 0]]);
        }
    }
}
