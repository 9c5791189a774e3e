//! Probabilistic set over content fingerprints. Not relied on for similarity
//! rejection — see module docs in `detector.rs` for how it is wired in.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{DetectorError, Result};

/// Bit array with `k` independent hash functions, each a deterministic
/// polynomial rolling hash seeded by its index `i`.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<bool>,
    m: usize,
    k: u32,
}

const POLY_BASE: u64 = 131;

impl BloomFilter {
    pub fn new(m: usize, k: u32) -> Self {
        let m = m.clamp(64, 1 << 26);
        let k = k.max(1);
        Self {
            bits: vec![false; m],
            m,
            k,
        }
    }

    pub fn len_bits(&self) -> usize {
        self.m
    }

    fn hash(&self, s: &str, seed: u32) -> usize {
        // Simple polynomial rolling hash, seeded by `i` so the k hash
        // functions are independent but deterministic across runs/platforms.
        let mut h: u64 = seed as u64 ^ 0x9E37_79B9_7F4A_7C15;
        for byte in s.as_bytes() {
            h = h.wrapping_mul(POLY_BASE).wrapping_add(*byte as u64);
        }
        (h % self.m as u64) as usize
    }

    pub fn add(&mut self, s: &str) {
        for i in 1..=self.k {
            let idx = self.hash(s, i);
            self.bits[idx] = true;
        }
    }

    pub fn might_contain(&self, s: &str) -> bool {
        (1..=self.k).all(|i| self.bits[self.hash(s, i)])
    }

    /// Base64 encoding of the raw bit array, one byte per 8 bits.
    pub fn export(&self) -> String {
        let mut bytes = vec![0u8; self.m.div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        STANDARD.encode(bytes)
    }

    /// Replaces this filter's bit array from a base64 export. Fails if the
    /// decoded size does not match this filter's configured `m`.
    pub fn import(&mut self, encoded: &str) -> Result<()> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| DetectorError::invalid_input(format!("bloom import: bad base64: {e}")))?;
        let expected_bytes = self.m.div_ceil(8);
        if bytes.len() != expected_bytes {
            return Err(DetectorError::invalid_input(format!(
                "bloom import: size mismatch, expected {} bytes for m={}, got {}",
                expected_bytes,
                self.m,
                bytes.len()
            )));
        }
        let mut bits = vec![false; self.m];
        for i in 0..self.m {
            bits[i] = (bytes[i / 8] & (1 << (i % 8))) != 0;
        }
        self.bits = bits;
        Ok(())
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(8192, 5)
    }
}
