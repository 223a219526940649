//! Deterministic, offline embedding provider.
//!
//! Runs no model and makes no network call: text is hashed into a bag of
//! character trigrams, each trigram deterministically projected onto a
//! coordinate of the target vector, then the result is L2-normalized. Two
//! calls with the same input always produce the same vector, and every
//! output vector is unit-norm (`||x||_2 = 1 +- 0.01`) — the same invariant
//! the hybrid embedder requires of its own output, since it composes with
//! this provider.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::Embedder;
use crate::constants::EMBEDDING_DIM;
use crate::error::Result;
use crate::types::{l2_normalize, Embedding};

/// Hash-projection embedder. No external dependencies; deterministic.
#[derive(Debug, Clone, Default)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    #[must_use]
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    #[must_use]
    pub fn with_dim(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let normalized = text.to_lowercase();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut v = vec![0.0_f32; self.dim];

        if normalized.is_empty() {
            return Ok(v);
        }

        let chars: Vec<char> = normalized.chars().collect();
        let window = 3.min(chars.len());
        for start in 0..=(chars.len().saturating_sub(window)) {
            let gram: String = chars[start..start + window].iter().collect();
            let mut hasher = DefaultHasher::new();
            gram.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let sign = if (h >> 63) & 1 == 1 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        l2_normalize(&mut v);
        Ok(v)
    }
}
