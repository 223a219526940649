//! Embedding generation: maps free text to a fixed-dimension dense vector.
//!
//! The core treats embeddings as opaque: any [`Embedder`] implementation
//! that is deterministic for identical input and produces
//! [`crate::constants::EMBEDDING_DIM`]-length, L2-normalized vectors is a
//! valid drop-in. [`LocalEmbedder`] is the default, offline implementation;
//! remote embedding providers are an external-collaborator concern, not
//! bundled here.

mod hybrid;
mod local;

pub use hybrid::{HybridEmbedder, HybridEmbedderConfig};
pub use local::LocalEmbedder;

use crate::error::Result;
use crate::types::Embedding;

/// Deterministic text -> dense vector mapping.
pub trait Embedder: Send + Sync {
    /// Embed `text`, returning a vector of [`crate::constants::EMBEDDING_DIM`]
    /// length, L2-normalized.
    fn embed(&self, text: &str) -> Result<Embedding>;
}
