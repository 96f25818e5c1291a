//! Embedding signal (spec §4.10: weight 0.55, learned) — compares a
//! context vector to a precomputed catalog of verb-keyword embeddings and
//! picks the nearest verb type by cosine similarity above a threshold.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::distance::cosine_similarity;
use crate::types::VerbType;

pub const DEFAULT_THRESHOLD: f32 = 0.55;

/// Deterministic hash-based projection of a keyword into `dim` dimensions,
/// L2-normalized. Stands in for a real keyword-embedding table: every verb
/// type's catalog entry is reproducible without bundling a model, while
/// still giving distinct verb types distinct, stable directions.
fn pseudo_embedding(seed: &str, dim: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dim);
    let mut counter: u32 = 0;
    while out.len() < dim {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks(4) {
            if out.len() >= dim {
                break;
            }
            let bits = u32::from_le_bytes(chunk.try_into().unwrap());
            // Map into [-1, 1].
            out.push((bits as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }
    let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut out {
            *x /= norm;
        }
    }
    out
}

pub struct EmbeddingCatalog {
    entries: HashMap<VerbType, Vec<f32>>,
}

impl EmbeddingCatalog {
    pub fn new(dimension: usize) -> Self {
        let entries = VerbType::all()
            .iter()
            .filter(|vt| **vt != VerbType::Custom)
            .map(|vt| (*vt, pseudo_embedding(vt.as_str(), dimension)))
            .collect();
        Self { entries }
    }

    /// Nearest catalog entry by cosine similarity, if it clears `threshold`.
    pub fn classify(&self, context_vector: &[f32], threshold: f32) -> Option<(VerbType, f32)> {
        self.entries
            .iter()
            .map(|(vt, embedding)| (*vt, cosine_similarity(context_vector, embedding)))
            .filter(|(_, similarity)| *similarity >= threshold)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }
}
