//! Embedding seam for semantic search.
//!
//! Real embedding models live outside the core; anything implementing
//! `Embedder` can be injected. The default is a deterministic hashed
//! bag-of-words vectorizer so search works fully offline.

use crate::errors::CoreResult;

pub const EMBEDDING_DIM: usize = 256;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;
}

/// Deterministic local embedder: lowercase word tokens hashed (FNV-1a) into
/// a fixed-size bag, L2-normalized. Identical input always yields an
/// identical vector.
pub struct HashedBagEmbedder;

impl Embedder for HashedBagEmbedder {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for token in tokenize(text) {
            let idx = (fnv1a(token.as_bytes()) as usize) % EMBEDDING_DIM;
            vector[idx] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Cosine similarity in [-1, 1]. Mismatched or zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
