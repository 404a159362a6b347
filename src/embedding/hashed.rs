//! Local feature-hashing embedder.
//!
//! Terms are hashed (FNV-1a) into a fixed number of buckets and weighted by
//! term frequency, then L2-normalized. Deterministic and always available,
//! which makes it the default backend and the one tests run against.

use super::Embedder;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2)
            .map(str::to_lowercase)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<String, f32> = HashMap::new();
        let mut total = 0.0f32;
        for token in Self::tokenize(text) {
            *counts.entry(token).or_default() += 1.0;
            total += 1.0;
        }

        let mut vec = vec![0.0f32; self.dimensions];
        if total == 0.0 {
            return vec;
        }

        for (term, count) in &counts {
            // longer terms carry more signal than short function words
            let weight = 1.0 + (term.len() as f32).ln();
            vec[Self::bucket(term, self.dimensions)] += (count / total) * weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn name(&self) -> &str {
        "hashed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}
