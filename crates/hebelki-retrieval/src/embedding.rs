use async_trait::async_trait;
use hebelki_core::{EmbeddingStamp, HebelkiError, HebelkiResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Preprocess version tag tolerated during embedding migrations.
pub const LEGACY_PREPROCESS_VERSION: &str = "legacy";

/// Trait for computing text embeddings (vector representations).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> HebelkiResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> HebelkiResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// The currently active embedding configuration. Stored vectors are
/// validated against it before they may contribute to a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Vector dimensionality.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Text preprocessing version.
    #[serde(default = "default_preprocess_version")]
    pub preprocess_version: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dim: default_dim(),
            preprocess_version: default_preprocess_version(),
        }
    }
}

fn default_model() -> String {
    "local-hash-v1".to_string()
}

fn default_dim() -> usize {
    256
}

fn default_preprocess_version() -> String {
    "v2".to_string()
}

/// Whether a stored vector may be compared with a query vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same model, dimensionality and preprocess version.
    Compatible,
    /// Untracked or tagged `legacy`; tolerated.
    Legacy,
    /// Produced by a different model, dimensionality or preprocessing.
    Incompatible,
}

/// How current a stored vector is, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Preprocess version matches the active config.
    Current,
    /// No preprocess version recorded, or tagged `legacy`.
    Legacy,
    /// A different, non-legacy preprocess version.
    Stale,
}

impl EmbeddingConfig {
    /// Classify a stored vector against this configuration.
    pub fn check(&self, stamp: &EmbeddingStamp) -> Compatibility {
        if stamp.is_untracked() {
            return Compatibility::Legacy;
        }
        if stamp.model.as_deref().is_some_and(|m| m != self.model)
            || stamp.dim.is_some_and(|d| d != self.dim)
        {
            return Compatibility::Incompatible;
        }
        match stamp.preprocess_version.as_deref() {
            None => Compatibility::Compatible,
            Some(v) if v == self.preprocess_version => Compatibility::Compatible,
            Some(LEGACY_PREPROCESS_VERSION) => Compatibility::Legacy,
            Some(_) => Compatibility::Incompatible,
        }
    }

    /// Classify the preprocess version of a stored vector.
    pub fn staleness(&self, stamp: &EmbeddingStamp) -> Staleness {
        match stamp.preprocess_version.as_deref() {
            None | Some(LEGACY_PREPROCESS_VERSION) => Staleness::Legacy,
            Some(v) if v == self.preprocess_version => Staleness::Current,
            Some(_) => Staleness::Stale,
        }
    }
}

/// Local bag-of-words embedding (no external API needed).
/// Uses TF-based sparse-to-dense mapping with a fixed dimension.
/// Deterministic, which makes it the provider of choice for tests and the
/// CLI; production deployments plug in the embedding service instead.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create a provider producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(default_dim())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> HebelkiResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(HebelkiError::EmbeddingUnavailable(
                "Cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1)
            .collect();

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        // Three hash positions per word spread collisions out.
        for (word, count) in &freq {
            let tf = count / total;
            let hash1 = simple_hash(word.as_bytes()) as usize;
            let hash2 = simple_hash(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = simple_hash(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Simple deterministic hash function (FNV-1a).
fn simple_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < f32::EPSILON || nb < f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stamp(model: Option<&str>, dim: Option<usize>, version: Option<&str>) -> EmbeddingStamp {
        EmbeddingStamp {
            model: model.map(str::to_string),
            dim,
            preprocess_version: version.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_local_embedding_dimension() {
        let emb = LocalEmbedding::new(128);
        assert_eq!(emb.dimension(), 128);
        let vec = emb.embed("Öffnungszeiten Montag").await.unwrap();
        assert_eq!(vec.len(), 128);
    }

    #[tokio::test]
    async fn test_local_embedding_normalized() {
        let emb = LocalEmbedding::default();
        let vec = emb.embed("Stornierung bis 24 Stunden vorher").await.unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_local_embedding_similar_texts() {
        let emb = LocalEmbedding::default();
        let v1 = emb.embed("massage preis euro").await.unwrap();
        let v2 = emb.embed("massage preis minuten").await.unwrap();
        let v3 = emb.embed("parkplatz hinter dem haus").await.unwrap();

        let sim_12 = cosine_similarity(&v1, &v2);
        let sim_13 = cosine_similarity(&v1, &v3);
        assert!(sim_12 > sim_13, "sim_12={sim_12} should be > sim_13={sim_13}");
    }

    #[tokio::test]
    async fn test_local_embedding_empty_is_unavailable() {
        let emb = LocalEmbedding::default();
        assert!(matches!(
            emb.embed("   ").await,
            Err(HebelkiError::EmbeddingUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let emb = LocalEmbedding::default();
        let vecs = emb.embed_batch(&["preis", "termin"]).await.unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 256);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_untracked_stamp_is_legacy_compatible() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.check(&EmbeddingStamp::default()), Compatibility::Legacy);
    }

    #[test]
    fn test_model_or_dim_mismatch_is_incompatible() {
        let config = EmbeddingConfig::default();
        assert_eq!(
            config.check(&stamp(Some("text-embedding-3-small"), Some(256), Some("v2"))),
            Compatibility::Incompatible
        );
        assert_eq!(
            config.check(&stamp(Some("local-hash-v1"), Some(1536), Some("v2"))),
            Compatibility::Incompatible
        );
    }

    #[test]
    fn test_preprocess_versions() {
        let config = EmbeddingConfig::default();
        assert_eq!(
            config.check(&stamp(Some("local-hash-v1"), Some(256), Some("v2"))),
            Compatibility::Compatible
        );
        assert_eq!(
            config.check(&stamp(Some("local-hash-v1"), Some(256), Some("legacy"))),
            Compatibility::Legacy
        );
        assert_eq!(
            config.check(&stamp(Some("local-hash-v1"), Some(256), Some("v1"))),
            Compatibility::Incompatible
        );
    }

    #[test]
    fn test_staleness() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.staleness(&stamp(None, None, None)), Staleness::Legacy);
        assert_eq!(config.staleness(&stamp(None, None, Some("legacy"))), Staleness::Legacy);
        assert_eq!(config.staleness(&stamp(None, None, Some("v2"))), Staleness::Current);
        assert_eq!(config.staleness(&stamp(None, None, Some("v1"))), Staleness::Stale);
    }
}
