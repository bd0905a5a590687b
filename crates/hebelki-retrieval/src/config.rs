use std::path::Path;

use hebelki_core::{AccessContext, HebelkiError, HebelkiResult};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingConfig;

/// Engine-wide settings. Every field has a default, so an empty TOML table
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// The active embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Default weight of the vector list in fusion.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Default weight of the keyword list in fusion.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Results returned when the caller sets no limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Each retriever fetches `limit × candidate_multiplier` rows.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// Query variants sent to the retrievers.
    #[serde(default = "default_max_query_variants")]
    pub max_query_variants: usize,
    /// Results inspected by the conflict detector.
    #[serde(default = "default_conflict_top_k")]
    pub conflict_top_k: usize,
    /// Deadline for a single retrieval call.
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_vector_weight() -> f64 {
    0.6
}

fn default_keyword_weight() -> f64 {
    0.4
}

fn default_limit() -> usize {
    10
}

fn default_candidate_multiplier() -> usize {
    2
}

fn default_max_query_variants() -> usize {
    3
}

fn default_conflict_top_k() -> usize {
    10
}

fn default_retrieval_timeout_ms() -> u64 {
    5000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            rrf_k: default_rrf_k(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            default_limit: default_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            max_query_variants: default_max_query_variants(),
            conflict_top_k: default_conflict_top_k(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    /// Parse from a TOML document.
    pub fn from_toml_str(source: &str) -> HebelkiResult<Self> {
        toml::from_str(source).map_err(|e| HebelkiError::Config(format!("Invalid config: {e}")))
    }

    /// Read and parse a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> HebelkiResult<Self> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path).await.map_err(|e| {
            HebelkiError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}

/// Per-search options. Unset fields fall back to [`RetrievalConfig`] or to
/// the category threshold table.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results.
    pub limit: Option<usize>,
    /// Restrict both corpora to one category.
    pub category: Option<String>,
    /// Override of the vector list weight.
    pub vector_weight: Option<f64>,
    /// Override of the keyword list weight.
    pub keyword_weight: Option<f64>,
    /// Relevance floor on the fused score.
    pub min_score: Option<f64>,
    /// Search document chunks as well as knowledge entries.
    pub include_documents: bool,
    /// Search document chunks only.
    pub documents_only: bool,
    /// Actor performing the search; the most restrictive customer context
    /// when absent.
    pub access_context: Option<AccessContext>,
    /// Drop vectors produced by a different embedding configuration.
    pub filter_incompatible_embeddings: bool,
    /// Run conflict detection on the top results.
    pub detect_conflicts: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            category: None,
            vector_weight: None,
            keyword_weight: None,
            min_score: None,
            include_documents: true,
            documents_only: false,
            access_context: None,
            filter_incompatible_embeddings: true,
            detect_conflicts: true,
        }
    }
}

impl SearchOptions {
    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict to a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Override both fusion weights.
    pub fn with_weights(mut self, vector: f64, keyword: f64) -> Self {
        self.vector_weight = Some(vector);
        self.keyword_weight = Some(keyword);
        self
    }

    /// Set the relevance floor.
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Search as `ctx`.
    pub fn with_access(mut self, ctx: AccessContext) -> Self {
        self.access_context = Some(ctx);
        self
    }

    /// Include or exclude document chunks.
    pub fn with_documents(mut self, include: bool) -> Self {
        self.include_documents = include;
        self
    }

    /// Search document chunks only.
    pub fn documents_only(mut self) -> Self {
        self.documents_only = true;
        self
    }

    /// Toggle the embedding compatibility filter.
    pub fn with_incompatible_filter(mut self, enabled: bool) -> Self {
        self.filter_incompatible_embeddings = enabled;
        self
    }

    /// Toggle conflict detection.
    pub fn with_conflict_detection(mut self, enabled: bool) -> Self {
        self.detect_conflicts = enabled;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = RetrievalConfig::from_toml_str("").unwrap();
        assert_eq!(config, RetrievalConfig::default());
        assert_eq!(config.embedding.dim, 256);
        assert_eq!(config.max_query_variants, 3);
        assert_eq!(config.retrieval_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_toml() {
        let config = RetrievalConfig::from_toml_str(
            r#"
            rrf_k = 30.0
            keyword_weight = 0.5

            [embedding]
            model = "text-embedding-3-small"
            dim = 1536
            "#,
        )
        .unwrap();
        assert!((config.rrf_k - 30.0).abs() < f64::EPSILON);
        assert!((config.vector_weight - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.embedding.dim, 1536);
        assert_eq!(config.embedding.preprocess_version, "v2");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = RetrievalConfig::from_toml_str("rrf_k = \"sixty\"").unwrap_err();
        assert!(matches!(err, HebelkiError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retrieval.toml");
        tokio::fs::write(&path, "default_limit = 5\n").await.unwrap();
        let config = RetrievalConfig::load(&path).await.unwrap();
        assert_eq!(config.default_limit, 5);
    }

    #[test]
    fn test_search_options_defaults_and_builders() {
        let defaults = SearchOptions::default();
        assert!(defaults.include_documents);
        assert!(!defaults.documents_only);
        assert!(defaults.filter_incompatible_embeddings);
        assert!(defaults.detect_conflicts);
        assert!(defaults.access_context.is_none());

        let opts = SearchOptions::default()
            .with_limit(3)
            .with_category("pricing")
            .with_weights(1.0, 0.0)
            .with_min_score(0.2)
            .documents_only();
        assert_eq!(opts.limit, Some(3));
        assert_eq!(opts.category.as_deref(), Some("pricing"));
        assert_eq!(opts.keyword_weight, Some(0.0));
        assert!(opts.documents_only);
    }
}
