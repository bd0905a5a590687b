//! Output shapes of the retrieval engine.

use hebelki_core::Corpus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::Conflict;

/// Which retrieval method produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Cosine similarity over embeddings.
    Vector,
    /// Substring match.
    Keyword,
    /// Reciprocal rank fusion of both.
    Hybrid,
}

/// Where a document-chunk hit lives inside its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLocation {
    /// Parent document.
    pub document_id: Uuid,
    /// Title of the parent document.
    pub document_title: String,
    /// First page covered by the chunk.
    pub page_start: u32,
    /// Last page covered by the chunk.
    pub page_end: u32,
}

/// A single retrieved item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Knowledge entry id or document chunk id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Full text of the entry or chunk.
    pub content: String,
    /// Content category, when known.
    pub category: Option<String>,
    /// Corpus the item came from.
    pub source: Corpus,
    /// Relevance in `[0.0, 1.0]`.
    pub score: f64,
    /// Method that produced `score`.
    pub method: SearchMethod,
    /// Present for document chunks only.
    #[serde(flatten)]
    pub document: Option<DocumentLocation>,
}

impl SearchResult {
    /// Key identifying the underlying item across corpora.
    pub fn key(&self) -> (Corpus, Uuid) {
        (self.source, self.id)
    }
}

/// Diagnostics attached to a search by
/// [`HybridSearcher::search_with_metadata`](crate::hybrid::HybridSearcher::search_with_metadata).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    /// The query as received.
    pub query: String,
    /// Whether the query was expanded into more than one variant.
    pub augmentation_applied: bool,
    /// Query variants actually sent to the retrievers.
    pub query_variants: Vec<String>,
    /// Cross-language terms found by the augmenter.
    pub translations: Vec<String>,
    /// Same-language terms found by the augmenter.
    pub synonyms: Vec<String>,
    /// Distinct vector hits after deduplication.
    pub vector_hits: usize,
    /// Distinct keyword hits after deduplication.
    pub keyword_hits: usize,
    /// Candidates after fusion, before thresholding.
    pub fused_candidates: usize,
    /// Relevance floor applied.
    pub min_score: f64,
    /// Vector hits dropped for embedding incompatibility.
    pub incompatible_embeddings_filtered: usize,
    /// Retrieval calls that failed or timed out and were skipped.
    pub failed_retrievals: usize,
    /// Whether any conflict was found.
    pub conflict_detected: bool,
    /// Factual disagreements among the top results.
    pub conflicts: Vec<Conflict>,
    /// Wall-clock time of the search.
    pub duration_ms: u64,
}

/// Results plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Ranked results.
    pub results: Vec<SearchResult>,
    /// Diagnostics.
    pub metadata: SearchMetadata,
}

/// Preprocess-version distribution of a tenant's stored embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleEmbeddingReport {
    /// Rows embedded with a different, non-legacy preprocess version.
    pub stale_count: usize,
    /// Rows with no preprocess version or tagged `legacy`.
    pub legacy_count: usize,
    /// All active rows carrying an embedding.
    pub total_count: usize,
}
