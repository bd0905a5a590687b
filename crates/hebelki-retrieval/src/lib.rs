//! Multi-tenant hybrid retrieval with access predicates, query augmentation
//! and conflict detection.
//!
//! Fuses semantic (vector) and lexical (keyword) retrieval over two corpora,
//! curated knowledge entries and chunks of ingested documents, with
//! Reciprocal Rank Fusion. Every store query carries a mandatory
//! [`Condition`] enforcing tenant isolation and audience/scope visibility.
//!
//! # Main types
//!
//! - [`HybridSearcher`]: Entry point: augment, fan out, fuse, threshold.
//! - [`CorpusStore`]: Trait for querying one corpus by similarity or substring.
//! - [`EmbeddingProvider`]: Trait for computing text embeddings.
//! - [`QueryExpander`]: Trait for expanding queries across languages.
//! - [`ConflictDetector`]: Flags factual disagreements among top results.
//! - [`RetrievalConfig`] / [`SearchOptions`]: Engine and per-search settings.

/// Visibility predicates for an access context.
pub mod access;
/// Composable row conditions.
pub mod condition;
/// Engine configuration and per-search options.
pub mod config;
/// Fact extraction and conflict detection.
pub mod conflict;
/// Embedding provider trait, compatibility checks and local implementation.
pub mod embedding;
/// Deduplication and Reciprocal Rank Fusion.
pub mod fusion;
/// OpenAI-compatible embedding client.
#[cfg(feature = "http-embeddings")]
pub mod http_embedding;
/// Search orchestrator.
pub mod hybrid;
/// Lexical retriever.
pub mod keyword;
/// Bilingual query augmentation.
pub mod query_expansion;
/// Output shapes.
pub mod result;
/// JSON corpus snapshots.
pub mod snapshot;
/// Corpus store trait and in-memory implementations.
pub mod store;
/// Semantic retriever.
pub mod vector;
/// Authority and category weight tables.
pub mod weights;

pub use access::access_condition;
pub use condition::{Condition, Field, Record, Value};
pub use config::{RetrievalConfig, SearchOptions};
pub use conflict::{Conflict, ConflictDetector, ConflictValue, ExtractedFact};
pub use embedding::{
    cosine_similarity, Compatibility, EmbeddingConfig, EmbeddingProvider, LocalEmbedding,
    Staleness,
};
pub use fusion::{dedupe_best_rank, fuse, FusionWeights, RankedHit};
#[cfg(feature = "http-embeddings")]
pub use http_embedding::HttpEmbedding;
pub use hybrid::HybridSearcher;
pub use keyword::KeywordRetriever;
pub use query_expansion::{augment_query, should_augment, AugmentedQuery, QueryExpander, RuleBasedExpander};
pub use result::{
    DocumentLocation, SearchMetadata, SearchMethod, SearchResponse, SearchResult,
    StaleEmbeddingReport,
};
pub use snapshot::CorpusSnapshot;
pub use store::{
    Candidate, CorpusStore, InMemoryDocumentStore, InMemoryKnowledgeStore, RetrievalQuery,
    RetrieverOutput,
};
pub use vector::VectorRetriever;
