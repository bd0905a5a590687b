//! Core types and error definitions for Hebelki retrieval.
//!
//! This crate provides the foundational types shared across the Hebelki
//! crates: the error enum and the read-only data model of the tenant
//! knowledge base (knowledge entries, documents and their chunks) plus the
//! per-request [`AccessContext`].
//!
//! # Main types
//!
//! - [`HebelkiError`]: Unified error enum.
//! - [`HebelkiResult`]: Convenience alias for `Result<T, HebelkiError>`.
//! - [`KnowledgeEntry`]: A curated knowledge base row.
//! - [`Document`], [`DocumentVersion`], [`DocumentChunk`], [`ChunkEmbedding`]: The document corpus.
//! - [`AccessContext`]: Who is asking, used for visibility rules.

/// Error type shared by every crate in the workspace.
pub mod error;
/// Knowledge base data model.
pub mod model;

pub use error::{HebelkiError, HebelkiResult};
pub use model::{
    AccessContext, ActorType, Audience, AuthorityLevel, ChunkEmbedding, Corpus, Document,
    DocumentChunk, DocumentStatus, DocumentVersion, EmbeddingStamp, KnowledgeEntry, ScopeType,
};
