use std::collections::HashSet;
use std::path::Path;

use hebelki_core::{
    ChunkEmbedding, Document, DocumentChunk, DocumentVersion, HebelkiError, HebelkiResult,
    KnowledgeEntry,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::{EmbeddingConfig, EmbeddingProvider};
use crate::store::{InMemoryDocumentStore, InMemoryKnowledgeStore};

/// A JSON dump of both corpora, as exported from the primary datastore.
///
/// ```json
/// { "knowledge": [...], "documents": [...], "versions": [...],
///   "chunks": [...], "chunk_embeddings": [...] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    /// Knowledge entries.
    #[serde(default)]
    pub knowledge: Vec<KnowledgeEntry>,
    /// Document rows.
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Document versions.
    #[serde(default)]
    pub versions: Vec<DocumentVersion>,
    /// Document chunks.
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
    /// Embedding rows keyed by chunk id.
    #[serde(default)]
    pub chunk_embeddings: Vec<ChunkEmbedding>,
}

impl CorpusSnapshot {
    /// Read and parse a snapshot file.
    pub async fn load(path: impl AsRef<Path>) -> HebelkiResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            HebelkiError::Config(format!("Failed to read snapshot {}: {e}", path.display()))
        })?;
        let snapshot: Self = serde_json::from_str(&data)?;
        info!(
            path = %path.display(),
            knowledge = snapshot.knowledge.len(),
            documents = snapshot.documents.len(),
            chunks = snapshot.chunks.len(),
            "Loaded corpus snapshot"
        );
        Ok(snapshot)
    }

    /// Embed knowledge entries and chunks exported without a vector, stamping
    /// them with `config`. Rows that already carry a vector are left alone.
    /// Returns the number of rows embedded.
    pub async fn embed_missing(
        &mut self,
        embedder: &dyn EmbeddingProvider,
        config: &EmbeddingConfig,
    ) -> HebelkiResult<usize> {
        let mut embedded = 0;
        for entry in self.knowledge.iter_mut().filter(|e| e.embedding.is_none()) {
            entry.embedding = Some(embedder.embed(&entry.content).await?);
            entry.embedding_model = Some(config.model.clone());
            entry.embedding_dim = Some(config.dim);
            entry.preprocess_version = Some(config.preprocess_version.clone());
            embedded += 1;
        }

        let covered: HashSet<_> = self.chunk_embeddings.iter().map(|e| e.chunk_id).collect();
        for chunk in self.chunks.iter().filter(|c| !covered.contains(&c.id)) {
            self.chunk_embeddings.push(ChunkEmbedding {
                chunk_id: chunk.id,
                embedding: embedder.embed(&chunk.content).await?,
                embedding_model: Some(config.model.clone()),
                embedding_dim: Some(config.dim),
                preprocess_version: Some(config.preprocess_version.clone()),
            });
            embedded += 1;
        }

        if embedded > 0 {
            info!(embedded, model = %config.model, "Embedded rows missing a vector");
        }
        Ok(embedded)
    }

    /// Build in-memory stores holding the snapshot's rows.
    pub async fn into_stores(self) -> (InMemoryKnowledgeStore, InMemoryDocumentStore) {
        let knowledge = InMemoryKnowledgeStore::from_entries(self.knowledge);
        let documents = InMemoryDocumentStore::new();
        for document in self.documents {
            documents.upsert_document(document).await;
        }
        for version in self.versions {
            documents.upsert_version(version).await;
        }
        for chunk in self.chunks {
            documents.insert_chunk(chunk, None).await;
        }
        for embedding in self.chunk_embeddings {
            documents.upsert_embedding(embedding).await;
        }
        (knowledge, documents)
    }
}
