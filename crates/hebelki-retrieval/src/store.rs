use async_trait::async_trait;
use hebelki_core::{
    AccessContext, AuthorityLevel, ChunkEmbedding, Corpus, Document, DocumentChunk,
    DocumentVersion, EmbeddingStamp, HebelkiResult, KnowledgeEntry,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::access::access_condition;
use crate::condition::{Condition, Field};
use crate::embedding::cosine_similarity;
use crate::fusion::RankedHit;
use crate::result::{DocumentLocation, SearchMethod, SearchResult};
use crate::weights::normalize_category;

/// A row returned by a corpus query, carrying everything the retrievers
/// need to weight, filter and render it.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Entry id or chunk id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Text content.
    pub content: String,
    /// Content category.
    pub category: Option<String>,
    /// Source trust level.
    pub authority: AuthorityLevel,
    /// Metadata of the stored embedding.
    pub stamp: EmbeddingStamp,
    /// Cosine similarity to the query vector (vector queries only).
    pub similarity: Option<f64>,
    /// Present for document chunks.
    pub document: Option<DocumentLocation>,
}

impl Candidate {
    /// Render as a search result.
    pub fn into_result(self, source: Corpus, score: f64, method: SearchMethod) -> SearchResult {
        SearchResult {
            id: self.id,
            title: self.title,
            content: self.content,
            category: self.category,
            source,
            score,
            method,
            document: self.document,
        }
    }
}

/// Read-only access to one tenant-partitioned corpus.
///
/// Every query takes a mandatory [`Condition`]; implementations must apply
/// it inside the query, never as a post-filter on a truncated result.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`nearest`](CorpusStore::nearest) | Cosine nearest neighbours, best first |
/// | [`substring`](CorpusStore::substring) | Case-insensitive substring over title and content |
/// | [`embedding_stamps`](CorpusStore::embedding_stamps) | Embedding metadata of rows carrying a vector |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Which corpus this store serves.
    fn corpus(&self) -> Corpus;

    /// Rows matching `filter` that carry an embedding, ordered by cosine
    /// similarity to `query_embedding` (descending), at most `limit`.
    async fn nearest(
        &self,
        query_embedding: &[f32],
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>>;

    /// Rows matching `filter` whose title or content contains `needle`
    /// (case-insensitive), at most `limit`.
    async fn substring(
        &self,
        needle: &str,
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>>;

    /// Embedding metadata of every row matching `filter` that carries an
    /// embedding.
    async fn embedding_stamps(&self, filter: &Condition) -> HebelkiResult<Vec<EmbeddingStamp>>;
}

/// One retriever call: a single query variant against a single corpus.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalQuery<'a> {
    /// Tenant being searched.
    pub tenant_id: Uuid,
    /// Query variant text.
    pub text: &'a str,
    /// Restrict to one category.
    pub category: Option<&'a str>,
    /// Maximum rows requested from the store.
    pub limit: usize,
    /// Actor whose visibility applies.
    pub access: &'a AccessContext,
    /// Drop vectors produced by a different embedding configuration.
    pub filter_incompatible: bool,
}

impl RetrievalQuery<'_> {
    /// The full row filter for `corpus`: tenant, visibility, liveness and
    /// the optional category.
    pub fn condition(&self, corpus: Corpus) -> Condition {
        let scoped = Condition::eq(Field::TenantId, self.tenant_id)
            .and(access_condition(self.access, corpus));
        match self.category {
            Some(category) => scoped.and(Condition::eq(
                Field::Category,
                normalize_category(category).as_str(),
            )),
            None => scoped,
        }
    }
}

/// Ranked hits of one retriever call.
#[derive(Debug, Clone, Default)]
pub struct RetrieverOutput {
    /// Hits with 1-based ranks.
    pub hits: Vec<RankedHit>,
    /// Vector hits dropped for embedding incompatibility.
    pub incompatible: usize,
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn sort_by_similarity(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// --- Knowledge entries ---

/// In-memory knowledge store using brute-force cosine similarity.
/// Suitable for tests, the CLI and small tenants.
pub struct InMemoryKnowledgeStore {
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Create a store holding `entries`.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Insert or replace an entry.
    pub async fn upsert(&self, entry: KnowledgeEntry) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.id != entry.id);
        entries.push(entry);
    }

    /// Remove an entry by id.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() < before
    }

    /// Number of stored entries across all tenants.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn knowledge_candidate(entry: &KnowledgeEntry, similarity: Option<f64>) -> Candidate {
    Candidate {
        id: entry.id,
        title: entry.title.clone(),
        content: entry.content.clone(),
        category: entry.category.clone(),
        authority: entry.authority_level,
        stamp: entry.stamp(),
        similarity,
        document: None,
    }
}

#[async_trait]
impl CorpusStore for InMemoryKnowledgeStore {
    fn corpus(&self) -> Corpus {
        Corpus::Knowledge
    }

    async fn nearest(
        &self,
        query_embedding: &[f32],
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<Candidate> = entries
            .iter()
            .filter(|e| filter.matches(*e))
            .filter_map(|e| {
                let embedding = e.embedding.as_deref()?;
                let sim = cosine_similarity(query_embedding, embedding) as f64;
                Some(knowledge_candidate(e, Some(sim)))
            })
            .collect();
        sort_by_similarity(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }

    async fn substring(
        &self,
        needle: &str,
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| filter.matches(*e))
            .filter(|e| contains_ci(&e.title, &needle) || contains_ci(&e.content, &needle))
            .take(limit)
            .map(|e| knowledge_candidate(e, None))
            .collect())
    }

    async fn embedding_stamps(&self, filter: &Condition) -> HebelkiResult<Vec<EmbeddingStamp>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.embedding.is_some() && filter.matches(*e))
            .map(KnowledgeEntry::stamp)
            .collect())
    }
}

// --- Document chunks ---

#[derive(Default)]
struct DocumentTables {
    documents: HashMap<Uuid, Document>,
    versions: HashMap<Uuid, DocumentVersion>,
    chunks: Vec<DocumentChunk>,
    embeddings: HashMap<Uuid, ChunkEmbedding>,
}

impl DocumentTables {
    /// Chunks joined to their parent document, in insertion order.
    fn joined(&self) -> impl Iterator<Item = (&DocumentChunk, &Document)> {
        self.chunks.iter().filter_map(|chunk| {
            let version = self.versions.get(&chunk.version_id)?;
            let document = self.documents.get(&version.document_id)?;
            Some((chunk, document))
        })
    }

    fn candidate(
        &self,
        chunk: &DocumentChunk,
        document: &Document,
        similarity: Option<f64>,
    ) -> Candidate {
        Candidate {
            id: chunk.id,
            title: document.title.clone(),
            content: chunk.content.clone(),
            category: document.category.clone(),
            authority: document.authority_level,
            stamp: self
                .embeddings
                .get(&chunk.id)
                .map(ChunkEmbedding::stamp)
                .unwrap_or_default(),
            similarity,
            document: Some(DocumentLocation {
                document_id: document.id,
                document_title: document.title.clone(),
                page_start: chunk.page_start,
                page_end: chunk.page_end,
            }),
        }
    }
}

/// In-memory document store: documents, versions, chunks and chunk
/// embeddings joined at query time.
pub struct InMemoryDocumentStore {
    tables: RwLock<DocumentTables>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(DocumentTables::default()),
        }
    }

    /// Insert or replace a document row.
    pub async fn upsert_document(&self, document: Document) {
        self.tables
            .write()
            .await
            .documents
            .insert(document.id, document);
    }

    /// Insert or replace a version row.
    pub async fn upsert_version(&self, version: DocumentVersion) {
        self.tables.write().await.versions.insert(version.id, version);
    }

    /// Insert a chunk, with its embedding row when one exists.
    pub async fn insert_chunk(&self, chunk: DocumentChunk, embedding: Option<ChunkEmbedding>) {
        let mut tables = self.tables.write().await;
        if let Some(embedding) = embedding {
            tables.embeddings.insert(chunk.id, embedding);
        }
        tables.chunks.retain(|c| c.id != chunk.id);
        tables.chunks.push(chunk);
    }

    /// Attach or replace the embedding row of an existing chunk.
    pub async fn upsert_embedding(&self, embedding: ChunkEmbedding) {
        self.tables
            .write()
            .await
            .embeddings
            .insert(embedding.chunk_id, embedding);
    }

    /// Number of stored chunks across all tenants.
    pub async fn chunk_count(&self) -> usize {
        self.tables.read().await.chunks.len()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorpusStore for InMemoryDocumentStore {
    fn corpus(&self) -> Corpus {
        Corpus::Document
    }

    async fn nearest(
        &self,
        query_embedding: &[f32],
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>> {
        let tables = self.tables.read().await;
        let mut scored: Vec<Candidate> = tables
            .joined()
            .filter(|(_, doc)| filter.matches(*doc))
            .filter_map(|(chunk, doc)| {
                let row = tables.embeddings.get(&chunk.id)?;
                let sim = cosine_similarity(query_embedding, &row.embedding) as f64;
                Some(tables.candidate(chunk, doc, Some(sim)))
            })
            .collect();
        sort_by_similarity(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }

    async fn substring(
        &self,
        needle: &str,
        filter: &Condition,
        limit: usize,
    ) -> HebelkiResult<Vec<Candidate>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .joined()
            .filter(|(_, doc)| filter.matches(*doc))
            .filter(|(chunk, doc)| {
                contains_ci(&doc.title, &needle) || contains_ci(&chunk.content, &needle)
            })
            .take(limit)
            .map(|(chunk, doc)| tables.candidate(chunk, doc, None))
            .collect())
    }

    async fn embedding_stamps(&self, filter: &Condition) -> HebelkiResult<Vec<EmbeddingStamp>> {
        let tables = self.tables.read().await;
        Ok(tables
            .joined()
            .filter(|(_, doc)| filter.matches(*doc))
            .filter_map(|(chunk, _)| tables.embeddings.get(&chunk.id).map(ChunkEmbedding::stamp))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::access::access_condition;
    use hebelki_core::{AccessContext, DocumentStatus};

    fn entry_with_embedding(tenant: Uuid, title: &str, embedding: Vec<f32>) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(tenant, title, format!("{title} content"));
        e.embedding = Some(embedding);
        e
    }

    #[tokio::test]
    async fn test_knowledge_nearest_orders_by_similarity() {
        let tenant = Uuid::new_v4();
        let store = InMemoryKnowledgeStore::new();
        let close = entry_with_embedding(tenant, "close", vec![1.0, 0.1]);
        let far = entry_with_embedding(tenant, "far", vec![0.0, 1.0]);
        let close_id = close.id;
        store.upsert(far).await;
        store.upsert(close).await;

        let filter = access_condition(&AccessContext::restrictive(tenant), Corpus::Knowledge);
        let hits = store.nearest(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, close_id);
        assert!(hits[0].similarity.unwrap() > hits[1].similarity.unwrap());
    }

    #[tokio::test]
    async fn test_knowledge_nearest_skips_rows_without_embedding() {
        let tenant = Uuid::new_v4();
        let store = InMemoryKnowledgeStore::new();
        store
            .upsert(KnowledgeEntry::new(tenant, "no vector", "text"))
            .await;
        let filter = access_condition(&AccessContext::restrictive(tenant), Corpus::Knowledge);
        assert!(store.nearest(&[1.0], &filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_knowledge_substring_is_case_insensitive_and_filtered() {
        let tenant = Uuid::new_v4();
        let other = Uuid::new_v4();
        let store = InMemoryKnowledgeStore::new();
        store
            .upsert(KnowledgeEntry::new(tenant, "Parkplatz", "Parken hinter dem Haus"))
            .await;
        store
            .upsert(KnowledgeEntry::new(other, "Parkplatz", "Fremder Mandant"))
            .await;

        let filter = access_condition(&AccessContext::restrictive(tenant), Corpus::Knowledge);
        let hits = store.substring("PARKPLATZ", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Parken hinter dem Haus");
        assert!(store.substring("  ", &filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_category_filter_ignores_case_and_padding() {
        let tenant = Uuid::new_v4();
        let store = InMemoryKnowledgeStore::new();
        let mut priced = KnowledgeEntry::new(tenant, "Preisliste", "Preis pro Stunde");
        priced.category = Some(" pricing".into());
        let mut other = KnowledgeEntry::new(tenant, "Preis Parkplatz", "Preis fürs Parken");
        other.category = Some("faq".into());
        let priced_id = priced.id;
        store.upsert(priced).await;
        store.upsert(other).await;

        let access = AccessContext::restrictive(tenant);
        for requested in ["Pricing", "PRICING ", "pricing"] {
            let query = RetrievalQuery {
                tenant_id: tenant,
                text: "Preis",
                category: Some(requested),
                limit: 10,
                access: &access,
                filter_incompatible: true,
            };
            let hits = store
                .substring(query.text, &query.condition(Corpus::Knowledge), query.limit)
                .await
                .unwrap();
            assert_eq!(hits.len(), 1, "category {requested:?}");
            assert_eq!(hits[0].id, priced_id);
        }
    }

    #[tokio::test]
    async fn test_remove_and_count() {
        let store = InMemoryKnowledgeStore::new();
        let e = KnowledgeEntry::new(Uuid::new_v4(), "t", "c");
        let id = e.id;
        store.upsert(e).await;
        assert_eq!(store.count().await, 1);
        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_document_store_joins_and_filters_status() {
        let tenant = Uuid::new_v4();
        let store = InMemoryDocumentStore::new();

        let active = Document::new(tenant, "Preisliste");
        let mut deleted = Document::new(tenant, "Alte Preisliste");
        deleted.status = DocumentStatus::DeletedPending;

        for doc in [&active, &deleted] {
            let version = DocumentVersion {
                id: Uuid::new_v4(),
                document_id: doc.id,
                version: 1,
            };
            let chunk = DocumentChunk {
                id: Uuid::new_v4(),
                version_id: version.id,
                content: "Massage 60 Minuten 80 €".into(),
                page_start: 1,
                page_end: 1,
            };
            let embedding = ChunkEmbedding {
                chunk_id: chunk.id,
                embedding: vec![1.0, 0.0],
                embedding_model: None,
                embedding_dim: None,
                preprocess_version: None,
            };
            store.upsert_document(doc.clone()).await;
            store.upsert_version(version).await;
            store.insert_chunk(chunk, Some(embedding)).await;
        }
        assert_eq!(store.chunk_count().await, 2);

        let filter = access_condition(&AccessContext::restrictive(tenant), Corpus::Document);
        let hits = store.substring("massage", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let location = hits[0].document.as_ref().unwrap();
        assert_eq!(location.document_id, active.id);
        assert_eq!(location.document_title, "Preisliste");

        let nearest = store.nearest(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(nearest.len(), 1);

        let stamps = store.embedding_stamps(&filter).await.unwrap();
        assert_eq!(stamps.len(), 1);
    }
}
