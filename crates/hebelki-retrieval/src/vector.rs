use std::sync::Arc;

use hebelki_core::{HebelkiError, HebelkiResult};
use tracing::debug;

use crate::embedding::{Compatibility, EmbeddingConfig, EmbeddingProvider};
use crate::fusion::RankedHit;
use crate::result::SearchMethod;
use crate::store::{CorpusStore, RetrievalQuery, RetrieverOutput};
use crate::weights::weight;

/// Semantic retriever over one corpus.
///
/// Embeds the query, asks the store for the nearest rows under the full
/// access condition, drops vectors produced by a different embedding
/// configuration, and re-ranks by `cosine × authority × category`.
pub struct VectorRetriever {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl VectorRetriever {
    /// Create a retriever over `store`.
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Run one query variant.
    ///
    /// Fails with [`HebelkiError::EmbeddingUnavailable`] when the query
    /// cannot be embedded and [`HebelkiError::DatastoreQueryFailed`] when
    /// the store errors. Ranking uses the unclamped weighted score; emitted
    /// scores are clamped to `[0, 1]`.
    pub async fn search(&self, query: &RetrievalQuery<'_>) -> HebelkiResult<RetrieverOutput> {
        if query.limit == 0 || query.text.trim().is_empty() {
            return Ok(RetrieverOutput::default());
        }

        let corpus = self.store.corpus();
        let embedding = self.embedder.embed(query.text).await.map_err(|e| match e {
            HebelkiError::EmbeddingUnavailable(_) => e,
            other => HebelkiError::EmbeddingUnavailable(other.to_string()),
        })?;

        let filter = query.condition(corpus);
        debug!(%corpus, filter = %filter, "Vector query");
        let candidates = self
            .store
            .nearest(&embedding, &filter, query.limit)
            .await
            .map_err(|e| match e {
                HebelkiError::DatastoreQueryFailed(_) => e,
                other => HebelkiError::DatastoreQueryFailed(other.to_string()),
            })?;

        let mut incompatible = 0usize;
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if query.filter_incompatible
                && self.config.check(&candidate.stamp) == Compatibility::Incompatible
            {
                incompatible += 1;
                continue;
            }
            let similarity = candidate.similarity.unwrap_or(0.0);
            let raw = similarity * weight(candidate.authority, candidate.category.as_deref());
            scored.push((candidate, raw));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let hits = scored
            .into_iter()
            .enumerate()
            .map(|(idx, (candidate, raw))| RankedHit {
                result: candidate.into_result(corpus, raw.clamp(0.0, 1.0), SearchMethod::Vector),
                rank: idx + 1,
            })
            .collect::<Vec<_>>();

        debug!(
            %corpus,
            hits = hits.len(),
            incompatible,
            "Vector retrieval done"
        );
        Ok(RetrieverOutput { hits, incompatible })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;
    use crate::store::InMemoryKnowledgeStore;
    use hebelki_core::{AccessContext, AuthorityLevel, Corpus, KnowledgeEntry};
    use uuid::Uuid;

    async fn embedded(
        embedder: &LocalEmbedding,
        tenant: Uuid,
        title: &str,
        content: &str,
    ) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(tenant, title, content);
        e.embedding = Some(embedder.embed(content).await.unwrap());
        e
    }

    fn query<'a>(tenant: Uuid, text: &'a str, access: &'a AccessContext) -> RetrievalQuery<'a> {
        RetrievalQuery {
            tenant_id: tenant,
            text,
            category: None,
            limit: 10,
            access,
            filter_incompatible: true,
        }
    }

    #[tokio::test]
    async fn test_incompatible_model_is_excluded_and_counted() {
        let tenant = Uuid::new_v4();
        let embedder = LocalEmbedding::default();
        let store = InMemoryKnowledgeStore::new();

        let good = embedded(&embedder, tenant, "Preise", "Massage kostet 80 Euro").await;
        let mut foreign = embedded(&embedder, tenant, "Preise alt", "Massage kostet 70 Euro").await;
        foreign.embedding_model = Some("text-embedding-3-small".into());
        let good_id = good.id;
        store.upsert(good).await;
        store.upsert(foreign).await;

        let retriever = VectorRetriever::new(
            Arc::new(store),
            Arc::new(LocalEmbedding::default()),
            EmbeddingConfig::default(),
        );
        let access = AccessContext::restrictive(tenant);
        let out = retriever.search(&query(tenant, "Massage kostet", &access)).await.unwrap();

        assert_eq!(out.incompatible, 1);
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].result.id, good_id);
        assert_eq!(out.hits[0].rank, 1);
        assert_eq!(out.hits[0].result.source, Corpus::Knowledge);
        assert_eq!(out.hits[0].result.method, SearchMethod::Vector);
    }

    #[tokio::test]
    async fn test_filter_disabled_keeps_everything() {
        let tenant = Uuid::new_v4();
        let embedder = LocalEmbedding::default();
        let store = InMemoryKnowledgeStore::new();
        let mut foreign = embedded(&embedder, tenant, "x", "Massage kostet 70 Euro").await;
        foreign.embedding_dim = Some(1536);
        store.upsert(foreign).await;

        let retriever = VectorRetriever::new(
            Arc::new(store),
            Arc::new(LocalEmbedding::default()),
            EmbeddingConfig::default(),
        );
        let access = AccessContext::restrictive(tenant);
        let mut q = query(tenant, "Massage", &access);
        q.filter_incompatible = false;
        let out = retriever.search(&q).await.unwrap();
        assert_eq!(out.incompatible, 0);
        assert_eq!(out.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_authority_reorders_and_scores_are_clamped() {
        let tenant = Uuid::new_v4();
        let embedder = LocalEmbedding::default();
        let store = InMemoryKnowledgeStore::new();

        let mut weak = embedded(&embedder, tenant, "a", "Öffnungszeiten Montag bis Freitag").await;
        weak.authority_level = AuthorityLevel::Unverified;
        let mut strong = embedded(&embedder, tenant, "b", "Öffnungszeiten Montag bis Freitag").await;
        strong.authority_level = AuthorityLevel::Canonical;
        let strong_id = strong.id;
        store.upsert(weak).await;
        store.upsert(strong).await;

        let retriever = VectorRetriever::new(
            Arc::new(store),
            Arc::new(LocalEmbedding::default()),
            EmbeddingConfig::default(),
        );
        let access = AccessContext::restrictive(tenant);
        let out = retriever
            .search(&query(tenant, "Öffnungszeiten Montag bis Freitag", &access))
            .await
            .unwrap();
        assert_eq!(out.hits[0].result.id, strong_id);
        assert!(out.hits.iter().all(|h| (0.0..=1.0).contains(&h.result.score)));
    }

    #[tokio::test]
    async fn test_category_filter() {
        let tenant = Uuid::new_v4();
        let embedder = LocalEmbedding::default();
        let store = InMemoryKnowledgeStore::new();
        let mut pricing = embedded(&embedder, tenant, "p", "Massage 80 Euro").await;
        pricing.category = Some("pricing".into());
        let other = embedded(&embedder, tenant, "o", "Massage Ablauf").await;
        store.upsert(pricing).await;
        store.upsert(other).await;

        let retriever = VectorRetriever::new(
            Arc::new(store),
            Arc::new(LocalEmbedding::default()),
            EmbeddingConfig::default(),
        );
        let access = AccessContext::restrictive(tenant);
        let mut q = query(tenant, "Massage", &access);
        q.category = Some("pricing");
        let out = retriever.search(&q).await.unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].result.category.as_deref(), Some("pricing"));
    }
}
