use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{join_all, BoxFuture};
use hebelki_core::{AccessContext, Corpus, HebelkiError, HebelkiResult};
use tracing::{debug, debug_span, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::access::tenant_condition;
use crate::config::{RetrievalConfig, SearchOptions};
use crate::conflict::ConflictDetector;
use crate::embedding::{EmbeddingProvider, Staleness};
use crate::fusion::{dedupe_best_rank, fuse, FusionWeights, RankedHit};
use crate::keyword::KeywordRetriever;
use crate::query_expansion::{QueryExpander, RuleBasedExpander};
use crate::result::{SearchMetadata, SearchMethod, SearchResponse, SearchResult, StaleEmbeddingReport};
use crate::store::{CorpusStore, RetrievalQuery, RetrieverOutput};
use crate::vector::VectorRetriever;
use crate::weights::default_min_score;

/// Vector and keyword retrievers bound to one corpus.
struct CorpusRetrievers {
    store: Arc<dyn CorpusStore>,
    vector: VectorRetriever,
    keyword: KeywordRetriever,
}

impl CorpusRetrievers {
    fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            vector: VectorRetriever::new(store.clone(), embedder, config.embedding.clone()),
            keyword: KeywordRetriever::new(store.clone()),
            store,
        }
    }
}

/// Result of one retrieval task in the fan-out.
struct TaskOutcome {
    corpus: Corpus,
    method: SearchMethod,
    variant: usize,
    result: HebelkiResult<RetrieverOutput>,
}

/// Public entry point of the retrieval engine.
///
/// For each query variant, vector and keyword retrieval run concurrently
/// over the knowledge corpus and (optionally) the document corpus. Hits are
/// deduplicated per method, fused with Reciprocal Rank Fusion, thresholded
/// and truncated. A failing sub-source degrades to "no hits" instead of
/// failing the search.
///
/// ```text
/// fused(id) = vector_weight / (k + vector_rank) + keyword_weight / (k + keyword_rank)
/// ```
pub struct HybridSearcher {
    knowledge: CorpusRetrievers,
    documents: CorpusRetrievers,
    expander: Arc<dyn QueryExpander>,
    detector: ConflictDetector,
    config: RetrievalConfig,
}

impl HybridSearcher {
    /// Create a searcher with the built-in query expander and conflict
    /// extractor table.
    pub fn new(
        knowledge: Arc<dyn CorpusStore>,
        documents: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            knowledge: CorpusRetrievers::new(knowledge, embedder.clone(), &config),
            documents: CorpusRetrievers::new(documents, embedder, &config),
            expander: Arc::new(RuleBasedExpander::new()),
            detector: ConflictDetector::new(),
            config,
        }
    }

    /// Replace the query expander. Chainable builder method.
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = expander;
        self
    }

    /// Replace the conflict detector. Chainable builder method.
    pub fn with_conflict_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = detector;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    fn retrievers(&self, corpus: Corpus) -> &CorpusRetrievers {
        match corpus {
            Corpus::Knowledge => &self.knowledge,
            Corpus::Document => &self.documents,
        }
    }

    /// Ranked results for `query` within `tenant_id`.
    pub async fn search(
        &self,
        tenant_id: Uuid,
        query: &str,
        options: SearchOptions,
    ) -> HebelkiResult<Vec<SearchResult>> {
        Ok(self
            .search_with_metadata(tenant_id, query, options)
            .await?
            .results)
    }

    /// Like [`search`](Self::search), restricted to document chunks.
    pub async fn search_documents_only(
        &self,
        tenant_id: Uuid,
        query: &str,
        options: SearchOptions,
    ) -> HebelkiResult<Vec<SearchResult>> {
        self.search(tenant_id, query, options.documents_only()).await
    }

    /// Ranked results plus diagnostics.
    ///
    /// Fails only with [`HebelkiError::InvalidAccessContext`]: when the
    /// tenant id is nil, or when the supplied access context belongs to a
    /// different tenant.
    #[instrument(name = "hybrid_search", skip_all, fields(tenant = %tenant_id))]
    pub async fn search_with_metadata(
        &self,
        tenant_id: Uuid,
        query: &str,
        options: SearchOptions,
    ) -> HebelkiResult<SearchResponse> {
        let started = Instant::now();
        let access = resolve_access(tenant_id, options.access_context.clone())?;

        let limit = options.limit.unwrap_or(self.config.default_limit);
        let min_score = options
            .min_score
            .unwrap_or_else(|| default_min_score(options.category.as_deref()));
        let mut metadata = SearchMetadata {
            query: query.to_string(),
            min_score,
            ..SearchMetadata::default()
        };

        let trimmed = query.trim();
        if trimmed.is_empty() || limit == 0 {
            metadata.duration_ms = elapsed_ms(started);
            debug!(limit, "Empty query or zero limit, nothing to search");
            return Ok(SearchResponse {
                results: Vec::new(),
                metadata,
            });
        }

        // --- Augmentation ---
        let variants = if self.expander.should_augment(trimmed) {
            let augmented = self.expander.augment(trimmed);
            metadata.translations = augmented.translations.clone();
            metadata.synonyms = augmented.synonyms.clone();
            augmented.variants(self.config.max_query_variants)
        } else {
            vec![trimmed.to_string()]
        };
        metadata.augmentation_applied = variants.len() > 1;
        metadata.query_variants = variants.clone();
        debug!(
            augmented = metadata.augmentation_applied,
            variants = ?variants,
            "Query variants"
        );

        // --- Fan-out ---
        let corpora: &[Corpus] = if options.documents_only {
            &[Corpus::Document]
        } else if options.include_documents {
            &[Corpus::Knowledge, Corpus::Document]
        } else {
            &[Corpus::Knowledge]
        };
        let candidate_limit = limit.saturating_mul(self.config.candidate_multiplier.max(1));
        let deadline = Duration::from_millis(self.config.retrieval_timeout_ms);

        let mut tasks: Vec<BoxFuture<'_, TaskOutcome>> = Vec::new();
        for (variant_idx, variant) in variants.iter().enumerate() {
            for &corpus in corpora {
                let request = RetrievalQuery {
                    tenant_id,
                    text: variant,
                    category: options.category.as_deref(),
                    limit: candidate_limit,
                    access: &access,
                    filter_incompatible: options.filter_incompatible_embeddings,
                };
                let retrievers = self.retrievers(corpus);

                tasks.push(Box::pin(
                    async move {
                        TaskOutcome {
                            corpus,
                            method: SearchMethod::Vector,
                            variant: variant_idx,
                            result: with_deadline(deadline, retrievers.vector.search(&request))
                                .await,
                        }
                    }
                    .instrument(debug_span!(
                        "retrieve",
                        %corpus,
                        method = "vector",
                        variant = variant_idx
                    )),
                ));
                tasks.push(Box::pin(
                    async move {
                        TaskOutcome {
                            corpus,
                            method: SearchMethod::Keyword,
                            variant: variant_idx,
                            result: with_deadline(deadline, retrievers.keyword.search(&request))
                                .await,
                        }
                    }
                    .instrument(debug_span!(
                        "retrieve",
                        %corpus,
                        method = "keyword",
                        variant = variant_idx
                    )),
                ));
            }
        }

        let mut vector_hits: Vec<RankedHit> = Vec::new();
        let mut keyword_hits: Vec<RankedHit> = Vec::new();
        for outcome in join_all(tasks).await {
            match outcome.result {
                Ok(output) => {
                    metadata.incompatible_embeddings_filtered += output.incompatible;
                    match outcome.method {
                        SearchMethod::Keyword => keyword_hits.extend(output.hits),
                        _ => vector_hits.extend(output.hits),
                    }
                }
                Err(e) if !e.is_degradable() => {
                    metadata.failed_retrievals += 1;
                    error!(
                        corpus = %outcome.corpus,
                        method = ?outcome.method,
                        variant = outcome.variant,
                        error = %e,
                        "Unexpected retrieval error, continuing without this source"
                    );
                }
                Err(e) => {
                    metadata.failed_retrievals += 1;
                    warn!(
                        corpus = %outcome.corpus,
                        method = ?outcome.method,
                        variant = outcome.variant,
                        error = %e,
                        "Retrieval degraded, continuing without this source"
                    );
                }
            }
        }

        // --- Dedup + fusion ---
        let vector_hits = dedupe_best_rank(vector_hits);
        let keyword_hits = dedupe_best_rank(keyword_hits);
        metadata.vector_hits = vector_hits.len();
        metadata.keyword_hits = keyword_hits.len();

        let weights = FusionWeights {
            vector: options.vector_weight.unwrap_or(self.config.vector_weight),
            keyword: options.keyword_weight.unwrap_or(self.config.keyword_weight),
            k: self.config.rrf_k,
        };
        let mut results = fuse(&vector_hits, &keyword_hits, weights);
        metadata.fused_candidates = results.len();
        debug!(
            vector_hits = metadata.vector_hits,
            keyword_hits = metadata.keyword_hits,
            fused = results.len(),
            "Fused candidates"
        );

        results.retain(|r| r.score >= min_score);

        // --- Conflicts on the pre-truncation top set ---
        if options.detect_conflicts {
            let top = &results[..results.len().min(self.config.conflict_top_k)];
            let conflicts = self.detector.detect(top);
            if !conflicts.is_empty() {
                let fields: Vec<&str> = conflicts.iter().map(|c| c.field.as_str()).collect();
                warn!(count = conflicts.len(), fields = ?fields, "Conflicting facts across sources");
            }
            metadata.conflict_detected = !conflicts.is_empty();
            metadata.conflicts = conflicts;
        }

        results.truncate(limit);
        metadata.duration_ms = elapsed_ms(started);

        info!(
            results = results.len(),
            failed_retrievals = metadata.failed_retrievals,
            duration_ms = metadata.duration_ms,
            "Hybrid search complete"
        );
        Ok(SearchResponse { results, metadata })
    }

    /// Preprocess-version distribution of the tenant's live embeddings
    /// across both corpora.
    pub async fn check_stale_embeddings(&self, tenant_id: Uuid) -> HebelkiResult<StaleEmbeddingReport> {
        if tenant_id.is_nil() {
            return Err(HebelkiError::InvalidAccessContext(
                "tenant id is missing".to_string(),
            ));
        }

        let mut report = StaleEmbeddingReport::default();
        for corpus in [Corpus::Knowledge, Corpus::Document] {
            let filter = tenant_condition(tenant_id, corpus);
            let stamps = self.retrievers(corpus).store.embedding_stamps(&filter).await?;
            for stamp in &stamps {
                report.total_count += 1;
                match self.config.embedding.staleness(stamp) {
                    Staleness::Current => {}
                    Staleness::Legacy => report.legacy_count += 1,
                    Staleness::Stale => report.stale_count += 1,
                }
            }
        }

        if report.stale_count > 0 {
            warn!(
                tenant = %tenant_id,
                stale = report.stale_count,
                total = report.total_count,
                "Stale embeddings found, re-embedding recommended"
            );
        } else {
            info!(
                tenant = %tenant_id,
                legacy = report.legacy_count,
                total = report.total_count,
                "Embedding versions checked"
            );
        }
        Ok(report)
    }
}

fn resolve_access(tenant_id: Uuid, supplied: Option<AccessContext>) -> HebelkiResult<AccessContext> {
    if tenant_id.is_nil() {
        return Err(HebelkiError::InvalidAccessContext(
            "tenant id is missing".to_string(),
        ));
    }
    let access = supplied.unwrap_or_else(|| AccessContext::restrictive(tenant_id));
    access.validate()?;
    if access.tenant_id != tenant_id {
        return Err(HebelkiError::InvalidAccessContext(format!(
            "access context tenant {} does not match searched tenant {tenant_id}",
            access.tenant_id
        )));
    }
    Ok(access)
}

async fn with_deadline<F>(deadline: Duration, fut: F) -> HebelkiResult<RetrieverOutput>
where
    F: Future<Output = HebelkiResult<RetrieverOutput>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(HebelkiError::DatastoreQueryFailed(format!(
            "timed out after {} ms",
            deadline.as_millis()
        ))),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
