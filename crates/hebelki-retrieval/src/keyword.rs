use std::sync::Arc;

use hebelki_core::{HebelkiError, HebelkiResult};
use tracing::debug;

use crate::fusion::RankedHit;
use crate::result::SearchMethod;
use crate::store::{CorpusStore, RetrievalQuery, RetrieverOutput};
use crate::weights::weight;

/// Base score when the query appears in the title.
const TITLE_MATCH_BASE: f64 = 0.8;
/// Base score when the query appears only in the content.
const CONTENT_MATCH_BASE: f64 = 0.6;
/// Deducted per position in the store's result order.
const POSITION_DECAY: f64 = 0.05;
/// Lower bound of the heuristic base before weighting.
const BASE_FLOOR: f64 = 0.1;

/// Lexical fallback retriever over one corpus.
///
/// Guarantees that exact-term matches surface even when the embedding
/// misses them.
pub struct KeywordRetriever {
    store: Arc<dyn CorpusStore>,
}

impl KeywordRetriever {
    /// Create a retriever over `store`.
    pub fn new(store: Arc<dyn CorpusStore>) -> Self {
        Self { store }
    }

    /// Run one query variant.
    pub async fn search(&self, query: &RetrievalQuery<'_>) -> HebelkiResult<RetrieverOutput> {
        let needle = query.text.trim();
        if query.limit == 0 || needle.is_empty() {
            return Ok(RetrieverOutput::default());
        }

        let corpus = self.store.corpus();
        let filter = query.condition(corpus);
        let candidates = self
            .store
            .substring(needle, &filter, query.limit)
            .await
            .map_err(|e| match e {
                HebelkiError::DatastoreQueryFailed(_) => e,
                other => HebelkiError::DatastoreQueryFailed(other.to_string()),
            })?;

        let needle_lower = needle.to_lowercase();
        let mut scored: Vec<_> = candidates
            .into_iter()
            .enumerate()
            .map(|(idx, candidate)| {
                let base = if candidate.title.to_lowercase().contains(&needle_lower) {
                    TITLE_MATCH_BASE
                } else {
                    CONTENT_MATCH_BASE
                };
                let base = (base - POSITION_DECAY * idx as f64).max(BASE_FLOOR);
                let raw = base * weight(candidate.authority, candidate.category.as_deref());
                (candidate, raw)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let hits = scored
            .into_iter()
            .enumerate()
            .map(|(idx, (candidate, raw))| RankedHit {
                result: candidate.into_result(corpus, raw.clamp(0.0, 1.0), SearchMethod::Keyword),
                rank: idx + 1,
            })
            .collect::<Vec<_>>();

        debug!(%corpus, hits = hits.len(), "Keyword retrieval done");
        Ok(RetrieverOutput {
            hits,
            incompatible: 0,
        })
    }
}
