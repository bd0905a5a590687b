//! Deduplication and Reciprocal Rank Fusion.

use std::collections::HashMap;

use hebelki_core::Corpus;
use uuid::Uuid;

use crate::result::{SearchMethod, SearchResult};

/// A retriever hit with its 1-based rank in that retriever's output.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    /// The hit, scored by its retriever.
    pub result: SearchResult,
    /// 1-based rank.
    pub rank: usize,
}

/// Keep one hit per `(source, id)`: the one with the lowest rank.
///
/// The output is ordered by rank ascending; equal ranks keep their first
/// occurrence order.
pub fn dedupe_best_rank(hits: Vec<RankedHit>) -> Vec<RankedHit> {
    let mut best: HashMap<(Corpus, Uuid), usize> = HashMap::new();
    let mut kept: Vec<RankedHit> = Vec::new();

    for hit in hits {
        let key = hit.result.key();
        match best.get(&key) {
            Some(&idx) if kept[idx].rank <= hit.rank => {}
            Some(&idx) => kept[idx] = hit,
            None => {
                best.insert(key, kept.len());
                kept.push(hit);
            }
        }
    }

    kept.sort_by_key(|h| h.rank);
    kept
}

/// List weights and smoothing constant for RRF.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// Weight of the vector list.
    pub vector: f64,
    /// Weight of the keyword list.
    pub keyword: f64,
    /// RRF constant. Higher values flatten rank differences.
    pub k: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            keyword: 0.4,
            k: 60.0,
        }
    }
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Fuse a vector list and a keyword list with Reciprocal Rank Fusion.
///
/// ```text
/// fused(id) = Σ weight_list / (k + rank_in_list)
/// ```
///
/// Scores are normalized by the batch maximum into `(0, 1]`, every result
/// is marked [`SearchMethod::Hybrid`], and ties keep input order (vector
/// list first, then keyword list).
pub fn fuse(vector: &[RankedHit], keyword: &[RankedHit], weights: FusionWeights) -> Vec<SearchResult> {
    let wv = sanitize(weights.vector);
    let wk = sanitize(weights.keyword);
    let k = if weights.k.is_finite() && weights.k >= 0.0 {
        weights.k
    } else {
        60.0
    };

    let mut index: HashMap<(Corpus, Uuid), usize> = HashMap::new();
    let mut fused: Vec<(SearchResult, f64)> = Vec::new();

    let lists = [(vector, wv), (keyword, wk)];
    for (list, weight) in lists {
        for hit in list {
            let contribution = weight / (k + hit.rank as f64);
            let key = hit.result.key();
            match index.get(&key) {
                Some(&idx) => fused[idx].1 += contribution,
                None => {
                    index.insert(key, fused.len());
                    fused.push((hit.result.clone(), contribution));
                }
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let max = fused.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    fused
        .into_iter()
        .map(|(mut result, score)| {
            result.score = if max > 0.0 {
                (score / max).clamp(0.0, 1.0)
            } else {
                0.0
            };
            result.method = SearchMethod::Hybrid;
            result
        })
        .collect()
}
