//! Reciprocal Rank Fusion over the ranked lists of every search query.
//!
//! Each distinct passage scores `Σ 1 / (k + rank)` over the lists it appears
//! in. Ties keep the order in which passages were first discovered.

use std::collections::{HashMap, HashSet};

use crate::config::{DEFAULT_RRF_K, DEFAULT_TOP_N};
use crate::model::{Document, FusedResult, QueryRanking, identity_of};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub top_n: usize,
    /// Damping constant added to every rank. Small values favour the top of
    /// each list.
    pub rrf_k: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

struct FusionEntry<'a> {
    document: &'a Document,
    ranks: Vec<usize>,
}

pub fn fuse(per_query: &[QueryRanking], params: FusionParams) -> Vec<FusedResult> {
    let mut entries = Vec::<FusionEntry>::new();
    let mut positions = HashMap::<&str, usize>::new();

    for ranking in per_query {
        let mut seen_in_list = HashSet::<&str>::new();

        for (index, scored) in ranking.results.iter().enumerate() {
            let rank = index + 1;
            let identity = identity_of(&scored.document);
            if !seen_in_list.insert(identity) {
                continue;
            }

            let position = *positions.entry(identity).or_insert_with(|| {
                entries.push(FusionEntry {
                    document: &scored.document,
                    ranks: Vec::new(),
                });
                entries.len() - 1
            });
            entries[position].ranks.push(rank);
        }
    }

    let mut scored = entries
        .into_iter()
        .map(|entry| (entry.document, rrf_score(&entry.ranks, params.rrf_k)))
        .collect::<Vec<(&Document, f64)>>();

    // Stable sort: equal scores stay in discovery order.
    scored.sort_by(|left, right| right.1.total_cmp(&left.1));

    scored
        .into_iter()
        .take(params.top_n)
        .map(|(document, rrf_score)| FusedResult {
            document: document.clone(),
            rrf_score,
        })
        .collect()
}

pub fn rrf_score(ranks: &[usize], rrf_k: f64) -> f64 {
    ranks
        .iter()
        .map(|rank| 1.0 / (rrf_k + *rank as f64))
        .sum()
}
