//! Hybrid retrieval: dense and lexical result lists fused into one
//! ranking.
//!
//! The retriever operates on a [`KnowledgeIndex`] snapshot and a
//! pre-computed query embedding; embedding the query is the caller's job.
//!
//! # Fusion
//!
//! 1. Fetch `dense_k` dense hits (cosine) and `sparse_k` sparse hits (BM25).
//! 2. Each list contributes `weight / (rank_constant + rank)` for a chunk
//!    at 1-based `rank`, and nothing for a chunk it does not contain.
//! 3. `fused = dense contribution + sparse contribution`.
//! 4. Sort by fused score (desc), then dense rank (present before absent,
//!    lower first), then first appearance (dense list before sparse list).
//!
//! Using ranks rather than raw scores makes cosine and BM25 comparable
//! without calibration, and guarantees that a chunk found by both lists
//! at rank `r` never scores below a chunk found by one list at rank `r`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::index::{KnowledgeIndex, ScoredHit};
use crate::models::Chunk;

pub const DENSE_K: usize = 5;
pub const SPARSE_K: usize = 10;
pub const DENSE_WEIGHT: f64 = 0.7;
pub const SPARSE_WEIGHT: f64 = 0.3;
pub const RANK_CONSTANT: f64 = 60.0;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub dense_k: usize,
    pub sparse_k: usize,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub rank_constant: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            dense_k: DENSE_K,
            sparse_k: SPARSE_K,
            dense_weight: DENSE_WEIGHT,
            sparse_weight: SPARSE_WEIGHT,
            rank_constant: RANK_CONSTANT,
        }
    }
}

/// Which lists take part in a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    Dense,
    Sparse,
    #[default]
    Hybrid,
}

impl RetrievalMode {
    pub fn uses_dense(self) -> bool {
        matches!(self, Self::Dense | Self::Hybrid)
    }

    pub fn uses_sparse(self) -> bool {
        matches!(self, Self::Sparse | Self::Hybrid)
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dense" | "semantic" => Ok(Self::Dense),
            "sparse" | "keyword" => Ok(Self::Sparse),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!(
                "Unknown retrieval mode: {}. Use dense, sparse, or hybrid.",
                other
            )),
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// One fused retrieval result, borrowed from the snapshot it came from.
///
/// Ranks are 1-based; `None` means the chunk was absent from that list.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate<'a> {
    pub chunk: &'a Chunk,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
    pub fused_score: f64,
}

/// Run dense and/or sparse search and fuse the results.
///
/// `query_vec` may be `None` (or of the wrong dimension) when the query
/// could not be embedded; the dense list is then empty. Returns an empty
/// list for blank queries.
pub fn retrieve<'a>(
    index: &'a KnowledgeIndex,
    query: &str,
    query_vec: Option<&[f32]>,
    mode: RetrievalMode,
    params: &RetrievalParams,
) -> Vec<Candidate<'a>> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let dense_hits = match (mode.uses_dense(), query_vec) {
        (true, Some(qv)) => index.dense().search(qv, params.dense_k),
        _ => Vec::new(),
    };
    let sparse_hits = if mode.uses_sparse() {
        index.sparse().search(query, params.sparse_k)
    } else {
        Vec::new()
    };

    fuse(index, &dense_hits, &sparse_hits, params)
}

/// Weighted reciprocal-rank fusion of two hit lists, deduplicated by
/// chunk.
pub fn fuse<'a>(
    index: &'a KnowledgeIndex,
    dense_hits: &[ScoredHit],
    sparse_hits: &[ScoredHit],
    params: &RetrievalParams,
) -> Vec<Candidate<'a>> {
    struct Entry {
        first_seen: usize,
        dense_rank: Option<usize>,
        sparse_rank: Option<usize>,
    }

    let mut entries: HashMap<usize, Entry> = HashMap::new();
    let mut order = 0usize;

    let lists = [(dense_hits, true), (sparse_hits, false)];
    for (hits, is_dense) in lists {
        for (pos, hit) in hits.iter().enumerate() {
            let entry = entries.entry(hit.doc).or_insert_with(|| {
                order += 1;
                Entry {
                    first_seen: order,
                    dense_rank: None,
                    sparse_rank: None,
                }
            });
            let slot = if is_dense {
                &mut entry.dense_rank
            } else {
                &mut entry.sparse_rank
            };
            // keep the best rank if a backend ever repeats a chunk
            if slot.is_none() {
                *slot = Some(pos + 1);
            }
        }
    }

    let contribution = |weight: f64, rank: Option<usize>| -> f64 {
        rank.map(|r| weight / (params.rank_constant + r as f64))
            .unwrap_or(0.0)
    };

    let mut scored: Vec<(usize, Candidate<'a>)> = entries
        .into_iter()
        .filter_map(|(doc, e)| {
            let chunk = index.chunk(doc)?;
            let fused_score = contribution(params.dense_weight, e.dense_rank)
                + contribution(params.sparse_weight, e.sparse_rank);
            Some((
                e.first_seen,
                Candidate {
                    chunk,
                    dense_rank: e.dense_rank,
                    sparse_rank: e.sparse_rank,
                    fused_score,
                },
            ))
        })
        .collect();

    scored.sort_by(|(seen_a, a), (seen_b, b)| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a.dense_rank, b.dense_rank) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then(seen_a.cmp(seen_b))
    });

    scored.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, content: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_url: format!("https://acme.com/{}", id),
            category: "other".to_string(),
            title: id.to_string(),
            content: content.to_string(),
            embedding,
        }
    }

    fn index_of(n: usize) -> KnowledgeIndex {
        let chunks = (0..n)
            .map(|i| chunk(&format!("chunk_{i}"), &format!("text {i}"), vec![1.0, i as f32]))
            .collect();
        KnowledgeIndex::build(chunks).unwrap()
    }

    fn hits(docs: &[usize]) -> Vec<ScoredHit> {
        docs.iter()
            .map(|&doc| ScoredHit { doc, score: 1.0 })
            .collect()
    }

    fn ids(cands: &[Candidate<'_>]) -> Vec<String> {
        cands.iter().map(|c| c.chunk.id.clone()).collect()
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("hybrid".parse::<RetrievalMode>().unwrap(), RetrievalMode::Hybrid);
        assert_eq!("keyword".parse::<RetrievalMode>().unwrap(), RetrievalMode::Sparse);
        assert_eq!("semantic".parse::<RetrievalMode>().unwrap(), RetrievalMode::Dense);
        assert!("fuzzy".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn test_fuse_dedupes_by_chunk() {
        let index = index_of(4);
        let fused = fuse(&index, &hits(&[0, 1]), &hits(&[1, 2]), &RetrievalParams::default());
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk.id, "chunk_1");
        assert_eq!(fused[0].dense_rank, Some(2));
        assert_eq!(fused[0].sparse_rank, Some(1));
    }

    #[test]
    fn test_fusion_monotonic_for_every_rank() {
        let index = index_of(25);
        let params = RetrievalParams::default();
        // chunk 0 at `rank`, unique fillers elsewhere
        let list = |rank: usize, filler_base: usize| -> Vec<usize> {
            (1..=5)
                .map(|pos| if pos == rank { 0 } else { filler_base + pos })
                .collect()
        };
        let score_of_zero = |fused: Vec<Candidate<'_>>| -> f64 {
            fused
                .iter()
                .find(|c| c.chunk.id == "chunk_0")
                .map(|c| c.fused_score)
                .unwrap()
        };

        for rank in 1..=5 {
            let both = score_of_zero(fuse(
                &index,
                &hits(&list(rank, 10)),
                &hits(&list(rank, 15)),
                &params,
            ));
            let dense_only = score_of_zero(fuse(&index, &hits(&list(rank, 10)), &[], &params));
            let sparse_only = score_of_zero(fuse(&index, &[], &hits(&list(rank, 15)), &params));
            assert!(both >= dense_only, "rank {rank}: {both} < {dense_only}");
            assert!(both >= sparse_only, "rank {rank}: {both} < {sparse_only}");
        }
    }

    #[test]
    fn test_missing_list_contributes_zero() {
        let index = index_of(2);
        let params = RetrievalParams::default();
        let fused = fuse(&index, &hits(&[0]), &[], &params);
        let expected = params.dense_weight / (params.rank_constant + 1.0);
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_dense_weight_dominates_at_equal_rank() {
        let index = index_of(2);
        let fused = fuse(&index, &hits(&[0]), &hits(&[1]), &RetrievalParams::default());
        assert_eq!(ids(&fused), vec!["chunk_0", "chunk_1"]);
    }

    #[test]
    fn test_ties_broken_by_dense_rank_then_insertion() {
        let index = index_of(4);
        let params = RetrievalParams {
            dense_weight: 0.5,
            sparse_weight: 0.5,
            ..RetrievalParams::default()
        };
        // chunk 2: dense rank 1 only; chunk 3: sparse rank 1 only → equal scores
        let fused = fuse(&index, &hits(&[2]), &hits(&[3]), &params);
        assert_eq!(ids(&fused), vec!["chunk_2", "chunk_3"]);

        // with no sparse weight every sparse-only chunk scores zero
        let zero_sparse = RetrievalParams {
            sparse_weight: 0.0,
            ..params
        };
        let fused = fuse(&index, &[], &hits(&[3, 1]), &zero_sparse);
        assert_eq!(ids(&fused), vec!["chunk_3", "chunk_1"]);
    }

    #[test]
    fn test_retrieve_modes() {
        let chunks = vec![
            chunk("chunk_0", "R&D tax credits carry forward 20 years", vec![1.0, 0.0]),
            chunk("chunk_1", "Our office is closed on holidays", vec![0.0, 1.0]),
        ];
        let index = KnowledgeIndex::build(chunks).unwrap();
        let params = RetrievalParams::default();
        let qv = [0.9f32, 0.1];

        let sparse = retrieve(&index, "tax credits", Some(&qv), RetrievalMode::Sparse, &params);
        assert_eq!(ids(&sparse), vec!["chunk_0"]);
        assert!(sparse[0].dense_rank.is_none());

        let dense = retrieve(&index, "tax credits", Some(&qv), RetrievalMode::Dense, &params);
        assert_eq!(ids(&dense), vec!["chunk_0", "chunk_1"]);
        assert!(dense.iter().all(|c| c.sparse_rank.is_none()));

        let hybrid = retrieve(&index, "tax credits", Some(&qv), RetrievalMode::Hybrid, &params);
        assert_eq!(ids(&hybrid), vec!["chunk_0", "chunk_1"]);
        assert_eq!(hybrid[0].dense_rank, Some(1));
        assert_eq!(hybrid[0].sparse_rank, Some(1));
    }

    #[test]
    fn test_retrieve_without_query_vector_is_sparse_only() {
        let chunks = vec![
            chunk("chunk_0", "tax credits", vec![1.0, 0.0]),
            chunk("chunk_1", "holidays", vec![0.0, 1.0]),
        ];
        let index = KnowledgeIndex::build(chunks).unwrap();
        let out = retrieve(&index, "tax", None, RetrievalMode::Hybrid, &RetrievalParams::default());
        assert_eq!(ids(&out), vec!["chunk_0"]);
    }

    #[test]
    fn test_blank_query_returns_nothing() {
        let index = index_of(3);
        let out = retrieve(&index, "   ", Some(&[1.0, 0.0]), RetrievalMode::Hybrid, &RetrievalParams::default());
        assert!(out.is_empty());
    }
}
