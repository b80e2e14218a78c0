//! Cosine nearest-neighbour monitoring.
//!
//! Works on L2-normalized embeddings, where cosine similarity is a plain
//! dot product. Each query keeps a bounded min-heap of its best `k`
//! candidates so a full sort of the vocabulary is never needed.

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

use rand::{Rng, seq::index};
use rayon::prelude::*;

use crate::{config::EvaluationConfig, error::ConfigError, types::WordId};

/// One neighbour of a query word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub id: WordId,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Neighbours of one validation word, most similar first.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourList {
    pub query: WordId,
    pub neighbours: Vec<Neighbour>,
}

/// Heap entry ranking candidates by similarity.
///
/// Higher similarity is greater; among equal similarities the lower id is
/// greater, so it is kept over a higher id and listed first.
#[derive(Debug, Clone, Copy)]
struct Candidate(Neighbour);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .similarity
            .total_cmp(&other.0.similarity)
            .then_with(|| other.0.id.cmp(&self.0.id))
    }
}

/// Returns the `k` ids most similar to `query`, excluding `query` itself.
///
/// # Arguments
///
/// * `normalized` - Row-major V x `dim` matrix with unit (or zero) rows.
/// * `dim` - Row length.
/// * `query` - Id of the query row.
/// * `k` - Number of neighbours; fewer are returned if the matrix has fewer
///   other rows.
///
/// # Returns
///
/// Neighbours ordered by descending similarity, ties by ascending id. NaN
/// similarities rank below every number. An out-of-range `query` yields no
/// neighbours.
pub fn nearest(normalized: &[f32], dim: usize, query: WordId, k: usize) -> Vec<Neighbour> {
    if dim == 0 || k == 0 {
        return Vec::new();
    }
    let Some(q) = normalized.get(query * dim..(query + 1) * dim) else {
        return Vec::new();
    };

    // Min-heap of the best k seen so far: the root is the weakest keeper.
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
    for (id, row) in normalized.chunks_exact(dim).enumerate() {
        if id == query {
            continue;
        }
        let mut similarity: f32 = q.iter().zip(row).map(|(a, b)| a * b).sum();
        if similarity.is_nan() {
            similarity = f32::NEG_INFINITY;
        }
        let candidate = Candidate(Neighbour { id, similarity });

        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if heap.peek().is_some_and(|Reverse(weakest)| candidate > *weakest) {
            heap.pop();
            heap.push(Reverse(candidate));
        }
    }

    // Ascending order of Reverse is descending order of Candidate.
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(Candidate(n))| n)
        .collect()
}

/// Fixed validation words and the neighbour count to report for them.
#[derive(Debug, Clone)]
pub struct SimilarityEvaluator {
    valid_ids: Vec<WordId>,
    top_k: usize,
}

impl SimilarityEvaluator {
    /// Creates an evaluator for explicit validation ids.
    pub fn new(valid_ids: Vec<WordId>, top_k: usize) -> Self {
        Self { valid_ids, top_k }
    }

    /// Draws `valid_size` distinct ids from `[0, min(valid_window, V))`.
    ///
    /// The UNKNOWN id is part of the band and may be drawn.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not fit a vocabulary of
    /// `vocabulary_size` entries.
    pub fn sample<R: Rng + ?Sized>(
        config: &EvaluationConfig,
        vocabulary_size: usize,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate(vocabulary_size)?;
        let band = config.valid_window.min(vocabulary_size);
        let mut valid_ids = index::sample(rng, band, config.valid_size).into_vec();
        valid_ids.sort_unstable();
        Ok(Self::new(valid_ids, config.top_k))
    }

    /// Validation ids in ascending order.
    pub fn valid_ids(&self) -> &[WordId] {
        &self.valid_ids
    }

    /// Neighbours reported per validation id.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Scores every validation word against the whole vocabulary.
    ///
    /// Queries run in parallel; results keep the order of [`Self::valid_ids`].
    pub fn evaluate(&self, normalized: &[f32], dim: usize) -> Vec<NeighbourList> {
        self.valid_ids
            .par_iter()
            .map(|&query| NeighbourList {
                query,
                neighbours: nearest(normalized, dim, query, self.top_k),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    /// Unit vectors at angles 0, 10, 20, ... degrees in the plane.
    fn fan(n: usize) -> Vec<f32> {
        (0..n)
            .flat_map(|i| {
                let theta = (i as f32 * 10.0).to_radians();
                [theta.cos(), theta.sin()]
            })
            .collect()
    }

    #[test]
    fn test_nearest_orders_by_similarity() {
        let m = fan(6);
        let mut ids: Vec<WordId> = nearest(&m, 2, 2, 4).iter().map(|n| n.id).collect();
        // 1 and 3 are both 10 degrees away, 0 and 4 both 20 degrees.
        ids[..2].sort_unstable();
        ids[2..].sort_unstable();
        assert_eq!(ids, vec![1, 3, 0, 4]);
        assert_eq!(ids.len(), 4);
        assert!(!ids.contains(&2));
    }

    #[test]
    fn test_similarities_non_increasing() {
        let m = fan(12);
        let result = nearest(&m, 2, 5, 8);
        assert_eq!(result.len(), 8);
        assert!(result.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_exact_ties_break_by_id() {
        let m = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let ids: Vec<WordId> = nearest(&m, 2, 3, 2).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_nan_rows_rank_last() {
        let m = vec![1.0, 0.0, f32::NAN, 0.0, 0.0, 1.0];
        let result = nearest(&m, 2, 0, 2);
        assert_eq!(result[0].id, 2);
        assert_eq!(result[1].id, 1);
        assert_eq!(result[1].similarity, f32::NEG_INFINITY);
    }

    #[test]
    fn test_k_larger_than_vocabulary() {
        let m = fan(3);
        assert_eq!(nearest(&m, 2, 0, 10).len(), 2);
        assert!(nearest(&m, 2, 7, 2).is_empty());
    }

    #[test]
    fn test_sample_draws_distinct_ids_in_band() {
        let config = EvaluationConfig {
            valid_size: 16,
            valid_window: 100,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let eval = SimilarityEvaluator::sample(&config, 1000, &mut rng)
            .expect("evaluator should build");
        let ids = eval.valid_ids();
        assert_eq!(ids.len(), 16);
        assert!(ids.iter().all(|&id| id < 100));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_sample_clamps_band_to_vocabulary() {
        let config = EvaluationConfig {
            valid_size: 5,
            valid_window: 100,
            top_k: 3,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let eval = SimilarityEvaluator::sample(&config, 5, &mut rng)
            .expect("evaluator should build");
        assert_eq!(eval.valid_ids(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_evaluate_keeps_query_order() {
        let m = fan(10);
        let eval = SimilarityEvaluator::new(vec![7, 2, 4], 3);
        let lists = eval.evaluate(&m, 2);
        let queries: Vec<WordId> = lists.iter().map(|l| l.query).collect();
        assert_eq!(queries, vec![7, 2, 4]);
        for list in &lists {
            assert_eq!(list.neighbours.len(), 3);
            assert!(list.neighbours.iter().all(|n| n.id != list.query));
        }
    }
}
