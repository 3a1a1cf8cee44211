//! Reciprocal Rank Fusion over ranked search results.
//!
//! # Algorithm
//!
//! Given `m` ranked lists (rank positions start at 1) and a constant `K`:
//!
//! ```text
//! fused(key) = Σ_i  1 / (K + rank_i(key))      over lists i containing key
//! ```
//!
//! A key missing from a list contributes nothing for that list. A key that
//! appears more than once in the same list counts only at its best rank.
//!
//! Output is sorted by fused score (descending), then by best rank across
//! the lists the key appeared in (ascending), then by primary key
//! (ascending), and truncated to `limit`. Raw store scores are ignored:
//! only positions matter, so lists with incomparable score scales (BM25
//! term weights vs. cosine similarity) fuse cleanly.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::{PrimaryKey, SearchHit};

/// Fusion constant used when the caller does not supply one.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// One entry of a fused result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub id: PrimaryKey,
    pub score: f64,
    /// Rank of this key in each input list, `None` where it was absent.
    pub ranks: Vec<Option<usize>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl FusedHit {
    /// Best (lowest) rank across contributing lists.
    pub fn best_rank(&self) -> usize {
        self.ranks.iter().flatten().copied().min().unwrap_or(usize::MAX)
    }
}

/// Fuse `lists` with constant `k`, keeping at most `limit` entries.
///
/// A non-positive `limit` yields an empty list.
pub fn reciprocal_rank_fusion(lists: &[Vec<SearchHit>], k: f64, limit: i64) -> Vec<FusedHit> {
    if limit <= 0 {
        return Vec::new();
    }

    let mut acc: BTreeMap<PrimaryKey, (Vec<Option<usize>>, Map<String, Value>)> = BTreeMap::new();
    for (list_idx, hits) in lists.iter().enumerate() {
        for (pos, hit) in hits.iter().enumerate() {
            let (ranks, fields) = acc
                .entry(hit.id.clone())
                .or_insert_with(|| (vec![None; lists.len()], Map::new()));
            // positions increase, so the first occurrence is the best rank
            if ranks[list_idx].is_none() {
                ranks[list_idx] = Some(pos + 1);
            }
            for (name, value) in &hit.fields {
                fields.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    let mut fused: Vec<FusedHit> = acc
        .into_iter()
        .map(|(id, (ranks, fields))| {
            let score = ranks
                .iter()
                .flatten()
                .map(|&rank| 1.0 / (k + rank as f64))
                .sum();
            FusedHit {
                id,
                score,
                ranks,
                fields,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.best_rank().cmp(&b.best_rank()))
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(limit as usize);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: i64) -> SearchHit {
        SearchHit {
            id: PrimaryKey::Int(id),
            score: 0.0,
            fields: Map::new(),
        }
    }

    fn hit_with(id: i64, field: &str, value: Value) -> SearchHit {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        SearchHit {
            id: PrimaryKey::Int(id),
            score: 0.0,
            fields,
        }
    }

    fn ids(fused: &[FusedHit]) -> Vec<i64> {
        fused
            .iter()
            .map(|f| match f.id {
                PrimaryKey::Int(i) => i,
                PrimaryKey::Str(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_union_of_keys_sorted_by_score() {
        let sparse = vec![hit(1), hit(2), hit(3)];
        let dense = vec![hit(3), hit(4)];
        let fused = reciprocal_rank_fusion(&[sparse, dense], DEFAULT_RRF_K, 10);

        assert_eq!(fused.len(), 4);
        assert_eq!(ids(&fused)[0], 3);
        for pair in fused.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let three = &fused[0];
        let expected = 1.0 / 63.0 + 1.0 / 61.0;
        assert!((three.score - expected).abs() < 1e-12);
        assert_eq!(three.ranks, vec![Some(3), Some(1)]);
    }

    #[test]
    fn test_key_in_both_lists_beats_single_list_same_rank() {
        let a = vec![hit(1), hit(2)];
        let b = vec![hit(2), hit(9)];
        let fused = reciprocal_rank_fusion(&[a, b], DEFAULT_RRF_K, 10);
        // 2 is rank 2 + rank 1; 1 is rank 1 only
        assert_eq!(ids(&fused), vec![2, 1, 9]);
    }

    #[test]
    fn test_ties_break_by_best_rank_then_key() {
        // 5 and 7 both appear once at rank 1, 4 once at rank 2
        let a = vec![hit(7), hit(4)];
        let b = vec![hit(5)];
        let fused = reciprocal_rank_fusion(&[a, b], DEFAULT_RRF_K, 10);
        assert_eq!(ids(&fused), vec![5, 7, 4]);
    }

    #[test]
    fn test_repeated_key_counts_at_best_rank() {
        let a = vec![hit(1), hit(2), hit(1)];
        let fused = reciprocal_rank_fusion(&[a], DEFAULT_RRF_K, 10);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert_eq!(fused[0].ranks, vec![Some(1)]);
    }

    #[test]
    fn test_limit_caps_output() {
        let a: Vec<SearchHit> = (1..=8).map(hit).collect();
        let b: Vec<SearchHit> = (5..=12).map(hit).collect();
        assert_eq!(reciprocal_rank_fusion(&[a.clone(), b.clone()], 60.0, 5).len(), 5);
        assert!(reciprocal_rank_fusion(&[a.clone(), b.clone()], 60.0, 0).is_empty());
        assert!(reciprocal_rank_fusion(&[a, b], 60.0, -1).is_empty());
    }

    #[test]
    fn test_fields_merge_first_list_wins() {
        let a = vec![hit_with(1, "title", json!("from sparse"))];
        let b = vec![
            hit_with(1, "title", json!("from dense")),
            hit_with(2, "title", json!("only dense")),
        ];
        let mut b1 = b[0].clone();
        b1.fields.insert("year".into(), json!(2024));
        let fused = reciprocal_rank_fusion(&[a, vec![b1, b[1].clone()]], 60.0, 10);

        assert_eq!(fused[0].fields["title"], json!("from sparse"));
        assert_eq!(fused[0].fields["year"], json!(2024));
        assert_eq!(fused[1].fields["title"], json!("only dense"));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], 60.0, 5).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 60.0, 5).is_empty());
    }
}
