//! NDCG / Recall / MRR / MAP / HitRate at K
//!
//! All metrics take the ranked document ids (best first, no duplicates) and
//! the query's relevance judgments. Every metric is 0 when the query has no
//! relevant documents.

use std::collections::{BTreeMap, HashSet};

use crate::types::{MetricSet, RelevanceJudgments, RetrievedCandidate};

/// Collapse a candidate list to document ids, keeping each document's best position.
///
/// Chunked pipelines can return several passages of one document; metrics
/// are judged per document.
pub fn ranked_doc_ids(candidates: &[RetrievedCandidate]) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| seen.insert(c.parent_id.as_str()))
        .map(|c| c.parent_id.clone())
        .collect()
}

/// Discounted cumulative gain of relevance values in rank order.
///
/// `DCG = Σ rel_i / log2(i + 1)` with 1-based `i`.
pub fn dcg(relevances: &[f64]) -> f64 {
    relevances
        .iter()
        .enumerate()
        .map(|(i, rel)| rel / ((i + 2) as f64).log2())
        .sum()
}

fn top_k_grades(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> Vec<f64> {
    ranked.iter().take(k).map(|id| judgments.grade(id)).collect()
}

/// NDCG@K. The ideal ordering is the same top-K relevance values sorted descending.
pub fn ndcg_at_k(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> f64 {
    let grades = top_k_grades(ranked, judgments, k);
    let actual = dcg(&grades);

    let mut ideal_grades = grades;
    ideal_grades.sort_by(|a, b| b.total_cmp(a));
    let ideal = dcg(&ideal_grades);

    if ideal == 0.0 {
        0.0
    } else {
        actual / ideal
    }
}

/// Fraction of all relevant documents found in the top K
pub fn recall_at_k(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> f64 {
    let total = judgments.relevant_count();
    if total == 0 {
        return 0.0;
    }
    let found = ranked
        .iter()
        .take(k)
        .filter(|id| judgments.is_relevant(id))
        .count();
    found as f64 / total as f64
}

/// Reciprocal rank of the first relevant document within the top K
pub fn mrr_at_k(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> f64 {
    ranked
        .iter()
        .take(k)
        .position(|id| judgments.is_relevant(id))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0)
}

/// Average precision at K, normalised by the number of relevant documents
pub fn map_at_k(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> f64 {
    let total = judgments.relevant_count();
    if total == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (i, id) in ranked.iter().take(k).enumerate() {
        if judgments.is_relevant(id) {
            hits += 1;
            precision_sum += hits as f64 / (i + 1) as f64;
        }
    }
    precision_sum / total as f64
}

/// 1 if any of the top K is relevant
pub fn hit_rate_at_k(ranked: &[String], judgments: &RelevanceJudgments, k: usize) -> f64 {
    if ranked.iter().take(k).any(|id| judgments.is_relevant(id)) {
        1.0
    } else {
        0.0
    }
}

/// Compute the full metric set at every requested cutoff
pub fn evaluate(
    ranked: &[String],
    judgments: &RelevanceJudgments,
    k_values: &[usize],
) -> BTreeMap<usize, MetricSet> {
    k_values
        .iter()
        .map(|&k| {
            let set = MetricSet {
                ndcg: ndcg_at_k(ranked, judgments, k),
                recall: recall_at_k(ranked, judgments, k),
                mrr: mrr_at_k(ranked, judgments, k),
                map: map_at_k(ranked, judgments, k),
                hit_rate: hit_rate_at_k(ranked, judgments, k),
            };
            (k, set)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestCase;
    use quickcheck_macros::quickcheck;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_no_relevant_items_scores_zero() {
        let judgments = TestCase::new("q", "x", Vec::<String>::new()).judgments();
        let ranked = ids(&["a", "b", "c"]);
        let m = evaluate(&ranked, &judgments, &[1, 10]);
        for set in m.values() {
            assert_eq!(set.ndcg, 0.0);
            assert_eq!(set.recall, 0.0);
            assert_eq!(set.map, 0.0);
            assert_eq!(set.mrr, 0.0);
            assert_eq!(set.hit_rate, 0.0);
        }
    }

    #[test]
    fn test_relevant_items_outside_list_score_zero() {
        let judgments = TestCase::new("q", "x", ["d9"]).judgments();
        let ranked = ids(&["a", "b"]);
        assert_eq!(ndcg_at_k(&ranked, &judgments, 10), 0.0);
        assert_eq!(recall_at_k(&ranked, &judgments, 10), 0.0);
        assert_eq!(hit_rate_at_k(&ranked, &judgments, 10), 0.0);
    }

    #[test]
    fn test_ideal_ordering_has_unit_ndcg() {
        let judgments = TestCase::new("q", "x", ["a", "b", "c"])
            .with_scores(vec![3.0, 2.0, 1.0])
            .judgments();
        let ranked = ids(&["a", "b", "c", "z"]);
        assert!(approx(ndcg_at_k(&ranked, &judgments, 4), 1.0));

        let shuffled = ids(&["c", "a", "b"]);
        assert!(ndcg_at_k(&shuffled, &judgments, 3) < 1.0);
    }

    #[test]
    fn test_dcg_formula() {
        // 1/log2(2) + 0 + 1/log2(4)
        assert!(approx(dcg(&[1.0, 0.0, 1.0]), 1.5));
    }

    #[test]
    fn test_mrr_uses_first_relevant_rank() {
        let judgments = TestCase::new("q", "x", ["c"]).judgments();
        let ranked = ids(&["a", "b", "c"]);
        assert!(approx(mrr_at_k(&ranked, &judgments, 3), 1.0 / 3.0));
        assert_eq!(mrr_at_k(&ranked, &judgments, 2), 0.0);
    }

    #[test]
    fn test_map_normalises_by_all_relevant() {
        let judgments = TestCase::new("q", "x", ["a", "c", "missing"]).judgments();
        let ranked = ids(&["a", "b", "c"]);
        // (1/1 + 2/3) / 3
        assert!(approx(map_at_k(&ranked, &judgments, 3), (1.0 + 2.0 / 3.0) / 3.0));
    }

    #[test]
    fn test_recall_partial() {
        let judgments = TestCase::new("q", "x", ["a", "b"]).judgments();
        let ranked = ids(&["a", "x", "b"]);
        assert!(approx(recall_at_k(&ranked, &judgments, 1), 0.5));
        assert!(approx(recall_at_k(&ranked, &judgments, 3), 1.0));
    }

    #[test]
    fn test_ranked_doc_ids_collapses_chunks() {
        let candidates = vec![
            RetrievedCandidate::new("d1#0", "d1", "", 0.9),
            RetrievedCandidate::new("d2#0", "d2", "", 0.8),
            RetrievedCandidate::new("d1#1", "d1", "", 0.7),
        ];
        assert_eq!(ranked_doc_ids(&candidates), ids(&["d1", "d2"]));
    }

    fn build(ranking: Vec<u8>, relevant: Vec<u8>) -> (Vec<String>, RelevanceJudgments) {
        let mut seen = HashSet::new();
        let ranked: Vec<String> = ranking
            .into_iter()
            .filter(|v| seen.insert(*v))
            .map(|v| format!("d{v}"))
            .collect();
        let relevant: Vec<String> = relevant
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|v| format!("d{v}"))
            .collect();
        (ranked, TestCase::new("q", "x", relevant).judgments())
    }

    #[quickcheck]
    fn prop_recall_non_decreasing_in_k(ranking: Vec<u8>, relevant: Vec<u8>) -> bool {
        let (ranked, judgments) = build(ranking, relevant);
        let mut previous = 0.0;
        for k in 1..=ranked.len() + 1 {
            let recall = recall_at_k(&ranked, &judgments, k);
            if recall + 1e-12 < previous {
                return false;
            }
            previous = recall;
        }
        true
    }

    #[quickcheck]
    fn prop_metrics_bounded(ranking: Vec<u8>, relevant: Vec<u8>, k: u8) -> bool {
        let (ranked, judgments) = build(ranking, relevant);
        let k = usize::from(k) + 1;
        let metrics = evaluate(&ranked, &judgments, &[k]);
        let set = &metrics[&k];
        [set.ndcg, set.recall, set.mrr, set.map, set.hit_rate]
            .iter()
            .all(|v| (0.0..=1.0 + 1e-9).contains(v))
    }
}
