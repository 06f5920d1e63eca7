use std::cmp::Ordering;
use std::collections::HashMap;

use crate::graph::Graph;
use crate::models::RankedScore;

/// Rank raw scores against the node order of `graph`.
///
/// Scores sort descending; equal scores keep the graph's node insertion
/// order. Ranks are 1-based and `percentile = (N - rank + 1) / N * 100`.
/// Nodes without a score are left out.
pub fn rank_scores(graph: &Graph, scores: &HashMap<String, f64>) -> Vec<RankedScore> {
    let mut ordered: Vec<(&str, f64)> = graph
        .node_ids()
        .iter()
        .filter_map(|id| scores.get(id).map(|&score| (id.as_str(), score)))
        .collect();

    // stable sort, so ties stay in insertion order
    ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let total = ordered.len() as f64;
    ordered
        .into_iter()
        .enumerate()
        .map(|(position, (node_id, score))| {
            let rank = position + 1;
            RankedScore {
                node_id: node_id.to_string(),
                centrality_score: score,
                rank,
                percentile: (total - rank as f64 + 1.0) / total * 100.0,
            }
        })
        .collect()
}

/// Pair kernel output (indexed like the graph's nodes) with node ids.
pub fn score_map(graph: &Graph, scores: &[f64]) -> HashMap<String, f64> {
    graph
        .node_ids()
        .iter()
        .cloned()
        .zip(scores.iter().copied())
        .collect()
}

pub fn top_n(results: &[RankedScore], n: usize) -> Vec<RankedScore> {
    results.iter().take(n).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphLimits;
    use crate::models::GraphPayload;

    fn graph(ids: &[&str]) -> Graph {
        let payload = ids
            .iter()
            .fold(GraphPayload::new(false), |p, id| p.with_node(*id));
        Graph::from_payload(
            &payload,
            GraphLimits {
                max_nodes: 100,
                max_edges: 100,
            },
        )
        .unwrap()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_ranks_descending_with_percentiles() {
        let g = graph(&["a", "b", "c", "d"]);
        let ranked = rank_scores(&g, &scores(&[("a", 0.1), ("b", 0.9), ("c", 0.5), ("d", 0.3)]));
        let order: Vec<&str> = ranked.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "d", "a"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].percentile, 100.0);
        assert_eq!(ranked[3].percentile, 25.0);
    }

    #[test]
    fn test_ties_follow_insertion_order() {
        let g = graph(&["z", "y", "x"]);
        let ranked = rank_scores(&g, &scores(&[("x", 1.0), ("y", 1.0), ("z", 1.0)]));
        let order: Vec<&str> = ranked.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(order, vec!["z", "y", "x"]);
        assert_eq!(ranked.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_scores() {
        assert!(rank_scores(&graph(&[]), &HashMap::new()).is_empty());
    }

    #[test]
    fn test_score_map_and_top_n() {
        let g = graph(&["a", "b", "c"]);
        let map = score_map(&g, &[0.2, 0.7, 0.1]);
        assert_eq!(map["b"], 0.7);
        let ranked = rank_scores(&g, &map);
        let top = top_n(&ranked, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].node_id, "a");
        assert_eq!(top_n(&ranked, 10).len(), 3);
    }
}
