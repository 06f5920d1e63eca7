use network_centrality::cache::graph_fingerprint;
use network_centrality::engine::CentralityEngine;
use network_centrality::formatter::rank_scores;
use network_centrality::graph::{Graph, GraphLimits};
use network_centrality::{AlgorithmParams, CentralityError, CentralityKind, GraphPayload};
use proptest::prelude::*;
use std::collections::HashMap;

const LIMITS: GraphLimits = GraphLimits {
    max_nodes: 1_000,
    max_edges: 10_000,
};

/// Node count plus an edge list over those nodes, self-loops excluded
fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..30)
            .prop_map(|pairs| pairs.into_iter().filter(|(a, b)| a != b).collect());
        (Just(n), edges)
    })
}

fn build(n: usize, edges: &[(usize, usize)], directed: bool) -> Graph {
    let order: Vec<usize> = (0..n).collect();
    Graph::from_payload(&payload(n, edges, &order, directed), LIMITS).unwrap()
}

fn payload(n: usize, edges: &[(usize, usize)], node_order: &[usize], directed: bool) -> GraphPayload {
    let mut payload = GraphPayload::new(directed);
    for &i in node_order {
        payload = payload.with_node(format!("n{}", i));
    }
    for &(a, b) in edges {
        payload = payload.with_edge(format!("n{}", a), format!("n{}", b));
    }
    assert_eq!(payload.nodes.len(), n);
    payload
}

proptest! {
    #[test]
    fn fingerprint_ignores_declaration_order((n, edges) in arb_graph(), directed in any::<bool>()) {
        let forward: Vec<usize> = (0..n).collect();
        let backward: Vec<usize> = (0..n).rev().collect();
        let mut shuffled_edges = edges.clone();
        shuffled_edges.reverse();

        let a = Graph::from_payload(&payload(n, &edges, &forward, directed), LIMITS).unwrap();
        let b = Graph::from_payload(&payload(n, &shuffled_edges, &backward, directed), LIMITS).unwrap();
        prop_assert_eq!(graph_fingerprint(&a), graph_fingerprint(&b));
    }

    #[test]
    fn ranking_is_total_and_deterministic(scores in prop::collection::vec(0u8..4, 1..20)) {
        let order: Vec<usize> = (0..scores.len()).collect();
        let graph = Graph::from_payload(&payload(scores.len(), &[], &order, false), LIMITS).unwrap();
        let map: HashMap<String, f64> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| (format!("n{}", i), f64::from(s)))
            .collect();

        let ranked = rank_scores(&graph, &map);
        prop_assert_eq!(&ranked, &rank_scores(&graph, &map));
        prop_assert_eq!(ranked.len(), scores.len());

        for (position, pair) in ranked.windows(2).enumerate() {
            prop_assert_eq!(pair[0].rank, position + 1);
            prop_assert!(pair[0].centrality_score >= pair[1].centrality_score);
            if pair[0].centrality_score == pair[1].centrality_score {
                let first = graph.node_index(&pair[0].node_id).unwrap();
                let second = graph.node_index(&pair[1].node_id).unwrap();
                prop_assert!(first < second);
            }
        }
        prop_assert!((ranked[0].percentile - 100.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_degree_stays_in_unit_interval((n, edges) in arb_graph()) {
        let order: Vec<usize> = (0..n).collect();
        let graph = Graph::from_payload(&payload(n, &edges, &order, false), LIMITS).unwrap();
        let scores = CentralityEngine::default()
            .compute(&graph, CentralityKind::Degree, &AlgorithmParams::default())
            .unwrap();
        for score in scores.scores.values() {
            prop_assert!((0.0..=1.0).contains(score), "degree {} out of range", score);
        }
    }

    #[test]
    fn pagerank_is_a_distribution((n, edges) in arb_graph(), directed in any::<bool>()) {
        let order: Vec<usize> = (0..n).collect();
        let graph = Graph::from_payload(&payload(n, &edges, &order, directed), LIMITS).unwrap();
        let scores = CentralityEngine::default()
            .compute(&graph, CentralityKind::PageRank, &AlgorithmParams::default())
            .unwrap();
        prop_assert_eq!(scores.computed_with, CentralityKind::PageRank);

        let total: f64 = scores.scores.values().sum();
        prop_assert!((total - 1.0).abs() < 1e-4, "pagerank sums to {}", total);
        prop_assert!(scores.scores.values().all(|s| *s >= 0.0));
    }

    #[test]
    fn undirected_path_and_local_measures_stay_in_unit_interval((n, edges) in arb_graph()) {
        let graph = build(n, &edges, false);
        for kind in [
            CentralityKind::Betweenness,
            CentralityKind::Load,
            CentralityKind::Closeness,
            CentralityKind::Harmonic,
            CentralityKind::Leverage,
        ] {
            let scores = CentralityEngine::default()
                .compute(&graph, kind, &AlgorithmParams::default())
                .unwrap();
            for (node, score) in &scores.scores {
                prop_assert!(
                    (-1e-9..=1.0 + 1e-9).contains(score),
                    "{} gave {} to {}", kind, score, node
                );
            }
        }
    }

    #[test]
    fn max_scaled_measures_peak_at_one((n, edges) in arb_graph(), directed in any::<bool>()) {
        let graph = build(n, &edges, directed);
        for kind in [
            CentralityKind::Eigenvector,
            CentralityKind::Katz,
            CentralityKind::BonacichPower,
            CentralityKind::Subgraph,
            CentralityKind::CommunicabilityBetweenness,
        ] {
            let scores = CentralityEngine::default()
                .compute(&graph, kind, &AlgorithmParams::default())
                .unwrap();
            let peak = scores.scores.values().fold(0.0_f64, |m, s| m.max(s.abs()));
            prop_assert!(
                peak == 0.0 || (peak - 1.0).abs() < 1e-9,
                "{} (computed with {}) peaks at {}", kind, scores.computed_with, peak
            );
        }
    }

    #[test]
    fn hits_scores_sum_to_one((n, edges) in arb_graph(), directed in any::<bool>()) {
        let graph = build(n, &edges, directed);
        for kind in [CentralityKind::HitsHubs, CentralityKind::HitsAuthorities] {
            match CentralityEngine::default().compute(&graph, kind, &AlgorithmParams::default()) {
                Ok(scores) => {
                    prop_assert_eq!(scores.computed_with, kind);
                    let total: f64 = scores.scores.values().sum();
                    prop_assert!(
                        total == 0.0 || (total - 1.0).abs() < 1e-9,
                        "{} sums to {}", kind, total
                    );
                    prop_assert!(scores.scores.values().all(|s| *s >= 0.0));
                }
                // slow mixing can exhaust the iteration budget; HITS has no fallback
                Err(e) => prop_assert!(matches!(e, CentralityError::AlgorithmError { .. }), "{}", e),
            }
        }
    }
}
