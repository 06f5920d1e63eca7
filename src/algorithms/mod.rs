//! Numeric kernels for every supported centrality measure.
//!
//! Each kernel has the same shape: it reads a [`Graph`] and an
//! [`AlgorithmParams`] bundle and returns one score per node, indexed like
//! [`Graph::node_ids`]. Kernels never fall back on their own; they report a
//! [`KernelError`] and the engine decides what to do with it.

pub mod matrix;
pub mod paths;
pub mod spectral;
pub mod structural;

use std::time::{Duration, Instant};

use crate::error::KernelError;
use crate::graph::Graph;
use crate::models::{AlgorithmParams, CentralityKind};

pub type KernelResult = std::result::Result<Vec<f64>, KernelError>;

/// Wall-clock point after which a kernel stops at its next checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }
}

/// Limits a kernel has to respect that do not come from the request
#[derive(Debug, Clone, Copy)]
pub struct KernelContext {
    /// Node count above which dense O(n^3) methods refuse to run
    pub matrix_node_limit: usize,
    /// Lower ceiling for communicability betweenness, which is O(n^4)
    pub communicability_node_limit: usize,
    pub deadline: Option<Deadline>,
}

impl Default for KernelContext {
    fn default() -> Self {
        Self {
            matrix_node_limit: 2_000,
            communicability_node_limit: 200,
            deadline: None,
        }
    }
}

impl KernelContext {
    /// Called from every kernel's outer loop.
    pub(crate) fn checkpoint(&self) -> std::result::Result<(), KernelError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline.at => Err(KernelError::DeadlineExceeded {
                budget: deadline.budget,
            }),
            _ => Ok(()),
        }
    }
}

pub type Kernel = fn(&Graph, &AlgorithmParams, &KernelContext) -> KernelResult;

/// Dispatch table from algorithm kind to implementation.
pub fn kernel(kind: CentralityKind) -> Kernel {
    match kind {
        CentralityKind::Degree => structural::degree,
        CentralityKind::Leverage => structural::leverage,
        CentralityKind::Betweenness => paths::betweenness,
        CentralityKind::Load => paths::load,
        CentralityKind::Closeness => paths::closeness,
        CentralityKind::Harmonic => paths::harmonic,
        CentralityKind::Eigenvector => spectral::eigenvector,
        CentralityKind::Katz => spectral::katz,
        CentralityKind::PageRank => spectral::pagerank,
        CentralityKind::BonacichPower => spectral::bonacich_power,
        CentralityKind::HitsHubs => spectral::hits_hubs,
        CentralityKind::HitsAuthorities => spectral::hits_authorities,
        CentralityKind::Alpha => matrix::alpha,
        CentralityKind::Subgraph => matrix::subgraph,
        CentralityKind::CommunicabilityBetweenness => matrix::communicability_betweenness,
    }
}

/// Documented substitute for an algorithm that failed, if it has one.
pub fn fallback(kind: CentralityKind) -> Option<CentralityKind> {
    match kind {
        CentralityKind::Eigenvector => Some(CentralityKind::Katz),
        CentralityKind::Load => Some(CentralityKind::Betweenness),
        CentralityKind::Subgraph => Some(CentralityKind::Degree),
        CentralityKind::Alpha => Some(CentralityKind::Katz),
        CentralityKind::CommunicabilityBetweenness => Some(CentralityKind::Betweenness),
        _ => None,
    }
}

/// Parameters the fallback runs with. Eigenvector falls back to Katz with a
/// fixed attenuation of 0.1 and at least the default iteration budget; every
/// other substitution keeps the request's.
pub fn fallback_params(from: CentralityKind, params: &AlgorithmParams) -> AlgorithmParams {
    match from {
        CentralityKind::Eigenvector => AlgorithmParams {
            alpha: Some(0.1),
            max_iter: params.max_iter.max(AlgorithmParams::default().max_iter),
            ..params.clone()
        },
        _ => params.clone(),
    }
}

/// Divide every score by the largest absolute score, leaving all-zero vectors alone.
pub(crate) fn scale_by_max(scores: &mut [f64]) {
    let max = scores.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
    if max > 0.0 {
        for score in scores.iter_mut() {
            *score /= max;
        }
    }
}

/// Divide every score by the vector's Euclidean norm.
pub(crate) fn scale_to_unit_norm(scores: &mut [f64]) {
    let norm = scores.iter().map(|s| s * s).sum::<f64>().sqrt();
    if norm > 0.0 {
        for score in scores.iter_mut() {
            *score /= norm;
        }
    }
}

/// Divide every score by the sum of scores.
pub(crate) fn scale_to_unit_sum(scores: &mut [f64]) {
    let total: f64 = scores.iter().sum();
    if total != 0.0 {
        for score in scores.iter_mut() {
            *score /= total;
        }
    }
}

/// L1 distance between two iterates
pub(crate) fn l1_change(current: &[f64], previous: &[f64]) -> f64 {
    current
        .iter()
        .zip(previous)
        .map(|(a, b)| (a - b).abs())
        .sum()
}

/// Edge weight that has to be usable as a distance or transition mass.
pub(crate) fn non_negative_weight(
    graph: &Graph,
    edge: usize,
    attribute: Option<&str>,
) -> std::result::Result<f64, KernelError> {
    let weight = graph.edge_weight(edge, attribute);
    if weight.is_finite() && weight >= 0.0 {
        Ok(weight)
    } else {
        let edge = &graph.edges()[edge];
        Err(KernelError::numeric(format!(
            "edge {} -> {} has weight {} which cannot be used as a distance",
            graph.node_id(edge.source),
            graph.node_id(edge.target),
            weight
        )))
    }
}

#[cfg(test)]
pub(crate) mod test_graphs {
    use crate::graph::{Graph, GraphLimits};
    use crate::models::GraphPayload;

    pub const LIMITS: GraphLimits = GraphLimits {
        max_nodes: 1_000,
        max_edges: 10_000,
    };

    pub fn build(payload: GraphPayload) -> Graph {
        Graph::from_payload(&payload, LIMITS).unwrap()
    }

    /// A - B - C
    pub fn path3() -> Graph {
        build(
            GraphPayload::new(false)
                .with_node("A")
                .with_node("B")
                .with_node("C")
                .with_edge("A", "B")
                .with_edge("B", "C"),
        )
    }

    /// hub connected to four leaves
    pub fn star() -> Graph {
        let mut payload = GraphPayload::new(false).with_node("hub");
        for leaf in ["l1", "l2", "l3", "l4"] {
            payload = payload.with_node(leaf).with_edge("hub", leaf);
        }
        build(payload)
    }

    /// two triangles joined by the bridge c - d
    pub fn barbell() -> Graph {
        build(
            GraphPayload::new(false)
                .with_node("a")
                .with_node("b")
                .with_node("c")
                .with_node("d")
                .with_node("e")
                .with_node("f")
                .with_edge("a", "b")
                .with_edge("b", "c")
                .with_edge("a", "c")
                .with_edge("c", "d")
                .with_edge("d", "e")
                .with_edge("e", "f")
                .with_edge("d", "f"),
        )
    }

    /// cycle over `n` nodes
    pub fn ring(n: usize) -> Graph {
        let mut payload = GraphPayload::new(false);
        for i in 0..n {
            payload = payload.with_node(format!("r{i}"));
        }
        for i in 0..n {
            payload = payload.with_edge(format!("r{i}"), format!("r{}", (i + 1) % n));
        }
        build(payload)
    }

    /// x -> y -> z
    pub fn directed_chain() -> Graph {
        build(
            GraphPayload::new(true)
                .with_node("x")
                .with_node("y")
                .with_node("z")
                .with_edge("x", "y")
                .with_edge("y", "z"),
        )
    }

    pub fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_is_dispatchable() {
        let graph = test_graphs::path3();
        let params = AlgorithmParams::default();
        let ctx = KernelContext::default();
        for kind in CentralityKind::ALL {
            let scores = kernel(kind)(&graph, &params, &ctx)
                .unwrap_or_else(|e| panic!("{kind} failed on a path graph: {e}"));
            assert_eq!(scores.len(), 3, "{kind} returned the wrong number of scores");
            assert!(scores.iter().all(|s| s.is_finite()), "{kind} produced {scores:?}");
        }
    }

    #[test]
    fn test_every_kind_accepts_an_empty_graph() {
        let graph = test_graphs::build(crate::models::GraphPayload::new(false));
        let ctx = KernelContext::default();
        for kind in CentralityKind::ALL {
            let scores = kernel(kind)(&graph, &AlgorithmParams::default(), &ctx)
                .unwrap_or_else(|e| panic!("{kind} failed on an empty graph: {e}"));
            assert!(scores.is_empty(), "{kind} returned {scores:?}");
        }
    }

    #[test]
    fn test_every_kind_stops_at_an_expired_deadline() {
        let graph = test_graphs::barbell();
        let budget = Duration::from_millis(5);
        let ctx = KernelContext {
            deadline: Some(Deadline {
                at: Instant::now(),
                budget,
            }),
            ..KernelContext::default()
        };
        for kind in CentralityKind::ALL {
            assert_eq!(
                kernel(kind)(&graph, &AlgorithmParams::default(), &ctx),
                Err(KernelError::DeadlineExceeded { budget }),
                "{kind} ignored its deadline"
            );
        }
    }

    #[test]
    fn test_fallback_chain_never_loops() {
        for kind in CentralityKind::ALL {
            if let Some(target) = fallback(kind) {
                assert_eq!(fallback(target), None, "{kind} falls back to {target} which falls back again");
            }
        }
    }

    #[test]
    fn test_eigenvector_fallback_pins_katz_attenuation() {
        let params = AlgorithmParams {
            alpha: Some(0.5),
            max_iter: 1,
            ..AlgorithmParams::default()
        };
        let katz = fallback_params(CentralityKind::Eigenvector, &params);
        assert_eq!(katz.alpha, Some(0.1));
        assert_eq!(katz.max_iter, 100);
        assert_eq!(fallback_params(CentralityKind::Alpha, &params).alpha, Some(0.5));
    }

    #[test]
    fn test_scaling_helpers() {
        let mut scores = vec![1.0, -4.0, 2.0];
        scale_by_max(&mut scores);
        assert_eq!(scores, vec![0.25, -1.0, 0.5]);

        let mut scores = vec![3.0, 4.0];
        scale_to_unit_norm(&mut scores);
        assert_eq!(scores, vec![0.6, 0.8]);

        let mut zeros = vec![0.0, 0.0];
        scale_by_max(&mut zeros);
        scale_to_unit_sum(&mut zeros);
        assert_eq!(zeros, vec![0.0, 0.0]);
    }
}
