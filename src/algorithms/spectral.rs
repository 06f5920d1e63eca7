//! Iterative walk- and eigen-based measures.
//!
//! Every iteration here works on the directed view of the graph: an
//! undirected edge is an arc in both directions (a self-loop once). Unless
//! stated otherwise an iteration converges when the L1 change between two
//! successive iterates drops below `n * tolerance`, and reports a
//! [`ConvergenceError`] when `max_iter` runs out first.

use super::{
    l1_change, non_negative_weight, scale_by_max, scale_to_unit_norm, scale_to_unit_sum,
    KernelContext, KernelResult,
};
use crate::error::{ConvergenceError, KernelError};
use crate::graph::{Direction, Graph};
use crate::models::AlgorithmParams;

const DEFAULT_DAMPING: f64 = 0.85;
const DEFAULT_ATTENUATION: f64 = 0.1;
const DEFAULT_BASELINE: f64 = 1.0;

/// (source, target, weight) for every arc of the directed view
fn arcs(graph: &Graph, attribute: Option<&str>) -> Vec<(usize, usize, f64)> {
    (0..graph.node_count())
        .flat_map(|v| {
            graph
                .neighbors(v, Direction::Outgoing)
                .iter()
                .map(move |adj| (v, adj.node, graph.edge_weight(adj.edge, attribute)))
        })
        .collect()
}

fn not_converged(algorithm: &'static str, params: &AlgorithmParams) -> KernelError {
    ConvergenceError {
        algorithm,
        iterations: params.max_iter,
        tolerance: params.tolerance,
    }
    .into()
}

/// Eigenvector centrality by power iteration on `A^T + I`.
pub fn eigenvector(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let arcs = arcs(graph, params.weight());
    let threshold = n as f64 * params.tolerance;

    let mut x = vec![1.0 / n as f64; n];
    for _ in 0..params.max_iter {
        ctx.checkpoint()?;
        let previous = x.clone();
        for &(source, target, weight) in &arcs {
            x[target] += previous[source] * weight;
        }
        scale_to_unit_norm(&mut x);

        if l1_change(&x, &previous) < threshold {
            if params.normalized {
                scale_by_max(&mut x);
            }
            return Ok(x);
        }
    }
    Err(not_converged("eigenvector", params))
}

/// Katz centrality: `x = alpha * A^T x + beta`, iterated from zero.
pub fn katz(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let alpha = params.alpha_or(DEFAULT_ATTENUATION);
    let beta = params.beta_or(DEFAULT_BASELINE);
    let arcs = arcs(graph, params.weight());
    let threshold = n as f64 * params.tolerance;

    let mut x = vec![0.0; n];
    for _ in 0..params.max_iter {
        ctx.checkpoint()?;
        let mut next = vec![0.0; n];
        for &(source, target, weight) in &arcs {
            next[target] += x[source] * weight;
        }
        for value in next.iter_mut() {
            *value = alpha * *value + beta;
        }
        if next.iter().any(|v| !v.is_finite()) {
            return Err(KernelError::numeric(format!(
                "katz iteration diverged with alpha = {alpha}"
            )));
        }

        let change = l1_change(&next, &x);
        x = next;
        if change < threshold {
            if params.normalized {
                scale_by_max(&mut x);
            }
            return Ok(x);
        }
    }
    Err(not_converged("katz", params))
}

/// PageRank with uniform teleport and dangling mass spread uniformly.
///
/// `alpha` is the damping factor. Scores always sum to 1; `rescale_max`
/// additionally divides by the largest score.
pub fn pagerank(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let damping = params.alpha_or(DEFAULT_DAMPING);
    if !(0.0..=1.0).contains(&damping) {
        return Err(KernelError::numeric(format!(
            "damping factor {damping} is outside [0, 1]"
        )));
    }

    // row-stochastic transition weights
    let mut out_weight = vec![0.0; n];
    let mut transitions = Vec::new();
    for v in 0..n {
        for adj in graph.neighbors(v, Direction::Outgoing) {
            let weight = non_negative_weight(graph, adj.edge, params.weight())?;
            out_weight[v] += weight;
            transitions.push((v, adj.node, weight));
        }
    }
    for (source, _, weight) in transitions.iter_mut() {
        *weight /= out_weight[*source];
    }
    transitions.retain(|(_, _, weight)| weight.is_finite());
    let dangling: Vec<usize> = (0..n).filter(|&v| out_weight[v] == 0.0).collect();

    let uniform = 1.0 / n as f64;
    let threshold = n as f64 * params.tolerance;
    let mut x = vec![uniform; n];
    for _ in 0..params.max_iter {
        ctx.checkpoint()?;
        let dangling_mass: f64 = damping * dangling.iter().map(|&v| x[v]).sum::<f64>();
        let mut next = vec![dangling_mass * uniform + (1.0 - damping) * uniform; n];
        for &(source, target, weight) in &transitions {
            next[target] += damping * x[source] * weight;
        }

        let change = l1_change(&next, &x);
        x = next;
        if change < threshold {
            if params.rescale_max {
                scale_by_max(&mut x);
            }
            return Ok(x);
        }
    }
    Err(not_converged("pagerank", params))
}

/// Bonacich power centrality: `x = A (beta + alpha * x)` over outgoing arcs.
/// `alpha` is the attenuation and may be negative.
pub fn bonacich_power(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let alpha = params.alpha_or(DEFAULT_ATTENUATION);
    let beta = params.beta_or(DEFAULT_BASELINE);
    let arcs = arcs(graph, params.weight());
    let threshold = n as f64 * params.tolerance;

    let mut x = vec![0.0; n];
    for _ in 0..params.max_iter {
        ctx.checkpoint()?;
        let mut next = vec![0.0; n];
        for &(source, target, weight) in &arcs {
            next[source] += weight * (beta + alpha * x[target]);
        }
        if next.iter().any(|v| !v.is_finite()) {
            return Err(KernelError::numeric(format!(
                "bonacich iteration diverged with alpha = {alpha}"
            )));
        }

        let change = l1_change(&next, &x);
        x = next;
        if change < threshold {
            if params.normalized {
                scale_by_max(&mut x);
            }
            return Ok(x);
        }
    }
    Err(not_converged("bonacich_power", params))
}

/// Hub and authority scores by mutual reinforcement. Converges when the L1
/// change of the hub vector drops below `tolerance`.
fn hits(
    graph: &Graph,
    params: &AlgorithmParams,
    ctx: &KernelContext,
) -> Result<(Vec<f64>, Vec<f64>), KernelError> {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let arcs = arcs(graph, params.weight());

    let mut hubs = vec![1.0 / n as f64; n];
    for _ in 0..params.max_iter {
        ctx.checkpoint()?;
        let previous = hubs.clone();
        let mut authorities = vec![0.0; n];
        for &(source, target, weight) in &arcs {
            authorities[target] += previous[source] * weight;
        }
        hubs = vec![0.0; n];
        for &(source, target, weight) in &arcs {
            hubs[source] += authorities[target] * weight;
        }
        scale_by_max(&mut hubs);
        scale_by_max(&mut authorities);

        if l1_change(&hubs, &previous) < params.tolerance {
            if params.normalized {
                scale_to_unit_sum(&mut hubs);
                scale_to_unit_sum(&mut authorities);
            }
            return Ok((hubs, authorities));
        }
    }
    Err(not_converged("hits", params))
}

pub fn hits_hubs(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    hits(graph, params, ctx).map(|(hubs, _)| hubs)
}

pub fn hits_authorities(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    hits(graph, params, ctx).map(|(_, authorities)| authorities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_graphs::{self, assert_close};
    use crate::models::GraphPayload;

    fn ctx() -> KernelContext {
        KernelContext::default()
    }

    #[test]
    fn test_eigenvector_on_path() {
        let scores = eigenvector(&test_graphs::path3(), &AlgorithmParams::default(), &ctx()).unwrap();
        // principal eigenvector of the path is (1, sqrt 2, 1)
        assert_eq!(scores[1], 1.0);
        assert!((scores[0] - 1.0 / 2f64.sqrt()).abs() < 1e-3);
        assert_close(scores[0], scores[2]);
    }

    #[test]
    fn test_eigenvector_unnormalized_has_unit_norm() {
        let params = AlgorithmParams {
            normalized: false,
            ..AlgorithmParams::default()
        };
        let scores = eigenvector(&test_graphs::star(), &params, &ctx()).unwrap();
        let norm: f64 = scores.iter().map(|s| s * s).sum::<f64>().sqrt();
        assert_close(norm, 1.0);
    }

    #[test]
    fn test_eigenvector_reports_non_convergence() {
        let params = AlgorithmParams {
            max_iter: 1,
            ..AlgorithmParams::default()
        };
        let err = eigenvector(&test_graphs::path3(), &params, &ctx()).unwrap_err();
        assert_eq!(
            err,
            KernelError::Convergence(ConvergenceError {
                algorithm: "eigenvector",
                iterations: 1,
                tolerance: 1e-6,
            })
        );
    }

    #[test]
    fn test_katz_on_path() {
        let params = AlgorithmParams {
            normalized: false,
            ..AlgorithmParams::default()
        };
        let scores = katz(&test_graphs::path3(), &params, &ctx()).unwrap();
        // closed form of x = 0.1 A x + 1 on the path
        let end = 1.0 / (1.0 - 0.02) * (1.0 + 0.1);
        let middle = 1.0 + 0.2 * end;
        assert!((scores[0] - end).abs() < 1e-5);
        assert!((scores[1] - middle).abs() < 1e-5);
    }

    #[test]
    fn test_katz_divergence_is_reported() {
        let params = AlgorithmParams {
            alpha: Some(5.0),
            ..AlgorithmParams::default()
        };
        assert!(katz(&test_graphs::barbell(), &params, &ctx()).is_err());
    }

    #[test]
    fn test_pagerank_sums_to_one() {
        for graph in [
            test_graphs::path3(),
            test_graphs::star(),
            test_graphs::barbell(),
            test_graphs::directed_chain(),
        ] {
            let scores = pagerank(&graph, &AlgorithmParams::default(), &ctx()).unwrap();
            assert!((scores.iter().sum::<f64>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_pagerank_ranks_hub_first() {
        let scores = pagerank(&test_graphs::star(), &AlgorithmParams::default(), &ctx()).unwrap();
        assert!(scores[1..].iter().all(|&leaf| leaf < scores[0]));
    }

    #[test]
    fn test_pagerank_rescale_max() {
        let params = AlgorithmParams {
            rescale_max: true,
            ..AlgorithmParams::default()
        };
        let scores = pagerank(&test_graphs::star(), &params, &ctx()).unwrap();
        assert_close(scores[0], 1.0);
    }

    #[test]
    fn test_pagerank_rejects_bad_damping() {
        let params = AlgorithmParams {
            alpha: Some(1.5),
            ..AlgorithmParams::default()
        };
        assert!(matches!(
            pagerank(&test_graphs::path3(), &params, &ctx()),
            Err(KernelError::Numeric(_))
        ));
    }

    #[test]
    fn test_bonacich_power_on_star() {
        let params = AlgorithmParams {
            normalized: false,
            ..AlgorithmParams::default()
        };
        let scores = bonacich_power(&test_graphs::star(), &params, &ctx()).unwrap();
        // hub h = 4 (1 + 0.1 l), leaf l = 1 + 0.1 h
        let hub = 4.4 / (1.0 - 0.04);
        assert!((scores[0] - hub).abs() < 1e-5);
        assert!((scores[1] - (1.0 + 0.1 * hub)).abs() < 1e-5);

        let normalized = bonacich_power(&test_graphs::star(), &AlgorithmParams::default(), &ctx()).unwrap();
        assert_close(normalized[0], 1.0);
    }

    #[test]
    fn test_bonacich_negative_attenuation() {
        let params = AlgorithmParams {
            alpha: Some(-0.1),
            ..AlgorithmParams::default()
        };
        let scores = bonacich_power(&test_graphs::star(), &params, &ctx()).unwrap();
        assert!(scores.iter().all(|s| s.is_finite()));
        assert_close(scores.iter().fold(0.0_f64, |m, s| m.max(s.abs())), 1.0);
    }

    #[test]
    fn test_hits_on_directed_star() {
        // one hub pointing at three authorities
        let graph = test_graphs::build(
            GraphPayload::new(true)
                .with_node("hub")
                .with_node("a")
                .with_node("b")
                .with_node("c")
                .with_edge("hub", "a")
                .with_edge("hub", "b")
                .with_edge("hub", "c"),
        );
        let hubs = hits_hubs(&graph, &AlgorithmParams::default(), &ctx()).unwrap();
        let authorities = hits_authorities(&graph, &AlgorithmParams::default(), &ctx()).unwrap();
        assert_close(hubs[0], 1.0);
        assert_close(authorities[0], 0.0);
        for leaf in 1..4 {
            assert_close(authorities[leaf], 1.0 / 3.0);
        }
    }

    #[test]
    fn test_hits_undirected_is_symmetric() {
        let graph = test_graphs::barbell();
        let hubs = hits_hubs(&graph, &AlgorithmParams::default(), &ctx()).unwrap();
        let authorities = hits_authorities(&graph, &AlgorithmParams::default(), &ctx()).unwrap();
        for (h, a) in hubs.iter().zip(&authorities) {
            assert!((h - a).abs() < 1e-4, "hub {h} vs authority {a}");
        }
        assert_close(hubs.iter().sum::<f64>(), 1.0);
        assert_close(authorities.iter().sum::<f64>(), 1.0);
    }
}
