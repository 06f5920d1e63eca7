//! Local measures that only look at a node's immediate neighbourhood.

use super::{KernelContext, KernelResult};
use crate::graph::{Direction, Graph};
use crate::models::AlgorithmParams;

/// Degree centrality.
///
/// Counts incident edges in the requested direction (summing the weight
/// attribute when one is given). Normalized scores divide by `n - 1`; a
/// single-node graph scores 1.
pub fn degree(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    let direction = Direction::from(params.direction);
    let weight = params.weight();

    if params.normalized && n == 1 {
        return Ok(vec![1.0]);
    }
    let scale = if params.normalized {
        1.0 / (n.saturating_sub(1).max(1)) as f64
    } else {
        1.0
    };

    Ok((0..n)
        .map(|node| graph.degree(node, direction, weight) * scale)
        .collect())
}

/// Leverage centrality: the mean of `(k_i - k_j) / (k_i + k_j)` over the
/// distinct neighbours `j` of `i`, where `k` is the distinct-neighbour count.
/// Nodes with at most one neighbour score 0. Normalized scores are min-max
/// scaled into [0, 1] and collapse to 0 when every node scores the same.
pub fn leverage(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    let neighborhoods: Vec<Vec<usize>> = (0..n).map(|node| graph.distinct_neighbors(node)).collect();
    let degrees: Vec<f64> = neighborhoods.iter().map(|nb| nb.len() as f64).collect();

    let mut scores: Vec<f64> = neighborhoods
        .iter()
        .enumerate()
        .map(|(node, neighbors)| {
            if neighbors.len() <= 1 {
                return 0.0;
            }
            let k_i = degrees[node];
            let total: f64 = neighbors
                .iter()
                .map(|&other| {
                    let k_j = degrees[other];
                    (k_i - k_j) / (k_i + k_j)
                })
                .sum();
            total / neighbors.len() as f64
        })
        .collect();

    if params.normalized && !scores.is_empty() {
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        for score in scores.iter_mut() {
            *score = if span > 0.0 { (*score - min) / span } else { 0.0 };
        }
    }

    Ok(scores)
}
