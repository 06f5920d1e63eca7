//! Dense matrix methods. These are cubic in the node count, so they refuse
//! graphs above [`KernelContext::matrix_node_limit`]. Communicability
//! betweenness runs one exponential per node, which makes it quartic; it has
//! its own, much lower [`KernelContext::communicability_node_limit`].

use ndarray::{Array1, Array2, Axis};

use super::{scale_by_max, scale_to_unit_norm, KernelContext, KernelResult};
use crate::error::KernelError;
use crate::graph::Graph;
use crate::models::AlgorithmParams;

const TAYLOR_TERMS: u32 = 24;
const PIVOT_EPSILON: f64 = 1e-12;

fn check_size(graph: &Graph, limit: usize) -> Result<(), KernelError> {
    let nodes = graph.node_count();
    if nodes > limit {
        return Err(KernelError::MatrixTooLarge { nodes, limit });
    }
    Ok(())
}

fn infinity_norm(matrix: &Array2<f64>) -> f64 {
    matrix
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Matrix exponential by scaling and squaring with a truncated Taylor series.
pub(crate) fn expm(matrix: &Array2<f64>, ctx: &KernelContext) -> Result<Array2<f64>, KernelError> {
    ctx.checkpoint()?;
    let n = matrix.nrows();
    let norm = infinity_norm(matrix);
    if !norm.is_finite() {
        return Err(KernelError::numeric("adjacency matrix has non-finite entries"));
    }

    // scale so the series is evaluated on a matrix of norm <= 0.5
    let squarings = if norm > 0.5 {
        (norm / 0.5).log2().ceil() as i32
    } else {
        0
    };
    let scaled = matrix / 2f64.powi(squarings);

    let mut result = Array2::<f64>::eye(n);
    let mut term = Array2::<f64>::eye(n);
    for k in 1..=TAYLOR_TERMS {
        ctx.checkpoint()?;
        term = term.dot(&scaled) / k as f64;
        result += &term;
        if infinity_norm(&term) <= f64::EPSILON * infinity_norm(&result) {
            break;
        }
    }
    for _ in 0..squarings {
        ctx.checkpoint()?;
        result = result.dot(&result);
    }

    if result.iter().any(|v| !v.is_finite()) {
        return Err(KernelError::numeric("matrix exponential overflowed"));
    }
    Ok(result)
}

/// Subgraph centrality: the diagonal of `exp(A)`, i.e. closed walks weighted
/// by the inverse factorial of their length.
pub fn subgraph(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    check_size(graph, ctx.matrix_node_limit)?;
    let exponential = expm(&graph.adjacency_matrix(params.weight()), ctx)?;
    let mut scores = exponential.diag().to_vec();
    if params.normalized {
        scale_by_max(&mut scores);
    }
    Ok(scores)
}

/// Communicability betweenness: for each node `r`, the relative drop in
/// communicability `(G_pq - G'_pq) / G_pq` summed over ordered pairs `p != q`
/// not involving `r`, where `G'` is computed with `r`'s edges removed.
pub fn communicability_betweenness(
    graph: &Graph,
    params: &AlgorithmParams,
    ctx: &KernelContext,
) -> KernelResult {
    ctx.checkpoint()?;
    check_size(graph, ctx.matrix_node_limit.min(ctx.communicability_node_limit))?;
    let n = graph.node_count();
    let adjacency = graph.adjacency_matrix(params.weight());
    let full = expm(&adjacency, ctx)?;

    let mut scores = Vec::with_capacity(n);
    for r in 0..n {
        let mut without = adjacency.clone();
        without.row_mut(r).fill(0.0);
        without.column_mut(r).fill(0.0);
        let reduced = expm(&without, ctx)?;

        let mut total = 0.0;
        for p in (0..n).filter(|&p| p != r) {
            for q in (0..n).filter(|&q| q != r && q != p) {
                if full[[p, q]] != 0.0 {
                    total += (full[[p, q]] - reduced[[p, q]]) / full[[p, q]];
                }
            }
        }
        scores.push(total);
    }

    if n > 2 {
        let others = (n - 1) as f64;
        let scale = 1.0 / (others * others - others);
        for score in scores.iter_mut() {
            *score *= scale;
        }
    }
    if params.normalized {
        scale_by_max(&mut scores);
    }
    Ok(scores)
}

/// Alpha centrality: the solution of `(I - alpha A^T) x = beta 1`, solved
/// directly. Graphs above the matrix limit are reported as a numeric failure
/// so the caller can move to the iterative Katz kernel instead.
pub fn alpha(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    ctx.checkpoint()?;
    let n = graph.node_count();
    if n > ctx.matrix_node_limit {
        return Err(KernelError::numeric(format!(
            "{n} nodes is above the direct solve limit of {}",
            ctx.matrix_node_limit
        )));
    }
    let attenuation = params.alpha_or(0.1);
    let baseline = params.beta_or(1.0);

    let system = Array2::<f64>::eye(n) - graph.adjacency_matrix(params.weight()).t().to_owned() * attenuation;
    let rhs = Array1::<f64>::from_elem(n, baseline);
    let mut scores = solve(system, rhs, ctx)?.to_vec();

    if scores.iter().any(|v| !v.is_finite()) {
        return Err(KernelError::numeric("alpha centrality produced non-finite scores"));
    }
    if params.normalized {
        scale_to_unit_norm(&mut scores);
    }
    Ok(scores)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>, ctx: &KernelContext) -> Result<Array1<f64>, KernelError> {
    let n = b.len();
    for column in 0..n {
        ctx.checkpoint()?;
        let pivot = (column..n)
            .max_by(|&x, &y| a[[x, column]].abs().total_cmp(&a[[y, column]].abs()))
            .unwrap_or(column);
        if a[[pivot, column]].abs() < PIVOT_EPSILON {
            return Err(KernelError::numeric("linear system is singular"));
        }
        if pivot != column {
            for k in 0..n {
                a.swap([column, k], [pivot, k]);
            }
            b.swap(column, pivot);
        }

        for row in column + 1..n {
            let factor = a[[row, column]] / a[[column, column]];
            if factor == 0.0 {
                continue;
            }
            for k in column..n {
                a[[row, k]] -= factor * a[[column, k]];
            }
            b[row] -= factor * b[column];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
