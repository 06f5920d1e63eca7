//! Shortest-path based measures: betweenness, load, closeness and harmonic.
//!
//! All of them share one single-source search that records, for every node
//! reached, its distance, the number of shortest paths leading to it and its
//! predecessors on those paths. Unweighted requests use breadth-first search,
//! weighted ones Dijkstra.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use super::{non_negative_weight, KernelContext, KernelResult};
use crate::error::KernelError;
use crate::graph::{Direction, Graph};
use crate::models::AlgorithmParams;

/// Result of one single-source shortest-path search
#[derive(Debug)]
pub(crate) struct ShortestPaths {
    /// Nodes in non-decreasing distance order, source first
    pub order: Vec<usize>,
    pub dist: Vec<Option<f64>>,
    pub sigma: Vec<f64>,
    pub preds: Vec<Vec<usize>>,
}

impl ShortestPaths {
    fn new(n: usize, source: usize) -> Self {
        let mut dist = vec![None; n];
        let mut sigma = vec![0.0; n];
        dist[source] = Some(0.0);
        sigma[source] = 1.0;
        Self {
            order: Vec::with_capacity(n),
            dist,
            sigma,
            preds: vec![Vec::new(); n],
        }
    }
}

pub(crate) fn single_source(
    graph: &Graph,
    source: usize,
    direction: Direction,
    weight: Option<&str>,
    cutoff: Option<f64>,
) -> Result<ShortestPaths, KernelError> {
    match weight {
        None => Ok(breadth_first(graph, source, direction, cutoff)),
        Some(attribute) => dijkstra(graph, source, direction, attribute, cutoff),
    }
}

fn breadth_first(
    graph: &Graph,
    source: usize,
    direction: Direction,
    cutoff: Option<f64>,
) -> ShortestPaths {
    let mut paths = ShortestPaths::new(graph.node_count(), source);
    let mut queue = VecDeque::from([source]);

    while let Some(v) = queue.pop_front() {
        paths.order.push(v);
        let next = paths.dist[v].unwrap_or(0.0) + 1.0;
        if cutoff.is_some_and(|limit| next > limit) {
            continue;
        }
        for adj in graph.neighbors(v, direction) {
            let w = adj.node;
            if w == v {
                continue;
            }
            match paths.dist[w] {
                None => {
                    paths.dist[w] = Some(next);
                    queue.push_back(w);
                    paths.sigma[w] += paths.sigma[v];
                    paths.preds[w].push(v);
                }
                Some(d) if d == next => {
                    paths.sigma[w] += paths.sigma[v];
                    paths.preds[w].push(v);
                }
                Some(_) => {}
            }
        }
    }
    paths
}

#[derive(Debug, PartialEq)]
struct HeapEntry {
    dist: f64,
    seq: usize,
    node: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on distance, then on insertion sequence
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn dijkstra(
    graph: &Graph,
    source: usize,
    direction: Direction,
    attribute: &str,
    cutoff: Option<f64>,
) -> Result<ShortestPaths, KernelError> {
    let n = graph.node_count();
    let mut paths = ShortestPaths::new(n, source);
    // tentative distances; `paths.dist` only holds settled nodes
    let mut seen: Vec<Option<f64>> = vec![None; n];
    let mut settled = vec![false; n];
    paths.dist = vec![None; n];
    seen[source] = Some(0.0);

    let mut seq = 0;
    let mut heap = BinaryHeap::from([HeapEntry {
        dist: 0.0,
        seq,
        node: source,
    }]);

    while let Some(HeapEntry { dist, node: v, .. }) = heap.pop() {
        if settled[v] {
            continue;
        }
        settled[v] = true;
        paths.dist[v] = Some(dist);
        paths.order.push(v);

        for adj in graph.neighbors(v, direction) {
            let w = adj.node;
            if w == v || settled[w] {
                continue;
            }
            let candidate = dist + non_negative_weight(graph, adj.edge, Some(attribute))?;
            if cutoff.is_some_and(|limit| candidate > limit) {
                continue;
            }
            match seen[w] {
                Some(best) if candidate == best => {
                    paths.sigma[w] += paths.sigma[v];
                    paths.preds[w].push(v);
                }
                Some(best) if candidate > best => {}
                _ => {
                    seen[w] = Some(candidate);
                    paths.sigma[w] = paths.sigma[v];
                    paths.preds[w] = vec![v];
                    seq += 1;
                    heap.push(HeapEntry {
                        dist: candidate,
                        seq,
                        node: w,
                    });
                }
            }
        }
    }
    Ok(paths)
}

/// Sources to run single-source searches from. With a sample size `k < n`
/// the sources are spread evenly over the node order so results are
/// reproducible.
fn sources(n: usize, sample_size: Option<usize>) -> (Vec<usize>, Option<usize>) {
    match sample_size {
        Some(k) if k < n => {
            let step = (n / k).max(1);
            let picked: Vec<usize> = (0..n).step_by(step).take(k).collect();
            (picked, Some(k))
        }
        _ => ((0..n).collect(), None),
    }
}

/// Betweenness centrality by Brandes' accumulation.
pub fn betweenness(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    let n = graph.node_count();
    let mut scores = vec![0.0; n];
    let (sources, sampled) = sources(n, params.sample_size);

    let mut delta = vec![0.0; n];
    for &s in &sources {
        ctx.checkpoint()?;
        let paths = single_source(graph, s, Direction::Outgoing, params.weight(), params.cutoff)?;
        for &v in &paths.order {
            delta[v] = 0.0;
        }
        for &w in paths.order.iter().rev() {
            let coefficient = (1.0 + delta[w]) / paths.sigma[w];
            for &v in &paths.preds[w] {
                delta[v] += paths.sigma[v] * coefficient;
            }
            if w != s {
                scores[w] += delta[w];
            }
        }
    }

    let scale = if params.normalized {
        (n > 2).then(|| 1.0 / ((n - 1) * (n - 2)) as f64)
    } else {
        (!graph.is_directed()).then_some(0.5)
    };
    if let Some(scale) = scale {
        let scale = match sampled {
            Some(k) => scale * n as f64 / k as f64,
            None => scale,
        };
        for score in scores.iter_mut() {
            *score *= scale;
        }
    }
    Ok(scores)
}

/// Load centrality: each source sends one unit of flow to every node it
/// reaches, split evenly between predecessors on the way back.
pub fn load(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    let n = graph.node_count();
    let mut scores = vec![0.0; n];

    for s in 0..n {
        ctx.checkpoint()?;
        let paths = single_source(graph, s, Direction::Outgoing, params.weight(), params.cutoff)?;
        let mut reached: Vec<usize> = paths.order.clone();
        let mut between = vec![0.0; n];
        for &v in &reached {
            between[v] = 1.0;
        }

        reached.retain(|&v| paths.dist[v].is_some_and(|d| d > 0.0));
        reached.sort_by(|&a, &b| {
            let da = paths.dist[a].unwrap_or(0.0);
            let db = paths.dist[b].unwrap_or(0.0);
            da.total_cmp(&db).then(a.cmp(&b))
        });

        while let Some(v) = reached.pop() {
            let preds = &paths.preds[v];
            let share = between[v] / preds.len() as f64;
            for &x in preds {
                if x == s {
                    break;
                }
                between[x] += share;
            }
        }

        for &v in &paths.order {
            scores[v] += between[v] - 1.0;
        }
    }

    let scale = if params.normalized {
        (n > 2).then(|| 1.0 / ((n - 1) * (n - 2)) as f64)
    } else {
        (!graph.is_directed()).then_some(0.5)
    };
    if let Some(scale) = scale {
        for score in scores.iter_mut() {
            *score *= scale;
        }
    }
    Ok(scores)
}

/// Closeness centrality with the Wasserman-Faust correction for graphs that
/// are not strongly connected. Distances are measured towards each node.
pub fn closeness(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    let n = graph.node_count();
    let mut scores = Vec::with_capacity(n);

    for u in 0..n {
        ctx.checkpoint()?;
        let paths = single_source(graph, u, Direction::Incoming, params.weight(), params.cutoff)?;
        let reachable = paths.order.len() as f64;
        let total: f64 = paths.order.iter().filter_map(|&v| paths.dist[v]).sum();

        let mut score = 0.0;
        if total > 0.0 && n > 1 {
            score = (reachable - 1.0) / total;
            score *= (reachable - 1.0) / (n - 1) as f64;
        }
        if !params.normalized {
            score *= (n.saturating_sub(1)) as f64;
        }
        scores.push(score);
    }
    Ok(scores)
}

/// Harmonic centrality: sum of reciprocal distances from every other node.
pub fn harmonic(graph: &Graph, params: &AlgorithmParams, ctx: &KernelContext) -> KernelResult {
    let n = graph.node_count();
    let mut scores = Vec::with_capacity(n);

    for u in 0..n {
        ctx.checkpoint()?;
        let paths = single_source(graph, u, Direction::Incoming, params.weight(), params.cutoff)?;
        let mut score: f64 = paths
            .order
            .iter()
            .filter_map(|&v| paths.dist[v])
            .filter(|&d| d > 0.0)
            .map(|d| 1.0 / d)
            .sum();
        if params.normalized && n > 1 {
            score /= (n - 1) as f64;
        }
        scores.push(score);
    }
    Ok(scores)
}
