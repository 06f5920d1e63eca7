use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::algorithms::{self, Deadline, KernelContext};
use crate::cache::{cache_key, FingerprintCache};
use crate::error::{CentralityError, KernelError, Result};
use crate::formatter::{rank_scores, score_map};
use crate::graph::Graph;
use crate::models::{
    AlgorithmInfo, AlgorithmParams, CentralityAnalysis, CentralityKind, FallbackRecord, ScoreSet,
};
use crate::performance::PerformanceTracker;
use crate::pool::{ComputePool, PoolError};

/// Runs one algorithm over one graph and applies the fallback policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentralityEngine {
    ctx: KernelContext,
}

impl CentralityEngine {
    pub fn new(matrix_node_limit: usize, communicability_node_limit: usize) -> Self {
        Self {
            ctx: KernelContext {
                matrix_node_limit,
                communicability_node_limit,
                deadline: None,
            },
        }
    }

    /// A copy whose kernels give up once `budget` has passed from now.
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.ctx.deadline = Some(Deadline::after(budget));
        self
    }

    /// Compute raw scores for `kind`.
    ///
    /// A kernel failure (non-convergence or a numeric problem) moves to the
    /// documented fallback and records it in the returned set. Graphs that
    /// are too big for a dense method are refused outright, and a passed
    /// deadline is a timeout with no fallback attempt.
    pub fn compute(&self, graph: &Graph, kind: CentralityKind, params: &AlgorithmParams) -> Result<ScoreSet> {
        params.validate()?;
        let start = Instant::now();
        debug!("Computing {} over {} nodes", kind, graph.node_count());

        let primary_error = match self.run_kernel(graph, kind, params) {
            Ok(scores) => {
                debug!("{} finished in {:?}", kind, start.elapsed());
                return Ok(ScoreSet {
                    algorithm: kind,
                    computed_with: kind,
                    fallback: None,
                    scores: score_map(graph, &scores),
                });
            }
            Err(KernelError::MatrixTooLarge { nodes, limit }) => {
                return Err(CentralityError::GraphTooLarge {
                    what: "nodes for a dense matrix method",
                    count: nodes,
                    limit,
                });
            }
            Err(KernelError::DeadlineExceeded { budget }) => return Err(timed_out(kind, budget)),
            Err(err) => err,
        };

        let Some(target) = algorithms::fallback(kind) else {
            return Err(CentralityError::algorithm_error(kind.as_str(), primary_error.to_string()));
        };

        warn!("{} failed ({}), falling back to {}", kind, primary_error, target);
        let fallback_params = algorithms::fallback_params(kind, params);
        match self.run_kernel(graph, target, &fallback_params) {
            Ok(scores) => Ok(ScoreSet {
                algorithm: kind,
                computed_with: target,
                fallback: Some(FallbackRecord {
                    from: kind,
                    to: target,
                    reason: primary_error.to_string(),
                }),
                scores: score_map(graph, &scores),
            }),
            Err(KernelError::DeadlineExceeded { budget }) => Err(timed_out(kind, budget)),
            Err(fallback_error) => Err(CentralityError::algorithm_error(
                kind.as_str(),
                format!(
                    "{}; fallback to {} also failed: {}",
                    primary_error, target, fallback_error
                ),
            )),
        }
    }

    fn run_kernel(
        &self,
        graph: &Graph,
        kind: CentralityKind,
        params: &AlgorithmParams,
    ) -> std::result::Result<Vec<f64>, KernelError> {
        let scores = algorithms::kernel(kind)(graph, params, &self.ctx)?;
        if let Some(position) = scores.iter().position(|s| !s.is_finite()) {
            return Err(KernelError::numeric(format!(
                "{} produced a non-finite score for node '{}'",
                kind,
                graph.node_id(position)
            )));
        }
        Ok(scores)
    }
}

fn timed_out(kind: CentralityKind, budget: Duration) -> CentralityError {
    CentralityError::ComputationTimeout {
        algorithm: kind.to_string(),
        timeout: budget,
    }
}

/// Discovery metadata for every algorithm
pub fn list_algorithms() -> Vec<AlgorithmInfo> {
    CentralityKind::ALL.into_iter().map(algorithm_info).collect()
}

pub fn algorithm_info(kind: CentralityKind) -> AlgorithmInfo {
    let fallback = algorithms::fallback(kind);
    let iterative = vec!["max_iter", "tolerance", "normalized", "weight"];
    match kind {
        CentralityKind::Degree => AlgorithmInfo {
            name: kind,
            display_name: "Degree Centrality",
            description: "Number (or total weight) of edges incident to a node",
            complexity: "O(V + E)",
            use_cases: vec!["Finding hubs", "Local popularity", "Quick baselines"],
            parameters: vec!["normalized", "weight", "direction"],
            normalization: "divided by n - 1",
            fallback,
            limitations: vec!["Ignores everything beyond immediate neighbours"],
        },
        CentralityKind::Betweenness => AlgorithmInfo {
            name: kind,
            display_name: "Betweenness Centrality",
            description: "Share of shortest paths between other node pairs that pass through a node",
            complexity: "O(VE) unweighted, O(VE + V^2 log V) weighted",
            use_cases: vec!["Brokers and bridges", "Bottleneck detection", "Information flow control"],
            parameters: vec!["normalized", "weight", "sample_size", "cutoff"],
            normalization: "divided by (n - 1)(n - 2)",
            fallback,
            limitations: vec!["Expensive on large graphs without sampling", "Sampled scores are approximate"],
        },
        CentralityKind::Closeness => AlgorithmInfo {
            name: kind,
            display_name: "Closeness Centrality",
            description: "Inverse average distance to the nodes that can reach a node, Wasserman-Faust corrected",
            complexity: "O(VE) unweighted, O(VE + V^2 log V) weighted",
            use_cases: vec!["Spreading speed", "Accessibility", "Facility placement"],
            parameters: vec!["normalized", "weight", "cutoff"],
            normalization: "unnormalized scores are multiplied by n - 1",
            fallback,
            limitations: vec!["Less discriminating on disconnected graphs"],
        },
        CentralityKind::Eigenvector => AlgorithmInfo {
            name: kind,
            display_name: "Eigenvector Centrality",
            description: "Principal eigenvector of the adjacency matrix: important neighbours make a node important",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Influence", "Prestige", "Recursive importance"],
            parameters: iterative,
            normalization: "divided by the largest score",
            fallback,
            limitations: vec!["May not converge on bipartite or disconnected graphs"],
        },
        CentralityKind::Katz => AlgorithmInfo {
            name: kind,
            display_name: "Katz Centrality",
            description: "Attenuated count of walks ending at a node plus a baseline",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Influence in directed graphs", "Graphs where eigenvector scores vanish"],
            parameters: vec!["alpha", "beta", "max_iter", "tolerance", "normalized", "weight"],
            normalization: "divided by the largest score",
            fallback,
            limitations: vec!["alpha must stay below 1 / largest eigenvalue to converge"],
        },
        CentralityKind::PageRank => AlgorithmInfo {
            name: kind,
            display_name: "PageRank",
            description: "Stationary distribution of a damped random walk",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Ranking linked documents", "Citation importance", "Trust propagation"],
            parameters: vec!["alpha", "max_iter", "tolerance", "weight", "rescale_max"],
            normalization: "scores sum to 1; rescale_max divides by the largest score",
            fallback,
            limitations: vec!["Negative weights are rejected"],
        },
        CentralityKind::BonacichPower => AlgorithmInfo {
            name: kind,
            display_name: "Bonacich Power Centrality",
            description: "Katz-family measure whose attenuation may be negative, rewarding ties to weak nodes",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Bargaining power", "Exchange networks"],
            parameters: vec!["alpha", "beta", "max_iter", "tolerance", "normalized", "weight"],
            normalization: "divided by the largest absolute score",
            fallback,
            limitations: vec!["Diverges when |alpha| is too large for the graph"],
        },
        CentralityKind::HitsHubs => AlgorithmInfo {
            name: kind,
            display_name: "HITS Hub Scores",
            description: "Nodes that point to many good authorities",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Link analysis", "Directory and survey pages"],
            parameters: iterative,
            normalization: "scores sum to 1",
            fallback,
            limitations: vec!["Undirected graphs give hubs equal to authorities"],
        },
        CentralityKind::HitsAuthorities => AlgorithmInfo {
            name: kind,
            display_name: "HITS Authority Scores",
            description: "Nodes pointed to by many good hubs",
            complexity: "O(k(V + E)) for k iterations",
            use_cases: vec!["Link analysis", "Finding primary sources"],
            parameters: iterative,
            normalization: "scores sum to 1",
            fallback,
            limitations: vec!["Undirected graphs give authorities equal to hubs"],
        },
        CentralityKind::Leverage => AlgorithmInfo {
            name: kind,
            display_name: "Leverage Centrality",
            description: "How much a node's degree exceeds that of its neighbours",
            complexity: "O(V + E)",
            use_cases: vec!["Local hubs in brain and biological networks"],
            parameters: vec!["normalized"],
            normalization: "min-max scaled into [0, 1]",
            fallback,
            limitations: vec!["Nodes with at most one neighbour always score 0"],
        },
        CentralityKind::Load => AlgorithmInfo {
            name: kind,
            display_name: "Load Centrality",
            description: "Flow-splitting variant of betweenness where each source sends one unit to every target",
            complexity: "O(VE) unweighted, O(VE + V^2 log V) weighted",
            use_cases: vec!["Network traffic load", "Router importance"],
            parameters: vec!["normalized", "weight", "cutoff"],
            normalization: "divided by (n - 1)(n - 2)",
            fallback,
            limitations: vec!["Close to but not identical with betweenness"],
        },
        CentralityKind::Harmonic => AlgorithmInfo {
            name: kind,
            display_name: "Harmonic Centrality",
            description: "Sum of reciprocal distances from every other node",
            complexity: "O(VE) unweighted, O(VE + V^2 log V) weighted",
            use_cases: vec!["Closeness on disconnected graphs"],
            parameters: vec!["normalized", "weight", "cutoff"],
            normalization: "divided by n - 1",
            fallback,
            limitations: vec!["Scores of far-apart nodes are compressed near zero"],
        },
        CentralityKind::Subgraph => AlgorithmInfo {
            name: kind,
            display_name: "Subgraph Centrality",
            description: "Closed walks through a node, weighted by inverse factorial of length (diagonal of exp(A))",
            complexity: "O(V^3)",
            use_cases: vec!["Cluster participation", "Protein interaction networks"],
            parameters: vec!["normalized", "weight"],
            normalization: "divided by the largest score",
            fallback,
            limitations: vec!["Refused above the dense matrix node limit"],
        },
        CentralityKind::Alpha => AlgorithmInfo {
            name: kind,
            display_name: "Alpha Centrality",
            description: "Katz-like status with an exogenous baseline, solved directly",
            complexity: "O(V^3)",
            use_cases: vec!["Status with external sources of importance"],
            parameters: vec!["alpha", "beta", "normalized", "weight"],
            normalization: "unit Euclidean norm",
            fallback,
            limitations: vec!["Large graphs and singular systems are computed as Katz instead"],
        },
        CentralityKind::CommunicabilityBetweenness => AlgorithmInfo {
            name: kind,
            display_name: "Communicability Betweenness",
            description: "Relative loss of walk-based communicability between node pairs when a node is removed",
            complexity: "O(V^4)",
            use_cases: vec!["Robustness analysis", "Brokers beyond shortest paths"],
            parameters: vec!["normalized", "weight"],
            normalization: "divided by the largest score",
            fallback,
            limitations: vec!["Only practical on small graphs", "Refused above the communicability node limit"],
        },
    }
}

/// Cache-aware front of the engine used by both the request path and batch workers.
#[derive(Debug, Clone)]
pub struct Analyzer {
    engine: CentralityEngine,
    cache: Arc<FingerprintCache>,
    cache_ttl: Duration,
    performance: Arc<PerformanceTracker>,
}

impl Analyzer {
    pub fn new(engine: CentralityEngine, cache: Arc<FingerprintCache>, cache_ttl: Duration) -> Self {
        Self {
            engine,
            cache,
            cache_ttl,
            performance: Arc::new(PerformanceTracker::new()),
        }
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    /// Analyze `graph` with `kind` on `pool`, serving from the cache when possible.
    ///
    /// Cache failures are logged and skipped; they never fail the analysis.
    #[instrument(skip_all, fields(algorithm = %kind, nodes = graph.node_count()))]
    pub async fn analyze(
        &self,
        pool: &ComputePool,
        graph: Arc<Graph>,
        graph_fingerprint: &str,
        kind: CentralityKind,
        params: AlgorithmParams,
        timeout: Duration,
    ) -> Result<CentralityAnalysis> {
        params.validate()?;
        let start = Instant::now();

        let key = match cache_key(graph_fingerprint, kind, &params) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Could not derive cache key for {}: {}", kind, e);
                None
            }
        };

        if let Some(key) = key.as_deref() {
            match self.cache.get(key) {
                Ok(Some(scores)) => {
                    info!("Serving {} from cache", kind);
                    return Ok(self.build_analysis(&graph, scores, params, true, start));
                }
                Ok(None) => {}
                Err(e) => warn!("Cache read failed for {}: {}", kind, e),
            }
        }

        info!("Starting {} calculation on {} pool", kind, pool.name());
        // the deadline also covers time spent queued for a pool thread
        let engine = self.engine.with_deadline(timeout);
        let job_graph = Arc::clone(&graph);
        let job_params = params.clone();
        let computed = pool
            .run(timeout, move || engine.compute(&job_graph, kind, &job_params))
            .await
            .map_err(|e| match e {
                PoolError::TimedOut(timeout) => timed_out(kind, timeout),
                PoolError::Aborted => {
                    CentralityError::internal(format!("{} computation aborted", kind))
                }
            })
            .and_then(|scores| scores);
        self.performance.record(kind, start.elapsed(), computed.is_ok());
        let scores = computed?;

        if let Some(key) = key.as_deref() {
            if let Err(e) = self.cache.set(key, &scores, self.cache_ttl) {
                warn!("Cache write failed for {}: {}", kind, e);
            }
        }

        let analysis = self.build_analysis(&graph, scores, params, false, start);
        info!(
            "{} calculation completed in {}ms for {} nodes",
            kind,
            analysis.execution_time_ms,
            graph.node_count()
        );
        Ok(analysis)
    }

    fn build_analysis(
        &self,
        graph: &Graph,
        scores: ScoreSet,
        parameters: AlgorithmParams,
        cached: bool,
        start: Instant,
    ) -> CentralityAnalysis {
        let mut warnings = graph.warnings().to_vec();
        if let Some(fallback) = &scores.fallback {
            warnings.push(format!(
                "{} could not be computed ({}); scores are {} centrality",
                fallback.from, fallback.reason, fallback.to
            ));
        }

        CentralityAnalysis {
            algorithm: scores.algorithm,
            computed_with: scores.computed_with,
            results: rank_scores(graph, &scores.scores),
            fallback: scores.fallback,
            parameters,
            network_stats: graph.stats(),
            warnings,
            cached,
            execution_time_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}
