use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{graph_fingerprint, CacheStats, FingerprintCache};
use crate::config::Config;
use crate::engine::{self, Analyzer, CentralityEngine};
use crate::error::{CentralityError, Result};
use crate::formatter::top_n;
use crate::graph::Graph;
use crate::models::{
    AlgorithmInfo, AlgorithmParams, AlgorithmRequest, BatchSubmission, CentralityAnalysis,
    CentralityKind, ComparisonEntry, ComparisonReport, GraphPayload,
};
use crate::performance::AlgorithmPerformance;
use crate::pool::ComputePool;
use crate::tasks::{FileTaskStore, MemoryTaskStore, TaskManager, TaskRecord, TaskSettings, TaskStore};

/// Most algorithms a single comparison may run
pub const MAX_COMPARE_ALGORITHMS: usize = 10;

/// Runtime counters for `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub queued_tasks: usize,
    pub compute_workers: usize,
    pub batch_workers: usize,
    /// Algorithms computed at least once since startup
    pub performance: Vec<AlgorithmPerformance>,
}

/// Process-wide entry point: owns the pools, the cache and the batch workers.
pub struct CentralityService {
    config: Config,
    analyzer: Analyzer,
    compute_pool: Arc<ComputePool>,
    batch_pool: Arc<ComputePool>,
    tasks: Arc<TaskManager>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
}

impl CentralityService {
    /// Build the service with the task store selected by `config`.
    pub async fn start(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn TaskStore> = match &config.task_store_dir {
            Some(dir) => Arc::new(FileTaskStore::open(dir).await?),
            None => Arc::new(MemoryTaskStore::new()),
        };
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: Config, store: Arc<dyn TaskStore>) -> anyhow::Result<Arc<Self>> {
        let compute_pool = Arc::new(ComputePool::new("centrality-compute", config.compute_workers)?);
        let batch_pool = Arc::new(ComputePool::new(
            "centrality-batch",
            config.batch_workers.max(1) * config.batch_fan_out.max(1),
        )?);

        let cache = Arc::new(FingerprintCache::new());
        let analyzer = Analyzer::new(
            CentralityEngine::new(config.matrix_node_limit, config.communicability_node_limit),
            Arc::clone(&cache),
            config.cache_ttl(),
        );

        let tasks = TaskManager::start(
            TaskSettings {
                workers: config.batch_workers,
                fan_out: config.batch_fan_out,
                step_timeout: config.step_timeout(),
                task_ttl: config.task_ttl(),
                limits: config.batch_limits(),
            },
            store,
            analyzer.clone(),
            Arc::clone(&batch_pool),
        );
        tasks.recover().await?;

        let sweeper = spawn_sweeper(Arc::clone(&cache), Arc::clone(&tasks), &config);

        info!(
            "Centrality service ready: {} compute threads, {} batch threads",
            compute_pool.threads(),
            batch_pool.threads()
        );

        Ok(Arc::new(Self {
            config,
            analyzer,
            compute_pool,
            batch_pool,
            tasks,
            sweeper: Mutex::new(Some(sweeper)),
            started_at: Instant::now(),
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one algorithm and wait for the ranked result.
    pub async fn calculate(
        &self,
        network: &GraphPayload,
        algorithm: &str,
        params: Option<AlgorithmParams>,
    ) -> Result<CentralityAnalysis> {
        let kind: CentralityKind = algorithm.parse()?;
        let params = params.unwrap_or_default();
        params.validate()?;

        let graph = Arc::new(Graph::from_payload(network, self.config.request_limits())?);
        let fingerprint = graph_fingerprint(&graph);
        self.analyzer
            .analyze(
                &self.compute_pool,
                graph,
                &fingerprint,
                kind,
                params,
                self.config.compute_timeout(),
            )
            .await
    }

    /// Queue a batch and return immediately.
    pub async fn submit_batch(
        &self,
        network: &GraphPayload,
        requests: Vec<AlgorithmRequest>,
        priority: u8,
    ) -> Result<BatchSubmission> {
        let record = self.tasks.submit(network, requests, priority).await?;
        Ok(BatchSubmission {
            message: format!(
                "Batch of {} algorithms queued at priority {}",
                record.total_steps, record.priority
            ),
            task_id: record.task_id,
            status: record.status.as_str().to_string(),
            total_algorithms: record.total_steps,
            expires_at: record.expires_at,
        })
    }

    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskRecord> {
        self.tasks.status(task_id).await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<TaskRecord> {
        self.tasks.cancel(task_id).await
    }

    pub fn list_algorithms(&self) -> Vec<AlgorithmInfo> {
        engine::list_algorithms()
    }

    pub fn get_algorithm_info(&self, algorithm: &str) -> Result<AlgorithmInfo> {
        Ok(engine::algorithm_info(algorithm.parse()?))
    }

    /// Run several algorithms with default parameters and keep each one's top nodes.
    pub async fn compare(
        &self,
        network: &GraphPayload,
        algorithms: &[String],
        top: usize,
    ) -> Result<ComparisonReport> {
        if algorithms.is_empty() {
            return Err(CentralityError::invalid_parameter(
                "at least one algorithm is required for a comparison",
            ));
        }
        if algorithms.len() > MAX_COMPARE_ALGORITHMS {
            return Err(CentralityError::invalid_parameter(format!(
                "at most {} algorithms can be compared at once, got {}",
                MAX_COMPARE_ALGORITHMS,
                algorithms.len()
            )));
        }
        if top == 0 {
            return Err(CentralityError::invalid_parameter("top_n must be at least 1"));
        }
        let kinds = algorithms
            .iter()
            .map(|name| name.parse::<CentralityKind>())
            .collect::<Result<Vec<_>>>()?;

        let graph = Arc::new(Graph::from_payload(network, self.config.request_limits())?);
        let fingerprint = graph_fingerprint(&graph);

        let mut results = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let analysis = self
                .analyzer
                .analyze(
                    &self.compute_pool,
                    Arc::clone(&graph),
                    &fingerprint,
                    kind,
                    AlgorithmParams::default(),
                    self.config.compute_timeout(),
                )
                .await?;
            results.push(ComparisonEntry {
                algorithm: analysis.algorithm,
                computed_with: analysis.computed_with,
                top_nodes: top_n(&analysis.results, top),
                execution_time_ms: analysis.execution_time_ms,
            });
        }

        Ok(ComparisonReport {
            network_stats: graph.stats(),
            results,
            timestamp: Utc::now(),
        })
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            uptime_secs: self.started_at.elapsed().as_secs(),
            cache: self.analyzer.cache().stats(),
            queued_tasks: self.tasks.queued(),
            compute_workers: self.compute_pool.threads(),
            batch_workers: self.batch_pool.threads(),
            performance: self.analyzer.performance().snapshot(),
        }
    }

    /// Observed execution times of one algorithm, from both calculations and batch steps.
    pub fn performance(&self, algorithm: &str) -> Result<AlgorithmPerformance> {
        Ok(self.analyzer.performance().get(algorithm.parse()?))
    }

    /// Stop the sweeper and let the batch workers finish what they hold.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        self.tasks.shutdown().await;
        info!("Centrality service stopped");
    }
}

fn spawn_sweeper(cache: Arc<FingerprintCache>, tasks: Arc<TaskManager>, config: &Config) -> JoinHandle<()> {
    let period = config.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            let evicted = cache.sweep();
            if evicted > 0 {
                debug!("Evicted {} expired cache entries", evicted);
            }
            if let Err(e) = tasks.purge_expired().await {
                warn!("Task expiry sweep failed: {}", e);
            }
        }
    })
}
