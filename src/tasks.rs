//! Batch task orchestration.
//!
//! A batch is one graph plus a list of algorithm steps. Submissions are
//! persisted through a [`TaskStore`], queued by priority and picked up by a
//! fixed set of workers. A worker owns its task's record while it runs:
//! it is the only writer, everybody else reads. Each step's outcome is
//! recorded on its own, so one failing algorithm never aborts the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::graph_fingerprint;
use crate::engine::Analyzer;
use crate::error::{CentralityError, Result};
use crate::graph::{Graph, GraphLimits};
use crate::models::{
    AlgorithmParams, AlgorithmRequest, CentralityAnalysis, CentralityKind, GraphPayload,
};
use crate::pool::ComputePool;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of one algorithm step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Pending,
    Completed { result: CentralityAnalysis },
    Failed { error: String, code: String },
    Skipped { reason: String },
}

impl StepOutcome {
    fn failed(error: &CentralityError) -> Self {
        Self::Failed {
            error: error.to_string(),
            code: error.code().to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub algorithm: CentralityKind,
    pub parameters: AlgorithmParams,
    pub outcome: StepOutcome,
}

/// Externally visible state of a batch task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub graph_fingerprint: String,
    pub priority: u8,
    pub status: TaskStatus,
    pub steps: Vec<TaskStep>,
    /// Finished steps over total steps, in [0, 1]
    pub progress: f64,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub last_completed: Option<String>,
    pub cancel_requested: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl TaskRecord {
    fn refresh_progress(&mut self) {
        self.completed_steps = self.steps.iter().filter(|s| !s.outcome.is_pending()).count();
        self.progress = if self.total_steps == 0 {
            1.0
        } else {
            self.completed_steps as f64 / self.total_steps as f64
        };
    }
}

/// What a store keeps: the record plus the graph needed to re-run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTask {
    pub record: TaskRecord,
    pub network: GraphPayload,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: PersistedTask) -> Result<()>;

    /// Replace the record of an existing task
    async fn update(&self, record: &TaskRecord) -> Result<()>;

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    /// Tasks that were queued or running, for recovery after a restart
    async fn unfinished(&self) -> Result<Vec<PersistedTask>>;

    async fn remove(&self, task_id: &str) -> Result<()>;

    /// Drop every task that expired before `now`; returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Process-local store; records do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<String, PersistedTask>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: PersistedTask) -> Result<()> {
        self.tasks.insert(task.record.task_id.clone(), task);
        Ok(())
    }

    async fn update(&self, record: &TaskRecord) -> Result<()> {
        match self.tasks.get_mut(&record.task_id) {
            Some(mut task) => {
                task.record = record.clone();
                Ok(())
            }
            None => Err(CentralityError::TaskNotFound {
                task_id: record.task_id.clone(),
            }),
        }
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.get(task_id).map(|task| task.record.clone()))
    }

    async fn unfinished(&self) -> Result<Vec<PersistedTask>> {
        Ok(self
            .tasks
            .iter()
            .filter(|task| !task.record.status.is_terminal())
            .map(|task| task.value().clone())
            .collect())
    }

    async fn remove(&self, task_id: &str) -> Result<()> {
        self.tasks.remove(task_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.record.expires_at > now);
        Ok(before.saturating_sub(self.tasks.len()))
    }
}

/// One JSON file per task under a directory. Writes go through a temporary
/// file and a rename so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Persisting batch tasks under {}", dir.display());
        Ok(Self { dir })
    }

    /// Only well-formed task ids map to a file.
    fn path_for(&self, task_id: &str) -> Option<PathBuf> {
        Uuid::parse_str(task_id)
            .ok()
            .map(|id| self.dir.join(format!("{}.json", id)))
    }

    async fn read(&self, path: &Path) -> Result<Option<PersistedTask>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, task: &PersistedTask) -> Result<()> {
        let path = self.path_for(&task.record.task_id).ok_or_else(|| {
            CentralityError::storage(format!("malformed task id '{}'", task.record.task_id))
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(task)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(PathBuf, PersistedTask)>> {
        let mut tasks = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(task)) => tasks.push((path, task)),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable task file {}: {}", path.display(), e),
            }
        }
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn insert(&self, task: PersistedTask) -> Result<()> {
        self.write(&task).await
    }

    async fn update(&self, record: &TaskRecord) -> Result<()> {
        let path = self.path_for(&record.task_id);
        let existing = match &path {
            Some(path) => self.read(path).await?,
            None => None,
        };
        let mut task = existing.ok_or_else(|| CentralityError::TaskNotFound {
            task_id: record.task_id.clone(),
        })?;
        task.record = record.clone();
        self.write(&task).await
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        match self.path_for(task_id) {
            Some(path) => Ok(self.read(&path).await?.map(|task| task.record)),
            None => Ok(None),
        }
    }

    async fn unfinished(&self) -> Result<Vec<PersistedTask>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .map(|(_, task)| task)
            .filter(|task| !task.record.status.is_terminal())
            .collect())
    }

    async fn remove(&self, task_id: &str) -> Result<()> {
        if let Some(path) = self.path_for(task_id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for (path, task) in self.all().await? {
            if task.record.expires_at <= now {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Work item handed to a batch worker
#[derive(Debug, Clone)]
struct Job {
    task_id: String,
    graph: Arc<Graph>,
    fingerprint: String,
}

#[derive(Debug)]
struct QueuedJob {
    priority: u8,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // priority 1 pops first, FIFO within a priority
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
    closed: bool,
}

/// Priority queue shared by the batch workers
#[derive(Debug, Default)]
struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    /// Returns false once the queue has been closed.
    fn push(&self, priority: u8, job: Job) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedJob { priority, seq, job });
        }
        self.notify.notify_one();
        true
    }

    /// Next job, or `None` once the queue is closed.
    async fn pop(&self) -> Option<Job> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(queued) = state.heap.pop() {
                    return Some(queued.job);
                }
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    fn len(&self) -> usize {
        self.state.lock().heap.len()
    }
}

/// Tuning for the batch side of the service
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub workers: usize,
    pub fan_out: usize,
    pub step_timeout: Duration,
    pub task_ttl: Duration,
    pub limits: GraphLimits,
}

type CancelFlags = DashMap<String, Arc<AtomicBool>>;

fn cancel_flag(flags: &CancelFlags, task_id: &str) -> Arc<AtomicBool> {
    flags.entry(task_id.to_string()).or_default().clone()
}

pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    queue: Arc<JobQueue>,
    cancels: Arc<CancelFlags>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    settings: TaskSettings,
}

impl TaskManager {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(
        settings: TaskSettings,
        store: Arc<dyn TaskStore>,
        analyzer: Analyzer,
        pool: Arc<ComputePool>,
    ) -> Arc<Self> {
        let queue = Arc::new(JobQueue::default());
        let cancels = Arc::new(CancelFlags::new());

        let worker = Worker {
            store: Arc::clone(&store),
            queue: Arc::clone(&queue),
            cancels: Arc::clone(&cancels),
            analyzer,
            pool,
            fan_out: settings.fan_out.max(1),
            step_timeout: settings.step_timeout,
        };
        let handles = (0..settings.workers.max(1))
            .map(|id| tokio::spawn(worker.clone().run(id)))
            .collect();

        info!(
            "Started {} batch workers (fan-out {})",
            settings.workers.max(1),
            settings.fan_out.max(1)
        );

        Arc::new(Self {
            store,
            queue,
            cancels,
            workers: Mutex::new(handles),
            settings,
        })
    }

    /// Validate, persist and enqueue a batch. Returns the queued record.
    pub async fn submit(
        &self,
        network: &GraphPayload,
        requests: Vec<AlgorithmRequest>,
        priority: u8,
    ) -> Result<TaskRecord> {
        if requests.is_empty() {
            return Err(CentralityError::invalid_parameter(
                "a batch needs at least one algorithm",
            ));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(CentralityError::invalid_parameter(format!(
                "priority must be between {} and {}, got {}",
                MIN_PRIORITY, MAX_PRIORITY, priority
            )));
        }

        // a typo in one step rejects the whole batch before anything is stored
        let steps = requests
            .into_iter()
            .map(|request| {
                let algorithm: CentralityKind = request.algorithm.parse()?;
                request.parameters.validate()?;
                Ok(TaskStep {
                    algorithm,
                    parameters: request.parameters,
                    outcome: StepOutcome::Pending,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let graph = Arc::new(Graph::from_payload(network, self.settings.limits)?);
        let fingerprint = graph_fingerprint(&graph);
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.settings.task_ttl)
            .map_err(|e| CentralityError::internal(format!("task TTL out of range: {}", e)))?;

        let record = TaskRecord {
            task_id: Uuid::new_v4().to_string(),
            graph_fingerprint: fingerprint.clone(),
            priority,
            status: TaskStatus::Queued,
            total_steps: steps.len(),
            steps,
            progress: 0.0,
            completed_steps: 0,
            last_completed: None,
            cancel_requested: false,
            error: None,
            created_at,
            started_at: None,
            finished_at: None,
            expires_at: created_at + ttl,
        };

        self.store
            .insert(PersistedTask {
                record: record.clone(),
                network: network.clone(),
            })
            .await?;

        let job = Job {
            task_id: record.task_id.clone(),
            graph,
            fingerprint,
        };
        if !self.queue.push(priority, job) {
            return Err(CentralityError::internal("batch queue is shut down"));
        }

        info!(
            "Queued task {} with {} algorithms at priority {}",
            record.task_id, record.total_steps, priority
        );
        Ok(record)
    }

    /// Current record of a task; unknown and expired ids are not found.
    pub async fn status(&self, task_id: &str) -> Result<TaskRecord> {
        let not_found = || CentralityError::TaskNotFound {
            task_id: task_id.to_string(),
        };
        let mut record = self.store.get(task_id).await?.ok_or_else(not_found)?;

        if record.expires_at <= Utc::now() {
            debug!("Task {} has expired", task_id);
            self.store.remove(task_id).await?;
            return Err(not_found());
        }
        if let Some(flag) = self.cancels.get(task_id) {
            record.cancel_requested |= flag.load(Ordering::SeqCst);
        }
        Ok(record)
    }

    /// Ask a task to stop. The running step stops at its next deadline check
    /// or finishes; the remaining steps are skipped.
    pub async fn cancel(&self, task_id: &str) -> Result<TaskRecord> {
        let mut record = self.status(task_id).await?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        cancel_flag(&self.cancels, task_id).store(true, Ordering::SeqCst);

        // the worker may have finished and dropped its flag in between
        let current = self.store.get(task_id).await?.ok_or_else(|| CentralityError::TaskNotFound {
            task_id: task_id.to_string(),
        })?;
        if current.status.is_terminal() {
            self.cancels.remove(task_id);
            return Ok(current);
        }
        record.cancel_requested = true;
        info!("Cancellation requested for task {}", task_id);
        Ok(record)
    }

    /// Re-enqueue tasks a previous process left queued or running.
    pub async fn recover(&self) -> Result<usize> {
        let mut recovered = 0;
        for task in self.store.unfinished().await? {
            let mut record = task.record;
            match Graph::from_payload(&task.network, self.settings.limits) {
                Ok(graph) => {
                    if record.cancel_requested {
                        cancel_flag(&self.cancels, &record.task_id).store(true, Ordering::SeqCst);
                    }
                    let job = Job {
                        task_id: record.task_id.clone(),
                        fingerprint: graph_fingerprint(&graph),
                        graph: Arc::new(graph),
                    };
                    if self.queue.push(record.priority, job) {
                        recovered += 1;
                    }
                }
                Err(e) => {
                    error!("Cannot recover task {}: {}", record.task_id, e);
                    record.status = TaskStatus::Failed;
                    record.error = Some(e.to_string());
                    record.finished_at = Some(Utc::now());
                    self.store.update(&record).await?;
                }
            }
        }
        if recovered > 0 {
            info!("Recovered {} unfinished tasks", recovered);
        }
        Ok(recovered)
    }

    /// Drop expired tasks and any cancel flag no live task still needs.
    pub async fn purge_expired(&self) -> Result<usize> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        if removed > 0 {
            debug!("Purged {} expired tasks", removed);
        }

        let flagged: Vec<String> = self.cancels.iter().map(|entry| entry.key().clone()).collect();
        for task_id in flagged {
            let live = matches!(
                self.store.get(&task_id).await?,
                Some(record) if !record.status.is_terminal()
            );
            if !live {
                self.cancels.remove(&task_id);
            }
        }
        Ok(removed)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop taking new work and wait for the workers to finish their current task.
    pub async fn shutdown(&self) {
        self.queue.close();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Batch worker ended abnormally: {}", e);
            }
        }
        info!("Batch workers stopped");
    }
}

#[derive(Clone)]
struct Worker {
    store: Arc<dyn TaskStore>,
    queue: Arc<JobQueue>,
    cancels: Arc<CancelFlags>,
    analyzer: Analyzer,
    pool: Arc<ComputePool>,
    fan_out: usize,
    step_timeout: Duration,
}

impl Worker {
    async fn run(self, id: usize) {
        debug!("Batch worker {} started", id);
        while let Some(job) = self.queue.pop().await {
            let task_id = job.task_id.clone();
            if let Err(e) = self.process(job).await {
                error!("Task {} failed: {}", task_id, e);
                self.mark_failed(&task_id, &e).await;
            }
        }
        debug!("Batch worker {} exiting", id);
    }

    #[instrument(skip_all, fields(task_id = %job.task_id))]
    async fn process(&self, job: Job) -> Result<()> {
        let Some(mut record) = self.store.get(&job.task_id).await? else {
            warn!("Task {} disappeared before it could run", job.task_id);
            return Ok(());
        };
        if record.status.is_terminal() {
            return Ok(());
        }

        let cancel = cancel_flag(&self.cancels, &record.task_id);
        record.status = TaskStatus::Running;
        record.started_at.get_or_insert_with(Utc::now);
        self.store.update(&record).await?;
        info!("Running task {} ({} steps)", record.task_id, record.total_steps);

        let pending: Vec<(usize, CentralityKind, AlgorithmParams)> = record
            .steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.outcome.is_pending())
            .map(|(index, step)| (index, step.algorithm, step.parameters.clone()))
            .collect();

        let job = &job;
        let mut outcomes = stream::iter(pending)
            .map(|(index, algorithm, params)| {
                let cancel = Arc::clone(&cancel);
                async move {
                    if cancel.load(Ordering::SeqCst) {
                        let reason = "task was cancelled".to_string();
                        return (index, StepOutcome::Skipped { reason });
                    }
                    (index, self.run_step(job, algorithm, params).await)
                }
            })
            .buffer_unordered(self.fan_out);

        while let Some((index, outcome)) = outcomes.next().await {
            let algorithm = record.steps[index].algorithm;
            match &outcome {
                StepOutcome::Completed { .. } => debug!("Task {}: {} completed", record.task_id, algorithm),
                StepOutcome::Failed { error, .. } => warn!("Task {}: {} failed: {}", record.task_id, algorithm, error),
                _ => {}
            }
            if !matches!(outcome, StepOutcome::Skipped { .. }) {
                record.last_completed = Some(algorithm.to_string());
            }
            record.steps[index].outcome = outcome;
            record.refresh_progress();
            self.store.update(&record).await?;
        }

        let cancelled = record
            .steps
            .iter()
            .any(|step| matches!(step.outcome, StepOutcome::Skipped { .. }));
        record.status = if cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        };
        record.cancel_requested = cancel.load(Ordering::SeqCst);
        record.finished_at = Some(Utc::now());
        self.store.update(&record).await?;
        self.cancels.remove(&record.task_id);

        info!(
            "Task {} {} ({}/{} steps)",
            record.task_id,
            record.status.as_str(),
            record.completed_steps,
            record.total_steps
        );
        Ok(())
    }

    async fn run_step(&self, job: &Job, kind: CentralityKind, params: AlgorithmParams) -> StepOutcome {
        match self
            .analyzer
            .analyze(
                &self.pool,
                Arc::clone(&job.graph),
                &job.fingerprint,
                kind,
                params,
                self.step_timeout,
            )
            .await
        {
            Ok(result) => StepOutcome::Completed { result },
            Err(e) => StepOutcome::failed(&e),
        }
    }

    async fn mark_failed(&self, task_id: &str, cause: &CentralityError) {
        self.cancels.remove(task_id);
        let mut record = match self.store.get(task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!("Could not load task {} to mark it failed: {}", task_id, e);
                return;
            }
        };
        record.status = TaskStatus::Failed;
        record.error = Some(cause.to_string());
        record.finished_at = Some(Utc::now());
        if let Err(e) = self.store.update(&record).await {
            error!("Could not mark task {} failed: {}", task_id, e);
        }
    }
}
