use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::error;

/// Why a pooled job produced no value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("job exceeded {0:?}")]
    TimedOut(Duration),

    #[error("job aborted before producing a result")]
    Aborted,
}

/// Bounded pool of CPU threads for numeric work.
///
/// Async callers hand it a closure and await the result; the closure runs
/// on a pool thread so it never blocks the runtime. A job that outlives its
/// timeout keeps its thread until it returns, but the caller is released;
/// jobs that must not hold a thread past their timeout check a deadline.
pub struct ComputePool {
    name: String,
    threads: usize,
    pool: rayon::ThreadPool,
}

impl ComputePool {
    pub fn new(name: &str, threads: usize) -> anyhow::Result<Self> {
        let threads = threads.max(1);
        let prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |index| format!("{}-{}", prefix, index))
            .panic_handler(|_| error!("Compute job panicked"))
            .build()?;
        Ok(Self {
            name: name.to_string(),
            threads,
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub async fn run<T, F>(&self, timeout: Duration, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            // receiver may be gone after a timeout
            let _ = tx.send(job());
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PoolError::Aborted),
            Err(_) => Err(PoolError::TimedOut(timeout)),
        }
    }
}

impl std::fmt::Debug for ComputePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputePool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .finish()
    }
}
