use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

use crate::engine::algorithm_info;
use crate::models::CentralityKind;

/// Executions at or above this count as slow
pub const SLOW_EXECUTION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
struct Counters {
    executions: u64,
    failures: u64,
    slow: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
    last_execution: Option<DateTime<Utc>>,
}

/// Observed compute times of one algorithm since the service started.
/// Cache hits are not executions and are not counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmPerformance {
    pub algorithm: CentralityKind,
    pub complexity: &'static str,
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub slow_executions: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: Option<f64>,
    pub min_time_ms: Option<f64>,
    pub max_time_ms: Option<f64>,
    pub last_execution: Option<DateTime<Utc>>,
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

/// Per-algorithm execution counters shared by the request path and batch workers
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    counters: DashMap<CentralityKind, Counters>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CentralityKind, elapsed: Duration, success: bool) {
        let mut counters = self.counters.entry(kind).or_default();
        counters.executions += 1;
        if !success {
            counters.failures += 1;
        }
        if elapsed >= SLOW_EXECUTION {
            counters.slow += 1;
        }
        counters.total += elapsed;
        counters.min = Some(counters.min.map_or(elapsed, |min| min.min(elapsed)));
        counters.max = counters.max.max(elapsed);
        counters.last_execution = Some(Utc::now());
    }

    /// Figures for `kind`; an algorithm that never ran reports zero executions.
    pub fn get(&self, kind: CentralityKind) -> AlgorithmPerformance {
        let counters = self
            .counters
            .get(&kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let ran = counters.executions > 0;

        AlgorithmPerformance {
            algorithm: kind,
            complexity: algorithm_info(kind).complexity,
            executions: counters.executions,
            successes: counters.executions - counters.failures,
            failures: counters.failures,
            slow_executions: counters.slow,
            total_time_ms: millis(counters.total),
            avg_time_ms: ran.then(|| millis(counters.total) / counters.executions as f64),
            min_time_ms: counters.min.map(millis),
            max_time_ms: ran.then(|| millis(counters.max)),
            last_execution: counters.last_execution,
        }
    }

    /// Every algorithm that has run at least once, in catalogue order
    pub fn snapshot(&self) -> Vec<AlgorithmPerformance> {
        CentralityKind::ALL
            .into_iter()
            .filter(|kind| self.counters.contains_key(kind))
            .map(|kind| self.get(kind))
            .collect()
    }
}
