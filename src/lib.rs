/*!
# Network Centrality Service

Centrality analysis for client-supplied graphs, served over HTTP.

This library provides:
- Fifteen centrality algorithms with automatic fallback when one fails
- A fingerprint cache keyed by graph structure and parameters
- Prioritised background batches with progress, cancellation and recovery
- Ranked results with percentiles and network statistics
- Per-algorithm execution timings

Numeric work runs on bounded thread pools with wall-clock deadlines that the
kernels themselves check, so a timed-out computation gives its thread back and
the async runtime never blocks on a long computation.
*/

pub mod algorithms;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod graph;
pub mod models;
pub mod performance;
pub mod pool;
pub mod server;
pub mod service;
pub mod tasks;

pub use config::Config;
pub use error::{CentralityError, Result};
pub use graph::Graph;
pub use models::*;
pub use performance::AlgorithmPerformance;
pub use service::CentralityService;
pub use tasks::{StepOutcome, TaskRecord, TaskStatus};
