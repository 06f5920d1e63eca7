use std::time::Duration;
use thiserror::Error;

/// Result type for centrality operations
pub type Result<T> = std::result::Result<T, CentralityError>;

/// Errors surfaced to callers of the centrality service
#[derive(Error, Debug)]
pub enum CentralityError {
    #[error("Invalid graph: {message}")]
    InvalidGraph { message: String },

    #[error("Graph too large: {count} {what} exceeds the limit of {limit}")]
    GraphTooLarge {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("Unknown algorithm: {name}")]
    UnknownAlgorithm { name: String },

    #[error("Invalid algorithm parameter: {message}")]
    InvalidParameter { message: String },

    #[error("{algorithm} computation exceeded {timeout:?}")]
    ComputationTimeout {
        algorithm: String,
        timeout: Duration,
    },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("{algorithm} failed: {message}")]
    AlgorithmError { algorithm: String, message: String },

    #[error("Task storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CentralityError {
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph {
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn algorithm_error(algorithm: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AlgorithmError {
            algorithm: algorithm.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code, recorded in task records and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidGraph { .. } => "INVALID_GRAPH",
            Self::GraphTooLarge { .. } => "GRAPH_TOO_LARGE",
            Self::UnknownAlgorithm { .. } => "UNKNOWN_ALGORITHM",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::ComputationTimeout { .. } => "COMPUTATION_TIMEOUT",
            Self::TaskNotFound { .. } => "TASK_NOT_FOUND",
            Self::AlgorithmError { .. } => "ALGORITHM_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// An iterative kernel ran out of iterations before meeting its tolerance.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{algorithm} did not converge within {iterations} iterations (tolerance {tolerance})")]
pub struct ConvergenceError {
    pub algorithm: &'static str,
    pub iterations: u32,
    pub tolerance: f64,
}

/// Failure modes of a single numeric kernel. Never leaves the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("numeric failure: {0}")]
    Numeric(String),

    #[error("{nodes} nodes exceeds the matrix method limit of {limit}")]
    MatrixTooLarge { nodes: usize, limit: usize },

    #[error("stopped after exceeding the {budget:?} compute budget")]
    DeadlineExceeded { budget: Duration },
}

impl KernelError {
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::Numeric(message.into())
    }
}
