use crate::error::CentralityError;
use crate::models::{BatchRequest, CalculateRequest, CompareRequest};
use crate::service::CentralityService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    service: Arc<CentralityService>,
}

impl AppState {
    pub fn new(service: Arc<CentralityService>) -> Self {
        Self { service }
    }
}

/// Create the HTTP server with all centrality endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/centrality/calculate", post(calculate_endpoint))
        .route("/centrality/batch", post(batch_endpoint))
        .route(
            "/centrality/tasks/:task_id",
            get(task_status_endpoint).delete(cancel_task_endpoint),
        )
        .route("/centrality/algorithms", get(list_algorithms_endpoint))
        .route("/centrality/algorithms/:algorithm", get(algorithm_info_endpoint))
        .route("/centrality/compare", post(compare_endpoint))
        .route("/centrality/performance/:algorithm", get(performance_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "network-centrality-rs"
    }))
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.stats())
}

/// Single calculation, answered synchronously
async fn calculate_endpoint(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> impl IntoResponse {
    match state
        .service
        .calculate(&request.network, &request.algorithm, request.parameters)
        .await
    {
        Ok(analysis) => {
            info!(
                "{} computed for {} nodes in {}ms",
                analysis.computed_with, analysis.network_stats.nodes, analysis.execution_time_ms
            );
            Json(analysis).into_response()
        }
        Err(e) => {
            error!("Calculation of {} failed: {}", request.algorithm, e);
            handle_error(e).into_response()
        }
    }
}

/// Queue a batch; the caller polls the task endpoint
async fn batch_endpoint(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> impl IntoResponse {
    let requests = request.algorithm_requests();
    match state
        .service
        .submit_batch(&request.network, requests, request.priority)
        .await
    {
        Ok(submission) => (StatusCode::ACCEPTED, Json(submission)).into_response(),
        Err(e) => {
            error!("Batch submission rejected: {}", e);
            handle_error(e).into_response()
        }
    }
}

async fn task_status_endpoint(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match state.service.get_task_status(&task_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => handle_error(e).into_response(),
    }
}

async fn cancel_task_endpoint(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match state.service.cancel_task(&task_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => handle_error(e).into_response(),
    }
}

async fn list_algorithms_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let algorithms = state.service.list_algorithms();
    Json(json!({
        "count": algorithms.len(),
        "algorithms": algorithms
    }))
}

async fn algorithm_info_endpoint(
    State(state): State<AppState>,
    Path(algorithm): Path<String>,
) -> impl IntoResponse {
    match state.service.get_algorithm_info(&algorithm) {
        Ok(info) => Json(info).into_response(),
        Err(e) => handle_error(e).into_response(),
    }
}

/// Top nodes of several algorithms side by side
async fn compare_endpoint(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> impl IntoResponse {
    match state
        .service
        .compare(&request.network, &request.algorithms, request.top_n)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!("Comparison failed: {}", e);
            handle_error(e).into_response()
        }
    }
}

/// Execution timings observed for one algorithm
async fn performance_endpoint(
    State(state): State<AppState>,
    Path(algorithm): Path<String>,
) -> impl IntoResponse {
    match state.service.performance(&algorithm) {
        Ok(performance) => Json(performance).into_response(),
        Err(e) => handle_error(e).into_response(),
    }
}

/// Convert errors to HTTP responses
fn handle_error(error: CentralityError) -> (StatusCode, Json<serde_json::Value>) {
    let (status, message) = match &error {
        CentralityError::InvalidGraph { .. } => (StatusCode::BAD_REQUEST, "Invalid graph"),
        CentralityError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "Invalid parameter"),
        CentralityError::UnknownAlgorithm { .. } => (StatusCode::BAD_REQUEST, "Unknown algorithm"),
        CentralityError::GraphTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "Graph too large"),
        CentralityError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "Task not found"),
        CentralityError::ComputationTimeout { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "Computation timed out")
        }
        CentralityError::AlgorithmError { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Algorithm execution failed")
        }
        CentralityError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Task storage error"),
        CentralityError::Serialization(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error")
        }
        CentralityError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "I/O error"),
        CentralityError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    };

    if status.is_server_error() {
        warn!("Responding {} ({}): {}", status, error.code(), error);
    }

    (
        status,
        Json(json!({
            "error": message,
            "code": error.code(),
            "details": error.to_string()
        })),
    )
}
