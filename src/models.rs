use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CentralityError, Result};

/// The fixed set of centrality algorithms the engine knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityKind {
    Degree,
    Betweenness,
    Closeness,
    Eigenvector,
    Katz,
    #[serde(rename = "pagerank")]
    PageRank,
    BonacichPower,
    HitsHubs,
    HitsAuthorities,
    Leverage,
    Load,
    Harmonic,
    Subgraph,
    Alpha,
    CommunicabilityBetweenness,
}

impl CentralityKind {
    pub const ALL: [CentralityKind; 15] = [
        Self::Degree,
        Self::Betweenness,
        Self::Closeness,
        Self::Eigenvector,
        Self::Katz,
        Self::PageRank,
        Self::BonacichPower,
        Self::HitsHubs,
        Self::HitsAuthorities,
        Self::Leverage,
        Self::Load,
        Self::Harmonic,
        Self::Subgraph,
        Self::Alpha,
        Self::CommunicabilityBetweenness,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Degree => "degree",
            Self::Betweenness => "betweenness",
            Self::Closeness => "closeness",
            Self::Eigenvector => "eigenvector",
            Self::Katz => "katz",
            Self::PageRank => "pagerank",
            Self::BonacichPower => "bonacich_power",
            Self::HitsHubs => "hits_hubs",
            Self::HitsAuthorities => "hits_authorities",
            Self::Leverage => "leverage",
            Self::Load => "load",
            Self::Harmonic => "harmonic",
            Self::Subgraph => "subgraph",
            Self::Alpha => "alpha",
            Self::CommunicabilityBetweenness => "communicability_betweenness",
        }
    }
}

impl fmt::Display for CentralityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CentralityKind {
    type Err = CentralityError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let normalized = match normalized.as_str() {
            "page_rank" => "pagerank",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| CentralityError::UnknownAlgorithm {
                name: s.to_string(),
            })
    }
}

/// Which incident edges count towards a node's degree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    In,
    Out,
    #[default]
    Both,
}

/// Parameter bundle shared by every algorithm. Fields an algorithm does not
/// use are ignored by it but still take part in the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParams {
    #[serde(default = "default_normalized")]
    pub normalized: bool,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub beta: Option<f64>,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub sample_size: Option<usize>,
    #[serde(default)]
    pub cutoff: Option<f64>,
    #[serde(default)]
    pub direction: EdgeDirection,
    #[serde(default)]
    pub rescale_max: bool,
}

impl Default for AlgorithmParams {
    fn default() -> Self {
        Self {
            normalized: default_normalized(),
            weight: None,
            alpha: None,
            beta: None,
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
            sample_size: None,
            cutoff: None,
            direction: EdgeDirection::default(),
            rescale_max: false,
        }
    }
}

impl AlgorithmParams {
    /// Reject parameter bundles no kernel can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(CentralityError::invalid_parameter(
                "max_iter must be a positive integer",
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(CentralityError::invalid_parameter(format!(
                "tolerance must be a positive number, got {}",
                self.tolerance
            )));
        }
        if let Some(alpha) = self.alpha {
            if !alpha.is_finite() {
                return Err(CentralityError::invalid_parameter("alpha must be finite"));
            }
        }
        if let Some(beta) = self.beta {
            if !beta.is_finite() {
                return Err(CentralityError::invalid_parameter("beta must be finite"));
            }
        }
        if self.sample_size == Some(0) {
            return Err(CentralityError::invalid_parameter(
                "sample_size must be at least 1",
            ));
        }
        if let Some(cutoff) = self.cutoff {
            if cutoff.is_nan() || cutoff < 0.0 {
                return Err(CentralityError::invalid_parameter(
                    "cutoff must be a non-negative distance",
                ));
            }
        }
        if matches!(self.weight.as_deref(), Some("")) {
            return Err(CentralityError::invalid_parameter(
                "weight attribute name must not be empty",
            ));
        }
        Ok(())
    }

    pub fn weight(&self) -> Option<&str> {
        self.weight.as_deref()
    }

    pub fn alpha_or(&self, default: f64) -> f64 {
        self.alpha.unwrap_or(default)
    }

    pub fn beta_or(&self, default: f64) -> f64 {
        self.beta.unwrap_or(default)
    }
}

/// Client-supplied node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Client-supplied edge; `weight` defaults to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgePayload {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Graph as received from clients, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<NodePayload>,
    #[serde(default)]
    pub edges: Vec<EdgePayload>,
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl GraphPayload {
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            ..Self::default()
        }
    }

    pub fn with_node(mut self, id: impl Into<String>) -> Self {
        self.nodes.push(NodePayload {
            id: id.into(),
            label: None,
            attributes: Map::new(),
        });
        self
    }

    pub fn with_edge(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_weighted_edge(source, target, 1.0)
    }

    pub fn with_weighted_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        weight: f64,
    ) -> Self {
        self.edges.push(EdgePayload {
            source: source.into(),
            target: target.into(),
            weight: Some(weight),
            attributes: Map::new(),
        });
        self
    }
}

/// One algorithm of a batch, as named by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmRequest {
    pub algorithm: String,
    #[serde(default)]
    pub parameters: AlgorithmParams,
}

impl AlgorithmRequest {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            parameters: AlgorithmParams::default(),
        }
    }
}

/// Substitution recorded when the requested algorithm could not produce scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub from: CentralityKind,
    pub to: CentralityKind,
    pub reason: String,
}

/// Raw per-node scores as produced by the engine; this is what the cache holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub algorithm: CentralityKind,
    pub computed_with: CentralityKind,
    pub fallback: Option<FallbackRecord>,
    pub scores: HashMap<String, f64>,
}

/// A node's position in a ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedScore {
    pub node_id: String,
    pub centrality_score: f64,
    pub rank: usize,
    pub percentile: f64,
}

/// Summary statistics of the analysed graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub density: f64,
    pub directed: bool,
    pub self_loops: usize,
    pub has_weights: bool,
}

/// Complete result of one algorithm over one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityAnalysis {
    pub algorithm: CentralityKind,
    pub computed_with: CentralityKind,
    pub fallback: Option<FallbackRecord>,
    pub results: Vec<RankedScore>,
    pub parameters: AlgorithmParams,
    pub network_stats: GraphStats,
    pub warnings: Vec<String>,
    pub cached: bool,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Static description of an algorithm, used for discovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmInfo {
    pub name: CentralityKind,
    pub display_name: &'static str,
    pub description: &'static str,
    pub complexity: &'static str,
    pub use_cases: Vec<&'static str>,
    pub parameters: Vec<&'static str>,
    pub normalization: &'static str,
    pub fallback: Option<CentralityKind>,
    pub limitations: Vec<&'static str>,
}

/// Request for a single centrality calculation
#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub network: GraphPayload,
    pub algorithm: String,
    #[serde(default)]
    pub parameters: Option<AlgorithmParams>,
}

/// Request for a batch of calculations against one graph
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub network: GraphPayload,
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, AlgorithmParams>,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

impl BatchRequest {
    /// Pair every requested algorithm with its parameters (defaults when absent).
    pub fn algorithm_requests(&self) -> Vec<AlgorithmRequest> {
        self.algorithms
            .iter()
            .map(|algorithm| AlgorithmRequest {
                algorithm: algorithm.clone(),
                parameters: self.parameters.get(algorithm).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// Response for an accepted batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmission {
    pub task_id: String,
    pub status: String,
    pub total_algorithms: usize,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Request to compare several algorithms side by side
#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub network: GraphPayload,
    pub algorithms: Vec<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

/// Top-ranked nodes of one algorithm within a comparison
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonEntry {
    pub algorithm: CentralityKind,
    pub computed_with: CentralityKind,
    pub top_nodes: Vec<RankedScore>,
    pub execution_time_ms: u64,
}

/// Response for a comparison
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub network_stats: GraphStats,
    pub results: Vec<ComparisonEntry>,
    pub timestamp: DateTime<Utc>,
}

// Default values for serde
fn default_normalized() -> bool {
    true
}

fn default_max_iter() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_priority() -> u8 {
    1
}

fn default_top_n() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_its_name() {
        for kind in CentralityKind::ALL {
            assert_eq!(kind.as_str().parse::<CentralityKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_kind_parsing_is_lenient_about_case_and_dashes() {
        assert_eq!(
            "Hits-Hubs".parse::<CentralityKind>().unwrap(),
            CentralityKind::HitsHubs
        );
        assert_eq!(
            "page_rank".parse::<CentralityKind>().unwrap(),
            CentralityKind::PageRank
        );
    }

    #[test]
    fn test_unknown_algorithm_name() {
        let err = "spectral_magic".parse::<CentralityKind>().unwrap_err();
        assert!(matches!(err, CentralityError::UnknownAlgorithm { ref name } if name == "spectral_magic"));
    }

    #[test]
    fn test_params_defaults_match_serde_defaults() {
        let parsed: AlgorithmParams = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, AlgorithmParams::default());
        assert!(parsed.normalized);
        assert_eq!(parsed.max_iter, 100);
    }

    #[test]
    fn test_params_validation() {
        let mut params = AlgorithmParams::default();
        assert!(params.validate().is_ok());

        params.max_iter = 0;
        assert!(matches!(
            params.validate(),
            Err(CentralityError::InvalidParameter { .. })
        ));

        let params = AlgorithmParams {
            tolerance: -1.0,
            ..AlgorithmParams::default()
        };
        assert!(params.validate().is_err());

        let params = AlgorithmParams {
            sample_size: Some(0),
            ..AlgorithmParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_batch_request_fills_missing_parameters() {
        let request: BatchRequest = serde_json::from_value(serde_json::json!({
            "network": { "nodes": [{ "id": "a" }], "edges": [] },
            "algorithms": ["degree", "katz"],
            "parameters": { "katz": { "alpha": 0.05 } }
        }))
        .unwrap();

        let requests = request.algorithm_requests();
        assert_eq!(request.priority, 1);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].parameters, AlgorithmParams::default());
        assert_eq!(requests[1].parameters.alpha, Some(0.05));
    }
}
