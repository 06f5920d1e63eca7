use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::graph::GraphLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub max_nodes: usize,
    pub max_edges: usize,
    pub batch_max_nodes: usize,
    pub batch_max_edges: usize,
    pub matrix_node_limit: usize,
    pub communicability_node_limit: usize,
    pub compute_workers: usize,
    pub batch_workers: usize,
    pub batch_fan_out: usize,
    pub compute_timeout_secs: u64,
    pub step_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub task_ttl_secs: u64,
    pub task_store_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8001".to_string(),
            max_nodes: 10_000,
            max_edges: 100_000,
            batch_max_nodes: 50_000,
            batch_max_edges: 500_000,
            matrix_node_limit: 2_000,
            communicability_node_limit: 200,
            compute_workers: num_cpus::get(),
            batch_workers: 2,
            batch_fan_out: 1,
            compute_timeout_secs: 300,
            step_timeout_secs: 1_500,
            cache_ttl_secs: 3_600,
            sweep_interval_secs: 60,
            task_ttl_secs: 7 * 24 * 3_600,
            task_store_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_nodes: parse_var("MAX_NODES", defaults.max_nodes)?,
            max_edges: parse_var("MAX_EDGES", defaults.max_edges)?,
            batch_max_nodes: parse_var("BATCH_MAX_NODES", defaults.batch_max_nodes)?,
            batch_max_edges: parse_var("BATCH_MAX_EDGES", defaults.batch_max_edges)?,
            matrix_node_limit: parse_var("MATRIX_NODE_LIMIT", defaults.matrix_node_limit)?,
            communicability_node_limit: parse_var(
                "COMMUNICABILITY_NODE_LIMIT",
                defaults.communicability_node_limit,
            )?,
            compute_workers: parse_var("COMPUTE_WORKERS", defaults.compute_workers)?,
            batch_workers: parse_var("BATCH_WORKERS", defaults.batch_workers)?,
            batch_fan_out: parse_var("BATCH_FAN_OUT", defaults.batch_fan_out)?,
            compute_timeout_secs: parse_var("COMPUTE_TIMEOUT_SECS", defaults.compute_timeout_secs)?,
            step_timeout_secs: parse_var("STEP_TIMEOUT_SECS", defaults.step_timeout_secs)?,
            cache_ttl_secs: parse_var("CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            task_ttl_secs: parse_var("TASK_TTL_SECS", defaults.task_ttl_secs)?,
            task_store_dir: env::var("TASK_STORE_DIR")
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        })
    }

    /// Ceilings for single-algorithm requests
    pub fn request_limits(&self) -> GraphLimits {
        GraphLimits {
            max_nodes: self.max_nodes,
            max_edges: self.max_edges,
        }
    }

    /// Ceilings for batch submissions
    pub fn batch_limits(&self) -> GraphLimits {
        GraphLimits {
            max_nodes: self.batch_max_nodes,
            max_edges: self.batch_max_edges,
        }
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, value, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.request_limits().max_nodes, 10_000);
        assert_eq!(config.batch_limits().max_nodes, 50_000);
        assert!(config.batch_limits().max_nodes > config.request_limits().max_nodes);
        assert_eq!(config.task_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.batch_fan_out, 1);
        assert!(config.communicability_node_limit < config.matrix_node_limit);
        assert!(config.task_store_dir.is_none());
    }

    #[test]
    fn test_parse_var_reports_the_variable() {
        env::set_var("NETWORK_CENTRALITY_TEST_WORKERS", "many");
        let err = parse_var::<usize>("NETWORK_CENTRALITY_TEST_WORKERS", 2).unwrap_err();
        assert!(err.to_string().contains("NETWORK_CENTRALITY_TEST_WORKERS"));
        env::remove_var("NETWORK_CENTRALITY_TEST_WORKERS");

        assert_eq!(parse_var::<usize>("NETWORK_CENTRALITY_TEST_UNSET", 7).unwrap(), 7);
    }
}
