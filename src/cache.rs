use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::Result;
use crate::graph::Graph;
use crate::models::{AlgorithmParams, CentralityKind, ScoreSet};

/// Cache entry with expiry and access tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: Instant,
    access_count: u32,
}

/// Hit/miss counters reported by `/stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// TTL-only score cache keyed by content fingerprint.
///
/// Entries are stored serialized so a corrupt or incompatible payload shows
/// up as an error on read instead of a bad result.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Result<Option<ScoreSet>> {
        let now = Instant::now();
        let payload = match self.entries.get_mut(key) {
            Some(mut entry) if entry.expires_at > now => {
                entry.access_count += 1;
                debug!("Cache hit for {} (access count: {})", key, entry.access_count);
                Some(entry.payload.clone())
            }
            Some(entry) => {
                drop(entry); // release the shard lock before removing
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                debug!("Cache entry expired for {}", key);
                None
            }
            None => None,
        };

        match payload {
            Some(json) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub fn set(&self, key: &str, scores: &ScoreSet, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(scores)?;
        debug!("Caching {} for {:?}", key, ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                expires_at: Instant::now() + ttl,
                access_count: 0,
            },
        );
        Ok(())
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Order-independent SHA-256 over a graph's content.
///
/// Nodes and edges are sorted by identifier before hashing, and undirected
/// edges are written with their endpoints in identifier order, so the same
/// graph submitted in a different order hashes identically.
pub fn graph_fingerprint(graph: &Graph) -> String {
    let mut nodes: Vec<&str> = graph.node_ids().iter().map(String::as_str).collect();
    nodes.sort_unstable();

    let mut edges: Vec<(&str, &str, u64, String)> = graph
        .edges()
        .iter()
        .map(|edge| {
            let mut source = graph.node_id(edge.source);
            let mut target = graph.node_id(edge.target);
            if !graph.is_directed() && target < source {
                std::mem::swap(&mut source, &mut target);
            }
            let attributes = serde_json::Value::Object(edge.attributes.clone()).to_string();
            (source, target, edge.weight.to_bits(), attributes)
        })
        .collect();
    edges.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(if graph.is_directed() { b"directed\n" as &[u8] } else { b"undirected\n" });
    for node in nodes {
        hasher.update(node.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(b"\nedges\n");
    for (source, target, weight, attributes) in edges {
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(target.as_bytes());
        hasher.update([0u8]);
        hasher.update(weight.to_le_bytes());
        hasher.update(attributes.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

/// Cache key for one algorithm run over a fingerprinted graph.
pub fn cache_key(graph_fingerprint: &str, kind: CentralityKind, params: &AlgorithmParams) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(graph_fingerprint.as_bytes());
    hasher.update(kind.as_str().as_bytes());
    hasher.update(serde_json::to_vec(params)?);
    Ok(format!("centrality:{}:{:x}", kind, hasher.finalize()))
}
