//! Canonical in-memory graph built from a client payload.
//!
//! Nodes keep the order in which the client listed them; that order is the
//! tie-break used when ranking equal scores. Duplicate edges collapse onto a
//! single edge whose weight and attributes are those of the last occurrence.

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{CentralityError, Result};
use crate::models::{EdgeDirection, GraphPayload, GraphStats};

/// Size ceilings checked before a graph is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphLimits {
    pub max_nodes: usize,
    pub max_edges: usize,
}

impl GraphLimits {
    pub fn check(&self, payload: &GraphPayload) -> Result<()> {
        if payload.nodes.len() > self.max_nodes {
            return Err(CentralityError::GraphTooLarge {
                what: "nodes",
                count: payload.nodes.len(),
                limit: self.max_nodes,
            });
        }
        if payload.edges.len() > self.max_edges {
            return Err(CentralityError::GraphTooLarge {
                what: "edges",
                count: payload.edges.len(),
                limit: self.max_edges,
            });
        }
        Ok(())
    }
}

/// Direction to follow when walking adjacency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl From<EdgeDirection> for Direction {
    fn from(direction: EdgeDirection) -> Self {
        match direction {
            EdgeDirection::In => Direction::Incoming,
            EdgeDirection::Out => Direction::Outgoing,
            EdgeDirection::Both => Direction::Both,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
    pub attributes: Map<String, Value>,
}

/// Entry of an adjacency list: the node on the other end and the edge used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacent {
    pub node: usize,
    pub edge: usize,
}

#[derive(Debug, Clone)]
pub struct Graph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    directed: bool,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<Adjacent>>,
    incoming: Vec<Vec<Adjacent>>,
    undirected: Vec<Vec<Adjacent>>,
    warnings: Vec<String>,
}

impl Graph {
    /// Validate a payload against `limits` and build the graph.
    pub fn from_payload(payload: &GraphPayload, limits: GraphLimits) -> Result<Self> {
        limits.check(payload)?;

        let mut ids = Vec::with_capacity(payload.nodes.len());
        let mut index = HashMap::with_capacity(payload.nodes.len());
        for node in &payload.nodes {
            if node.id.is_empty() {
                return Err(CentralityError::invalid_graph("node identifiers must not be empty"));
            }
            if index.insert(node.id.clone(), ids.len()).is_some() {
                return Err(CentralityError::invalid_graph(format!(
                    "duplicate node identifier '{}'",
                    node.id
                )));
            }
            ids.push(node.id.clone());
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(payload.edges.len());
        let mut seen: HashMap<(usize, usize), usize> = HashMap::with_capacity(payload.edges.len());
        let mut warnings = Vec::new();

        for (position, edge) in payload.edges.iter().enumerate() {
            let source = *index.get(&edge.source).ok_or_else(|| {
                CentralityError::invalid_graph(format!(
                    "edge {} references unknown source node '{}'",
                    position, edge.source
                ))
            })?;
            let target = *index.get(&edge.target).ok_or_else(|| {
                CentralityError::invalid_graph(format!(
                    "edge {} references unknown target node '{}'",
                    position, edge.target
                ))
            })?;
            let weight = edge.weight.unwrap_or(1.0);
            if !weight.is_finite() {
                return Err(CentralityError::invalid_graph(format!(
                    "edge {} ({} -> {}) has a non-finite weight",
                    position, edge.source, edge.target
                )));
            }
            if source == target && !payload.directed {
                warnings.push(format!(
                    "self-loop on node '{}' in undirected graph",
                    edge.source
                ));
            }

            let key = if payload.directed {
                (source, target)
            } else {
                (source.min(target), source.max(target))
            };
            let built = Edge {
                source,
                target,
                weight,
                attributes: edge.attributes.clone(),
            };
            match seen.get(&key) {
                Some(&existing) => edges[existing] = built,
                None => {
                    seen.insert(key, edges.len());
                    edges.push(built);
                }
            }
        }

        let n = ids.len();
        let mut outgoing = vec![Vec::new(); n];
        let mut incoming = vec![Vec::new(); n];
        let mut undirected = vec![Vec::new(); n];
        for (edge_index, edge) in edges.iter().enumerate() {
            let (s, t) = (edge.source, edge.target);
            outgoing[s].push(Adjacent { node: t, edge: edge_index });
            incoming[t].push(Adjacent { node: s, edge: edge_index });
            undirected[s].push(Adjacent { node: t, edge: edge_index });
            if s != t {
                undirected[t].push(Adjacent { node: s, edge: edge_index });
            }
        }

        debug!(
            "Built {} graph with {} nodes and {} edges ({} duplicate edges merged)",
            if payload.directed { "directed" } else { "undirected" },
            n,
            edges.len(),
            payload.edges.len() - edges.len()
        );

        Ok(Self {
            ids,
            index,
            directed: payload.directed,
            edges,
            outgoing,
            incoming,
            undirected,
            warnings,
        })
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Node identifiers in insertion order
    pub fn node_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn node_id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Structural warnings found while building (e.g. undirected self-loops)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Adjacency of `node`. On undirected graphs every direction is the same list.
    pub fn neighbors(&self, node: usize, direction: Direction) -> &[Adjacent] {
        if !self.directed {
            return &self.undirected[node];
        }
        match direction {
            Direction::Outgoing => &self.outgoing[node],
            Direction::Incoming => &self.incoming[node],
            Direction::Both => &self.undirected[node],
        }
    }

    /// Distinct neighbours of `node` ignoring direction and self-loops
    pub fn distinct_neighbors(&self, node: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self.undirected[node]
            .iter()
            .map(|adj| adj.node)
            .filter(|&other| other != node)
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Weight of an edge under the given weight attribute.
    ///
    /// `None` means unweighted (1.0), `"weight"` reads the edge's weight field,
    /// any other name reads a numeric edge attribute and defaults to 1.0.
    pub fn edge_weight(&self, edge: usize, attribute: Option<&str>) -> f64 {
        let edge = &self.edges[edge];
        match attribute {
            None => 1.0,
            Some("weight") => edge.weight,
            Some(name) => edge
                .attributes
                .get(name)
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
        }
    }

    /// Degree of `node`, summing weights when an attribute is given.
    /// An undirected self-loop contributes twice.
    pub fn degree(&self, node: usize, direction: Direction, attribute: Option<&str>) -> f64 {
        let adjacency = self.neighbors(node, direction);
        let mut degree: f64 = adjacency
            .iter()
            .map(|adj| self.edge_weight(adj.edge, attribute))
            .sum();
        // self-loops sit once in the merged list but are both ends of the edge
        if !self.directed || direction == Direction::Both {
            degree += adjacency
                .iter()
                .filter(|adj| adj.node == node)
                .map(|adj| self.edge_weight(adj.edge, attribute))
                .sum::<f64>();
        }
        degree
    }

    /// Dense adjacency matrix, row = source, column = target.
    pub fn adjacency_matrix(&self, attribute: Option<&str>) -> ndarray::Array2<f64> {
        let n = self.node_count();
        let mut matrix = ndarray::Array2::<f64>::zeros((n, n));
        for (edge_index, edge) in self.edges.iter().enumerate() {
            let weight = self.edge_weight(edge_index, attribute);
            matrix[[edge.source, edge.target]] = weight;
            if !self.directed {
                matrix[[edge.target, edge.source]] = weight;
            }
        }
        matrix
    }

    /// |E| / (|V|(|V|-1)) for directed graphs, twice that for undirected; 0 when |V| <= 1.
    pub fn density(&self) -> f64 {
        let n = self.node_count();
        if n <= 1 {
            return 0.0;
        }
        let possible = (n * (n - 1)) as f64;
        let possible = if self.directed { possible } else { possible / 2.0 };
        self.edge_count() as f64 / possible
    }

    pub fn self_loop_count(&self) -> usize {
        self.edges.iter().filter(|e| e.source == e.target).count()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            density: self.density(),
            directed: self.directed,
            self_loops: self.self_loop_count(),
            has_weights: self.edges.iter().any(|e| e.weight != 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: GraphLimits = GraphLimits {
        max_nodes: 100,
        max_edges: 100,
    };

    fn path() -> GraphPayload {
        GraphPayload::new(false)
            .with_node("A")
            .with_node("B")
            .with_node("C")
            .with_edge("A", "B")
            .with_edge("B", "C")
    }

    #[test]
    fn test_build_path_graph() {
        let graph = Graph::from_payload(&path(), LIMITS).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node_ids(), ["A", "B", "C"]);
        assert_eq!(graph.degree(1, Direction::Both, None), 2.0);
        assert_eq!(graph.neighbors(0, Direction::Incoming).len(), 1);
        assert!((graph.density() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_endpoint_is_rejected() {
        let payload = path().with_edge("C", "Z");
        let err = Graph::from_payload(&payload, LIMITS).unwrap_err();
        assert!(matches!(err, CentralityError::InvalidGraph { .. }));
        assert!(err.to_string().contains("'Z'"));
    }

    #[test]
    fn test_duplicate_node_is_rejected() {
        let payload = path().with_node("B");
        let err = Graph::from_payload(&payload, LIMITS).unwrap_err();
        assert!(matches!(err, CentralityError::InvalidGraph { .. }));
    }

    #[test]
    fn test_ceiling_is_checked_before_building() {
        let limits = GraphLimits {
            max_nodes: 2,
            max_edges: 100,
        };
        let err = Graph::from_payload(&path(), limits).unwrap_err();
        assert!(matches!(
            err,
            CentralityError::GraphTooLarge {
                what: "nodes",
                count: 3,
                limit: 2
            }
        ));
    }

    #[test]
    fn test_undirected_self_loop_is_flagged_and_counts_twice() {
        let payload = path().with_edge("B", "B");
        let graph = Graph::from_payload(&payload, LIMITS).unwrap();
        assert_eq!(graph.warnings().len(), 1);
        assert_eq!(graph.self_loop_count(), 1);
        assert_eq!(graph.degree(1, Direction::Both, None), 4.0);
        assert_eq!(graph.distinct_neighbors(1), vec![0, 2]);
    }

    #[test]
    fn test_duplicate_undirected_edges_collapse() {
        let payload = path().with_weighted_edge("B", "A", 3.0);
        let graph = Graph::from_payload(&payload, LIMITS).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.degree(0, Direction::Both, Some("weight")), 3.0);
    }

    #[test]
    fn test_directed_adjacency_and_density() {
        let payload = GraphPayload::new(true)
            .with_node("a")
            .with_node("b")
            .with_edge("a", "b")
            .with_edge("b", "a");
        let graph = Graph::from_payload(&payload, LIMITS).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.neighbors(0, Direction::Outgoing), &[Adjacent { node: 1, edge: 0 }]);
        assert_eq!(graph.degree(0, Direction::Both, None), 2.0);
        assert_eq!(graph.degree(0, Direction::Incoming, None), 1.0);
        assert_eq!(graph.density(), 1.0);
    }

    #[test]
    fn test_weight_attribute_lookup() {
        let mut payload = path();
        payload.edges[0]
            .attributes
            .insert("capacity".to_string(), serde_json::json!(4.5));
        let graph = Graph::from_payload(&payload, LIMITS).unwrap();
        assert_eq!(graph.edge_weight(0, Some("capacity")), 4.5);
        assert_eq!(graph.edge_weight(1, Some("capacity")), 1.0);
        assert_eq!(graph.edge_weight(0, None), 1.0);
    }

    #[test]
    fn test_density_of_trivial_graphs_is_zero() {
        let single = GraphPayload::new(true).with_node("x");
        let graph = Graph::from_payload(&single, LIMITS).unwrap();
        assert_eq!(graph.density(), 0.0);
    }

    #[test]
    fn test_adjacency_matrix_is_symmetric_for_undirected() {
        let graph = Graph::from_payload(&path(), LIMITS).unwrap();
        let matrix = graph.adjacency_matrix(None);
        assert_eq!(matrix[[0, 1]], 1.0);
        assert_eq!(matrix[[1, 0]], 1.0);
        assert_eq!(matrix[[0, 2]], 0.0);
    }
}
