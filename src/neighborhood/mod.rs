//! Filtered neighborhood expansion over an in-memory graph snapshot.
//!
//! Validates the request, runs a layered BFS that can follow edges in one
//! or both directions and cap fan-out per level, then filters the result
//! by confidence and type without leaving dangling edges.

use crate::error::{Result, WeaveError};
use crate::graph::{GraphEdge, GraphNode, GraphSnapshot, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::time::Instant;

/// Edge direction followed from each frontier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges pointing at the frontier node.
    Incoming,
    /// Edges leaving the frontier node.
    Outgoing,
    /// Both.
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = WeaveError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            "both" => Ok(Direction::Both),
            other => Err(WeaveError::invalid(format!("unknown direction '{}'", other))),
        }
    }
}

/// Parameters of a neighborhood query.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodRequest {
    /// Center node id; must exist.
    pub center: String,
    /// Maximum hops; at least 1.
    pub depth: usize,
    /// Keep at most this many highest-confidence edges per level.
    pub max_neighbors_per_level: Option<usize>,
    /// Minimum node and edge confidence in `[0, 1]`.
    pub min_confidence: f64,
    /// Allowed node kinds; empty allows all.
    pub node_kinds: Vec<NodeKind>,
    /// Allowed edge types; empty allows all.
    pub edge_types: Vec<String>,
    /// Direction to follow.
    pub direction: Direction,
}

impl NeighborhoodRequest {
    /// Unfiltered request in both directions.
    pub fn new(center: impl Into<String>, depth: usize) -> Self {
        Self {
            center: center.into(),
            depth,
            max_neighbors_per_level: None,
            min_confidence: 0.0,
            node_kinds: Vec::new(),
            edge_types: Vec::new(),
            direction: Direction::Both,
        }
    }
}

/// Aggregates over the returned subgraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NeighborhoodStats {
    /// Nodes returned.
    pub node_count: usize,
    /// Edges returned.
    pub edge_count: usize,
    /// Node count per kind.
    pub nodes_by_kind: BTreeMap<String, usize>,
    /// Edge count per type.
    pub edges_by_type: BTreeMap<String, usize>,
    /// Mean edge confidence; 0 with no edges.
    pub average_edge_confidence: f64,
    /// `edges / (n(n-1)/2)`; 0 when fewer than two nodes.
    pub density: f64,
}

/// Result of a neighborhood query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighborhood {
    /// Center node id.
    pub center: String,
    /// Surviving nodes in discovery order.
    pub nodes: Vec<GraphNode>,
    /// Surviving edges; both endpoints are in `nodes`.
    pub edges: Vec<GraphEdge>,
    /// Node ids per hop distance; level 0 is the center.
    pub levels: Vec<Vec<String>>,
    /// Aggregates.
    pub stats: NeighborhoodStats,
    /// Wall time of the query.
    pub elapsed_ms: u128,
}

/// Answers neighborhood queries against one snapshot.
pub struct NeighborhoodService<'a> {
    snapshot: &'a GraphSnapshot,
    adjacency: HashMap<&'a str, Vec<usize>>,
}

struct Traversal {
    order: Vec<String>,
    levels: Vec<Vec<String>>,
    edges: Vec<usize>,
}

impl<'a> NeighborhoodService<'a> {
    /// Index `snapshot` for traversal.
    pub fn new(snapshot: &'a GraphSnapshot) -> Self {
        let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, edge) in snapshot.edges.iter().enumerate() {
            adjacency.entry(edge.from_id.as_str()).or_default().push(index);
            if edge.to_id != edge.from_id {
                adjacency.entry(edge.to_id.as_str()).or_default().push(index);
            }
        }
        Self { snapshot, adjacency }
    }

    fn validate(&self, request: &NeighborhoodRequest) -> Result<()> {
        if request.depth == 0 {
            return Err(WeaveError::invalid("depth must be at least 1"));
        }
        if !(0.0..=1.0).contains(&request.min_confidence) {
            return Err(WeaveError::invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                request.min_confidence
            )));
        }
        if request.max_neighbors_per_level == Some(0) {
            return Err(WeaveError::invalid("max_neighbors_per_level must be at least 1"));
        }
        if !self.snapshot.nodes.contains_key(&request.center) {
            return Err(WeaveError::NodeNotFound(request.center.clone()));
        }
        Ok(())
    }

    /// Expand around `request.center`.
    ///
    /// Fails with `InvalidArgument` or `NodeNotFound` before traversal, and
    /// with `Traversal` if the snapshot is inconsistent.
    pub fn expand(&self, request: &NeighborhoodRequest) -> Result<Neighborhood> {
        self.validate(request)?;
        let started = Instant::now();

        let traversal = self.traverse(request).map_err(|e| WeaveError::Traversal {
            elapsed_ms: started.elapsed().as_millis(),
            source: Box::new(e),
        })?;

        let kept: HashSet<&str> = traversal
            .order
            .iter()
            .filter(|id| self.keep_node(id, request))
            .map(String::as_str)
            .collect();

        let nodes: Vec<GraphNode> = traversal
            .order
            .iter()
            .filter(|id| kept.contains(id.as_str()))
            .filter_map(|id| self.snapshot.nodes.get(id).cloned())
            .collect();

        let edges: Vec<GraphEdge> = traversal
            .edges
            .iter()
            .map(|&index| &self.snapshot.edges[index])
            .filter(|edge| kept.contains(edge.from_id.as_str()) && kept.contains(edge.to_id.as_str()))
            .filter(|edge| request.edge_types.is_empty() || request.edge_types.contains(&edge.edge_type))
            .filter(|edge| edge.confidence() >= request.min_confidence)
            .cloned()
            .collect();

        let levels = traversal
            .levels
            .into_iter()
            .map(|level| level.into_iter().filter(|id| kept.contains(id.as_str())).collect())
            .collect();

        let stats = compute_stats(&nodes, &edges);
        Ok(Neighborhood {
            center: request.center.clone(),
            nodes,
            edges,
            levels,
            stats,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    fn keep_node(&self, id: &str, request: &NeighborhoodRequest) -> bool {
        if id == request.center {
            return true;
        }
        match self.snapshot.nodes.get(id) {
            Some(node) => {
                (request.node_kinds.is_empty() || request.node_kinds.contains(&node.kind))
                    && node.confidence() >= request.min_confidence
            }
            None => false,
        }
    }

    fn traverse(&self, request: &NeighborhoodRequest) -> Result<Traversal> {
        let mut seen: HashSet<&str> = HashSet::from([request.center.as_str()]);
        let mut traversed: HashSet<usize> = HashSet::new();
        let mut result = Traversal {
            order: vec![request.center.clone()],
            levels: vec![vec![request.center.clone()]],
            edges: Vec::new(),
        };
        let mut frontier: Vec<&str> = vec![request.center.as_str()];

        for _ in 0..request.depth {
            let mut candidates: Vec<(usize, &str)> = Vec::new();
            for node in &frontier {
                for &index in self.adjacency.get(node).map(Vec::as_slice).unwrap_or_default() {
                    let edge = &self.snapshot.edges[index];
                    let outgoing = edge.from_id == *node;
                    let incoming = edge.to_id == *node;
                    let neighbor = match request.direction {
                        Direction::Outgoing if outgoing => edge.to_id.as_str(),
                        Direction::Incoming if incoming => edge.from_id.as_str(),
                        Direction::Both if outgoing => edge.to_id.as_str(),
                        Direction::Both if incoming => edge.from_id.as_str(),
                        _ => continue,
                    };
                    if !self.snapshot.nodes.contains_key(neighbor) {
                        return Err(WeaveError::NodeNotFound(neighbor.to_string()));
                    }
                    candidates.push((index, neighbor));
                }
            }

            // Edges back into already visited nodes never count against the cap.
            let mut fresh: Vec<(usize, &str)> = Vec::new();
            for (index, neighbor) in candidates {
                if traversed.contains(&index) {
                    continue;
                }
                if seen.contains(neighbor) {
                    traversed.insert(index);
                    result.edges.push(index);
                } else {
                    fresh.push((index, neighbor));
                }
            }

            if request.max_neighbors_per_level.is_some() {
                fresh.sort_by(|a, b| {
                    let (ea, eb) = (&self.snapshot.edges[a.0], &self.snapshot.edges[b.0]);
                    eb.confidence().total_cmp(&ea.confidence()).then_with(|| a.0.cmp(&b.0))
                });
            }
            let limit = request.max_neighbors_per_level.unwrap_or(usize::MAX);

            let mut next = Vec::new();
            let mut level = Vec::new();
            for (index, neighbor) in fresh {
                if seen.contains(neighbor) {
                    // Second edge into a node admitted at this level.
                    if next.contains(&neighbor) && traversed.insert(index) {
                        result.edges.push(index);
                    }
                    continue;
                }
                if next.len() >= limit {
                    continue;
                }
                seen.insert(neighbor);
                traversed.insert(index);
                result.edges.push(index);
                next.push(neighbor);
                level.push(neighbor.to_string());
                result.order.push(neighbor.to_string());
            }
            if next.is_empty() {
                break;
            }
            result.levels.push(level);
            frontier = next;
        }

        Ok(result)
    }
}

fn compute_stats(nodes: &[GraphNode], edges: &[GraphEdge]) -> NeighborhoodStats {
    let mut stats = NeighborhoodStats {
        node_count: nodes.len(),
        edge_count: edges.len(),
        ..Default::default()
    };
    for node in nodes {
        *stats.nodes_by_kind.entry(node.kind.as_str().to_string()).or_default() += 1;
    }
    for edge in edges {
        *stats.edges_by_type.entry(edge.edge_type.clone()).or_default() += 1;
    }
    if !edges.is_empty() {
        stats.average_edge_confidence = edges.iter().map(GraphEdge::confidence).sum::<f64>() / edges.len() as f64;
    }
    let n = nodes.len() as f64;
    if nodes.len() >= 2 {
        stats.density = edges.len() as f64 / (n * (n - 1.0) / 2.0);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, kind: NodeKind) -> GraphNode {
        GraphNode::new(id, kind, id)
    }

    /// a -> b -> c, a -> d (weak), e -> a
    fn snapshot() -> GraphSnapshot {
        let mut snapshot = GraphSnapshot::default();
        for (id, kind) in [
            ("a", NodeKind::File),
            ("b", NodeKind::Chunk),
            ("c", NodeKind::Entity),
            ("d", NodeKind::Entity),
            ("e", NodeKind::File),
        ] {
            snapshot.nodes.insert(id.to_string(), node(id, kind));
        }
        snapshot.edges = vec![
            GraphEdge::new("a", "b", "contains"),
            GraphEdge::new("a", "d", "defines").with_confidence(0.2),
            GraphEdge::new("b", "c", "defines").with_confidence(0.9),
            GraphEdge::new("e", "a", "imports"),
        ];
        snapshot
    }

    #[test]
    fn test_validation_precedes_traversal() {
        let snapshot = snapshot();
        let service = NeighborhoodService::new(&snapshot);

        let missing = service.expand(&NeighborhoodRequest::new("zzz", 1));
        assert!(matches!(missing, Err(WeaveError::NodeNotFound(_))));

        let zero = service.expand(&NeighborhoodRequest::new("a", 0));
        assert!(matches!(zero, Err(WeaveError::InvalidArgument { .. })));

        let mut bad = NeighborhoodRequest::new("a", 1);
        bad.min_confidence = 1.5;
        assert!(matches!(service.expand(&bad), Err(WeaveError::InvalidArgument { .. })));
    }

    #[test]
    fn test_levels_and_direction() {
        let snapshot = snapshot();
        let service = NeighborhoodService::new(&snapshot);

        let both = service.expand(&NeighborhoodRequest::new("a", 2)).unwrap();
        assert_eq!(both.levels[0], vec!["a"]);
        assert_eq!(both.levels[1], vec!["b", "d", "e"]);
        assert_eq!(both.levels[2], vec!["c"]);
        assert_eq!(both.stats.node_count, 5);

        let mut outgoing = NeighborhoodRequest::new("a", 1);
        outgoing.direction = Direction::Outgoing;
        let result = service.expand(&outgoing).unwrap();
        assert_eq!(result.levels[1], vec!["b", "d"]);

        let mut incoming = NeighborhoodRequest::new("a", 1);
        incoming.direction = Direction::Incoming;
        let result = service.expand(&incoming).unwrap();
        assert_eq!(result.levels[1], vec!["e"]);
    }

    #[test]
    fn test_per_level_cap_keeps_strongest_edges() {
        let snapshot = snapshot();
        let service = NeighborhoodService::new(&snapshot);
        let mut request = NeighborhoodRequest::new("a", 1);
        request.direction = Direction::Outgoing;
        request.max_neighbors_per_level = Some(1);

        let result = service.expand(&request).unwrap();
        assert_eq!(result.levels[1], vec!["b"]);
    }

    #[test]
    fn test_per_level_cap_ignores_edges_back_to_visited_nodes() {
        let mut snapshot = GraphSnapshot::default();
        for id in ["a", "b", "c"] {
            snapshot.nodes.insert(id.to_string(), node(id, NodeKind::Entity));
        }
        snapshot.edges = vec![
            GraphEdge::new("a", "b", "calls"),
            GraphEdge::new("b", "c", "calls").with_confidence(0.5),
        ];
        let service = NeighborhoodService::new(&snapshot);
        let mut request = NeighborhoodRequest::new("a", 2);
        request.max_neighbors_per_level = Some(1);

        let result = service.expand(&request).unwrap();
        assert_eq!(result.levels, vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(result.edges.len(), 2);
    }

    #[test]
    fn test_confidence_filter_drops_dangling_edges_keeps_center() {
        let mut snapshot = snapshot();
        if let Some(a) = snapshot.nodes.get_mut("a") {
            a.properties = json!({"confidence": 0.1});
        }
        let service = NeighborhoodService::new(&snapshot);
        let mut request = NeighborhoodRequest::new("a", 2);
        request.min_confidence = 0.5;

        let result = service.expand(&request).unwrap();
        assert!(result.nodes.iter().any(|n| n.id == "a"));
        assert!(result.edges.iter().all(|e| e.confidence() >= 0.5));
        let ids: HashSet<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(result
            .edges
            .iter()
            .all(|e| ids.contains(e.from_id.as_str()) && ids.contains(e.to_id.as_str())));
    }

    #[test]
    fn test_kind_filter_and_stats() {
        let snapshot = snapshot();
        let service = NeighborhoodService::new(&snapshot);
        let mut request = NeighborhoodRequest::new("a", 2);
        request.node_kinds = vec![NodeKind::File, NodeKind::Chunk];

        let result = service.expand(&request).unwrap();
        let ids: Vec<&str> = result.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "e"]);
        assert_eq!(result.stats.edge_count, 2);
        assert!((result.stats.density - 2.0 / 3.0).abs() < 1e-9);
        assert!((result.stats.average_edge_confidence - 1.0).abs() < 1e-9);
        assert_eq!(result.levels[2], Vec::<String>::new());
    }

    #[test]
    fn test_dangling_snapshot_edge_is_traversal_error() {
        let mut snapshot = snapshot();
        snapshot.edges.push(GraphEdge::new("a", "ghost", "calls"));
        let service = NeighborhoodService::new(&snapshot);

        let result = service.expand(&NeighborhoodRequest::new("a", 1));
        match result {
            Err(WeaveError::Traversal { source, .. }) => {
                assert!(matches!(*source, WeaveError::NodeNotFound(ref id) if id == "ghost"));
            }
            other => panic!("expected traversal error, got {:?}", other),
        }
    }
}
