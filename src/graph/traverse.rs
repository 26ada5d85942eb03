//! Bounded breadth-first expansion shared by every backend.

use super::{GraphEdge, GraphNode, GraphStore, Subgraph};
use crate::error::Result;
use std::collections::HashSet;

/// Expand from `roots` level by level, treating edges as undirected.
///
/// Only nodes accepted by `node_filter` are collected and expanded, and only
/// edges accepted by `edge_filter` are followed. Collection stops once
/// `max_nodes` nodes are held. Unknown roots are skipped.
pub(super) fn bounded_bfs<S, N, E>(
    store: &S,
    roots: &[String],
    depth: usize,
    max_nodes: usize,
    node_filter: N,
    edge_filter: E,
) -> Result<Subgraph>
where
    S: GraphStore + ?Sized,
    N: Fn(&GraphNode) -> bool,
    E: Fn(&GraphEdge) -> bool,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut frontier: Vec<String> = Vec::new();

    for root in roots {
        if nodes.len() >= max_nodes {
            break;
        }
        if seen.contains(root) {
            continue;
        }
        match store.get_node(root)? {
            Some(node) if node_filter(&node) => {
                seen.insert(node.id.clone());
                frontier.push(node.id.clone());
                nodes.push(node);
            }
            _ => log::debug!("Skipping unknown or filtered seed {}", root),
        }
    }

    'levels: for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let frontier_set: HashSet<&str> = frontier.iter().map(String::as_str).collect();
        let mut next = Vec::new();

        for edge in store.edges_touching(&frontier)? {
            if !edge_filter(&edge) {
                continue;
            }
            let mut neighbors = Vec::with_capacity(2);
            if frontier_set.contains(edge.from_id.as_str()) {
                neighbors.push(edge.to_id.clone());
            }
            if frontier_set.contains(edge.to_id.as_str()) {
                neighbors.push(edge.from_id.clone());
            }

            for neighbor in neighbors {
                if seen.contains(&neighbor) {
                    continue;
                }
                if nodes.len() >= max_nodes {
                    break 'levels;
                }
                if let Some(node) = store.get_node(&neighbor)? {
                    if node_filter(&node) {
                        seen.insert(neighbor.clone());
                        next.push(neighbor);
                        nodes.push(node);
                    }
                }
            }
        }

        frontier = next;
    }

    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut keys = HashSet::new();
    let edges = store
        .edges_touching(&ids)?
        .into_iter()
        .filter(|e| seen.contains(&e.from_id) && seen.contains(&e.to_id))
        .filter(|e| edge_filter(e))
        .filter(|e| keys.insert(e.key()))
        .collect();

    Ok(Subgraph { nodes, edges })
}
