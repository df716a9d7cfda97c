//! Call graph construction and queries
//!
//! Builds a directed caller -> callee graph over qualified function
//! identifiers and answers upstream, downstream and impact-radius queries.
//!
//! ## Limitations
//!
//! Only calls between functions defined in the analyzed codebase become
//! edges. Calls into libraries, dynamic dispatch through function values and
//! reflection are dropped when the call resolver cannot name a known target.
//!
//! Global invariants enforced:
//! - Forward and reverse adjacency always describe the same edge set
//! - Multi-edges collapse; self-loops are kept
//! - Every query result is ordered (BTree collections) for determinism

use crate::error::GraphConstructionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Where a function is defined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionSite {
    /// Qualified identifier (`{file}::{name}`)
    pub id: String,
    pub file: String,
    pub signature: String,
}

/// A resolved call from one function to another
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

impl CallEdge {
    pub fn new(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        CallEdge {
            caller: caller.into(),
            callee: callee.into(),
        }
    }
}

/// Call graph for a codebase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    nodes: BTreeSet<String>,
    /// caller -> callees
    forward: BTreeMap<String, BTreeSet<String>>,
    /// callee -> callers
    reverse: BTreeMap<String, BTreeSet<String>>,
}

/// Serializable neighbourhood of one function, persisted as an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub target: String,
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

impl CallGraph {
    /// Create an empty call graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from definitions and resolved calls
    ///
    /// Calls whose caller or callee is not a known definition are dropped.
    ///
    /// # Errors
    ///
    /// `GraphConstructionError` when one identifier is defined twice with
    /// different signatures.
    pub fn build(
        functions: &[DefinitionSite],
        calls: &[CallEdge],
    ) -> Result<Self, GraphConstructionError> {
        let mut graph = CallGraph::new();
        let mut definitions: BTreeMap<&str, &DefinitionSite> = BTreeMap::new();

        for site in functions {
            if let Some(existing) = definitions.get(site.id.as_str()) {
                if existing.signature != site.signature {
                    return Err(GraphConstructionError {
                        name: site.id.clone(),
                        first: existing.signature.clone(),
                        second: site.signature.clone(),
                    });
                }
                continue;
            }
            definitions.insert(&site.id, site);
            graph.add_node(site.id.clone());
        }

        let mut dropped = 0usize;
        for call in calls {
            if graph.contains(&call.caller) && graph.contains(&call.callee) {
                graph.add_edge(call.caller.clone(), call.callee.clone());
            } else {
                dropped += 1;
            }
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped,
            "built call graph"
        );
        Ok(graph)
    }

    /// Add a function to the graph
    pub fn add_node(&mut self, function_id: String) {
        self.nodes.insert(function_id);
    }

    /// Add a call edge (caller -> callee); repeated edges collapse
    pub fn add_edge(&mut self, caller: String, callee: String) {
        self.nodes.insert(caller.clone());
        self.nodes.insert(callee.clone());
        self.reverse
            .entry(callee.clone())
            .or_default()
            .insert(caller.clone());
        self.forward.entry(caller).or_default().insert(callee);
    }

    pub fn contains(&self, function_id: &str) -> bool {
        self.nodes.contains(function_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Direct callers; empty when the target has none or is absent
    pub fn upstream(&self, target: &str) -> BTreeSet<String> {
        self.reverse.get(target).cloned().unwrap_or_default()
    }

    /// Direct callees; empty when the target has none or is absent
    pub fn downstream(&self, target: &str) -> BTreeSet<String> {
        self.forward.get(target).cloned().unwrap_or_default()
    }

    /// Calculate fan-in for a function (number of distinct callers)
    pub fn fan_in(&self, function_id: &str) -> usize {
        self.reverse.get(function_id).map_or(0, BTreeSet::len)
    }

    /// Calculate fan-out for a function (number of distinct callees)
    pub fn fan_out(&self, function_id: &str) -> usize {
        self.forward.get(function_id).map_or(0, BTreeSet::len)
    }

    /// Everything reachable from `target` over callers and callees, excluding `target`
    pub fn impact_radius(&self, target: &str) -> BTreeSet<String> {
        let mut radius: BTreeSet<String> = self.distances(target).into_keys().collect();
        radius.remove(target);
        radius
    }

    /// Undirected hop count from `target` to every reachable node (target included at 0)
    pub fn distances(&self, target: &str) -> BTreeMap<String, usize> {
        let mut distances = BTreeMap::new();
        if !self.contains(target) {
            return distances;
        }

        let mut queue = VecDeque::new();
        distances.insert(target.to_string(), 0);
        queue.push_back(target.to_string());

        while let Some(current) = queue.pop_front() {
            let hops = distances.get(&current).copied().unwrap_or(0);
            for neighbour in self.neighbours(&current) {
                if !distances.contains_key(neighbour) {
                    distances.insert(neighbour.clone(), hops + 1);
                    queue.push_back(neighbour.clone());
                }
            }
        }

        distances
    }

    /// Nodes within the impact radius and the edges between them
    pub fn snapshot(&self, target: &str) -> GraphSnapshot {
        let members: BTreeSet<String> = self.distances(target).into_keys().collect();
        let mut edges = Vec::new();
        for caller in &members {
            for callee in self.downstream(caller) {
                if members.contains(&callee) {
                    edges.push((caller.clone(), callee));
                }
            }
        }

        GraphSnapshot {
            target: target.to_string(),
            nodes: members.into_iter().collect(),
            edges,
        }
    }

    fn neighbours<'a>(&'a self, node: &str) -> impl Iterator<Item = &'a String> {
        let callees = self.forward.get(node).into_iter().flatten();
        let callers = self.reverse.get(node).into_iter().flatten();
        callees.chain(callers)
    }
}
