use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Direct,
    Conditional(String),
}

/// Static topology of a built graph, excluding the terminal marker.
#[derive(Debug)]
pub struct GraphProgram {
    graph: Graph<String, EdgeKind>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl GraphProgram {
    pub(crate) fn from_edges(names: &[String], edges: &[(String, String, Option<String>)]) -> Self {
        let mut graph = Graph::new();
        let mut name_to_index = HashMap::new();
        for name in names {
            let index = graph.add_node(name.clone());
            name_to_index.insert(name.clone(), index);
        }
        for (from, to, label) in edges {
            let (Some(&source), Some(&target)) = (name_to_index.get(from), name_to_index.get(to))
            else {
                continue;
            };
            let kind = match label {
                Some(label) => EdgeKind::Conditional(label.clone()),
                None => EdgeKind::Direct,
            };
            graph.add_edge(source, target, kind);
        }
        Self {
            graph,
            name_to_index,
        }
    }

    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.name_to_index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn edge_names(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_references()
            .filter_map(|edge| {
                let from = self.graph.node_weight(edge.source())?;
                let to = self.graph.node_weight(edge.target())?;
                Some((from.clone(), to.clone()))
            })
            .collect();
        edges.sort();
        edges.dedup();
        edges
    }

    /// Strongly connected components that form a loop, each sorted by name.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .map(|&index| self.graph.contains_edge(index, index))
                        .unwrap_or(false)
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|index| self.graph[index].clone())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }
}
