use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::models::KnowledgePoint;

/// A knowledge point with its prerequisites narrowed to ids present in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub point: KnowledgePoint,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, GraphNode>,
}

pub fn load_graph(points: &[KnowledgePoint]) -> KnowledgeGraph {
    let mut raw: BTreeMap<String, &KnowledgePoint> = BTreeMap::new();
    for point in points {
        if raw.insert(point.id.clone(), point).is_some() {
            tracing::warn!(point = %point.id, "duplicate knowledge point id, keeping last record");
        }
    }

    let mut nodes = BTreeMap::new();
    for (id, point) in raw.iter() {
        let mut prerequisites = Vec::with_capacity(point.prerequisites.len());
        for prerequisite in &point.prerequisites {
            if !raw.contains_key(prerequisite) {
                tracing::warn!(
                    point = %id,
                    prerequisite = %prerequisite,
                    "dangling prerequisite ignored"
                );
                continue;
            }
            if !prerequisites.contains(prerequisite) {
                prerequisites.push(prerequisite.clone());
            }
        }

        nodes.insert(
            id.clone(),
            GraphNode {
                point: (*point).clone(),
                prerequisites,
            },
        );
    }

    tracing::debug!(nodes = nodes.len(), "knowledge graph loaded");
    KnowledgeGraph { nodes }
}

impl KnowledgeGraph {
    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Ids that never drain under Kahn's algorithm: nodes on a cycle or downstream of one.
    pub fn cyclic_nodes(&self) -> Vec<String> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (id, node) in &self.nodes {
            in_degree.insert(id.as_str(), node.prerequisites.len());
            for prerequisite in &node.prerequisites {
                dependents
                    .entry(prerequisite.as_str())
                    .or_default()
                    .push(id.as_str());
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        while let Some(id) = ready.pop_front() {
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }

        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        stuck.sort();
        stuck
    }
}
