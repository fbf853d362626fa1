use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::CompositeWeights;
use crate::graph::KnowledgeGraph;
use crate::models::Recommendation;

/// Prerequisites that were not scored (completed or unknown) impose no ordering.
/// A node reached again while its own visit is still open counts as satisfied,
/// so cyclic input terminates.
pub fn sequence(
    scored: Vec<Recommendation>,
    graph: &KnowledgeGraph,
    weights: &CompositeWeights,
) -> Vec<Recommendation> {
    let mut ranked = scored;
    ranked.sort_by(|a, b| compare_rank(a, b, weights));

    let rank: HashMap<&str, usize> = ranked
        .iter()
        .enumerate()
        .map(|(index, rec)| (rec.point_id.as_str(), index))
        .collect();

    let mut visited = vec![false; ranked.len()];
    let mut order = Vec::with_capacity(ranked.len());
    for index in 0..ranked.len() {
        visit(index, &ranked, &rank, graph, &mut visited, &mut order);
    }

    let mut slots: Vec<Option<Recommendation>> = ranked.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

fn visit(
    root: usize,
    ranked: &[Recommendation],
    rank: &HashMap<&str, usize>,
    graph: &KnowledgeGraph,
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    if visited[root] {
        return;
    }
    visited[root] = true;

    // (node, its ranked prerequisites, next prerequisite to try)
    let mut stack = vec![(root, ranked_prerequisites(root, ranked, rank, graph), 0usize)];
    loop {
        let next = match stack.last_mut() {
            None => break,
            Some((index, prerequisites, cursor)) => match prerequisites.get(*cursor) {
                Some(&prerequisite) => {
                    *cursor += 1;
                    Some(prerequisite)
                }
                None => {
                    order.push(*index);
                    None
                }
            },
        };

        match next {
            Some(prerequisite) if !visited[prerequisite] => {
                visited[prerequisite] = true;
                let prerequisites = ranked_prerequisites(prerequisite, ranked, rank, graph);
                stack.push((prerequisite, prerequisites, 0));
            }
            Some(_) => {}
            None => {
                stack.pop();
            }
        }
    }
}

fn ranked_prerequisites(
    index: usize,
    ranked: &[Recommendation],
    rank: &HashMap<&str, usize>,
    graph: &KnowledgeGraph,
) -> Vec<usize> {
    let mut prerequisites: Vec<usize> = graph
        .get(&ranked[index].point_id)
        .map(|node| {
            node.prerequisites
                .iter()
                .filter_map(|id| rank.get(id.as_str()).copied())
                .collect()
        })
        .unwrap_or_default();
    prerequisites.sort_unstable();
    prerequisites
}

fn compare_rank(a: &Recommendation, b: &Recommendation, weights: &CompositeWeights) -> Ordering {
    b.composite_score(weights)
        .partial_cmp(&a.composite_score(weights))
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.point_id.cmp(&b.point_id))
}
