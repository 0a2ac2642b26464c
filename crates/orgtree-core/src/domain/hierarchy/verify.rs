//! Closure consistency checks
//!
//! Propagation assumes the stored closure is already consistent. These checks
//! rebuild the expected closure from the direct (depth 1) rows and report every
//! place the stored relation disagrees. Nothing here repairs data.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use super::entity::{ClosureEdge, NodeId};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ClosureViolation {
    MissingSelfLink {
        node_id: NodeId,
    },
    MissingEdge {
        ancestor: NodeId,
        descendant: NodeId,
        expected_depth: u32,
    },
    DepthMismatch {
        ancestor: NodeId,
        descendant: NodeId,
        stored: u32,
        expected: u32,
    },
    UnexpectedEdge {
        ancestor: NodeId,
        descendant: NodeId,
        depth: u32,
    },
    CycleDetected {
        node_ids: Vec<NodeId>,
    },
}

impl ClosureViolation {
    pub fn describe(&self) -> String {
        match self {
            Self::MissingSelfLink { node_id } => format!("node {} has no self-link", node_id),
            Self::MissingEdge {
                ancestor,
                descendant,
                expected_depth,
            } => format!(
                "missing edge {} -> {} (expected depth {})",
                ancestor, descendant, expected_depth
            ),
            Self::DepthMismatch {
                ancestor,
                descendant,
                stored,
                expected,
            } => format!(
                "edge {} -> {} stores depth {} but the shortest chain is {}",
                ancestor, descendant, stored, expected
            ),
            Self::UnexpectedEdge {
                ancestor,
                descendant,
                depth,
            } => format!(
                "edge {} -> {} (depth {}) is not backed by any chain of direct links",
                ancestor, descendant, depth
            ),
            Self::CycleDetected { node_ids } => {
                format!("direct links form a cycle through {} nodes", node_ids.len())
            }
        }
    }
}

pub fn closure_violations(node_ids: &[NodeId], edges: &[ClosureEdge]) -> Vec<ClosureViolation> {
    let known: HashSet<NodeId> = node_ids.iter().copied().collect();
    let mut violations = Vec::new();

    let mut stored: HashMap<(NodeId, NodeId), u32> = HashMap::with_capacity(edges.len());
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in edges {
        if !known.contains(&edge.ancestor) || !known.contains(&edge.descendant) {
            violations.push(ClosureViolation::UnexpectedEdge {
                ancestor: edge.ancestor,
                descendant: edge.descendant,
                depth: edge.depth,
            });
            continue;
        }
        stored.insert((edge.ancestor, edge.descendant), edge.depth);
        if edge.depth == 1 && !edge.is_self_link() {
            children.entry(edge.ancestor).or_default().push(edge.descendant);
        }
    }

    for id in node_ids {
        match stored.get(&(*id, *id)) {
            Some(0) => {}
            Some(depth) => violations.push(ClosureViolation::DepthMismatch {
                ancestor: *id,
                descendant: *id,
                stored: *depth,
                expected: 0,
            }),
            None => violations.push(ClosureViolation::MissingSelfLink { node_id: *id }),
        }
    }

    let cyclic = cyclic_nodes(node_ids, &children);
    if !cyclic.is_empty() {
        violations.push(ClosureViolation::CycleDetected { node_ids: cyclic });
    }

    let mut expected: HashMap<(NodeId, NodeId), u32> = HashMap::new();
    for start in node_ids {
        for (reached, depth) in shortest_depths(*start, &children) {
            expected.insert((*start, reached), depth);
        }
    }

    for ((ancestor, descendant), depth) in &expected {
        if ancestor == descendant {
            continue;
        }
        match stored.get(&(*ancestor, *descendant)) {
            None => violations.push(ClosureViolation::MissingEdge {
                ancestor: *ancestor,
                descendant: *descendant,
                expected_depth: *depth,
            }),
            Some(stored_depth) if stored_depth != depth => {
                violations.push(ClosureViolation::DepthMismatch {
                    ancestor: *ancestor,
                    descendant: *descendant,
                    stored: *stored_depth,
                    expected: *depth,
                })
            }
            Some(_) => {}
        }
    }

    for ((ancestor, descendant), depth) in &stored {
        if ancestor != descendant && !expected.contains_key(&(*ancestor, *descendant)) {
            violations.push(ClosureViolation::UnexpectedEdge {
                ancestor: *ancestor,
                descendant: *descendant,
                depth: *depth,
            });
        }
    }

    violations.sort_by_key(sort_key);
    violations
}

pub fn ensure_closure_invariants(node_ids: &[NodeId], edges: &[ClosureEdge]) -> Result<()> {
    let violations = closure_violations(node_ids, edges);
    match violations.first() {
        None => Ok(()),
        Some(first) => Err(Error::Other(format!(
            "closure relation is inconsistent ({} violations): {}",
            violations.len(),
            first.describe()
        ))),
    }
}

fn shortest_depths(start: NodeId, children: &HashMap<NodeId, Vec<NodeId>>) -> Vec<(NodeId, u32)> {
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0u32)]);
    let mut reached = Vec::new();
    while let Some((node, depth)) = queue.pop_front() {
        reached.push((node, depth));
        for next in children.get(&node).into_iter().flatten() {
            if seen.insert(*next) {
                queue.push_back((*next, depth + 1));
            }
        }
    }
    reached
}

/// Nodes left over after Kahn's algorithm, i.e. those on or downstream of a cycle
fn cyclic_nodes(node_ids: &[NodeId], children: &HashMap<NodeId, Vec<NodeId>>) -> Vec<NodeId> {
    let mut indegree: HashMap<NodeId, usize> = node_ids.iter().map(|id| (*id, 0)).collect();
    for targets in children.values() {
        for target in targets {
            if let Some(degree) = indegree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<NodeId> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    while let Some(node) = queue.pop_front() {
        indegree.remove(&node);
        for next in children.get(&node).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    let mut remaining: Vec<NodeId> = indegree.into_keys().collect();
    remaining.sort();
    remaining
}

fn sort_key(violation: &ClosureViolation) -> (u8, Option<NodeId>, Option<NodeId>) {
    match violation {
        ClosureViolation::CycleDetected { .. } => (0, None, None),
        ClosureViolation::MissingSelfLink { node_id } => (1, Some(*node_id), None),
        ClosureViolation::MissingEdge {
            ancestor,
            descendant,
            ..
        } => (2, Some(*ancestor), Some(*descendant)),
        ClosureViolation::DepthMismatch {
            ancestor,
            descendant,
            ..
        } => (3, Some(*ancestor), Some(*descendant)),
        ClosureViolation::UnexpectedEdge {
            ancestor,
            descendant,
            ..
        } => (4, Some(*ancestor), Some(*descendant)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hierarchy::closure::ClosureTable;

    fn chain(count: usize) -> (Vec<NodeId>, ClosureTable) {
        let ids: Vec<NodeId> = (0..count).map(|_| NodeId::new()).collect();
        let mut table = ClosureTable::new();
        for id in &ids {
            table.insert_self_link(*id);
        }
        for pair in ids.windows(2) {
            table.link(&pair[1], &pair[0]);
        }
        (ids, table)
    }

    #[test]
    fn test_propagated_closure_is_consistent() {
        let (ids, table) = chain(4);
        assert!(closure_violations(&ids, &table.edges()).is_empty());
        assert!(ensure_closure_invariants(&ids, &table.edges()).is_ok());
    }

    #[test]
    fn test_detects_missing_self_link() {
        let (ids, table) = chain(2);
        let edges: Vec<ClosureEdge> = table
            .edges()
            .into_iter()
            .filter(|edge| !(edge.is_self_link() && edge.ancestor == ids[1]))
            .collect();

        let violations = closure_violations(&ids, &edges);
        assert_eq!(
            violations,
            vec![ClosureViolation::MissingSelfLink { node_id: ids[1] }]
        );
    }

    #[test]
    fn test_detects_missing_transitive_edge() {
        let (ids, table) = chain(3);
        let edges: Vec<ClosureEdge> = table
            .edges()
            .into_iter()
            .filter(|edge| !(edge.ancestor == ids[0] && edge.descendant == ids[2]))
            .collect();

        let violations = closure_violations(&ids, &edges);
        assert_eq!(
            violations,
            vec![ClosureViolation::MissingEdge {
                ancestor: ids[0],
                descendant: ids[2],
                expected_depth: 2,
            }]
        );
    }

    #[test]
    fn test_detects_depth_that_is_not_shortest() {
        let (ids, table) = chain(3);
        let edges: Vec<ClosureEdge> = table
            .edges()
            .into_iter()
            .map(|edge| {
                if edge.ancestor == ids[0] && edge.descendant == ids[2] {
                    ClosureEdge::new(edge.ancestor, edge.descendant, 5)
                } else {
                    edge
                }
            })
            .collect();

        let violations = closure_violations(&ids, &edges);
        assert_eq!(
            violations,
            vec![ClosureViolation::DepthMismatch {
                ancestor: ids[0],
                descendant: ids[2],
                stored: 5,
                expected: 2,
            }]
        );
    }

    #[test]
    fn test_detects_unbacked_and_dangling_edges() {
        let (ids, table) = chain(3);
        let stranger = NodeId::new();
        let mut edges = table.edges();
        edges.push(ClosureEdge::new(ids[2], ids[0], 4));
        edges.push(ClosureEdge::new(stranger, ids[0], 1));

        let violations = closure_violations(&ids, &edges);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|violation| matches!(
            violation,
            ClosureViolation::UnexpectedEdge { .. }
        )));
    }

    #[test]
    fn test_detects_cycle_in_direct_links() {
        let a = NodeId::new();
        let b = NodeId::new();
        let edges = vec![
            ClosureEdge::self_link(a),
            ClosureEdge::self_link(b),
            ClosureEdge::new(a, b, 1),
            ClosureEdge::new(b, a, 1),
        ];

        let violations = closure_violations(&[a, b], &edges);
        let mut expected_cycle = vec![a, b];
        expected_cycle.sort();
        assert_eq!(
            violations.first(),
            Some(&ClosureViolation::CycleDetected {
                node_ids: expected_cycle
            })
        );
        assert!(ensure_closure_invariants(&[a, b], &edges).is_err());
    }
}
