//! In-memory closure table
//!
//! Holds the transitive closure of the parent-link graph as two indexes,
//! ancestor → descendants and descendant → ancestors, each mapping to the
//! shortest depth. Linking a child under a parent is a single relaxation
//! step: every ancestor of the parent is joined with every descendant of the
//! child, and each resulting pair keeps the minimum of its stored depth and
//! the new candidate depth.

use std::collections::HashMap;

use super::entity::{ClosureEdge, NodeId};

/// What happened to a single closure row during an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Lowered { from: u32 },
    Unchanged,
}

/// Per-row counts of a link propagation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSummary {
    pub inserted: usize,
    pub lowered: usize,
    pub unchanged: usize,
}

impl LinkSummary {
    /// Rows that actually changed
    pub fn written(&self) -> usize {
        self.inserted + self.lowered
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClosureTable {
    down: HashMap<NodeId, HashMap<NodeId, u32>>,
    up: HashMap<NodeId, HashMap<NodeId, u32>>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from stored rows, keeping the minimum depth per pair
    pub fn from_edges(edges: impl IntoIterator<Item = ClosureEdge>) -> Self {
        let mut table = Self::new();
        for edge in edges {
            table.upsert_min(edge.ancestor, edge.descendant, edge.depth);
        }
        table
    }

    /// Whether `id` has its self-link
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.depth(id, id) == Some(0)
    }

    /// Insert the reflexive `(id, id, 0)` row. Returns false if it already existed.
    pub fn insert_self_link(&mut self, id: NodeId) -> bool {
        matches!(self.upsert_min(id, id, 0), UpsertOutcome::Inserted)
    }

    pub fn depth(&self, ancestor: &NodeId, descendant: &NodeId) -> Option<u32> {
        self.down
            .get(ancestor)
            .and_then(|descendants| descendants.get(descendant))
            .copied()
    }

    pub fn has_path(&self, ancestor: &NodeId, descendant: &NodeId) -> bool {
        self.depth(ancestor, descendant).is_some()
    }

    /// Strict ancestors of `id` (depth >= 1), ascending by depth
    pub fn ancestors(&self, id: &NodeId) -> Vec<(NodeId, u32)> {
        Self::strict_sorted(self.up.get(id))
    }

    /// Strict descendants of `id` (depth >= 1), ascending by depth
    pub fn descendants(&self, id: &NodeId) -> Vec<(NodeId, u32)> {
        Self::strict_sorted(self.down.get(id))
    }

    /// Candidate rows produced by linking `child` under `parent`
    ///
    /// The ancestor side includes `parent` itself at depth 0 and the
    /// descendant side includes `child` itself at depth 0, so the direct
    /// `(parent, child, 1)` row is always among the candidates when both
    /// nodes are present.
    pub fn link_candidates(&self, child: &NodeId, parent: &NodeId) -> Vec<ClosureEdge> {
        let (Some(ancestors), Some(descendants)) = (self.up.get(parent), self.down.get(child))
        else {
            return Vec::new();
        };

        let mut candidates = Vec::with_capacity(ancestors.len() * descendants.len());
        for (ancestor, up_depth) in ancestors {
            for (descendant, down_depth) in descendants {
                candidates.push(ClosureEdge::new(
                    *ancestor,
                    *descendant,
                    up_depth + 1 + down_depth,
                ));
            }
        }
        candidates
    }

    /// Propagate a parent link through the closure
    ///
    /// Candidates are computed in full before the first write, so the table
    /// is never observed half-propagated. The caller is responsible for
    /// rejecting links that would close a cycle.
    pub fn link(&mut self, child: &NodeId, parent: &NodeId) -> LinkSummary {
        let candidates = self.link_candidates(child, parent);
        let mut summary = LinkSummary::default();
        for edge in candidates {
            match self.upsert_min(edge.ancestor, edge.descendant, edge.depth) {
                UpsertOutcome::Inserted => summary.inserted += 1,
                UpsertOutcome::Lowered { .. } => summary.lowered += 1,
                UpsertOutcome::Unchanged => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Insert a row, or lower an existing one to `depth` if that is shorter
    pub fn upsert_min(&mut self, ancestor: NodeId, descendant: NodeId, depth: u32) -> UpsertOutcome {
        let outcome = match self.depth(&ancestor, &descendant) {
            None => UpsertOutcome::Inserted,
            Some(existing) if depth < existing => UpsertOutcome::Lowered { from: existing },
            Some(_) => return UpsertOutcome::Unchanged,
        };

        self.down
            .entry(ancestor)
            .or_default()
            .insert(descendant, depth);
        self.up
            .entry(descendant)
            .or_default()
            .insert(ancestor, depth);
        outcome
    }

    /// All rows, ordered by ancestor, then depth, then descendant
    pub fn edges(&self) -> Vec<ClosureEdge> {
        let mut edges: Vec<ClosureEdge> = self
            .down
            .iter()
            .flat_map(|(ancestor, descendants)| {
                descendants
                    .iter()
                    .map(|(descendant, depth)| ClosureEdge::new(*ancestor, *descendant, *depth))
            })
            .collect();
        edges.sort_by_key(|edge| (edge.ancestor, edge.depth, edge.descendant));
        edges
    }

    /// Number of rows, self-links included
    pub fn len(&self) -> usize {
        self.down.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.down.is_empty()
    }

    pub fn max_depth(&self) -> u32 {
        self.down
            .values()
            .flat_map(|descendants| descendants.values().copied())
            .max()
            .unwrap_or(0)
    }

    fn strict_sorted(related: Option<&HashMap<NodeId, u32>>) -> Vec<(NodeId, u32)> {
        let mut nodes: Vec<(NodeId, u32)> = related
            .map(|related| {
                related
                    .iter()
                    .filter(|(_, depth)| **depth >= 1)
                    .map(|(id, depth)| (*id, *depth))
                    .collect()
            })
            .unwrap_or_default();
        nodes.sort_by_key(|(id, depth)| (*depth, *id));
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(count: usize) -> (ClosureTable, Vec<NodeId>) {
        let mut table = ClosureTable::new();
        let ids: Vec<NodeId> = (0..count).map(|_| NodeId::new()).collect();
        for id in &ids {
            table.insert_self_link(*id);
        }
        (table, ids)
    }

    #[test]
    fn test_self_link_is_inserted_once() {
        let mut table = ClosureTable::new();
        let id = NodeId::new();
        assert!(table.insert_self_link(id));
        assert!(!table.insert_self_link(id));
        assert!(table.contains_node(&id));
        assert_eq!(table.len(), 1);
        assert!(table.ancestors(&id).is_empty());
        assert!(table.descendants(&id).is_empty());
    }

    #[test]
    fn test_chain_propagates_transitively() {
        let (mut table, ids) = table_with(3);
        let (company, engineering, backend) = (ids[0], ids[1], ids[2]);

        table.link(&engineering, &company);
        table.link(&backend, &engineering);

        assert_eq!(
            table.ancestors(&backend),
            vec![(engineering, 1), (company, 2)]
        );
        assert_eq!(
            table.descendants(&company),
            vec![(engineering, 1), (backend, 2)]
        );
        assert_eq!(table.depth(&company, &backend), Some(2));
    }

    #[test]
    fn test_linking_a_subtree_connects_every_pair() {
        let (mut table, ids) = table_with(4);
        let (root, mid, sub, leaf) = (ids[0], ids[1], ids[2], ids[3]);

        table.link(&mid, &root);
        table.link(&leaf, &sub);
        // attach the sub -> leaf subtree beneath mid
        let summary = table.link(&sub, &mid);

        assert_eq!(summary.inserted, 4);
        assert_eq!(table.depth(&root, &leaf), Some(3));
        assert_eq!(table.depth(&mid, &leaf), Some(2));
        assert_eq!(table.depth(&root, &sub), Some(2));
    }

    #[test]
    fn test_diamond_keeps_minimum_depth() {
        let (mut table, ids) = table_with(5);
        let (company, engineering, sales, regional, team) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

        table.link(&engineering, &company);
        table.link(&sales, &company);
        table.link(&regional, &sales);

        // long path first: company -> sales -> regional -> team
        table.link(&team, &regional);
        assert_eq!(table.depth(&company, &team), Some(3));

        // shorter path lowers the stored depth
        let summary = table.link(&team, &engineering);
        assert_eq!(summary.lowered, 1);
        assert_eq!(table.depth(&company, &team), Some(2));

        // a second long path never raises it
        let other = NodeId::new();
        table.insert_self_link(other);
        table.link(&other, &regional);
        table.link(&team, &other);
        assert_eq!(table.depth(&company, &team), Some(2));
    }

    #[test]
    fn test_relinking_same_pair_changes_nothing() {
        let (mut table, ids) = table_with(2);
        table.link(&ids[1], &ids[0]);
        let before = table.edges();

        let summary = table.link(&ids[1], &ids[0]);
        assert_eq!(summary.written(), 0);
        assert_eq!(table.edges(), before);
    }

    #[test]
    fn test_link_candidates_without_self_links_is_empty() {
        let table = ClosureTable::new();
        assert!(table.link_candidates(&NodeId::new(), &NodeId::new()).is_empty());
    }

    #[test]
    fn test_from_edges_keeps_minimum() {
        let a = NodeId::new();
        let b = NodeId::new();
        let table = ClosureTable::from_edges([
            ClosureEdge::self_link(a),
            ClosureEdge::self_link(b),
            ClosureEdge::new(a, b, 3),
            ClosureEdge::new(a, b, 1),
        ]);
        assert_eq!(table.depth(&a, &b), Some(1));
        assert_eq!(table.len(), 3);
        assert_eq!(table.max_depth(), 1);
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::{HashMap, VecDeque};

    use proptest::prelude::*;

    use super::*;

    /// Shortest distances over the direct links, by breadth-first search
    fn bfs_depths(ids: &[NodeId], links: &[(usize, usize)]) -> HashMap<(NodeId, NodeId), u32> {
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        for (child, parent) in links {
            children.entry(*parent).or_default().push(*child);
        }

        let mut depths = HashMap::new();
        for start in 0..ids.len() {
            let mut seen = vec![false; ids.len()];
            let mut queue = VecDeque::from([(start, 0u32)]);
            seen[start] = true;
            while let Some((node, depth)) = queue.pop_front() {
                depths.insert((ids[start], ids[node]), depth);
                for next in children.get(&node).into_iter().flatten() {
                    if !seen[*next] {
                        seen[*next] = true;
                        queue.push_back((*next, depth + 1));
                    }
                }
            }
        }
        depths
    }

    proptest! {
        #[test]
        fn prop_closure_matches_shortest_paths(
            node_count in 2usize..9,
            attempts in proptest::collection::vec((0usize..9, 0usize..9), 0..24),
        ) {
            let ids: Vec<NodeId> = (0..node_count).map(|_| NodeId::new()).collect();
            let mut table = ClosureTable::new();
            for id in &ids {
                table.insert_self_link(*id);
            }

            let mut accepted = Vec::new();
            for (child, parent) in attempts {
                let (child, parent) = (child % node_count, parent % node_count);
                // cycle guard: reject when the parent already sits beneath the child
                if table.has_path(&ids[child], &ids[parent]) {
                    continue;
                }
                table.link(&ids[child], &ids[parent]);
                accepted.push((child, parent));
            }

            let expected = bfs_depths(&ids, &accepted);
            let stored: HashMap<(NodeId, NodeId), u32> = table
                .edges()
                .into_iter()
                .map(|edge| ((edge.ancestor, edge.descendant), edge.depth))
                .collect();
            prop_assert_eq!(stored, expected);

            // no pair may be reachable in both directions
            for edge in table.edges() {
                if edge.depth >= 1 {
                    prop_assert!(!table.has_path(&edge.descendant, &edge.ancestor));
                }
            }
        }
    }
}
