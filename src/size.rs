//! Structural queries: node counts, level profiles, support and enumeration.
//!
//! All walks here are read-only, use an explicit stack and deduplicate on the
//! node (not the edge), so a function and its complement measure identically.

use std::collections::HashSet;

use crate::edge::{Edge, NodeId};
use crate::manager::{Bdd, Func};
use crate::types::{Level, Var};

impl Bdd {
    fn reachable(&self, roots: &[Edge]) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = roots.iter().rev().map(|e| e.node).collect();
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            order.push(node);
            if !node.is_terminal() {
                let live = self.live(node);
                stack.push(live.els.node);
                stack.push(live.then.node);
            }
        }
        order
    }

    /// Distinct nodes reachable from `edge`, the terminal included.
    pub(crate) fn edge_size(&self, edge: Edge) -> usize {
        self.reachable(&[edge]).len()
    }

    /// The number of distinct nodes in `f`, the terminal included.
    pub fn size(&self, f: Func) -> usize {
        self.edge_size(self.edge(f))
    }

    /// The number of distinct nodes in the shared graph of several functions.
    /// Shared substructure is counted once.
    pub fn size_multiple(&self, fs: &[Func]) -> usize {
        let roots: Vec<Edge> = fs.iter().map(|&f| self.edge(f)).collect();
        self.reachable(&roots).len()
    }

    /// Internal node count of `f` per level of the current order.
    pub fn profile(&self, f: Func) -> Vec<usize> {
        let mut counts = vec![0; self.num_vars()];
        for node in self.reachable(&[self.edge(f)]) {
            if !node.is_terminal() {
                counts[self.id_to_index[node.id as usize]] += 1;
            }
        }
        counts
    }

    /// The variables `f` depends on, top of the order first.
    pub fn support(&self, f: Func) -> Vec<Var> {
        let mut ids: Vec<u32> = Vec::new();
        let mut seen = vec![false; self.subtables.len()];
        for node in self.reachable(&[self.edge(f)]) {
            if !node.is_terminal() && !seen[node.id as usize] {
                seen[node.id as usize] = true;
                ids.push(node.id);
            }
        }
        ids.sort_by_key(|&id| self.id_to_index[id as usize]);
        ids.into_iter().map(Var::new).collect()
    }

    /// Every internal node of `f` as (labeling variable, level), in a stable
    /// depth-first preorder. Two calls without intervening graph mutation
    /// enumerate identically.
    pub fn nodes(&self, f: Func) -> Vec<(Var, Level)> {
        self.reachable(&[self.edge(f)])
            .into_iter()
            .filter(|node| !node.is_terminal())
            .map(|node| {
                (
                    Var::new(node.id),
                    Level::new(self.id_to_index[node.id as usize]),
                )
            })
            .collect()
    }
}
