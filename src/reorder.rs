//! Dynamic variable reordering.
//!
//! # Theory: Variable Ordering
//!
//! BDD size is highly sensitive to the variable order. For
//! `f = (x₁ ∧ y₁) ∨ ... ∨ (xₙ ∧ yₙ)` the interleaved order (x₁, y₁, x₂, y₂,
//! ...) needs O(n) nodes while the separated order (x₁, ..., xₙ, y₁, ...,
//! yₙ) needs O(2ⁿ). Finding the optimal order is NP-complete, so reordering
//! searches for a good one by local transformations.
//!
//! # The swap primitive
//!
//! Everything is built on the adjacent swap: to exchange the variables at
//! positions `i` and `i+1`, every node of the upper variable that depends on
//! the lower one is rebuilt from its four second-level cofactors, and the old
//! node becomes a *forwarding stub* so parent pointers above the swap stay
//! structurally valid without a full graph walk. Chasing stubs on every swap
//! would be prohibitive, so cofactor fixing and stub reclamation are batched:
//! they run when the outstanding stub count passes the configured bound and
//! when a pass commits.
//!
//! When the interaction matrix proves the two variables appear together in no
//! function's support, the swap cannot change any node and degenerates to an
//! O(1) index relabeling.
//!
//! # Search strategies
//!
//! *Sifting* (Rudell) repeatedly takes the heaviest not-yet-moved variable,
//! pushes it through every position (one direction until the size clearly
//! degrades, then the other to the configured growth bound) and commits the
//! best position seen. *Windowing* slides a window of three (two at the
//! bottom edge) adjacent positions over the order, tries all permutations of
//! each window and keeps the smallest, sweeping until no window improves.

use log::{debug, trace};

use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::node::Node;
use crate::types::{BddError, ReorderTechnique, Var};

/// Counters for one reordering invocation.
#[derive(Debug, Default, Clone)]
pub struct ReorderStats {
    /// Adjacent swaps performed, including search and restore moves.
    pub swaps: usize,
    /// Swaps satisfied by pure relabeling thanks to the interaction matrix.
    pub trivial_swaps: usize,
    /// Variables moved by sifting.
    pub vars_sifted: usize,
    pub start_nodes: usize,
    pub end_nodes: usize,
}

impl Bdd {
    /// Runs the configured reordering technique to completion and returns
    /// its counters. A manager configured with [`ReorderTechnique::None`]
    /// returns immediately.
    pub fn reorder(&mut self) -> ReorderStats {
        let mut stats = ReorderStats {
            start_nodes: self.num_nodes,
            ..ReorderStats::default()
        };
        if self.config.reorder_technique == ReorderTechnique::None {
            stats.end_nodes = self.num_nodes;
            return stats;
        }
        // Stale results must not outlive the node moves below.
        self.cache.clear();
        self.build_interactions();

        match self.config.reorder_technique {
            ReorderTechnique::None => unreachable!("handled above"),
            ReorderTechnique::Sift => self.sift(&mut stats),
            ReorderTechnique::Window => self.window(&mut stats),
        }

        self.reclaim_forwarding();
        self.set_gc_limit();
        self.reorder_count += 1;
        stats.end_nodes = self.num_nodes;
        debug!(
            "reorder #{}: {} -> {} nodes in {} swaps ({} trivial)",
            self.reorder_count, stats.start_nodes, stats.end_nodes, stats.swaps, stats.trivial_swaps
        );
        stats
    }

    // -- Adjacent swap -------------------------------------------------------

    /// Exchanges the variables at positions `index` and `index + 1`.
    pub(crate) fn swap_vars_at(&mut self, index: usize, stats: &mut ReorderStats) {
        let x = self.index_to_id[index];
        let y = self.index_to_id[index + 1];
        let interacting = self
            .interact
            .as_ref()
            .map_or(true, |matrix| matrix.test(x, y));
        if interacting {
            self.swap_interacting(x, y);
        } else {
            stats.trivial_swaps += 1;
        }
        stats.swaps += 1;
        self.index_to_id.swap(index, index + 1);
        self.id_to_index[x as usize] = index + 1;
        self.id_to_index[y as usize] = index;

        if self.num_forwarded > self.config.max_forwarded_nodes {
            self.reclaim_forwarding();
        }
    }

    fn swap_interacting(&mut self, x: u32, y: u32) {
        // Earlier swaps may have left stubs below; rebuilding from stale
        // cofactors would resurrect them.
        self.resolve_table_cofactors(x);

        let mover_slots: Vec<u32> = {
            let table = &self.subtables[x as usize];
            table
                .arena
                .live_slots()
                .filter(|&slot| {
                    let live = table.arena.node(slot).as_live();
                    live.then.id() == y || live.els.id() == y
                })
                .collect()
        };
        trace!(
            "swap ids {} and {}: rebuilding {} nodes",
            x,
            y,
            mover_slots.len()
        );
        // Detach the movers up front. The slots become placeholder stubs so
        // that a table rehash during the rebuild below cannot re-link them;
        // nothing resolves through them until the real target is in place.
        let mut movers = Vec::with_capacity(mover_slots.len());
        for slot in mover_slots {
            self.subtables[x as usize].unlink(slot);
            self.num_nodes -= 1;
            let node = self.subtables[x as usize].arena.node_mut(slot);
            movers.push((slot, *node.as_live()));
            *node = Node::Forwarded(Edge::ZERO);
        }

        for (slot, live) in movers {
            let (f1, f0) = (live.then, live.els);
            let (f11, f10) = if f1.id() == y {
                (self.then_edge(f1), self.else_edge(f1))
            } else {
                (f1, f1)
            };
            let (f01, f00) = if f0.id() == y {
                (self.then_edge(f0), self.else_edge(f0))
            } else {
                (f0, f0)
            };
            let f11 = self.resolve(f11);
            let f10 = self.resolve(f10);
            let f01 = self.resolve(f01);
            let f00 = self.resolve(f00);

            let new_f1 = self.swap_child(x, f11, f01);
            let new_f0 = self.swap_child(x, f10, f00);
            // The rebuilt node keeps the old parents' counts and cannot
            // already exist: one of its children has x on top.
            let new_f = self.subtables[y as usize].add_direct(
                &mut self.pages,
                new_f1,
                new_f0,
                live.refs,
            );
            self.note_new_node();
            self.dcr_edge(f1);
            self.dcr_edge(f0);
            let table = &mut self.subtables[x as usize];
            *table.arena.node_mut(slot) = Node::Forwarded(new_f);
            table.forwarded.push(slot);
            self.num_forwarded += 1;
        }

        // Lower-level nodes orphaned by the rebuild die right away.
        let freed = self.subtables[y as usize].sweep_dead();
        self.num_nodes -= freed.len();
        for (then, els) in freed {
            self.dcr_edge(then);
            self.dcr_edge(els);
        }
    }

    /// One child of a rebuilt node: the merged cofactor pair, reusing or
    /// creating a node of variable `x`.
    fn swap_child(&mut self, x: u32, then: Edge, els: Edge) -> Edge {
        if then == els {
            self.icr_edge(then);
            return then;
        }
        let (edge, found) = self.subtables[x as usize].find_or_add(&mut self.pages, then, els);
        if !found {
            self.icr_edge(then);
            self.icr_edge(els);
            self.note_new_node();
        }
        self.icr_edge(edge);
        edge
    }

    /// Resolves forwarding in the stored cofactors of one table, rehashing
    /// it when anything moved.
    fn resolve_table_cofactors(&mut self, id: u32) {
        let slots: Vec<u32> = self.subtables[id as usize].arena.live_slots().collect();
        let mut changed = false;
        for slot in slots {
            let live = *self.subtables[id as usize].arena.node(slot).as_live();
            let then = self.resolve(live.then);
            let els = self.resolve(live.els);
            if then != live.then || els != live.els {
                let node = self.subtables[id as usize]
                    .arena
                    .node_mut(slot)
                    .as_live_mut();
                node.then = then;
                node.els = els;
                changed = true;
            }
        }
        if changed {
            self.subtables[id as usize].rebuild_bins();
        }
    }

    /// Rewrites all cofactors and external edges through outstanding stubs,
    /// then frees the stubs.
    pub(crate) fn reclaim_forwarding(&mut self) {
        if self.subtables.iter().all(|t| t.forwarded.is_empty()) {
            self.num_forwarded = 0;
            return;
        }
        self.resolve_all_cofactors();
        self.resolve_external_edges();
        self.evict_stale_cache();
        for table in self.subtables.iter_mut() {
            table.reclaim_forwarded();
        }
        self.num_forwarded = 0;
    }

    // -- Sifting -------------------------------------------------------------

    fn sift(&mut self, stats: &mut ReorderStats) {
        let num_vars = self.num_vars();
        let mut sifted = vec![false; self.subtables.len()];
        for _ in 0..self.config.max_vars_sifted.min(num_vars) {
            if stats.swaps >= self.config.max_swaps {
                break;
            }
            // Heaviest variable not yet moved.
            let mut best_id = 0;
            let mut most = 1;
            for id in 1..self.subtables.len() {
                if !sifted[id] && self.subtables[id].num_entries > most {
                    most = self.subtables[id].num_entries;
                    best_id = id;
                }
            }
            if best_id == 0 {
                break;
            }
            sifted[best_id] = true;
            self.sift_var(best_id as u32, stats);
            stats.vars_sifted += 1;
        }
    }

    /// Moves one variable through the order and commits the best position.
    fn sift_var(&mut self, id: u32, stats: &mut ReorderStats) {
        let num_vars = self.num_vars();
        let start_index = self.id_to_index[id as usize];
        let max_size = (self.num_nodes as f64 * self.config.sifting_growth) as usize;
        let mut best_size = self.num_nodes;
        let mut best_index = start_index;
        let mut cur = start_index;
        trace!(
            "sifting id {} from index {} ({} nodes)",
            id,
            start_index,
            self.num_nodes
        );

        // Search the nearer end first; abort the first direction once the
        // size clearly degrades, the second at the growth factor.
        if start_index >= num_vars / 2 {
            while cur + 1 < num_vars && stats.swaps < self.config.max_swaps {
                if self.num_nodes >= best_size << 1 {
                    break;
                }
                self.swap_vars_at(cur, stats);
                cur += 1;
                if self.num_nodes < best_size {
                    best_size = self.num_nodes;
                    best_index = cur;
                }
            }
            while cur > 0 && stats.swaps < self.config.max_swaps {
                if self.num_nodes > max_size {
                    break;
                }
                self.swap_vars_at(cur - 1, stats);
                cur -= 1;
                if self.num_nodes <= best_size {
                    best_size = self.num_nodes;
                    best_index = cur;
                }
            }
        } else {
            while cur > 0 && stats.swaps < self.config.max_swaps {
                if self.num_nodes >= best_size << 1 {
                    break;
                }
                self.swap_vars_at(cur - 1, stats);
                cur -= 1;
                if self.num_nodes < best_size {
                    best_size = self.num_nodes;
                    best_index = cur;
                }
            }
            while cur + 1 < num_vars && stats.swaps < self.config.max_swaps {
                if self.num_nodes > max_size {
                    break;
                }
                self.swap_vars_at(cur, stats);
                cur += 1;
                if self.num_nodes <= best_size {
                    best_size = self.num_nodes;
                    best_index = cur;
                }
            }
        }

        while cur < best_index {
            self.swap_vars_at(cur, stats);
            cur += 1;
        }
        while cur > best_index {
            self.swap_vars_at(cur - 1, stats);
            cur -= 1;
        }
        self.reclaim_forwarding();
    }

    // -- Windowing -----------------------------------------------------------

    fn window(&mut self, stats: &mut ReorderStats) {
        let num_vars = self.num_vars();
        if num_vars < 2 {
            return;
        }
        loop {
            let mut improved = false;
            let mut index = 0;
            while index + 1 < num_vars {
                if stats.swaps >= self.config.max_swaps {
                    self.reclaim_forwarding();
                    return;
                }
                improved |= if index + 2 < num_vars {
                    self.window3(index, stats)
                } else {
                    self.window2(index, stats)
                };
                index += 1;
            }
            self.reclaim_forwarding();
            if !improved {
                return;
            }
        }
    }

    /// Tries both orders of the pair at `index`; keeps the smaller.
    fn window2(&mut self, index: usize, stats: &mut ReorderStats) -> bool {
        let start_size = self.num_nodes;
        self.swap_vars_at(index, stats);
        if self.num_nodes >= start_size {
            self.swap_vars_at(index, stats);
            false
        } else {
            true
        }
    }

    /// Tries all six orders of the triple at `index`; keeps the smallest.
    /// Five swaps enumerate the permutations, a short tail restores the best.
    fn window3(&mut self, index: usize, stats: &mut ReorderStats) -> bool {
        let start_size = self.num_nodes;
        let mut best = 0;
        let mut best_size = start_size;
        // abc -> bac -> bca -> cba -> cab -> acb
        let moves = [index, index + 1, index, index + 1, index];
        for (perm, &at) in moves.iter().enumerate() {
            self.swap_vars_at(at, stats);
            if self.num_nodes <= best_size {
                best_size = self.num_nodes;
                best = perm + 1;
            }
        }
        // Walk back to the best permutation from the final one (acb).
        match best {
            0 => {
                self.swap_vars_at(index + 1, stats);
            }
            1 => {
                self.swap_vars_at(index + 1, stats);
                self.swap_vars_at(index, stats);
            }
            2 => {
                self.swap_vars_at(index + 1, stats);
                self.swap_vars_at(index, stats);
                self.swap_vars_at(index + 1, stats);
            }
            3 => {
                self.swap_vars_at(index, stats);
                self.swap_vars_at(index + 1, stats);
            }
            4 => {
                self.swap_vars_at(index, stats);
            }
            5 => {}
            _ => unreachable!("six permutations"),
        }
        best_size < start_size
    }
}

// -- Function-level variable exchange ----------------------------------------

impl Bdd {
    /// Exchanges two variables inside the function `f` (a rename, not an
    /// order change): every occurrence of `a` becomes `b` and vice versa.
    pub fn swap_vars(&mut self, f: Func, a: Var, b: Var) -> Result<Func, BddError> {
        let fa = self.var_edges[a.id() as usize];
        let fb = self.var_edges[b.id() as usize];
        let f = self.edge(f);
        let result = self.compose_pairs(f, &[(a.id(), fb), (b.id(), fa)]);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::types::BddConfig;

    fn ripple(bdd: &mut Bdd, pairs: &[(u32, u32)]) -> Func {
        // Conjunction of equivalence pairs; heavily order-sensitive.
        let mut acc = bdd.one();
        for &(a, b) in pairs {
            let va = bdd.var(Var::new(a));
            let vb = bdd.var(Var::new(b));
            let x = bdd.xnor(va, vb).unwrap();
            let next = bdd.and(acc, x).unwrap();
            bdd.release(acc);
            bdd.release(va);
            bdd.release(vb);
            bdd.release(x);
            acc = next;
        }
        acc
    }

    fn assert_same_function(bdd: &mut Bdd, f: Func, pairs: &[(u32, u32)]) {
        let rebuilt = ripple(bdd, pairs);
        assert!(bdd.equal(f, rebuilt));
        bdd.release(rebuilt);
    }

    #[test]
    fn test_single_swap_preserves_functions() {
        let mut bdd = Bdd::new(4);
        let f = ripple(&mut bdd, &[(1, 3), (2, 4)]);
        bdd.build_interactions();

        let mut stats = ReorderStats::default();
        bdd.swap_vars_at(0, &mut stats);
        bdd.reclaim_forwarding();
        assert_eq!(bdd.index_to_id[0], 2);
        assert_eq!(bdd.index_to_id[1], 1);
        assert_same_function(&mut bdd, f, &[(1, 3), (2, 4)]);
    }

    #[test]
    fn test_noninteracting_swap_is_relabeling() {
        let mut bdd = Bdd::new(4);
        // Two separately held equivalences with disjoint supports. Ids 2 and
        // 3 never occur in the same function, so swapping levels 1 and 2
        // only relabels the two middle levels.
        let f = ripple(&mut bdd, &[(1, 2)]);
        let g = ripple(&mut bdd, &[(3, 4)]);
        bdd.build_interactions();
        let nodes = bdd.num_nodes();

        let mut stats = ReorderStats::default();
        bdd.swap_vars_at(1, &mut stats);
        assert_eq!(stats.trivial_swaps, 1);
        assert_eq!(bdd.index_to_id[1], 3);
        assert_eq!(bdd.index_to_id[2], 2);
        assert_eq!(bdd.num_nodes(), nodes);
        assert_same_function(&mut bdd, f, &[(1, 2)]);
        assert_same_function(&mut bdd, g, &[(3, 4)]);
    }

    #[test]
    fn test_sift_reduces_interleaved_order() {
        let config = BddConfig {
            reorder_technique: crate::types::ReorderTechnique::Sift,
            ..BddConfig::default()
        };
        let mut bdd = Bdd::with_config(6, config);
        // Pairing (1,4),(2,5),(3,6) under the creation order forces a wide
        // middle section; sifting finds a pair-adjacent order.
        let f = ripple(&mut bdd, &[(1, 4), (2, 5), (3, 6)]);
        let before = bdd.num_nodes();

        let stats = bdd.reorder();
        assert!(stats.end_nodes <= stats.start_nodes);
        assert!(bdd.num_nodes() < before);
        assert_same_function(&mut bdd, f, &[(1, 4), (2, 5), (3, 6)]);
    }

    #[test]
    fn test_window_never_grows() {
        let config = BddConfig {
            reorder_technique: crate::types::ReorderTechnique::Window,
            ..BddConfig::default()
        };
        let mut bdd = Bdd::with_config(6, config);
        let f = ripple(&mut bdd, &[(1, 4), (2, 5), (3, 6)]);

        let stats = bdd.reorder();
        assert!(stats.end_nodes <= stats.start_nodes);
        assert_same_function(&mut bdd, f, &[(1, 4), (2, 5), (3, 6)]);
    }

    #[test]
    fn test_association_survives_reorder() {
        let config = BddConfig {
            reorder_technique: crate::types::ReorderTechnique::Sift,
            ..BddConfig::default()
        };
        let mut bdd = Bdd::with_config(6, config);
        let heavy = ripple(&mut bdd, &[(1, 4), (2, 5), (3, 6)]);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let f = bdd.and(a, b).unwrap();
        bdd.temp_assoc_set(&[(Var::new(1), c)], false);
        bdd.assoc_set_current(crate::assoc::TEMP_ASSOC);

        let stats = bdd.reorder();
        assert!(stats.swaps > 0);
        // The association target was fixed up along with the handles.
        let g = bdd.substitute(f).unwrap();
        let expected = bdd.and(c, b).unwrap();
        assert!(bdd.equal(g, expected));
        bdd.release(heavy);
    }

    #[test]
    fn test_swap_vars_rename() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let c = bdd.var(Var::new(3));
        let f = bdd.and(a, c).unwrap();
        let g = bdd.swap_vars(f, Var::new(1), Var::new(2)).unwrap();
        let b = bdd.var(Var::new(2));
        let expected = bdd.and(b, c).unwrap();
        assert!(bdd.equal(g, expected));
        // Swapping a variable with itself is the identity.
        let h = bdd.swap_vars(f, Var::new(1), Var::new(1)).unwrap();
        assert!(bdd.equal(h, f));
    }
}
