//! Garbage collection and table repacking.
//!
//! Reachability is the reference counts themselves: a node with a zero count
//! has no live parent, no handle and no association pointing at it. The sweep
//! visits levels in increasing index order, so when a freed node decrements
//! its children, those children sit at deeper levels that have not been swept
//! yet and a whole dead subgraph falls in one pass.
//!
//! After a sweep the automatic trigger is re-tuned to twice the surviving
//! node count, and badly fragmented levels are repacked: live nodes move into
//! the leading pages, old slots become forwarding stubs long enough to
//! rewrite every parent cofactor and external edge, then the stubs and the
//! trailing pages are released.

use log::debug;

use crate::arena::NODES_PER_PAGE;
use crate::edge::{Edge, NodeId};
use crate::manager::{edge_is_live, resolve_edge, Bdd};
use crate::node::Node;
use crate::types::{NUM_PAGES_THRESHOLD, REPACK_AFTER_GC_THRESHOLD};

impl Bdd {
    /// Frees every unreferenced node. Runs automatically when the live count
    /// passes the adaptive limit; callable explicitly at any time.
    pub fn gc(&mut self) {
        let before = self.num_nodes;
        for index in 0..self.num_vars() {
            let id = self.index_to_id[index] as usize;
            let freed = self.subtables[id].sweep_dead();
            self.num_nodes -= freed.len();
            for (then, els) in freed {
                self.dcr_edge(then);
                self.dcr_edge(els);
            }
        }
        // Entries whose operands or result died must not resurrect.
        self.evict_stale_cache();
        self.gc_count += 1;
        self.set_gc_limit();
        debug!(
            "gc #{}: {} -> {} nodes, next limit {}",
            self.gc_count, before, self.num_nodes, self.gc_limit
        );

        for id in 1..self.subtables.len() {
            let table = &mut self.subtables[id];
            table.shrink_to_fit();
            let slots = table.arena.num_slots();
            if table.arena.num_pages() > NUM_PAGES_THRESHOLD
                && (table.num_entries as f64) < REPACK_AFTER_GC_THRESHOLD * slots as f64
            {
                self.repack_table(id as u32);
            }
        }
    }

    /// Compacts one level's arena into its leading pages.
    fn repack_table(&mut self, id: u32) {
        let table = &mut self.subtables[id as usize];
        let keep_pages = table.num_entries.div_ceil(NODES_PER_PAGE).max(1);
        if keep_pages >= table.arena.num_pages() {
            return;
        }
        debug!(
            "repacking level of id {}: {} entries, {} -> {} pages",
            id,
            table.num_entries,
            table.arena.num_pages(),
            keep_pages
        );

        let boundary = (keep_pages * NODES_PER_PAGE) as u32;
        let moving: Vec<u32> = table
            .arena
            .live_slots()
            .filter(|&slot| slot >= boundary)
            .collect();
        // Free slots in the kept pages; there are enough by the page count.
        let mut targets: Vec<u32> = (0..boundary)
            .filter(|&slot| matches!(table.arena.node(slot), Node::Free { .. }))
            .collect();
        debug_assert!(targets.len() >= moving.len());
        for slot in moving {
            let target = targets.pop().expect("enough free slots in kept pages");
            let live = *table.arena.node(slot).as_live();
            *table.arena.node_mut(target) = Node::Live(live);
            *table.arena.node_mut(slot) =
                Node::Forwarded(Edge::new(NodeId::new(id, target), false));
        }
        table.rebuild_bins();

        self.resolve_all_cofactors();
        self.resolve_external_edges();
        self.evict_stale_cache();

        // Stubs live only in the dropped pages; truncation discards them and
        // rebuilds the free list over the kept pages.
        let (subtables, pages) = (&mut self.subtables, &mut self.pages);
        subtables[id as usize].arena.truncate(pages, keep_pages);
    }

    /// Drops every cache entry referencing a freed or forwarded node. Must
    /// run before any slot those entries could name is reclaimed.
    pub(crate) fn evict_stale_cache(&mut self) {
        let subtables = &self.subtables;
        self.cache.retain(|key, &result| {
            let operands_live = match *key {
                crate::apply::OpKey::Op2(_, f, g) => {
                    edge_is_live(subtables, f) && edge_is_live(subtables, g)
                }
                crate::apply::OpKey::Ite(f, g, h) => {
                    edge_is_live(subtables, f)
                        && edge_is_live(subtables, g)
                        && edge_is_live(subtables, h)
                }
            };
            operands_live && edge_is_live(subtables, result)
        });
    }

    /// Rewrites every stored cofactor through forwarding stubs to its
    /// current target and rehashes the touched tables.
    pub(crate) fn resolve_all_cofactors(&mut self) {
        for t in 1..self.subtables.len() {
            let slots: Vec<u32> = self.subtables[t].arena.live_slots().collect();
            let mut changed = false;
            for slot in slots {
                let live = *self.subtables[t].arena.node(slot).as_live();
                let then = resolve_edge(&self.subtables, live.then);
                let els = resolve_edge(&self.subtables, live.els);
                if then != live.then || els != live.els {
                    debug_assert!(!then.is_complement());
                    let node = self.subtables[t].arena.node_mut(slot).as_live_mut();
                    node.then = then;
                    node.els = els;
                    changed = true;
                }
            }
            if changed {
                self.subtables[t].rebuild_bins();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::manager::Func;
    use crate::types::Var;

    #[test]
    fn test_gc_frees_released_results() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let base = bdd.num_nodes();
        let ab = bdd.and(a, b).unwrap();
        assert_eq!(bdd.num_nodes(), base + 1);
        bdd.release(ab);
        bdd.gc();
        assert_eq!(bdd.num_nodes(), base);
    }

    #[test]
    fn test_gc_keeps_held_results() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let ab = bdd.and(a, b).unwrap();
        let base = bdd.num_nodes();
        bdd.gc();
        assert_eq!(bdd.num_nodes(), base);
        // The handle still works after collection.
        assert!(bdd.implies(ab, a).unwrap());
    }

    #[test]
    fn test_gc_cascades_through_dead_subgraphs() {
        let mut bdd = Bdd::new(8);
        let vars: Vec<_> = (1..=8).map(|i| bdd.var(Var::new(i))).collect();
        let base = bdd.num_nodes();

        // A hundred transient conjunction chains, all released.
        for round in 0..100 {
            let mut acc = bdd.acquire(vars[round % 8]);
            for i in 0..8 {
                let next = bdd.and(acc, vars[(round + i) % 8]).unwrap();
                bdd.release(acc);
                acc = next;
            }
            bdd.release(acc);
        }
        bdd.gc();
        assert_eq!(bdd.num_nodes(), base);

        // Refcount conservation: projections are back to saturated-only.
        for &v in &vars {
            let edge = bdd.edge(v);
            assert_eq!(bdd.live(edge.node).refs, crate::node::MAX_REF_COUNT);
        }
    }

    // One distinct top-level node per minterm over the other twelve
    // variables: x1 xnor the i-th minterm.
    fn equiv_minterm(bdd: &mut Bdd, i: u32) -> Func {
        let a = bdd.var(Var::new(1));
        let mut cube = bdd.one();
        for bit in 0..12 {
            let v = bdd.var(Var::new(2 + bit));
            let lit = if i >> bit & 1 == 1 {
                bdd.acquire(v)
            } else {
                bdd.not(v)
            };
            let next = bdd.and(cube, lit).unwrap();
            bdd.release(cube);
            bdd.release(lit);
            bdd.release(v);
            cube = next;
        }
        let f = bdd.xnor(a, cube).unwrap();
        bdd.release(cube);
        bdd.release(a);
        f
    }

    #[test]
    fn test_gc_repacks_sparse_levels() {
        let mut bdd = Bdd::new(13);
        let funcs: Vec<Func> = (0..4096).map(|i| equiv_minterm(&mut bdd, i)).collect();
        let pages_before = bdd.subtables[1].arena.num_pages();
        assert!(pages_before > NUM_PAGES_THRESHOLD);

        // Keep a sparse sample; everything else dies in the sweep, leaving
        // the top level fragmented far below the repack threshold.
        let mut kept = Vec::new();
        for (i, f) in funcs.into_iter().enumerate() {
            if i % 128 == 0 {
                kept.push((i as u32, f));
            } else {
                bdd.release(f);
            }
        }
        bdd.gc();
        let pages_after = bdd.subtables[1].arena.num_pages();
        assert!(pages_after < pages_before);

        // Survivors moved into the leading pages; handles and cofactors must
        // still denote the same functions.
        for (i, f) in kept {
            let rebuilt = equiv_minterm(&mut bdd, i);
            assert!(bdd.equal(f, rebuilt));
            bdd.release(rebuilt);
            bdd.release(f);
        }
    }

    #[test]
    fn test_cache_entries_do_not_resurrect_dead_nodes() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let ab = bdd.and(a, b).unwrap();
        bdd.release(ab);
        bdd.gc();
        // The same conjunction must be rebuilt, not served from a stale entry.
        let ab2 = bdd.and(a, b).unwrap();
        let t = bdd.then_of(ab2);
        assert!(bdd.equal(t, b));
    }
}
