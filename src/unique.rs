//! Per-variable unique tables.
//!
//! A [`Subtable`] owns the arena and the hash-consing buckets for one
//! variable. Buckets chain node slots through the `next` field stored in the
//! node itself, so the table needs no side allocation per entry. Lookup
//! equality is on raw (then, else) edge identity; recursive structure never
//! has to be compared because canonicalization at creation time guarantees
//! structurally equal functions share one node.
//!
//! The complement canonical form is enforced here: a request to create a node
//! with a complemented then-edge stores the node built from both children
//! negated and answers with a complemented edge to it.

use log::warn;

use crate::arena::{Arena, PageManager};
use crate::edge::{Edge, NodeId};
use crate::node::{LiveNode, NIL};
use crate::types::{HASH_TABLE_DEFAULT_SIZE_INDEX, HASH_TABLE_MAX_DENSITY};
use crate::utils::pairing2;

#[derive(Debug)]
pub(crate) struct Subtable {
    pub(crate) id: u32,
    pub(crate) arena: Arena,
    bins: Vec<u32>,
    size_index: u32,
    pub(crate) num_entries: usize,
    max_capacity: usize,
    /// Forwarding stubs awaiting reclamation, newest first.
    pub(crate) forwarded: Vec<u32>,
}

impl Subtable {
    pub(crate) fn new(id: u32) -> Self {
        let size_index = HASH_TABLE_DEFAULT_SIZE_INDEX;
        let num_bins = 1usize << size_index;
        Subtable {
            id,
            arena: Arena::new(),
            bins: vec![NIL; num_bins],
            size_index,
            num_entries: 0,
            max_capacity: num_bins * HASH_TABLE_MAX_DENSITY,
            forwarded: Vec::new(),
        }
    }

    fn bin_of(&self, then: Edge, els: Edge) -> usize {
        (pairing2(then.key(), els.key()) & (self.bins.len() as u64 - 1)) as usize
    }

    /// Looks up the canonical node for the cofactor pair, if present.
    pub(crate) fn lookup(&self, then: Edge, els: Edge) -> Option<Edge> {
        let flip = then.is_complement();
        let (then, els) = if flip { (-then, -els) } else { (then, els) };
        let mut slot = self.bins[self.bin_of(then, els)];
        while slot != NIL {
            let live = self.arena.node(slot).as_live();
            if live.then == then && live.els == els {
                return Some(Edge::new(NodeId::new(self.id, slot), flip));
            }
            slot = live.next;
        }
        None
    }

    /// Returns the canonical edge for `(then, els)`, creating the node if
    /// necessary. The second value is true when the node already existed
    /// (including the redundant `then == els` collapse). New nodes start with
    /// a zero reference count; the caller applies initial bookkeeping and
    /// counts the node against the manager total.
    pub(crate) fn find_or_add(
        &mut self,
        pages: &mut PageManager,
        then: Edge,
        els: Edge,
    ) -> (Edge, bool) {
        if then == els {
            return (then, true);
        }
        let flip = then.is_complement();
        let (then, els) = if flip { (-then, -els) } else { (then, els) };

        let mut bin = self.bin_of(then, els);
        let mut slot = self.bins[bin];
        while slot != NIL {
            let live = self.arena.node(slot).as_live();
            if live.then == then && live.els == els {
                return (Edge::new(NodeId::new(self.id, slot), flip), true);
            }
            slot = live.next;
        }

        self.num_entries += 1;
        if self.num_entries > self.max_capacity {
            self.rehash(true);
            bin = self.bin_of(then, els);
        }
        let slot = self.arena.alloc(
            pages,
            LiveNode {
                then,
                els,
                refs: 0,
                next: self.bins[bin],
            },
        );
        self.bins[bin] = slot;
        (Edge::new(NodeId::new(self.id, slot), flip), false)
    }

    /// Inserts a node known not to exist yet, skipping the bucket scan.
    pub(crate) fn add_direct(
        &mut self,
        pages: &mut PageManager,
        then: Edge,
        els: Edge,
        refs: u16,
    ) -> Edge {
        debug_assert_ne!(then, els);
        let flip = then.is_complement();
        let (then, els) = if flip { (-then, -els) } else { (then, els) };

        self.num_entries += 1;
        if self.num_entries > self.max_capacity {
            self.rehash(true);
        }
        let bin = self.bin_of(then, els);
        let slot = self.arena.alloc(
            pages,
            LiveNode {
                then,
                els,
                refs,
                next: self.bins[bin],
            },
        );
        self.bins[bin] = slot;
        Edge::new(NodeId::new(self.id, slot), flip)
    }

    /// Unlinks a live slot from its bucket without freeing it. The slot's
    /// stored children determine the bucket.
    pub(crate) fn unlink(&mut self, slot: u32) {
        let live = *self.arena.node(slot).as_live();
        let bin = self.bin_of(live.then, live.els);
        let mut cur = self.bins[bin];
        let mut prev = NIL;
        while cur != NIL {
            if cur == slot {
                if prev == NIL {
                    self.bins[bin] = live.next;
                } else {
                    self.arena.node_mut(prev).as_live_mut().next = live.next;
                }
                self.num_entries -= 1;
                return;
            }
            prev = cur;
            cur = self.arena.node(cur).as_live().next;
        }
        warn!("unique table {}: unlinking a node that is not present", self.id);
    }

    /// Frees all forwarding stubs. Callers must have resolved every edge that
    /// could still point at them.
    pub(crate) fn reclaim_forwarded(&mut self) -> usize {
        let count = self.forwarded.len();
        for slot in std::mem::take(&mut self.forwarded) {
            self.arena.free(slot);
        }
        count
    }

    /// Rebuilds the buckets from the live slots in the arena. Used after
    /// cofactor fixing or repacking changed stored child edges or slots.
    pub(crate) fn rebuild_bins(&mut self) {
        self.bins.fill(NIL);
        let slots: Vec<u32> = self.arena.live_slots().collect();
        for slot in slots {
            let live = *self.arena.node(slot).as_live();
            let bin = self.bin_of(live.then, live.els);
            self.arena.node_mut(slot).as_live_mut().next = self.bins[bin];
            self.bins[bin] = slot;
        }
    }

    fn rehash(&mut self, grow: bool) {
        if grow {
            self.size_index += 1;
        } else {
            if self.size_index <= HASH_TABLE_DEFAULT_SIZE_INDEX {
                return;
            }
            self.size_index -= 1;
        }
        let num_bins = 1usize << self.size_index;
        self.bins = vec![NIL; num_bins];
        self.max_capacity = num_bins * HASH_TABLE_MAX_DENSITY;
        self.rebuild_bins();
    }

    /// Shrinks the bucket array after large-scale removal.
    pub(crate) fn shrink_to_fit(&mut self) {
        while self.size_index > HASH_TABLE_DEFAULT_SIZE_INDEX
            && self.num_entries * 2 < (1usize << self.size_index) * HASH_TABLE_MAX_DENSITY
        {
            self.rehash(false);
        }
    }

    /// Removes every zero-refcount node, freeing its slot. Returns the
    /// children of the freed nodes so the caller can decrement their counts.
    pub(crate) fn sweep_dead(&mut self) -> Vec<(Edge, Edge)> {
        let mut freed = Vec::new();
        for bin in 0..self.bins.len() {
            let mut cur = self.bins[bin];
            let mut prev = NIL;
            while cur != NIL {
                let live = *self.arena.node(cur).as_live();
                if live.refs == 0 {
                    if prev == NIL {
                        self.bins[bin] = live.next;
                    } else {
                        self.arena.node_mut(prev).as_live_mut().next = live.next;
                    }
                    self.arena.free(cur);
                    self.num_entries -= 1;
                    freed.push((live.then, live.els));
                } else {
                    prev = cur;
                }
                cur = live.next;
            }
        }
        freed
    }
}
