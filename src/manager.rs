//! The BDD manager.
//!
//! [`Bdd`] owns every piece of shared state: one unique table per variable,
//! the id-to-position maps of the current variable order, the operator-result
//! cache, the external handle registry and the garbage collection bookkeeping.
//! All public operations are methods on it; sibling modules add their
//! operation families through further `impl Bdd` blocks.
//!
//! # Variables, ids and indices
//!
//! A variable's *id* is assigned at creation and never changes; its *index*
//! is its position in the current order and moves during reordering. Id 0 is
//! reserved for the constant level, which sits conceptually below every
//! variable (index `usize::MAX`).
//!
//! # Handles
//!
//! User code never sees an [`Edge`]. It holds opaque [`Func`] handles backed
//! by a registry slot carrying the edge and an external reference count.
//! Creating a handle increments the root node's count once, so handle-held
//! functions survive garbage collection; releasing the last reference gives
//! that count back.

use log::{debug, warn};

use crate::apply::OpKey;
use crate::arena::PageManager;
use crate::assoc::Assoc;
use crate::cache::Cache;
use crate::edge::{Edge, NodeId};
use crate::interact::InteractionMatrix;
use crate::node::{LiveNode, Node, MAX_REF_COUNT, NIL};
use crate::types::{
    BddConfig, BddError, Level, ReorderTechnique, Var, GC_CHECK, MIN_GC_LIMIT,
};
use crate::unique::Subtable;

/// Log2 of the operator-result cache size.
const CACHE_BITS: usize = 16;

/// An opaque handle to a function held by a [`Bdd`] manager.
///
/// Handles are cheap to copy; copies alias the same registry slot. A handle
/// stays valid until [`Bdd::release`] drops its external count to zero, after
/// which using it is a caller error.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Func(pub(crate) u32);

#[derive(Debug)]
enum HandleSlot {
    Occupied { edge: Edge, refs: u32 },
    Vacant { next: u32 },
}

/// A point-in-time snapshot of manager counters.
#[derive(Debug, Clone)]
pub struct BddStats {
    pub num_vars: usize,
    pub num_nodes: usize,
    pub num_peak_nodes: usize,
    pub gc_count: usize,
    pub reorder_count: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

pub struct Bdd {
    /// Unique tables indexed by variable id; entry 0 is the constant level.
    pub(crate) subtables: Vec<Subtable>,
    /// Variable id to current position; entry 0 is `usize::MAX`.
    pub(crate) id_to_index: Vec<usize>,
    /// Current position to variable id.
    pub(crate) index_to_id: Vec<u32>,
    /// Projection edge per variable id; entry 0 is the constant one.
    pub(crate) var_edges: Vec<Edge>,
    pub(crate) pages: PageManager,
    pub(crate) cache: Cache<OpKey, Edge>,
    handles: Vec<HandleSlot>,
    free_handle: u32,
    pub(crate) assocs: Vec<Option<Assoc>>,
    pub(crate) temp_assoc: Assoc,
    /// Current association id, or -1 for the temporary association.
    pub(crate) current_assoc: isize,
    pub(crate) num_nodes: usize,
    pub(crate) num_peak_nodes: usize,
    /// Outstanding forwarding stubs across all tables.
    pub(crate) num_forwarded: usize,
    pub(crate) gc_check: i64,
    pub(crate) gc_limit: usize,
    overflow: bool,
    pub(crate) config: BddConfig,
    pub(crate) interact: Option<InteractionMatrix>,
    pub(crate) gc_count: usize,
    pub(crate) reorder_count: usize,
}

impl Bdd {
    /// Creates a manager with `num_vars` variables, ordered by creation.
    pub fn new(num_vars: u32) -> Self {
        Self::with_config(num_vars, BddConfig::default())
    }

    pub fn with_config(num_vars: u32, config: BddConfig) -> Self {
        let mut pages = PageManager::new();
        let mut constant = Subtable::new(0);
        // The terminal node lives at id 0, slot 0, outside any bucket.
        let slot = constant.arena.alloc(
            &mut pages,
            LiveNode {
                then: Edge::ONE,
                els: Edge::ZERO,
                refs: MAX_REF_COUNT,
                next: NIL,
            },
        );
        debug_assert_eq!(slot, NodeId::TERMINAL.slot);

        let mut bdd = Bdd {
            subtables: vec![constant],
            id_to_index: vec![usize::MAX],
            index_to_id: Vec::new(),
            var_edges: vec![Edge::ONE],
            pages,
            cache: Cache::new(CACHE_BITS),
            handles: Vec::new(),
            free_handle: NIL,
            assocs: Vec::new(),
            temp_assoc: Assoc::new(),
            current_assoc: -1,
            num_nodes: 0,
            num_peak_nodes: 0,
            num_forwarded: 0,
            gc_check: GC_CHECK,
            gc_limit: MIN_GC_LIMIT,
            overflow: false,
            config,
            interact: None,
            gc_count: 0,
            reorder_count: 0,
        };
        for _ in 0..num_vars {
            bdd.create_new_var_last();
        }
        bdd
    }

    pub fn num_vars(&self) -> usize {
        self.index_to_id.len()
    }

    /// Live nodes across all variables, projections included.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_peak_nodes(&self) -> usize {
        self.num_peak_nodes
    }

    pub fn overflow(&self) -> bool {
        self.overflow
    }

    pub fn clear_overflow(&mut self) {
        self.overflow = false;
    }

    pub fn set_gc_mode(&mut self, enabled: bool) {
        self.config.gc_enabled = enabled;
    }

    /// Sets the hard node cap (0 = unlimited) and returns the previous one.
    pub fn set_node_limit(&mut self, limit: usize) -> usize {
        let old = self.config.node_limit;
        self.config.node_limit = limit;
        self.set_gc_limit();
        old
    }

    pub fn set_reorder_technique(&mut self, technique: ReorderTechnique) {
        self.config.reorder_technique = technique;
    }

    pub fn stats(&self) -> BddStats {
        BddStats {
            num_vars: self.num_vars(),
            num_nodes: self.num_nodes,
            num_peak_nodes: self.num_peak_nodes,
            gc_count: self.gc_count,
            reorder_count: self.reorder_count,
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        }
    }

    // -- Variable creation ---------------------------------------------------

    fn create_new_var_at(&mut self, position: usize) -> Var {
        let id = self.subtables.len() as u32;
        let mut table = Subtable::new(id);
        // The projection node sits in the buckets like any other node, so an
        // operation that reduces to this variable finds it instead of
        // creating a twin. Its saturated count locks it.
        let (projection, _) = table.find_or_add(&mut self.pages, Edge::ONE, Edge::ZERO);
        table.arena.node_mut(projection.node.slot).as_live_mut().refs = MAX_REF_COUNT;
        self.subtables.push(table);
        self.var_edges.push(projection);
        self.index_to_id.insert(position, id);
        self.id_to_index.push(0);
        for (index, &var_id) in self.index_to_id.iter().enumerate() {
            self.id_to_index[var_id as usize] = index;
        }
        self.num_nodes += 1;
        self.num_peak_nodes = self.num_peak_nodes.max(self.num_nodes);
        // A new variable invalidates the interaction matrix layout.
        self.interact = None;
        debug!("created variable id {} at index {}", id, position);
        Var::new(id)
    }

    /// Creates a fresh variable below all existing ones.
    pub fn create_new_var_last(&mut self) -> Var {
        self.create_new_var_at(self.index_to_id.len())
    }

    /// Creates a fresh variable above all existing ones.
    pub fn create_new_var_first(&mut self) -> Var {
        self.create_new_var_at(0)
    }

    /// Creates a fresh variable immediately above `var` in the order.
    pub fn create_new_var_before(&mut self, var: Var) -> Var {
        self.create_new_var_at(self.id_to_index[var.id() as usize])
    }

    /// Creates a fresh variable immediately below `var` in the order.
    pub fn create_new_var_after(&mut self, var: Var) -> Var {
        self.create_new_var_at(self.id_to_index[var.id() as usize] + 1)
    }

    // -- Internal node access ------------------------------------------------

    pub(crate) fn live(&self, node: NodeId) -> &LiveNode {
        self.subtables[node.id as usize].arena.node(node.slot).as_live()
    }

    pub(crate) fn live_mut(&mut self, node: NodeId) -> &mut LiveNode {
        self.subtables[node.id as usize]
            .arena
            .node_mut(node.slot)
            .as_live_mut()
    }

    /// Follows forwarding stubs to the current canonical edge.
    pub(crate) fn resolve(&self, edge: Edge) -> Edge {
        resolve_edge(&self.subtables, edge)
    }

    pub(crate) fn is_forwarded(&self, edge: Edge) -> bool {
        self.subtables[edge.id() as usize]
            .arena
            .node(edge.node.slot)
            .is_forwarded()
    }

    /// Position of the edge's top variable; `usize::MAX` for constants.
    pub(crate) fn edge_index(&self, edge: Edge) -> usize {
        self.id_to_index[edge.id() as usize]
    }

    pub(crate) fn then_edge(&self, edge: Edge) -> Edge {
        self.live(edge.node).then.negate_if(edge.is_complement())
    }

    pub(crate) fn else_edge(&self, edge: Edge) -> Edge {
        self.live(edge.node).els.negate_if(edge.is_complement())
    }

    /// Both cofactors of `edge` with respect to the variable `id`. An edge
    /// rooted below that variable is constant in it.
    pub(crate) fn cofactors(&self, edge: Edge, id: u32) -> (Edge, Edge) {
        if edge.id() == id {
            (self.then_edge(edge), self.else_edge(edge))
        } else {
            (edge, edge)
        }
    }

    pub(crate) fn icr_edge(&mut self, edge: Edge) {
        self.live_mut(edge.node).icr();
    }

    pub(crate) fn dcr_edge(&mut self, edge: Edge) {
        if !self.live_mut(edge.node).dcr() {
            warn!("reference count underflow on {}", edge);
        }
    }

    pub(crate) fn add_refs_edge(&mut self, edge: Edge, delta: i32) {
        self.live_mut(edge.node).add_refs(delta);
    }

    /// Bookkeeping for a node freshly installed in a unique table.
    pub(crate) fn note_new_node(&mut self) {
        self.num_nodes += 1;
        self.num_peak_nodes = self.num_peak_nodes.max(self.num_nodes);
        self.gc_check -= 1;
    }

    /// Re-tunes the automatic GC trigger from the current live count.
    pub(crate) fn set_gc_limit(&mut self) {
        let mut limit = (2 * self.num_nodes).max(MIN_GC_LIMIT);
        if self.config.node_limit != 0 {
            limit = limit.min(self.config.node_limit);
        }
        self.gc_limit = limit;
    }

    /// Canonical node creation for depth-first callers: children of a node
    /// that did not exist yet gain one count each.
    pub(crate) fn mk_node(&mut self, id: u32, then: Edge, els: Edge) -> Edge {
        let (edge, found) = self.subtables[id as usize].find_or_add(&mut self.pages, then, els);
        if !found {
            self.icr_edge(then);
            self.icr_edge(els);
            self.note_new_node();
        }
        edge
    }

    // -- Post-operation protocol ---------------------------------------------

    /// Applied after every public operation that may have created nodes:
    /// enforces the node limit, then lets the periodic countdown trigger
    /// garbage collection and automatic reordering.
    pub(crate) fn post_process(&mut self, result: Func) -> Result<Func, BddError> {
        if self.config.node_limit != 0 && self.num_nodes > self.config.node_limit {
            warn!(
                "node limit exceeded: {} live nodes, limit {}",
                self.num_nodes, self.config.node_limit
            );
            self.overflow = true;
            self.release(result);
            self.gc();
            return Err(BddError::Overflow);
        }
        if self.gc_check <= 0 {
            self.gc_check = GC_CHECK;
            if self.config.gc_enabled && self.num_nodes > self.gc_limit {
                self.gc();
            }
            if self.config.reorder_technique != ReorderTechnique::None
                && self.num_nodes > self.config.reorder_threshold
            {
                self.reorder();
                // Back off so reordering does not retrigger immediately.
                while self.config.reorder_threshold <= self.num_nodes {
                    self.config.reorder_threshold *= 2;
                }
            }
        }
        Ok(result)
    }

    // -- Handles -------------------------------------------------------------

    pub(crate) fn new_handle(&mut self, edge: Edge) -> Func {
        self.icr_edge(edge);
        let slot = HandleSlot::Occupied { edge, refs: 1 };
        if self.free_handle != NIL {
            let index = self.free_handle;
            match self.handles[index as usize] {
                HandleSlot::Vacant { next } => self.free_handle = next,
                HandleSlot::Occupied { .. } => unreachable!("free handle list corrupt"),
            }
            self.handles[index as usize] = slot;
            Func(index)
        } else {
            self.handles.push(slot);
            Func(self.handles.len() as u32 - 1)
        }
    }

    /// The edge behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was already fully released.
    pub(crate) fn edge(&self, f: Func) -> Edge {
        match self.handles[f.0 as usize] {
            HandleSlot::Occupied { edge, .. } => edge,
            HandleSlot::Vacant { .. } => panic!("use of a released handle"),
        }
    }

    /// Adds an external reference to `f` and returns it.
    pub fn acquire(&mut self, f: Func) -> Func {
        match &mut self.handles[f.0 as usize] {
            HandleSlot::Occupied { refs, .. } => *refs += 1,
            HandleSlot::Vacant { .. } => warn!("acquire of a released handle"),
        }
        f
    }

    /// Drops an external reference to `f`. When the last reference goes, the
    /// root node gives back its handle-held count and becomes collectible if
    /// nothing else points at it.
    pub fn release(&mut self, f: Func) {
        match &mut self.handles[f.0 as usize] {
            HandleSlot::Occupied { refs, edge } => {
                *refs -= 1;
                if *refs == 0 {
                    let edge = *edge;
                    self.handles[f.0 as usize] = HandleSlot::Vacant {
                        next: self.free_handle,
                    };
                    self.free_handle = f.0;
                    self.dcr_edge(edge);
                }
            }
            HandleSlot::Vacant { .. } => warn!("release of a released handle"),
        }
    }

    /// The constant true function.
    pub fn one(&mut self) -> Func {
        self.new_handle(Edge::ONE)
    }

    /// The constant false function.
    pub fn zero(&mut self) -> Func {
        self.new_handle(Edge::ZERO)
    }

    /// The projection function of `var`.
    pub fn var(&mut self, var: Var) -> Func {
        let edge = self.var_edges[var.id() as usize];
        self.new_handle(edge)
    }

    /// The projection function of the variable currently at `level`.
    pub fn index_var(&mut self, level: Level) -> Func {
        let id = self.index_to_id[level.index()];
        let edge = self.var_edges[id as usize];
        self.new_handle(edge)
    }

    /// The top variable of `f`, or None for constants.
    pub fn if_var(&self, f: Func) -> Option<Var> {
        let edge = self.edge(f);
        if edge.is_const() {
            None
        } else {
            Some(Var::new(edge.id()))
        }
    }

    /// The level of the top variable of `f`, or None for constants.
    pub fn if_index(&self, f: Func) -> Option<Level> {
        let edge = self.edge(f);
        if edge.is_const() {
            None
        } else {
            Some(Level::new(self.edge_index(edge)))
        }
    }

    /// The positive cofactor of `f` on its own top variable.
    pub fn then_of(&mut self, f: Func) -> Func {
        let edge = self.edge(f);
        if edge.is_const() {
            warn!("then-cofactor of a constant");
            return self.acquire(f);
        }
        let then = self.then_edge(edge);
        self.new_handle(then)
    }

    /// The negative cofactor of `f` on its own top variable.
    pub fn else_of(&mut self, f: Func) -> Func {
        let edge = self.edge(f);
        if edge.is_const() {
            warn!("else-cofactor of a constant");
            return self.acquire(f);
        }
        let els = self.else_edge(edge);
        self.new_handle(els)
    }

    pub fn is_one(&self, f: Func) -> bool {
        self.edge(f).is_one()
    }

    pub fn is_zero(&self, f: Func) -> bool {
        self.edge(f).is_zero()
    }

    pub fn is_const(&self, f: Func) -> bool {
        self.edge(f).is_const()
    }

    /// Whether the handle's root edge carries the complement tag.
    pub fn is_complement(&self, f: Func) -> bool {
        self.edge(f).is_complement()
    }

    /// The negation of `f`. O(1): only the complement tag flips.
    pub fn not(&mut self, f: Func) -> Func {
        let edge = self.edge(f);
        self.new_handle(-edge)
    }

    /// Structural equality of the functions behind two handles. Canonicity
    /// makes this a constant-time edge comparison.
    pub fn equal(&self, f: Func, g: Func) -> bool {
        self.edge(f) == self.edge(g)
    }

    /// Resolves forwarding on every edge the outside world holds into the
    /// node graph: handle roots, projection edges and association targets.
    /// Used by repacking and reordering before stubs are reclaimed.
    pub(crate) fn resolve_external_edges(&mut self) {
        let subtables = &self.subtables;
        for slot in self.handles.iter_mut() {
            if let HandleSlot::Occupied { edge, .. } = slot {
                *edge = resolve_edge(subtables, *edge);
            }
        }
        for edge in self.var_edges.iter_mut().skip(1) {
            *edge = resolve_edge(subtables, *edge);
        }
        for assoc in self.assocs.iter_mut().flatten() {
            for (_, edge) in assoc.pairs.iter_mut() {
                *edge = resolve_edge(subtables, *edge);
            }
        }
        for (_, edge) in self.temp_assoc.pairs.iter_mut() {
            *edge = resolve_edge(subtables, *edge);
        }
    }

    /// Edges currently reachable from outside the node graph, for building
    /// the interaction matrix.
    pub(crate) fn external_root_edges(&self) -> Vec<Edge> {
        let mut roots = Vec::new();
        for slot in self.handles.iter() {
            if let HandleSlot::Occupied { edge, .. } = slot {
                roots.push(*edge);
            }
        }
        for assoc in self.assocs.iter().flatten() {
            roots.extend(assoc.pairs.iter().map(|&(_, e)| e));
        }
        roots.extend(self.temp_assoc.pairs.iter().map(|&(_, e)| e));
        roots
    }
}

/// Follows forwarding stubs to the current canonical edge. Free function so
/// callers can hold other parts of the manager mutably.
pub(crate) fn resolve_edge(subtables: &[Subtable], edge: Edge) -> Edge {
    let mut edge = edge;
    loop {
        match *subtables[edge.id() as usize].arena.node(edge.node.slot) {
            Node::Forwarded(target) => edge = target.negate_if(edge.is_complement()),
            _ => return edge,
        }
    }
}

/// Whether the edge points at a live (neither freed nor forwarded) node.
pub(crate) fn edge_is_live(subtables: &[Subtable], edge: Edge) -> bool {
    subtables[edge.id() as usize]
        .arena
        .node(edge.node.slot)
        .is_live()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        let mut bdd = Bdd::new(0);
        let one = bdd.one();
        let zero = bdd.zero();
        assert!(bdd.is_one(one));
        assert!(bdd.is_zero(zero));
        assert!(bdd.is_const(one));
        let not_one = bdd.not(one);
        assert!(bdd.equal(not_one, zero));
    }

    #[test]
    fn test_projection_cofactors() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        assert_eq!(bdd.if_var(a), Some(Var::new(1)));
        assert_eq!(bdd.if_index(a), Some(Level::new(0)));
        let t = bdd.then_of(a);
        let e = bdd.else_of(a);
        assert!(bdd.is_one(t));
        assert!(bdd.is_zero(e));
    }

    #[test]
    fn test_var_order_insertion() {
        let mut bdd = Bdd::new(2);
        let v3 = bdd.create_new_var_first();
        assert_eq!(bdd.id_to_index[v3.id() as usize], 0);
        assert_eq!(bdd.id_to_index[1], 1);
        assert_eq!(bdd.id_to_index[2], 2);

        let v4 = bdd.create_new_var_after(Var::new(1));
        assert_eq!(bdd.id_to_index[v4.id() as usize], 2);
        assert_eq!(bdd.id_to_index[2], 3);
        assert_eq!(bdd.num_vars(), 4);
    }

    #[test]
    fn test_handle_release_unlocks_nothing_for_projections() {
        let mut bdd = Bdd::new(1);
        let a = bdd.var(Var::new(1));
        bdd.release(a);
        // Projection nodes are saturated and survive any release.
        let a2 = bdd.var(Var::new(1));
        assert_eq!(bdd.if_var(a2), Some(Var::new(1)));
    }

    #[test]
    fn test_acquire_release_counting() {
        let mut bdd = Bdd::new(1);
        let a = bdd.var(Var::new(1));
        let a2 = bdd.acquire(a);
        bdd.release(a);
        // Still alive through the second reference.
        assert!(bdd.if_var(a2).is_some());
        bdd.release(a2);
    }

    #[test]
    fn test_node_limit_overflow_is_recoverable() {
        let mut bdd = Bdd::new(8);
        let vars: Vec<_> = (1..=8).map(|i| bdd.var(Var::new(i))).collect();
        bdd.set_node_limit(10);

        let mut acc = bdd.acquire(vars[0]);
        let mut failed = false;
        for &v in &vars[1..] {
            match bdd.and(acc, v) {
                Ok(next) => {
                    bdd.release(acc);
                    acc = next;
                }
                Err(BddError::Overflow) => {
                    failed = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(failed);
        assert!(bdd.overflow());

        // Raising the limit and clearing the flag makes the op succeed.
        bdd.clear_overflow();
        bdd.set_node_limit(0);
        assert!(!bdd.overflow());
        let full = bdd.multiway_and(&vars).unwrap();
        assert!(!bdd.is_const(full));
    }

    #[test]
    fn test_double_negation() {
        let mut bdd = Bdd::new(1);
        let a = bdd.var(Var::new(1));
        let na = bdd.not(a);
        let nna = bdd.not(na);
        assert!(bdd.equal(a, nna));
        assert!(!bdd.equal(a, na));
    }
}
