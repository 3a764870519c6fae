//! Breadth-first operator engine.
//!
//! Boolean combination never recurses on the graph. An operation seeds one
//! *request* (an operand pair, or a triple for ITE) into a per-level queue,
//! then runs two level-synchronous passes:
//!
//! - **apply**, top-down in the variable order: every request at the current
//!   level is cofactored on that level's variable into a then-branch and an
//!   else-branch. A branch either short-circuits through the operator's
//!   terminal rules or the global result cache, or becomes a sub-request in
//!   the queue of its own top level. Requests are hash-consed per queue, so
//!   a shared sub-computation is expanded once no matter how many parents
//!   reach it.
//! - **reduce**, bottom-up: each request resolves its branches (following
//!   request forwarding), collapses if both branches agree, reuses a unique
//!   table hit, or installs a fresh canonical node.
//!
//! Reference counts are settled during the passes: a branch contributes one
//! count to whatever it ends up pointing at, and reduce transfers the
//! accumulated parent counts of a collapsed or deduplicated request onto the
//! surviving node. A finished operation leaves every node with exactly its
//! parent count, the root with zero (the public wrapper's handle protects
//! it).
//!
//! Queues are transient per invocation; dropping them is the cleanup phase.

use std::collections::HashMap;

use log::trace;

use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::types::BddError;
use crate::utils::{pairing2, pairing3, MyHash};

/// Two-operand operators with native terminal rules. Negated variants (NOR,
/// XNOR) are complement edges away and have no opcode of their own.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum BoolOp {
    And,
    Nand,
    Or,
    Xor,
}

impl BoolOp {
    /// Short-circuit on constant or trivially related operands.
    fn terminal(self, f: Edge, g: Edge) -> Option<Edge> {
        match self {
            BoolOp::And => {
                if f.is_one() {
                    Some(g)
                } else if g.is_one() {
                    Some(f)
                } else if f.is_zero() || g.is_zero() {
                    Some(Edge::ZERO)
                } else if f == g {
                    Some(f)
                } else if f == -g {
                    Some(Edge::ZERO)
                } else {
                    None
                }
            }
            BoolOp::Nand => BoolOp::And.terminal(f, g).map(|e| -e),
            BoolOp::Or => {
                if f.is_one() || g.is_one() {
                    Some(Edge::ONE)
                } else if f.is_zero() {
                    Some(g)
                } else if g.is_zero() {
                    Some(f)
                } else if f == g {
                    Some(f)
                } else if f == -g {
                    Some(Edge::ONE)
                } else {
                    None
                }
            }
            BoolOp::Xor => {
                if f.is_one() {
                    Some(-g)
                } else if f.is_zero() {
                    Some(g)
                } else if g.is_one() {
                    Some(-f)
                } else if g.is_zero() {
                    Some(f)
                } else if f == g {
                    Some(Edge::ZERO)
                } else if f == -g {
                    Some(Edge::ONE)
                } else {
                    None
                }
            }
        }
    }

    /// Canonical operand pair for queue and cache keys. All four operators
    /// are commutative, so operands are sorted; XOR additionally strips both
    /// complements into the returned result flag.
    fn normalize(self, f: Edge, g: Edge) -> (Edge, Edge, bool) {
        let (f, g, complement) = match self {
            BoolOp::Xor => (
                f.regular(),
                g.regular(),
                f.is_complement() ^ g.is_complement(),
            ),
            _ => (f, g, false),
        };
        if f.key() <= g.key() {
            (f, g, complement)
        } else {
            (g, f, complement)
        }
    }
}

/// Global result-cache key: opcode plus normalized operands.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum OpKey {
    Op2(BoolOp, Edge, Edge),
    Ite(Edge, Edge, Edge),
}

impl MyHash for OpKey {
    fn hash(&self) -> u64 {
        match *self {
            OpKey::Op2(op, f, g) => pairing3(op as u64, f.key(), g.key()),
            OpKey::Ite(f, g, h) => pairing2(pairing3(f.key(), g.key(), h.key()), 4),
        }
    }
}

/// A branch outcome during the apply phase.
#[derive(Debug, Copy, Clone)]
enum Operand {
    Done(Edge),
    Pending {
        index: usize,
        req: u32,
        complement: bool,
    },
}

#[derive(Debug)]
struct Request<K> {
    key: K,
    then: Operand,
    els: Operand,
    /// Number of parent references accumulated during apply.
    refs: u32,
    result: Option<Edge>,
}

struct ReqQueue<K> {
    map: HashMap<K, u32>,
    reqs: Vec<Request<K>>,
}

impl<K> Default for ReqQueue<K> {
    fn default() -> Self {
        ReqQueue {
            map: HashMap::new(),
            reqs: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + std::hash::Hash> ReqQueue<K> {
    /// Hash-conses a request, returning its index.
    fn find_or_add(&mut self, key: K) -> u32 {
        if let Some(&req) = self.map.get(&key) {
            return req;
        }
        let req = self.reqs.len() as u32;
        self.reqs.push(Request {
            key,
            then: Operand::Done(Edge::ZERO),
            els: Operand::Done(Edge::ZERO),
            refs: 0,
            result: None,
        });
        self.map.insert(key, req);
        req
    }
}

fn resolve_operand<K>(queues: &[ReqQueue<K>], operand: Operand) -> Edge {
    match operand {
        Operand::Done(edge) => edge,
        Operand::Pending {
            index,
            req,
            complement,
        } => queues[index].reqs[req as usize]
            .result
            .expect("deeper queues are reduced first")
            .negate_if(complement),
    }
}

impl Bdd {
    // -- Two-operand engine --------------------------------------------------

    /// Breadth-first evaluation of `op(f, g)`. Returns an unprotected edge;
    /// the root node carries only the counts its in-graph parents gave it.
    pub(crate) fn apply2(&mut self, op: BoolOp, f: Edge, g: Edge) -> Edge {
        if let Some(result) = op.terminal(f, g) {
            return result;
        }
        let (f, g, complement) = op.normalize(f, g);
        if let Some(&hit) = self.cache.get(&OpKey::Op2(op, f, g)) {
            return hit.negate_if(complement);
        }

        let num_vars = self.num_vars();
        let mut queues: Vec<ReqQueue<(Edge, Edge)>> =
            (0..num_vars).map(|_| ReqQueue::default()).collect();
        let min_index = self.edge_index(f).min(self.edge_index(g));
        let root = queues[min_index].find_or_add((f, g));
        debug_assert_eq!(root, 0);
        trace!("apply2 {:?} {} {} from level {}", op, f, g, min_index);

        for index in min_index..num_vars {
            let id = self.index_to_id[index];
            for r in 0..queues[index].reqs.len() {
                let (rf, rg) = queues[index].reqs[r].key;
                let (f1, f0) = self.cofactors(rf, id);
                let (g1, g0) = self.cofactors(rg, id);
                let then = self.branch2(op, f1, g1, &mut queues);
                let els = self.branch2(op, f0, g0, &mut queues);
                let req = &mut queues[index].reqs[r];
                req.then = then;
                req.els = els;
            }
        }

        self.reduce_requests(&mut queues, min_index);
        let result = queues[min_index].reqs[0]
            .result
            .expect("root request is reduced");
        self.record_results(&queues, |key| OpKey::Op2(op, key.0, key.1));
        result.negate_if(complement)
    }

    /// Resolves one branch: terminal rule, cache hit, or sub-request. A
    /// resolved edge gains the parent's count immediately; a sub-request
    /// accumulates it for the reduce phase.
    fn branch2(
        &mut self,
        op: BoolOp,
        f: Edge,
        g: Edge,
        queues: &mut [ReqQueue<(Edge, Edge)>],
    ) -> Operand {
        if let Some(result) = op.terminal(f, g) {
            self.icr_edge(result);
            return Operand::Done(result);
        }
        let (f, g, complement) = op.normalize(f, g);
        if let Some(&hit) = self.cache.get(&OpKey::Op2(op, f, g)) {
            let result = hit.negate_if(complement);
            self.icr_edge(result);
            return Operand::Done(result);
        }
        let index = self.edge_index(f).min(self.edge_index(g));
        let req = queues[index].find_or_add((f, g));
        queues[index].reqs[req as usize].refs += 1;
        Operand::Pending {
            index,
            req,
            complement,
        }
    }

    // -- Three-operand engine ------------------------------------------------

    /// Breadth-first if-then-else. Same contract as [`Bdd::apply2`].
    pub(crate) fn apply_ite(&mut self, f: Edge, g: Edge, h: Edge) -> Edge {
        let (f, g, h, complement) = match self.ite_case(f, g, h) {
            IteCase::Done(result) => return result,
            IteCase::Triple(f, g, h, complement) => (f, g, h, complement),
        };
        if let Some(&hit) = self.cache.get(&OpKey::Ite(f, g, h)) {
            return hit.negate_if(complement);
        }

        let num_vars = self.num_vars();
        let mut queues: Vec<ReqQueue<(Edge, Edge, Edge)>> =
            (0..num_vars).map(|_| ReqQueue::default()).collect();
        let min_index = self
            .edge_index(f)
            .min(self.edge_index(g))
            .min(self.edge_index(h));
        let root = queues[min_index].find_or_add((f, g, h));
        debug_assert_eq!(root, 0);
        trace!("ite {} {} {} from level {}", f, g, h, min_index);

        for index in min_index..num_vars {
            let id = self.index_to_id[index];
            for r in 0..queues[index].reqs.len() {
                let (rf, rg, rh) = queues[index].reqs[r].key;
                let (f1, f0) = self.cofactors(rf, id);
                let (g1, g0) = self.cofactors(rg, id);
                let (h1, h0) = self.cofactors(rh, id);
                let then = self.branch_ite(f1, g1, h1, &mut queues);
                let els = self.branch_ite(f0, g0, h0, &mut queues);
                let req = &mut queues[index].reqs[r];
                req.then = then;
                req.els = els;
            }
        }

        self.reduce_requests(&mut queues, min_index);
        let result = queues[min_index].reqs[0]
            .result
            .expect("root request is reduced");
        self.record_results(&queues, |key| OpKey::Ite(key.0, key.1, key.2));
        result.negate_if(complement)
    }

    fn branch_ite(
        &mut self,
        f: Edge,
        g: Edge,
        h: Edge,
        queues: &mut [ReqQueue<(Edge, Edge, Edge)>],
    ) -> Operand {
        let (f, g, h, complement) = match self.ite_case(f, g, h) {
            IteCase::Done(result) => {
                self.icr_edge(result);
                return Operand::Done(result);
            }
            IteCase::Triple(f, g, h, complement) => (f, g, h, complement),
        };
        if let Some(&hit) = self.cache.get(&OpKey::Ite(f, g, h)) {
            let result = hit.negate_if(complement);
            self.icr_edge(result);
            return Operand::Done(result);
        }
        let index = self
            .edge_index(f)
            .min(self.edge_index(g))
            .min(self.edge_index(h));
        let req = queues[index].find_or_add((f, g, h));
        queues[index].reqs[req as usize].refs += 1;
        Operand::Pending {
            index,
            req,
            complement,
        }
    }

    /// Standard-triple normalization of `ITE(f, g, h)`.
    fn ite_case(&self, f: Edge, g: Edge, h: Edge) -> IteCase {
        let mut f = f;
        let mut g = g;
        let mut h = h;
        // First-argument substitutions.
        if f == g {
            g = Edge::ONE;
        } else if f == -g {
            g = Edge::ZERO;
        }
        if f == h {
            h = Edge::ZERO;
        } else if f == -h {
            h = Edge::ONE;
        }
        // Keep f and the then-branch positive.
        let mut complement = false;
        if f.is_complement() {
            std::mem::swap(&mut g, &mut h);
            f = -f;
        }
        if g.is_complement() {
            g = -g;
            h = -h;
            complement = true;
        }
        // Remaining terminal cases.
        if f.is_one() || g == h {
            return IteCase::Done(g.negate_if(complement));
        }
        debug_assert!(!f.is_const());
        if g.is_one() && h.is_zero() {
            return IteCase::Done(f.negate_if(complement));
        }
        IteCase::Triple(f, g, h, complement)
    }

    // -- Shared reduce phase -------------------------------------------------

    /// Bottom-up reduction of every queued request into a canonical edge.
    fn reduce_requests<K>(&mut self, queues: &mut [ReqQueue<K>], min_index: usize) {
        for index in (min_index..queues.len()).rev() {
            let id = self.index_to_id[index];
            for r in 0..queues[index].reqs.len() {
                let then = resolve_operand(queues, queues[index].reqs[r].then);
                let els = resolve_operand(queues, queues[index].reqs[r].els);
                let refs = queues[index].reqs[r].refs as i32;
                let result = if then == els {
                    // Redundant request: parents point at the shared child,
                    // and the two branch counts collapse into them.
                    self.add_refs_edge(then, refs - 2);
                    then
                } else if let Some(hit) = self.subtables[id as usize].lookup(then, els) {
                    self.dcr_edge(then);
                    self.dcr_edge(els);
                    self.add_refs_edge(hit, refs);
                    hit
                } else {
                    let refs = refs.clamp(0, crate::node::MAX_REF_COUNT as i32) as u16;
                    let edge = self.subtables[id as usize].add_direct(
                        &mut self.pages,
                        then,
                        els,
                        refs,
                    );
                    self.note_new_node();
                    edge
                };
                queues[index].reqs[r].result = Some(result);
            }
        }
    }

    /// Publishes every reduced request in the global cache.
    fn record_results<K: Copy>(
        &mut self,
        queues: &[ReqQueue<K>],
        to_key: impl Fn(K) -> OpKey,
    ) {
        for queue in queues {
            for req in &queue.reqs {
                if let Some(result) = req.result {
                    self.cache.insert(to_key(req.key), result);
                }
            }
        }
    }
}

enum IteCase {
    Done(Edge),
    /// Normalized triple plus the result complement flag.
    Triple(Edge, Edge, Edge, bool),
}

// -- Public operation surface ------------------------------------------------

impl Bdd {
    fn apply2_op(&mut self, op: BoolOp, f: Func, g: Func) -> Result<Func, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let result = self.apply2(op, f, g);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    pub fn and(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        self.apply2_op(BoolOp::And, f, g)
    }

    pub fn nand(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        self.apply2_op(BoolOp::Nand, f, g)
    }

    pub fn or(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        self.apply2_op(BoolOp::Or, f, g)
    }

    pub fn nor(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let result = self.apply2(BoolOp::Or, f, g);
        let handle = self.new_handle(-result);
        self.post_process(handle)
    }

    pub fn xor(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        self.apply2_op(BoolOp::Xor, f, g)
    }

    pub fn xnor(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let result = self.apply2(BoolOp::Xor, f, g);
        let handle = self.new_handle(-result);
        self.post_process(handle)
    }

    /// If-then-else: `(f & g) | (!f & h)`.
    pub fn ite(&mut self, f: Func, g: Func, h: Func) -> Result<Func, BddError> {
        let (f, g, h) = (self.edge(f), self.edge(g), self.edge(h));
        let result = self.apply_ite(f, g, h);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    fn multiway(
        &mut self,
        op: BoolOp,
        fs: &[Func],
        empty: Edge,
    ) -> Result<Func, BddError> {
        // Balanced pairwise rounds keep intermediate results small compared
        // to a left fold over a long operand list.
        let mut layer: Vec<Edge> = fs.iter().map(|&f| self.edge(f)).collect();
        if layer.is_empty() {
            layer.push(empty);
        }
        while layer.len() > 1 {
            let mut next = Vec::with_capacity((layer.len() + 1) / 2);
            for pair in layer.chunks(2) {
                match *pair {
                    [f, g] => next.push(self.apply2(op, f, g)),
                    [f] => next.push(f),
                    _ => unreachable!("chunks of two"),
                }
            }
            layer = next;
        }
        let handle = self.new_handle(layer[0]);
        self.post_process(handle)
    }

    pub fn multiway_and(&mut self, fs: &[Func]) -> Result<Func, BddError> {
        self.multiway(BoolOp::And, fs, Edge::ONE)
    }

    pub fn multiway_or(&mut self, fs: &[Func]) -> Result<Func, BddError> {
        self.multiway(BoolOp::Or, fs, Edge::ZERO)
    }

    pub fn multiway_xor(&mut self, fs: &[Func]) -> Result<Func, BddError> {
        self.multiway(BoolOp::Xor, fs, Edge::ZERO)
    }

    /// Whether `f` and `g` share at least one satisfying assignment.
    pub fn intersects(&mut self, f: Func, g: Func) -> Result<bool, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let conj = self.apply2(BoolOp::And, f, g);
        let nonempty = !conj.is_zero();
        let handle = self.new_handle(conj);
        let handle = self.post_process(handle)?;
        self.release(handle);
        Ok(nonempty)
    }

    /// Whether every satisfying assignment of `f` satisfies `g`.
    pub fn implies(&mut self, f: Func, g: Func) -> Result<bool, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let diff = self.apply2(BoolOp::And, f, -g);
        let holds = diff.is_zero();
        let handle = self.new_handle(diff);
        let handle = self.post_process(handle)?;
        self.release(handle);
        Ok(holds)
    }
}
