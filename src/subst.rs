//! Cofactoring, composition and substitution.
//!
//! These operations walk one function depth-first and rebuild it with some
//! variables pinned or replaced. Recursion is memoized on the regular edge of
//! every visited node; the complement tag distributes over all of them, so
//! `op(!f) == !op(f)` comes for free from one cached entry.
//!
//! Simultaneous substitution recombines each rebuilt node with the
//! breadth-first ITE engine rather than direct node creation, because a
//! replacement function may be ordered above the variable it replaces.

use std::collections::HashMap;

use log::warn;

use crate::apply::BoolOp;
use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::types::{BddError, Var};

impl Bdd {
    /// The cofactor of `f` with the variable `id` pinned to `value`.
    pub(crate) fn restrict(&mut self, f: Edge, id: u32, value: bool) -> Edge {
        let mut memo = HashMap::new();
        self.restrict_rec(f, id, value, &mut memo)
    }

    fn restrict_rec(
        &mut self,
        f: Edge,
        id: u32,
        value: bool,
        memo: &mut HashMap<Edge, Edge>,
    ) -> Edge {
        // Everything at or below the pinned level except the variable itself
        // is unaffected.
        if f.is_const() || self.edge_index(f) > self.id_to_index[id as usize] {
            return f;
        }
        if f.id() == id {
            return if value {
                self.then_edge(f)
            } else {
                self.else_edge(f)
            };
        }
        let reg = f.regular();
        if let Some(&hit) = memo.get(&reg) {
            return hit.negate_if(f.is_complement());
        }
        let live = *self.live(reg.node);
        let then = self.restrict_rec(live.then, id, value, memo);
        let els = self.restrict_rec(live.els, id, value, memo);
        let result = if then == live.then && els == live.els {
            reg
        } else {
            self.mk_node(reg.id(), then, els)
        };
        memo.insert(reg, result);
        result.negate_if(f.is_complement())
    }

    /// The generalized cofactor of `f` with respect to the cube `c`: every
    /// literal of `c` is pinned in `f`. A branching node inside `c` is not a
    /// literal; it is reported and its then-branch is taken.
    pub fn cofactor(&mut self, f: Func, c: Func) -> Result<Func, BddError> {
        let mut result = self.edge(f);
        let mut cube = self.edge(c);
        if cube.is_zero() {
            warn!("cofactor with respect to the zero function");
        }
        while !cube.is_const() {
            let id = cube.id();
            let then = self.then_edge(cube);
            let els = self.else_edge(cube);
            let (value, rest) = if els.is_zero() {
                (true, then)
            } else if then.is_zero() {
                (false, els)
            } else {
                warn!("cofactor condition is not a cube at {}", Var::new(id));
                (true, then)
            };
            result = self.restrict(result, id, value);
            cube = rest;
        }
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    /// A function agreeing with `f` wherever the care set `c` holds, chosen
    /// to be no larger than `f` itself (the restrict heuristic). Outside the
    /// care set the result is arbitrary.
    pub fn reduce(&mut self, f: Func, c: Func) -> Result<Func, BddError> {
        let f = self.edge(f);
        let c = self.edge(c);
        let reduced = if c.is_zero() {
            warn!("reduce with an empty care set");
            f
        } else {
            let mut memo = HashMap::new();
            self.reduce_rec(f, c, &mut memo)
        };
        // The heuristic can backfire; keep the original in that case.
        let result = if self.edge_size(reduced) < self.edge_size(f) {
            reduced
        } else {
            f
        };
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    fn reduce_rec(
        &mut self,
        f: Edge,
        c: Edge,
        memo: &mut HashMap<(Edge, Edge), Edge>,
    ) -> Edge {
        if c.is_one() || f.is_const() {
            return f;
        }
        let reg = f.regular();
        if let Some(&hit) = memo.get(&(reg, c)) {
            return hit.negate_if(f.is_complement());
        }
        let f_index = self.edge_index(reg);
        let result = if self.edge_index(c) < f_index {
            // The care set branches above f; f does not distinguish the two
            // halves, so quantify the top care variable out.
            let c1 = self.then_edge(c);
            let c0 = self.else_edge(c);
            let c_any = self.apply2(BoolOp::Or, c1, c0);
            self.reduce_rec(reg, c_any, memo)
        } else {
            let id = reg.id();
            let f1 = self.then_edge(reg);
            let f0 = self.else_edge(reg);
            let (c1, c0) = self.cofactors(c, id);
            if c1.is_zero() {
                self.reduce_rec(f0, c0, memo)
            } else if c0.is_zero() {
                self.reduce_rec(f1, c1, memo)
            } else {
                let then = self.reduce_rec(f1, c1, memo);
                let els = self.reduce_rec(f0, c0, memo);
                self.mk_node(id, then, els)
            }
        };
        memo.insert((reg, c), result);
        result.negate_if(f.is_complement())
    }

    /// Simultaneous substitution of functions for variables. Unmapped nodes
    /// are rebuilt through ITE on their own projection because a replacement
    /// may be ordered above the node's variable.
    pub(crate) fn compose_pairs(&mut self, f: Edge, pairs: &[(u32, Edge)]) -> Edge {
        let last_index = match pairs
            .iter()
            .map(|&(id, _)| self.id_to_index[id as usize])
            .max()
        {
            Some(index) => index,
            None => return f,
        };
        let map: HashMap<u32, Edge> = pairs.iter().copied().collect();
        let mut memo = HashMap::new();
        self.subst_rec(f, &map, last_index, &mut memo)
    }

    fn subst_rec(
        &mut self,
        f: Edge,
        map: &HashMap<u32, Edge>,
        last_index: usize,
        memo: &mut HashMap<Edge, Edge>,
    ) -> Edge {
        if f.is_const() || self.edge_index(f) > last_index {
            return f;
        }
        let reg = f.regular();
        if let Some(&hit) = memo.get(&reg) {
            return hit.negate_if(f.is_complement());
        }
        let live = *self.live(reg.node);
        let then = self.subst_rec(live.then, map, last_index, memo);
        let els = self.subst_rec(live.els, map, last_index, memo);
        let id = reg.id();
        let result = match map.get(&id) {
            Some(&target) => self.apply_ite(target, then, els),
            None if then == live.then && els == live.els => reg,
            None => {
                let projection = self.var_edges[id as usize];
                self.apply_ite(projection, then, els)
            }
        };
        memo.insert(reg, result);
        result.negate_if(f.is_complement())
    }

    /// Functional composition: `f` with `g` substituted for `v`.
    pub fn compose(&mut self, f: Func, v: Var, g: Func) -> Result<Func, BddError> {
        let f = self.edge(f);
        let g = self.edge(g);
        let result = self.compose_pairs(f, &[(v.id(), g)]);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    /// Substitutes the current association's function for each of its
    /// variables, all at once.
    pub fn substitute(&mut self, f: Func) -> Result<Func, BddError> {
        let f = self.edge(f);
        let pairs = self.current_assoc_pairs().to_vec();
        let result = self.compose_pairs(f, &pairs);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    /// Renames variables according to the current association. Association
    /// targets are read as variables through their top label; non-projection
    /// targets are reported and used as full functions.
    pub fn var_substitute(&mut self, f: Func) -> Result<Func, BddError> {
        for &(id, target) in self.current_assoc_pairs() {
            if target.is_const() || target != self.var_edges[target.id() as usize] {
                warn!(
                    "variable substitution for {} maps to a non-variable",
                    Var::new(id)
                );
            }
        }
        self.substitute(f)
    }

    /// Whether `f` depends on the variable `v`.
    pub fn depends_on(&mut self, f: Func, v: Var) -> Result<bool, BddError> {
        let f = self.edge(f);
        let then = self.restrict(f, v.id(), true);
        let hold = self.new_handle(then);
        let els = self.restrict(f, v.id(), false);
        let differs = then != els;
        let hold = self.post_process(hold)?;
        self.release(hold);
        Ok(differs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cofactor_pins_literals() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let bc = bdd.or(b, c).unwrap();
        let f = bdd.and(a, bc).unwrap();

        // f | a=1 is b | c.
        let fa = bdd.cofactor(f, a).unwrap();
        assert!(bdd.equal(fa, bc));

        // f | a=1, b=0 is c.
        let nb = bdd.not(b);
        let cube = bdd.and(a, nb).unwrap();
        let fc = bdd.cofactor(f, cube).unwrap();
        assert!(bdd.equal(fc, c));

        // f | a=0 is constant zero.
        let na = bdd.not(a);
        let f0 = bdd.cofactor(f, na).unwrap();
        assert!(bdd.is_zero(f0));
    }

    #[test]
    fn test_cofactor_respects_shannon_expansion() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.xor(a, b).unwrap();
        let f1 = bdd.cofactor(f, a).unwrap();
        let na = bdd.not(a);
        let f0 = bdd.cofactor(f, na).unwrap();
        let back = bdd.ite(a, f1, f0).unwrap();
        assert!(bdd.equal(back, f));
    }

    #[test]
    fn test_reduce_agrees_on_care_set() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));

        // Care set is a; on it, f = a & (b | c) agrees with b | c.
        let bc = bdd.or(b, c).unwrap();
        let f = bdd.and(a, bc).unwrap();
        let r = bdd.reduce(f, a).unwrap();
        let agree = bdd.xnor(r, f).unwrap();
        assert!(bdd.implies(a, agree).unwrap());
        assert!(bdd.size(r) <= bdd.size(f));
    }

    #[test]
    fn test_reduce_with_full_care_set_is_identity() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.xor(a, b).unwrap();
        let one = bdd.one();
        let r = bdd.reduce(f, one).unwrap();
        assert!(bdd.equal(r, f));
    }

    #[test]
    fn test_compose_replaces_variable() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));

        // (a & b)[b := b | c] == a & (b | c).
        let ab = bdd.and(a, b).unwrap();
        let bc = bdd.or(b, c).unwrap();
        let composed = bdd.compose(ab, Var::new(2), bc).unwrap();
        let expected = bdd.and(a, bc).unwrap();
        assert!(bdd.equal(composed, expected));
    }

    #[test]
    fn test_compose_with_constant_is_restriction() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.xor(a, b).unwrap();
        let one = bdd.one();
        let g = bdd.compose(f, Var::new(2), one).unwrap();
        let na = bdd.not(a);
        assert!(bdd.equal(g, na));
    }

    #[test]
    fn test_substitute_is_simultaneous() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));

        // Swapping a and b through one association must not chain: the two
        // replacements happen against the original function.
        let nb = bdd.not(b);
        let f = bdd.and(a, nb).unwrap();
        bdd.temp_assoc_set(&[(Var::new(1), b), (Var::new(2), a)], false);
        bdd.assoc_set_current(crate::assoc::TEMP_ASSOC);
        let g = bdd.substitute(f).unwrap();

        let na = bdd.not(a);
        let expected = bdd.and(b, na).unwrap();
        assert!(bdd.equal(g, expected));
    }

    #[test]
    fn test_substitute_target_above_variable() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let c = bdd.var(Var::new(3));

        // Replace the bottom variable by a function of the top one.
        bdd.temp_assoc_set(&[(Var::new(3), a)], false);
        bdd.assoc_set_current(crate::assoc::TEMP_ASSOC);
        let g = bdd.substitute(c).unwrap();
        assert!(bdd.equal(g, a));
    }

    #[test]
    fn test_var_substitute_renames() {
        let mut bdd = Bdd::new(4);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let d = bdd.var(Var::new(4));
        let f = bdd.and(a, b).unwrap();

        bdd.temp_assoc_set(&[(Var::new(1), c), (Var::new(2), d)], false);
        bdd.assoc_set_current(crate::assoc::TEMP_ASSOC);
        let g = bdd.var_substitute(f).unwrap();
        let expected = bdd.and(c, d).unwrap();
        assert!(bdd.equal(g, expected));
    }

    #[test]
    fn test_depends_on() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.and(a, b).unwrap();
        assert!(bdd.depends_on(f, Var::new(1)).unwrap());
        assert!(bdd.depends_on(f, Var::new(2)).unwrap());
        assert!(!bdd.depends_on(f, Var::new(3)).unwrap());
    }

    #[test]
    fn test_depends_on_honors_node_limit() {
        let mut bdd = Bdd::new(3);
        let vars: Vec<_> = (1..=3).map(|i| bdd.var(Var::new(i))).collect();
        let f = bdd.multiway_xor(&vars).unwrap();
        let nodes = bdd.num_nodes();
        bdd.set_node_limit(nodes);

        // Restricting the middle variable of the parity chain builds a node
        // the chain does not contain.
        assert!(matches!(
            bdd.depends_on(f, Var::new(2)),
            Err(BddError::Overflow)
        ));
        assert!(bdd.overflow());

        bdd.clear_overflow();
        bdd.set_node_limit(0);
        assert!(bdd.depends_on(f, Var::new(2)).unwrap());
    }
}
