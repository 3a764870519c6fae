//! Existential and universal quantification.
//!
//! The set of quantified variables is the current association's variable
//! list; the associated targets are ignored. Quantification folds the
//! variables out one at a time, deepest first, so each intermediate result
//! has already lost every deeper quantified variable and stays as small as
//! the final one.

use log::trace;

use crate::apply::BoolOp;
use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::types::BddError;

impl Bdd {
    /// Variables of the current association, deepest index first.
    fn quantified_vars(&self) -> Vec<u32> {
        let mut vars: Vec<u32> = self
            .current_assoc_pairs()
            .iter()
            .map(|&(id, _)| id)
            .collect();
        vars.sort_by_key(|&id| std::cmp::Reverse(self.id_to_index[id as usize]));
        vars
    }

    pub(crate) fn exists_edge(&mut self, f: Edge) -> Edge {
        let vars = self.quantified_vars();
        trace!("exists over {} variables", vars.len());
        let mut result = f;
        for id in vars {
            let then = self.restrict(result, id, true);
            let els = self.restrict(result, id, false);
            result = self.apply2(BoolOp::Or, then, els);
        }
        result
    }

    /// Existentially quantifies the current association's variables out of
    /// `f`.
    pub fn exists(&mut self, f: Func) -> Result<Func, BddError> {
        let f = self.edge(f);
        let result = self.exists_edge(f);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    /// Universally quantifies the current association's variables out of
    /// `f`. Dual of [`Bdd::exists`] through double negation.
    pub fn forall(&mut self, f: Func) -> Result<Func, BddError> {
        let f = self.edge(f);
        let result = -self.exists_edge(-f);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }

    /// The relational product: existential quantification of the current
    /// association's variables out of `f & g`.
    pub fn rel_prod(&mut self, f: Func, g: Func) -> Result<Func, BddError> {
        let (f, g) = (self.edge(f), self.edge(g));
        let conj = self.apply2(BoolOp::And, f, g);
        let result = self.exists_edge(conj);
        let handle = self.new_handle(result);
        self.post_process(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::TEMP_ASSOC;
    use crate::types::Var;

    fn quantify_over(bdd: &mut Bdd, vars: &[Var]) {
        bdd.temp_assoc_vars(vars, false);
        bdd.assoc_set_current(TEMP_ASSOC);
    }

    #[test]
    fn test_exists_removes_the_variable() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let ab = bdd.and(a, b).unwrap();

        quantify_over(&mut bdd, &[Var::new(2)]);
        let e = bdd.exists(ab).unwrap();
        assert!(bdd.equal(e, a));
        assert!(!bdd.depends_on(e, Var::new(2)).unwrap());
    }

    #[test]
    fn test_exists_of_xor_is_tautology() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.xor(a, b).unwrap();

        quantify_over(&mut bdd, &[Var::new(2)]);
        let e = bdd.exists(f).unwrap();
        assert!(bdd.is_one(e));
        let u = bdd.forall(f).unwrap();
        assert!(bdd.is_zero(u));
    }

    #[test]
    fn test_forall_keeps_guaranteed_part() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.or(a, b).unwrap();

        // For all b, a | b holds only where a holds.
        quantify_over(&mut bdd, &[Var::new(2)]);
        let u = bdd.forall(f).unwrap();
        assert!(bdd.equal(u, a));
    }

    #[test]
    fn test_multi_variable_quantification() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let bc = bdd.and(b, c).unwrap();
        let f = bdd.and(a, bc).unwrap();

        quantify_over(&mut bdd, &[Var::new(2), Var::new(3)]);
        let e = bdd.exists(f).unwrap();
        assert!(bdd.equal(e, a));
    }

    #[test]
    fn test_rel_prod_is_image_computation() {
        let mut bdd = Bdd::new(4);
        let x = bdd.var(Var::new(1));
        let y = bdd.var(Var::new(2));

        // Transition relation y == !x, state set x = 1. The image is y = 0.
        let relation = bdd.xor(x, y).unwrap();
        quantify_over(&mut bdd, &[Var::new(1)]);
        let image = bdd.rel_prod(relation, x).unwrap();
        let ny = bdd.not(y);
        assert!(bdd.equal(image, ny));
    }

    #[test]
    fn test_rel_prod_matches_and_then_exists() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let f = bdd.or(a, b).unwrap();
        let g = bdd.xor(b, c).unwrap();

        quantify_over(&mut bdd, &[Var::new(2)]);
        let direct = bdd.rel_prod(f, g).unwrap();
        let conj = bdd.and(f, g).unwrap();
        let stepwise = bdd.exists(conj).unwrap();
        assert!(bdd.equal(direct, stepwise));
    }
}
