//! Satisfying assignments and model counting.

use std::collections::HashMap;

use log::warn;
use num_bigint::{BigUint, ToBigUint};

use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::types::BddError;

impl Bdd {
    /// Builds one satisfying assignment of `f` as a cube over the variables
    /// on the chosen path. For the zero function there is none; the zero
    /// function itself is returned.
    pub fn satisfy(&mut self, f: Func) -> Result<Func, BddError> {
        let mut edge = self.edge(f);
        if edge.is_zero() {
            warn!("satisfy of an unsatisfiable function");
            let handle = self.new_handle(Edge::ZERO);
            return Ok(handle);
        }

        // Walk down, always picking a satisfiable branch. In a canonical
        // graph only the constant edge denotes the zero function, so the
        // then-branch is satisfiable unless it is that edge.
        let mut literals: Vec<(u32, bool)> = Vec::new();
        while !edge.is_const() {
            let then = self.then_edge(edge);
            if then.is_zero() {
                literals.push((edge.id(), false));
                edge = self.else_edge(edge);
            } else {
                literals.push((edge.id(), true));
                edge = then;
            }
        }

        // The literals came out top-down; the cube is built bottom-up.
        let mut cube = Edge::ONE;
        for &(id, positive) in literals.iter().rev() {
            cube = if positive {
                self.mk_node(id, cube, Edge::ZERO)
            } else {
                self.mk_node(id, Edge::ZERO, cube)
            };
        }
        let handle = self.new_handle(cube);
        self.post_process(handle)
    }

    /// The number of satisfying assignments of `f` over a space of
    /// `num_vars` variables.
    pub fn sat_count(&self, f: Func, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let two = 2.to_biguint().expect("2 is a biguint");
        let max = two.pow(num_vars as u32);
        self.sat_count_edge(self.edge(f), &max, &mut cache)
    }

    fn sat_count_edge(
        &self,
        edge: Edge,
        max: &BigUint,
        cache: &mut HashMap<Edge, BigUint>,
    ) -> BigUint {
        if edge.is_zero() {
            return BigUint::ZERO;
        } else if edge.is_one() {
            return max.clone();
        }
        if let Some(count) = cache.get(&edge) {
            return count.clone();
        }

        let live = self.live(edge.node);
        let count_low = self.sat_count_edge(live.els, max, cache);
        let count_high = self.sat_count_edge(live.then, max, cache);

        // Each stored branch fixes the node's variable, halving the space.
        let count: BigUint = (count_low + count_high) >> 1;
        let count = if edge.is_complement() { max - count } else { count };

        cache.insert(edge, count.clone());
        count
    }

    /// The fraction of the assignment space satisfying `f`, in [0, 1].
    /// Independent of the number of variables in the manager.
    pub fn satisfying_fraction(&self, f: Func) -> f64 {
        let mut cache = HashMap::new();
        self.fraction_edge(self.edge(f), &mut cache)
    }

    fn fraction_edge(&self, edge: Edge, cache: &mut HashMap<Edge, f64>) -> f64 {
        if edge.is_zero() {
            return 0.0;
        } else if edge.is_one() {
            return 1.0;
        }
        if let Some(&fraction) = cache.get(&edge) {
            return fraction;
        }

        let live = self.live(edge.node);
        let low = self.fraction_edge(live.els, cache);
        let high = self.fraction_edge(live.then, cache);
        let fraction = (low + high) / 2.0;
        let fraction = if edge.is_complement() {
            1.0 - fraction
        } else {
            fraction
        };

        cache.insert(edge, fraction);
        fraction
    }

    /// Evaluates `f` under a total assignment indexed by variable id minus
    /// one.
    pub(crate) fn eval_edge(&self, edge: Edge, assignment: &[bool]) -> bool {
        let mut edge = edge;
        loop {
            if edge.is_one() {
                return true;
            }
            if edge.is_zero() {
                return false;
            }
            edge = if assignment[edge.id() as usize - 1] {
                self.then_edge(edge)
            } else {
                self.else_edge(edge)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Var;

    #[test]
    fn test_satisfy_returns_an_implicant() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let bc = bdd.or(b, c).unwrap();
        let f = bdd.and(a, bc).unwrap();

        let cube = bdd.satisfy(f).unwrap();
        assert!(!bdd.is_zero(cube));
        assert!(bdd.implies(cube, f).unwrap());
    }

    #[test]
    fn test_satisfy_of_zero() {
        let mut bdd = Bdd::new(1);
        let zero = bdd.zero();
        let cube = bdd.satisfy(zero).unwrap();
        assert!(bdd.is_zero(cube));
    }

    #[test]
    fn test_satisfy_follows_the_else_branch() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let na = bdd.not(a);
        let cube = bdd.satisfy(na).unwrap();
        assert!(bdd.equal(cube, na));
    }

    #[test]
    fn test_sat_count_terminal() {
        let mut bdd = Bdd::new(3);
        let zero = bdd.zero();
        let one = bdd.one();
        assert_eq!(bdd.sat_count(zero, 3), 0.to_biguint().unwrap());
        assert_eq!(bdd.sat_count(one, 1), 2.to_biguint().unwrap());
        assert_eq!(bdd.sat_count(one, 3), 8.to_biguint().unwrap());
    }

    #[test]
    fn test_sat_count_var_and_cube() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        assert_eq!(bdd.sat_count(a, 1), 1.to_biguint().unwrap());
        assert_eq!(bdd.sat_count(a, 3), 4.to_biguint().unwrap());

        let ab = bdd.and(a, b).unwrap();
        assert_eq!(bdd.sat_count(ab, 2), 1.to_biguint().unwrap());
        assert_eq!(bdd.sat_count(ab, 4), 4.to_biguint().unwrap());
    }

    #[test]
    fn test_sat_count_complement() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let ab = bdd.and(a, b).unwrap();
        let nab = bdd.not(ab);
        assert_eq!(bdd.sat_count(nab, 2), 3.to_biguint().unwrap());
        assert_eq!(bdd.sat_count(nab, 3), 6.to_biguint().unwrap());
    }

    #[test]
    fn test_satisfying_fraction() {
        let mut bdd = Bdd::new(3);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        assert_eq!(bdd.satisfying_fraction(a), 0.5);

        let ab = bdd.and(a, b).unwrap();
        assert_eq!(bdd.satisfying_fraction(ab), 0.25);
        let nab = bdd.not(ab);
        assert_eq!(bdd.satisfying_fraction(nab), 0.75);

        let one = bdd.one();
        assert_eq!(bdd.satisfying_fraction(one), 1.0);
    }

    #[test]
    fn test_eval_edge_truth_table() {
        let mut bdd = Bdd::new(2);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let f = bdd.xor(a, b).unwrap();
        let edge = bdd.edge(f);
        assert!(!bdd.eval_edge(edge, &[false, false]));
        assert!(bdd.eval_edge(edge, &[true, false]));
        assert!(bdd.eval_edge(edge, &[false, true]));
        assert!(!bdd.eval_edge(edge, &[true, true]));
    }
}
