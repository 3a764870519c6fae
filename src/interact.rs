//! Variable interaction matrix.
//!
//! Two variables *interact* when some externally held function depends on
//! both. A swap of two adjacent non-interacting variables cannot create or
//! destroy a single node, so reordering relabels the pair in O(1) instead of
//! rebuilding the upper level. One bit per unordered id pair, packed into an
//! upper-triangular bitvector.

use std::collections::HashSet;

use log::debug;

use crate::manager::Bdd;

#[derive(Debug)]
pub(crate) struct InteractionMatrix {
    words: Vec<u64>,
    /// Number of variables covered (ids 1..=n).
    n: usize,
}

impl InteractionMatrix {
    pub(crate) fn new(n: usize) -> Self {
        let bits = n * n.saturating_sub(1) / 2;
        InteractionMatrix {
            words: vec![0; bits.div_ceil(64)],
            n,
        }
    }

    /// Bit position of the 0-based pair `x < y` in the packed triangle.
    fn posn(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < y && y < self.n);
        ((((self.n << 1) - x - 3) * x) >> 1) + y - 1
    }

    fn order(&self, a: u32, b: u32) -> (usize, usize) {
        let (x, y) = if a < b { (a, b) } else { (b, a) };
        ((x - 1) as usize, (y - 1) as usize)
    }

    pub(crate) fn set(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        let (x, y) = self.order(a, b);
        let posn = self.posn(x, y);
        self.words[posn / 64] |= 1 << (posn % 64);
    }

    pub(crate) fn test(&self, a: u32, b: u32) -> bool {
        if a == b {
            return true;
        }
        let (x, y) = self.order(a, b);
        let posn = self.posn(x, y);
        self.words[posn / 64] >> (posn % 64) & 1 != 0
    }
}

impl Bdd {
    /// Builds the interaction matrix from every externally held root by one
    /// depth-first support scan per root.
    pub(crate) fn build_interactions(&mut self) {
        let n = self.subtables.len() - 1;
        let mut matrix = InteractionMatrix::new(n);
        for root in self.external_root_edges() {
            if root.is_const() {
                continue;
            }
            let mut support = Vec::new();
            let mut seen_vars = vec![false; n + 1];
            let mut visited = HashSet::new();
            let mut stack = vec![root.node];
            while let Some(node) = stack.pop() {
                if node.is_terminal() || !visited.insert(node) {
                    continue;
                }
                if !seen_vars[node.id as usize] {
                    seen_vars[node.id as usize] = true;
                    support.push(node.id);
                }
                let live = self.live(node);
                stack.push(live.then.node);
                stack.push(live.els.node);
            }
            for (i, &a) in support.iter().enumerate() {
                for &b in &support[i + 1..] {
                    matrix.set(a, b);
                }
            }
        }
        debug!("interaction matrix rebuilt over {} variables", n);
        self.interact = Some(matrix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Var;

    #[test]
    fn test_triangle_layout_is_injective() {
        let m = InteractionMatrix::new(6);
        let mut seen = HashSet::new();
        for x in 0..5 {
            for y in (x + 1)..6 {
                assert!(seen.insert(m.posn(x, y)), "pair ({x},{y}) collides");
            }
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn test_set_and_test_unordered() {
        let mut m = InteractionMatrix::new(4);
        m.set(3, 1);
        assert!(m.test(1, 3));
        assert!(m.test(3, 1));
        assert!(!m.test(1, 2));
        assert!(m.test(2, 2));
    }

    #[test]
    fn test_interactions_follow_support() {
        let mut bdd = Bdd::new(4);
        let a = bdd.var(Var::new(1));
        let b = bdd.var(Var::new(2));
        let c = bdd.var(Var::new(3));
        let ab = bdd.and(a, b).unwrap();
        bdd.release(a);
        bdd.release(b);
        bdd.release(c);
        let _ = ab;

        bdd.build_interactions();
        let matrix = bdd.interact.as_ref().unwrap();
        assert!(matrix.test(1, 2));
        assert!(!matrix.test(1, 3));
        assert!(!matrix.test(3, 4));
    }
}
