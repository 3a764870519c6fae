//! Variable associations.
//!
//! An association maps variables to replacement functions. Quantification
//! reads it as the set of variables to quantify out (each variable associated
//! with its own projection), substitution as the substitution map. The
//! manager keeps any number of named associations plus one unnamed temporary
//! association, and exactly one of them is *current* at a time.
//!
//! Association targets are counted references into the node graph, so the
//! functions an association points at survive garbage collection, and
//! reordering fixes the stored edges up along with the user handles.

use log::warn;

use crate::edge::Edge;
use crate::manager::{Bdd, Func};
use crate::types::Var;

/// The id of the temporary association, usable with
/// [`Bdd::assoc_set_current`].
pub const TEMP_ASSOC: isize = -1;

#[derive(Debug, Default)]
pub(crate) struct Assoc {
    /// (variable id, associated function), unordered.
    pub(crate) pairs: Vec<(u32, Edge)>,
}

impl Assoc {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Bdd {
    fn collect_pairs(&mut self, pairs: &[(Var, Func)]) -> Vec<(u32, Edge)> {
        let mut out = Vec::with_capacity(pairs.len());
        for &(var, f) in pairs {
            let edge = self.edge(f);
            self.icr_edge(edge);
            out.push((var.id(), edge));
        }
        out
    }

    fn collect_projection_pairs(&mut self, vars: &[Var]) -> Vec<(u32, Edge)> {
        // Projections are saturated, so no counting is needed, but going
        // through the same path keeps release uniform.
        let mut out = Vec::with_capacity(vars.len());
        for &var in vars {
            let edge = self.var_edges[var.id() as usize];
            self.icr_edge(edge);
            out.push((var.id(), edge));
        }
        out
    }

    fn drop_pairs(&mut self, pairs: Vec<(u32, Edge)>) {
        for (_, edge) in pairs {
            self.dcr_edge(edge);
        }
    }

    fn store_assoc(&mut self, assoc: Assoc) -> usize {
        if let Some(index) = self.assocs.iter().position(Option::is_none) {
            self.assocs[index] = Some(assoc);
            index
        } else {
            self.assocs.push(Some(assoc));
            self.assocs.len() - 1
        }
    }

    /// Creates a named association mapping each variable to a function.
    /// Returns its id.
    pub fn assoc_create(&mut self, pairs: &[(Var, Func)]) -> usize {
        let pairs = self.collect_pairs(pairs);
        self.store_assoc(Assoc { pairs })
    }

    /// Creates a named association marking each variable for quantification
    /// (the variable maps to its own projection). Returns its id.
    pub fn assoc_create_vars(&mut self, vars: &[Var]) -> usize {
        let pairs = self.collect_projection_pairs(vars);
        self.store_assoc(Assoc { pairs })
    }

    /// Makes the association `id` current ([`TEMP_ASSOC`] for the temporary
    /// one) and returns the previously current id. An unknown id is reported
    /// and ignored.
    pub fn assoc_set_current(&mut self, id: isize) -> isize {
        let old = self.current_assoc;
        if id == TEMP_ASSOC
            || (id >= 0 && matches!(self.assocs.get(id as usize), Some(Some(_))))
        {
            self.current_assoc = id;
        } else {
            warn!("unknown association id {}", id);
        }
        old
    }

    /// Frees a named association, releasing its targets. If it was current,
    /// the temporary association becomes current.
    pub fn assoc_free(&mut self, id: usize) {
        match self.assocs.get_mut(id) {
            Some(slot @ Some(_)) => {
                let assoc = slot.take().expect("checked occupied above");
                self.drop_pairs(assoc.pairs);
                if self.current_assoc == id as isize {
                    self.current_assoc = TEMP_ASSOC;
                }
            }
            _ => warn!("freeing unknown association id {}", id),
        }
    }

    /// Fills the temporary association. With `augment` set, existing pairs
    /// for other variables are kept; a pair for the same variable is
    /// replaced.
    pub fn temp_assoc_set(&mut self, pairs: &[(Var, Func)], augment: bool) {
        let pairs = self.collect_pairs(pairs);
        self.temp_assoc_install(pairs, augment);
    }

    /// Fills the temporary association with quantification markers.
    pub fn temp_assoc_vars(&mut self, vars: &[Var], augment: bool) {
        let pairs = self.collect_projection_pairs(vars);
        self.temp_assoc_install(pairs, augment);
    }

    fn temp_assoc_install(&mut self, pairs: Vec<(u32, Edge)>, augment: bool) {
        if !augment {
            let old = std::mem::take(&mut self.temp_assoc.pairs);
            self.drop_pairs(old);
        }
        for (id, edge) in pairs {
            if let Some(pos) = self.temp_assoc.pairs.iter().position(|&(v, _)| v == id) {
                let (_, old) = self.temp_assoc.pairs[pos];
                self.temp_assoc.pairs[pos] = (id, edge);
                self.dcr_edge(old);
            } else {
                self.temp_assoc.pairs.push((id, edge));
            }
        }
    }

    /// Empties the temporary association.
    pub fn temp_assoc_clear(&mut self) {
        let old = std::mem::take(&mut self.temp_assoc.pairs);
        self.drop_pairs(old);
    }

    pub(crate) fn current_assoc_pairs(&self) -> &[(u32, Edge)] {
        if self.current_assoc == TEMP_ASSOC {
            &self.temp_assoc.pairs
        } else {
            match &self.assocs[self.current_assoc as usize] {
                Some(assoc) => &assoc.pairs,
                None => &[],
            }
        }
    }

    pub(crate) fn current_assoc_get(&self, id: u32) -> Option<Edge> {
        self.current_assoc_pairs()
            .iter()
            .find(|&&(v, _)| v == id)
            .map(|&(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_association_lifecycle() {
        let mut bdd = Bdd::new(3);
        let f = bdd.var(Var::new(2));
        let id = bdd.assoc_create(&[(Var::new(1), f)]);

        let old = bdd.assoc_set_current(id as isize);
        assert_eq!(old, TEMP_ASSOC);
        assert_eq!(bdd.current_assoc_pairs().len(), 1);
        assert!(bdd.current_assoc_get(1).is_some());
        assert!(bdd.current_assoc_get(2).is_none());

        bdd.assoc_free(id);
        assert_eq!(bdd.current_assoc, TEMP_ASSOC);
        assert!(bdd.current_assoc_pairs().is_empty());
    }

    #[test]
    fn test_temp_association_augment_replaces_same_var() {
        let mut bdd = Bdd::new(3);
        let f = bdd.var(Var::new(2));
        let g = bdd.var(Var::new(3));

        bdd.temp_assoc_set(&[(Var::new(1), f)], false);
        bdd.temp_assoc_set(&[(Var::new(1), g), (Var::new(2), g)], true);
        assert_eq!(bdd.current_assoc_pairs().len(), 2);
        let target = bdd.current_assoc_get(1).unwrap();
        assert_eq!(target, bdd.edge(g));

        bdd.temp_assoc_clear();
        assert!(bdd.current_assoc_pairs().is_empty());
    }

    #[test]
    fn test_quantification_association_maps_to_projections() {
        let mut bdd = Bdd::new(2);
        let id = bdd.assoc_create_vars(&[Var::new(2)]);
        bdd.assoc_set_current(id as isize);
        let target = bdd.current_assoc_get(2).unwrap();
        assert_eq!(target, bdd.var_edges[2]);
    }
}
