//! Tagged child references.
//!
//! An [`Edge`] is the only way one node refers to another: an arena address
//! plus a one-bit complement tag that negates the whole subgraph below it.
//! Complement edges halve the node count for free and make negation O(1),
//! at the price of a canonical-form rule enforced at node creation: a stored
//! node's then-edge is never complemented.

use std::fmt::{Display, Formatter};
use std::ops::Neg;

use crate::utils::{pairing2, MyHash};

/// Arena address of a node: the owning variable id plus the slot within that
/// variable's arena. Id 0, slot 0 is the terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId {
    pub(crate) id: u32,
    pub(crate) slot: u32,
}

impl NodeId {
    pub(crate) const TERMINAL: NodeId = NodeId { id: 0, slot: 0 };

    pub(crate) fn new(id: u32, slot: u32) -> Self {
        NodeId { id, slot }
    }

    pub(crate) fn is_terminal(self) -> bool {
        self.id == 0
    }
}

/// A reference to a node, possibly complemented.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Edge {
    pub(crate) node: NodeId,
    pub(crate) complement: bool,
}

impl Edge {
    /// The constant true function.
    pub(crate) const ONE: Edge = Edge {
        node: NodeId::TERMINAL,
        complement: false,
    };
    /// The constant false function.
    pub(crate) const ZERO: Edge = Edge {
        node: NodeId::TERMINAL,
        complement: true,
    };

    pub(crate) fn new(node: NodeId, complement: bool) -> Self {
        Edge { node, complement }
    }

    /// The id of the variable labeling the referenced node (0 for terminals).
    pub(crate) fn id(self) -> u32 {
        self.node.id
    }

    pub(crate) fn is_complement(self) -> bool {
        self.complement
    }

    pub(crate) fn is_const(self) -> bool {
        self.node.is_terminal()
    }

    pub(crate) fn is_one(self) -> bool {
        self == Edge::ONE
    }

    pub(crate) fn is_zero(self) -> bool {
        self == Edge::ZERO
    }

    /// The same edge with the complement tag cleared.
    pub(crate) fn regular(self) -> Self {
        Edge {
            node: self.node,
            complement: false,
        }
    }

    /// This edge negated if `flag` is set, unchanged otherwise.
    pub(crate) fn negate_if(self, flag: bool) -> Self {
        Edge {
            node: self.node,
            complement: self.complement ^ flag,
        }
    }

    /// Compact key for hashing; distinct edges map to distinct keys.
    pub(crate) fn key(self) -> u64 {
        ((self.node.id as u64) << 33) | ((self.node.slot as u64) << 1) | (self.complement as u64)
    }
}

impl Neg for Edge {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Edge {
            node: self.node,
            complement: !self.complement,
        }
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}.{}",
            if self.complement { "~" } else { "" },
            self.node.id,
            self.node.slot
        )
    }
}

impl MyHash for Edge {
    fn hash(&self) -> u64 {
        self.key()
    }
}

impl MyHash for (Edge, Edge) {
    fn hash(&self) -> u64 {
        pairing2(self.0.key(), self.1.key())
    }
}

impl MyHash for (Edge, Edge, Edge) {
    fn hash(&self) -> u64 {
        pairing2(pairing2(self.0.key(), self.1.key()), self.2.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_edges() {
        assert!(Edge::ONE.is_one());
        assert!(Edge::ZERO.is_zero());
        assert!(Edge::ONE.is_const());
        assert_eq!(-Edge::ONE, Edge::ZERO);
        assert_eq!(-(-Edge::ONE), Edge::ONE);
    }

    #[test]
    fn test_negate_if() {
        let e = Edge::new(NodeId::new(3, 7), false);
        assert_eq!(e.negate_if(false), e);
        assert_eq!(e.negate_if(true), -e);
        assert_eq!(e.negate_if(true).negate_if(true), e);
    }

    #[test]
    fn test_keys_are_distinct() {
        let a = Edge::new(NodeId::new(1, 0), false);
        let b = Edge::new(NodeId::new(1, 0), true);
        let c = Edge::new(NodeId::new(2, 0), false);
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_ne!(b.key(), c.key());
    }

    #[test]
    fn test_display() {
        let e = Edge::new(NodeId::new(2, 5), true);
        assert_eq!(e.to_string(), "~@2.5");
        assert_eq!((-e).to_string(), "@2.5");
    }
}
