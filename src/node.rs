//! Node slots.
//!
//! Every slot in a variable's arena is in one of three states: free (linked
//! into the arena's free list), live (a canonical node), or forwarded (a stub
//! left behind by reordering or repacking, redirecting old parents to the
//! node's replacement until the next reclamation pass).

use crate::edge::Edge;

/// Reference counts saturate here; a saturated node is locked and never
/// collected. Constants and variable projections are created saturated.
pub(crate) const MAX_REF_COUNT: u16 = 255;

/// Bucket-chain terminator for unique tables and free lists.
pub(crate) const NIL: u32 = u32::MAX;

/// A live canonical node. The then-edge is never complemented.
#[derive(Debug, Copy, Clone)]
pub(crate) struct LiveNode {
    pub(crate) then: Edge,
    pub(crate) els: Edge,
    pub(crate) refs: u16,
    /// Next slot in the same unique-table bucket.
    pub(crate) next: u32,
}

impl LiveNode {
    pub(crate) fn icr(&mut self) {
        if self.refs < MAX_REF_COUNT {
            self.refs += 1;
        }
    }

    /// Decrements the count unless saturated. Returns false on underflow,
    /// which is a caller error.
    pub(crate) fn dcr(&mut self) -> bool {
        if self.refs == MAX_REF_COUNT {
            true
        } else if self.refs > 0 {
            self.refs -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn add_refs(&mut self, delta: i32) {
        if self.refs == MAX_REF_COUNT {
            return;
        }
        let refs = self.refs as i32 + delta;
        debug_assert!(refs >= 0, "reference count underflow");
        self.refs = refs.clamp(0, MAX_REF_COUNT as i32) as u16;
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) enum Node {
    Free { next: u32 },
    Live(LiveNode),
    Forwarded(Edge),
}

impl Node {
    pub(crate) fn is_live(&self) -> bool {
        matches!(self, Node::Live(_))
    }

    pub(crate) fn is_forwarded(&self) -> bool {
        matches!(self, Node::Forwarded(_))
    }

    pub(crate) fn as_live(&self) -> &LiveNode {
        match self {
            Node::Live(live) => live,
            _ => panic!("expected a live node"),
        }
    }

    pub(crate) fn as_live_mut(&mut self) -> &mut LiveNode {
        match self {
            Node::Live(live) => live,
            _ => panic!("expected a live node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refcount_saturation() {
        let mut node = LiveNode {
            then: Edge::ONE,
            els: Edge::ZERO,
            refs: MAX_REF_COUNT,
            next: NIL,
        };
        node.icr();
        assert_eq!(node.refs, MAX_REF_COUNT);
        assert!(node.dcr());
        assert_eq!(node.refs, MAX_REF_COUNT);
    }

    #[test]
    fn test_refcount_underflow_reported() {
        let mut node = LiveNode {
            then: Edge::ONE,
            els: Edge::ZERO,
            refs: 1,
            next: NIL,
        };
        assert!(node.dcr());
        assert_eq!(node.refs, 0);
        assert!(!node.dcr());
    }

    #[test]
    fn test_add_refs() {
        let mut node = LiveNode {
            then: Edge::ONE,
            els: Edge::ZERO,
            refs: 5,
            next: NIL,
        };
        node.add_refs(3);
        assert_eq!(node.refs, 8);
        node.add_refs(-2);
        assert_eq!(node.refs, 6);
        node.add_refs(1000);
        assert_eq!(node.refs, MAX_REF_COUNT);
    }
}
