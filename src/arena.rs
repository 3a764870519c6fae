//! Paged node storage.
//!
//! Each variable owns an [`Arena`] of node slots. Slots are carved out of
//! fixed-size pages obtained from the shared [`PageManager`], and freed slots
//! are threaded onto a per-arena free list so allocation and deallocation are
//! O(1). Repacking moves live nodes into the leading pages and returns the
//! trailing pages to the page manager.

use crate::node::{LiveNode, Node, NIL};

/// Node slots per page.
pub(crate) const NODES_PER_PAGE: usize = 1024;

type Page = Box<[Node]>;

fn blank_page() -> Page {
    vec![Node::Free { next: NIL }; NODES_PER_PAGE].into_boxed_slice()
}

/// Allocator boundary: hands out and recycles whole pages. Arenas never hold
/// node memory that did not come from here.
#[derive(Debug, Default)]
pub(crate) struct PageManager {
    recycled: Vec<Page>,
    pages_in_use: usize,
}

impl PageManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_page(&mut self) -> Page {
        self.pages_in_use += 1;
        match self.recycled.pop() {
            Some(mut page) => {
                page.fill(Node::Free { next: NIL });
                page
            }
            None => blank_page(),
        }
    }

    pub(crate) fn free_page(&mut self, page: Page) {
        self.pages_in_use -= 1;
        self.recycled.push(page);
    }

    pub(crate) fn pages_in_use(&self) -> usize {
        self.pages_in_use
    }
}

/// Per-variable slot storage with an O(1) free list.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    pages: Vec<Page>,
    free: u32,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Arena {
            pages: Vec::new(),
            free: NIL,
        }
    }

    pub(crate) fn num_pages(&self) -> usize {
        self.pages.len()
    }

    pub(crate) fn num_slots(&self) -> usize {
        self.pages.len() * NODES_PER_PAGE
    }

    pub(crate) fn node(&self, slot: u32) -> &Node {
        &self.pages[slot as usize / NODES_PER_PAGE][slot as usize % NODES_PER_PAGE]
    }

    pub(crate) fn node_mut(&mut self, slot: u32) -> &mut Node {
        &mut self.pages[slot as usize / NODES_PER_PAGE][slot as usize % NODES_PER_PAGE]
    }

    /// Allocates a slot for `live`, growing by one page when the free list is
    /// exhausted.
    pub(crate) fn alloc(&mut self, pages: &mut PageManager, live: LiveNode) -> u32 {
        if self.free == NIL {
            self.grow(pages);
        }
        let slot = self.free;
        match *self.node(slot) {
            Node::Free { next } => self.free = next,
            _ => unreachable!("free list points at a non-free slot"),
        }
        *self.node_mut(slot) = Node::Live(live);
        slot
    }

    /// Returns a slot to the free list. The slot may currently be live or a
    /// forwarding stub.
    pub(crate) fn free(&mut self, slot: u32) {
        *self.node_mut(slot) = Node::Free { next: self.free };
        self.free = slot;
    }

    fn grow(&mut self, pages: &mut PageManager) {
        let page = pages.allocate_page();
        let base = (self.pages.len() * NODES_PER_PAGE) as u32;
        self.pages.push(page);
        // Thread the fresh page onto the free list back to front.
        for offset in (0..NODES_PER_PAGE as u32).rev() {
            let slot = base + offset;
            *self.node_mut(slot) = Node::Free { next: self.free };
            self.free = slot;
        }
    }

    /// Rebuilds the free list to cover exactly the free slots of the first
    /// `keep_pages` pages, returns every later page to the page manager, and
    /// leaves the kept pages untouched otherwise. Callers must have moved all
    /// live nodes out of the dropped pages first.
    pub(crate) fn truncate(&mut self, pages: &mut PageManager, keep_pages: usize) {
        debug_assert!(keep_pages <= self.pages.len());
        while self.pages.len() > keep_pages {
            let page = self.pages.pop().expect("page count checked above");
            debug_assert!(page.iter().all(|n| !n.is_live()));
            pages.free_page(page);
        }
        self.free = NIL;
        for slot in (0..(keep_pages * NODES_PER_PAGE) as u32).rev() {
            if let Node::Free { .. } = *self.node(slot) {
                *self.node_mut(slot) = Node::Free { next: self.free };
                self.free = slot;
            }
        }
    }

    /// Iterates over the slots of live nodes.
    pub(crate) fn live_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().enumerate().flat_map(|(p, page)| {
            page.iter().enumerate().filter_map(move |(i, node)| {
                if node.is_live() {
                    Some((p * NODES_PER_PAGE + i) as u32)
                } else {
                    None
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;

    fn live(refs: u16) -> LiveNode {
        LiveNode {
            then: Edge::ONE,
            els: Edge::ZERO,
            refs,
            next: NIL,
        }
    }

    #[test]
    fn test_alloc_and_free() {
        let mut pages = PageManager::new();
        let mut arena = Arena::new();

        let a = arena.alloc(&mut pages, live(1));
        let b = arena.alloc(&mut pages, live(2));
        assert_ne!(a, b);
        assert_eq!(arena.node(a).as_live().refs, 1);
        assert_eq!(arena.node(b).as_live().refs, 2);

        arena.free(a);
        let c = arena.alloc(&mut pages, live(3));
        // The freed slot is reused before a new page is touched.
        assert_eq!(c, a);
        assert_eq!(arena.num_pages(), 1);
    }

    #[test]
    fn test_grows_page_by_page() {
        let mut pages = PageManager::new();
        let mut arena = Arena::new();

        for _ in 0..NODES_PER_PAGE {
            arena.alloc(&mut pages, live(1));
        }
        assert_eq!(arena.num_pages(), 1);
        arena.alloc(&mut pages, live(1));
        assert_eq!(arena.num_pages(), 2);
        assert_eq!(pages.pages_in_use(), 2);
    }

    #[test]
    fn test_truncate_returns_pages() {
        let mut pages = PageManager::new();
        let mut arena = Arena::new();

        let mut slots = Vec::new();
        for _ in 0..2 * NODES_PER_PAGE {
            slots.push(arena.alloc(&mut pages, live(1)));
        }
        // Empty the second page, then shrink to one page.
        for &slot in &slots[NODES_PER_PAGE..] {
            arena.free(slot);
        }
        arena.truncate(&mut pages, 1);
        assert_eq!(arena.num_pages(), 1);
        assert_eq!(pages.pages_in_use(), 1);
        assert_eq!(arena.live_slots().count(), NODES_PER_PAGE);

        // The recycled page is reused on the next growth.
        for _ in 0..NODES_PER_PAGE {
            arena.alloc(&mut pages, live(1));
        }
        assert_eq!(arena.num_pages(), 2);
    }
}
