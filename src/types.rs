//! Type-safe wrappers for BDD variables and levels, the manager configuration,
//! and the error taxonomy.
//!
//! A variable has two independent coordinates: a permanent *id* assigned at
//! creation (never reused), and a volatile *index* giving its position in the
//! current variable order. Reordering changes indices, never ids.

use std::fmt;

/// A variable identifier (1-indexed).
///
/// Variables represent Boolean decision points in a BDD. Unlike levels,
/// variable IDs are stable across reordering operations.
///
/// # Invariants
///
/// - Variable IDs must be >= 1 (0 is reserved for terminals)
/// - Variable IDs are independent of their position in the variable ordering
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Creates a new variable with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Variables must be 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    /// Returns the raw variable ID as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<Var> for u32 {
    fn from(var: Var) -> Self {
        var.0
    }
}

/// A level in the variable ordering (0-indexed).
///
/// Levels represent the position of a variable in the current ordering.
/// Level 0 is the topmost level; levels increase downward toward terminals.
/// After reordering, the same variable may be at a different level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Level(usize);

impl Level {
    /// Creates a new level with the given index.
    pub fn new(index: usize) -> Self {
        Level(index)
    }

    /// Returns the raw level index as a `usize`.
    pub fn index(self) -> usize {
        self.0
    }

    /// Returns the next level down (index + 1).
    pub fn next(self) -> Self {
        Level(self.0 + 1)
    }

    /// Returns the previous level up (index - 1), or None if at level 0.
    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Level(self.0 - 1))
        } else {
            None
        }
    }

    /// Checks if this is the top level (level 0).
    pub fn is_top(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl From<Level> for usize {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl From<usize> for Level {
    fn from(index: usize) -> Self {
        Level(index)
    }
}

/// Dynamic variable reordering technique.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ReorderTechnique {
    /// Never reorder.
    #[default]
    None,
    /// Rudell sifting: move the heaviest variable through all positions and
    /// commit it to the best one.
    Sift,
    /// Sliding window of 2-3 adjacent levels, trying all permutations.
    Window,
}

/// Node count below which garbage collection is never scheduled automatically.
pub const MIN_GC_LIMIT: usize = 10_000;
/// New nodes created between two automatic garbage collection checks.
pub const GC_CHECK: i64 = 100;
/// Post-GC occupancy ratio below which a level is considered for repacking.
pub const REPACK_AFTER_GC_THRESHOLD: f64 = 0.75;
/// Number of allocated pages above which repacking is considered at all.
pub const NUM_PAGES_THRESHOLD: usize = 3;
/// Initial size (log2 of bucket count) of every unique table.
pub const HASH_TABLE_DEFAULT_SIZE_INDEX: u32 = 8;
/// Average chain length that triggers a unique table rehash.
pub const HASH_TABLE_MAX_DENSITY: usize = 5;

/// Tuning knobs consumed at manager creation and mutable afterward.
///
/// The defaults reproduce the behavior of a manager with garbage collection
/// on, no node limit, and no automatic reordering.
#[derive(Debug, Clone)]
pub struct BddConfig {
    /// Hard cap on the number of live nodes; 0 means unlimited. Exceeding the
    /// cap makes the current operation fail with [`BddError::Overflow`].
    pub node_limit: usize,
    /// Automatic garbage collection on/off.
    pub gc_enabled: bool,
    /// Reordering technique applied by [`crate::Bdd::reorder`] and by the
    /// automatic trigger.
    pub reorder_technique: ReorderTechnique,
    /// Minimum live node count before automatic reordering is considered.
    pub reorder_threshold: usize,
    /// Maximum outstanding forwarding stubs before a forced reclamation pass
    /// during reordering.
    pub max_forwarded_nodes: usize,
    /// Upper bound on adjacent swaps per reordering invocation.
    pub max_swaps: usize,
    /// Upper bound on variables sifted per reordering invocation.
    pub max_vars_sifted: usize,
    /// A sifted variable abandons its search once the total node count grows
    /// past `sifting_growth` times the starting size.
    pub sifting_growth: f64,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            node_limit: 0,
            gc_enabled: true,
            reorder_technique: ReorderTechnique::None,
            reorder_threshold: 10_000,
            max_forwarded_nodes: 50_000,
            max_swaps: 2_000_000,
            max_vars_sifted: 1000,
            sifting_growth: 2.0,
        }
    }
}

/// Errors surfaced by the public operation surface.
///
/// Node-limit overflow is recoverable: the manager keeps a consistent
/// structure, the caller may raise the limit or release handles and retry.
/// Usage errors (releasing a dead handle, unknown variables) are reported
/// through the warning log and a best-effort fallback instead.
#[derive(Debug)]
pub enum BddError {
    /// The configured node limit was exceeded during an operation. The
    /// manager-wide overflow flag is set and must be cleared by the caller.
    Overflow,
    /// A dump stream did not start with the expected magic word.
    BadMagic,
    /// A dump stream was malformed or truncated.
    BadFormat,
    /// A dump stream referenced a variable outside the provided support.
    UnknownVariable,
    /// Reading or writing a dump stream failed.
    Io(std::io::Error),
}

impl fmt::Display for BddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BddError::Overflow => write!(f, "node limit exceeded"),
            BddError::BadMagic => write!(f, "bad magic word in dump stream"),
            BddError::BadFormat => write!(f, "malformed dump stream"),
            BddError::UnknownVariable => write!(f, "dump stream references an unknown variable"),
            BddError::Io(e) => write!(f, "dump i/o error: {}", e),
        }
    }
}

impl std::error::Error for BddError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BddError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BddError {
    fn from(e: std::io::Error) -> Self {
        BddError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_creation() {
        let v1 = Var::new(1);
        let v2 = Var::new(2);
        assert_eq!(v1.id(), 1);
        assert_eq!(v2.id(), 2);
        assert!(v1 < v2);
    }

    #[test]
    #[should_panic(expected = "Variable IDs must be >= 1")]
    fn test_var_zero_panics() {
        Var::new(0);
    }

    #[test]
    fn test_level_navigation() {
        let l0 = Level::new(0);
        let l1 = l0.next();

        assert_eq!(l1.prev(), Some(l0));
        assert_eq!(l0.prev(), None);
        assert!(l0.is_top());
        assert!(!l1.is_top());
    }

    #[test]
    fn test_default_config() {
        let config = BddConfig::default();
        assert_eq!(config.node_limit, 0);
        assert!(config.gc_enabled);
        assert_eq!(config.reorder_technique, ReorderTechnique::None);
    }
}
