//! # bfdd: breadth-first Binary Decision Diagrams in Rust
//!
//! **`bfdd`** is a manager-centric library for working with **Binary Decision
//! Diagrams (BDDs)**, built around a breadth-first, level-synchronous operator
//! engine. It is designed for formal verification, static analysis, and
//! combinatorial optimization workloads where diagrams grow to millions of
//! nodes.
//!
//! ## What is a BDD?
//!
//! A Binary Decision Diagram represents a boolean function as a directed
//! acyclic graph. It is **canonical** --- for a fixed variable ordering, every
//! boolean function has exactly one representation --- which makes equivalence
//! checking a constant-time pointer comparison.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All operations go through the
//!   [`Bdd`] manager. Structural sharing (hash consing) and complement edges
//!   keep the canonical-form invariant at all times.
//! - **Breadth-First Operators**: AND/OR/XOR/ITE expand level by level
//!   through per-variable request queues instead of recursing on the graph,
//!   so nodes of one variable are processed together.
//! - **Opaque Handles**: User code holds lightweight [`Func`] handles backed
//!   by reference counts; garbage collection and dynamic reordering never
//!   invalidate a held handle.
//! - **Dynamic Reordering**: Rudell sifting and window permutation over an
//!   interaction matrix, with batched forwarding-stub reclamation.
//! - **Rich API**: quantification, substitution, relational products, model
//!   counting and a binary dump format.
//!
//! ## Basic Usage
//!
//! ```rust
//! use bfdd::{Bdd, Var};
//!
//! // 1. Initialize the manager with two variables.
//! let mut bdd = Bdd::new(2);
//!
//! // 2. Take their projection functions (ids are 1-indexed).
//! let x1 = bdd.var(Var::new(1));
//! let x2 = bdd.var(Var::new(2));
//!
//! // 3. Build a formula: f = x1 AND (NOT x2).
//! let not_x2 = bdd.not(x2);
//! let f = bdd.and(x1, not_x2).unwrap();
//!
//! // 4. Check properties.
//! assert!(!bdd.is_zero(f)); // satisfiable
//! assert!(!bdd.is_one(f)); // not a tautology
//!
//! // 5. Pin x1 = 1, x2 = 0 and check the result.
//! let cube = bdd.and(x1, not_x2).unwrap();
//! let res = bdd.cofactor(f, cube).unwrap();
//! assert!(bdd.is_one(res));
//! ```
//!
//! ## Core Components
//!
//! - **[`manager`]**: the [`Bdd`] manager, handles and shared state.
//! - **[`apply`]**: the breadth-first boolean operator engine.
//! - **[`reorder`]**: dynamic variable reordering.
//! - **[`sat`]**: satisfying assignments and model counting.
//! - **[`dump`]**: binary serialization of single functions.

pub mod apply;
pub mod arena;
pub mod assoc;
pub mod cache;
pub mod dump;
pub mod edge;
pub mod gc;
pub mod interact;
pub mod manager;
pub mod node;
pub mod quant;
pub mod reorder;
pub mod sat;
pub mod size;
pub mod subst;
pub mod types;
pub mod unique;
pub mod utils;

pub use assoc::TEMP_ASSOC;
pub use manager::{Bdd, BddStats, Func};
pub use reorder::ReorderStats;
pub use types::{BddConfig, BddError, Level, ReorderTechnique, Var};
