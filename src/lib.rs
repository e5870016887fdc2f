//! RenameGuard: structural-equivalence verification for Java refactoring
//!
//! A verification and segmentation engine built on lockstep parse-tree
//! comparison with tree-sitter integration for Java parsing. Source files are
//! segmented at declaration boundaries into marker-addressed chunks sized for
//! piecewise mutation; every mutated chunk is substituted back, re-parsed,
//! and proven equivalent to the original with nothing but identifier renames
//! between them.
//!
//! # Architecture
//!
//! All verification compiles down to a single primitive: [`compare`], which
//! walks two parse trees in lockstep pre-order and pairs nodes by traversal
//! rank. Intelligence lives in the lowering (a closed, typed node kind per
//! grammar construct) and in segment framing (brace balancing, indentation
//! normalization), not in the comparison logic.
//!
//! # Safety
//!
//! - Every reported rename position is verified against the source bytes
//! - Atomic file writes (tempfile + fsync + rename)
//! - Project root boundary enforcement
//! - Marker round trips are byte-exact
//! - Nothing reaches disk unverified
//!
//! # Example
//!
//! ```no_run
//! use renameguard::ast::JavaParser;
//! use renameguard::compare;
//!
//! let mut parser = JavaParser::new()?;
//! let before = parser.parse("class A { void f() { } }")?;
//! let after = parser.parse("class A { void g() { } }")?;
//!
//! let diffs = compare::compare(&before, &after, "class A { void f() { } }")?;
//! for diff in &diffs {
//!     println!("{diff}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod balance;
pub mod compare;
pub mod project;
pub mod refactor;
pub mod segment;

// Re-exports
pub use ast::{JavaParser, NodeKind, ParseError, ParseTree, Position};
pub use balance::{BalanceError, BalanceKind, BalanceResult};
pub use compare::{CompareError, CompareMode, IdentifierDifference, StructuralMismatch};
pub use project::{atomic_write, load_standards, ProjectError, ProjectFiles};
pub use refactor::{
    MutationSource, RefactorEngine, RefactorError, SegmentOutcome, SegmentStatus, SessionReport,
};
pub use segment::LabelError;
