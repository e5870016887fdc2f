//! Java parsing front-end.
//!
//! Wraps tree-sitter with the Java grammar and lowers the CST into a typed,
//! immutable [`ParseTree`] whose node variants carry statically-known
//! attributes. Everything downstream (segmentation, structural comparison)
//! works on the typed tree, never on the raw CST.

pub mod errors;
mod lower;
pub mod parser;
pub mod tree;

pub use errors::ParseError;
pub use parser::JavaParser;
pub use tree::{Declaration, Node, NodeId, NodeKind, ParseTree, Position};
