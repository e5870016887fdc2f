use crate::ast::errors::ParseError;
use crate::ast::lower;
use crate::ast::tree::ParseTree;
use tree_sitter::Parser;

/// Tree-sitter parser wrapper for Java source code.
///
/// Parses a source text and lowers the raw CST into a typed [`ParseTree`].
/// Trees containing ERROR or MISSING nodes are rejected: equivalence checks
/// are only meaningful over fully-formed parses.
pub struct JavaParser {
    parser: Parser,
}

impl JavaParser {
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_java::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|_| ParseError::LanguageSet)?;
        Ok(Self { parser })
    }

    /// Parse source text into a typed tree.
    pub fn parse(&mut self, source: &str) -> Result<ParseTree, ParseError> {
        let cst = self
            .parser
            .parse(source, None)
            .ok_or(ParseError::ParseFailed)?;

        if let Some(bad) = first_error_node(cst.root_node()) {
            let point = bad.start_position();
            return Err(ParseError::Syntax {
                line: point.row + 1,
                column: point.column + 1,
            });
        }

        Ok(lower::lower(cst.root_node(), source))
    }
}

/// Find the first ERROR or MISSING node in the CST, if any.
fn first_error_node(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    for i in 0..node.child_count() {
        if let Some(found) = node.child(i).and_then(first_error_node) {
            return Some(found);
        }
    }
    None
}
