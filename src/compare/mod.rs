//! Structural comparison of two parse trees.
//!
//! The comparator walks both trees in lockstep pre-order, pairing nodes by
//! traversal rank. Paired nodes must agree in kind and in every exact-value
//! attribute; identifier-bearing attributes may differ and each divergence is
//! collected as an [`IdentifierDifference`] anchored at the left tree's
//! source position. Any insertion, deletion, or reordering of syntax shows up
//! as a rank misalignment and fails the comparison before a single rename is
//! reported.

pub mod errors;

pub use errors::{CompareError, StructuralMismatch};

use crate::ast::{Node, NodeKind, ParseTree};
use serde::Serialize;

/// One identifier-bearing token that differs between the two trees (or, in
/// audit mode, every identifier-bearing token). `line`/`column` locate the
/// occurrence in the left tree's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierDifference {
    pub kind: &'static str,
    pub before: String,
    pub after: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for IdentifierDifference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}) {} -> {} @ ({}, {})",
            self.kind, self.before, self.after, self.line, self.column
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Record only identifiers that actually changed.
    ChangedOnly,
    /// Record every identifier-bearing occurrence, changed or not. Used to
    /// extract a complete rename map.
    Audit,
}

/// Compare two trees for structural equivalence, reporting identifier
/// changes.
///
/// `left_source` must be the untouched source the left tree was parsed from;
/// every reported position is verified against it before the result is
/// returned.
pub fn compare(
    left: &ParseTree,
    right: &ParseTree,
    left_source: &str,
) -> Result<Vec<IdentifierDifference>, CompareError> {
    compare_with(left, right, left_source, CompareMode::ChangedOnly)
}

pub fn compare_with(
    left: &ParseTree,
    right: &ParseTree,
    left_source: &str,
    mode: CompareMode,
) -> Result<Vec<IdentifierDifference>, CompareError> {
    if left.len() != right.len() {
        return Err(StructuralMismatch::Length {
            left: left.len(),
            right: right.len(),
        }
        .into());
    }

    let audit = mode == CompareMode::Audit;
    let mut diffs = Vec::new();
    for (a, b) in left.preorder().zip(right.preorder()) {
        compare_nodes(a, b, audit, &mut diffs)?;
    }

    verify_positions(&diffs, left_source)?;
    Ok(diffs)
}

fn exact<T: PartialEq + std::fmt::Debug>(
    node: &Node,
    attribute: &'static str,
    left: &T,
    right: &T,
) -> Result<(), CompareError> {
    if left != right {
        return Err(StructuralMismatch::Attribute {
            kind: node.kind.label(),
            attribute,
            left: format!("{left:?}"),
            right: format!("{right:?}"),
            position: node.position,
        }
        .into());
    }
    Ok(())
}

/// Record a plain `name` attribute divergence at the node's own position.
fn compare_named(
    node: &Node,
    before: &str,
    after: &str,
    audit: bool,
    diffs: &mut Vec<IdentifierDifference>,
) -> Result<(), CompareError> {
    if before == after && !audit {
        return Ok(());
    }
    let position = node.position.ok_or_else(|| CompareError::MissingPosition {
        kind: node.kind.label(),
        name: before.to_string(),
    })?;
    diffs.push(IdentifierDifference {
        kind: node.kind.label(),
        before: before.to_string(),
        after: after.to_string(),
        line: position.line,
        column: position.column,
    });
    Ok(())
}

/// Compare dotted reference sequences segment by segment. The recorded column
/// for segment `i` is the base column plus the lengths of all prior segments
/// plus one per dot.
fn compare_sequence(
    node: &Node,
    left: &str,
    right: &str,
    audit: bool,
    diffs: &mut Vec<IdentifierDifference>,
) -> Result<(), CompareError> {
    let segs_left: Vec<&str> = left.split('.').filter(|s| !s.is_empty()).collect();
    let segs_right: Vec<&str> = right.split('.').filter(|s| !s.is_empty()).collect();
    if segs_left.len() != segs_right.len() {
        return Err(StructuralMismatch::SequenceLength {
            kind: node.kind.label(),
            left: left.to_string(),
            right: right.to_string(),
            position: node.position,
        }
        .into());
    }

    let mut running = 0usize;
    for (seg_left, seg_right) in segs_left.iter().zip(&segs_right) {
        if seg_left != seg_right || audit {
            let position = node.position.ok_or_else(|| CompareError::MissingPosition {
                kind: node.kind.label(),
                name: (*seg_left).to_string(),
            })?;
            diffs.push(IdentifierDifference {
                kind: node.kind.label(),
                before: (*seg_left).to_string(),
                after: (*seg_right).to_string(),
                line: position.line,
                column: position.column + running,
            });
        }
        running += seg_left.len() + 1;
    }
    Ok(())
}

/// Compare a `member` attribute together with its optional dotted qualifier.
/// The node's position is recorded at the qualifier start, so the member
/// column is offset by the qualifier's length plus one.
fn compare_qualified(
    node: &Node,
    member_left: &str,
    qualifier_left: Option<&str>,
    member_right: &str,
    qualifier_right: Option<&str>,
    audit: bool,
    diffs: &mut Vec<IdentifierDifference>,
) -> Result<(), CompareError> {
    if qualifier_left.is_some() != qualifier_right.is_some() {
        return Err(StructuralMismatch::Attribute {
            kind: node.kind.label(),
            attribute: "qualifier shape",
            left: format!("{qualifier_left:?}"),
            right: format!("{qualifier_right:?}"),
            position: node.position,
        }
        .into());
    }

    if member_left != member_right || audit {
        let position = node.position.ok_or_else(|| CompareError::MissingPosition {
            kind: node.kind.label(),
            name: member_left.to_string(),
        })?;
        let offset = qualifier_left.map_or(0, |q| q.len() + 1);
        diffs.push(IdentifierDifference {
            kind: node.kind.label(),
            before: member_left.to_string(),
            after: member_right.to_string(),
            line: position.line,
            column: position.column + offset,
        });
    }

    if let (Some(q_left), Some(q_right)) = (qualifier_left, qualifier_right) {
        if q_left != q_right || audit {
            compare_sequence(node, q_left, q_right, audit, diffs)?;
        }
    }
    Ok(())
}

fn compare_nodes(
    a: &Node,
    b: &Node,
    audit: bool,
    diffs: &mut Vec<IdentifierDifference>,
) -> Result<(), CompareError> {
    if a.kind.label() != b.kind.label() {
        return Err(StructuralMismatch::Kind {
            left: a.kind.label(),
            right: b.kind.label(),
            position: a.position,
        }
        .into());
    }

    match (&a.kind, &b.kind) {
        // Required to match in kind, but carries no identity.
        (NodeKind::SuperInvocation, NodeKind::SuperInvocation) => {}

        (NodeKind::Package { name: n1 }, NodeKind::Package { name: n2 }) => {
            exact(a, "names", n1, n2)?;
            if audit {
                compare_named(a, n1, n2, audit, diffs)?;
            }
        }

        (
            NodeKind::Import {
                path: p1,
                is_static: s1,
                wildcard: w1,
            },
            NodeKind::Import {
                path: p2,
                is_static: s2,
                wildcard: w2,
            },
        ) => {
            exact(a, "static status", s1, s2)?;
            exact(a, "wildcard status", w1, w2)?;
            if p1 != p2 || audit {
                compare_sequence(a, p1, p2, audit, diffs)?;
            }
        }

        (NodeKind::Class(d1), NodeKind::Class(d2))
        | (NodeKind::Enum(d1), NodeKind::Enum(d2))
        | (NodeKind::Interface(d1), NodeKind::Interface(d2))
        | (NodeKind::Method(d1), NodeKind::Method(d2))
        | (NodeKind::Constructor(d1), NodeKind::Constructor(d2)) => {
            exact(a, "modifiers", &d1.modifiers, &d2.modifiers)?;
            compare_named(a, &d1.name, &d2.name, audit, diffs)?;
        }

        (NodeKind::EnumConstant { name: n1 }, NodeKind::EnumConstant { name: n2 }) => {
            compare_named(a, n1, n2, audit, diffs)?;
        }

        (NodeKind::Field { modifiers: m1 }, NodeKind::Field { modifiers: m2 })
        | (NodeKind::LocalVariable { modifiers: m1 }, NodeKind::LocalVariable { modifiers: m2 }) => {
            exact(a, "modifiers", m1, m2)?;
        }

        (
            NodeKind::Variable {
                name: n1,
                dimensions: dim1,
            },
            NodeKind::Variable {
                name: n2,
                dimensions: dim2,
            },
        ) => {
            exact(a, "dimensions", dim1, dim2)?;
            compare_named(a, n1, n2, audit, diffs)?;
        }

        (
            NodeKind::Parameter {
                name: n1,
                modifiers: m1,
                dimensions: dim1,
            },
            NodeKind::Parameter {
                name: n2,
                modifiers: m2,
                dimensions: dim2,
            },
        ) => {
            exact(a, "modifiers", m1, m2)?;
            exact(a, "dimensions", dim1, dim2)?;
            compare_named(a, n1, n2, audit, diffs)?;
        }

        (
            NodeKind::CatchParameter {
                name: n1,
                types: t1,
            },
            NodeKind::CatchParameter {
                name: n2,
                types: t2,
            },
        ) => {
            exact(a, "exception types", t1, t2)?;
            compare_named(a, n1, n2, audit, diffs)?;
        }

        (NodeKind::Literal { value: v1 }, NodeKind::Literal { value: v2 }) => {
            exact(a, "values", v1, v2)?;
        }

        (NodeKind::BasicType { name: n1 }, NodeKind::BasicType { name: n2 }) => {
            exact(a, "names", n1, n2)?;
            if audit {
                compare_named(a, n1, n2, audit, diffs)?;
            }
        }

        (
            NodeKind::TypeRef {
                name: n1,
                qualifier: q1,
            },
            NodeKind::TypeRef {
                name: n2,
                qualifier: q2,
            },
        )
        | (
            NodeKind::Reference {
                member: n1,
                qualifier: q1,
            },
            NodeKind::Reference {
                member: n2,
                qualifier: q2,
            },
        )
        | (
            NodeKind::Invocation {
                member: n1,
                qualifier: q1,
            },
            NodeKind::Invocation {
                member: n2,
                qualifier: q2,
            },
        ) => {
            compare_qualified(a, n1, q1.as_deref(), n2, q2.as_deref(), audit, diffs)?;
        }

        (NodeKind::Dimensions { text: t1 }, NodeKind::Dimensions { text: t2 }) => {
            exact(a, "dimensions", t1, t2)?;
        }

        // Label equality above already proved the shapes agree.
        (NodeKind::Other { .. }, NodeKind::Other { .. }) => {}

        // Unreachable: label equality pins paired variants together.
        _ => {}
    }
    Ok(())
}

/// Verify that every recorded position reproduces `before` in the original
/// source. A failure here is an internal bookkeeping error, not a property of
/// the candidate edit.
fn verify_positions(
    diffs: &[IdentifierDifference],
    source: &str,
) -> Result<(), CompareError> {
    let mut line_offsets = vec![0usize];
    for (i, b) in source.bytes().enumerate() {
        if b == b'\n' {
            line_offsets.push(i + 1);
        }
    }

    for diff in diffs {
        let failure = |found: String| CompareError::PositionIntegrity {
            name: diff.before.clone(),
            line: diff.line,
            column: diff.column,
            found,
        };

        let Some(line_start) = line_offsets.get(diff.line - 1) else {
            return Err(failure(String::new()));
        };
        let start = line_start + diff.column - 1;
        let end = start + diff.before.len();
        if end > source.len() || !source.is_char_boundary(start) || !source.is_char_boundary(end) {
            return Err(failure(String::new()));
        }
        let found = &source[start..end];
        if found != diff.before {
            return Err(failure(found.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::tree::ParseTree;
    use crate::ast::JavaParser;

    fn parse(source: &str) -> ParseTree {
        JavaParser::new().unwrap().parse(source).unwrap()
    }

    #[test]
    fn reflexivity_yields_no_differences() {
        let source = "class Foo {\n    int bar;\n    void f(int x) { g(x); }\n}\n";
        let tree = parse(source);
        let diffs = compare(&tree, &tree, source).unwrap();
        assert!(diffs.is_empty());
    }

    #[test]
    fn rename_is_detected_with_positions() {
        let before = "class Foo {\n    int bar;\n}\n";
        let after = "class Baz {\n    int qux;\n}\n";
        let diffs = compare(&parse(before), &parse(after), before).unwrap();

        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].kind, "ClassDeclaration");
        assert_eq!(diffs[0].before, "Foo");
        assert_eq!(diffs[0].after, "Baz");
        assert_eq!((diffs[0].line, diffs[0].column), (1, 7));
        assert_eq!(diffs[1].kind, "VariableDeclarator");
        assert_eq!(diffs[1].before, "bar");
        assert_eq!(diffs[1].after, "qux");
        assert_eq!((diffs[1].line, diffs[1].column), (2, 9));
    }

    #[test]
    fn extra_field_is_a_structural_mismatch() {
        let before = "class Foo {\n    int bar;\n}\n";
        let after = "class Foo {\n    int bar;\n    int baz;\n}\n";
        let err = compare(&parse(before), &parse(after), before).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn literal_change_is_rejected() {
        let before = "class A { int x = 1; }\n";
        let after = "class A { int x = 2; }\n";
        let err = compare(&parse(before), &parse(after), before).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Structural(StructuralMismatch::Attribute {
                kind: "Literal",
                ..
            })
        ));
    }

    #[test]
    fn modifier_change_is_rejected() {
        let before = "class A { private int x; }\n";
        let after = "class A { public int x; }\n";
        let err = compare(&parse(before), &parse(after), before).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Structural(StructuralMismatch::Attribute {
                attribute: "modifiers",
                ..
            })
        ));
    }

    #[test]
    fn qualifier_segment_rename_offsets_columns() {
        let before = "class A {\n    void f() {\n        sys.out.println(x);\n    }\n}\n";
        let after = "class A {\n    void f() {\n        io.out.println(y);\n    }\n}\n";
        let diffs = compare(&parse(before), &parse(after), before).unwrap();

        // Member is unchanged; the first qualifier segment and the argument
        // differ.
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].kind, "MethodInvocation");
        assert_eq!(diffs[0].before, "sys");
        assert_eq!((diffs[0].line, diffs[0].column), (3, 9));
        assert_eq!(diffs[1].before, "x");
    }

    #[test]
    fn member_rename_is_offset_past_the_qualifier() {
        let before = "class A {\n    void f() {\n        obj.count = 1;\n    }\n}\n";
        let after = "class A {\n    void f() {\n        obj.total = 1;\n    }\n}\n";
        let diffs = compare(&parse(before), &parse(after), before).unwrap();

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].before, "count");
        // `obj` starts at column 9; the member is offset by len("obj") + 1.
        assert_eq!((diffs[0].line, diffs[0].column), (3, 13));
    }

    #[test]
    fn import_segment_count_change_is_structural() {
        let before = "import java.util.List;\nclass A {}\n";
        let after = "import java.List;\nclass A {}\n";
        let err = compare(&parse(before), &parse(after), before).unwrap_err();
        assert!(matches!(
            err,
            CompareError::Structural(StructuralMismatch::SequenceLength { .. })
        ));
    }

    #[test]
    fn audit_mode_records_unchanged_identifiers() {
        let source = "class Foo {\n    int bar;\n}\n";
        let tree = parse(source);
        let diffs = compare_with(&tree, &tree, source, CompareMode::Audit).unwrap();

        assert!(!diffs.is_empty());
        assert!(diffs.iter().all(|d| d.before == d.after));
        assert!(diffs.iter().any(|d| d.before == "Foo"));
        assert!(diffs.iter().any(|d| d.before == "bar"));
    }

    #[test]
    fn position_verification_catches_bad_bookkeeping() {
        let source = "class Foo {\n    int bar;\n}\n";
        // Column 8 points one character right of `Foo`.
        let diffs = vec![IdentifierDifference {
            kind: "ClassDeclaration",
            before: "Foo".to_string(),
            after: "Baz".to_string(),
            line: 1,
            column: 8,
        }];
        let err = verify_positions(&diffs, source).unwrap_err();
        assert!(matches!(err, CompareError::PositionIntegrity { .. }));
    }

    #[test]
    fn super_invocation_matches_by_kind_only() {
        let before = "class A {\n    void f() {\n        super.f();\n    }\n}\n";
        let after = "class A {\n    void g() {\n        super.f();\n    }\n}\n";
        let diffs = compare(&parse(before), &parse(after), before).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].before, "f");
        assert_eq!(diffs[0].kind, "MethodDeclaration");
    }
}
