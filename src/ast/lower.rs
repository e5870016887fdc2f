//! Lowering from the raw tree-sitter CST into the typed [`ParseTree`].
//!
//! The lowering consumes identifier tokens into the attributes the comparator
//! inspects (`name`, `member`, `qualifier`, modifier sets, dimension lists)
//! and keeps every other named construct as a shape-only node labelled by its
//! grammar kind. Comments are never lowered, so segment markers and comment
//! edits are invisible to structural comparison.

use crate::ast::tree::{Declaration, Node, NodeId, NodeKind, ParseTree, Position};
use std::collections::BTreeSet;
use tree_sitter::Node as CstNode;

pub(crate) fn lower(root: CstNode<'_>, source: &str) -> ParseTree {
    let mut lowerer = Lowerer {
        source,
        nodes: Vec::new(),
    };
    lowerer.lower_node(root);
    ParseTree::from_nodes(lowerer.nodes)
}

const LITERAL_KINDS: &[&str] = &[
    "decimal_integer_literal",
    "hex_integer_literal",
    "octal_integer_literal",
    "binary_integer_literal",
    "decimal_floating_point_literal",
    "hex_floating_point_literal",
    "true",
    "false",
    "character_literal",
    "string_literal",
    "text_block",
    "null_literal",
];

struct Lowerer<'s> {
    source: &'s str,
    nodes: Vec<Node>,
}

impl<'s> Lowerer<'s> {
    fn text(&self, cst: CstNode<'_>) -> &'s str {
        &self.source[cst.byte_range()]
    }

    fn pos(cst: CstNode<'_>) -> Position {
        let point = cst.start_position();
        Position {
            line: point.row + 1,
            column: point.column + 1,
        }
    }

    fn push(&mut self, kind: NodeKind, position: Option<Position>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            position,
            children: Vec::new(),
        });
        id
    }

    /// Lower all named children except the ones whose CST ids appear in
    /// `skip`. A `modifiers` child contributes its annotations; the keyword
    /// tokens are consumed separately by [`Self::collect_modifiers`].
    fn lower_children_except(&mut self, cst: CstNode<'_>, skip: &[usize]) -> Vec<NodeId> {
        let mut out = Vec::new();
        for i in 0..cst.child_count() {
            let Some(child) = cst.child(i) else { continue };
            if skip.contains(&child.id()) {
                continue;
            }
            if child.kind() == "modifiers" {
                for j in 0..child.child_count() {
                    let Some(annotation) = child.child(j) else {
                        continue;
                    };
                    if annotation.is_named() {
                        if let Some(id) = self.lower_node(annotation) {
                            out.push(id);
                        }
                    }
                }
                continue;
            }
            if !child.is_named() {
                continue;
            }
            if let Some(id) = self.lower_node(child) {
                out.push(id);
            }
        }
        out
    }

    /// Collect the keyword modifiers (`public`, `static`, `final`, ...) of a
    /// declaration. Annotations are lowered as children instead.
    fn collect_modifiers(&self, cst: CstNode<'_>) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        for i in 0..cst.child_count() {
            let Some(child) = cst.child(i) else { continue };
            if child.kind() != "modifiers" {
                continue;
            }
            for j in 0..child.child_count() {
                let Some(token) = child.child(j) else { continue };
                if !token.is_named() {
                    set.insert(self.text(token).to_string());
                }
            }
        }
        set
    }

    /// Flatten a pure identifier chain (`a.b.c`, `this.x`) into its dotted
    /// text. Returns `None` when the object is a computed expression.
    fn flatten_chain(&self, cst: CstNode<'_>) -> Option<String> {
        match cst.kind() {
            "identifier" | "this" | "super" | "scoped_identifier" => {
                Some(self.text(cst).to_string())
            }
            "field_access" => {
                let object = cst.child_by_field_name("object")?;
                let field = cst.child_by_field_name("field")?;
                let prefix = self.flatten_chain(object)?;
                Some(format!("{prefix}.{}", self.text(field)))
            }
            _ => None,
        }
    }

    fn lower_declaration(&mut self, cst: CstNode<'_>) -> NodeId {
        let name_node = cst.child_by_field_name("name");
        let decl = Declaration {
            name: name_node.map(|n| self.text(n).to_string()).unwrap_or_default(),
            modifiers: self.collect_modifiers(cst),
            modifier_position: Some(Self::pos(cst)),
        };
        let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
        let kind = match cst.kind() {
            "class_declaration" => NodeKind::Class(decl),
            "enum_declaration" => NodeKind::Enum(decl),
            "interface_declaration" => NodeKind::Interface(decl),
            "method_declaration" => NodeKind::Method(decl),
            _ => NodeKind::Constructor(decl),
        };
        let id = self.push(kind, position);
        let skip: Vec<usize> = name_node.map(|n| n.id()).into_iter().collect();
        let children = self.lower_children_except(cst, &skip);
        self.nodes[id].children = children;
        id
    }

    fn dimension_list(text: &str) -> Vec<String> {
        (0..text.bytes().filter(|b| *b == b'[').count())
            .map(|_| "[]".to_string())
            .collect()
    }

    fn lower_node(&mut self, cst: CstNode<'_>) -> Option<NodeId> {
        let kind = cst.kind();

        if LITERAL_KINDS.contains(&kind) {
            let value = self.text(cst).to_string();
            return Some(self.push(NodeKind::Literal { value }, Some(Self::pos(cst))));
        }

        match kind {
            "line_comment" | "block_comment" => None,

            "package_declaration" => {
                let mut name_node = None;
                for i in 0..cst.child_count() {
                    if let Some(child) = cst.child(i) {
                        if matches!(child.kind(), "identifier" | "scoped_identifier") {
                            name_node = Some(child);
                        }
                    }
                }
                let (name, position) = match name_node {
                    Some(n) => (self.text(n).to_string(), Self::pos(n)),
                    None => (String::new(), Self::pos(cst)),
                };
                Some(self.push(NodeKind::Package { name }, Some(position)))
            }

            "import_declaration" => {
                let mut is_static = false;
                let mut wildcard = false;
                let mut path_node = None;
                for i in 0..cst.child_count() {
                    let Some(child) = cst.child(i) else { continue };
                    match child.kind() {
                        "static" => is_static = true,
                        "asterisk" => wildcard = true,
                        "identifier" | "scoped_identifier" => path_node = Some(child),
                        _ => {}
                    }
                }
                let (path, position) = match path_node {
                    Some(n) => (self.text(n).to_string(), Self::pos(n)),
                    None => (String::new(), Self::pos(cst)),
                };
                Some(self.push(
                    NodeKind::Import {
                        path,
                        is_static,
                        wildcard,
                    },
                    Some(position),
                ))
            }

            "class_declaration"
            | "enum_declaration"
            | "interface_declaration"
            | "method_declaration"
            | "constructor_declaration" => Some(self.lower_declaration(cst)),

            "enum_constant" => {
                let name_node = cst.child_by_field_name("name");
                let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
                let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
                let id = self.push(NodeKind::EnumConstant { name }, position);
                let skip: Vec<usize> = name_node.map(|n| n.id()).into_iter().collect();
                let children = self.lower_children_except(cst, &skip);
                self.nodes[id].children = children;
                Some(id)
            }

            "field_declaration" | "local_variable_declaration" => {
                let modifiers = self.collect_modifiers(cst);
                let node_kind = if kind == "field_declaration" {
                    NodeKind::Field { modifiers }
                } else {
                    NodeKind::LocalVariable { modifiers }
                };
                let id = self.push(node_kind, Some(Self::pos(cst)));
                let children = self.lower_children_except(cst, &[]);
                self.nodes[id].children = children;
                Some(id)
            }

            "variable_declarator" => {
                let name_node = cst.child_by_field_name("name");
                let dim_node = cst.child_by_field_name("dimensions");
                let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
                let dimensions = dim_node
                    .map(|n| Self::dimension_list(self.text(n)))
                    .unwrap_or_default();
                let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
                let id = self.push(NodeKind::Variable { name, dimensions }, position);
                let skip: Vec<usize> = [name_node, dim_node]
                    .into_iter()
                    .flatten()
                    .map(|n| n.id())
                    .collect();
                let children = self.lower_children_except(cst, &skip);
                self.nodes[id].children = children;
                Some(id)
            }

            "formal_parameter" => {
                let name_node = cst.child_by_field_name("name");
                let dim_node = cst.child_by_field_name("dimensions");
                let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
                let dimensions = dim_node
                    .map(|n| Self::dimension_list(self.text(n)))
                    .unwrap_or_default();
                let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
                let id = self.push(
                    NodeKind::Parameter {
                        name,
                        modifiers: self.collect_modifiers(cst),
                        dimensions,
                    },
                    position,
                );
                let skip: Vec<usize> = [name_node, dim_node]
                    .into_iter()
                    .flatten()
                    .map(|n| n.id())
                    .collect();
                let children = self.lower_children_except(cst, &skip);
                self.nodes[id].children = children;
                Some(id)
            }

            "catch_formal_parameter" => {
                let name_node = cst.child_by_field_name("name");
                let name = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
                let mut types = Vec::new();
                let mut type_node_id = None;
                for i in 0..cst.child_count() {
                    let Some(child) = cst.child(i) else { continue };
                    if child.kind() == "catch_type" {
                        type_node_id = Some(child.id());
                        for j in 0..child.child_count() {
                            let Some(alternative) = child.child(j) else {
                                continue;
                            };
                            if alternative.is_named() {
                                types.push(self.text(alternative).to_string());
                            }
                        }
                    }
                }
                let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
                let id = self.push(NodeKind::CatchParameter { name, types }, position);
                let skip: Vec<usize> = name_node
                    .map(|n| n.id())
                    .into_iter()
                    .chain(type_node_id)
                    .collect();
                let children = self.lower_children_except(cst, &skip);
                self.nodes[id].children = children;
                Some(id)
            }

            "integral_type" | "floating_point_type" | "boolean_type" | "void_type" => {
                let name = self.text(cst).to_string();
                Some(self.push(NodeKind::BasicType { name }, Some(Self::pos(cst))))
            }

            "type_identifier" => {
                let name = self.text(cst).to_string();
                Some(self.push(
                    NodeKind::TypeRef {
                        name,
                        qualifier: None,
                    },
                    Some(Self::pos(cst)),
                ))
            }

            "scoped_type_identifier" => {
                let full = self.text(cst);
                // A generic prefix (A<T>.B) cannot be flattened into a dotted
                // chain; fall back to shape-only lowering.
                if full
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
                {
                    let (qualifier, name) = match full.rfind('.') {
                        Some(dot) => (Some(full[..dot].to_string()), full[dot + 1..].to_string()),
                        None => (None, full.to_string()),
                    };
                    Some(self.push(NodeKind::TypeRef { name, qualifier }, Some(Self::pos(cst))))
                } else {
                    let id = self.push(
                        NodeKind::Other {
                            label: "scoped_type_identifier",
                        },
                        Some(Self::pos(cst)),
                    );
                    let children = self.lower_children_except(cst, &[]);
                    self.nodes[id].children = children;
                    Some(id)
                }
            }

            "identifier" => {
                let member = self.text(cst).to_string();
                Some(self.push(
                    NodeKind::Reference {
                        member,
                        qualifier: None,
                    },
                    Some(Self::pos(cst)),
                ))
            }

            "scoped_identifier" => {
                let full = self.text(cst);
                let (qualifier, member) = match full.rfind('.') {
                    Some(dot) => (Some(full[..dot].to_string()), full[dot + 1..].to_string()),
                    None => (None, full.to_string()),
                };
                Some(self.push(
                    NodeKind::Reference { member, qualifier },
                    Some(Self::pos(cst)),
                ))
            }

            "field_access" => {
                let object = cst.child_by_field_name("object");
                let field = cst.child_by_field_name("field");
                let member = field.map(|n| self.text(n).to_string()).unwrap_or_default();
                if let Some(qualifier) = object.and_then(|o| self.flatten_chain(o)) {
                    let position = Some(object.map_or_else(|| Self::pos(cst), Self::pos));
                    Some(self.push(
                        NodeKind::Reference {
                            member,
                            qualifier: Some(qualifier),
                        },
                        position,
                    ))
                } else {
                    let position = Some(field.map_or_else(|| Self::pos(cst), Self::pos));
                    let id = self.push(
                        NodeKind::Reference {
                            member,
                            qualifier: None,
                        },
                        position,
                    );
                    let skip: Vec<usize> =
                        field.map(|n| n.id()).into_iter().collect();
                    let children = self.lower_children_except(cst, &skip);
                    self.nodes[id].children = children;
                    Some(id)
                }
            }

            "method_invocation" => {
                let object = cst.child_by_field_name("object");
                let name_node = cst.child_by_field_name("name");
                let member = name_node.map(|n| self.text(n).to_string()).unwrap_or_default();
                let name_skip: Vec<usize> = name_node.map(|n| n.id()).into_iter().collect();

                if let Some(object) = object {
                    if object.kind() == "super" {
                        let id = self.push(NodeKind::SuperInvocation, Some(Self::pos(cst)));
                        let skip: Vec<usize> = name_skip
                            .iter()
                            .copied()
                            .chain(std::iter::once(object.id()))
                            .collect();
                        let children = self.lower_children_except(cst, &skip);
                        self.nodes[id].children = children;
                        return Some(id);
                    }
                    if let Some(qualifier) = self.flatten_chain(object) {
                        let id = self.push(
                            NodeKind::Invocation {
                                member,
                                qualifier: Some(qualifier),
                            },
                            Some(Self::pos(object)),
                        );
                        let skip: Vec<usize> = name_skip
                            .iter()
                            .copied()
                            .chain(std::iter::once(object.id()))
                            .collect();
                        let children = self.lower_children_except(cst, &skip);
                        self.nodes[id].children = children;
                        return Some(id);
                    }
                }

                let position = Some(name_node.map_or_else(|| Self::pos(cst), Self::pos));
                let id = self.push(
                    NodeKind::Invocation {
                        member,
                        qualifier: None,
                    },
                    position,
                );
                let children = self.lower_children_except(cst, &name_skip);
                self.nodes[id].children = children;
                Some(id)
            }

            "dimensions" => {
                let text: String = self.text(cst).split_whitespace().collect();
                Some(self.push(NodeKind::Dimensions { text }, Some(Self::pos(cst))))
            }

            _ => {
                let id = self.push(NodeKind::Other { label: kind }, Some(Self::pos(cst)));
                let children = self.lower_children_except(cst, &[]);
                self.nodes[id].children = children;
                Some(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::JavaParser;

    fn parse(source: &str) -> ParseTree {
        JavaParser::new().unwrap().parse(source).unwrap()
    }

    fn find<'t>(tree: &'t ParseTree, label: &str) -> Vec<&'t Node> {
        tree.preorder().filter(|n| n.kind.label() == label).collect()
    }

    #[test]
    fn class_and_field_are_lowered_with_name_positions() {
        let tree = parse("class Foo {\n    int bar;\n}\n");

        let classes = find(&tree, "ClassDeclaration");
        assert_eq!(classes.len(), 1);
        let NodeKind::Class(decl) = &classes[0].kind else {
            unreachable!()
        };
        assert_eq!(decl.name, "Foo");
        // Name anchor points at `Foo`, modifier position at the `class`
        // keyword.
        assert_eq!(classes[0].position, Some(Position { line: 1, column: 7 }));
        assert_eq!(
            decl.modifier_position,
            Some(Position { line: 1, column: 1 })
        );

        let vars = find(&tree, "VariableDeclarator");
        assert_eq!(vars.len(), 1);
        let NodeKind::Variable { name, .. } = &vars[0].kind else {
            unreachable!()
        };
        assert_eq!(name, "bar");
        assert_eq!(vars[0].position, Some(Position { line: 2, column: 9 }));

        let basics = find(&tree, "BasicType");
        assert_eq!(basics.len(), 1);
    }

    #[test]
    fn package_and_imports_carry_paths() {
        let tree = parse(
            "package com.example.app;\n\
             import java.util.List;\n\
             import static java.lang.Math.max;\n\
             import java.io.*;\n\
             class A {}\n",
        );

        let packages = find(&tree, "PackageDeclaration");
        let NodeKind::Package { name } = &packages[0].kind else {
            unreachable!()
        };
        assert_eq!(name, "com.example.app");
        assert_eq!(packages[0].position, Some(Position { line: 1, column: 9 }));

        let imports = find(&tree, "Import");
        assert_eq!(imports.len(), 3);
        let NodeKind::Import {
            path,
            is_static,
            wildcard,
        } = &imports[1].kind
        else {
            unreachable!()
        };
        assert_eq!(path, "java.lang.Math.max");
        assert!(is_static);
        assert!(!wildcard);
        let NodeKind::Import { wildcard, .. } = &imports[2].kind else {
            unreachable!()
        };
        assert!(wildcard);
    }

    #[test]
    fn qualified_invocations_flatten_identifier_chains() {
        let tree = parse(
            "class A {\n    void f() {\n        sys.out.println(count);\n    }\n}\n",
        );

        let calls = find(&tree, "MethodInvocation");
        assert_eq!(calls.len(), 1);
        let NodeKind::Invocation { member, qualifier } = &calls[0].kind else {
            unreachable!()
        };
        assert_eq!(member, "println");
        assert_eq!(qualifier.as_deref(), Some("sys.out"));
        // Position anchors the start of the chain.
        assert_eq!(calls[0].position, Some(Position { line: 3, column: 9 }));

        let refs = find(&tree, "MemberReference");
        assert_eq!(refs.len(), 1);
        let NodeKind::Reference { member, .. } = &refs[0].kind else {
            unreachable!()
        };
        assert_eq!(member, "count");
    }

    #[test]
    fn super_invocations_are_identity_irrelevant() {
        let tree = parse(
            "class A {\n    void f() {\n        super.f();\n    }\n}\n",
        );
        assert_eq!(find(&tree, "SuperMethodInvocation").len(), 1);
        assert_eq!(find(&tree, "MethodInvocation").len(), 0);
    }

    #[test]
    fn catch_parameter_records_exception_types() {
        let tree = parse(
            "class A {\n    void f() {\n        try { g(); } catch (IOException | RuntimeException e) { }\n    }\n}\n",
        );
        let params = find(&tree, "CatchClauseParameter");
        assert_eq!(params.len(), 1);
        let NodeKind::CatchParameter { name, types } = &params[0].kind else {
            unreachable!()
        };
        assert_eq!(name, "e");
        assert_eq!(types, &["IOException", "RuntimeException"]);
    }

    #[test]
    fn comments_are_not_lowered() {
        let with = parse("// <Label: 0>\nclass A { /* note */ int x; }\n");
        let without = parse("class A { int x; }\n");
        assert_eq!(with.len(), without.len());
    }

    #[test]
    fn modifiers_are_collected_as_a_set() {
        let tree = parse("public final class A { static private int x; }\n");
        let NodeKind::Class(decl) = &find(&tree, "ClassDeclaration")[0].kind else {
            unreachable!()
        };
        let expected: Vec<&str> = vec!["final", "public"];
        assert_eq!(
            decl.modifiers.iter().map(String::as_str).collect::<Vec<_>>(),
            expected
        );
        let NodeKind::Field { modifiers } = &find(&tree, "FieldDeclaration")[0].kind else {
            unreachable!()
        };
        assert_eq!(
            modifiers.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["private", "static"]
        );
    }
}
