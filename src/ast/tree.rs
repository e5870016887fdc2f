use std::collections::BTreeSet;

/// 1-indexed source coordinates. `column` counts from the start of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Index of a node within its [`ParseTree`] arena.
pub type NodeId = usize;

/// Payload shared by the five declaration kinds that open segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub modifiers: BTreeSet<String>,
    /// Position of the declaration's first token, modifiers included. The
    /// node's own position anchors the name identifier instead.
    pub modifier_position: Option<Position>,
}

/// Closed set of node variants. Each variant's attributes are statically
/// known, so the comparator is a match over pairs instead of a runtime check
/// for optionally-present attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Package {
        name: String,
    },
    Import {
        path: String,
        is_static: bool,
        wildcard: bool,
    },
    Class(Declaration),
    Enum(Declaration),
    Interface(Declaration),
    Method(Declaration),
    Constructor(Declaration),
    EnumConstant {
        name: String,
    },
    /// Field or local variable declaration statement; the declarators are
    /// children.
    Field {
        modifiers: BTreeSet<String>,
    },
    LocalVariable {
        modifiers: BTreeSet<String>,
    },
    Variable {
        name: String,
        dimensions: Vec<String>,
    },
    Parameter {
        name: String,
        modifiers: BTreeSet<String>,
        dimensions: Vec<String>,
    },
    CatchParameter {
        name: String,
        types: Vec<String>,
    },
    Literal {
        value: String,
    },
    BasicType {
        name: String,
    },
    /// Class-type usage; a dotted prefix is flattened into `qualifier` with
    /// the node position at the start of the chain.
    TypeRef {
        name: String,
        qualifier: Option<String>,
    },
    /// Field access or bare identifier expression.
    Reference {
        member: String,
        qualifier: Option<String>,
    },
    Invocation {
        member: String,
        qualifier: Option<String>,
    },
    /// `super.method(...)`: carries no identity, matched by kind only.
    SuperInvocation,
    Dimensions {
        text: String,
    },
    /// Any other named grammar construct, shape-compared by its grammar
    /// label.
    Other {
        label: &'static str,
    },
}

impl NodeKind {
    /// Stable kind label for diagnostics and difference records.
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Package { .. } => "PackageDeclaration",
            NodeKind::Import { .. } => "Import",
            NodeKind::Class(_) => "ClassDeclaration",
            NodeKind::Enum(_) => "EnumDeclaration",
            NodeKind::Interface(_) => "InterfaceDeclaration",
            NodeKind::Method(_) => "MethodDeclaration",
            NodeKind::Constructor(_) => "ConstructorDeclaration",
            NodeKind::EnumConstant { .. } => "EnumConstant",
            NodeKind::Field { .. } => "FieldDeclaration",
            NodeKind::LocalVariable { .. } => "LocalVariableDeclaration",
            NodeKind::Variable { .. } => "VariableDeclarator",
            NodeKind::Parameter { .. } => "FormalParameter",
            NodeKind::CatchParameter { .. } => "CatchClauseParameter",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::BasicType { .. } => "BasicType",
            NodeKind::TypeRef { .. } => "TypeReference",
            NodeKind::Reference { .. } => "MemberReference",
            NodeKind::Invocation { .. } => "MethodInvocation",
            NodeKind::SuperInvocation => "SuperMethodInvocation",
            NodeKind::Dimensions { .. } => "Dimensions",
            NodeKind::Other { label } => label,
        }
    }

    /// Whether this kind is one of the declaration kinds that start a
    /// segment at file level.
    pub fn is_boundary_declaration(&self) -> bool {
        matches!(
            self,
            NodeKind::Class(_)
                | NodeKind::Enum(_)
                | NodeKind::Interface(_)
                | NodeKind::Method(_)
                | NodeKind::Constructor(_)
        )
    }

    /// Whether this kind opens a method or constructor body, which excludes
    /// declarations nested beneath it from segmentation.
    pub fn is_body_owner(&self) -> bool {
        matches!(self, NodeKind::Method(_) | NodeKind::Constructor(_))
    }
}

/// One node of a lowered parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Option<Position>,
    pub children: Vec<NodeId>,
}

/// Immutable, ordered, rooted tree over an arena of [`Node`]s. Node 0 is the
/// root when the tree is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTree {
    nodes: Vec<Node>,
}

impl ParseTree {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Pre-order traversal of the whole tree, driven by an explicit stack so
    /// depth is bounded by tree width rather than the call stack.
    pub fn preorder(&self) -> Preorder<'_> {
        let mut stack = Vec::new();
        if !self.nodes.is_empty() {
            stack.push(0);
        }
        Preorder { tree: self, stack }
    }

    /// Visit every node in pre-order together with a flag telling whether any
    /// ancestor is a method or constructor declaration.
    pub fn walk_scoped<F: FnMut(&Node, bool)>(&self, mut visit: F) {
        let mut stack: Vec<(NodeId, bool)> = Vec::new();
        if !self.nodes.is_empty() {
            stack.push((0, false));
        }
        while let Some((id, inside_body)) = stack.pop() {
            let node = &self.nodes[id];
            visit(node, inside_body);
            let child_flag = inside_body || node.kind.is_body_owner();
            for &child in node.children.iter().rev() {
                stack.push((child, child_flag));
            }
        }
    }
}

/// Iterator over node ids in pre-order.
pub struct Preorder<'a> {
    tree: &'a ParseTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id];
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(kind: NodeKind) -> Node {
        Node {
            kind,
            position: None,
            children: Vec::new(),
        }
    }

    #[test]
    fn preorder_visits_children_in_order() {
        // root -> [a -> [b], c]
        let mut root = leaf(NodeKind::Other { label: "root" });
        root.children = vec![1, 3];
        let mut a = leaf(NodeKind::Other { label: "a" });
        a.children = vec![2];
        let b = leaf(NodeKind::Other { label: "b" });
        let c = leaf(NodeKind::Other { label: "c" });
        let tree = ParseTree::from_nodes(vec![root, a, b, c]);

        let labels: Vec<&str> = tree.preorder().map(|n| n.kind.label()).collect();
        assert_eq!(labels, vec!["root", "a", "b", "c"]);
    }

    #[test]
    fn walk_scoped_flags_descendants_of_methods() {
        let mut root = leaf(NodeKind::Other { label: "root" });
        root.children = vec![1];
        let mut method = leaf(NodeKind::Method(Declaration {
            name: "f".into(),
            modifiers: BTreeSet::new(),
            modifier_position: None,
        }));
        method.children = vec![2];
        let local = leaf(NodeKind::Class(Declaration {
            name: "Local".into(),
            modifiers: BTreeSet::new(),
            modifier_position: None,
        }));
        let tree = ParseTree::from_nodes(vec![root, method, local]);

        let mut flags = Vec::new();
        tree.walk_scoped(|node, inside| flags.push((node.kind.label(), inside)));
        assert_eq!(
            flags,
            vec![
                ("root", false),
                ("MethodDeclaration", false),
                ("ClassDeclaration", true),
            ]
        );
    }
}
