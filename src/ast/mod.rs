//! Syntax tree for parsed statements.
//!
//! Nodes live in an arena ([`Ast`]) and refer to each other through
//! [`NodeId`] handles. Every handle has exactly one owner: a node's children
//! list, or an operand field on an expression (the tested expression of an
//! `IN` list). Copying a subtree allocates fresh handles and remaps them, so a
//! copy never aliases its source.

pub mod expr;
pub mod syntax;
pub mod value;

pub use expr::{ArithmeticOp, CompareOp, Expr, ExprRef, Literal, LogicOp, UnaryOp};
pub use syntax::{JoinKind, Syntax};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle of a node inside one [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Syntax(Syntax),
    Expr(Expr),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Syntax(s) => s.name(),
            Self::Expr(e) => e.name(),
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Syntax(s) => s.detail(),
            Self::Expr(e) => e.detail(),
        }
    }

    fn operand_handles(&self) -> Vec<NodeId> {
        match self {
            Self::Syntax(_) => Vec::new(),
            Self::Expr(e) => e.operand_handles(),
        }
    }

    fn remap(&self, f: impl Fn(NodeId) -> NodeId) -> NodeKind {
        match self {
            Self::Syntax(s) => Self::Syntax(s.clone()),
            Self::Expr(e) => Self::Expr(e.remap(f)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    kind: NodeKind,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node without children. Operand handles inside `kind` are claimed
    /// by the new node.
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        self.add_with_children(kind, [])
    }

    pub fn add_with_children(
        &mut self,
        kind: NodeKind,
        children: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let operands = kind.operand_handles();
        self.nodes.push(Node {
            kind,
            children: Vec::new(),
            parent: None,
        });
        for operand in operands {
            self.claim(id, operand);
        }
        for child in children {
            self.attach(id, child);
        }
        id
    }

    /// Append `child` to `parent`'s children.
    ///
    /// # Panics
    ///
    /// If `child` already has an owner.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.claim(parent, child);
        self.nodes[parent.0].children.push(child);
    }

    fn claim(&mut self, owner: NodeId, child: NodeId) {
        assert_ne!(owner, child, "node {owner:?} cannot own itself");
        let node = &mut self.nodes[child.0];
        assert!(
            node.parent.is_none(),
            "node {child:?} is already owned by {:?}",
            node.parent
        );
        node.parent = Some(owner);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Expression view of `id`.
    ///
    /// # Panics
    ///
    /// If `id` is a statement or clause node.
    pub fn expr(&self, id: NodeId) -> ExprRef<'_> {
        match self.try_expr(id) {
            Some(e) => e,
            None => panic!(
                "node {id:?} is a {} clause, not an expression",
                self.kind(id).name()
            ),
        }
    }

    pub fn try_expr(&self, id: NodeId) -> Option<ExprRef<'_>> {
        match &self.nodes[id.0].kind {
            NodeKind::Expr(e) => Some(ExprRef::new(self, id, e)),
            NodeKind::Syntax(_) => None,
        }
    }

    /// All handles owned by `id`: operand fields first, then children.
    fn owned(&self, id: NodeId) -> Vec<NodeId> {
        let node = &self.nodes[id.0];
        let mut owned = node.kind.operand_handles();
        owned.extend_from_slice(&node.children);
        owned
    }

    /// Deep-copy the subtree at `id` into a fresh arena.
    pub fn extract(&self, id: NodeId) -> (Ast, NodeId) {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            order.push(next);
            stack.extend(self.owned(next).into_iter().rev());
        }

        let mapping: HashMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(new, old)| (*old, NodeId(new)))
            .collect();
        let remap = |old: NodeId| mapping[&old];

        let nodes = order
            .iter()
            .map(|&old| {
                let node = &self.nodes[old.0];
                Node {
                    kind: node.kind.remap(remap),
                    children: node.children.iter().map(|&c| remap(c)).collect(),
                    parent: if old == id {
                        None
                    } else {
                        node.parent.map(remap)
                    },
                }
            })
            .collect();
        (Ast { nodes }, NodeId(0))
    }

    /// Deep-copy the subtree at `id` within this arena. The copy has no
    /// owner and shares no handles with the source.
    pub fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let (copy, root) = self.extract(id);
        self.graft(copy, root)
    }

    /// Move every node of `other` into this arena, returning the new handle
    /// of `root`.
    pub fn graft(&mut self, other: Ast, root: NodeId) -> NodeId {
        let offset = self.nodes.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);
        self.nodes.extend(other.nodes.into_iter().map(|node| Node {
            kind: node.kind.remap(shift),
            children: node.children.into_iter().map(shift).collect(),
            parent: node.parent.map(shift),
        }));
        shift(root)
    }

    /// Conditions (the expressions under `WHERE`, `HAVING` and `ON`) found
    /// in the statement at `id`, including derived tables and union arms.
    /// Subqueries inside expressions are not entered.
    pub fn conditions(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let NodeKind::Syntax(syntax) = self.kind(next) else {
                continue;
            };
            let children = self.children(next);
            if syntax.holds_condition() {
                found.extend(children.first().copied());
            } else {
                stack.extend(children.iter().rev());
            }
        }
        found
    }

    /// Print the subtree at `id`, one node per line, indented by `depth`
    /// repetitions of `indent`.
    pub fn print(
        &self,
        id: NodeId,
        out: &mut impl fmt::Write,
        depth: usize,
        indent: char,
    ) -> fmt::Result {
        let pad: String = std::iter::repeat_n(indent, depth).collect();
        let kind = self.kind(id);

        if let NodeKind::Expr(Expr::InValuesList { expression }) = kind {
            writeln!(out, "{pad}{}:", kind.name())?;
            writeln!(out, "{{")?;
            self.print(*expression, out, depth + 1, indent)?;
            writeln!(out, "{pad}In")?;
            self.print_children(id, out, depth + 1, indent)?;
            return writeln!(out, "{pad}}}");
        }

        match kind.detail() {
            Some(detail) => writeln!(out, "{pad}{}: {detail}", kind.name())?,
            None => writeln!(out, "{pad}{}", kind.name())?,
        }
        self.print_children(id, out, depth + 1, indent)
    }

    fn print_children(
        &self,
        id: NodeId,
        out: &mut impl fmt::Write,
        depth: usize,
        indent: char,
    ) -> fmt::Result {
        for &child in self.children(id) {
            self.print(child, out, depth, indent)?;
        }
        Ok(())
    }

    /// [`print`](Self::print) into a string, tab-indented.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.print(id, &mut out, 0, '\t');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensitive::SensitiveNameChecker;

    fn string(ast: &mut Ast, s: &str) -> NodeId {
        ast.add(NodeKind::Expr(Expr::Literal(Literal::String(s.to_string()))))
    }

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.add(NodeKind::Expr(Expr::Identifier {
            qualifier: None,
            name: name.to_string(),
        }))
    }

    /// `'admin' IN ('admin', 'root') AND password = ''`
    fn sample(ast: &mut Ast) -> NodeId {
        let tested = string(ast, "admin");
        let a = string(ast, "admin");
        let b = string(ast, "root");
        let list = ast.add_with_children(
            NodeKind::Expr(Expr::InValuesList { expression: tested }),
            [a, b],
        );
        let field = ident(ast, "password");
        let empty = string(ast, "");
        let cmp = ast.add_with_children(NodeKind::Expr(Expr::Comparison(CompareOp::Eq)), [field, empty]);
        ast.add_with_children(NodeKind::Expr(Expr::Logic(LogicOp::And)), [list, cmp])
    }

    fn contract(ast: &Ast, id: NodeId) -> (bool, bool, bool, bool) {
        let e = ast.expr(id);
        (
            e.is_always_true_or_false(),
            e.is_always_true(),
            e.any_is_always_true(),
            e.results_in_value(),
        )
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    #[test]
    fn test_add_sets_parents() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        assert_eq!(ast.parent(root), None);
        for &child in ast.children(root) {
            assert_eq!(ast.parent(child), Some(root));
        }
        // The tested expression is owned by the list node
        let list = ast.children(root)[0];
        let NodeKind::Expr(Expr::InValuesList { expression }) = ast.kind(list) else {
            panic!("expected an IN list");
        };
        assert_eq!(ast.parent(*expression), Some(list));
    }

    #[test]
    #[should_panic(expected = "already owned")]
    fn test_attach_rejects_shared_child() {
        let mut ast = Ast::new();
        let shared = string(&mut ast, "x");
        let _first = ast.add_with_children(NodeKind::Expr(Expr::Unary(UnaryOp::Not)), [shared]);
        let _second = ast.add_with_children(NodeKind::Expr(Expr::Unary(UnaryOp::Not)), [shared]);
    }

    #[test]
    #[should_panic(expected = "not an expression")]
    fn test_expr_on_clause_panics() {
        let mut ast = Ast::new();
        let id = ast.add(NodeKind::Syntax(Syntax::Where));
        let _ = ast.expr(id);
    }

    // =========================================================================
    // Copy
    // =========================================================================

    #[test]
    fn test_copy_evaluates_identically() {
        let names = SensitiveNameChecker::default();
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let copy = ast.copy_subtree(root);

        assert_ne!(root, copy);
        assert_eq!(contract(&ast, root), contract(&ast, copy));
        assert_eq!(
            ast.expr(root).empty_password(&names),
            ast.expr(copy).empty_password(&names)
        );
        assert_eq!(ast.render(root), ast.render(copy));
        assert_eq!(ast.parent(copy), None);
    }

    #[test]
    fn test_copy_shares_no_handles() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let before = ast.len();
        let copy = ast.copy_subtree(root);
        assert_eq!(ast.len(), before * 2);

        let mut original = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            original.push(id);
            stack.extend(ast.owned(id));
        }
        let mut copied = vec![copy];
        let mut stack = vec![copy];
        while let Some(id) = stack.pop() {
            let owned = ast.owned(id);
            copied.extend(owned.iter().copied());
            stack.extend(owned);
        }
        assert!(copied.iter().all(|id| !original.contains(id)));
    }

    #[test]
    fn test_copy_survives_changes_to_original() {
        let mut ast = Ast::new();
        let root = sample(&mut ast);
        let (copy, copy_root) = ast.extract(root);
        let expected = copy.render(copy_root);

        // Grow the original and then drop it entirely
        let extra = ident(&mut ast, "extra");
        ast.attach(root, extra);
        assert_ne!(ast.render(root), expected);
        drop(ast);

        assert_eq!(copy.render(copy_root), expected);
        assert!(copy.expr(copy_root).any_is_always_true());
    }

    #[test]
    fn test_graft_moves_subtree() {
        let mut left = Ast::new();
        let root = sample(&mut left);
        let (piece, piece_root) = left.extract(root);

        let mut target = Ast::new();
        let _unrelated = ident(&mut target, "id");
        let grafted = target.graft(piece, piece_root);
        assert_eq!(target.render(grafted), left.render(root));
    }

    // =========================================================================
    // Print
    // =========================================================================

    #[test]
    fn test_print_in_list_layout() {
        let mut ast = Ast::new();
        let tested = ident(&mut ast, "role");
        let a = string(&mut ast, "admin");
        let list = ast.add_with_children(
            NodeKind::Expr(Expr::InValuesList { expression: tested }),
            [a],
        );
        let mut out = String::new();
        ast.print(list, &mut out, 1, ' ').unwrap();
        assert_eq!(
            out,
            " InValuesList:\n{\n  Identifier: role\n In\n  Literal: 'admin'\n }\n"
        );
    }

    #[test]
    fn test_print_is_deterministic() {
        let mut first = Ast::new();
        let a = sample(&mut first);
        let mut second = Ast::new();
        let b = sample(&mut second);
        assert_eq!(first.render(a), second.render(b));
        assert!(first.render(a).starts_with("BooleanLogic: AND\n"));
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    #[test]
    fn test_conditions_collects_where_and_having() {
        let mut ast = Ast::new();
        let w_cond = ident(&mut ast, "active");
        let where_clause = ast.add_with_children(NodeKind::Syntax(Syntax::Where), [w_cond]);
        let h_cond = ident(&mut ast, "total");
        let having = ast.add_with_children(NodeKind::Syntax(Syntax::Having), [h_cond]);
        let select = ast.add_with_children(
            NodeKind::Syntax(Syntax::Select { distinct: false }),
            [where_clause, having],
        );
        assert_eq!(ast.conditions(select), vec![w_cond, h_cond]);
    }
}
