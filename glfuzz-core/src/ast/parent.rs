use std::collections::HashMap;

use super::*;
use crate::visit::{self, Visitor};

/// A node reachable from a tree, borrowed from one snapshot.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Function(&'a FunctionDefinition),
    Variables(&'a VariablesDeclaration),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::Function(f) => f.id,
            NodeRef::Variables(d) => d.id,
            NodeRef::Stmt(s) => s.id,
            NodeRef::Expr(e) => e.id,
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            NodeRef::Stmt(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            NodeRef::Expr(e) => Some(e),
            _ => None,
        }
    }
}

/// Snapshot of the structural parent of each node.
///
/// Types are interned and never appear here. Any structural edit invalidates
/// the map; build a new one for the edited tree.
pub struct ParentMap<'a> {
    nodes: HashMap<NodeId, NodeRef<'a>>,
    parents: HashMap<NodeId, NodeId>,
}

impl<'a> ParentMap<'a> {
    /// Build the map for a whole tree.
    ///
    /// Panics if a node id occurs twice, which means a subtree was copied
    /// back into the tree without `duplicate`.
    pub fn new(tu: &'a TranslationUnit) -> Self {
        let mut builder = Builder {
            map: ParentMap {
                nodes: HashMap::new(),
                parents: HashMap::new(),
            },
            stack: vec![],
        };
        builder.visit_unit(tu);
        builder.map
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRef<'a>> {
        self.nodes.get(&id).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeRef<'a>> {
        self.parents.get(&id).and_then(|p| self.node(*p))
    }

    pub fn parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Whether `id` sits anywhere below `ancestor`.
    pub fn is_under(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = id;
        while let Some(p) = self.parent_id(cur) {
            if p == ancestor {
                return true;
            }
            cur = p;
        }
        false
    }

    /// Ancestors from the direct parent up to the enclosing function.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeRef<'a>> + '_ {
        let mut cur = id;
        std::iter::from_fn(move || {
            let p = self.parent_id(cur)?;
            cur = p;
            self.node(p)
        })
    }

    /// The function definition containing the node.
    pub fn enclosing_function(&self, id: NodeId) -> Option<&'a FunctionDefinition> {
        self.ancestors(id).find_map(|n| match n {
            NodeRef::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Builder<'a> {
    map: ParentMap<'a>,
    stack: Vec<NodeId>,
}

impl<'a> Builder<'a> {
    fn record(&mut self, node: NodeRef<'a>) {
        let id = node.id();
        let old = self.map.nodes.insert(id, node);
        assert!(old.is_none(), "node {id} occurs more than once in the tree");
        if let Some(parent) = self.stack.last() {
            self.map.parents.insert(id, *parent);
        }
    }
}

impl<'a> Visitor<'a> for Builder<'a> {
    fn visit_function(&mut self, f: &'a FunctionDefinition) {
        self.record(NodeRef::Function(f));
        self.stack.push(f.id);
        visit::walk_function(self, f);
        self.stack.pop();
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        self.record(NodeRef::Stmt(stmt));
        self.stack.push(stmt.id);
        visit::walk_stmt(self, stmt);
        self.stack.pop();
    }

    fn visit_variables_declaration(&mut self, decl: &'a VariablesDeclaration) {
        self.record(NodeRef::Variables(decl));
        self.stack.push(decl.id);
        visit::walk_variables_declaration(self, decl);
        self.stack.pop();
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        self.record(NodeRef::Expr(expr));
        self.stack.push(expr.id);
        visit::walk_expr(self, expr);
        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_parents() {
        let tu = test::parse_frag("void main() { int a = 1; if (a > 0) a = 2; }");
        let map = ParentMap::new(&tu);
        let main = tu.main_function().unwrap();
        let if_stmt = &main.body.stmts[1];
        let then = match &if_stmt.kind {
            StmtKind::If { then_stmt, .. } => then_stmt,
            _ => unreachable!(),
        };
        assert_eq!(map.parent_id(if_stmt.id), Some(main.id));
        assert_eq!(map.parent_id(then.id), Some(if_stmt.id));
        assert!(map.is_under(then.id, main.id));
        assert_eq!(map.enclosing_function(then.id).map(|f| f.id), Some(main.id));
    }

    #[test]
    #[should_panic]
    fn test_aliasing_is_detected() {
        let mut tu = test::parse_frag("void main() { int a; }");
        let main = tu.main_function_mut().unwrap();
        let copy = main.body.stmts[0].clone();
        main.body.stmts.push(copy);
        let _ = ParentMap::new(&tu);
    }
}
