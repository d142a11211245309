use std::collections::HashMap;

use super::{Scope, ScopeEntry};
use crate::ast::*;
use crate::visit::{self, Visitor};

/// Declaration each variable use resolves to, for one tree snapshot.
///
/// Uses of builtin variables and of undeclared names have no entry.
#[derive(Debug, Default)]
pub struct Bindings {
    uses: HashMap<NodeId, ScopeEntry>,
}

impl Bindings {
    pub fn new(tu: &TranslationUnit) -> Self {
        let mut resolver = Resolver {
            scope: Scope::new(),
            uses: HashMap::new(),
        };
        resolver.visit_unit(tu);
        Self {
            uses: resolver.uses,
        }
    }

    /// Entry the variable expression `expr` refers to.
    pub fn entry(&self, expr: NodeId) -> Option<&ScopeEntry> {
        self.uses.get(&expr)
    }

    /// Ids of the variable expressions that refer to the declarator `info`.
    pub fn uses_of(&self, info: NodeId) -> Vec<NodeId> {
        let mut found: Vec<NodeId> = self
            .uses
            .iter()
            .filter(|(_, e)| e.declarator() == Some(info))
            .map(|(id, _)| *id)
            .collect();
        found.sort();
        found
    }

    pub fn is_used(&self, info: NodeId) -> bool {
        self.uses.values().any(|e| e.declarator() == Some(info))
    }

    pub fn refers_to(&self, expr: NodeId, info: NodeId) -> bool {
        self.entry(expr).and_then(|e| e.declarator()) == Some(info)
    }
}

struct Resolver {
    scope: Scope,
    uses: HashMap<NodeId, ScopeEntry>,
}

impl<'a> Visitor<'a> for Resolver {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        if let Some(name) = expr.as_var() {
            if let Some(entry) = self.scope.lookup(name) {
                self.uses.insert(expr.id, entry.clone());
            }
        }
        visit::walk_expr(self, expr);
    }
}

#[test]
fn test_bindings_follow_shadowing() {
    let tu = crate::test::parse_frag("int a; void main() { a = 1; int a = 2; a++; }");
    let bindings = Bindings::new(&tu);
    let global = match &tu.decls[0] {
        Decl::Variables(v) => v.decls[0].id,
        _ => unreachable!(),
    };
    let main = tu.main_function().unwrap();
    let local = match &main.body.stmts[1].kind {
        StmtKind::Decl(d) => d.decls[0].id,
        _ => unreachable!(),
    };
    assert_eq!(bindings.uses_of(global).len(), 1);
    assert_eq!(bindings.uses_of(local).len(), 1);
    assert!(bindings.is_used(local));
}
