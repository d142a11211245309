//! Traversal framework
//!
//! `Visitor` is a depth-first walker over a borrowed tree. Children are
//! visited left to right, each exactly once. When the visitor exposes a
//! `Scope`, the walker keeps it in sync: a frame is pushed around every
//! function, loop and scoped block, and a variable is added once its
//! initializer has been visited. Anything a visit observes in the scope was
//! therefore declared before that point.
//!
//! `VisitorMut` walks a mutable tree with no scope tracking, for passes that
//! rewrite nodes in place after a read-only scan has decided what to change.

use crate::ast::*;
use crate::typing::{DeclSite, Scope, ScopeEntry};

pub trait Visitor<'a> {
    /// Scope kept in sync by the walker, if the visitor tracks one.
    fn scope(&mut self) -> Option<&mut Scope> {
        None
    }

    /// Do not visit the header of a `for` loop. Used for languages whose loop
    /// headers must keep a fixed shape; the loop variable is still declared.
    fn skip_for_header(&self) -> bool {
        false
    }

    fn visit_unit(&mut self, tu: &'a TranslationUnit) {
        walk_unit(self, tu)
    }

    fn visit_decl(&mut self, decl: &'a Decl) {
        walk_decl(self, decl)
    }

    fn visit_function(&mut self, f: &'a FunctionDefinition) {
        walk_function(self, f)
    }

    fn enter_function(&mut self, _f: &'a FunctionDefinition) {}

    fn leave_function(&mut self, _f: &'a FunctionDefinition) {}

    /// `owner` is the id of the function, block statement or switch that owns the block.
    fn visit_block(&mut self, owner: NodeId, block: &'a Block) {
        walk_block(self, owner, block)
    }

    /// Called after the block's scope frame is pushed.
    fn enter_block(&mut self, _owner: NodeId, _block: &'a Block) {}

    /// Called while the block's scope frame is still active.
    fn leave_block(&mut self, _owner: NodeId, _block: &'a Block) {}

    fn visit_block_child(&mut self, _owner: NodeId, block: &'a Block, index: usize) {
        self.visit_stmt(&block.stmts[index])
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        walk_stmt(self, stmt)
    }

    fn visit_variables_declaration(&mut self, decl: &'a VariablesDeclaration) {
        walk_variables_declaration(self, decl)
    }

    fn visit_declarator(&mut self, decl: &'a VariablesDeclaration, info: &'a VariableDeclInfo) {
        walk_declarator(self, decl, info)
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        walk_expr(self, expr)
    }
}

fn push_scope<'a, V: Visitor<'a> + ?Sized>(v: &mut V) {
    if let Some(scope) = v.scope() {
        scope.push();
    }
}

fn pop_scope<'a, V: Visitor<'a> + ?Sized>(v: &mut V) {
    if let Some(scope) = v.scope() {
        scope.pop();
    }
}

pub fn walk_unit<'a, V: Visitor<'a> + ?Sized>(v: &mut V, tu: &'a TranslationUnit) {
    for decl in &tu.decls {
        v.visit_decl(decl);
    }
}

pub fn walk_decl<'a, V: Visitor<'a> + ?Sized>(v: &mut V, decl: &'a Decl) {
    match decl {
        Decl::Function(f) => v.visit_function(f),
        Decl::Variables(d) => v.visit_variables_declaration(d),
        Decl::Struct(s) => {
            if let Some(scope) = v.scope() {
                scope.add_struct(s);
            }
        }
        Decl::Prototype(_) | Decl::Precision { .. } | Decl::Directive(_) => {}
    }
}

pub fn walk_function<'a, V: Visitor<'a> + ?Sized>(v: &mut V, f: &'a FunctionDefinition) {
    push_scope(v);
    if let Some(scope) = v.scope() {
        for (index, param) in f.prototype.params.iter().enumerate() {
            if let Some(name) = &param.name {
                scope.add(
                    name,
                    ScopeEntry {
                        ty: param.full_type(),
                        site: DeclSite::Parameter {
                            function: f.id,
                            index,
                        },
                    },
                );
            }
        }
    }
    v.enter_function(f);
    v.visit_block(f.id, &f.body);
    v.leave_function(f);
    pop_scope(v);
}

pub fn walk_block<'a, V: Visitor<'a> + ?Sized>(v: &mut V, owner: NodeId, block: &'a Block) {
    if block.new_scope {
        push_scope(v);
    }
    v.enter_block(owner, block);
    for index in 0..block.stmts.len() {
        v.visit_block_child(owner, block, index);
    }
    v.leave_block(owner, block);
    if block.new_scope {
        pop_scope(v);
    }
}

pub fn walk_stmt<'a, V: Visitor<'a> + ?Sized>(v: &mut V, stmt: &'a Stmt) {
    match &stmt.kind {
        StmtKind::Block(b) => v.visit_block(stmt.id, b),
        StmtKind::Decl(d) => v.visit_variables_declaration(d),
        StmtKind::Expr(e) => v.visit_expr(e),
        StmtKind::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            v.visit_expr(cond);
            v.visit_stmt(then_stmt);
            if let Some(e) = else_stmt {
                v.visit_stmt(e);
            }
        }
        StmtKind::For {
            init,
            cond,
            inc,
            body,
        } => {
            push_scope(v);
            if v.skip_for_header() {
                declare_without_visiting(v, init);
            } else {
                v.visit_stmt(init);
                if let Some(c) = cond {
                    v.visit_expr(c);
                }
                if let Some(i) = inc {
                    v.visit_expr(i);
                }
            }
            v.visit_stmt(body);
            pop_scope(v);
        }
        StmtKind::While { cond, body } => {
            push_scope(v);
            v.visit_expr(cond);
            v.visit_stmt(body);
            pop_scope(v);
        }
        StmtKind::Do { body, cond } => {
            v.visit_stmt(body);
            v.visit_expr(cond);
        }
        StmtKind::Switch { expr, body } => {
            v.visit_expr(expr);
            v.visit_block(stmt.id, body);
        }
        StmtKind::Case(Some(e)) | StmtKind::Return(Some(e)) => v.visit_expr(e),
        StmtKind::Case(None)
        | StmtKind::Return(None)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Discard
        | StmtKind::Null => {}
    }
}

fn declare_without_visiting<'a, V: Visitor<'a> + ?Sized>(v: &mut V, init: &'a Stmt) {
    if let StmtKind::Decl(d) = &init.kind {
        if let Some(scope) = v.scope() {
            for info in &d.decls {
                scope.add(&info.name, ScopeEntry::variable(d, info));
            }
        }
    }
}

pub fn walk_variables_declaration<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    decl: &'a VariablesDeclaration,
) {
    for info in &decl.decls {
        v.visit_declarator(decl, info);
    }
}

pub fn walk_declarator<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    decl: &'a VariablesDeclaration,
    info: &'a VariableDeclInfo,
) {
    if let Some(init) = &info.initializer {
        v.visit_expr(init);
    }
    if let Some(scope) = v.scope() {
        scope.add(&info.name, ScopeEntry::variable(decl, info));
    }
}

pub fn walk_expr<'a, V: Visitor<'a> + ?Sized>(v: &mut V, expr: &'a Expr) {
    for child in expr.children() {
        v.visit_expr(child);
    }
}

/// Mutable walker without scope tracking.
pub trait VisitorMut {
    fn visit_unit_mut(&mut self, tu: &mut TranslationUnit) {
        walk_unit_mut(self, tu)
    }

    fn visit_function_mut(&mut self, f: &mut FunctionDefinition) {
        walk_function_mut(self, f)
    }

    fn visit_prototype_mut(&mut self, _p: &mut FunctionPrototype) {}

    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block)
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt)
    }

    fn visit_variables_declaration_mut(&mut self, decl: &mut VariablesDeclaration) {
        walk_variables_declaration_mut(self, decl)
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr)
    }
}

pub fn walk_unit_mut<V: VisitorMut + ?Sized>(v: &mut V, tu: &mut TranslationUnit) {
    for decl in tu.decls.iter_mut() {
        match decl {
            Decl::Function(f) => v.visit_function_mut(f),
            Decl::Prototype(p) => v.visit_prototype_mut(p),
            Decl::Variables(d) => v.visit_variables_declaration_mut(d),
            Decl::Struct(_) | Decl::Precision { .. } | Decl::Directive(_) => {}
        }
    }
}

pub fn walk_function_mut<V: VisitorMut + ?Sized>(v: &mut V, f: &mut FunctionDefinition) {
    v.visit_prototype_mut(&mut f.prototype);
    v.visit_block_mut(&mut f.body);
}

pub fn walk_block_mut<V: VisitorMut + ?Sized>(v: &mut V, block: &mut Block) {
    for stmt in block.stmts.iter_mut() {
        v.visit_stmt_mut(stmt);
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Block(b) => v.visit_block_mut(b),
        StmtKind::Decl(d) => v.visit_variables_declaration_mut(d),
        StmtKind::Expr(e) => v.visit_expr_mut(e),
        StmtKind::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            v.visit_expr_mut(cond);
            v.visit_stmt_mut(then_stmt);
            if let Some(e) = else_stmt {
                v.visit_stmt_mut(e);
            }
        }
        StmtKind::For {
            init,
            cond,
            inc,
            body,
        } => {
            v.visit_stmt_mut(init);
            if let Some(c) = cond {
                v.visit_expr_mut(c);
            }
            if let Some(i) = inc {
                v.visit_expr_mut(i);
            }
            v.visit_stmt_mut(body);
        }
        StmtKind::While { cond, body } => {
            v.visit_expr_mut(cond);
            v.visit_stmt_mut(body);
        }
        StmtKind::Do { body, cond } => {
            v.visit_stmt_mut(body);
            v.visit_expr_mut(cond);
        }
        StmtKind::Switch { expr, body } => {
            v.visit_expr_mut(expr);
            v.visit_block_mut(body);
        }
        StmtKind::Case(Some(e)) | StmtKind::Return(Some(e)) => v.visit_expr_mut(e),
        StmtKind::Case(None)
        | StmtKind::Return(None)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Discard
        | StmtKind::Null => {}
    }
}

pub fn walk_variables_declaration_mut<V: VisitorMut + ?Sized>(
    v: &mut V,
    decl: &mut VariablesDeclaration,
) {
    for info in decl.decls.iter_mut() {
        if let Some(init) = &mut info.initializer {
            v.visit_expr_mut(init);
        }
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) {
    for child in expr.children_mut() {
        v.visit_expr_mut(child);
    }
}

/// Rename every use of a variable; declarations are left alone.
pub struct VariableRenamer<'n> {
    pub from: &'n str,
    pub to: &'n str,
}

impl VisitorMut for VariableRenamer<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let ExprKind::Var(name) = &mut expr.kind {
            if name == self.from {
                *name = self.to.to_string();
            }
        }
        walk_expr_mut(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    /// Records, for each variable use, the names visible at that point.
    struct VisibleNames {
        scope: Scope,
        seen: Vec<(String, Vec<String>)>,
    }

    impl<'a> Visitor<'a> for VisibleNames {
        fn scope(&mut self) -> Option<&mut Scope> {
            Some(&mut self.scope)
        }

        fn visit_expr(&mut self, expr: &'a Expr) {
            if let Some(name) = expr.as_var() {
                self.seen
                    .push((name.to_string(), self.scope.names_of_all_variables()));
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_scope_follows_declaration_order() {
        let tu = test::parse_frag(
            "int g; void main() { int a = g; { int b = a; } int c = a; }",
        );
        let mut v = VisibleNames {
            scope: Scope::new(),
            seen: vec![],
        };
        v.visit_unit(&tu);
        let names: Vec<_> = v.seen.iter().map(|(n, vis)| (n.as_str(), vis.join(","))).collect();
        assert_eq!(
            names,
            vec![("g", "g".to_string()), ("a", "a,g".to_string()), ("a", "a,g".to_string())]
        );
    }

    #[test]
    fn test_initializer_sees_outer_variable() {
        let tu = test::parse_frag("void main() { int x = 1; { int x = x; } }");
        let mut v = VisibleNames {
            scope: Scope::new(),
            seen: vec![],
        };
        v.visit_unit(&tu);
        assert_eq!(v.seen.len(), 1);
        assert_eq!(v.seen[0].1, vec!["x".to_string()]);
    }

    #[test]
    fn test_renamer() {
        let mut tu = test::parse_frag("void main() { int a; a = a + 1; }");
        VariableRenamer { from: "a", to: "b" }.visit_unit_mut(&mut tu);
        test::assert_same_program(&tu, "void main() { int a; b = b + 1; }");
    }
}
