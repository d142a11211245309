//! Places where a statement can be injected.

use crate::ast::*;
use crate::typing::Scope;
use crate::visit::{self, Visitor};

/// A position inside a block, with what is visible from there.
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    /// Owner of the block; the new statement goes before `stmts[index]`.
    pub block: NodeId,
    pub index: usize,
    pub scope: Scope,
    pub function: NodeId,
    pub return_type: TypeRef,
    /// A `continue` would be legal here.
    pub in_loop: bool,
    /// A `break` would be legal here.
    pub can_break: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Breakable {
    Loop,
    Switch,
}

struct InjectionPointFinder {
    scope: Scope,
    function: Option<(NodeId, TypeRef)>,
    breakables: Vec<Breakable>,
    switches: Vec<NodeId>,
    found: Vec<InjectionPoint>,
}

impl InjectionPointFinder {
    fn record(&mut self, owner: NodeId, index: usize) {
        if self.switches.contains(&owner) {
            return;
        }
        let (function, return_type) = match self.function {
            Some(f) => f,
            None => return,
        };
        self.found.push(InjectionPoint {
            block: owner,
            index,
            scope: self.scope.shallow_clone(),
            function,
            return_type,
            in_loop: self.breakables.contains(&Breakable::Loop),
            can_break: !self.breakables.is_empty(),
        });
    }
}

impl<'a> Visitor<'a> for InjectionPointFinder {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn enter_function(&mut self, f: &'a FunctionDefinition) {
        self.function = Some((f.id, f.prototype.return_type));
    }

    fn leave_function(&mut self, _f: &'a FunctionDefinition) {
        self.function = None;
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        let breakable = match stmt.kind {
            StmtKind::Switch { .. } => {
                self.switches.push(stmt.id);
                Some(Breakable::Switch)
            }
            _ if stmt.is_loop() => Some(Breakable::Loop),
            _ => None,
        };
        if let Some(b) = breakable {
            self.breakables.push(b);
        }
        visit::walk_stmt(self, stmt);
        if breakable.is_some() {
            self.breakables.pop();
        }
    }

    fn visit_block_child(&mut self, owner: NodeId, block: &'a Block, index: usize) {
        self.record(owner, index);
        self.visit_stmt(&block.stmts[index]);
    }

    fn leave_block(&mut self, owner: NodeId, block: &'a Block) {
        self.record(owner, block.stmts.len());
    }
}

/// Every position before, between and after the statements of each block
/// inside a function, switch bodies excepted.
pub fn find_injection_points(tu: &TranslationUnit) -> Vec<InjectionPoint> {
    let mut finder = InjectionPointFinder {
        scope: Scope::new(),
        function: None,
        breakables: vec![],
        switches: vec![],
        found: vec![],
    };
    finder.visit_unit(tu);
    finder.found
}

#[test]
fn test_injection_points() {
    let tu = crate::test::parse_frag(
        "#version 310 es
         int g;
         void main() {
           int a;
           for (int i = 0; i < 2; i++) { int b; }
           switch (a) { case 0: break; }
         }",
    );
    let points = find_injection_points(&tu);
    // Four in the body of main, two in the loop body, none in the switch.
    assert_eq!(points.len(), 6);
    let in_loop: Vec<&InjectionPoint> = points.iter().filter(|p| p.in_loop).collect();
    assert_eq!(in_loop.len(), 2);
    assert!(in_loop.iter().all(|p| p.can_break));
    assert!(in_loop[0].scope.lookup("i").is_some());
    assert!(in_loop[0].scope.lookup("b").is_none());
    assert!(in_loop[1].scope.lookup("b").is_some());
    let first = &points[0];
    assert!(first.scope.lookup("g").is_some());
    assert!(first.scope.lookup("a").is_none());
    assert!(first.return_type.is_void());
}
