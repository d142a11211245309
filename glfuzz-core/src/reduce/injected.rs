//! Recognize code that the generator injected.
//!
//! Live code carries `GLF_live` names, dead code sits under a `_GLF_DEAD`
//! condition or in functions only dead code can reach, and every live loop
//! is bounded by a `GLF_live..._looplimiter..` counter that has to outlive
//! the loop it bounds.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{query, *};
use crate::fuzz::macros;

pub const LIVE_PREFIX: &str = "GLF_live";
pub const DEAD_PREFIX: &str = "GLF_dead";
const LIMITER_MARK: &str = "looplimiter";

pub fn is_live_name(name: &str) -> bool {
    name.starts_with(LIVE_PREFIX)
}

pub fn is_dead_name(name: &str) -> bool {
    name.starts_with(DEAD_PREFIX)
}

pub fn is_limiter_name(name: &str) -> bool {
    is_live_name(name) && name.contains(LIMITER_MARK)
}

/// `if (_GLF_DEAD(...)) ...`
pub fn is_dead_injection(s: &Stmt) -> bool {
    matches!(&s.kind, StmtKind::If { cond, .. } if macros::is_call_to(cond, macros::DEAD))
}

/// Whether `e` is, itself, a `_GLF_FUZZED(...)` call.
pub fn is_fuzzed_call(e: &Expr) -> bool {
    matches!(e.as_call(), Some((callee, _)) if callee == macros::FUZZED)
}

/// Variable names in `e`, leaving out `_GLF_FUZZED` subtrees.
fn names_outside_fuzzed<'a>(e: &'a Expr, out: &mut Vec<&'a str>) {
    if is_fuzzed_call(e) {
        return;
    }
    if let Some(name) = e.as_var() {
        out.push(name);
    }
    for c in e.children() {
        names_outside_fuzzed(c, out);
    }
}

fn stmt_names_outside_fuzzed<'a>(s: &'a Stmt, out: &mut Vec<&'a str>) {
    for e in s.exprs() {
        names_outside_fuzzed(e, out);
    }
    for c in s.child_stmts() {
        stmt_names_outside_fuzzed(c, out);
    }
}

fn references_live_var(e: &Expr) -> bool {
    let mut names = vec![];
    names_outside_fuzzed(e, &mut names);
    names.into_iter().any(is_live_name)
}

/// Whether some expression in `s` names a loop limiter.
pub fn references_limiter(s: &Stmt) -> bool {
    let mut names = vec![];
    stmt_names_outside_fuzzed(s, &mut names);
    names.into_iter().any(is_limiter_name)
}

/// Whether `s` declares a loop limiter.
pub fn declares_limiter(s: &Stmt) -> bool {
    matches!(&s.kind, StmtKind::Decl(d) if d.decls.iter().any(|i| is_limiter_name(&i.name)))
}

/// Variable at the root of an lvalue such as `a.b[i].c`.
fn root_var(e: &Expr) -> Option<&str> {
    match &e.kind {
        ExprKind::Var(name) => Some(name),
        ExprKind::Paren(inner) | ExprKind::Member { expr: inner, .. } | ExprKind::Index { expr: inner, .. } => {
            root_var(inner)
        }
        _ => None,
    }
}

fn is_live_effect(e: &Expr) -> bool {
    match &e.strip_parens().kind {
        ExprKind::Binary { op, lhs, .. } if op.is_assignment() => {
            root_var(lhs).map_or(false, is_live_name)
        }
        ExprKind::Unary { op, expr } if op.is_side_effecting() => {
            root_var(expr).map_or(false, is_live_name)
        }
        ExprKind::Call { callee, .. } => is_live_name(callee),
        _ => false,
    }
}

/// Statements live-code donation adds: writes to live variables, calls to
/// live functions, live declarations, and control flow over live variables.
pub fn is_live_injection(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Expr(e) => is_live_effect(e),
        StmtKind::Decl(d) => d.decls.iter().any(|i| is_live_name(&i.name)),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } | StmtKind::Do { cond, .. } => {
            references_live_var(cond)
        }
        StmtKind::Switch { expr, .. } => references_live_var(expr),
        StmtKind::For { init, cond, inc, .. } => {
            is_live_injection(init) || cond.iter().chain(inc.iter()).any(references_live_var)
        }
        _ => false,
    }
}

/// Whether `s` may return a value from the function, ignoring dead code.
pub fn returns_value(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Return(Some(_)) => true,
        StmtKind::If { else_stmt, .. } if is_dead_injection(s) => {
            else_stmt.as_deref().map_or(false, returns_value)
        }
        _ => s.child_stmts().into_iter().any(returns_value),
    }
}

fn live_calls(s: &Stmt, out: &mut Vec<String>) {
    if is_dead_injection(s) {
        if let StmtKind::If {
            else_stmt: Some(e), ..
        } = &s.kind
        {
            live_calls(e, out);
        }
        return;
    }
    for e in s.exprs() {
        for x in query::subexprs(e) {
            if let Some((callee, _)) = x.as_call() {
                out.push(callee.to_string());
            }
        }
    }
    for c in s.child_stmts() {
        live_calls(c, out);
    }
}

/// Functions that only dead code can call: donated dead functions, and
/// every function `main` does not reach through live code.
pub fn dead_functions(tu: &TranslationUnit) -> BTreeSet<String> {
    let mut work = vec!["main".to_string()];
    for v in tu.global_variables() {
        for init in v.decls.iter().filter_map(|i| i.initializer.as_ref()) {
            work.extend(query::subexprs(init).into_iter().filter_map(|x| x.as_call()).map(|(c, _)| c.to_string()));
        }
    }
    let mut live = BTreeSet::new();
    while let Some(name) = work.pop() {
        if !live.insert(name.clone()) {
            continue;
        }
        for f in tu.functions().filter(|f| f.name() == name) {
            for s in &f.body.stmts {
                live_calls(s, &mut work);
            }
        }
    }
    tu.functions()
        .map(|f| f.name())
        .filter(|n| is_dead_name(n) || !live.contains(*n))
        .map(String::from)
        .collect()
}

/// Loops whose removal would drop a reference to the limiter of a loop
/// further out.
pub fn pinned_loops(tu: &TranslationUnit) -> BTreeSet<NodeId> {
    let mut walk = LimiterWalk::default();
    for f in tu.functions() {
        walk.owners_in(&f.body);
    }
    for f in tu.functions() {
        for s in &f.body.stmts {
            walk.walk(s);
        }
    }
    walk.pinned
}

#[derive(Default)]
struct LimiterWalk {
    /// Limiter name to the loop declared right after it.
    owners: HashMap<String, NodeId>,
    loops: Vec<NodeId>,
    pinned: BTreeSet<NodeId>,
}

impl LimiterWalk {
    fn owners_in(&mut self, block: &Block) {
        for pair in block.stmts.windows(2) {
            if let (StmtKind::Decl(d), true) = (&pair[0].kind, pair[1].is_loop()) {
                for info in d.decls.iter().filter(|i| is_limiter_name(&i.name)) {
                    self.owners.insert(info.name.clone(), pair[1].id);
                }
            }
        }
        for s in &block.stmts {
            self.owners_in_stmt(s);
        }
    }

    fn owners_in_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => self.owners_in(b),
            _ => {
                for c in s.child_stmts() {
                    self.owners_in_stmt(c);
                }
            }
        }
    }

    fn walk(&mut self, s: &Stmt) {
        let is_loop = s.is_loop();
        if is_loop {
            self.loops.push(s.id);
        }
        let mut names = vec![];
        for e in s.exprs() {
            names_outside_fuzzed(e, &mut names);
        }
        for name in names.into_iter().filter(|n| is_limiter_name(n)) {
            self.reference(name);
        }
        for c in s.child_stmts() {
            self.walk(c);
        }
        if is_loop {
            self.loops.pop();
        }
    }

    fn reference(&mut self, name: &str) {
        let Some(owner) = self.owners.get(name).copied() else {
            return;
        };
        if let Some(pos) = self.loops.iter().rposition(|l| *l == owner) {
            self.pinned.extend(self.loops[pos + 1..].iter().copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_live_injections() {
        let tu = test::parse_frag(
            "void GLF_live2f() { }
             void main() {
               int GLF_live2x = 1;
               GLF_live2x++;
               GLF_live2f();
               if (GLF_live2x > 0) { }
               if (_GLF_FUZZED(GLF_live2x) > 0) { }
               int y = 0;
               y = GLF_live2x;
             }",
        );
        let body = &tu.main_function().unwrap().body.stmts;
        let live: Vec<bool> = body.iter().map(is_live_injection).collect();
        assert_eq!(live, vec![true, true, true, true, false, false, false]);
    }

    #[test]
    fn test_dead_functions() {
        let tu = test::parse_frag(
            "float GLF_dead0g() { return 1.0; }
             float f() { return 2.0; }
             float h() { return 3.0; }
             float unused() { return 4.0; }
             void main() {
               if (_GLF_DEAD(false)) { h(); }
               f();
             }",
        );
        let dead = dead_functions(&tu);
        assert!(dead.contains("GLF_dead0g"));
        assert!(dead.contains("h"));
        assert!(dead.contains("unused"));
        assert!(!dead.contains("f"));
        assert!(!dead.contains("main"));
    }

    #[test]
    fn test_limiter_references() {
        let tu = test::parse_frag(
            "void main() {
               int GLF_live0_looplimiter0 = 0;
               for (int i = 0; i < 4; i++) {
                 if (GLF_live0_looplimiter0 >= 5) { break; }
                 GLF_live0_looplimiter0++;
               }
             }",
        );
        let body = &tu.main_function().unwrap().body.stmts;
        assert!(declares_limiter(&body[0]));
        assert!(references_limiter(&body[1]));
        assert!(pinned_loops(&tu).is_empty());
    }

    #[test]
    fn test_inner_loop_holding_outer_limiter_is_pinned() {
        let tu = test::parse_frag(
            "void main() {
               int GLF_live0_looplimiter1 = 0;
               while (true) {
                 while (true) {
                   while (true) { GLF_live0_looplimiter1++; }
                 }
               }
             }",
        );
        let body = &tu.main_function().unwrap().body.stmts;
        let outer = &body[1];
        let middle = outer.child_stmts()[0].as_block().unwrap().stmts[0].clone();
        let inner = middle.child_stmts()[0].as_block().unwrap().stmts[0].id;
        let pinned = pinned_loops(&tu);
        assert!(!pinned.contains(&outer.id));
        assert!(pinned.contains(&middle.id));
        assert!(pinned.contains(&inner));
    }
}
