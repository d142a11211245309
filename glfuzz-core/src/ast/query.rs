//! Read-only questions about subtrees.

use std::collections::BTreeSet;

use super::*;
use crate::typing::builtins;

/// Prefix of the calls inserted by injection; they behave like their payload.
pub const MACRO_PREFIX: &str = "_GLF_";

/// Whether evaluating `e` can change program state. Calls to user-defined
/// functions count as side effects.
pub fn has_side_effects(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Binary { op, .. } if op.is_side_effecting() => true,
        ExprKind::Unary { op, .. } if op.is_side_effecting() => true,
        ExprKind::Call { callee, .. }
            if !builtins::is_pure_builtin(callee) && !callee.starts_with(MACRO_PREFIX) =>
        {
            true
        }
        _ => e.children().into_iter().any(has_side_effects),
    }
}

/// Whether executing `s` only evaluates side-effect free expressions and
/// can not transfer control.
pub fn stmt_has_side_effects(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Null => false,
        StmtKind::Expr(e) => has_side_effects(e),
        StmtKind::Block(b) => b.stmts.iter().any(stmt_has_side_effects),
        StmtKind::If {
            cond,
            then_stmt,
            else_stmt,
        } => {
            has_side_effects(cond)
                || stmt_has_side_effects(then_stmt)
                || else_stmt.as_deref().map(stmt_has_side_effects).unwrap_or(false)
        }
        _ => true,
    }
}

/// Whether some statement below `s`, or `s` itself, matches `pred`.
pub fn any_stmt(s: &Stmt, pred: &dyn Fn(&Stmt) -> bool) -> bool {
    pred(s) || s.child_stmts().into_iter().any(|c| any_stmt(c, pred))
}

pub fn contains_return(s: &Stmt) -> bool {
    any_stmt(s, &|s| matches!(s.kind, StmtKind::Return(_)))
}

pub fn block_contains_return(b: &Block) -> bool {
    b.stmts.iter().any(contains_return)
}

pub fn contains_switch(s: &Stmt) -> bool {
    any_stmt(s, &|s| matches!(s.kind, StmtKind::Switch { .. }))
}

pub fn contains_discard(s: &Stmt) -> bool {
    any_stmt(s, &|s| matches!(s.kind, StmtKind::Discard))
}

/// Whether a `break` or `continue` in `s` would leave or restart a loop
/// enclosing `s`.
pub fn has_escaping_break_or_continue(s: &Stmt) -> bool {
    escapes(s, false, false)
}

fn escapes(s: &Stmt, in_loop: bool, in_switch: bool) -> bool {
    match &s.kind {
        StmtKind::Break => !in_loop && !in_switch,
        StmtKind::Continue => !in_loop,
        StmtKind::For { body, .. } | StmtKind::While { body, .. } | StmtKind::Do { body, .. } => {
            escapes(body, true, in_switch)
        }
        StmtKind::Switch { body, .. } => body.stmts.iter().any(|c| escapes(c, in_loop, true)),
        _ => s
            .child_stmts()
            .into_iter()
            .any(|c| escapes(c, in_loop, in_switch)),
    }
}

/// Every expression in `s`, in pre-order.
pub fn exprs_in_stmt(s: &Stmt) -> Vec<&Expr> {
    let mut out = vec![];
    collect_stmt_exprs(s, &mut out);
    out
}

fn collect_stmt_exprs<'a>(s: &'a Stmt, out: &mut Vec<&'a Expr>) {
    if let StmtKind::For { init, .. } = &s.kind {
        collect_stmt_exprs(init, out);
        for e in s.exprs() {
            collect_exprs(e, out);
        }
        for c in s.child_stmts().into_iter().skip(1) {
            collect_stmt_exprs(c, out);
        }
        return;
    }
    for e in s.exprs() {
        collect_exprs(e, out);
    }
    for c in s.child_stmts() {
        collect_stmt_exprs(c, out);
    }
}

fn collect_exprs<'a>(e: &'a Expr, out: &mut Vec<&'a Expr>) {
    out.push(e);
    for c in e.children() {
        collect_exprs(c, out);
    }
}

/// Every expression below `e`, including `e`, in pre-order.
pub fn subexprs(e: &Expr) -> Vec<&Expr> {
    let mut out = vec![];
    collect_exprs(e, &mut out);
    out
}

/// Names read or written by `e`.
pub fn variables_in_expr(e: &Expr) -> BTreeSet<String> {
    subexprs(e)
        .into_iter()
        .filter_map(|x| x.as_var().map(str::to_string))
        .collect()
}

/// Names used by any expression in `s`.
pub fn variables_in_stmt(s: &Stmt) -> BTreeSet<String> {
    exprs_in_stmt(s)
        .into_iter()
        .filter_map(|x| x.as_var().map(str::to_string))
        .collect()
}

/// Names of functions called in `s`.
pub fn calls_in_stmt(s: &Stmt) -> BTreeSet<String> {
    exprs_in_stmt(s)
        .into_iter()
        .filter_map(|x| x.as_call().map(|(c, _)| c.to_string()))
        .collect()
}

/// Struct names mentioned by declarations or constructors in `s`.
pub fn structs_in_stmt(s: &Stmt) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut note = |t: TypeRef| {
        if let Some(n) = t.without_qualifiers().struct_name() {
            out.insert(n);
        } else if let Some(n) = t.array_element().and_then(|t| t.struct_name()) {
            out.insert(n);
        }
    };
    let mut stack = vec![s];
    while let Some(cur) = stack.pop() {
        if let StmtKind::Decl(d) = &cur.kind {
            note(d.base_type);
        }
        stack.extend(cur.child_stmts());
    }
    for e in exprs_in_stmt(s) {
        if let ExprKind::Constructor { ty, .. } = &e.kind {
            note(*ty);
        }
    }
    out
}

/// Names of variables declared anywhere in `s`.
pub fn declared_in_stmt(s: &Stmt) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut stack = vec![s];
    while let Some(cur) = stack.pop() {
        if let StmtKind::Decl(d) = &cur.kind {
            out.extend(d.decls.iter().map(|i| i.name.clone()));
        }
        stack.extend(cur.child_stmts());
    }
    out
}

/// Names used in the whole program: variables, called functions and
/// struct names used as types or constructors.
pub fn all_referenced_names(tu: &TranslationUnit) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for decl in &tu.decls {
        match decl {
            Decl::Function(f) => {
                for s in &f.body.stmts {
                    out.extend(variables_in_stmt(s));
                    out.extend(calls_in_stmt(s));
                }
            }
            Decl::Variables(v) => {
                for e in v.decls.iter().filter_map(|i| i.initializer.as_ref()) {
                    out.extend(variables_in_expr(e));
                    for x in subexprs(e) {
                        if let Some((c, _)) = x.as_call() {
                            out.insert(c.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Whether the body of the function ends in a `return` and has no other.
pub fn has_only_trailing_return(body: &Block) -> bool {
    match body.stmts.split_last() {
        None => true,
        Some((last, rest)) => {
            !rest.iter().any(contains_return)
                && (matches!(last.kind, StmtKind::Return(_)) || !contains_return(last))
        }
    }
}

/// A representative value of the type, used to stand in for expressions
/// and uninitialised variables: `1`, `1u`, `1.0`, `true`, `vec2(1.0)`,
/// `S(...)` with canonical fields, and `T[n](...)`.
pub fn canonical_constant(
    ty: TypeRef,
    structs: &dyn Fn(&str) -> Option<StructDefinition>,
) -> Option<Expr> {
    let ty = ty.without_qualifiers();
    match ty.kind() {
        TypeKind::Basic(b) => {
            let scalar = canonical_scalar(b.element_type());
            if b.is_scalar() {
                Some(scalar)
            } else {
                Some(Expr::constructor(ty, vec![scalar]))
            }
        }
        TypeKind::Struct(name) => {
            let def = structs(&name)?;
            let args = def
                .fields
                .iter()
                .map(|f| canonical_constant(f.ty, structs))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::constructor(ty, args))
        }
        TypeKind::Array {
            base,
            size: Some(n),
        } => {
            let elem = canonical_constant(base, structs)?;
            let args = (0..n).map(|_| elem.duplicate()).collect();
            Some(Expr::constructor(ty, args))
        }
        _ => None,
    }
}

fn canonical_scalar(b: BasicType) -> Expr {
    let text = b.canonical_literal();
    match b {
        BasicType::Bool => Expr::boolean(true),
        BasicType::UInt => Expr::new(ExprKind::UInt(text.to_string())),
        BasicType::Float => Expr::float(text),
        _ => Expr::new(ExprKind::Int(text.to_string())),
    }
}

/// Number of statements and expressions, a rough program size.
pub fn node_count(tu: &TranslationUnit) -> usize {
    let mut n = 0;
    for decl in &tu.decls {
        n += 1;
        match decl {
            Decl::Function(f) => {
                for s in &f.body.stmts {
                    n += count_stmt(s);
                }
            }
            Decl::Variables(v) => {
                for e in v.decls.iter().filter_map(|i| i.initializer.as_ref()) {
                    n += subexprs(e).len();
                }
            }
            _ => {}
        }
    }
    n
}

/// Number of statements and expressions of a function body.
pub fn function_node_count(f: &FunctionDefinition) -> usize {
    f.body.stmts.iter().map(count_stmt).sum()
}

pub fn count_stmt(s: &Stmt) -> usize {
    1 + s.exprs().into_iter().map(|e| subexprs(e).len()).sum::<usize>()
        + s.child_stmts().into_iter().map(count_stmt).sum::<usize>()
}

/// Whether the statement is `{}` or `;`.
pub fn is_empty_stmt(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Null => true,
        StmtKind::Block(b) => b.stmts.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn main_stmt(src: &str, index: usize) -> Stmt {
        let tu = test::parse_frag(src);
        tu.main_function().unwrap().body.stmts[index].clone()
    }

    #[test]
    fn test_side_effects() {
        let src = "int f() { return 1; }
            void main() { int a; a + sin(1.0); a++; f(); _GLF_IDENTITY(a, a); }";
        assert!(!stmt_has_side_effects(&main_stmt(src, 1)));
        assert!(stmt_has_side_effects(&main_stmt(src, 2)));
        assert!(stmt_has_side_effects(&main_stmt(src, 3)));
        assert!(!stmt_has_side_effects(&main_stmt(src, 4)));
    }

    #[test]
    fn test_escaping_jumps() {
        let src = "void main() {
            for (;;) { break; }
            { continue; }
            switch (1) { case 1: break; }
        }";
        assert!(!has_escaping_break_or_continue(&main_stmt(src, 0)));
        assert!(has_escaping_break_or_continue(&main_stmt(src, 1)));
        assert!(!has_escaping_break_or_continue(&main_stmt(src, 2)));
    }

    #[test]
    fn test_canonical_constants() {
        let tu = test::parse_frag("struct S { int a; vec2 b; }; void main() { }");
        let lookup = |n: &str| tu.struct_definition(n).cloned();
        let render = |t| render_expr(&canonical_constant(t, &lookup).unwrap());
        assert_eq!(render(TypeRef::basic(BasicType::Float)), "1.0");
        assert_eq!(render(TypeRef::basic(BasicType::UVec2)), "uvec2(1u)");
        assert_eq!(render(TypeRef::struct_named("S")), "S(1, vec2(1.0))");
        assert_eq!(
            render(TypeRef::array(TypeRef::basic(BasicType::Bool), Some(2))),
            "bool[2](true, true)"
        );
        assert!(canonical_constant(TypeRef::opaque("sampler2D"), &lookup).is_none());
    }

    #[test]
    fn test_trailing_return() {
        let tu = test::parse_frag(
            "int f(int x) { x++; return x; }
             int g(int x) { if (x > 0) return 1; return 2; }
             void main() { }",
        );
        assert!(has_only_trailing_return(&tu.function("f").unwrap().body));
        assert!(!has_only_trailing_return(&tu.function("g").unwrap().body));
        assert!(has_only_trailing_return(&tu.function("main").unwrap().body));
    }
}
