use std::collections::HashMap;

use super::injected::returns_value;
use crate::ast::{query, *};
use crate::fuzz::macros;
use crate::GlFuzzError;

/// What an unwrapping keeps of the statement it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapKind {
    /// A nested block, whose statements move into the enclosing block.
    Block,
    /// The then branch of `if (_GLF_WRAPPED_IF_TRUE(...))`.
    Then,
    /// The else branch of `if (_GLF_WRAPPED_IF_FALSE(...))`.
    Else,
    /// The body of a `_GLF_WRAPPED_LOOP` loop, as a block.
    Loop,
}

/// One way to shrink a shader. Found by scanning one snapshot and applied
/// to the same tree or a clone of it; an opportunity whose target moved or
/// disappeared since the scan does nothing.
#[derive(Debug, Clone)]
pub enum ReductionOpportunity {
    /// Read one component of a merged vector from its own variable again.
    Vectorization {
        block: NodeId,
        name: String,
        ty: TypeRef,
        /// The variable has to be declared at the start of `block`.
        declare: bool,
        lookups: Vec<NodeId>,
    },
    /// Replace one injection macro call by its payload.
    Mutation { call: NodeId },
    RemoveStmt { function: NodeId, stmt: NodeId },
    /// Remove a function definition or prototype.
    RemoveFunction { id: NodeId },
    ExprToConstant { expr: NodeId, ty: TypeRef },
    /// Replace a compound expression by one of its children.
    ReplaceWithChild { expr: NodeId, child: NodeId },
    /// Put the expression of a single-return outlined function back in
    /// place of the call.
    InlineOutlined { call: NodeId },
    Unwrap { stmt: NodeId, kind: UnwrapKind },
    /// Turn a struct replacement variable back into the variable it hides.
    Destructify {
        decl_stmt: NodeId,
        info: NodeId,
        name: String,
        ty: TypeRef,
        /// Field positions from the outer struct down to the variable.
        path: Vec<usize>,
        lookups: Vec<NodeId>,
    },
    /// Remove one declarator; `stmt` is the declaration statement for
    /// locals and `None` for globals.
    RemoveDeclarator {
        stmt: Option<NodeId>,
        decl: NodeId,
        info: NodeId,
    },
}

impl ReductionOpportunity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vectorization { .. } => "vectorization",
            Self::Mutation { .. } => "mutation",
            Self::RemoveStmt { .. } => "remove statement",
            Self::RemoveFunction { .. } => "remove function",
            Self::ExprToConstant { .. } => "expression to constant",
            Self::ReplaceWithChild { .. } => "compound expression to sub-expression",
            Self::InlineOutlined { .. } => "inline outlined statement",
            Self::Unwrap { .. } => "unwrap",
            Self::Destructify { .. } => "destructify",
            Self::RemoveDeclarator { .. } => "remove declarator",
        }
    }

    /// Whether the tree still has what the opportunity needs.
    pub fn precondition_holds(&self, tu: &TranslationUnit) -> bool {
        match self {
            Self::Vectorization {
                block, name, declare, ..
            } => match block_of(tu, *block) {
                Some(b) => !*declare || !declares_directly(b, name),
                None => false,
            },
            Self::Mutation { call } => tu
                .find_expr(*call)
                .and_then(|e| e.as_call())
                .map_or(false, |(callee, _)| macros::is_injection_macro(callee)),
            Self::RemoveStmt { function, stmt } => stmt_removal_holds(tu, *function, *stmt),
            Self::RemoveFunction { id } => function_decl_index(tu, *id).is_some(),
            Self::ExprToConstant { expr, .. } => tu.find_expr(*expr).is_some(),
            Self::ReplaceWithChild { expr, child } => {
                tu.find_expr(*expr).map_or(false, |e| e.has_child(*child))
            }
            Self::InlineOutlined { call } => outlined_expansion(tu, *call).is_some(),
            Self::Unwrap { stmt, kind } => match tu.find_stmt(*stmt) {
                Some(s) if *kind == UnwrapKind::Block => {
                    s.as_block().is_some() && tu.locate_stmt(*stmt).is_some()
                }
                Some(s) => unwrapped(s, *kind).is_some(),
                None => false,
            },
            Self::Destructify { decl_stmt, info, .. } => matches!(
                tu.find_stmt(*decl_stmt).map(|s| &s.kind),
                Some(StmtKind::Decl(d)) if d.decls.len() == 1 && d.decls[0].id == *info
            ),
            Self::RemoveDeclarator { stmt, decl, info } => match stmt {
                Some(s) => matches!(
                    tu.find_stmt(*s).map(|s| &s.kind),
                    Some(StmtKind::Decl(d)) if d.id == *decl && d.decls.iter().any(|i| i.id == *info)
                ),
                None => tu
                    .global_variables()
                    .any(|v| v.id == *decl && v.decls.iter().any(|i| i.id == *info)),
            },
        }
    }

    /// Apply the opportunity to `tu`. Returns false, leaving `tu` alone,
    /// when the precondition no longer holds.
    pub fn apply(&self, tu: &mut TranslationUnit) -> bool {
        if !self.precondition_holds(tu) {
            crate::log!(trace, "stale {} opportunity", self.name());
            return false;
        }
        match self {
            Self::Vectorization {
                block,
                name,
                ty,
                declare,
                lookups,
            } => {
                let replaced = lookups
                    .iter()
                    .filter(|id| tu.replace_expr(**id, Expr::var(name)).is_some())
                    .count();
                if replaced == 0 {
                    return false;
                }
                if *declare {
                    if let Some(b) = tu.find_block_mut(*block) {
                        b.stmts
                            .insert(0, Stmt::decl(VariablesDeclaration::single(*ty, name, None)));
                    }
                }
                true
            }
            Self::Mutation { call } => macros::eliminate_macro_call(tu, *call),
            Self::RemoveStmt { stmt, .. } => tu.remove_stmt(*stmt).is_some(),
            Self::RemoveFunction { id } => match function_decl_index(tu, *id) {
                Some(index) => {
                    tu.decls.remove(index);
                    true
                }
                None => false,
            },
            Self::ExprToConstant { expr, ty } => {
                let constant = query::canonical_constant(*ty, &|n| tu.struct_definition(n).cloned());
                match constant {
                    Some(c) => tu.replace_expr(*expr, c).is_some(),
                    None => false,
                }
            }
            Self::ReplaceWithChild { expr, child } => match replace_with_child(tu, *expr, *child) {
                Ok(()) => true,
                Err(err) => {
                    crate::log!(debug, "fail to replace {expr:?} by {child:?}: {err}");
                    false
                }
            },
            Self::InlineOutlined { call } => match outlined_expansion(tu, *call) {
                Some(e) => tu.replace_expr(*call, e).is_some(),
                None => false,
            },
            Self::Unwrap { stmt, kind } => unwrap(tu, *stmt, *kind).is_some(),
            Self::Destructify {
                decl_stmt,
                name,
                ty,
                path,
                lookups,
                ..
            } => {
                for id in lookups {
                    tu.replace_expr(*id, Expr::var(name));
                }
                let init = match tu.find_stmt_mut(*decl_stmt).map(|s| &mut s.kind) {
                    Some(StmtKind::Decl(d)) => d.decls[0]
                        .initializer
                        .take()
                        .and_then(|e| component_of(e, path)),
                    _ => None,
                };
                let decl = VariablesDeclaration::single(*ty, name, init);
                tu.replace_stmt(*decl_stmt, Stmt::decl(decl)).is_some()
            }
            Self::RemoveDeclarator { stmt, decl, info } => {
                remove_declarator(tu, *stmt, *decl, *info)
            }
        }
    }
}

/// Block owned by the function, block statement or switch `owner`.
pub(super) fn block_of(tu: &TranslationUnit, owner: NodeId) -> Option<&Block> {
    if let Some(f) = tu.function_by_id(owner) {
        return Some(&f.body);
    }
    match &tu.find_stmt(owner)?.kind {
        StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => Some(b),
        _ => None,
    }
}

pub(super) fn declares_directly(block: &Block, name: &str) -> bool {
    block.stmts.iter().any(|s| match &s.kind {
        StmtKind::Decl(d) => d.decls.iter().any(|i| i.name == name),
        _ => false,
    })
}

fn is_case(s: &Stmt) -> bool {
    matches!(s.kind, StmtKind::Case(_))
}

/// Whether removing `stmts[index]` from a switch body leaves a label with
/// nothing after it, or a body that does not start with a label.
pub(super) fn breaks_switch_body(block: &Block, index: usize) -> bool {
    let stmts = &block.stmts;
    let trailing = index + 1 == stmts.len() && index > 0 && is_case(&stmts[index - 1]);
    let leading = index == 0 && is_case(&stmts[0]) && stmts.get(1).map_or(false, |n| !is_case(n));
    trailing || leading
}

/// Whether removing `block.stmts[index]` could drop the value `f` returns.
pub(super) fn loses_value_return(f: &FunctionDefinition, block: &Block, index: usize) -> bool {
    let s = &block.stmts[index];
    if !returns_value(s) {
        return false;
    }
    if block.stmts[..index]
        .iter()
        .any(|p| matches!(p.kind, StmtKind::Return(_)))
    {
        return false;
    }
    match f.body.stmts.last() {
        Some(last) if matches!(last.kind, StmtKind::Return(_)) => last.id == s.id,
        _ => true,
    }
}

fn stmt_removal_holds(tu: &TranslationUnit, function: NodeId, stmt: NodeId) -> bool {
    let (owner, index) = match tu.locate_stmt(stmt) {
        Some(found) => found,
        None => return false,
    };
    let (f, block) = match (tu.function_by_id(function), block_of(tu, owner)) {
        (Some(f), Some(b)) => (f, b),
        _ => return false,
    };
    let in_switch = matches!(
        tu.find_stmt(owner).map(|s| &s.kind),
        Some(StmtKind::Switch { .. })
    );
    !(in_switch && breaks_switch_body(block, index)) && !loses_value_return(f, block, index)
}

fn function_decl_index(tu: &TranslationUnit, id: NodeId) -> Option<usize> {
    tu.decls.iter().position(|d| match d {
        Decl::Function(f) => f.id == id && f.name() != "main",
        Decl::Prototype(p) => p.id == id && p.name != "main",
        _ => false,
    })
}

/// The expression of a single `return` body, when `f` has one.
pub(super) fn single_return(f: &FunctionDefinition) -> Option<&Expr> {
    match f.body.stmts.as_slice() {
        [Stmt {
            kind: StmtKind::Return(Some(e)),
            ..
        }] => Some(e),
        _ => None,
    }
}

fn substitute(e: &mut Expr, args: &HashMap<&str, &Expr>) {
    let replacement = e
        .as_var()
        .and_then(|n| args.get(n))
        .map(|arg| arg.duplicate().parenthesized());
    if let Some(r) = replacement {
        *e = r;
        return;
    }
    for c in e.children_mut() {
        substitute(c, args);
    }
}

/// Body of the outlined function called by `call`, with parameters replaced
/// by the call's arguments.
fn outlined_expansion(tu: &TranslationUnit, call: NodeId) -> Option<Expr> {
    let (callee, args) = tu.find_expr(call)?.as_call()?;
    let f = tu.function(callee)?;
    let body = single_return(f)?;
    if f.prototype.params.len() != args.len() {
        return None;
    }
    let mut map = HashMap::new();
    for (param, arg) in f.prototype.params.iter().zip(args) {
        map.insert(param.name.as_deref()?, arg);
    }
    let mut expanded = body.duplicate();
    substitute(&mut expanded, &map);
    if expanded.binding_power() < BinOp::Assign.precedence() {
        expanded = Expr::paren(expanded);
    }
    Some(expanded)
}

/// What a wrapped `if` or loop turns into.
fn unwrapped(s: &Stmt, kind: UnwrapKind) -> Option<Stmt> {
    match (&s.kind, kind) {
        (StmtKind::If { then_stmt, .. }, UnwrapKind::Then) => Some(then_stmt.as_ref().clone()),
        (
            StmtKind::If {
                else_stmt: Some(e), ..
            },
            UnwrapKind::Else,
        ) => Some(e.as_ref().clone()),
        (StmtKind::For { init, body, .. }, UnwrapKind::Loop) => {
            let mut stmts = vec![];
            if !matches!(init.kind, StmtKind::Null) {
                stmts.push(init.as_ref().clone());
            }
            stmts.extend(body_stmts(body));
            Some(Stmt::block(stmts))
        }
        (StmtKind::While { body, .. } | StmtKind::Do { body, .. }, UnwrapKind::Loop) => {
            Some(Stmt::block(body_stmts(body)))
        }
        _ => None,
    }
}

fn body_stmts(body: &Stmt) -> Vec<Stmt> {
    match &body.kind {
        StmtKind::Block(b) => b.stmts.clone(),
        _ => vec![body.clone()],
    }
}

fn unwrap(tu: &mut TranslationUnit, stmt: NodeId, kind: UnwrapKind) -> Option<()> {
    if kind == UnwrapKind::Block {
        let (owner, index) = tu.locate_stmt(stmt)?;
        let block = tu.find_block_mut(owner)?;
        let inner = match &mut block.stmts[index].kind {
            StmtKind::Block(b) => std::mem::take(&mut b.stmts),
            _ => return None,
        };
        block.stmts.splice(index..=index, inner);
        return Some(());
    }
    let replacement = unwrapped(tu.find_stmt(stmt)?, kind)?;
    tu.replace_stmt(stmt, replacement).map(|_| ())
}

/// Follow constructor arguments down `path`.
fn component_of(e: Expr, path: &[usize]) -> Option<Expr> {
    let mut cur = e;
    for &index in path {
        cur = match cur.kind {
            ExprKind::Constructor { mut args, .. } if index < args.len() => args.swap_remove(index),
            _ => return None,
        };
    }
    Some(cur)
}

fn remove_declarator(
    tu: &mut TranslationUnit,
    stmt: Option<NodeId>,
    decl: NodeId,
    info: NodeId,
) -> bool {
    let emptied = match tu.find_variables_mut(decl) {
        Some(d) => {
            d.decls.retain(|i| i.id != info);
            d.decls.is_empty()
        }
        None => return false,
    };
    if emptied {
        match stmt {
            Some(s) => {
                tu.remove_stmt(s);
            }
            None => tu
                .decls
                .retain(|d| !matches!(d, Decl::Variables(v) if v.id == decl)),
        }
    }
    true
}

/// Replace `expr` by its direct child `child`, parenthesized when it binds
/// looser than the expression it replaces.
fn replace_with_child(tu: &mut TranslationUnit, expr: NodeId, child: NodeId) -> Result<(), GlFuzzError> {
    let parent = tu
        .find_expr_mut(expr)
        .ok_or(GlFuzzError::ChildDoesNotExist { parent: expr, child })?;
    let wrap = !matches!(parent.kind, ExprKind::Paren(_));
    let outer = parent.binding_power();
    let c = parent.replace_child(child, Expr::var(""))?;
    *parent = if wrap && c.binding_power() < outer {
        Expr::paren(c)
    } else {
        c
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn main_stmt_id(tu: &TranslationUnit, index: usize) -> NodeId {
        tu.main_function().unwrap().body.stmts[index].id
    }

    #[test]
    fn test_value_return_is_kept() {
        let mut tu = test::parse_frag(
            "int f(int x) { if (x > 0) { return 1; } return 2; }
             int g(int x) { x++; if (x > 0) { return 1; } }
             void main() { }",
        );
        let f = tu.function("f").unwrap().clone();
        let g = tu.function("g").unwrap().clone();
        assert!(!loses_value_return(&f, &f.body, 0));
        assert!(loses_value_return(&f, &f.body, 1));
        assert!(!loses_value_return(&g, &g.body, 0));
        assert!(loses_value_return(&g, &g.body, 1));
        let op = ReductionOpportunity::RemoveStmt {
            function: f.id,
            stmt: f.body.stmts[1].id,
        };
        assert!(!op.apply(&mut tu));
    }

    #[test]
    fn test_switch_body_stays_well_formed() {
        let tu = test::parse_frag(
            "#version 310 es
             void main() { int a = 1; switch (a) { case 0: a++; break; case 1: a--; } }",
        );
        let body = match &tu.main_function().unwrap().body.stmts[1].kind {
            StmtKind::Switch { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        assert!(breaks_switch_body(&body, 0));
        assert!(!breaks_switch_body(&body, 1));
        assert!(!breaks_switch_body(&body, 3));
        assert!(breaks_switch_body(&body, 4));
    }

    #[test]
    fn test_inline_outlined_call() {
        let mut tu = test::parse_frag(
            "int _GLF_outlined_0(int y, int z) { return y + z * 3; }
             void main() { int x; int a = 1; x = _GLF_outlined_0(a - 1, a); }",
        );
        let call = match &tu.main_function().unwrap().body.stmts[2].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary { rhs, .. },
                ..
            }) => rhs.id,
            _ => unreachable!(),
        };
        assert!(ReductionOpportunity::InlineOutlined { call }.apply(&mut tu));
        test::assert_same_program(
            &tu,
            "int _GLF_outlined_0(int y, int z) { return y + z * 3; }
             void main() { int x; int a = 1; x = (a - 1) + a * 3; }",
        );
    }

    #[test]
    fn test_unwrap_wrapped_statements() {
        let mut tu = test::parse_frag(
            "void main() {
               int a = 0;
               if (_GLF_WRAPPED_IF_FALSE(false)) { } else { a++; }
               for (int i = 0; _GLF_WRAPPED_LOOP(i < 1); i++) { a--; }
               { a = 2; }
             }",
        );
        let ids: Vec<NodeId> = (1..4).map(|i| main_stmt_id(&tu, i)).collect();
        assert!(ReductionOpportunity::Unwrap { stmt: ids[0], kind: UnwrapKind::Else }.apply(&mut tu));
        assert!(ReductionOpportunity::Unwrap { stmt: ids[1], kind: UnwrapKind::Loop }.apply(&mut tu));
        assert!(ReductionOpportunity::Unwrap { stmt: ids[2], kind: UnwrapKind::Block }.apply(&mut tu));
        test::assert_same_program(
            &tu,
            "void main() { int a = 0; { a++; } { int i = 0; a--; } a = 2; }",
        );
        let again = ReductionOpportunity::Unwrap { stmt: ids[2], kind: UnwrapKind::Block };
        assert!(!again.apply(&mut tu));
    }

    #[test]
    fn test_remove_last_declarator_removes_statement() {
        let mut tu = test::parse_frag("int g, h; void main() { float a, b; }");
        let (decl, infos) = match &tu.main_function().unwrap().body.stmts[0].kind {
            StmtKind::Decl(d) => (d.id, d.decls.iter().map(|i| i.id).collect::<Vec<_>>()),
            _ => unreachable!(),
        };
        let stmt = Some(main_stmt_id(&tu, 0));
        for info in infos {
            assert!(ReductionOpportunity::RemoveDeclarator { stmt, decl, info }.apply(&mut tu));
        }
        let global = tu.global_variables().next().unwrap();
        let (gdecl, ginfo) = (global.id, global.decls[0].id);
        let op = ReductionOpportunity::RemoveDeclarator {
            stmt: None,
            decl: gdecl,
            info: ginfo,
        };
        assert!(op.apply(&mut tu));
        assert!(!op.apply(&mut tu));
        test::assert_same_program(&tu, "int h; void main() { }");
    }

    #[test]
    fn test_main_is_never_removed() {
        let mut tu = test::parse_frag("void main() { }");
        let id = tu.main_function().unwrap().id;
        assert!(!ReductionOpportunity::RemoveFunction { id }.apply(&mut tu));
    }

    #[test]
    fn test_replace_with_child() {
        let mut tu = test::parse_frag("void main() { int a = 1; int b = 2; a = a * (b + 1); }");
        let (mul, sum, lit) = match &tu.main_function().unwrap().body.stmts[2].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary { rhs, .. },
                ..
            }) => {
                let paren = &rhs.children()[1];
                let sum = &paren.children()[0];
                (rhs.id, paren.id, sum.children()[1].id)
            }
            _ => unreachable!(),
        };
        assert!(matches!(
            replace_with_child(&mut tu, mul, lit),
            Err(GlFuzzError::ChildDoesNotExist { .. })
        ));
        assert!(matches!(
            replace_with_child(&mut tu, lit, lit),
            Err(GlFuzzError::ReplaceUnsupported { .. })
        ));
        assert!(ReductionOpportunity::ReplaceWithChild { expr: mul, child: sum }.apply(&mut tu));
        test::assert_same_program(&tu, "void main() { int a = 1; int b = 2; a = (b + 1); }");
    }
}
