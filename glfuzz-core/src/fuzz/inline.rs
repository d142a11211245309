//! Inline a call to a user-defined function.
//!
//! The callee is cloned, its returns are removed, and its body is placed in
//! a fresh block right before the statement holding the call. Parameters
//! become local declarations initialized from the arguments. For non-void
//! callees the call is replaced by `{callee}_inline_return_value_{id}`,
//! declared just before the block; a void call statement is dropped.

use std::collections::BTreeSet;

use super::{remove_returns, IdGenerator};
use crate::ast::{query, *};
use crate::typing::Typer;
use crate::GlFuzzError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineOpportunity {
    pub call: NodeId,
    pub callee: String,
}

/// Everything needed to splice one call, computed from a snapshot.
struct InlinePlan {
    host: NodeId,
    callee: FunctionDefinition,
    args: Vec<Expr>,
}

/// Read-only analysis of the calls of one tree.
pub struct Inliner<'a> {
    tu: &'a TranslationUnit,
    typer: Typer,
    parents: ParentMap<'a>,
}

impl<'a> Inliner<'a> {
    pub fn new(tu: &'a TranslationUnit) -> Self {
        Self {
            tu,
            typer: Typer::new(tu),
            parents: ParentMap::new(tu),
        }
    }

    /// Calls that can be inlined, with callees no larger than `node_limit`
    /// nodes once their returns are removed; 0 means no limit.
    pub fn opportunities(&self, node_limit: usize) -> Vec<InlineOpportunity> {
        let mut found = vec![];
        for f in self.tu.functions() {
            for s in &f.body.stmts {
                for e in query::exprs_in_stmt(s) {
                    let callee = match e.as_call() {
                        Some((callee, _)) if self.typer.is_user_function(callee) => callee,
                        _ => continue,
                    };
                    match self.plan(e) {
                        Ok(plan) if node_limit == 0 || query::function_node_count(&plan.callee) <= node_limit => {
                            found.push(InlineOpportunity {
                                call: e.id,
                                callee: callee.to_string(),
                            })
                        }
                        Ok(_) => {}
                        Err(err) => crate::log!(trace, "skip call to `{callee}`: {err}"),
                    }
                }
            }
        }
        found
    }

    fn matching_definition(&self, callee: &str, args: &[Expr]) -> Result<&'a FunctionDefinition, GlFuzzError> {
        let matches: Vec<&FunctionDefinition> = self
            .tu
            .functions()
            .filter(|f| f.name() == callee && f.prototype.params.len() == args.len())
            .filter(|f| {
                f.prototype.params.iter().zip(args).all(|(p, a)| match self.typer.type_of(a) {
                    Some(t) => t.same_unqualified(p.full_type()),
                    None => true,
                })
            })
            .collect();
        match matches.as_slice() {
            [] => Err(GlFuzzError::CannotInline("no matching function".to_string())),
            [f] => Ok(f),
            _ => Err(GlFuzzError::CannotInline(
                "more than one function matches the call".to_string(),
            )),
        }
    }

    fn plan(&self, call: &Expr) -> Result<InlinePlan, GlFuzzError> {
        let (callee, args) = call
            .as_call()
            .ok_or_else(|| GlFuzzError::CannotInline("not a call".to_string()))?;
        let def = self.matching_definition(callee, args)?;
        for p in &def.prototype.params {
            if p.ty.has_qualifier(&TypeQualifier::Out) || p.ty.has_qualifier(&TypeQualifier::InOut) {
                return Err(GlFuzzError::CannotInline("out parameters".to_string()));
            }
            if p.array.is_some() || p.ty.is_array() {
                return Err(GlFuzzError::CannotInline("array parameters".to_string()));
            }
            if p.name.is_none() {
                return Err(GlFuzzError::CannotInline("unnamed parameter".to_string()));
            }
        }
        let host = self.host_statement(call)?;
        let caller = self
            .parents
            .enclosing_function(call.id)
            .ok_or_else(|| GlFuzzError::CannotInline("call outside a function".to_string()))?;
        if caller.name() == callee {
            return Err(GlFuzzError::CannotInline("recursive call".to_string()));
        }
        if def.prototype.return_type.is_void() && !self.is_whole_statement(call, host) {
            return Err(GlFuzzError::CannotInline(
                "void call is not an expression statement".to_string(),
            ));
        }
        // Parameters are bound in order, so an argument must not read a
        // parameter name bound before it.
        let param_names: Vec<&str> = def
            .prototype
            .params
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect();
        for (i, a) in args.iter().enumerate() {
            let used = query::variables_in_expr(a);
            if param_names[..i].iter().any(|n| used.contains(*n)) {
                return Err(GlFuzzError::CannotInline(
                    "argument reads a parameter name".to_string(),
                ));
            }
        }
        // Globals used by the callee must not be shadowed at the call.
        let caller_names = declared_in_function(caller);
        for name in free_variables(def) {
            if caller_names.contains(&name) {
                return Err(GlFuzzError::CannotInline(format!(
                    "`{name}` is shadowed at the call"
                )));
            }
        }
        let mut callee_copy = def.duplicate();
        remove_returns(&mut callee_copy, self.tu.version()).map_err(|err| {
            GlFuzzError::CannotInline(format!("could not remove returns from callee: {err}"))
        })?;
        Ok(InlinePlan {
            host,
            callee: callee_copy,
            args: args.iter().map(Expr::duplicate).collect(),
        })
    }

    /// The innermost statement holding the call, which must sit directly in
    /// a block and evaluate the call exactly once before anything else runs.
    fn host_statement(&self, call: &Expr) -> Result<NodeId, GlFuzzError> {
        let mut child = call.id;
        for node in self.parents.ancestors(call.id) {
            match node {
                NodeRef::Expr(e) => {
                    let conditional = match &e.kind {
                        ExprKind::Binary { op, rhs, .. } => op.is_short_circuiting() && rhs.id == child,
                        ExprKind::Ternary { cond, .. } => cond.id != child,
                        _ => false,
                    };
                    if conditional {
                        return Err(GlFuzzError::CannotInline(
                            "call is evaluated conditionally".to_string(),
                        ));
                    }
                }
                NodeRef::Variables(d) => {
                    if d.decls.first().and_then(|i| i.initializer.as_ref()).map(|e| e.id)
                        != Some(child)
                    {
                        return Err(GlFuzzError::CannotInline(
                            "call follows another declarator".to_string(),
                        ));
                    }
                }
                NodeRef::Stmt(s) => {
                    if s.is_loop() {
                        return Err(GlFuzzError::CannotInline("call in a loop header".to_string()));
                    }
                    if self.tu.locate_stmt(s.id).is_none() {
                        return Err(GlFuzzError::CannotInline(
                            "statement is not directly in a block".to_string(),
                        ));
                    }
                    return Ok(s.id);
                }
                NodeRef::Function(_) => break,
            }
            child = node.id();
        }
        Err(GlFuzzError::CannotInline(
            "call is not inside a block".to_string(),
        ))
    }

    fn is_whole_statement(&self, call: &Expr, host: NodeId) -> bool {
        match self.parents.node(host) {
            Some(NodeRef::Stmt(Stmt {
                kind: StmtKind::Expr(e),
                ..
            })) => e.id == call.id,
            _ => false,
        }
    }
}

fn declared_in_function(f: &FunctionDefinition) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = f.prototype.params.iter().filter_map(|p| p.name.clone()).collect();
    for s in &f.body.stmts {
        names.extend(query::declared_in_stmt(s));
    }
    names
}

/// Variables a function reads that it does not declare.
fn free_variables(f: &FunctionDefinition) -> BTreeSet<String> {
    let declared = declared_in_function(f);
    let mut used = BTreeSet::new();
    for s in &f.body.stmts {
        used.extend(query::variables_in_stmt(s));
    }
    used.retain(|n| !declared.contains(n));
    used
}

/// Inline the call `call`. A call that is no longer in the tree is left
/// alone.
pub fn inline_call(
    tu: &mut TranslationUnit,
    call: NodeId,
    ids: &mut IdGenerator,
) -> Result<(), GlFuzzError> {
    let plan = {
        let inliner = Inliner::new(tu);
        let call_expr = match tu.find_expr(call) {
            Some(e) => e,
            None => {
                crate::log!(debug, "call {call} is gone, nothing to inline");
                return Ok(());
            }
        };
        inliner.plan(call_expr)?
    };
    let InlinePlan { host, callee, args } = plan;
    let return_type = callee.prototype.return_type.without_qualifiers();
    let return_var = if return_type.is_void() {
        None
    } else {
        Some(format!(
            "{}_inline_return_value_{}",
            callee.name(),
            ids.fresh_id()
        ))
    };

    let mut stmts = vec![];
    for (p, arg) in callee.prototype.params.iter().zip(args) {
        if let Some(name) = &p.name {
            stmts.push(Stmt::decl(VariablesDeclaration::single(
                p.ty.without_qualifiers(),
                name,
                Some(arg),
            )));
        }
    }
    for s in callee.body.stmts {
        match s.kind {
            StmtKind::Return(Some(e)) => {
                if let Some(rv) = &return_var {
                    stmts.push(Stmt::expr(Expr::combine(BinOp::Assign, Expr::var(rv), e)));
                }
            }
            StmtKind::Return(None) => {}
            _ => stmts.push(s),
        }
    }

    let mut inserted = vec![];
    match &return_var {
        Some(rv) => {
            inserted.push(Stmt::decl(VariablesDeclaration::single(return_type, rv, None)));
            inserted.push(Stmt::block(stmts));
            tu.replace_expr(call, Expr::var(rv));
            tu.insert_before(host, inserted);
        }
        None => {
            tu.replace_stmt(host, Stmt::block(stmts));
        }
    }
    crate::log!(trace, "inlined call {call} to `{}`", callee.prototype.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn inline_all(src: &str) -> TranslationUnit {
        let mut tu = test::parse_frag(src);
        let mut ids = test::ids();
        let calls = Inliner::new(&tu).opportunities(0);
        for op in calls {
            inline_call(&mut tu, op.call, &mut ids).unwrap();
        }
        tu
    }

    #[test]
    fn test_inline_void_call() {
        let tu = inline_all("void foo() { } void main() { foo(); }");
        test::assert_same_program(&tu, "void foo() { } void main() { { } }");
    }

    #[test]
    fn test_inline_value_call() {
        let tu = inline_all("int foo() { return 2; } void main() { int x = foo(); }");
        test::assert_same_program(
            &tu,
            "int foo() { return 2; }
             void main() {
               int foo_inline_return_value_0;
               { foo_inline_return_value_0 = 2; }
               int x = foo_inline_return_value_0;
             }",
        );
    }

    #[test]
    fn test_inline_binds_parameters() {
        let tu = inline_all(
            "float f(float a, const float b) { if (a > b) return a; return b; }
             void main() { float y = 1.0; y = f(y, 2.0) + 1.0; }",
        );
        test::assert_same_program(
            &tu,
            "float f(float a, const float b) { if (a > b) return a; return b; }
             void main() {
               float y = 1.0;
               float f_inline_return_value_0;
               {
                 float a = y;
                 float b = 2.0;
                 bool f_has_returned = false;
                 float f_return_value;
                 if (a > b) { f_return_value = a; f_has_returned = true; }
                 if (!f_has_returned) { { f_return_value = b; f_has_returned = true; } }
                 f_inline_return_value_0 = f_return_value;
               }
               y = f_inline_return_value_0 + 1.0;
             }",
        );
    }

    #[test]
    fn test_rejected_calls() {
        let tu = test::parse_frag(
            "int g;
             void o(out int x) { x = 1; }
             int h(int x) { return x + g; }
             int k(int x) { return x; }
             float k(float x) { return x; }
             void main() {
               int a;
               o(a);
               bool c = true && h(1) > 0;
               while (h(2) > 0) { }
               int g = h(3);
               a = k(u);
             }",
        );
        assert!(Inliner::new(&tu).opportunities(0).is_empty());
    }

    #[test]
    fn test_stale_call_is_ignored() {
        let mut tu = test::parse_frag("void main() { }");
        let mut ids = test::ids();
        assert!(inline_call(&mut tu, NodeId::fresh(), &mut ids).is_ok());
    }
}
