//! Move the right-hand side of `x = e;` into a new function.
//!
//! `x = e;` becomes `x = _GLF_outlined_N(v1, ..., vk);` where `v1..vk` are
//! the variables in scope that `e` reads, and `_GLF_outlined_N` is declared
//! right before the enclosing function with body `return e;`.

use super::IdGenerator;
use crate::ast::{query, *};
use crate::typing::{builtins, Scope};
use crate::visit::{self, Visitor};

pub const OUTLINED_FUNCTION_PREFIX: &str = "_GLF_outlined_";

#[derive(Debug, Clone)]
pub struct OutlineOpportunity {
    pub stmt: NodeId,
    pub function: NodeId,
    params: Vec<(String, TypeRef)>,
    return_type: TypeRef,
}

struct OutlineFinder {
    scope: Scope,
    kind: ShaderKind,
    function: Option<NodeId>,
    found: Vec<OutlineOpportunity>,
}

impl OutlineFinder {
    fn consider(&mut self, stmt: &Stmt) -> Option<OutlineOpportunity> {
        let (lhs, rhs) = match &stmt.kind {
            StmtKind::Expr(Expr {
                kind:
                    ExprKind::Binary {
                        op: BinOp::Assign,
                        lhs,
                        rhs,
                    },
                ..
            }) => (lhs.as_var()?, rhs),
            _ => return None,
        };
        // Writes in the outlined body would land on by-value parameters.
        if query::has_side_effects(rhs) {
            return None;
        }
        let return_type = self
            .scope
            .lookup_type(lhs)
            .or_else(|| builtins::builtin_variable_type(lhs, self.kind))?
            .without_qualifiers();
        if return_type.is_array() || return_type.is_opaque() {
            return None;
        }
        let mut params: Vec<(String, TypeRef)> = vec![];
        for e in query::subexprs(rhs) {
            let name = match e.as_var() {
                Some(name) => name,
                None => continue,
            };
            let ty = match self.scope.lookup_type(name) {
                Some(ty) => ty.without_qualifiers(),
                None => continue,
            };
            if ty.is_array() {
                return None;
            }
            if !params.iter().any(|(n, _)| n == name) {
                params.push((name.to_string(), ty));
            }
        }
        Some(OutlineOpportunity {
            stmt: stmt.id,
            function: self.function?,
            params,
            return_type,
        })
    }
}

impl<'a> Visitor<'a> for OutlineFinder {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn enter_function(&mut self, f: &'a FunctionDefinition) {
        self.function = Some(f.id);
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let Some(op) = self.consider(stmt) {
            self.found.push(op);
        }
        visit::walk_stmt(self, stmt);
    }
}

/// Assignments to a variable whose right-hand side reads no array.
pub fn find_outline_opportunities(tu: &TranslationUnit) -> Vec<OutlineOpportunity> {
    let mut finder = OutlineFinder {
        scope: Scope::new(),
        kind: tu.kind,
        function: None,
        found: vec![],
    };
    finder.visit_unit(tu);
    finder.found
}

/// Outline the statement of `op`. Returns the name of the new function, or
/// `None` if the statement is gone or no longer an assignment.
pub fn outline_statement(
    tu: &mut TranslationUnit,
    op: &OutlineOpportunity,
    ids: &mut IdGenerator,
) -> Option<String> {
    let index = tu.function_index(op.function)?;
    let stmt = tu.find_stmt_mut(op.stmt)?;
    let rhs = match &mut stmt.kind {
        StmtKind::Expr(Expr {
            kind:
                ExprKind::Binary {
                    op: BinOp::Assign,
                    rhs,
                    ..
                },
            ..
        }) => rhs,
        _ => {
            crate::log!(debug, "statement {} changed, not outlining", op.stmt);
            return None;
        }
    };
    let name = format!("{OUTLINED_FUNCTION_PREFIX}{}", ids.fresh_id());
    let args = op.params.iter().map(|(n, _)| Expr::var(n)).collect();
    let body = std::mem::replace(rhs.as_mut(), Expr::call(&name, args));
    let params = op
        .params
        .iter()
        .map(|(n, ty)| ParameterDecl::new(n, *ty))
        .collect();
    let function = FunctionDefinition::new(
        FunctionPrototype::new(&name, op.return_type, params),
        Block::unscoped(vec![Stmt::new(StmtKind::Return(Some(body)))]),
    );
    tu.decls.insert(index, Decl::Function(function));
    crate::log!(trace, "outlined statement {} into `{name}`", op.stmt);
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_outline_assignment() {
        let mut tu = test::parse_frag(
            "uniform float u;
             void main() { int x; int y = 2; x = y + y * 3; gl_FragColor = vec4(u); }",
        );
        let mut ids = test::ids();
        let ops = find_outline_opportunities(&tu);
        assert_eq!(ops.len(), 2);
        for op in &ops {
            outline_statement(&mut tu, op, &mut ids).unwrap();
        }
        test::assert_same_program(
            &tu,
            "uniform float u;
             int _GLF_outlined_0(int y) { return y + y * 3; }
             vec4 _GLF_outlined_1(float u) { return vec4(u); }
             void main() { int x; int y = 2; x = _GLF_outlined_0(y); gl_FragColor = _GLF_outlined_1(u); }",
        );
    }

    #[test]
    fn test_arrays_are_not_outlined() {
        let tu = test::parse_frag(
            "void main() { int a[2]; int x; x = a[0]; x += 1; a[1] = x; }",
        );
        assert!(find_outline_opportunities(&tu).is_empty());
    }

    #[test]
    fn test_side_effecting_rhs_is_not_outlined() {
        let tu = test::parse_frag(
            "int f(int a) { return a; }
             void main() { int x; int y = 1; x = y++; x = (y = 2); x = f(y); x = y * 2; }",
        );
        let ops = find_outline_opportunities(&tu);
        assert_eq!(ops.len(), 1);
        let rendered: Vec<String> = ops
            .iter()
            .map(|op| render_stmt(tu.find_stmt(op.stmt).unwrap()))
            .collect();
        assert!(rendered.iter().any(|s| s.contains("x = y * 2")), "{rendered:?}");
    }

    #[test]
    fn test_stale_opportunity() {
        let mut tu = test::parse_frag("void main() { int x; x = 1; }");
        let ops = find_outline_opportunities(&tu);
        let stmt = ops[0].stmt;
        tu.replace_stmt(stmt, Stmt::new(StmtKind::Null));
        let mut ids = test::ids();
        assert_eq!(outline_statement(&mut tu, &ops[0], &mut ids), None);
    }
}
