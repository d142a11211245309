//! Injection macros.
//!
//! Generated code marks what it added with `_GLF_*` macro calls. The
//! identity-style macros take the original value second and evaluate to it;
//! the wrapping macros evaluate to their only argument.

use crate::ast::*;
use crate::config::INJECTION_SWITCH;

pub const IDENTITY: &str = "_GLF_IDENTITY";
pub const ZERO: &str = "_GLF_ZERO";
pub const ONE: &str = "_GLF_ONE";
pub const FALSE: &str = "_GLF_FALSE";
pub const TRUE: &str = "_GLF_TRUE";
pub const FUZZED: &str = "_GLF_FUZZED";
pub const DEAD: &str = "_GLF_DEAD";
pub const SWITCH: &str = "_GLF_SWITCH";
pub const WRAPPED_LOOP: &str = "_GLF_WRAPPED_LOOP";
pub const WRAPPED_IF_TRUE: &str = "_GLF_WRAPPED_IF_TRUE";
pub const WRAPPED_IF_FALSE: &str = "_GLF_WRAPPED_IF_FALSE";

const DEFINITIONS: [(&str, &str); 11] = [
    (ZERO, "#define _GLF_ZERO(X, Y) (Y)"),
    (ONE, "#define _GLF_ONE(X, Y) (Y)"),
    (FALSE, "#define _GLF_FALSE(X, Y) (Y)"),
    (TRUE, "#define _GLF_TRUE(X, Y) (Y)"),
    (IDENTITY, "#define _GLF_IDENTITY(X, Y) (Y)"),
    (DEAD, "#define _GLF_DEAD(X) (X)"),
    (FUZZED, "#define _GLF_FUZZED(X) (X)"),
    (WRAPPED_LOOP, "#define _GLF_WRAPPED_LOOP(X) X"),
    (WRAPPED_IF_TRUE, "#define _GLF_WRAPPED_IF_TRUE(X) X"),
    (WRAPPED_IF_FALSE, "#define _GLF_WRAPPED_IF_FALSE(X) X"),
    (SWITCH, "#define _GLF_SWITCH(X) X"),
];

/// Index of the argument a macro call evaluates to.
pub fn payload_index(name: &str) -> Option<usize> {
    match name {
        IDENTITY | ZERO | ONE | FALSE | TRUE => Some(1),
        FUZZED | DEAD | SWITCH | WRAPPED_LOOP | WRAPPED_IF_TRUE | WRAPPED_IF_FALSE => Some(0),
        _ => None,
    }
}

pub fn is_injection_macro(name: &str) -> bool {
    payload_index(name).is_some()
}

/// Whether `e` is a call to the macro `name`.
pub fn is_call_to(e: &Expr, name: &str) -> bool {
    matches!(e.strip_parens().as_call(), Some((callee, _)) if callee == name)
}

/// `_GLF_DEAD(_GLF_FALSE(false, (injectionSwitch.x > injectionSwitch.y)))`,
/// false at run time without the compiler knowing it.
pub fn dead_condition() -> Expr {
    let switch_x = Expr::member(Expr::var(INJECTION_SWITCH), "x");
    let switch_y = Expr::member(Expr::var(INJECTION_SWITCH), "y");
    let test = Expr::paren(Expr::binary(BinOp::Gt, switch_x, switch_y));
    Expr::call(
        DEAD,
        vec![Expr::call(FALSE, vec![Expr::boolean(false), test])],
    )
}

/// Replace one macro call by its payload, parenthesized when `operand`
/// says the result is an operand of a larger expression.
fn unwrap_macro(e: &mut Expr, operand: bool) -> bool {
    let payload = match &mut e.kind {
        ExprKind::Call { callee, args } => match payload_index(callee) {
            Some(i) if i < args.len() => args.swap_remove(i),
            _ => return false,
        },
        _ => return false,
    };
    let bare = payload.is_literal()
        || matches!(
            payload.kind,
            ExprKind::Paren(_) | ExprKind::Var(_) | ExprKind::Call { .. } | ExprKind::Constructor { .. }
        );
    *e = if operand && !bare {
        Expr::paren(payload)
    } else {
        payload
    };
    true
}

fn eliminate_in_expr(e: &mut Expr, operand: bool, only: Option<NodeId>) -> usize {
    let mut count = 0;
    while only.map_or(true, |id| id == e.id) && unwrap_macro(e, operand) {
        count += 1;
        if only.is_some() {
            return count;
        }
    }
    let child_operand = !matches!(
        e.kind,
        ExprKind::Paren(_) | ExprKind::Call { .. } | ExprKind::Constructor { .. }
    );
    for c in e.children_mut() {
        count += eliminate_in_expr(c, child_operand, only);
    }
    count
}

fn eliminate_in_stmt(s: &mut Stmt, only: Option<NodeId>) -> usize {
    let mut count = 0;
    for e in s.exprs_mut() {
        count += eliminate_in_expr(e, false, only);
    }
    for c in s.child_stmts_mut() {
        count += eliminate_in_stmt(c, only);
    }
    count
}

fn eliminate(tu: &mut TranslationUnit, only: Option<NodeId>) -> usize {
    let mut count = 0;
    for decl in tu.decls.iter_mut() {
        match decl {
            Decl::Function(f) => {
                for s in f.body.stmts.iter_mut() {
                    count += eliminate_in_stmt(s, only);
                }
            }
            Decl::Variables(v) => {
                for e in v.decls.iter_mut().filter_map(|i| i.initializer.as_mut()) {
                    count += eliminate_in_expr(e, false, only);
                }
            }
            _ => {}
        }
    }
    count
}

/// Replace every injection macro call by its payload. Returns how many
/// calls were removed.
pub fn eliminate_injection_macros(tu: &mut TranslationUnit) -> usize {
    let count = eliminate(tu, None);
    crate::log!(trace, "eliminated {count} macro calls");
    count
}

/// Replace the single macro call `call` by its payload.
pub fn eliminate_macro_call(tu: &mut TranslationUnit, call: NodeId) -> bool {
    eliminate(tu, Some(call)) > 0
}

/// Add the `#define` of every injection macro the shader lacks.
pub fn ensure_macro_definitions(tu: &mut TranslationUnit) {
    let defined: Vec<String> = tu
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Directive(text) => Some(text.clone()),
            _ => None,
        })
        .collect();
    let missing: Vec<Decl> = DEFINITIONS
        .iter()
        .filter(|(name, _)| {
            !defined
                .iter()
                .any(|d| d.starts_with("#define") && d.contains(&format!("{name}(")))
        })
        .map(|(_, text)| Decl::Directive(text.to_string()))
        .collect();
    tu.decls.splice(0..0, missing);
}

/// Drop the `#define` lines of the injection macros. Returns how many
/// went away.
pub fn remove_macro_definitions(tu: &mut TranslationUnit) -> usize {
    let before = tu.decls.len();
    tu.decls.retain(|d| match d {
        Decl::Directive(text) => !DEFINITIONS.iter().any(|(_, def)| text.trim() == *def),
        _ => true,
    });
    before - tu.decls.len()
}

/// Declare `uniform vec2 injectionSwitch;` unless the shader already has it.
pub fn ensure_injection_switch(tu: &mut TranslationUnit) -> bool {
    let present = tu
        .global_variables()
        .any(|v| v.decls.iter().any(|i| i.name == INJECTION_SWITCH));
    if !present {
        tu.insert_after_header(Decl::Variables(VariablesDeclaration::single(
            TypeRef::qualified(vec![TypeQualifier::Uniform], TypeRef::basic(BasicType::Vec2)),
            INJECTION_SWITCH,
            None,
        )));
    }
    !present
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_eliminate_macros() {
        let mut tu = test::parse_frag(
            "void main() {
               int a = _GLF_IDENTITY(a, 1 + 2) * 3;
               int b = _GLF_FUZZED(a);
               if (_GLF_DEAD(_GLF_FALSE(false, (a > b)))) { }
               int c = sin(_GLF_ZERO(0.0, b + 1.0));
             }",
        );
        assert_eq!(eliminate_injection_macros(&mut tu), 5);
        test::assert_same_program(
            &tu,
            "void main() {
               int a = (1 + 2) * 3;
               int b = a;
               if ((a > b)) { }
               int c = sin(b + 1.0);
             }",
        );
    }

    #[test]
    fn test_definitions_are_added_once() {
        let mut tu = test::parse_frag("void main() { }");
        ensure_macro_definitions(&mut tu);
        let count = tu.decls.len();
        ensure_macro_definitions(&mut tu);
        assert_eq!(tu.decls.len(), count);
        assert!(render(&tu).contains("#define _GLF_DEAD(X) (X)"));
        assert_eq!(remove_macro_definitions(&mut tu), DEFINITIONS.len());
        assert_eq!(remove_macro_definitions(&mut tu), 0);
        assert!(ensure_injection_switch(&mut tu));
        assert!(!ensure_injection_switch(&mut tu));
    }

    #[test]
    fn test_dead_condition_renders() {
        assert_eq!(
            render_expr(&dead_condition()),
            "_GLF_DEAD(_GLF_FALSE(false, (injectionSwitch.x > injectionSwitch.y)))"
        );
    }
}
