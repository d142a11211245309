//! Keep `const` and global initializers legal after code was moved around.

use crate::ast::{query, *};
use crate::typing::Bindings;
use crate::visit::{self, Visitor};

/// Whether `e` reads a variable that is not `const`. Unresolved names count
/// as non-const, except the builtin `gl_Max*` limits.
fn reads_non_const(e: &Expr, bindings: &Bindings) -> bool {
    query::subexprs(e).into_iter().any(|x| match x.as_var() {
        Some(name) => match bindings.entry(x.id) {
            Some(entry) => !entry.ty.has_qualifier(&TypeQualifier::Const),
            None => !name.starts_with("gl_Max"),
        },
        None => false,
    })
}

#[derive(Default)]
struct DeclarationCollector<'a> {
    found: Vec<&'a VariablesDeclaration>,
}

impl<'a> Visitor<'a> for DeclarationCollector<'a> {
    fn visit_variables_declaration(&mut self, decl: &'a VariablesDeclaration) {
        self.found.push(decl);
        visit::walk_variables_declaration(self, decl);
    }
}

/// Ids of the `const` declarations with an initializer that reads a
/// non-const variable.
fn misplaced_consts(tu: &TranslationUnit) -> Vec<NodeId> {
    let bindings = Bindings::new(tu);
    let mut collector = DeclarationCollector::default();
    collector.visit_unit(tu);
    collector
        .found
        .into_iter()
        .filter(|d| d.base_type.has_qualifier(&TypeQualifier::Const))
        .filter(|d| {
            d.decls
                .iter()
                .filter_map(|i| i.initializer.as_ref())
                .any(|e| reads_non_const(e, &bindings))
        })
        .map(|d| d.id)
        .collect()
}

/// Drop `const` where the initializer is not constant, then move global
/// initializers that must not stay into assignments at the start of `main`.
/// Returns the number of declarations changed.
pub fn clean_consts(tu: &mut TranslationUnit) -> usize {
    let mut changed = 0;
    loop {
        let ids = misplaced_consts(tu);
        if ids.is_empty() {
            break;
        }
        for id in ids {
            if let Some(d) = tu.find_variables_mut(id) {
                d.base_type = d
                    .base_type
                    .retain_qualifiers(|q| *q != TypeQualifier::Const);
                changed += 1;
            }
        }
    }

    if tu.main_function().is_none() {
        return changed;
    }
    let move_all = tu.version().global_variable_initializers_must_be_const();
    let bindings = Bindings::new(tu);
    let mut assignments = vec![];
    for decl in tu.decls.iter_mut() {
        let v = match decl {
            Decl::Variables(v) => v,
            _ => continue,
        };
        let qualifiers = v.base_type.qualifiers();
        if qualifiers
            .iter()
            .any(|q| *q == TypeQualifier::Const || q.is_interface())
        {
            continue;
        }
        let mut moved = false;
        for info in v.decls.iter_mut() {
            let movable = match &info.initializer {
                Some(init) => move_all || reads_non_const(init, &bindings),
                None => false,
            };
            if let (true, Some(init)) = (movable, info.initializer.take()) {
                assignments.push(Stmt::expr(Expr::assign(Expr::var(&info.name), init)));
                moved = true;
            }
        }
        if moved {
            changed += 1;
        }
    }
    if let Some(main) = tu.main_function_mut() {
        main.body.stmts.splice(0..0, assignments);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_consts_reading_uniforms() {
        let mut tu = test::parse_frag(
            "#version 310 es
             uniform float u;
             const float a = u;
             const float b = a + 1.0;
             const float c = 2.0;
             float d = b;
             void main() { const float e = b; const float f = c; }",
        );
        assert_eq!(clean_consts(&mut tu), 6);
        test::assert_same_program(
            &tu,
            "#version 310 es
             uniform float u;
             float a;
             float b;
             const float c = 2.0;
             float d;
             void main() { a = u; b = a + 1.0; d = b; float e = b; const float f = c; }",
        );
    }

    #[test]
    fn test_essl100_moves_every_global_initializer() {
        let mut tu = test::parse_frag("float x = 1.0; const float y = 2.0; void main() { }");
        assert_eq!(clean_consts(&mut tu), 1);
        test::assert_same_program(&tu, "float x; const float y = 2.0; void main() { x = 1.0; }");
    }
}
