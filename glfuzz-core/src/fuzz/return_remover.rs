//! Rewrite early returns into flag-guarded fall-through.
//!
//! A function `f` whose returns are not just one trailing `return` gets a
//! `bool f_has_returned = false;` flag, and for non-void functions a
//! `f_return_value` variable plus a single final `return f_return_value;`.
//! Statements following anything that may return are guarded by
//! `if (!f_has_returned)`, and loops that contain a return stop as soon as
//! the flag is set.

use crate::ast::{query, *};
use crate::GlFuzzError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Scanning,
    Instrumenting,
    Rewriting,
    Done,
}

pub struct ReturnRemover<'f> {
    function: &'f mut FunctionDefinition,
    version: ShadingLanguageVersion,
    phase: Phase,
    changed: bool,
}

/// Remove the returns of `function`. Returns whether it was rewritten.
pub fn remove_returns(
    function: &mut FunctionDefinition,
    version: ShadingLanguageVersion,
) -> Result<bool, GlFuzzError> {
    ReturnRemover::new(function, version).run()
}

impl<'f> ReturnRemover<'f> {
    pub fn new(function: &'f mut FunctionDefinition, version: ShadingLanguageVersion) -> Self {
        Self {
            function,
            version,
            phase: Phase::Scanning,
            changed: false,
        }
    }

    pub fn run(mut self) -> Result<bool, GlFuzzError> {
        loop {
            self.phase = match self.phase {
                Phase::Scanning => self.scan()?,
                Phase::Instrumenting => {
                    let flag = self.has_returned_name();
                    instrument_block(&mut self.function.body, &flag);
                    Phase::Rewriting
                }
                Phase::Rewriting => {
                    self.rewrite();
                    self.changed = true;
                    Phase::Done
                }
                Phase::Done => return Ok(self.changed),
            };
        }
    }

    fn scan(&self) -> Result<Phase, GlFuzzError> {
        let body = &self.function.body;
        if !query::block_contains_return(body) {
            return Ok(Phase::Done);
        }
        let count = body
            .stmts
            .iter()
            .map(|s| {
                let mut n = 0;
                count_returns(s, &mut n);
                n
            })
            .sum::<usize>();
        if count == 1 && matches!(body.stmts.last(), Some(Stmt { kind: StmtKind::Return(_), .. })) {
            return Ok(Phase::Done);
        }
        if body.stmts.iter().any(query::contains_switch) {
            crate::log!(trace, "`{}` holds a switch, returns stay", self.function.name());
            return Err(GlFuzzError::CannotRemoveReturns(format!(
                "switch statements in `{}` are not supported",
                self.function.name()
            )));
        }
        Ok(Phase::Instrumenting)
    }

    fn has_returned_name(&self) -> String {
        format!("{}_has_returned", self.function.name())
    }

    fn return_value_name(&self) -> String {
        format!("{}_return_value", self.function.name())
    }

    fn rewrite(&mut self) {
        let names = Names {
            has_returned: self.has_returned_name(),
            return_value: self.return_value_name(),
            restricted_for_loops: self.version.restricted_for_loops(),
        };
        for s in self.function.body.stmts.iter_mut() {
            names.rewrite_stmt(s);
        }
        let return_type = self.function.prototype.return_type.without_qualifiers();
        let body = &mut self.function.body.stmts;
        if !return_type.is_void() {
            body.insert(
                0,
                Stmt::decl(VariablesDeclaration::single(
                    return_type,
                    &names.return_value,
                    None,
                )),
            );
            body.push(Stmt::new(StmtKind::Return(Some(Expr::var(
                &names.return_value,
            )))));
        }
        body.insert(
            0,
            Stmt::decl(VariablesDeclaration::single(
                TypeRef::basic(BasicType::Bool),
                &names.has_returned,
                Some(Expr::boolean(false)),
            )),
        );
    }
}

fn count_returns(s: &Stmt, n: &mut usize) {
    if let StmtKind::Return(_) = s.kind {
        *n += 1;
    }
    for c in s.child_stmts() {
        count_returns(c, n);
    }
}

/// Guard every statement after one that may return, innermost blocks first.
fn instrument_block(block: &mut Block, flag: &str) {
    for s in block.stmts.iter_mut() {
        instrument_stmt(s, flag);
    }
    let stmts = std::mem::take(&mut block.stmts);
    block.stmts = guard_regions(stmts, flag);
}

fn instrument_stmt(s: &mut Stmt, flag: &str) {
    if let StmtKind::Block(b) = &mut s.kind {
        instrument_block(b, flag);
        return;
    }
    for c in s.child_stmts_mut() {
        instrument_stmt(c, flag);
    }
}

fn guard_regions(mut stmts: Vec<Stmt>, flag: &str) -> Vec<Stmt> {
    let split = match stmts.iter().position(query::contains_return) {
        Some(i) => i,
        None => return stmts,
    };
    let rest = stmts.split_off(split + 1);
    if !rest.is_empty() {
        stmts.push(Stmt::if_then(
            Expr::unary(UnOp::LNot, Expr::var(flag)),
            Stmt::block(guard_regions(rest, flag)),
            None,
        ));
    }
    stmts
}

struct Names {
    has_returned: String,
    return_value: String,
    restricted_for_loops: bool,
}

impl Names {
    fn set_has_returned(&self) -> Stmt {
        Stmt::expr(Expr::assign(Expr::var(&self.has_returned), Expr::boolean(true)))
    }

    fn not_returned(&self) -> Expr {
        Expr::paren(Expr::unary(UnOp::LNot, Expr::var(&self.has_returned)))
    }

    fn rewrite_stmt(&self, s: &mut Stmt) {
        if s.is_loop() && query::contains_return(s) {
            self.guard_loop(s);
        }
        match &mut s.kind {
            StmtKind::Return(value) => {
                *s = match value.take() {
                    Some(e) => Stmt::block(vec![
                        Stmt::expr(Expr::combine(BinOp::Assign, Expr::var(&self.return_value), e)),
                        self.set_has_returned(),
                    ]),
                    None => self.set_has_returned(),
                };
            }
            _ => {
                for c in s.child_stmts_mut() {
                    self.rewrite_stmt(c);
                }
            }
        }
    }

    fn guard_loop(&self, s: &mut Stmt) {
        match &mut s.kind {
            StmtKind::For { body, .. } if self.restricted_for_loops => {
                let mut old = std::mem::replace(body.as_mut(), Stmt::new(StmtKind::Null));
                if let StmtKind::Block(b) = &mut old.kind {
                    b.new_scope = true;
                }
                let check = Stmt::if_then(
                    Expr::var(&self.has_returned),
                    Stmt::block(vec![Stmt::new(StmtKind::Break)]),
                    None,
                );
                **body = Stmt::new(StmtKind::Block(Block::unscoped(vec![check, old])));
            }
            StmtKind::For { cond, .. } => {
                let old = cond.take().unwrap_or_else(|| Expr::boolean(true));
                *cond = Some(Expr::combine(BinOp::LAnd, self.not_returned(), old));
            }
            StmtKind::While { cond, .. } | StmtKind::Do { cond, .. } => {
                let old = std::mem::replace(cond, Expr::boolean(true));
                *cond = Expr::combine(BinOp::LAnd, self.not_returned(), old);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn removed(src: &str, name: &str, version: ShadingLanguageVersion) -> TranslationUnit {
        let mut tu = test::parse_frag(src);
        let f = tu.functions_mut().find(|f| f.name() == name).unwrap();
        remove_returns(f, version).unwrap();
        tu
    }

    #[test]
    fn test_trailing_return_is_kept() {
        let src = "int f(int x) { x++; return x; } void g() { } void main() { }";
        let tu = removed(src, "f", ShadingLanguageVersion::Essl310);
        test::assert_same_program(&tu, src);
        let tu = removed(src, "g", ShadingLanguageVersion::Essl310);
        test::assert_same_program(&tu, src);
    }

    #[test]
    fn test_early_return() {
        let tu = removed(
            "int f(int x) { if (x > 0) return 1; x++; return x; } void main() { }",
            "f",
            ShadingLanguageVersion::Essl310,
        );
        test::assert_same_program(
            &tu,
            "int f(int x) {
               bool f_has_returned = false;
               int f_return_value;
               if (x > 0) { f_return_value = 1; f_has_returned = true; }
               if (!f_has_returned) {
                 x++;
                 { f_return_value = x; f_has_returned = true; }
               }
               return f_return_value;
             }
             void main() { }",
        );
    }

    #[test]
    fn test_loops_stop_after_return() {
        let src = "void f() { for (int i = 0; i < 4; i++) { if (i == 2) return; } while (true) { return; } }
            void main() { }";
        let tu = removed(src, "f", ShadingLanguageVersion::Essl310);
        test::assert_same_program(
            &tu,
            "void f() {
               bool f_has_returned = false;
               for (int i = 0; (!f_has_returned) && i < 4; i++) { if (i == 2) f_has_returned = true; }
               if (!f_has_returned) {
                 while ((!f_has_returned) && true) { f_has_returned = true; }
               }
             }
             void main() { }",
        );
        let tu = removed(src, "f", ShadingLanguageVersion::Essl100);
        test::assert_same_program(
            &tu,
            "void f() {
               bool f_has_returned = false;
               for (int i = 0; i < 4; i++) { if (f_has_returned) { break; } { if (i == 2) f_has_returned = true; } }
               if (!f_has_returned) {
                 while ((!f_has_returned) && true) { f_has_returned = true; }
               }
             }
             void main() { }",
        );
    }

    #[test]
    fn test_switch_is_rejected() {
        let mut tu = test::parse_frag(
            "int f(int x) { switch (x) { case 0: return 1; } return 2; } void main() { }",
        );
        let f = tu.functions_mut().next().unwrap();
        let err = remove_returns(f, ShadingLanguageVersion::Essl310).unwrap_err();
        assert!(matches!(err, GlFuzzError::CannotRemoveReturns(_)));
    }
}
