//! Bound the number of iterations of every loop.
//!
//! Each loop gets its own counter `{prefix}_looplimiter{k}`, declared as
//! `int ... = 0;` right before the loop. The loop body starts with
//! `if (counter >= limit) { break; } counter++;`. Loops are numbered in
//! post-order, so the innermost loop of a nest gets 0.

use crate::ast::*;

pub struct LoopTruncator<'p> {
    limit: u32,
    prefix: &'p str,
    in_place: bool,
    counter: usize,
}

impl<'p> LoopTruncator<'p> {
    /// With `in_place`, a loop sitting directly in a block gets its counter
    /// declared in that block; otherwise the counter and the loop are
    /// wrapped in a new block.
    pub fn new(limit: u32, prefix: &'p str, in_place: bool) -> Self {
        Self {
            limit,
            prefix,
            in_place,
            counter: 0,
        }
    }

    /// Number of loops truncated so far.
    pub fn count(&self) -> usize {
        self.counter
    }

    pub fn truncate_unit(&mut self, tu: &mut TranslationUnit) {
        for f in tu.functions_mut() {
            self.truncate_block(&mut f.body);
        }
    }

    pub fn truncate_stmt(&mut self, s: &mut Stmt) {
        self.visit_children(s);
        if s.is_loop() {
            let decl = self.limit_loop(s);
            let old = std::mem::replace(s, Stmt::new(StmtKind::Null));
            *s = Stmt::block(vec![decl, old]);
        }
    }

    fn truncate_block(&mut self, block: &mut Block) {
        let stmts = std::mem::take(&mut block.stmts);
        let mut out = Vec::with_capacity(stmts.len());
        for mut s in stmts {
            if self.in_place && s.is_loop() {
                self.visit_children(&mut s);
                out.push(self.limit_loop(&mut s));
            } else {
                self.truncate_stmt(&mut s);
            }
            out.push(s);
        }
        block.stmts = out;
    }

    fn visit_children(&mut self, s: &mut Stmt) {
        if let Some(b) = s.owned_block_mut() {
            self.truncate_block(b);
            return;
        }
        for c in s.child_stmts_mut() {
            if let StmtKind::Block(b) = &mut c.kind {
                self.truncate_block(b);
            } else {
                self.truncate_stmt(c);
            }
        }
    }

    /// Add the check to the loop body and return the counter declaration.
    fn limit_loop(&mut self, s: &mut Stmt) -> Stmt {
        let name = format!("{}_looplimiter{}", self.prefix, self.counter);
        self.counter += 1;
        let check = Stmt::if_then(
            Expr::binary(BinOp::Ge, Expr::var(&name), Expr::int(self.limit as i64)),
            Stmt::block(vec![Stmt::new(StmtKind::Break)]),
            None,
        );
        let bump = Stmt::expr(Expr::unary(UnOp::PostInc, Expr::var(&name)));
        let (body, scoped) = match &mut s.kind {
            StmtKind::For { body, .. } | StmtKind::While { body, .. } => (body, false),
            StmtKind::Do { body, .. } => (body, true),
            _ => unreachable!("only loops are limited"),
        };
        match &mut body.kind {
            StmtKind::Block(b) => {
                b.stmts.splice(0..0, [check, bump]);
            }
            _ => {
                let old = std::mem::replace(body.as_mut(), Stmt::new(StmtKind::Null));
                let stmts = vec![check, bump, old];
                **body = Stmt::new(StmtKind::Block(Block {
                    stmts,
                    new_scope: scoped,
                }));
            }
        }
        Stmt::decl(VariablesDeclaration::single(
            TypeRef::basic(BasicType::Int),
            &name,
            Some(Expr::int(0)),
        ))
    }
}

/// Truncate every loop of `tu`; returns the number of loops bounded.
pub fn truncate_loops(tu: &mut TranslationUnit, limit: u32, prefix: &str, in_place: bool) -> usize {
    let mut truncator = LoopTruncator::new(limit, prefix, in_place);
    truncator.truncate_unit(tu);
    truncator.count()
}

/// Truncate the loops of a single statement.
pub fn truncate_loops_in_stmt(s: &mut Stmt, limit: u32, prefix: &str) -> usize {
    let mut truncator = LoopTruncator::new(limit, prefix, false);
    truncator.truncate_stmt(s);
    truncator.count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_nested_loops_number_innermost_first() {
        let mut tu = test::parse_frag(
            "void main() { for (int i = 0; i < 10; i++) { while (true) x++; } }",
        );
        assert_eq!(truncate_loops(&mut tu, 4, "p", false), 2);
        test::assert_same_program(
            &tu,
            "void main() {
               {
                 int p_looplimiter1 = 0;
                 for (int i = 0; i < 10; i++) {
                   if (p_looplimiter1 >= 4) { break; }
                   p_looplimiter1++;
                   {
                     int p_looplimiter0 = 0;
                     while (true) {
                       if (p_looplimiter0 >= 4) { break; }
                       p_looplimiter0++;
                       x++;
                     }
                   }
                 }
               }
             }",
        );
    }

    #[test]
    fn test_in_place_declares_in_enclosing_block() {
        let mut tu = test::parse_frag("void main() { do { } while (true); }");
        assert_eq!(truncate_loops(&mut tu, 3, "GLF_live0", true), 1);
        test::assert_same_program(
            &tu,
            "void main() {
               int GLF_live0_looplimiter0 = 0;
               do {
                 if (GLF_live0_looplimiter0 >= 3) { break; }
                 GLF_live0_looplimiter0++;
               } while (true);
             }",
        );
    }
}
