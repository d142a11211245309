//! Reducer
//!
//! Shrinks a shader job while an interestingness judge keeps accepting it.
//! Finders scan a snapshot of the job for [`ReductionOpportunity`]s, plans
//! decide how many of them to apply in one step, and the driver writes each
//! candidate to disk, asks the judge about it and keeps the accepted ones.
//!
//! By default only code that generation injected is touched. With
//! `reduce_everywhere` the original code shrinks as well.

mod driver;
mod injected;
mod judge;
mod opportunity;
mod plan;
mod scan;

pub use driver::*;
pub use injected::{is_dead_name, is_limiter_name, is_live_name, DEAD_PREFIX, LIVE_PREFIX};
pub use judge::*;
pub use opportunity::*;
pub use plan::*;

use crate::ast::{ShaderKind, ShadingLanguageVersion, TranslationUnit};
use crate::depot::ShaderJob;

/// What a finder may touch in one shader. Without `reduce_everywhere`
/// only injected code is reduced: dead code, `_GLF_FUZZED` expressions,
/// `GLF_live`/`GLF_dead` names and live code that leaves loop limiting alone.
#[derive(Debug, Clone, Copy)]
pub struct ReducerContext {
    pub reduce_everywhere: bool,
    pub version: ShadingLanguageVersion,
    pub kind: ShaderKind,
}

impl ReducerContext {
    pub fn new(tu: &TranslationUnit, reduce_everywhere: bool) -> Self {
        Self {
            reduce_everywhere,
            version: tu.version(),
            kind: tu.kind,
        }
    }
}

/// The kinds of opportunity searches, in the order a full reduction round
/// runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finder {
    Vectorization,
    Mutation,
    Stmt,
    Function,
    ExprToConstant,
    CompoundExprToSubExpr,
    OutlinedStatement,
    Unwrap,
    Destructify,
    VariableDecl,
}

impl Finder {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vectorization => "vectorization",
            Self::Mutation => "mutation",
            Self::Stmt => "statement",
            Self::Function => "function",
            Self::ExprToConstant => "expression to constant",
            Self::CompoundExprToSubExpr => "compound expression to sub-expression",
            Self::OutlinedStatement => "outlined statement",
            Self::Unwrap => "unwrap",
            Self::Destructify => "destructify",
            Self::VariableDecl => "variable declaration",
        }
    }

    /// Opportunities of this kind in every shader of `job`.
    pub fn find(&self, job: &ShaderJob, reduce_everywhere: bool) -> Vec<Opportunity> {
        job.shaders
            .iter()
            .enumerate()
            .flat_map(|(i, tu)| scan::scan(*self, i, tu, ReducerContext::new(tu, reduce_everywhere)))
            .collect()
    }
}

/// An opportunity bound to one shader of a job. `depth` is how deeply the
/// target is nested in statements; shallower opportunities go first.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub shader: usize,
    pub depth: usize,
    pub kind: ReductionOpportunity,
}

impl Opportunity {
    pub fn apply(&self, job: &mut ShaderJob) -> bool {
        match job.shaders.get_mut(self.shader) {
            Some(tu) => self.kind.apply(tu),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::test;

    fn job(src: &str) -> ShaderJob {
        ShaderJob::new(serde_json::json!({}), vec![test::parse_frag(src)])
    }

    /// Apply every opportunity `finder` reports, one rescan at a time, until
    /// none is left.
    fn exhaust(finder: Finder, src: &str, everywhere: bool) -> String {
        let mut job = job(src);
        for _ in 0..100 {
            let ops = finder.find(&job, everywhere);
            if !ops.iter().any(|op| op.apply(&mut job)) {
                break;
            }
        }
        render(&job.shaders[0])
    }

    fn count(finder: Finder, src: &str, everywhere: bool) -> usize {
        finder.find(&job(src), everywhere).len()
    }

    #[test]
    fn test_original_code_is_kept_by_default() {
        let src = "void main() { int a = 1; a++; a = a + 2; }";
        assert_eq!(count(Finder::Stmt, src, false), 0);
        assert_eq!(count(Finder::ExprToConstant, src, false), 0);
        assert_eq!(count(Finder::Stmt, src, true), 2);
    }

    #[test]
    fn test_dead_code_goes_away() {
        let src = "void main() {
              int a = 1;
              if (_GLF_DEAD(false)) { a = 3; a--; }
              a++;
            }";
        let out = exhaust(Finder::Stmt, src, false);
        assert_eq!(out, render(&test::parse_frag("void main() { int a = 1; a++; }")));
    }

    #[test]
    fn test_mutations_are_reverted() {
        let src = "void main() { int a = _GLF_IDENTITY(1, _GLF_ZERO(0, 0) + 1); }";
        let out = exhaust(Finder::Mutation, src, false);
        assert_eq!(out, render(&test::parse_frag("void main() { int a = 0 + 1; }")));
    }

    #[test]
    fn test_expressions_in_fuzzed_code_become_constants() {
        let src = "void main() { float x = 2.0; float y = _GLF_FUZZED(x * 3.0); }";
        let ops = Finder::ExprToConstant.find(&job(src), false);
        assert_eq!(ops.len(), 3);
        let out = exhaust(Finder::ExprToConstant, src, false);
        assert_eq!(
            out,
            render(&test::parse_frag("void main() { float x = 2.0; float y = 1.0; }"))
        );
    }

    #[test]
    fn test_lvalues_are_not_replaced() {
        let src = "void f(out int r) { r = 1; }
            void main() { int a; int b[2]; a = 3; b[1] = 2; f(a); }";
        let job = job(src);
        let tu = &job.shaders[0];
        for op in Finder::ExprToConstant.find(&job, true) {
            if let ReductionOpportunity::ExprToConstant { expr, .. } = op.kind {
                let text = render_expr(tu.find_expr(expr).unwrap());
                assert!(text != "a" && text != "b" && text != "r" && text != "b[1]", "{text}");
            }
        }
    }

    #[test]
    fn test_compound_to_sub_expression() {
        let src = "void main() { int a = 1; int b = _GLF_FUZZED((a + 2) * a); }";
        let out = exhaust(Finder::CompoundExprToSubExpr, src, false);
        assert_eq!(
            out,
            render(&test::parse_frag("void main() { int a = 1; int b = _GLF_FUZZED(a); }"))
        );
    }

    #[test]
    fn test_unreferenced_functions() {
        let src = "float f(float x);
            float f(float x) { return x; }
            float f(int x) { return 1.0; }
            float g() { return 2.0; }
            void main() { float y = f(1.0); }";
        let out = exhaust(Finder::Function, src, false);
        let expected = "float f(float x);
            float f(float x) { return x; }
            void main() { float y = f(1.0); }";
        assert_eq!(out, render(&test::parse_frag(expected)));
    }

    #[test]
    fn test_unused_declarations() {
        let src = "uniform vec2 injectionSwitch;
            uniform float time;
            int g;
            int f() { return 1; }
            void main() { int a = 1; int b = f(); int c; c = 2; }";
        let out = exhaust(Finder::VariableDecl, src, false);
        let expected = "uniform float time;
            int f() { return 1; }
            void main() { int b = f(); int c; c = 2; }";
        assert_eq!(out, render(&test::parse_frag(expected)));
    }

    #[test]
    fn test_unwrap_blocks_without_clashes() {
        let src = "void main() { int a = 1; { int a = 2; } { int b = 3; } int b; }";
        assert_eq!(count(Finder::Unwrap, src, false), 0);
        let src = "void main() { int a = 1; { int c = 2; a = c; } }";
        let out = exhaust(Finder::Unwrap, src, false);
        assert_eq!(
            out,
            render(&test::parse_frag("void main() { int a = 1; int c = 2; a = c; }"))
        );
    }

    #[test]
    fn test_wrapped_loop_with_break_stays() {
        let src = "void main() { int a = 0; while (_GLF_WRAPPED_LOOP(true)) { a++; break; } }";
        assert_eq!(count(Finder::Unwrap, src, false), 0);
        let src = "void main() { int a = 0; do { a++; } while (_GLF_WRAPPED_LOOP(false)); }";
        let out = exhaust(Finder::Unwrap, src, false);
        assert_eq!(out, render(&test::parse_frag("void main() { int a = 0; a++; }")));
    }

    #[test]
    fn test_outlined_statement_is_inlined() {
        let src = "int _GLF_outlined_1(int p) { return p + 1; }
            void main() { int a = 1; int b; b = _GLF_outlined_1(a); }";
        let out = exhaust(Finder::OutlinedStatement, src, false);
        let expected = "int _GLF_outlined_1(int p) { return p + 1; }
            void main() { int a = 1; int b; b = a + 1; }";
        assert_eq!(out, render(&test::parse_frag(expected)));
    }

    #[test]
    fn test_destructify() {
        let src = "struct _GLF_struct_1 { float _f0; float x; };
            struct _GLF_struct_0 { int _f0; _GLF_struct_1 _f1; };
            void main() {
              _GLF_struct_0 _GLF_struct_replacement_0 = _GLF_struct_0(1, _GLF_struct_1(1.0, 2.0));
              _GLF_struct_replacement_0._f1.x = _GLF_struct_replacement_0._f1.x + 1.0;
            }";
        let out = exhaust(Finder::Destructify, src, false);
        let expected = "struct _GLF_struct_1 { float _f0; float x; };
            struct _GLF_struct_0 { int _f0; _GLF_struct_1 _f1; };
            void main() { float x = 2.0; x = x + 1.0; }";
        assert_eq!(out, render(&test::parse_frag(expected)));
    }

    #[test]
    fn test_destructify_needs_every_use_to_be_a_full_lookup() {
        let src = "struct _GLF_struct_0 { float x; int _f0; };
            void main() {
              _GLF_struct_0 _GLF_struct_replacement_0 = _GLF_struct_0(2.0, 1);
              _GLF_struct_0 copy = _GLF_struct_replacement_0;
            }";
        assert_eq!(count(Finder::Destructify, src, false), 0);
    }

    #[test]
    fn test_vectorization_is_reversed() {
        let src = "void main() {
              vec3 GLF_merged2_0_1_1_1_2_1ab;
              float a = 1.0;
              GLF_merged2_0_1_1_1_2_1ab.x = a;
              vec2 b = vec2(2.0);
              GLF_merged2_0_1_1_1_2_1ab.yz = b;
              float c = GLF_merged2_0_1_1_1_2_1ab.x + GLF_merged2_0_1_1_1_2_1ab.yz.x;
            }";
        let ops = Finder::Vectorization.find(&job(src), false);
        assert_eq!(ops.len(), 2);
        let out = exhaust(Finder::Vectorization, src, false);
        let expected = "void main() {
              vec3 GLF_merged2_0_1_1_1_2_1ab;
              float a = 1.0;
              a = a;
              vec2 b = vec2(2.0);
              b = b;
              float c = a + b.x;
            }";
        assert_eq!(out, render(&test::parse_frag(expected)));
    }

    #[test]
    fn test_value_returns_survive() {
        let src = "int f() { int a = 1; return a; } void main() { f(); }";
        let job = job(src);
        let ops = Finder::Stmt.find(&job, true);
        let ret = job.shaders[0].function("f").unwrap().body.stmts[1].id;
        assert!(!ops.is_empty());
        assert!(ops.iter().all(|op| !matches!(
            op.kind,
            ReductionOpportunity::RemoveStmt { stmt, .. } if stmt == ret
        )));
    }
}
