//! Pack local scalars and vectors of one scope into a single vector.
//!
//! When leaving a block, the variables it declared are randomly grouped
//! into merge sets. Applying a set declares `vecN GLF_merged...;` at the
//! start of the block, copies each variable into its components right
//! after its declaration, and rewrites every later use as a swizzle.

use super::merge_set::{MergeCandidate, MergeSet, MERGED_PREFIX};
use super::FuzzRng;
use crate::ast::*;
use crate::typing::{Bindings, DeclSite, Scope};
use crate::visit::{self, Visitor};

#[derive(Debug, Clone)]
pub struct VectorizeOpportunity {
    /// Owner of the block the variables are declared in.
    pub block: NodeId,
    pub set: MergeSet,
}

struct VectorizeFinder<'r> {
    scope: Scope,
    version: ShadingLanguageVersion,
    rng: &'r mut FuzzRng,
    switches: Vec<NodeId>,
    found: Vec<VectorizeOpportunity>,
}

impl VectorizeFinder<'_> {
    fn candidates(&self, block: &Block) -> Vec<MergeCandidate> {
        let mut out = vec![];
        for (name, entry) in self.scope.current_frame() {
            let (decl, info) = match entry.site {
                DeclSite::Variable { decl, info } => (decl, info),
                DeclSite::Parameter { .. } => continue,
            };
            if name.starts_with(MERGED_PREFIX) {
                continue;
            }
            let allowed = entry.ty.qualifiers().iter().all(|q| {
                q.is_precision()
                    || (*q == TypeQualifier::Const && !self.version.initializers_of_const_must_be_const())
            });
            if !allowed {
                continue;
            }
            let ty = match entry.ty.as_basic() {
                Some(b) if (b.is_scalar() || b.is_vector()) && !b.is_boolean() => b,
                _ => continue,
            };
            let decl_stmt = block.stmts.iter().find_map(|s| match &s.kind {
                StmtKind::Decl(d) if d.id == decl => Some(s.id),
                _ => None,
            });
            if let Some(decl_stmt) = decl_stmt {
                out.push(MergeCandidate {
                    name: name.clone(),
                    ty,
                    decl_stmt,
                    decl,
                    info,
                });
            }
        }
        out
    }
}

impl<'a> Visitor<'a> for VectorizeFinder<'_> {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let StmtKind::Switch { .. } = stmt.kind {
            self.switches.push(stmt.id);
        }
        visit::walk_stmt(self, stmt);
    }

    fn leave_block(&mut self, owner: NodeId, block: &'a Block) {
        if self.switches.contains(&owner) {
            return;
        }
        let mut sets: Vec<MergeSet> = vec![];
        for c in self.candidates(block) {
            let with_space: Vec<usize> = (0..sets.len()).filter(|&i| sets[i].can_accept(&c)).collect();
            let index = self.rng.below(with_space.len() + 1);
            if index == with_space.len() {
                sets.push(MergeSet::new(c));
            } else {
                sets[with_space[index]].add(c);
            }
        }
        self.found.extend(
            sets.into_iter()
                .filter(|s| s.len() > 1)
                .map(|set| VectorizeOpportunity { block: owner, set }),
        );
    }
}

pub fn find_vectorize_opportunities(tu: &TranslationUnit, rng: &mut FuzzRng) -> Vec<VectorizeOpportunity> {
    let mut finder = VectorizeFinder {
        scope: Scope::new(),
        version: tu.version(),
        rng,
        switches: vec![],
        found: vec![],
    };
    finder.visit_unit(tu);
    finder.found
}

/// Merge the variables of `op`. Returns false, leaving the tree alone, when
/// the block already holds the vector or a declaration has moved.
pub fn vectorize(tu: &mut TranslationUnit, op: &VectorizeOpportunity) -> bool {
    let name = op.set.merged_name();
    let ty = match op.set.merged_type() {
        Some(ty) => ty,
        None => return false,
    };
    let block_stmts: Vec<NodeId> = match tu.find_block_mut(op.block) {
        Some(block) => {
            let declared = block.stmts.iter().any(|s| match &s.kind {
                StmtKind::Decl(d) => d.decls.iter().any(|i| i.name == name),
                _ => false,
            });
            if declared {
                crate::log!(debug, "`{name}` is already declared");
                return false;
            }
            block.stmts.iter().map(|s| s.id).collect()
        }
        None => return false,
    };
    if !op.set.entries().iter().all(|e| block_stmts.contains(&e.decl_stmt)) {
        crate::log!(debug, "declarations of `{name}` moved, not vectorizing");
        return false;
    }

    // Uses inside a variable's own declaration statement run before the
    // copy into the vector, so they keep reading the variable.
    let uses: Vec<(usize, Vec<NodeId>)> = {
        let bindings = Bindings::new(tu);
        op.set
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let in_decl: Vec<NodeId> = tu
                    .find_stmt(e.decl_stmt)
                    .map(|s| query::exprs_in_stmt(s).into_iter().map(|x| x.id).collect())
                    .unwrap_or_default();
                let ids = bindings
                    .uses_of(e.info)
                    .into_iter()
                    .filter(|id| !in_decl.contains(id))
                    .collect();
                (i, ids)
            })
            .collect()
    };
    for (i, ids) in uses {
        let swizzle = op.set.swizzle(i);
        for id in ids {
            tu.replace_expr(id, Expr::member(Expr::var(&name), &swizzle));
        }
    }
    for (i, e) in op.set.entries().iter().enumerate() {
        let copy = Stmt::expr(Expr::assign(
            Expr::member(Expr::var(&name), &op.set.swizzle(i)),
            Expr::var(&e.name),
        ));
        tu.insert_after(e.decl_stmt, vec![copy]);
    }
    if let Some(block) = tu.find_block_mut(op.block) {
        block.stmts.insert(
            0,
            Stmt::decl(VariablesDeclaration::single(TypeRef::basic(ty), &name, None)),
        );
    }
    crate::log!(trace, "merged {} variables into `{name}`", op.set.len());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn first_opportunity(tu: &TranslationUnit) -> VectorizeOpportunity {
        (0..64)
            .find_map(|seed| {
                let mut rng = FuzzRng::new(seed);
                find_vectorize_opportunities(tu, &mut rng).into_iter().next()
            })
            .unwrap()
    }

    #[test]
    fn test_vectorize_two_floats() {
        let mut tu = test::parse_frag("void main() { float a = 1.0; float b = 2.0; b = a * b; }");
        let op = first_opportunity(&tu);
        assert!(vectorize(&mut tu, &op));
        test::assert_same_program(
            &tu,
            "void main() {
               vec2 GLF_merged2_0_1_1_1_1_1ab;
               float a = 1.0;
               GLF_merged2_0_1_1_1_1_1ab.x = a;
               float b = 2.0;
               GLF_merged2_0_1_1_1_1_1ab.y = b;
               GLF_merged2_0_1_1_1_1_1ab.y = GLF_merged2_0_1_1_1_1_1ab.x * GLF_merged2_0_1_1_1_1_1ab.y;
             }",
        );
        assert!(!vectorize(&mut tu, &op));
    }

    #[test]
    fn test_use_in_own_declaration_reads_variable() {
        let src = "void main() { float a = 1.0, b = a; float c = 2.0; gl_FragColor = vec4(a, b, c, 1.0); }";
        let tu = test::parse_frag(src);
        let op = (0..64)
            .flat_map(|seed| find_vectorize_opportunities(&tu, &mut FuzzRng::new(seed)))
            .find(|op| op.set.entries().iter().any(|e| e.name == "a"))
            .unwrap();
        let name = op.set.merged_name();
        let mut tu = tu;
        assert!(vectorize(&mut tu, &op));
        let main = tu.main_function().unwrap();
        let decl = main
            .body
            .stmts
            .iter()
            .find(|s| matches!(&s.kind, StmtKind::Decl(d) if d.decls.iter().any(|i| i.name == "b")))
            .unwrap();
        let rendered = render_stmt(decl);
        assert!(rendered.contains("b = a"), "{rendered}");
        assert!(!rendered.contains(&name), "{rendered}");
        // The later use of `a` goes through the vector.
        assert!(render(&tu).contains(&format!("vec4({name}.")));
    }

    #[test]
    fn test_sets_respect_capacity() {
        let tu = test::parse_frag(
            "void main() {
               float a, b; vec2 c; vec3 d; float e; int i; int j; bool k; bool l;
               float arr[2]; float f = a + b + c.x + d.x + e;
             }",
        );
        for seed in 0..32 {
            let mut rng = FuzzRng::new(seed);
            for op in find_vectorize_opportunities(&tu, &mut rng) {
                assert!(op.set.width() <= 4);
                let entries = op.set.entries();
                for (i, x) in entries.iter().enumerate() {
                    assert!(!entries[i + 1..].iter().any(|y| y.decl == x.decl));
                    assert!(!["k", "l", "arr"].contains(&x.name.as_str()));
                }
            }
        }
    }

    #[test]
    fn test_switch_bodies_are_skipped() {
        let tu = test::parse_frag(
            "#version 310 es
             void main() { switch (1) { case 1: float a = 1.0; float b = 2.0; break; } }",
        );
        for seed in 0..16 {
            let mut rng = FuzzRng::new(seed);
            assert!(find_vectorize_opportunities(&tu, &mut rng).is_empty());
        }
    }
}
