//! Donate statements from other shaders.
//!
//! A donor is first prepared: every name it declares, and every builtin
//! variable it touches, gets a `GLF_dead{n}`/`GLF_live{n}` prefix, and its
//! globals lose their interface qualifiers. A random statement of the donor
//! is then adjusted to the injection point and inserted, together with the
//! donor's functions, globals and structs.
//!
//! Dead code sits under an `if` whose condition is false at run time. Live
//! code runs, so its loops are bounded, it can not `discard`, and it only
//! touches its own variables.

use std::collections::{BTreeSet, HashMap};

use super::injection::{find_injection_points, InjectionPoint};
use super::truncate::truncate_loops;
use super::{macros, FuzzRng, IdGenerator};
use crate::ast::{query, *};
use crate::config::{LOOP_LIMIT_MIN, LOOP_LIMIT_SPAN};
use crate::typing::{builtins, Bindings, DeclSite};
use crate::visit::{self, Visitor, VisitorMut};
use crate::GlFuzzError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationKind {
    DeadCode,
    LiveCode,
}

impl DonationKind {
    fn prefix(&self, n: u32) -> String {
        match self {
            Self::DeadCode => format!("GLF_dead{n}"),
            Self::LiveCode => format!("GLF_live{n}"),
        }
    }
}

/// Donates code into one recipient shader.
pub struct CodeDonator<'d> {
    donors: &'d [TranslationUnit],
    kind: DonationKind,
    /// Donors already renamed and copied into the recipient, by index.
    prepared: HashMap<usize, TranslationUnit>,
}

/// A statement of a prepared donor that may be donated.
struct Fragment {
    stmt: Stmt,
    return_type: TypeRef,
    free: Vec<(String, TypeRef)>,
}

impl<'d> CodeDonator<'d> {
    pub fn new(donors: &'d [TranslationUnit], kind: DonationKind) -> Self {
        Self {
            donors,
            kind,
            prepared: HashMap::new(),
        }
    }

    /// Inject one fragment from a random donor at a random point. Returns
    /// `Ok(false)` when there is nothing to donate or nowhere to put it.
    pub fn donate(
        &mut self,
        tu: &mut TranslationUnit,
        rng: &mut FuzzRng,
        ids: &mut IdGenerator,
    ) -> Result<bool, GlFuzzError> {
        if self.donors.is_empty() {
            return Ok(false);
        }
        let points = find_injection_points(tu);
        let point = match rng.choose(&points) {
            Some(p) => p.clone(),
            None => return Ok(false),
        };
        let donor = rng.below(self.donors.len());
        self.donate_at(tu, &point, donor, rng, ids)?;
        Ok(true)
    }

    /// Inject a fragment of donor `donor` at `point`.
    pub fn donate_at(
        &mut self,
        tu: &mut TranslationUnit,
        point: &InjectionPoint,
        donor: usize,
        rng: &mut FuzzRng,
        ids: &mut IdGenerator,
    ) -> Result<(), GlFuzzError> {
        let donors = self.donors;
        let original = donors
            .get(donor)
            .ok_or_else(|| GlFuzzError::IncompatibleDonor(format!("no donor #{donor}")))?;
        if original.version() != tu.version() {
            return Err(GlFuzzError::IncompatibleDonor(format!(
                "donor version {} differs from {}",
                original.version(),
                tu.version()
            )));
        }
        if original.kind != tu.kind {
            return Err(GlFuzzError::IncompatibleDonor(format!(
                "donor is a {} shader, recipient a {} shader",
                original.kind, tu.kind
            )));
        }

        let first_use = !self.prepared.contains_key(&donor);
        let prepared = match self.prepared.get(&donor) {
            Some(p) => p.clone(),
            None => {
                let prefix = self.kind.prefix(ids.fresh_id());
                prepare_donor(original, &prefix, self.kind, rng)
            }
        };
        if first_use {
            check_name_clashes(tu, &prepared)?;
        }

        let fragment = pick_fragment(&prepared, rng)
            .ok_or_else(|| GlFuzzError::IncompatibleDonor("donor has no statement to donate".into()))?;
        let called = query::calls_in_stmt(&fragment.stmt);
        if let Some(name) = point
            .scope
            .names_of_all_variables()
            .into_iter()
            .find(|v| called.contains(v))
        {
            return Err(GlFuzzError::IncompatibleDonor(format!(
                "variable `{name}` hides a donated function"
            )));
        }
        if tu.version().is_webgl() && indexes_with_free_variable(&fragment) {
            return Err(GlFuzzError::IncompatibleDonor(
                "array indexed by a free variable".into(),
            ));
        }

        let structs: HashMap<String, StructDefinition> =
            prepared.structs().map(|s| (s.name.clone(), s.clone())).collect();
        let lookup = |n: &str| structs.get(n).cloned();
        let injected = match self.kind {
            DonationKind::DeadCode => dead_fragment(fragment, point, tu.kind, rng, &lookup)?,
            DonationKind::LiveCode => live_fragment(fragment, &lookup)?,
        };

        let block = tu
            .find_block_mut(point.block)
            .ok_or_else(|| GlFuzzError::IncompatibleDonor(format!("block {} is gone", point.block)))?;
        let index = point.index.min(block.stmts.len());
        block.stmts.insert(index, injected);

        if first_use {
            donate_declarations(tu, &prepared);
            self.prepared.insert(donor, prepared);
        }
        if self.kind == DonationKind::DeadCode {
            macros::ensure_injection_switch(tu);
            macros::ensure_macro_definitions(tu);
        }
        crate::log!(trace, "donated {:?} from donor #{donor} into block {}", self.kind, point.block);
        Ok(())
    }
}

/// Rename everything the donor declares, strip interface qualifiers from
/// its globals, and for live code bound its loops and drop `discard`.
pub fn prepare_donor(
    donor: &TranslationUnit,
    prefix: &str,
    kind: DonationKind,
    rng: &mut FuzzRng,
) -> TranslationUnit {
    let mut tu = donor.duplicate();
    let mut declared = BTreeSet::new();
    let mut functions = BTreeSet::new();
    for decl in &tu.decls {
        match decl {
            Decl::Function(f) => {
                functions.insert(f.name().to_string());
                declared.extend(f.prototype.params.iter().filter_map(|p| p.name.clone()));
                for s in &f.body.stmts {
                    declared.extend(query::declared_in_stmt(s));
                }
            }
            Decl::Prototype(p) => {
                functions.insert(p.name.clone());
            }
            Decl::Variables(v) => declared.extend(v.decls.iter().map(|i| i.name.clone())),
            _ => {}
        }
    }
    functions.remove("main");

    let mut renamer = DonorRenamer {
        prefix,
        declared: &declared,
        functions: &functions,
        builtins: BTreeSet::new(),
    };
    renamer.visit_unit_mut(&mut tu);

    for decl in tu.decls.iter_mut() {
        if let Decl::Variables(v) = decl {
            v.base_type = v.base_type.retain_qualifiers(|q| !q.is_interface());
        }
    }
    for name in std::mem::take(&mut renamer.builtins).into_iter().rev() {
        let ty = match builtins::builtin_variable_type(&name, tu.kind) {
            Some(ty) => ty.without_qualifiers(),
            None => continue,
        };
        let mut info = VariableDeclInfo::new(&format!("{prefix}{name}"), None);
        let base = match ty.array_element() {
            Some(element) => {
                info.array = ty.array_size().map(ArrayInfo::Sized);
                element
            }
            None => ty,
        };
        tu.insert_after_header(Decl::Variables(VariablesDeclaration::new(base, vec![info])));
    }

    if kind == DonationKind::LiveCode {
        let limit = LOOP_LIMIT_MIN + rng.below(LOOP_LIMIT_SPAN as usize) as u32;
        truncate_loops(&mut tu, limit, prefix, false);
        DiscardRemover.visit_unit_mut(&mut tu);
    }
    tu
}

struct DonorRenamer<'n> {
    prefix: &'n str,
    declared: &'n BTreeSet<String>,
    functions: &'n BTreeSet<String>,
    /// Builtin variables seen, renamed like donor variables.
    builtins: BTreeSet<String>,
}

impl DonorRenamer<'_> {
    fn renamed(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }
}

impl VisitorMut for DonorRenamer<'_> {
    fn visit_prototype_mut(&mut self, p: &mut FunctionPrototype) {
        if self.functions.contains(&p.name) {
            p.name = self.renamed(&p.name);
        }
        for param in p.params.iter_mut() {
            if let Some(name) = &param.name {
                param.name = Some(self.renamed(name));
            }
        }
    }

    fn visit_variables_declaration_mut(&mut self, decl: &mut VariablesDeclaration) {
        for info in decl.decls.iter_mut() {
            info.name = self.renamed(&info.name);
        }
        visit::walk_variables_declaration_mut(self, decl);
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Var(name) if self.declared.contains(name.as_str()) => {
                *name = self.renamed(name);
            }
            ExprKind::Var(name) if name.starts_with("gl_") => {
                self.builtins.insert(name.clone());
                *name = self.renamed(name);
            }
            ExprKind::Call { callee, .. } if self.functions.contains(callee.as_str()) => {
                *callee = self.renamed(callee);
            }
            _ => {}
        }
        visit::walk_expr_mut(self, expr);
    }
}

struct DiscardRemover;

impl VisitorMut for DiscardRemover {
    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        if let StmtKind::Discard = stmt.kind {
            stmt.kind = StmtKind::Null;
        }
        visit::walk_stmt_mut(self, stmt);
    }
}

fn check_name_clashes(tu: &TranslationUnit, donor: &TranslationUnit) -> Result<(), GlFuzzError> {
    let mut taken: BTreeSet<&str> = tu.functions().map(|f| f.name()).collect();
    taken.extend(tu.structs().map(|s| s.name.as_str()));
    taken.extend(tu.global_variables().flat_map(|v| v.decls.iter().map(|i| i.name.as_str())));
    let mut offered: Vec<&str> = donor
        .functions()
        .map(|f| f.name())
        .filter(|n| *n != "main")
        .collect();
    offered.extend(donor.structs().map(|s| s.name.as_str()));
    offered.extend(donor.global_variables().flat_map(|v| v.decls.iter().map(|i| i.name.as_str())));
    match offered.into_iter().find(|n| taken.contains(n)) {
        Some(name) => Err(GlFuzzError::IncompatibleDonor(format!("`{name}` is already declared"))),
        None => Ok(()),
    }
}

/// Statements of the donor's function bodies that could be donated.
#[derive(Default)]
struct FragmentCollector<'a> {
    function: Option<&'a FunctionDefinition>,
    found: Vec<(&'a FunctionDefinition, &'a Stmt)>,
}

impl<'a> Visitor<'a> for FragmentCollector<'a> {
    fn enter_function(&mut self, f: &'a FunctionDefinition) {
        self.function = Some(f);
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        let useful = !matches!(
            stmt.kind,
            StmtKind::Case(_)
                | StmtKind::Null
                | StmtKind::Break
                | StmtKind::Continue
                | StmtKind::Discard
                | StmtKind::Return(_)
        );
        if let (true, Some(f)) = (useful, self.function) {
            self.found.push((f, stmt));
        }
        match &stmt.kind {
            // The loop header is not a statement of its own.
            StmtKind::For { body, .. } => self.visit_stmt(body),
            _ => visit::walk_stmt(self, stmt),
        }
    }
}

fn pick_fragment(donor: &TranslationUnit, rng: &mut FuzzRng) -> Option<Fragment> {
    let mut collector = FragmentCollector::default();
    collector.visit_unit(donor);
    let (function, stmt) = *rng.choose(&collector.found)?;

    let mut inside = BTreeSet::new();
    let mut stack = vec![stmt];
    while let Some(s) = stack.pop() {
        if let StmtKind::Decl(d) = &s.kind {
            inside.extend(d.decls.iter().map(|i| i.id));
        }
        stack.extend(s.child_stmts());
    }
    let globals: BTreeSet<NodeId> = donor
        .global_variables()
        .flat_map(|v| v.decls.iter().map(|i| i.id))
        .collect();
    let bindings = Bindings::new(donor);
    let mut free: Vec<(String, TypeRef)> = vec![];
    for e in query::exprs_in_stmt(stmt) {
        let (name, entry) = match (e.as_var(), bindings.entry(e.id)) {
            (Some(name), Some(entry)) => (name, entry),
            _ => continue,
        };
        let is_free = match entry.site {
            DeclSite::Parameter { .. } => true,
            DeclSite::Variable { info, .. } => !inside.contains(&info) && !globals.contains(&info),
        };
        if is_free && !free.iter().any(|(n, _)| n == name) {
            free.push((name.to_string(), entry.ty.without_qualifiers()));
        }
    }
    Some(Fragment {
        stmt: stmt.duplicate(),
        return_type: function.prototype.return_type,
        free,
    })
}

fn indexes_with_free_variable(fragment: &Fragment) -> bool {
    query::exprs_in_stmt(&fragment.stmt).into_iter().any(|e| match &e.kind {
        ExprKind::Index { index, .. } => query::variables_in_expr(index)
            .iter()
            .any(|v| fragment.free.iter().any(|(n, _)| n == v)),
        _ => false,
    })
}

/// What a fragment may keep once moved to its injection point.
struct Adjuster {
    keep_returns: bool,
    keep_discard: bool,
}

impl Adjuster {
    fn adjust(&self, s: &mut Stmt, in_loop: bool, can_break: bool, in_switch: bool) {
        let drop = match &s.kind {
            StmtKind::Break => !can_break,
            StmtKind::Continue => !in_loop,
            StmtKind::Discard => !self.keep_discard,
            StmtKind::Return(_) => !self.keep_returns,
            StmtKind::Case(_) => !in_switch,
            _ => false,
        };
        if drop {
            s.kind = StmtKind::Null;
            return;
        }
        if let StmtKind::Switch { body, .. } = &mut s.kind {
            for c in body.stmts.iter_mut() {
                self.adjust(c, in_loop, true, true);
            }
            return;
        }
        let looping = s.is_loop();
        for c in s.child_stmts_mut() {
            self.adjust(c, in_loop || looping, can_break || looping, false);
        }
    }
}

fn free_variable_decl(name: &str, ty: TypeRef, init: Option<Expr>) -> Stmt {
    let mut info = VariableDeclInfo::new(name, init);
    let base = match ty.array_element() {
        Some(element) => {
            info.array = Some(ty.array_size().map_or(ArrayInfo::Unsized, ArrayInfo::Sized));
            element
        }
        None => ty,
    };
    Stmt::decl(VariablesDeclaration::new(base, vec![info]))
}

fn dead_fragment(
    mut fragment: Fragment,
    point: &InjectionPoint,
    kind: ShaderKind,
    rng: &mut FuzzRng,
    structs: &dyn Fn(&str) -> Option<StructDefinition>,
) -> Result<Stmt, GlFuzzError> {
    let adjuster = Adjuster {
        keep_returns: fragment.return_type.same_unqualified(point.return_type),
        keep_discard: kind == ShaderKind::Fragment,
    };
    adjuster.adjust(&mut fragment.stmt, point.in_loop, point.can_break, false);

    let mut stmts = Vec::with_capacity(fragment.free.len() + 1);
    for (name, ty) in &fragment.free {
        if ty.is_opaque() {
            return Err(GlFuzzError::IncompatibleDonor(format!("free variable `{name}` is opaque")));
        }
        let same_typed: Vec<String> = if ty.is_array() {
            vec![]
        } else {
            point
                .scope
                .names_of_all_variables()
                .into_iter()
                .filter(|v| point.scope.lookup_type(v).map_or(false, |t| t.same_unqualified(*ty)))
                .collect()
        };
        let init = match rng.choose(&same_typed) {
            Some(v) => Some(Expr::var(v)),
            None => query::canonical_constant(*ty, structs),
        };
        stmts.push(free_variable_decl(name, *ty, init));
    }
    stmts.push(fragment.stmt);
    Ok(Stmt::if_then(macros::dead_condition(), Stmt::block(stmts), None))
}

fn live_fragment(
    mut fragment: Fragment,
    structs: &dyn Fn(&str) -> Option<StructDefinition>,
) -> Result<Stmt, GlFuzzError> {
    let adjuster = Adjuster {
        keep_returns: false,
        keep_discard: false,
    };
    adjuster.adjust(&mut fragment.stmt, false, false, false);

    let mut stmts = Vec::with_capacity(fragment.free.len() + 1);
    for (name, ty) in &fragment.free {
        let init = if name.contains("_looplimiter") {
            Expr::int(0)
        } else {
            query::canonical_constant(*ty, structs).ok_or_else(|| {
                GlFuzzError::IncompatibleDonor(format!("no constant for free variable `{name}`"))
            })?
        };
        stmts.push(free_variable_decl(name, *ty, Some(init)));
    }
    stmts.push(fragment.stmt);
    Ok(Stmt::block(stmts))
}

/// Copy the donor's functions, globals and structs in front of the first
/// function of the recipient.
fn donate_declarations(tu: &mut TranslationUnit, donor: &TranslationUnit) {
    let declarations: Vec<Decl> = donor
        .decls
        .iter()
        .filter(|d| match d {
            Decl::Function(f) => f.name() != "main",
            Decl::Prototype(p) => p.name != "main",
            Decl::Variables(_) | Decl::Struct(_) => true,
            Decl::Precision { .. } | Decl::Directive(_) => false,
        })
        .map(|d| match d {
            Decl::Function(f) => Decl::Function(f.duplicate()),
            Decl::Variables(v) => Decl::Variables(v.duplicate()),
            other => other.clone(),
        })
        .collect();
    let index = tu
        .decls
        .iter()
        .position(|d| matches!(d, Decl::Function(_) | Decl::Prototype(_)))
        .unwrap_or(tu.decls.len());
    tu.decls.splice(index..index, declarations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_prepare_donor_renames() {
        let donor = test::parse_frag(
            "uniform float u;
             float f(float x) { return x * u; }
             void main() { float y = f(1.0); gl_FragColor = vec4(y); }",
        );
        let mut rng = test::rng();
        let tu = prepare_donor(&donor, "GLF_dead3", DonationKind::DeadCode, &mut rng);
        test::assert_same_program(
            &tu,
            "vec4 GLF_dead3gl_FragColor;
             float GLF_dead3u;
             float GLF_dead3f(float GLF_dead3x) { return GLF_dead3x * GLF_dead3u; }
             void main() { float GLF_dead3y = GLF_dead3f(1.0); GLF_dead3gl_FragColor = vec4(GLF_dead3y); }",
        );
    }

    #[test]
    fn test_live_donor_is_bounded() {
        let donor = test::parse_frag("void main() { while (true) { discard; } }");
        let mut rng = test::rng();
        let tu = prepare_donor(&donor, "GLF_live0", DonationKind::LiveCode, &mut rng);
        let text = render(&tu);
        assert!(text.contains("GLF_live0_looplimiter0"));
        assert!(!text.contains("discard"));
    }

    #[test]
    fn test_dead_donation() {
        let donors = vec![test::parse_frag(
            "float g(float a) { return a + 1.0; }
             void main() { float b = 2.0; b = g(b); }",
        )];
        for seed in 0..16 {
            let mut tu = test::parse_frag("void main() { float c = 1.0; }");
            let mut donator = CodeDonator::new(&donors, DonationKind::DeadCode);
            let mut rng = FuzzRng::new(seed);
            let mut ids = test::ids();
            assert!(donator.donate(&mut tu, &mut rng, &mut ids).unwrap());
            let text = render(&tu);
            assert!(text.contains("uniform vec2 injectionSwitch;"), "{text}");
            assert!(text.contains("float GLF_dead0g(float GLF_dead0a)"), "{text}");
            assert!(text.contains("if (_GLF_DEAD(_GLF_FALSE(false, (injectionSwitch.x > injectionSwitch.y))))"), "{text}");
            test::assert_same_program(&tu, &text);
            // A second donation reuses the prepared donor.
            donator.donate(&mut tu, &mut rng, &mut ids).unwrap();
            assert_eq!(tu.functions().filter(|f| f.name() == "GLF_dead0g").count(), 1);
        }
    }

    #[test]
    fn test_live_fragment_declares_free_variables() {
        let donors = vec![test::parse_frag("void main() { int k = 3; for (int i = 0; i < k; i++) { k--; } }")];
        let recipient = test::parse_frag("void main() { }");
        let point = find_injection_points(&recipient).remove(0);
        let mut found_loop = false;
        for seed in 0..32 {
            let mut tu = recipient.clone();
            let mut donator = CodeDonator::new(&donors, DonationKind::LiveCode);
            let mut rng = FuzzRng::new(seed);
            let mut ids = test::ids();
            donator.donate_at(&mut tu, &point, 0, &mut rng, &mut ids).unwrap();
            let main = tu.main_function().unwrap();
            let text = render_stmt(&main.body.stmts[0]);
            if text.contains("for (") {
                found_loop = true;
                assert!(text.contains("int GLF_live0k = 1;"), "{text}");
            }
            if text.contains("GLF_live0_looplimiter0 >=") && !text.contains("int GLF_live0_looplimiter0 = 0;") {
                panic!("loop limiter is not declared: {text}");
            }
        }
        assert!(found_loop);
    }

    #[test]
    fn test_incompatible_donors() {
        let donors = vec![test::parse_frag("#version 310 es\nvoid main() { int x = 1; }")];
        let mut tu = test::parse_frag("void main() { }");
        let point = find_injection_points(&tu).remove(0);
        let mut donator = CodeDonator::new(&donors, DonationKind::DeadCode);
        let err = donator
            .donate_at(&mut tu, &point, 0, &mut test::rng(), &mut test::ids())
            .unwrap_err();
        assert!(matches!(err, GlFuzzError::IncompatibleDonor(_)));

        let donors = vec![test::parse_frag("struct S { int a; }; void main() { S s = S(1); }")];
        let mut tu = test::parse_frag("struct S { int a; }; void main() { }");
        let point = find_injection_points(&tu).remove(0);
        let mut donator = CodeDonator::new(&donors, DonationKind::DeadCode);
        let err = donator
            .donate_at(&mut tu, &point, 0, &mut test::rng(), &mut test::ids())
            .unwrap_err();
        assert!(matches!(err, GlFuzzError::IncompatibleDonor(_)));
    }
}
