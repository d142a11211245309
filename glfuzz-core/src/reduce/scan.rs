//! Read-only walk collecting the opportunities of one finder.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::injected::*;
use super::opportunity::{breaks_switch_body, declares_directly, loses_value_return, single_return};
use super::{Finder, Opportunity, ReducerContext, ReductionOpportunity, UnwrapKind};
use crate::ast::{query, *};
use crate::config::INJECTION_SWITCH;
use crate::fuzz::macros;
use crate::fuzz::merge_set::decode_merged_name;
use crate::fuzz::outline::OUTLINED_FUNCTION_PREFIX;
use crate::fuzz::structify::STRUCT_REPLACEMENT_PREFIX;
use crate::typing::{Bindings, Scope, Typer};
use crate::visit::{self, Visitor};

/// Identity-style macros whose removal is a mutation reversal.
const MUTATION_MACROS: [&str; 5] = [
    macros::IDENTITY,
    macros::ZERO,
    macros::ONE,
    macros::FALSE,
    macros::TRUE,
];

/// Builtins writing through their last argument.
const OUT_PARAM_BUILTINS: [&str; 2] = ["modf", "frexp"];

struct VectorComponent {
    name: String,
    swizzle: String,
    ty: TypeRef,
    /// Declarator of the variable the component was merged from, when it
    /// is still declared in the block.
    existing: Option<NodeId>,
    valid: bool,
    lookups: Vec<NodeId>,
}

struct MergedVector {
    block: NodeId,
    enabled: bool,
    components: Vec<VectorComponent>,
}

struct Scanner<'a> {
    finder: Finder,
    shader: usize,
    ctx: ReducerContext,
    tu: &'a TranslationUnit,
    typer: Typer,
    bindings: Bindings,
    dead_functions: BTreeSet<String>,
    pinned_loops: BTreeSet<NodeId>,
    scope: Scope,
    function: Option<&'a FunctionDefinition>,
    blocks: Vec<NodeId>,
    switch_bodies: HashSet<NodeId>,
    depth: usize,
    dead_code: usize,
    fuzzed: usize,
    live_code: usize,
    case_label: usize,
    lvalues: HashSet<NodeId>,
    expr_stack: Vec<&'a Expr>,
    merged: Vec<(NodeId, MergedVector)>,
    found: Vec<Opportunity>,
}

/// Opportunities `finder` sees in shader `shader` of a job.
pub(super) fn scan(
    finder: Finder,
    shader: usize,
    tu: &TranslationUnit,
    ctx: ReducerContext,
) -> Vec<Opportunity> {
    let typer = Typer::new(tu);
    if finder == Finder::Function {
        return unreferenced_functions(tu, &typer)
            .into_iter()
            .map(|kind| Opportunity {
                shader,
                depth: 0,
                kind,
            })
            .collect();
    }
    let mut scanner = Scanner {
        finder,
        shader,
        ctx,
        tu,
        typer,
        bindings: Bindings::new(tu),
        dead_functions: dead_functions(tu),
        pinned_loops: pinned_loops(tu),
        scope: Scope::new(),
        function: None,
        blocks: vec![],
        switch_bodies: HashSet::new(),
        depth: 0,
        dead_code: 0,
        fuzzed: 0,
        live_code: 0,
        case_label: 0,
        lvalues: HashSet::new(),
        expr_stack: vec![],
        merged: vec![],
        found: vec![],
    };
    scanner.visit_unit(tu);
    scanner.finish();
    scanner.found
}

impl<'a> Scanner<'a> {
    fn push(&mut self, kind: ReductionOpportunity) {
        self.found.push(Opportunity {
            shader: self.shader,
            depth: self.depth,
            kind,
        });
    }

    fn in_dead_code(&self) -> bool {
        self.dead_code > 0
            || self
                .function
                .map_or(false, |f| self.dead_functions.contains(f.name()))
    }

    fn allowed_to_reduce_expr(&self, e: &Expr) -> bool {
        if let Some(name) = e.as_var() {
            if (is_live_name(name) && !is_limiter_name(name)) || is_dead_name(name) {
                return true;
            }
        }
        self.ctx.reduce_everywhere || self.in_dead_code() || self.fuzzed > 0 || self.live_code > 0
    }

    fn mark_lvalue(&mut self, e: &Expr) {
        self.lvalues.insert(e.id);
        match &e.kind {
            ExprKind::Paren(inner)
            | ExprKind::Member { expr: inner, .. }
            | ExprKind::Index { expr: inner, .. } => self.mark_lvalue(inner),
            _ => {}
        }
    }

    fn mark_lvalues_of(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Binary { op, lhs, .. } if op.is_assignment() => self.mark_lvalue(lhs),
            ExprKind::Unary { op, expr } if op.is_side_effecting() => self.mark_lvalue(expr),
            ExprKind::Call { callee, args } => {
                if OUT_PARAM_BUILTINS.contains(&callee.as_str()) && args.len() == 2 {
                    self.mark_lvalue(&args[1]);
                    return;
                }
                let written: Vec<usize> = self
                    .typer
                    .prototypes(callee)
                    .iter()
                    .filter(|p| p.params.len() == args.len())
                    .flat_map(|p| {
                        p.params.iter().enumerate().filter(|(_, param)| {
                            param.ty.has_qualifier(&TypeQualifier::Out)
                                || param.ty.has_qualifier(&TypeQualifier::InOut)
                        })
                    })
                    .map(|(i, _)| i)
                    .collect();
                for i in written {
                    self.mark_lvalue(&args[i]);
                }
            }
            _ => {}
        }
    }

    fn consider_stmt_removal(&mut self, owner: NodeId, block: &'a Block, index: usize) {
        let f = match self.function {
            Some(f) => f,
            None => return,
        };
        if self.switch_bodies.contains(&owner) && breaks_switch_body(block, index) {
            return;
        }
        let stmt = &block.stmts[index];
        let allowed = match &stmt.kind {
            _ if query::is_empty_stmt(stmt) => true,
            StmtKind::If { else_stmt: None, .. } if is_dead_injection(stmt) => true,
            StmtKind::Decl(d) => d.decls.is_empty(),
            _ => {
                let basic =
                    is_self_copy(stmt) || !query::stmt_has_side_effects(stmt) || self.in_dead_code();
                if loses_value_return(f, block, index) {
                    return;
                }
                basic
                    || self.ctx.reduce_everywhere
                    || (is_live_injection(stmt)
                        && (!references_limiter(stmt)
                            || (stmt.is_loop() && !self.pinned_loops.contains(&stmt.id))))
            }
        };
        if allowed {
            self.push(ReductionOpportunity::RemoveStmt {
                function: f.id,
                stmt: stmt.id,
            });
        }
    }

    fn consider_block_unwrap(&mut self, parent: &Block, stmt: &Stmt) {
        let inner = match &stmt.kind {
            StmtKind::Block(b) if b.new_scope && !b.stmts.is_empty() => b,
            _ => return,
        };
        let visible: BTreeSet<String> = self.scope.names_of_all_variables().into_iter().collect();
        let clashes = inner.stmts.iter().any(|s| match &s.kind {
            StmtKind::Decl(d) => d
                .decls
                .iter()
                .any(|i| visible.contains(&i.name) || declares_directly(parent, &i.name)),
            _ => false,
        });
        if !clashes {
            self.push(ReductionOpportunity::Unwrap {
                stmt: stmt.id,
                kind: UnwrapKind::Block,
            });
        }
    }

    fn consider_wrapped(&mut self, stmt: &Stmt) {
        let kind = match &stmt.kind {
            StmtKind::If { cond, .. } if macros::is_call_to(cond, macros::WRAPPED_IF_TRUE) => {
                UnwrapKind::Then
            }
            StmtKind::If {
                cond,
                else_stmt: Some(_),
                ..
            } if macros::is_call_to(cond, macros::WRAPPED_IF_FALSE) => UnwrapKind::Else,
            StmtKind::For {
                cond: Some(cond),
                body,
                ..
            }
            | StmtKind::While { cond, body }
            | StmtKind::Do { body, cond }
                if macros::is_call_to(cond, macros::WRAPPED_LOOP)
                    && !query::has_escaping_break_or_continue(body) =>
            {
                UnwrapKind::Loop
            }
            _ => return,
        };
        self.push(ReductionOpportunity::Unwrap {
            stmt: stmt.id,
            kind,
        });
    }

    fn consider_local_declarators(&mut self, stmt: &Stmt) {
        let d = match &stmt.kind {
            StmtKind::Decl(d) => d,
            _ => return,
        };
        for info in &d.decls {
            if self.bindings.is_used(info.id) {
                continue;
            }
            let removable = self.ctx.reduce_everywhere
                || self.in_dead_code()
                || is_live_name(&info.name)
                || is_dead_name(&info.name)
                || info
                    .initializer
                    .as_ref()
                    .map_or(true, |init| !query::has_side_effects(init));
            if removable {
                self.push(ReductionOpportunity::RemoveDeclarator {
                    stmt: Some(stmt.id),
                    decl: d.id,
                    info: info.id,
                });
            }
        }
    }

    fn consider_global_declarators(&mut self) {
        let tu = self.tu;
        for v in tu.global_variables() {
            let interface = v.base_type.qualifiers().iter().any(|q| q.is_interface());
            for info in &v.decls {
                if self.bindings.is_used(info.id) {
                    continue;
                }
                let synthetic = info.name.starts_with("GLF_")
                    || info.name.starts_with("_GLF_")
                    || info.name == INJECTION_SWITCH;
                if self.ctx.reduce_everywhere || !interface || synthetic {
                    self.push(ReductionOpportunity::RemoveDeclarator {
                        stmt: None,
                        decl: v.id,
                        info: info.id,
                    });
                }
            }
        }
    }

    /// Field positions and names leading to the one field of `struct_name`
    /// that is not padding.
    fn hidden_field(&self, struct_name: &str) -> Option<(Vec<usize>, Vec<String>, TypeRef)> {
        let def = self.typer.struct_definition(struct_name)?;
        if let Some((i, f)) = def
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| !f.name.starts_with("_f"))
        {
            return Some((vec![i], vec![f.name.clone()], f.ty));
        }
        def.fields.iter().enumerate().find_map(|(i, f)| {
            let (mut path, mut names, ty) = self.hidden_field(&f.ty.struct_name()?)?;
            path.insert(0, i);
            names.insert(0, f.name.clone());
            Some((path, names, ty))
        })
    }

    fn consider_destructify(&mut self, block: &Block, stmt: &Stmt) {
        let (f, d) = match (self.function, &stmt.kind) {
            (Some(f), StmtKind::Decl(d)) => (f, d),
            _ => return,
        };
        let info = match d.decls.as_slice() {
            [info] if info.name.starts_with(STRUCT_REPLACEMENT_PREFIX) && info.array.is_none() => {
                info
            }
            _ => return,
        };
        let (path, chain, ty) = match d
            .base_type
            .struct_name()
            .and_then(|s| self.hidden_field(&s))
        {
            Some(found) => found,
            None => return,
        };
        let name = match chain.last() {
            Some(n) => n.clone(),
            None => return,
        };
        let declared_in_body = f
            .body
            .stmts
            .iter()
            .any(|s| query::declared_in_stmt(s).contains(&name));
        if self.scope.lookup(&name).is_some() || declared_in_body || declares_directly(block, &name) {
            return;
        }
        if let Some(init) = &info.initializer {
            if component_ref(init, &path).is_none() {
                return;
            }
        }
        let lookups: Vec<NodeId> = f
            .body
            .stmts
            .iter()
            .flat_map(query::exprs_in_stmt)
            .filter(|e| self.is_full_chain(e, &chain, info.id))
            .map(|e| e.id)
            .collect();
        if lookups.len() != self.bindings.uses_of(info.id).len() {
            return;
        }
        self.push(ReductionOpportunity::Destructify {
            decl_stmt: stmt.id,
            info: info.id,
            name,
            ty,
            path,
            lookups,
        });
    }

    fn is_full_chain(&self, e: &Expr, chain: &[String], info: NodeId) -> bool {
        let mut cur = e;
        for field in chain.iter().rev() {
            cur = match &cur.kind {
                ExprKind::Member { expr, field: f } if f == field => expr,
                _ => return false,
            };
        }
        self.bindings.refers_to(cur.id, info)
    }

    fn consider_outlined(&mut self, stmt: &Stmt) {
        let rhs = match &stmt.kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary {
                    op: BinOp::Assign,
                    rhs,
                    ..
                },
                ..
            }) => rhs,
            _ => return,
        };
        let (callee, args) = match rhs.as_call() {
            Some(call) if call.0.starts_with(OUTLINED_FUNCTION_PREFIX) => call,
            _ => return,
        };
        let inlinable = self.tu.function(callee).map_or(false, |f| {
            single_return(f).is_some()
                && f.prototype.params.len() == args.len()
                && f.prototype.params.iter().all(|p| p.name.is_some())
        });
        if inlinable {
            self.push(ReductionOpportunity::InlineOutlined { call: rhs.id });
        }
    }

    fn track_merged(&mut self, block: &Block, stmt: &Stmt) {
        let owner = match self.blocks.last() {
            Some(owner) => *owner,
            None => return,
        };
        let d = match &stmt.kind {
            StmtKind::Decl(d) => d,
            _ => return,
        };
        let element = match d.base_type.as_basic() {
            Some(b) if b.is_vector() => b.element_type(),
            _ => return,
        };
        for info in &d.decls {
            let decoded = match decode_merged_name(&info.name) {
                Some(decoded) => decoded,
                None => continue,
            };
            let components = decoded
                .into_iter()
                .filter_map(|c| {
                    let basic = if c.width == 1 {
                        element
                    } else {
                        BasicType::make_vector(element, c.width)?
                    };
                    let ty = TypeRef::basic(basic);
                    let (existing, valid) = existing_declarator(block, &c.name, ty);
                    Some(VectorComponent {
                        swizzle: c.swizzle(),
                        name: c.name,
                        ty,
                        existing,
                        valid,
                        lookups: vec![],
                    })
                })
                .collect();
            self.merged.push((
                info.id,
                MergedVector {
                    block: owner,
                    enabled: true,
                    components,
                },
            ));
        }
    }

    /// Returns true when `e` was a lookup into a merged vector.
    fn track_vector_use(&mut self, e: &Expr) -> bool {
        let (base, field) = match &e.kind {
            ExprKind::Member { expr, field } => (expr.strip_parens(), Some(field)),
            ExprKind::Var(_) => (e, None),
            _ => return false,
        };
        if base.as_var().is_none() {
            return false;
        }
        let target = match self.bindings.entry(base.id).and_then(|b| b.declarator()) {
            Some(t) => t,
            None => return false,
        };
        let visible: HashMap<String, Option<NodeId>> = match self.merged.iter().find(|(i, _)| *i == target) {
            Some((_, v)) => v
                .components
                .iter()
                .map(|c| (c.name.clone(), self.scope.lookup(&c.name).and_then(|s| s.declarator())))
                .collect(),
            None => return false,
        };
        let vector = match self.merged.iter_mut().find(|(i, _)| *i == target) {
            Some((_, v)) => v,
            None => return false,
        };
        let field = match field {
            Some(f) => f,
            None => {
                vector.enabled = false;
                return true;
            }
        };
        match vector.components.iter_mut().find(|c| &c.swizzle == field) {
            Some(c) => {
                if visible.get(&c.name).copied().flatten() == c.existing {
                    c.lookups.push(e.id);
                } else {
                    c.valid = false;
                }
            }
            None => vector.enabled = false,
        }
        true
    }

    fn consider_expr_to_constant(&mut self, e: &Expr) {
        if !self.allowed_to_reduce_expr(e)
            || self.lvalues.contains(&e.id)
            || e.is_literal()
            || self.case_label > 0
            || (is_macro_call(e) && !is_fuzzed_call(e))
        {
            return;
        }
        let ty = match self.typer.type_of(e) {
            Some(t) if !t.is_opaque() && !t.is_void() => t,
            _ => return,
        };
        if ty.is_array() && self.ctx.version.restricted_array_indexing() {
            return;
        }
        let typer = &self.typer;
        let constant = match query::canonical_constant(ty, &|n| typer.struct_definition(n).cloned()) {
            Some(c) => c,
            None => return,
        };
        if render_expr(&constant) != render_expr(e) {
            self.push(ReductionOpportunity::ExprToConstant { expr: e.id, ty });
        }
    }

    fn consider_sub_expr(&mut self, e: &Expr) {
        if !self.allowed_to_reduce_expr(e) || self.lvalues.contains(&e.id) || is_macro_call(e) {
            return;
        }
        let ty = match self.typer.type_of(e) {
            Some(t) => t,
            None => return,
        };
        if let ExprKind::Paren(inner) = &e.kind {
            let bare = inner.is_literal()
                || matches!(
                    inner.kind,
                    ExprKind::Var(_) | ExprKind::Call { .. } | ExprKind::Constructor { .. }
                );
            let comma = matches!(inner.kind, ExprKind::Binary { op: BinOp::Comma, .. });
            let removable = bare
                || match self.expr_stack.last().map(|p| &p.kind) {
                    None | Some(ExprKind::Paren(_)) => true,
                    Some(ExprKind::Call { .. } | ExprKind::Constructor { .. }) => !comma,
                    _ => false,
                };
            if removable {
                self.push(ReductionOpportunity::ReplaceWithChild {
                    expr: e.id,
                    child: inner.id,
                });
            }
            return;
        }
        let children: Vec<NodeId> = e
            .children()
            .into_iter()
            .filter(|c| self.typer.type_of(c).map_or(false, |t| t.same_unqualified(ty)))
            .map(|c| c.id)
            .collect();
        for child in children {
            self.push(ReductionOpportunity::ReplaceWithChild { expr: e.id, child });
        }
    }

    fn finish(&mut self) {
        match self.finder {
            Finder::VariableDecl => self.consider_global_declarators(),
            Finder::Vectorization => {
                let merged = std::mem::take(&mut self.merged);
                for (_, vector) in merged.into_iter().filter(|(_, v)| v.enabled) {
                    for c in vector.components {
                        if c.valid && !c.lookups.is_empty() {
                            self.push(ReductionOpportunity::Vectorization {
                                block: vector.block,
                                name: c.name,
                                ty: c.ty,
                                declare: c.existing.is_none(),
                                lookups: c.lookups,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

impl<'a> Visitor<'a> for Scanner<'a> {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn skip_for_header(&self) -> bool {
        matches!(
            self.finder,
            Finder::ExprToConstant | Finder::CompoundExprToSubExpr
        ) && self.ctx.version.restricted_for_loops()
    }

    fn enter_function(&mut self, f: &'a FunctionDefinition) {
        self.function = Some(f);
    }

    fn leave_function(&mut self, _f: &'a FunctionDefinition) {
        self.function = None;
    }

    fn enter_block(&mut self, owner: NodeId, _block: &'a Block) {
        self.blocks.push(owner);
    }

    fn leave_block(&mut self, _owner: NodeId, _block: &'a Block) {
        self.blocks.pop();
    }

    fn visit_block_child(&mut self, owner: NodeId, block: &'a Block, index: usize) {
        let stmt = &block.stmts[index];
        match self.finder {
            Finder::Stmt => self.consider_stmt_removal(owner, block, index),
            Finder::Unwrap => self.consider_block_unwrap(block, stmt),
            Finder::VariableDecl if self.function.is_some() => self.consider_local_declarators(stmt),
            Finder::Destructify => self.consider_destructify(block, stmt),
            Finder::OutlinedStatement => self.consider_outlined(stmt),
            Finder::Vectorization => self.track_merged(block, stmt),
            _ => {}
        }
        let live = !self.ctx.reduce_everywhere
            && is_live_injection(stmt)
            && !references_limiter(stmt)
            && !declares_limiter(stmt);
        if live {
            self.live_code += 1;
        }
        self.visit_stmt(stmt);
        if live {
            self.live_code -= 1;
        }
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        self.depth += 1;
        if self.finder == Finder::Unwrap {
            self.consider_wrapped(stmt);
        }
        match &stmt.kind {
            StmtKind::If {
                cond,
                then_stmt,
                else_stmt,
            } if is_dead_injection(stmt) => {
                self.visit_expr(cond);
                self.dead_code += 1;
                self.visit_stmt(then_stmt);
                self.dead_code -= 1;
                if let Some(e) = else_stmt {
                    self.visit_stmt(e);
                }
            }
            StmtKind::Case(_) => {
                self.case_label += 1;
                visit::walk_stmt(self, stmt);
                self.case_label -= 1;
            }
            StmtKind::Switch { .. } => {
                self.switch_bodies.insert(stmt.id);
                visit::walk_stmt(self, stmt);
            }
            _ => visit::walk_stmt(self, stmt),
        }
        self.depth -= 1;
    }

    fn visit_expr(&mut self, e: &'a Expr) {
        if self.finder == Finder::Vectorization && self.track_vector_use(e) {
            return;
        }
        let fuzzed = is_fuzzed_call(e);
        if fuzzed {
            self.fuzzed += 1;
        }
        self.mark_lvalues_of(e);
        match self.finder {
            Finder::Mutation => {
                if let Some((callee, _)) = e.as_call() {
                    if MUTATION_MACROS.contains(&callee) {
                        self.push(ReductionOpportunity::Mutation { call: e.id });
                    }
                }
            }
            Finder::ExprToConstant => self.consider_expr_to_constant(e),
            Finder::CompoundExprToSubExpr => self.consider_sub_expr(e),
            _ => {}
        }
        self.expr_stack.push(e);
        visit::walk_expr(self, e);
        self.expr_stack.pop();
        if fuzzed {
            self.fuzzed -= 1;
        }
    }
}

fn is_macro_call(e: &Expr) -> bool {
    e.as_call()
        .map_or(false, |(callee, _)| macros::is_injection_macro(callee))
}

/// `x = x;`
fn is_self_copy(s: &Stmt) -> bool {
    match &s.kind {
        StmtKind::Expr(Expr {
            kind: ExprKind::Binary {
                op: BinOp::Assign,
                lhs,
                rhs,
            },
            ..
        }) => render_expr(lhs.strip_parens()) == render_expr(rhs.strip_parens()),
        _ => false,
    }
}

/// Declarator of `name` directly in `block`, and whether the component
/// can be split back out: at most one non-const declaration of type `ty`.
fn existing_declarator(block: &Block, name: &str, ty: TypeRef) -> (Option<NodeId>, bool) {
    let found: Vec<(&VariablesDeclaration, &VariableDeclInfo)> = block
        .stmts
        .iter()
        .filter_map(|s| match &s.kind {
            StmtKind::Decl(d) => Some(d.decls.iter().map(move |i| (d, i))),
            _ => None,
        })
        .flatten()
        .filter(|(_, i)| i.name == name)
        .collect();
    match found.as_slice() {
        [] => (None, true),
        [(d, i)] => {
            let valid = d.declared_type(i).same_unqualified(ty)
                && !d.base_type.has_qualifier(&TypeQualifier::Const);
            (Some(i.id), valid)
        }
        _ => (None, false),
    }
}

fn component_ref<'e>(e: &'e Expr, path: &[usize]) -> Option<&'e Expr> {
    path.iter().try_fold(e, |cur, &i| match &cur.kind {
        ExprKind::Constructor { args, .. } => args.get(i),
        _ => None,
    })
}

/// Function definitions and prototypes, other than `main`, that no call
/// in the unit could resolve to.
fn unreferenced_functions(tu: &TranslationUnit, typer: &Typer) -> Vec<ReductionOpportunity> {
    let mut calls: Vec<&Expr> = vec![];
    for decl in &tu.decls {
        match decl {
            Decl::Function(f) => {
                for s in &f.body.stmts {
                    calls.extend(query::exprs_in_stmt(s).into_iter().filter(|e| e.as_call().is_some()));
                }
            }
            Decl::Variables(v) => {
                for init in v.decls.iter().filter_map(|i| i.initializer.as_ref()) {
                    calls.extend(query::subexprs(init).into_iter().filter(|e| e.as_call().is_some()));
                }
            }
            _ => {}
        }
    }
    let referenced = |proto: &FunctionPrototype| {
        calls.iter().filter_map(|e| e.as_call()).any(|(callee, args)| {
            callee == proto.name
                && args.len() == proto.params.len()
                && proto.params.iter().zip(args).all(|(p, a)| {
                    typer
                        .type_of(a)
                        .map_or(true, |t| t.same_unqualified(p.full_type()))
                })
        })
    };
    tu.decls
        .iter()
        .filter_map(|d| match d {
            Decl::Function(f) if f.name() != "main" && !referenced(&f.prototype) => {
                Some(ReductionOpportunity::RemoveFunction { id: f.id })
            }
            Decl::Prototype(p) if p.name != "main" && !referenced(p) => {
                Some(ReductionOpportunity::RemoveFunction { id: p.id })
            }
            _ => None,
        })
        .collect()
}
