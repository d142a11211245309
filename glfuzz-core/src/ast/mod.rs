//! Tree model of a shader program
//!
//! Every statement, expression, declaration and function carries a `NodeId`.
//! Cloning a tree keeps the ids, so an opportunity found by scanning one tree
//! can be applied to a clone of it. Subtrees that are copied back into the
//! same tree must be `duplicate`d to get fresh ids.

mod edit;
mod ops;
mod parent;
mod parse;
mod print;
pub mod query;
mod types;
mod version;

pub use ops::*;
pub use parent::*;
pub use parse::*;
pub use print::*;
pub use types::*;
pub use version::*;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::visit::{self, VisitorMut};

/// Identity of a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(1);

impl NodeId {
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A whole shader: top-level declarations plus version and stage.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub version: Option<ShadingLanguageVersion>,
    pub kind: ShaderKind,
    pub decls: Vec<Decl>,
}

impl TranslationUnit {
    pub fn new(kind: ShaderKind, version: Option<ShadingLanguageVersion>) -> Self {
        Self {
            version,
            kind,
            decls: vec![],
        }
    }

    /// Version of the shader, ESSL 1.00 when no `#version` is given.
    pub fn version(&self) -> ShadingLanguageVersion {
        self.version.unwrap_or_default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FunctionDefinition> {
        self.decls.iter_mut().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions().find(|f| f.prototype.name == name)
    }

    pub fn main_function(&self) -> Option<&FunctionDefinition> {
        self.function("main")
    }

    pub fn main_function_mut(&mut self) -> Option<&mut FunctionDefinition> {
        self.functions_mut().find(|f| f.prototype.name == "main")
    }

    pub fn global_variables(&self) -> impl Iterator<Item = &VariablesDeclaration> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Variables(v) => Some(v),
            _ => None,
        })
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDefinition> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn struct_definition(&self, name: &str) -> Option<&StructDefinition> {
        self.structs().find(|s| s.name == name)
    }

    /// Index of the top-level declaration holding the function `id`.
    pub fn function_index(&self, id: NodeId) -> Option<usize> {
        self.decls
            .iter()
            .position(|d| matches!(d, Decl::Function(f) if f.id == id))
    }

    /// Insert a declaration right after the last preprocessor line or
    /// precision statement at the top of the shader.
    pub fn insert_after_header(&mut self, decl: Decl) {
        let index = self
            .decls
            .iter()
            .position(|d| !matches!(d, Decl::Directive(_) | Decl::Precision { .. }))
            .unwrap_or(self.decls.len());
        self.decls.insert(index, decl);
    }
}

#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDefinition),
    Prototype(FunctionPrototype),
    Variables(VariablesDeclaration),
    Struct(StructDefinition),
    /// `precision highp float;`
    Precision { precision: TypeQualifier, ty: TypeRef },
    /// A preprocessor line other than `#version`, kept verbatim.
    Directive(String),
}

#[derive(Debug, Clone)]
pub struct FunctionPrototype {
    pub id: NodeId,
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<ParameterDecl>,
}

impl FunctionPrototype {
    pub fn new(name: &str, return_type: TypeRef, params: Vec<ParameterDecl>) -> Self {
        Self {
            id: NodeId::fresh(),
            name: name.to_string(),
            return_type,
            params,
        }
    }

    /// Whether two prototypes declare the same function.
    pub fn matches(&self, other: &FunctionPrototype) -> bool {
        self.name == other.name
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(a, b)| a.full_type().same_unqualified(b.full_type()))
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDecl {
    pub name: Option<String>,
    pub ty: TypeRef,
    pub array: Option<ArrayInfo>,
}

impl ParameterDecl {
    pub fn new(name: &str, ty: TypeRef) -> Self {
        Self {
            name: Some(name.to_string()),
            ty,
            array: None,
        }
    }

    /// Type of the parameter including any array dimension.
    pub fn full_type(&self) -> TypeRef {
        match &self.array {
            Some(a) => TypeRef::array(self.ty, a.size()),
            None => self.ty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub id: NodeId,
    pub prototype: FunctionPrototype,
    pub body: Block,
}

impl FunctionDefinition {
    pub fn new(prototype: FunctionPrototype, body: Block) -> Self {
        Self {
            id: NodeId::fresh(),
            prototype,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.prototype.name
    }
}

#[derive(Debug, Clone)]
pub struct StructDefinition {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructDefinition {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayInfo {
    Unsized,
    Sized(u32),
}

impl ArrayInfo {
    pub fn size(&self) -> Option<u32> {
        match self {
            Self::Unsized => None,
            Self::Sized(n) => Some(*n),
        }
    }
}

/// A declaration statement such as `const int a = 1, b[2];`.
#[derive(Debug, Clone)]
pub struct VariablesDeclaration {
    pub id: NodeId,
    pub base_type: TypeRef,
    pub decls: Vec<VariableDeclInfo>,
}

impl VariablesDeclaration {
    pub fn new(base_type: TypeRef, decls: Vec<VariableDeclInfo>) -> Self {
        Self {
            id: NodeId::fresh(),
            base_type,
            decls,
        }
    }

    pub fn single(base_type: TypeRef, name: &str, initializer: Option<Expr>) -> Self {
        Self::new(base_type, vec![VariableDeclInfo::new(name, initializer)])
    }

    /// Declared type of one declarator, with its array dimension applied.
    pub fn declared_type(&self, info: &VariableDeclInfo) -> TypeRef {
        match &info.array {
            Some(a) => TypeRef::array(self.base_type, a.size()),
            None => self.base_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableDeclInfo {
    pub id: NodeId,
    pub name: String,
    pub array: Option<ArrayInfo>,
    pub initializer: Option<Expr>,
}

impl VariableDeclInfo {
    pub fn new(name: &str, initializer: Option<Expr>) -> Self {
        Self {
            id: NodeId::fresh(),
            name: name.to_string(),
            array: None,
            initializer,
        }
    }
}

/// A sequence of statements. `new_scope` is false for bodies whose scope is
/// opened by the enclosing construct: function bodies and `for`/`while` bodies.
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub new_scope: bool,
}

impl Block {
    pub fn scoped(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            new_scope: true,
        }
    }

    pub fn unscoped(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            new_scope: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    Decl(VariablesDeclaration),
    Expr(Expr),
    If {
        cond: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
    },
    For {
        init: Box<Stmt>,
        cond: Option<Expr>,
        inc: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Do {
        body: Box<Stmt>,
        cond: Expr,
    },
    Switch {
        expr: Expr,
        body: Block,
    },
    /// `case e:` or, with no expression, `default:`.
    Case(Option<Expr>),
    Break,
    Continue,
    Discard,
    Return(Option<Expr>),
    Null,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
        }
    }

    pub fn expr(e: Expr) -> Self {
        Self::new(StmtKind::Expr(e))
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Self::new(StmtKind::Block(Block::scoped(stmts)))
    }

    pub fn decl(d: VariablesDeclaration) -> Self {
        Self::new(StmtKind::Decl(d))
    }

    pub fn if_then(cond: Expr, then_stmt: Stmt, else_stmt: Option<Stmt>) -> Self {
        Self::new(StmtKind::If {
            cond,
            then_stmt: Box::new(then_stmt),
            else_stmt: else_stmt.map(Box::new),
        })
    }

    pub fn is_loop(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::For { .. } | StmtKind::While { .. } | StmtKind::Do { .. }
        )
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            StmtKind::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Expressions that are direct children of this statement.
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Expr(e) => vec![e],
            StmtKind::If { cond, .. } => vec![cond],
            StmtKind::For { cond, inc, .. } => cond.iter().chain(inc.iter()).collect(),
            StmtKind::While { cond, .. } | StmtKind::Do { cond, .. } => vec![cond],
            StmtKind::Switch { expr, .. } => vec![expr],
            StmtKind::Case(Some(e)) | StmtKind::Return(Some(e)) => vec![e],
            StmtKind::Decl(d) => d.decls.iter().filter_map(|i| i.initializer.as_ref()).collect(),
            _ => vec![],
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            StmtKind::Expr(e) => vec![e],
            StmtKind::If { cond, .. } => vec![cond],
            StmtKind::For { cond, inc, .. } => cond.iter_mut().chain(inc.iter_mut()).collect(),
            StmtKind::While { cond, .. } | StmtKind::Do { cond, .. } => vec![cond],
            StmtKind::Switch { expr, .. } => vec![expr],
            StmtKind::Case(Some(e)) | StmtKind::Return(Some(e)) => vec![e],
            StmtKind::Decl(d) => d
                .decls
                .iter_mut()
                .filter_map(|i| i.initializer.as_mut())
                .collect(),
            _ => vec![],
        }
    }

    /// Statements that are direct children of this statement, including the
    /// contents of a block or switch body.
    pub fn child_stmts(&self) -> Vec<&Stmt> {
        match &self.kind {
            StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => b.stmts.iter().collect(),
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => std::iter::once(then_stmt.as_ref())
                .chain(else_stmt.as_deref())
                .collect(),
            StmtKind::For { init, body, .. } => vec![init.as_ref(), body.as_ref()],
            StmtKind::While { body, .. } | StmtKind::Do { body, .. } => vec![body.as_ref()],
            _ => vec![],
        }
    }

    pub fn child_stmts_mut(&mut self) -> Vec<&mut Stmt> {
        match &mut self.kind {
            StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => b.stmts.iter_mut().collect(),
            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => std::iter::once(then_stmt.as_mut())
                .chain(else_stmt.as_deref_mut())
                .collect(),
            StmtKind::For { init, body, .. } => vec![init.as_mut(), body.as_mut()],
            StmtKind::While { body, .. } | StmtKind::Do { body, .. } => vec![body.as_mut()],
            _ => vec![],
        }
    }

    /// Block owned by this statement, if it is a block or a switch.
    pub fn owned_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            StmtKind::Block(b) | StmtKind::Switch { body: b, .. } => Some(b),
            _ => None,
        }
    }

    /// Deep copy with fresh ids, for re-inserting into the same tree.
    pub fn duplicate(&self) -> Self {
        let mut s = self.clone();
        IdRefresher.visit_stmt_mut(&mut s);
        s
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Var(String),
    /// Integer literal, kept as written.
    Int(String),
    UInt(String),
    Float(String),
    Bool(bool),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Paren(Box<Expr>),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    /// Type constructor such as `vec2(1.0, x)` or `S(1, 2)`.
    Constructor {
        ty: TypeRef,
        args: Vec<Expr>,
    },
    Member {
        expr: Box<Expr>,
        field: String,
    },
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            id: NodeId::fresh(),
            kind,
        }
    }

    pub fn var(name: &str) -> Self {
        Self::new(ExprKind::Var(name.to_string()))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value.to_string()))
    }

    pub fn float(text: &str) -> Self {
        Self::new(ExprKind::Float(text.to_string()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExprKind::Bool(value))
    }

    pub fn paren(e: Expr) -> Self {
        Self::new(ExprKind::Paren(Box::new(e)))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(op: UnOp, e: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            expr: Box::new(e),
        })
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Assign, lhs, rhs)
    }

    pub fn call(callee: &str, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            callee: callee.to_string(),
            args,
        })
    }

    pub fn constructor(ty: TypeRef, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Constructor { ty, args })
    }

    pub fn member(e: Expr, field: &str) -> Self {
        Self::new(ExprKind::Member {
            expr: Box::new(e),
            field: field.to_string(),
        })
    }

    pub fn index(e: Expr, index: Expr) -> Self {
        Self::new(ExprKind::Index {
            expr: Box::new(e),
            index: Box::new(index),
        })
    }

    /// Binary expression with operands parenthesized where printing would
    /// otherwise regroup them.
    pub fn combine(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        let prec = op.precedence();
        let lhs = if lhs.binding_power() < prec || (op.is_assignment() && !lhs.is_primary()) {
            Self::paren(lhs)
        } else {
            lhs
        };
        let rhs_bp = rhs.binding_power();
        let rhs = if rhs_bp < prec || (rhs_bp == prec && !op.is_assignment()) {
            Self::paren(rhs)
        } else {
            rhs
        };
        Self::binary(op, lhs, rhs)
    }

    pub fn ternary(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        let wrap = |e: Expr, min: u8| {
            if e.binding_power() < min {
                Self::paren(e)
            } else {
                e
            }
        };
        Self::new(ExprKind::Ternary {
            cond: Box::new(wrap(cond, BinOp::LOr.precedence())),
            then_expr: Box::new(wrap(then_expr, BinOp::Assign.precedence())),
            else_expr: Box::new(wrap(else_expr, BinOp::Assign.precedence())),
        })
    }

    /// How tightly the expression binds when printed; higher binds tighter.
    pub fn binding_power(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Ternary { .. } => 3,
            ExprKind::Unary { op, .. } if !op.is_postfix() => 15,
            ExprKind::Unary { .. } => 16,
            _ => 17,
        }
    }

    /// Wrap in parentheses unless the expression already binds as tightly as
    /// a primary expression.
    pub fn parenthesized(self) -> Self {
        if self.is_primary() {
            self
        } else {
            Self::paren(self)
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Var(_)
                | ExprKind::Int(_)
                | ExprKind::UInt(_)
                | ExprKind::Float(_)
                | ExprKind::Bool(_)
                | ExprKind::Paren(_)
                | ExprKind::Call { .. }
                | ExprKind::Constructor { .. }
                | ExprKind::Member { .. }
                | ExprKind::Index { .. }
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Int(_) | ExprKind::UInt(_) | ExprKind::Float(_) | ExprKind::Bool(_)
        )
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Call target and arguments, if this is a call to a named function.
    pub fn as_call(&self) -> Option<(&str, &[Expr])> {
        match &self.kind {
            ExprKind::Call { callee, args } => Some((callee, args)),
            _ => None,
        }
    }

    /// Skip any number of enclosing parentheses.
    pub fn strip_parens(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.strip_parens(),
            _ => self,
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) | ExprKind::Member { expr, .. } => {
                vec![expr.as_ref()]
            }
            ExprKind::Call { args, .. } | ExprKind::Constructor { args, .. } => args.iter().collect(),
            ExprKind::Index { expr, index } => vec![expr.as_ref(), index.as_ref()],
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => vec![cond.as_ref(), then_expr.as_ref(), else_expr.as_ref()],
            _ => vec![],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_mut(), rhs.as_mut()],
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) | ExprKind::Member { expr, .. } => {
                vec![expr.as_mut()]
            }
            ExprKind::Call { args, .. } | ExprKind::Constructor { args, .. } => {
                args.iter_mut().collect()
            }
            ExprKind::Index { expr, index } => vec![expr.as_mut(), index.as_mut()],
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => vec![cond.as_mut(), then_expr.as_mut(), else_expr.as_mut()],
            _ => vec![],
        }
    }

    pub fn duplicate(&self) -> Self {
        let mut e = self.clone();
        IdRefresher.visit_expr_mut(&mut e);
        e
    }
}

impl FunctionDefinition {
    pub fn duplicate(&self) -> Self {
        let mut f = self.clone();
        IdRefresher.visit_function_mut(&mut f);
        f
    }
}

impl VariablesDeclaration {
    pub fn duplicate(&self) -> Self {
        let mut d = self.clone();
        IdRefresher.visit_variables_declaration_mut(&mut d);
        d
    }
}

impl TranslationUnit {
    /// Deep copy with every node re-identified.
    pub fn duplicate(&self) -> Self {
        let mut tu = self.clone();
        IdRefresher.visit_unit_mut(&mut tu);
        tu
    }
}

/// Gives every node it visits a fresh id.
struct IdRefresher;

impl VisitorMut for IdRefresher {
    fn visit_function_mut(&mut self, f: &mut FunctionDefinition) {
        f.id = NodeId::fresh();
        f.prototype.id = NodeId::fresh();
        visit::walk_function_mut(self, f);
    }

    fn visit_prototype_mut(&mut self, p: &mut FunctionPrototype) {
        p.id = NodeId::fresh();
    }

    fn visit_stmt_mut(&mut self, s: &mut Stmt) {
        s.id = NodeId::fresh();
        visit::walk_stmt_mut(self, s);
    }

    fn visit_variables_declaration_mut(&mut self, d: &mut VariablesDeclaration) {
        d.id = NodeId::fresh();
        for info in d.decls.iter_mut() {
            info.id = NodeId::fresh();
        }
        visit::walk_variables_declaration_mut(self, d);
    }

    fn visit_expr_mut(&mut self, e: &mut Expr) {
        e.id = NodeId::fresh();
        visit::walk_expr_mut(self, e);
    }
}
