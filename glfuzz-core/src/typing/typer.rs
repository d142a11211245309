use std::collections::HashMap;

use super::{builtins, Scope};
use crate::ast::*;
use crate::fuzz::macros;
use crate::visit::{self, Visitor};

/// Resolved type of each expression in one tree snapshot.
///
/// An expression with no entry has an unknown type; callers must treat that
/// conservatively.
pub struct Typer {
    types: HashMap<NodeId, TypeRef>,
    prototypes: HashMap<String, Vec<FunctionPrototype>>,
    structs: HashMap<String, StructDefinition>,
}

impl Typer {
    pub fn new(tu: &TranslationUnit) -> Self {
        let mut prototypes: HashMap<String, Vec<FunctionPrototype>> = HashMap::new();
        let mut structs = HashMap::new();
        for decl in &tu.decls {
            let proto = match decl {
                Decl::Function(f) => &f.prototype,
                Decl::Prototype(p) => p,
                Decl::Struct(s) => {
                    structs.insert(s.name.clone(), s.clone());
                    continue;
                }
                _ => continue,
            };
            let list = prototypes.entry(proto.name.clone()).or_default();
            if !list.iter().any(|p| p.matches(proto)) {
                list.push(proto.clone());
            }
        }
        let mut visitor = TypingVisitor {
            scope: Scope::new(),
            types: HashMap::new(),
            prototypes: &prototypes,
            kind: tu.kind,
        };
        visitor.visit_unit(tu);
        let types = visitor.types;
        Self {
            types,
            prototypes,
            structs,
        }
    }

    pub fn type_of(&self, expr: &Expr) -> Option<TypeRef> {
        self.types.get(&expr.id).copied()
    }

    pub fn type_of_id(&self, id: NodeId) -> Option<TypeRef> {
        self.types.get(&id).copied()
    }

    /// Basic type of an expression, if known.
    pub fn basic_type_of(&self, expr: &Expr) -> Option<BasicType> {
        self.type_of(expr).and_then(|t| t.as_basic())
    }

    /// All user-declared prototypes of the function `name`.
    pub fn prototypes(&self, name: &str) -> &[FunctionPrototype] {
        self.prototypes
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_user_function(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    pub fn struct_definition(&self, name: &str) -> Option<&StructDefinition> {
        self.structs.get(name)
    }

    /// User prototypes a call could resolve to: right arity, and every argument
    /// whose type is known matches the parameter exactly.
    pub fn matching_prototypes(&self, name: &str, args: &[Expr]) -> Vec<&FunctionPrototype> {
        self.prototypes(name)
            .iter()
            .filter(|p| p.params.len() == args.len())
            .filter(|p| {
                p.params.iter().zip(args).all(|(param, arg)| match self.type_of(arg) {
                    Some(t) => t.same_unqualified(param.full_type()),
                    None => true,
                })
            })
            .collect()
    }

    /// Whether every argument of the call has a known type.
    pub fn all_types_known(&self, args: &[Expr]) -> bool {
        args.iter().all(|a| self.type_of(a).is_some())
    }
}

struct TypingVisitor<'p> {
    scope: Scope,
    types: HashMap<NodeId, TypeRef>,
    prototypes: &'p HashMap<String, Vec<FunctionPrototype>>,
    kind: ShaderKind,
}

impl<'p> TypingVisitor<'p> {
    fn get(&self, e: &Expr) -> Option<TypeRef> {
        self.types.get(&e.id).copied()
    }

    fn resolve(&self, expr: &Expr) -> Option<TypeRef> {
        match &expr.kind {
            ExprKind::Var(name) => self
                .scope
                .lookup_type(name)
                .or_else(|| builtins::builtin_variable_type(name, self.kind))
                .map(|t| t.without_qualifiers()),
            ExprKind::Int(_) => Some(TypeRef::basic(BasicType::Int)),
            ExprKind::UInt(_) => Some(TypeRef::basic(BasicType::UInt)),
            ExprKind::Float(_) => Some(TypeRef::basic(BasicType::Float)),
            ExprKind::Bool(_) => Some(TypeRef::basic(BasicType::Bool)),
            ExprKind::Paren(inner) => self.get(inner),
            ExprKind::Binary { op, lhs, rhs } => binary_type(*op, self.get(lhs), self.get(rhs)),
            ExprKind::Unary { op, expr } => match op {
                UnOp::LNot => Some(TypeRef::basic(BasicType::Bool)),
                _ => self.get(expr),
            },
            ExprKind::Ternary {
                then_expr,
                else_expr,
                ..
            } => self.get(then_expr).or_else(|| self.get(else_expr)),
            ExprKind::Constructor { ty, .. } => Some(ty.without_qualifiers()),
            ExprKind::Index { expr, .. } => {
                let base = self.get(expr)?;
                if let Some(elem) = base.array_element() {
                    return Some(elem);
                }
                base.as_basic().map(|b| TypeRef::basic(b.column_type()))
            }
            ExprKind::Member { expr, field } => {
                let base = self.get(expr)?;
                if let Some(name) = base.struct_name() {
                    let def = self.scope.struct_definition(&name)?;
                    return def.field(field).map(|f| f.ty.without_qualifiers());
                }
                let b = base.as_basic()?;
                swizzle_type(b, field).map(TypeRef::basic)
            }
            ExprKind::Call { callee, args } => {
                let arg_types: Vec<Option<TypeRef>> = args.iter().map(|a| self.get(a)).collect();
                if let Some(payload) = macros::payload_index(callee) {
                    return arg_types.get(payload).copied().flatten();
                }
                match self.prototypes.get(callee) {
                    Some(candidates) => {
                        let mut ret = None;
                        for p in candidates.iter().filter(|p| p.params.len() == args.len()) {
                            let fits = p.params.iter().zip(&arg_types).all(|(param, t)| match t {
                                Some(t) => t.same_unqualified(param.full_type()),
                                None => true,
                            });
                            if !fits {
                                continue;
                            }
                            match ret {
                                None => ret = Some(p.return_type.without_qualifiers()),
                                Some(r) if r == p.return_type.without_qualifiers() => {}
                                Some(_) => return None,
                            }
                        }
                        ret
                    }
                    None => builtins::builtin_return_type(callee, &arg_types),
                }
            }
        }
    }
}

impl<'a, 'p> Visitor<'a> for TypingVisitor<'p> {
    fn scope(&mut self) -> Option<&mut Scope> {
        Some(&mut self.scope)
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        visit::walk_expr(self, expr);
        if let Some(t) = self.resolve(expr) {
            self.types.insert(expr.id, t);
        }
    }
}

fn binary_type(op: BinOp, lhs: Option<TypeRef>, rhs: Option<TypeRef>) -> Option<TypeRef> {
    if op.is_relational() || op.is_logical() {
        return Some(TypeRef::basic(BasicType::Bool));
    }
    match op {
        BinOp::Comma => return rhs,
        op if op.is_assignment() => return lhs,
        BinOp::Shl | BinOp::Shr => return lhs,
        _ => {}
    }
    let (l, r) = (lhs?, rhs?);
    if l == r && !(op == BinOp::Mul && l.as_basic().map(|b| b.is_matrix()).unwrap_or(false)) {
        return Some(l);
    }
    let (lb, rb) = (l.as_basic()?, r.as_basic()?);
    if op == BinOp::Mul {
        match (lb.matrix_dims(), rb.matrix_dims()) {
            (Some((_, r1)), Some((c2, _))) => {
                return BasicType::make_matrix(c2, r1).map(TypeRef::basic)
            }
            (Some((_, r1)), None) if rb.is_vector() => {
                return BasicType::make_vector(BasicType::Float, r1).map(TypeRef::basic)
            }
            (None, Some((c2, _))) if lb.is_vector() => {
                return BasicType::make_vector(BasicType::Float, c2).map(TypeRef::basic)
            }
            _ => {}
        }
    }
    if lb.is_scalar() {
        return Some(r);
    }
    if rb.is_scalar() {
        return Some(l);
    }
    None
}

/// Result of a swizzle such as `.xy` on a vector.
pub fn swizzle_type(base: BasicType, field: &str) -> Option<BasicType> {
    if base.is_matrix() || field.is_empty() || field.len() > 4 {
        return None;
    }
    let width = base.num_elements();
    let valid = ["xyzw", "rgba", "stpq"].iter().any(|set| {
        field
            .chars()
            .all(|c| set.find(c).map(|i| i < width).unwrap_or(false))
    });
    if !valid {
        return None;
    }
    BasicType::make_vector(base.element_type(), field.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn type_of_initializer(src: &str, var: &str) -> Option<TypeRef> {
        let tu = test::parse_frag(src);
        let typer = Typer::new(&tu);
        let mut found = None;
        for f in tu.functions() {
            for s in &f.body.stmts {
                if let StmtKind::Decl(d) = &s.kind {
                    for info in &d.decls {
                        if info.name == var {
                            found = info.initializer.as_ref().and_then(|e| typer.type_of(e));
                        }
                    }
                }
            }
        }
        found
    }

    #[test]
    fn test_expression_types() {
        let src = "struct S { vec3 v; int k; };
            uniform vec2 u;
            float f(float x) { return x; }
            void main() {
              S s;
              int a = 1 + 2;
              vec2 b = u * 2.0;
              float c = s.v.y;
              vec3 d = s.v.zyx;
              mat3 m;
              vec3 e = m * s.v;
              bool g = a < 3;
              float h = f(1.0);
              float k = dot(b, b);
              vec3 l = m[1];
            }";
        let basic = |b| Some(TypeRef::basic(b));
        assert_eq!(type_of_initializer(src, "a"), basic(BasicType::Int));
        assert_eq!(type_of_initializer(src, "b"), basic(BasicType::Vec2));
        assert_eq!(type_of_initializer(src, "c"), basic(BasicType::Float));
        assert_eq!(type_of_initializer(src, "d"), basic(BasicType::Vec3));
        assert_eq!(type_of_initializer(src, "e"), basic(BasicType::Vec3));
        assert_eq!(type_of_initializer(src, "g"), basic(BasicType::Bool));
        assert_eq!(type_of_initializer(src, "h"), basic(BasicType::Float));
        assert_eq!(type_of_initializer(src, "k"), basic(BasicType::Float));
        assert_eq!(type_of_initializer(src, "l"), basic(BasicType::Vec3));
    }

    #[test]
    fn test_ambiguous_overload_is_unknown() {
        let src = "int f(int x) { return x; }
            float f(float x) { return x; }
            void main() { float y; int z = f(y + undefined_name); }";
        assert_eq!(type_of_initializer(src, "z"), None);
    }

    #[test]
    fn test_swizzle_validation() {
        assert_eq!(swizzle_type(BasicType::Vec2, "xz"), None);
        assert_eq!(swizzle_type(BasicType::Vec4, "rgb"), Some(BasicType::Vec3));
        assert_eq!(swizzle_type(BasicType::Vec4, "xg"), None);
    }
}
