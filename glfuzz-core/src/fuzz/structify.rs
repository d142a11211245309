//! Hide a local variable inside randomly generated, possibly nested structs.
//!
//! `T x = e;` becomes `_GLF_struct_N _GLF_struct_replacement_M = _GLF_struct_N(...);`
//! where the struct reaches a field named `x` of type `T` through a chain of
//! struct-typed fields. Padding fields are named `_f{i}`; every use of `x`
//! becomes the member chain.

use std::collections::HashMap;

use super::{FuzzRng, IdGenerator};
use crate::ast::{query, *};
use crate::config::GeneratorOptions;
use crate::typing::Bindings;
use crate::visit::{self, Visitor};

pub const STRUCT_PREFIX: &str = "_GLF_struct_";
pub const STRUCT_REPLACEMENT_PREFIX: &str = "_GLF_struct_replacement_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructifyOpportunity {
    pub decl_stmt: NodeId,
    pub info: NodeId,
}

#[derive(Default)]
struct StructifyFinder {
    found: Vec<StructifyOpportunity>,
}

impl<'a> Visitor<'a> for StructifyFinder {
    fn visit_block_child(&mut self, _owner: NodeId, block: &'a Block, index: usize) {
        let stmt = &block.stmts[index];
        if let StmtKind::Decl(d) = &stmt.kind {
            let plain = d.base_type.qualifiers().is_empty() && d.base_type.as_basic().is_some();
            if let [info] = d.decls.as_slice() {
                if plain && info.array.is_none() && !info.name.starts_with("_f") {
                    self.found.push(StructifyOpportunity {
                        decl_stmt: stmt.id,
                        info: info.id,
                    });
                }
            }
        }
        visit::walk_stmt(self, stmt);
    }
}

/// Single, unqualified, basic-typed declarations sitting directly in a block.
pub fn find_structify_opportunities(tu: &TranslationUnit) -> Vec<StructifyOpportunity> {
    let mut finder = StructifyFinder::default();
    finder.visit_unit(tu);
    finder.found
}

/// Random struct shapes, sub-structs listed before the structs using them.
struct StructMaker<'r> {
    rng: &'r mut FuzzRng,
    ids: &'r mut IdGenerator,
    types: Vec<BasicType>,
    max_fields: usize,
    max_depth: usize,
    made: Vec<StructDefinition>,
}

impl StructMaker<'_> {
    fn make(&mut self, depth: usize) -> String {
        let name = format!("{STRUCT_PREFIX}{}", self.ids.fresh_id());
        let count = self.rng.below(self.max_fields.max(1)) + 1;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let ty = if depth < self.max_depth && self.rng.coin() {
                TypeRef::struct_named(&self.make(depth + 1))
            } else {
                let basic = self.rng.choose(&self.types).copied().unwrap_or(BasicType::Float);
                TypeRef::basic(basic)
            };
            fields.push(StructField {
                name: format!("_f{i}"),
                ty,
            });
        }
        self.made.push(StructDefinition {
            name: name.clone(),
            fields,
        });
        name
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut StructDefinition> {
        self.made.iter_mut().find(|s| s.name == name)
    }
}

/// Apply `op`. Returns the name of the replacement variable, or `None` when
/// the declaration is gone or changed shape.
pub fn structify(
    tu: &mut TranslationUnit,
    op: &StructifyOpportunity,
    rng: &mut FuzzRng,
    ids: &mut IdGenerator,
    options: &GeneratorOptions,
) -> Option<String> {
    let (decl_id, name, base_type) = match tu.find_stmt(op.decl_stmt).map(|s| &s.kind) {
        Some(StmtKind::Decl(d)) if d.decls.len() == 1 && d.decls[0].id == op.info => {
            (d.id, d.decls[0].name.clone(), d.base_type)
        }
        _ => {
            crate::log!(debug, "declaration {} changed, not structifying", op.decl_stmt);
            return None;
        }
    };

    let mut maker = StructMaker {
        rng,
        ids,
        types: tu.version().supported_basic_types(),
        max_fields: options.max_struct_fields,
        max_depth: options.max_struct_nesting_depth,
        made: vec![],
    };
    let outer = maker.make(0);

    // Walk down to the struct that receives the variable.
    let mut chain: Vec<String> = vec![];
    let mut current = outer.clone();
    loop {
        let nested: Vec<(String, String)> = maker
            .get_mut(&current)
            .map(|s| {
                s.fields
                    .iter()
                    .filter_map(|f| Some((f.name.clone(), f.ty.struct_name()?)))
                    .collect()
            })
            .unwrap_or_default();
        if nested.is_empty() || !maker.rng.coin() {
            break;
        }
        let (field, next) = match maker.rng.choose(&nested) {
            Some(pick) => pick.clone(),
            None => break,
        };
        chain.push(field);
        current = next;
    }
    let position = {
        let len = maker.get_mut(&current).map_or(0, |s| s.fields.len());
        maker.rng.below(len + 1)
    };
    if let Some(target) = maker.get_mut(&current) {
        target.fields.insert(
            position,
            StructField {
                name: name.clone(),
                ty: base_type,
            },
        );
    }
    chain.push(name.clone());
    let replacement = format!("{STRUCT_REPLACEMENT_PREFIX}{}", maker.ids.fresh_id());
    let structs: HashMap<String, StructDefinition> =
        maker.made.iter().map(|s| (s.name.clone(), s.clone())).collect();

    let uses = Bindings::new(tu).uses_of(op.info);
    for id in uses {
        let lookup = chain
            .iter()
            .fold(Expr::var(&replacement), |e, field| Expr::member(e, field));
        tu.replace_expr(id, lookup);
    }

    let decl = tu.find_variables_mut(decl_id)?;
    let info = decl.decls.first_mut()?;
    let initializer = info
        .initializer
        .take()
        .and_then(|init| build_initializer(&outer, &name, &chain, init, &structs));
    info.name = replacement.clone();
    info.initializer = initializer;
    decl.base_type = TypeRef::struct_named(&outer);

    for def in maker.made.into_iter().rev() {
        tu.insert_after_header(Decl::Struct(def));
    }
    crate::log!(trace, "structified `{name}` as `{replacement}`");
    Some(replacement)
}

/// Constructor of `struct_name` with canonical values in the padding fields
/// and `value` at the end of `chain`.
fn build_initializer(
    struct_name: &str,
    var: &str,
    chain: &[String],
    value: Expr,
    structs: &HashMap<String, StructDefinition>,
) -> Option<Expr> {
    let def = structs.get(struct_name)?;
    let lookup = |n: &str| structs.get(n).cloned();
    let mut value = Some(value);
    let mut args = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        let on_chain = chain.first().map(String::as_str) == Some(field.name.as_str());
        let arg = match field.ty.struct_name() {
            Some(sub) if on_chain => build_initializer(&sub, var, &chain[1..], value.take()?, structs)?,
            _ if on_chain && chain.len() == 1 && field.name == var => value.take()?,
            _ => query::canonical_constant(field.ty, &lookup)?,
        };
        args.push(arg);
    }
    Some(Expr::constructor(TypeRef::struct_named(struct_name), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn test_find_plain_declarations() {
        let tu = test::parse_frag(
            "void main() { float a = 1.0; int b, c; const int d = 1; float e[2]; for (int i = 0; i < 2; i++) { vec2 v; } }",
        );
        let ops = find_structify_opportunities(&tu);
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_structify_rewrites_uses() {
        for seed in 0..8 {
            let mut tu = test::parse_frag("void main() { float a = 2.0; a = a + 1.0; }");
            let op = find_structify_opportunities(&tu).remove(0);
            let mut rng = FuzzRng::new(seed);
            let mut ids = test::ids();
            let options = GeneratorOptions {
                max_struct_fields: 3,
                max_struct_nesting_depth: 2,
                ..GeneratorOptions::default()
            };
            let replacement = structify(&mut tu, &op, &mut rng, &mut ids, &options).unwrap();
            let text = render(&tu);
            assert!(!text.contains(" a ="), "{text}");
            assert!(text.contains(&format!("{replacement}.")), "{text}");
            assert!(text.contains("2.0"), "{text}");
            // Every struct is declared before any struct that uses it.
            let names: Vec<&str> = tu.structs().map(|s| s.name.as_str()).collect();
            for (i, s) in tu.structs().enumerate() {
                for f in &s.fields {
                    if let Some(sub) = f.ty.struct_name() {
                        assert!(names[..i].contains(&sub.as_str()), "{text}");
                    }
                }
            }
            // The output still parses to the same program.
            test::assert_same_program(&tu, &text);
        }
    }

    #[test]
    fn test_single_struct_shape() {
        let mut tu = test::parse_frag("void main() { int x = 3; x++; }");
        let op = find_structify_opportunities(&tu).remove(0);
        let options = GeneratorOptions {
            max_struct_fields: 1,
            max_struct_nesting_depth: 0,
            ..GeneratorOptions::default()
        };
        let mut rng = test::rng();
        let mut ids = test::ids();
        structify(&mut tu, &op, &mut rng, &mut ids, &options).unwrap();
        let def = tu.structs().next().unwrap().clone();
        assert_eq!(def.fields.len(), 2);
        let field = def.field("x").unwrap();
        assert_eq!(field.ty, TypeRef::basic(BasicType::Int));
        let padding = def.fields.iter().find(|f| f.name == "_f0").unwrap();
        let padding_value = query::canonical_constant(padding.ty, &|_| None).unwrap();
        let args: Vec<String> = def
            .fields
            .iter()
            .map(|f| if f.name == "x" { "3".to_string() } else { render_expr(&padding_value) })
            .collect();
        test::assert_same_program(
            &tu,
            &format!(
                "struct _GLF_struct_0 {{ {} }};
                 void main() {{ _GLF_struct_0 _GLF_struct_replacement_1 = _GLF_struct_0({}); _GLF_struct_replacement_1.x++; }}",
                def.fields
                    .iter()
                    .map(|f| format!("{} {};", f.ty, f.name))
                    .collect::<String>(),
                args.join(", ")
            ),
        );
    }
}
