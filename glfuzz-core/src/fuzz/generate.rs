//! Turn a reference shader job into a variant by applying random
//! semantics-preserving transformations.

use std::collections::BTreeSet;

use super::const_clean::clean_consts;
use super::donate::{CodeDonator, DonationKind};
use super::inline::{inline_call, Inliner};
use super::outline::{find_outline_opportunities, outline_statement};
use super::structify::{find_structify_opportunities, structify};
use super::vectorize::{find_vectorize_opportunities, vectorize};
use super::{FuzzRng, IdGenerator};
use crate::ast::{query, *};
use crate::config::{GeneratorOptions, TransformationKind, INJECTION_SWITCH, INLINE_NODE_LIMIT};
use crate::depot::ShaderJob;
use crate::GlFuzzError;

/// Prefixes of the synthetic names a variant may already carry.
const SYNTHETIC_PREFIXES: &[&str] = &[
    "GLF_dead",
    "GLF_live",
    "_GLF_outlined_",
    "_GLF_struct_",
    "_GLF_struct_replacement_",
];

pub struct Generator<'o> {
    rng: FuzzRng,
    ids: IdGenerator,
    options: &'o GeneratorOptions,
}

impl<'o> Generator<'o> {
    /// Apply `options.rounds` random transformations to every shader of a
    /// copy of `job`, drawing donated code from the shaders of `donors`.
    pub fn generate(
        job: &ShaderJob,
        donors: &[ShaderJob],
        options: &'o GeneratorOptions,
    ) -> Result<ShaderJob, GlFuzzError> {
        crate::log!(info, "generate variant with seed {}", options.seed);
        let mut generator = Generator {
            rng: FuzzRng::new(options.seed),
            ids: IdGenerator::after_existing(
                SYNTHETIC_PREFIXES,
                job.shaders.iter().flat_map(names_in).collect::<Vec<_>>().iter().map(String::as_str),
            ),
            options,
        };
        let mut variant = job.clone();
        for tu in variant.shaders.iter_mut() {
            if tu.main_function().is_none() {
                return Err(GlFuzzError::NoMainFunction);
            }
            let donors: Vec<TranslationUnit> = donors
                .iter()
                .filter_map(|d| d.shader(tu.kind).cloned())
                .collect();
            generator.transform_shader(tu, &donors)?;
        }
        let switched = variant.shaders.iter().any(|tu| {
            tu.global_variables()
                .any(|v| v.decls.iter().any(|i| i.name == INJECTION_SWITCH))
        });
        if switched {
            variant.add_uniform(
                INJECTION_SWITCH,
                serde_json::json!({ "func": "glUniform2f", "args": [0.0, 1.0] }),
            );
        }
        Ok(variant)
    }

    fn transform_shader(
        &mut self,
        tu: &mut TranslationUnit,
        donors: &[TranslationUnit],
    ) -> Result<(), GlFuzzError> {
        if self.options.enabled.is_empty() {
            return Ok(());
        }
        let mut dead = CodeDonator::new(donors, DonationKind::DeadCode);
        let mut live = CodeDonator::new(donors, DonationKind::LiveCode);
        for round in 0..self.options.rounds {
            let kind = match self.rng.choose(&self.options.enabled) {
                Some(k) => *k,
                None => break,
            };
            crate::log!(debug, "round {round} on {} shader: {kind:?}", tu.kind);
            let result = match kind {
                TransformationKind::DonateDeadCode => self.donate(tu, &mut dead),
                TransformationKind::DonateLiveCode => self.donate(tu, &mut live),
                TransformationKind::Inline => self.inline(tu),
                TransformationKind::Outline => Ok(self.outline(tu)),
                TransformationKind::Vectorize => Ok(self.vectorize(tu)),
                TransformationKind::Structify => Ok(self.structify(tu)),
            };
            match result {
                Ok(true) => crate::log!(trace, "applied {kind:?}"),
                Ok(false) => crate::log!(trace, "nothing to do for {kind:?}"),
                Err(err) if err.is_recoverable() => {
                    crate::log!(debug, "{kind:?} declined: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn donate(
        &mut self,
        tu: &mut TranslationUnit,
        donator: &mut CodeDonator,
    ) -> Result<bool, GlFuzzError> {
        let donated = donator.donate(tu, &mut self.rng, &mut self.ids)?;
        if donated {
            let cleaned = clean_consts(tu);
            if cleaned > 0 {
                crate::log!(trace, "cleaned {cleaned} declarations after donation");
            }
        }
        Ok(donated)
    }

    fn inline(&mut self, tu: &mut TranslationUnit) -> Result<bool, GlFuzzError> {
        let ops = Inliner::new(tu).opportunities(INLINE_NODE_LIMIT);
        let call = match self.rng.choose(&ops) {
            Some(op) => op.call,
            None => return Ok(false),
        };
        inline_call(tu, call, &mut self.ids)?;
        Ok(true)
    }

    fn outline(&mut self, tu: &mut TranslationUnit) -> bool {
        let ops = find_outline_opportunities(tu);
        match self.rng.choose(&ops) {
            Some(op) => outline_statement(tu, op, &mut self.ids).is_some(),
            None => false,
        }
    }

    fn vectorize(&mut self, tu: &mut TranslationUnit) -> bool {
        let ops = find_vectorize_opportunities(tu, &mut self.rng);
        match self.rng.choose(&ops) {
            Some(op) => vectorize(tu, op),
            None => false,
        }
    }

    fn structify(&mut self, tu: &mut TranslationUnit) -> bool {
        let ops = find_structify_opportunities(tu);
        match self.rng.choose(&ops) {
            Some(op) => structify(tu, op, &mut self.rng, &mut self.ids, self.options).is_some(),
            None => false,
        }
    }
}

/// Every name declared or referenced in `tu`.
fn names_in(tu: &TranslationUnit) -> BTreeSet<String> {
    let mut names = query::all_referenced_names(tu);
    for decl in &tu.decls {
        match decl {
            Decl::Function(f) => {
                names.insert(f.name().to_string());
                for s in &f.body.stmts {
                    names.extend(query::declared_in_stmt(s));
                }
            }
            Decl::Prototype(p) => {
                names.insert(p.name.clone());
            }
            Decl::Variables(v) => names.extend(v.decls.iter().map(|i| i.name.clone())),
            Decl::Struct(s) => {
                names.insert(s.name.clone());
            }
            _ => {}
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn job(src: &str) -> ShaderJob {
        ShaderJob::new(serde_json::json!({}), vec![test::parse_frag(src)])
    }

    const REFERENCE: &str = "#version 310 es
        precision highp float;
        layout(location = 0) out vec4 color;
        float f(float x) { return x * 2.0; }
        void main() {
          float a = 1.0;
          float b = f(a);
          int i = 0;
          for (int j = 0; j < 4; j++) { b = b + a; i++; }
          color = vec4(a, b, 0.0, 1.0);
        }";

    const DONOR: &str = "#version 310 es
        precision highp float;
        layout(location = 0) out vec4 color;
        float g(float y) { return y + 1.0; }
        void main() {
          float t = g(2.0);
          for (int k = 0; k < 3; k++) { t = t * 0.5; }
          color = vec4(t);
        }";

    #[test]
    fn test_variants_reparse() {
        let reference = job(REFERENCE);
        let donors = vec![job(DONOR)];
        for seed in 0..16 {
            let options = GeneratorOptions {
                rounds: 6,
                seed,
                ..GeneratorOptions::default()
            };
            let variant = Generator::generate(&reference, &donors, &options).unwrap();
            let tu = &variant.shaders[0];
            let text = render(tu);
            test::assert_same_program(tu, &text);
            assert!(tu.main_function().is_some());
            let declares_switch = text.contains(&format!("uniform vec2 {INJECTION_SWITCH};"));
            assert_eq!(declares_switch, variant.uniforms.get(INJECTION_SWITCH).is_some(), "{text}");
        }
    }

    #[test]
    fn test_same_seed_same_variant() {
        let reference = job(REFERENCE);
        let donors = vec![job(DONOR)];
        let options = GeneratorOptions {
            seed: 99,
            rounds: 5,
            ..GeneratorOptions::default()
        };
        let a = Generator::generate(&reference, &donors, &options).unwrap();
        let b = Generator::generate(&reference, &donors, &options).unwrap();
        assert_eq!(render(&a.shaders[0]), render(&b.shaders[0]));
    }

    #[test]
    fn test_only_enabled_transformations_run() {
        let reference = job(REFERENCE);
        let options = GeneratorOptions {
            rounds: 4,
            enabled: vec![TransformationKind::Outline],
            seed: 3,
            ..GeneratorOptions::default()
        };
        let variant = Generator::generate(&reference, &[], &options).unwrap();
        let text = render(&variant.shaders[0]);
        assert!(text.contains("_GLF_outlined_"), "{text}");
        assert!(!text.contains("GLF_merged"));
        assert!(!text.contains("_GLF_struct_"));
        assert!(variant.uniforms.get(INJECTION_SWITCH).is_none());
    }

    #[test]
    fn test_missing_main_is_rejected() {
        let reference = job("float f() { return 1.0; }");
        let err = Generator::generate(&reference, &[], &GeneratorOptions::default()).unwrap_err();
        assert!(matches!(err, GlFuzzError::NoMainFunction));
    }
}
