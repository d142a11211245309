use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use eyre::Context;

use super::{Judge, MasterPlan};
use crate::config::{self, ReducerOptions};
use crate::depot::{ReductionDir, ShaderJob};
use crate::fuzz::macros;
use crate::{log, FuzzRng, GlFuzzError};

/// How a reduction session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReductionOutcome {
    /// The initial job never proved interesting.
    NotInteresting,
    /// Nothing is left to reduce; the result is at the path.
    Finished(PathBuf),
    /// Stopped by the step budget or by cancellation.
    Incomplete(PathBuf),
}

/// One reduction session: owns the plan, the random source, the judge and
/// the pass/fail hash caches.
pub struct ReductionDriver<J: Judge> {
    judge: J,
    plan: MasterPlan,
    rng: FuzzRng,
    out: ReductionDir,
    variant: String,
    reduce_everywhere: bool,
    max_steps: Option<usize>,
    running: Arc<AtomicBool>,
    pass_hashes: HashSet<u64>,
    fail_hashes: HashSet<u64>,
}

impl<J: Judge> ReductionDriver<J> {
    pub fn new(
        options: &ReducerOptions,
        variant: &str,
        judge: J,
        running: Arc<AtomicBool>,
    ) -> eyre::Result<Self> {
        let out = ReductionDir::new(&options.output_dir, variant)
            .context("fail to create the reduction directory")?;
        log!(info, "reduce {variant} with seed {}", options.seed);
        Ok(Self {
            judge,
            plan: MasterPlan::new(),
            rng: FuzzRng::new(options.seed),
            out,
            variant: variant.to_string(),
            reduce_everywhere: options.reduce_everywhere,
            max_steps: options.max_steps,
            running,
            pass_hashes: HashSet::new(),
            fail_hashes: HashSet::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn output_dir(&self) -> &Path {
        self.out.path()
    }

    /// Reduce `job` until no opportunity is left, the step budget runs out
    /// or the session is cancelled.
    pub fn run(&mut self, job: ShaderJob) -> eyre::Result<ReductionOutcome> {
        let initial = self.out.path().join(format!("{}.json", self.variant));
        job.write(&initial)
            .context("fail to write the initial shader job")?;
        if !self.initially_interesting(&initial)? {
            log!(warn, "{} is not interesting, nothing to reduce", self.variant);
            self.out.write_marker(config::NOT_INTERESTING)?;
            return Ok(ReductionOutcome::NotInteresting);
        }
        let mut state = job;
        let mut state_hash = state.content_hash();
        self.pass_hashes.insert(state_hash);
        let mut step = 0;
        let mut stopped = false;
        loop {
            if !self.is_running() {
                log!(warn, "reduction cancelled after {step} steps");
                stopped = true;
                break;
            }
            if self.max_steps.map_or(false, |max| step >= max) {
                log!(info, "step budget of {step} reached");
                stopped = true;
                break;
            }
            let Some(candidate) = self
                .next_candidate(&state)
                .with_context(|| format!("fail to build candidate for step {}", step + 1))?
            else {
                log!(info, "no more to reduce after {step} steps");
                break;
            };
            step += 1;
            let interesting = self
                .judge_step(&candidate, state_hash, state.size(), step)
                .with_context(|| format!("fail to judge step {step}"))?;
            self.plan.update(interesting);
            if interesting {
                state_hash = candidate.content_hash();
                state = candidate;
            }
        }
        let final_path = self.finalize(state).context("fail to finalize the reduction")?;
        if stopped {
            self.out.write_marker(config::REDUCTION_INCOMPLETE)?;
            return Ok(ReductionOutcome::Incomplete(final_path));
        }
        Ok(ReductionOutcome::Finished(final_path))
    }

    fn initially_interesting(&mut self, initial: &Path) -> eyre::Result<bool> {
        let result = self.out.result_path(initial);
        for i in 1..=config::NUM_INITIAL_TRIES {
            if self
                .judge
                .is_interesting(initial, &result)
                .context("fail to judge the initial shader job")?
            {
                return Ok(true);
            }
            log!(info, "initial shader job not interesting, try {i}");
        }
        Ok(false)
    }

    fn next_candidate(&mut self, state: &ShaderJob) -> Result<Option<ShaderJob>, GlFuzzError> {
        for attempt in 1..=config::NUM_ATTEMPTS_PER_STEP {
            match self
                .plan
                .apply_reduction(state, self.reduce_everywhere, &mut self.rng)
            {
                Ok(candidate) => return Ok(candidate),
                Err(err) if err.is_recoverable() => {
                    log!(debug, "attempt {attempt} failed: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        log!(info, "giving up after {} failed attempts", config::NUM_ATTEMPTS_PER_STEP);
        Ok(None)
    }

    fn judge_step(
        &mut self,
        candidate: &ShaderJob,
        state_hash: u64,
        state_size: usize,
        step: usize,
    ) -> eyre::Result<bool> {
        let hash = candidate.content_hash();
        let path = self.out.write_step(candidate, step)?;
        let interesting = if hash == state_hash || self.fail_hashes.contains(&hash) {
            log!(trace, "candidate {hash:016x} already known to fail");
            false
        } else if self.pass_hashes.contains(&hash) {
            return Err(GlFuzzError::ReductionLoop { hash }.into());
        } else if candidate.size() >= state_size {
            log!(trace, "candidate does not shrink");
            false
        } else {
            let result = self.out.result_path(&path);
            self.judge.is_interesting(&path, &result)?
        };
        self.out.mark_step(candidate, step, interesting)?;
        if interesting {
            self.pass_hashes.insert(hash);
        } else {
            self.fail_hashes.insert(hash);
        }
        log!(
            info,
            "step {step} ({} pass): {}",
            self.plan.current_pass().name(),
            if interesting { "interesting" } else { "not interesting" }
        );
        #[cfg(feature = "verbose")]
        log::info!(
            target: "{Status}",
            "{step} {} {} {} {}",
            self.plan.current_pass().name(),
            state_size,
            candidate.size(),
            interesting as u8
        );
        Ok(interesting)
    }

    /// Strip the injection macros and write the result. Falls back to the
    /// last accepted state when the stripped job is not interesting.
    fn finalize(&mut self, state: ShaderJob) -> eyre::Result<PathBuf> {
        let final_path = self.out.final_path();
        let mut simplified = state.clone();
        for tu in &mut simplified.shaders {
            macros::eliminate_injection_macros(tu);
            macros::remove_macro_definitions(tu);
        }
        let mut result = state;
        if simplified.content_hash() != result.content_hash() {
            simplified.write(&final_path)?;
            let output = self.out.result_path(&final_path);
            if self.judge.is_interesting(&final_path, &output)? {
                result = simplified;
            } else {
                log!(warn, "simplified result is not interesting, keep the macros");
            }
        }
        result.write(&final_path)?;
        log!(info, "reduced job written to {final_path:?}");
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test;

    fn options(name: &str, everywhere: bool, max_steps: Option<usize>) -> ReducerOptions {
        ReducerOptions {
            reduce_everywhere: everywhere,
            max_steps,
            output_dir: test::temp_dir(name),
            seed: 1,
        }
    }

    fn judge(
        mut f: impl FnMut(&Path) -> bool,
    ) -> impl FnMut(&Path, &Path) -> Result<bool, GlFuzzError> {
        move |job, _| Ok(f(job))
    }

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    fn job(src: &str) -> ShaderJob {
        let mut tu = test::parse_frag(src);
        macros::ensure_macro_definitions(&mut tu);
        ShaderJob::new(serde_json::json!({}), vec![tu])
    }

    fn frag(path: &Path) -> String {
        fs::read_to_string(path.with_extension("frag")).unwrap()
    }

    const INJECTED: &str = "void main() {
          int a = 1;
          if (_GLF_DEAD(false)) { a = 2; }
          a = _GLF_IDENTITY(a, a + 1);
        }";

    #[test]
    fn test_always_interesting_reaches_fixed_point() {
        let opts = options("driver_fixed_point", false, None);
        let mut driver = ReductionDriver::new(&opts, "variant", judge(|_| true), running()).unwrap();
        let outcome = driver.run(job(INJECTED)).unwrap();
        let ReductionOutcome::Finished(path) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(path, opts.output_dir.join("variant_reduced_final.json"));
        let reduced = test::parse_frag(&frag(&path));
        test::assert_same_program(&reduced, "void main() { int a = 1; a = (a + 1); }");
        assert!(opts.output_dir.join("variant_reduced_0001_success.json").exists());
        assert!(!opts.output_dir.join(config::REDUCTION_INCOMPLETE).exists());
    }

    #[test]
    fn test_uninteresting_job_is_marked() {
        let opts = options("driver_not_interesting", false, None);
        let mut calls = 0;
        let outcome = {
            let check = judge(|_| {
                calls += 1;
                false
            });
            let mut driver = ReductionDriver::new(&opts, "variant", check, running()).unwrap();
            driver.run(job(INJECTED)).unwrap()
        };
        assert_eq!(outcome, ReductionOutcome::NotInteresting);
        assert_eq!(calls, config::NUM_INITIAL_TRIES);
        assert!(opts.output_dir.join(config::NOT_INTERESTING).exists());
    }

    #[test]
    fn test_step_budget_leaves_incomplete_marker() {
        let opts = options("driver_budget", false, Some(1));
        let mut driver = ReductionDriver::new(&opts, "variant", judge(|_| true), running()).unwrap();
        let outcome = driver.run(job(INJECTED)).unwrap();
        assert!(matches!(outcome, ReductionOutcome::Incomplete(_)));
        assert!(opts.output_dir.join(config::REDUCTION_INCOMPLETE).exists());
        assert!(!opts.output_dir.join("variant_reduced_0002.json").exists());
    }

    #[test]
    fn test_cancelled_session_stops_before_first_step() {
        let opts = options("driver_cancel", false, None);
        let flag = Arc::new(AtomicBool::new(false));
        let mut driver = ReductionDriver::new(&opts, "variant", judge(|_| true), flag).unwrap();
        let outcome = driver.run(job(INJECTED)).unwrap();
        let ReductionOutcome::Incomplete(path) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        // Macros are still stripped from the unreduced job.
        assert!(!frag(&path).contains("_GLF_"));
    }

    #[test]
    fn test_judge_keeps_what_matters() {
        let opts = options("driver_everywhere", true, None);
        let src = "void main() { float a = 1.0; float b = sin(a); a = 2.0; b = b + a; }";
        let original = job(src);
        let keep_sin = judge(|path| frag(path).contains("sin"));
        let mut driver = ReductionDriver::new(&opts, "variant", keep_sin, running()).unwrap();
        let ReductionOutcome::Finished(path) = driver.run(original.clone()).unwrap() else {
            panic!("reduction did not finish");
        };
        let reduced = frag(&path);
        assert!(reduced.contains("sin"));
        let reduced = ShaderJob::new(serde_json::json!({}), vec![test::parse_frag(&reduced)]);
        assert!(reduced.size() < original.size());
    }

    #[test]
    fn test_judge_failure_aborts() {
        let opts = options("driver_judge_error", false, None);
        let failing =
            |_: &Path, _: &Path| Err::<bool, _>(GlFuzzError::Judge("renderer crashed".to_string()));
        let mut driver = ReductionDriver::new(&opts, "variant", failing, running()).unwrap();
        let err = driver.run(job(INJECTED)).unwrap_err();
        assert!(err.chain().any(|e| e.to_string().contains("renderer crashed")));
    }

    #[test]
    fn test_known_hashes_short_circuit() {
        let opts = options("driver_hash_cache", false, None);
        let calls = std::cell::Cell::new(0);
        let counting = judge(|_| {
            calls.set(calls.get() + 1);
            false
        });
        let mut driver = ReductionDriver::new(&opts, "variant", counting, running()).unwrap();
        let state = job("void main() { int a = 1; a = 2; }");
        let (hash, size) = (state.content_hash(), state.size());

        // Same as the current state.
        assert!(!driver.judge_step(&state, hash, size, 1).unwrap());
        assert_eq!(calls.get(), 0);

        let failing = job("void main() { int a = 1; }");
        assert!(!driver.judge_step(&failing, hash, size, 2).unwrap());
        assert_eq!(calls.get(), 1);
        assert!(driver.fail_hashes.contains(&failing.content_hash()));
        // Replaying a failing candidate does not ask the judge again.
        assert!(!driver.judge_step(&failing, hash, size, 3).unwrap());
        assert_eq!(calls.get(), 1);
        assert!(opts.output_dir.join("variant_reduced_0003_fail.json").exists());

        // Coming back to an accepted state is a loop.
        let accepted = job("void main() { int b = 1; }");
        driver.pass_hashes.insert(accepted.content_hash());
        let err = driver.judge_step(&accepted, hash, size, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GlFuzzError>(),
            Some(GlFuzzError::ReductionLoop { hash }) if *hash == accepted.content_hash()
        ));
        assert_eq!(calls.get(), 1);
    }
}
