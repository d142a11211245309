//! Plans: how many opportunities of which kind the next step takes.

use std::collections::HashSet;

use super::Finder;
use crate::config::{AGGRESSION_DECREASE_STEP, MAX_PERCENTAGE_TO_REDUCE, MAX_STEPS_PER_PASS};
use crate::depot::ShaderJob;
use crate::{FuzzRng, GlFuzzError};

/// Takes a shrinking share of the opportunities of one finder per step.
pub struct SimplePlan {
    finder: Finder,
    percentage: usize,
    replenish_count: u32,
    /// Positions, in the depth-sorted list, tried since the last accepted step.
    history: HashSet<usize>,
}

impl SimplePlan {
    pub fn new(finder: Finder) -> Self {
        Self {
            finder,
            percentage: MAX_PERCENTAGE_TO_REDUCE,
            replenish_count: 0,
            history: HashSet::new(),
        }
    }

    pub fn finder(&self) -> Finder {
        self.finder
    }

    pub fn percentage(&self) -> usize {
        self.percentage
    }

    /// A candidate made from `job`, or `None` once the finder has nothing
    /// left to offer.
    pub fn apply_reduction(
        &mut self,
        job: &ShaderJob,
        reduce_everywhere: bool,
        rng: &mut FuzzRng,
    ) -> Result<Option<ShaderJob>, GlFuzzError> {
        let mut local = self.percentage;
        loop {
            if let Some(candidate) = self.attempt(job, reduce_everywhere, local, rng)? {
                return Ok(Some(candidate));
            }
            local /= 2;
            if local == 0 {
                return Ok(None);
            }
            self.history.clear();
        }
    }

    fn attempt(
        &mut self,
        job: &ShaderJob,
        reduce_everywhere: bool,
        percentage: usize,
        rng: &mut FuzzRng,
    ) -> Result<Option<ShaderJob>, GlFuzzError> {
        let mut ops = self.finder.find(job, reduce_everywhere);
        ops.sort_by_key(|op| op.depth);
        let mut pool: Vec<usize> = (0..ops.len()).filter(|i| !self.history.contains(i)).collect();
        if pool.is_empty() {
            return Ok(None);
        }
        let wanted = if percentage == 0 {
            1
        } else {
            ((percentage * pool.len() + 99) / 100).max(1)
        };
        let mut candidate = job.clone();
        let mut applied = 0;
        for _ in 0..wanted {
            if pool.is_empty() {
                break;
            }
            // Favour the front of the list, where the shallow opportunities are.
            let bound = rng.below(pool.len()) + 1;
            let index = pool.remove(rng.below(bound));
            self.history.insert(index);
            if ops[index].apply(&mut candidate) {
                applied += 1;
            }
        }
        crate::log!(
            debug,
            "{} pass: applied {applied} of {wanted} wanted from {} opportunities",
            self.finder.name(),
            ops.len()
        );
        if applied == 0 {
            return Err(GlFuzzError::FailedReduction(format!(
                "no {} opportunity could be applied",
                self.finder.name()
            )));
        }
        Ok(Some(candidate))
    }

    /// Learn from the judge's verdict on the last candidate.
    pub fn update(&mut self, interesting: bool) {
        if interesting {
            self.history.clear();
        } else {
            self.percentage = self.percentage.saturating_sub(AGGRESSION_DECREASE_STEP);
        }
    }

    /// Start over with a smaller share, after the finder ran dry.
    pub fn replenish(&mut self) {
        self.replenish_count += 1;
        self.percentage = (MAX_PERCENTAGE_TO_REDUCE >> self.replenish_count.min(31)).max(1);
        self.history.clear();
    }
}

/// Runs one [`SimplePlan`] per pass in a fixed order, round after round,
/// until a whole round makes no progress.
pub struct MasterPlan {
    plans: Vec<SimplePlan>,
    index: usize,
    pass_steps: usize,
    progress: bool,
}

impl Default for MasterPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterPlan {
    pub const ORDER: [Finder; 13] = [
        Finder::Vectorization,
        Finder::Mutation,
        Finder::Stmt,
        Finder::Function,
        Finder::ExprToConstant,
        Finder::Function,
        Finder::CompoundExprToSubExpr,
        Finder::Function,
        Finder::OutlinedStatement,
        Finder::Unwrap,
        Finder::Destructify,
        Finder::Function,
        Finder::VariableDecl,
    ];

    pub fn new() -> Self {
        Self {
            plans: Self::ORDER.iter().map(|f| SimplePlan::new(*f)).collect(),
            index: 0,
            pass_steps: 0,
            progress: false,
        }
    }

    pub fn current_pass(&self) -> Finder {
        self.plans[self.index].finder()
    }

    /// Moves to the next pass. Returns false when a full round ended
    /// without any accepted step.
    fn advance(&mut self) -> bool {
        self.index = (self.index + 1) % self.plans.len();
        self.pass_steps = 0;
        if self.index == 0 {
            let progressed = self.progress;
            self.progress = false;
            return progressed;
        }
        true
    }

    /// The next candidate, or `None` when there is no more to reduce.
    pub fn apply_reduction(
        &mut self,
        job: &ShaderJob,
        reduce_everywhere: bool,
        rng: &mut FuzzRng,
    ) -> Result<Option<ShaderJob>, GlFuzzError> {
        loop {
            if self.pass_steps >= MAX_STEPS_PER_PASS && !self.advance() {
                return Ok(None);
            }
            let plan = &mut self.plans[self.index];
            match plan.apply_reduction(job, reduce_everywhere, rng)? {
                Some(candidate) => {
                    self.pass_steps += 1;
                    return Ok(Some(candidate));
                }
                None => {
                    crate::log!(debug, "{} pass has no more to reduce", plan.finder().name());
                    plan.replenish();
                    if !self.advance() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub fn update(&mut self, interesting: bool) {
        if interesting {
            self.progress = true;
        }
        self.plans[self.index].update(interesting);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::render;
    use crate::test;

    fn job(src: &str) -> ShaderJob {
        ShaderJob::new(serde_json::json!({}), vec![test::parse_frag(src)])
    }

    #[test]
    fn test_percentage_schedule() {
        let mut plan = SimplePlan::new(Finder::Stmt);
        assert_eq!(plan.percentage(), 50);
        plan.update(false);
        plan.update(false);
        assert_eq!(plan.percentage(), 40);
        plan.update(true);
        assert_eq!(plan.percentage(), 40);
        plan.replenish();
        assert_eq!(plan.percentage(), 25);
        plan.replenish();
        assert_eq!(plan.percentage(), 12);
        for _ in 0..10 {
            plan.replenish();
        }
        assert_eq!(plan.percentage(), 1);
        for _ in 0..3 {
            plan.update(false);
        }
        assert_eq!(plan.percentage(), 0);
    }

    #[test]
    fn test_simple_plan_runs_dry() {
        let mut rng = test::rng();
        let mut plan = SimplePlan::new(Finder::Stmt);
        let original = job("void main() { int a = 1; if (_GLF_DEAD(false)) { a = 2; } }");
        let candidate = plan
            .apply_reduction(&original, false, &mut rng)
            .unwrap()
            .unwrap();
        assert!(candidate.size() < original.size());
        let plain = job("void main() { int a = 1; a++; }");
        assert!(plan.apply_reduction(&plain, false, &mut rng).unwrap().is_none());
    }

    #[test]
    fn test_master_plan_reaches_a_fixed_point() {
        let mut state = job(
            "uniform vec2 injectionSwitch;
             void main() {
               int a = 1;
               if (_GLF_DEAD(_GLF_FALSE(false, (injectionSwitch.x > injectionSwitch.y)))) { a = 2; }
               a = _GLF_IDENTITY(a, a);
             }",
        );
        let mut rng = test::rng();
        let mut plan = MasterPlan::new();
        let mut steps = 0;
        while let Some(candidate) = plan.apply_reduction(&state, false, &mut rng).unwrap() {
            steps += 1;
            assert!(steps < 2000, "reduction does not terminate");
            let interesting = candidate.size() < state.size();
            if interesting {
                state = candidate;
            }
            plan.update(interesting);
        }
        assert_eq!(render(&state.shaders[0]), render(&test::parse_frag("void main() { }")));
    }
}
