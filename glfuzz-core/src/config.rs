use std::path::PathBuf;

// --- Reduction plans ---
// Initial share of opportunities a pass tries to take at once
pub const MAX_PERCENTAGE_TO_REDUCE: usize = 50;
// How much the share drops after an uninteresting step
pub const AGGRESSION_DECREASE_STEP: usize = 5;
// Steps before the master plan moves on to the next pass
pub const MAX_STEPS_PER_PASS: usize = 200;

// --- Reduction driver ---
pub const NUM_INITIAL_TRIES: usize = 5;
// Attempts to apply opportunities within one step
pub const NUM_ATTEMPTS_PER_STEP: usize = 3;

// --- Transformations ---
pub const LOOP_LIMIT_MIN: u32 = 3;
pub const LOOP_LIMIT_SPAN: u32 = 5;
pub const MAX_STRUCT_FIELDS: usize = 7;
pub const MAX_STRUCT_NESTING_DEPTH: usize = 4;
pub const MAX_VECTOR_WIDTH: usize = 4;
// Largest callee (in nodes, after return removal) the generator inlines
pub const INLINE_NODE_LIMIT: usize = 50;
pub const INJECTION_SWITCH: &str = "injectionSwitch";

// --- Depot ---
pub static NOT_INTERESTING: &str = "NOT_INTERESTING";
pub static REDUCTION_INCOMPLETE: &str = "REDUCTION_INCOMPLETE";
pub static REDUCED_INFIX: &str = "_reduced_";
pub static REDUCED_FINAL_SUFFIX: &str = "_reduced_final";
pub static SUCCESS_SUFFIX: &str = "_success";
pub static FAIL_SUFFIX: &str = "_fail";
pub static MISC_DIR: &str = "misc";
pub static RESULT_SUFFIX: &str = "_result";

// -----------------------------------------------------

use clap::{Parser, ValueEnum};

/// Command line of the reducer.
#[derive(Debug, Clone, Parser, Default)]
#[clap(name = "glfuzz-reducer")]
#[clap(version = "1.0.0")]
pub struct ReduceConfig {
    /// Path to the `.json` file of the shader job to reduce.
    #[clap(value_parser)]
    pub shader_job: PathBuf,
    /// Directory for step files, the final result and logs.
    #[clap(long, value_parser, default_value = "reduction")]
    pub output: PathBuf,
    /// Reduce any part of the program, not only injected code.
    #[clap(long, value_parser, default_value_t = false)]
    pub reduce_everywhere: bool,
    /// Stop after this many steps.
    #[clap(long, value_parser)]
    pub max_steps: Option<usize>,
    /// Seed for the random choices; drawn from entropy when absent.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,
    /// Seconds after which a judge run counts as not interesting.
    #[clap(long, value_parser)]
    pub judge_timeout: Option<u64>,
    /// Interestingness test: a command that receives the shader job and
    /// the result file as its last two arguments.
    #[clap(last = true, required = true)]
    pub judge: Vec<String>,
}

/// Command line of the generator.
#[derive(Debug, Clone, Parser, Default)]
#[clap(name = "glfuzz-generator")]
#[clap(version = "1.0.0")]
pub struct GenerateConfig {
    /// `.json` file of the reference shader job.
    #[clap(value_parser)]
    pub reference: PathBuf,
    /// Directory of donor shader jobs.
    #[clap(value_parser)]
    pub donors: PathBuf,
    /// `.json` path of the variant to write.
    #[clap(value_parser)]
    pub output: PathBuf,
    #[clap(long, value_parser)]
    pub seed: Option<u64>,
    /// Rounds of transformations applied to each shader.
    #[clap(long, value_parser, default_value_t = 3)]
    pub rounds: usize,
    /// Transformations to leave out, separated by `,`.
    #[clap(long, value_enum, value_delimiter = ',')]
    pub disable: Vec<TransformationKind>,
}

/// Transformations the generator can apply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TransformationKind {
    DonateDeadCode,
    DonateLiveCode,
    Inline,
    Outline,
    Vectorize,
    Structify,
}

impl TransformationKind {
    pub fn all() -> &'static [TransformationKind] {
        &[
            Self::DonateDeadCode,
            Self::DonateLiveCode,
            Self::Inline,
            Self::Outline,
            Self::Vectorize,
            Self::Structify,
        ]
    }
}

/// Settings of one reduction session.
#[derive(Debug, Clone)]
pub struct ReducerOptions {
    pub reduce_everywhere: bool,
    pub max_steps: Option<usize>,
    pub output_dir: PathBuf,
    pub seed: u64,
}

/// Settings of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub rounds: usize,
    pub enabled: Vec<TransformationKind>,
    pub seed: u64,
    pub max_struct_fields: usize,
    pub max_struct_nesting_depth: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            rounds: 3,
            enabled: TransformationKind::all().to_vec(),
            seed: 0,
            max_struct_fields: MAX_STRUCT_FIELDS,
            max_struct_nesting_depth: MAX_STRUCT_NESTING_DEPTH,
        }
    }
}

impl ReduceConfig {
    pub fn options(&self) -> ReducerOptions {
        ReducerOptions {
            reduce_everywhere: self.reduce_everywhere,
            max_steps: self.max_steps,
            output_dir: self.output.clone(),
            seed: self.seed.unwrap_or_else(rand::random),
        }
    }
}

impl GenerateConfig {
    pub fn options(&self) -> GeneratorOptions {
        GeneratorOptions {
            rounds: self.rounds,
            enabled: TransformationKind::all()
                .iter()
                .copied()
                .filter(|t| !self.disable.contains(t))
                .collect(),
            seed: self.seed.unwrap_or_else(rand::random),
            ..GeneratorOptions::default()
        }
    }
}

#[test]
fn test_parse_command_lines() {
    let config = ReduceConfig::parse_from([
        "glfuzz-reducer",
        "bug.json",
        "--max-steps",
        "10",
        "--",
        "./judge.sh",
        "--flag",
    ]);
    assert_eq!(config.judge, vec!["./judge.sh", "--flag"]);
    assert_eq!(config.options().max_steps, Some(10));
    let config = GenerateConfig::parse_from([
        "glfuzz-generator",
        "ref.json",
        "donors",
        "out.json",
        "--disable",
        "inline,outline",
        "--seed",
        "7",
    ]);
    let options = config.options();
    assert_eq!(options.seed, 7);
    assert_eq!(options.enabled.len(), 4);
    assert!(!options.enabled.contains(&TransformationKind::Inline));
}
