pub mod ast;
mod config;
mod depot;
mod error;
pub mod fuzz;
pub mod reduce;
#[cfg(test)]
mod test;
pub mod typing;
mod utils;
pub mod visit;

pub use config::*;
pub use depot::*;
pub use error::*;
pub use fuzz::{FuzzRng, Generator, IdGenerator};
pub use reduce::{CommandJudge, Judge, ReductionDriver, ReductionOutcome};
pub use utils::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use eyre::Context;

/// Run a reduction session for the shader job and judge named in `config`.
pub fn run_reducer(config: &ReduceConfig, running: Arc<AtomicBool>) -> eyre::Result<ReductionOutcome> {
    let options = config.options();
    let job = ShaderJob::load(&config.shader_job)
        .with_context(|| format!("fail to load shader job {:?}", config.shader_job))?;
    let variant = config
        .shader_job
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "variant".to_string());
    let judge = CommandJudge::new(&config.judge, config.judge_timeout.map(Duration::from_secs))?;
    let mut driver = ReductionDriver::new(&options, &variant, judge, running)?;
    let outcome = driver.run(job)?;
    crate::log!(info, "reduction outcome: {outcome:?}");
    Ok(outcome)
}

/// Generate one variant of the reference job in `config`.
pub fn run_generator(config: &GenerateConfig) -> eyre::Result<()> {
    let options = config.options();
    let reference = ShaderJob::load(&config.reference)
        .with_context(|| format!("fail to load reference {:?}", config.reference))?;
    let donors = load_donors(&config.donors)?;
    crate::log!(info, "loaded {} donors from {:?}", donors.len(), config.donors);
    let variant = Generator::generate(&reference, &donors, &options)
        .context("fail to generate variant")?;
    variant
        .write(&config.output)
        .with_context(|| format!("fail to write variant {:?}", config.output))?;
    crate::log!(info, "variant written to {:?}", config.output);
    Ok(())
}

/// Every shader job in `dir`. Jobs that fail to load are skipped.
fn load_donors(dir: &Path) -> eyre::Result<Vec<ShaderJob>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("fail to read donor directory {dir:?}"))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();
    let mut donors = vec![];
    for path in paths {
        match ShaderJob::load(&path) {
            Ok(job) => donors.push(job),
            Err(err) => crate::log!(warn, "skip donor {path:?}: {err}"),
        }
    }
    Ok(donors)
}

#[test]
fn test_load_donors_skips_broken_jobs() {
    let dir = test::temp_dir("lib_donors");
    fs::write(dir.join("good.json"), "{}").unwrap();
    fs::write(dir.join("good.frag"), "void main() { }").unwrap();
    fs::write(dir.join("broken.json"), "{}").unwrap();
    fs::write(dir.join("broken.frag"), "void main( {").unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();
    let donors = load_donors(&dir).unwrap();
    assert_eq!(donors.len(), 1);
    assert!(load_donors(&dir.join("missing")).is_err());
}

#[test]
fn test_generate_from_command_line() {
    use clap::Parser;

    let dir = test::temp_dir("lib_round_trip");
    let donors = dir.join("donors");
    fs::create_dir_all(&donors).unwrap();
    fs::write(dir.join("reference.json"), "{}").unwrap();
    fs::write(
        dir.join("reference.frag"),
        "#version 310 es\nprecision highp float;\nlayout(location = 0) out vec4 color;\nvoid main() { float x = 1.0; color = vec4(x); }\n",
    )
    .unwrap();
    fs::write(donors.join("donor.json"), "{}").unwrap();
    fs::write(
        donors.join("donor.frag"),
        "#version 310 es\nprecision highp float;\nfloat f(float a) { return a * 2.0; }\nvoid main() { float y = f(3.0); y = y + 1.0; }\n",
    )
    .unwrap();
    let variant = dir.join("variant.json");
    let generate = GenerateConfig::parse_from([
        "glfuzz-generator".into(),
        dir.join("reference.json").into_os_string(),
        donors.clone().into_os_string(),
        variant.clone().into_os_string(),
        "--seed".into(),
        "3".into(),
    ]);
    run_generator(&generate).unwrap();
    assert!(ShaderJob::load(&variant).is_ok());
}
