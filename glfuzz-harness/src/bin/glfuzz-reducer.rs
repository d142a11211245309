//! Reduce a shader job while an external judge keeps finding it interesting.
//!
//! ./glfuzz-reducer variant.json --output reduction -- ./judge.sh
//! The judge receives the candidate `.json` path and a result path as its
//! last two arguments and exits with 0 when the candidate is interesting.

use clap::Parser;
use glfuzz::{ReduceConfig, ReductionOutcome};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let config = ReduceConfig::parse();
    std::fs::create_dir_all(&config.output)?;
    let _logger = glfuzz_harness::init_logger(&config.output, "reducer")?;
    log::info!("glfuzz reducer starting ...");
    log::info!("config: {config:?}");
    let running = glfuzz_harness::new_running_state()?;
    let res = glfuzz::run_reducer(&config, running);
    match &res {
        Ok(ReductionOutcome::NotInteresting) => {
            log::error!("{:?} is not interesting", config.shader_job);
            std::process::exit(glfuzz_harness::NOT_INTERESTING_EXIT_CODE);
        }
        Ok(ReductionOutcome::Finished(path)) => log::info!("reduced to {path:?}"),
        Ok(ReductionOutcome::Incomplete(path)) => log::warn!("reduction incomplete, best so far: {path:?}"),
        Err(err) => glfuzz_harness::report_error(&config.output, err)?,
    }
    log::info!("glfuzz reducer ending ...");
    res?;
    Ok(())
}
