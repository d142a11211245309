//! Generate a variant of a reference shader job.
//!
//! ./glfuzz-generator reference.json donors/ variant.json --seed 42

use clap::Parser;
use glfuzz::GenerateConfig;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let config = GenerateConfig::parse();
    let out_dir = match config.output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&out_dir)?;
    let _logger = glfuzz_harness::init_logger(&out_dir, "generator")?;
    log::info!("config: {config:?}");
    let res = glfuzz::run_generator(&config);
    if let Err(err) = &res {
        glfuzz_harness::report_error(&out_dir, err)?;
    }
    res
}
