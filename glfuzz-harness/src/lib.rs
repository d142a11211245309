//! Shared setup of the command line tools.

use std::io::prelude::*;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use flexi_logger::*;

/// Exit code of the reducer when the initial shader job is not interesting.
pub const NOT_INTERESTING_EXIT_CODE: i32 = 2;

/// Log into `{dir}/{basename}_*.log` and duplicate to stdout. The returned
/// handle has to live as long as the program logs.
pub fn init_logger(dir: &Path, basename: &str) -> eyre::Result<LoggerHandle> {
    let output_file = FileSpec::default().directory(dir).basename(basename);

    #[cfg(not(feature = "verbose"))]
    let handle = Logger::try_with_env_or_str("info")?
        .log_to_file(output_file)
        .duplicate_to_stdout(Duplicate::Info)
        .format_for_files(opt_format)
        .adaptive_format_for_stdout(AdaptiveFormat::Opt)
        .rotate(
            Criterion::Size(1 << 30),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(3),
        )
        .start()?;

    // Per-step status lines go to their own file.
    #[cfg(feature = "verbose")]
    let handle = {
        use flexi_logger::writers::FileLogWriter;
        let status_writer = Box::new(
            FileLogWriter::builder(
                FileSpec::default()
                    .directory(dir)
                    .suppress_timestamp()
                    .basename("status"),
            )
            .rotate(
                Criterion::Size(1 << 30),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(3),
            )
            .try_build()?,
        );
        Logger::try_with_env_or_str("info")?
            .log_to_file(output_file)
            .add_writer("Status", status_writer)
            .duplicate_to_stdout(Duplicate::Info)
            .format_for_files(opt_format)
            .adaptive_format_for_stdout(AdaptiveFormat::Opt)
            .rotate(
                Criterion::Size(1 << 30),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(3),
            )
            .start()?
    };

    Ok(handle)
}

/// A flag that stays true until Ctrl-C is pressed.
pub fn new_running_state() -> eyre::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::warn!("Stopping, finishing the current step ...");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// Write `err` into `misc/error.log` under `dir`.
pub fn report_error(dir: &Path, err: &eyre::Report) -> eyre::Result<()> {
    let misc = dir.join(glfuzz::MISC_DIR);
    std::fs::create_dir_all(&misc)?;
    let path = misc.join("error.log");
    log::error!("error is written into {path:?}");
    let mut f = std::fs::File::create(path)?;
    writeln!(f, "{err:#?}")?;
    Ok(())
}
