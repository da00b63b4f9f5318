//! # copdem-runner
//!
//! Command-line front end for `copdem-download`. It turns arguments into a
//! tile selection, answers the conflict question from flags or stdin, draws
//! an `indicatif` progress bar on stderr and maps the batch outcome to an exit code.

pub mod cli;
mod error;
pub mod prompt;
pub mod render;

pub use cli::{Cli, Command, DownloadArgs, ListArgs, OnConflict, DEFAULT_OUTPUT_DIR};
pub use error::CliError;
pub use render::ProgressRenderer;

use copdem_download::{
    BatchError, BatchReport, BatchState, CancelToken, ConflictChoice, ConflictPrompt, DownloadConfig, FixedChoice,
    JobStatus, Session, TileId,
};
use parking_lot::Mutex;
use prompt::LinePrompt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Install the global `tracing` subscriber.
///
/// Defaults to `info`, or `debug` when `verbose` is set. `RUST_LOG` wins over both.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// How a run ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    JobsFailed,
    Cancelled,
}

impl Outcome {
    pub fn from_report(report: &BatchReport) -> Self {
        if report.state == BatchState::Cancelled {
            Outcome::Cancelled
        } else if report.tally.failed > 0 {
            Outcome::JobsFailed
        } else {
            Outcome::Success
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::JobsFailed => 1,
            Outcome::Cancelled => 130,
        }
    }
}

/// Exit code for errors that stop a run before it produces a report.
pub const ERROR_EXIT_CODE: i32 = 2;

/// Routes Ctrl-C to whichever batch is running.
#[derive(Clone, Default)]
pub struct Interrupt {
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl Interrupt {
    /// Register the process-wide Ctrl-C handler.
    pub fn install() -> Result<Self, CliError> {
        let interrupt = Interrupt::default();
        let handler = interrupt.clone();
        ctrlc::set_handler(move || {
            if handler.interrupted() {
                std::process::exit(Outcome::Cancelled.exit_code());
            }
        })?;
        Ok(interrupt)
    }

    /// React to one Ctrl-C. Returns `true` when the process should exit now.
    ///
    /// The first press cancels the armed batch. A second press, or any press
    /// with nothing armed, exits.
    pub fn interrupted(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) if token.cancel() => {
                eprintln!("\nStopping download... (Ctrl-C again to quit)");
                false
            }
            _ => true,
        }
    }

    fn arm(&self, token: CancelToken) {
        *self.current.lock() = Some(token);
    }

    fn disarm(&self) {
        self.current.lock().take();
    }
}

/// Load the configuration file, if any, then apply flag overrides.
pub fn load_config(path: Option<&Path>, overrides: &cli::ConfigOverrides) -> Result<DownloadConfig, CliError> {
    let config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            DownloadConfig::from_yaml_file(path)?
        }
        None => DownloadConfig::default(),
    };
    let config = overrides.apply(config);
    config.validate()?;
    Ok(config)
}

/// `copdem list`: print names or locators of the selected tiles.
pub fn run_list(args: &ListArgs, config: &DownloadConfig, out: &mut dyn Write) -> Result<Outcome, CliError> {
    let tiles = args.selection.resolve()?;
    if tiles.is_empty() {
        return Err(BatchError::NothingSelected.into());
    }
    for tile in &tiles {
        let line = if args.urls {
            tile.resource_locator(&config.base_url)
        } else {
            tile.file_name()
        };
        // A closed pipe (e.g. `| head`) is not an error worth reporting.
        if writeln!(out, "{}", line).is_err() {
            break;
        }
    }
    Ok(Outcome::Success)
}

/// Resolve the output directory, creating it only when it was defaulted.
pub fn output_dir(requested: Option<&Path>) -> Result<PathBuf, CliError> {
    match requested {
        Some(dir) => Ok(dir.to_path_buf()),
        None => {
            let dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
            std::fs::create_dir_all(&dir).map_err(|source| CliError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            Ok(dir)
        }
    }
}

const EVENT_POLL: Duration = Duration::from_millis(200);

/// Run one batch to completion, rendering its events.
fn run_batch(
    session: &mut Session,
    dest: &Path,
    prompt: &mut dyn ConflictPrompt,
    interrupt: Option<&Interrupt>,
    progress: &mut ProgressRenderer<impl Write>,
) -> Result<BatchReport, CliError> {
    // Armed before the batch thread exists, so no Ctrl-C finds it unarmed.
    let token = CancelToken::new();
    if let Some(interrupt) = interrupt {
        interrupt.arm(token.clone());
    }
    if let Err(e) = session.download_with_cancel(dest, prompt, token) {
        if let Some(interrupt) = interrupt {
            interrupt.disarm();
        }
        return Err(e.into());
    }

    // A panicked batch thread never sends BatchFinished, so poll for it.
    loop {
        let event = match session.events().recv_timeout(EVENT_POLL) {
            Ok(event) => event,
            Err(_) if session.is_downloading() => continue,
            Err(_) => break,
        };
        match progress.handle(&event) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => debug!("Progress output failed: {}", e),
        }
    }

    let result = session.wait();
    if let Some(interrupt) = interrupt {
        interrupt.disarm();
    }
    // download_with_cancel succeeded, so there is always a handle to wait on.
    let report = result.unwrap_or(Err(BatchError::NothingSelected))?;
    Ok(report)
}

/// Replace the failed jobs of `first` with their retried counterparts.
pub fn merge_retry(first: BatchReport, retry: BatchReport) -> BatchReport {
    let mut jobs = first.jobs;
    for job in retry.jobs {
        if let Some(slot) = jobs
            .iter_mut()
            .find(|j| j.tile == job.tile && j.status == JobStatus::Failed)
        {
            *slot = job;
        }
    }
    BatchReport::new(retry.state, jobs)
}

/// `copdem download`: fetch the selected tiles into the output directory.
pub fn run_download(
    args: &DownloadArgs,
    session: &mut Session,
    prompt: &mut dyn ConflictPrompt,
    interrupt: Option<&Interrupt>,
    mut progress: ProgressRenderer<impl Write>,
) -> Result<Outcome, CliError> {
    let tiles: Vec<TileId> = args.selection.resolve()?;
    if tiles.is_empty() {
        return Err(BatchError::NothingSelected.into());
    }
    session.select_tiles(tiles);
    let dest = output_dir(args.output.as_deref())?;

    let mut report = run_batch(session, &dest, prompt, interrupt, &mut progress)?;

    let failed = report.failed_tiles();
    if args.retry_failed && report.state == BatchState::Completed && !failed.is_empty() {
        info!("Retrying {} failed tile(s)", failed.len());
        session.select_tiles(failed);
        // Failed tiles never leave a final file, so nothing can collide.
        let mut no_conflicts = FixedChoice(ConflictChoice::SkipExisting);
        let retry = run_batch(session, &dest, &mut no_conflicts, interrupt, &mut progress)?;
        report = merge_retry(report, retry);
    }

    for job in report.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        if let Some(err) = &job.error {
            warn!("{}: {}", job.tile.file_name(), err);
        }
    }

    if let Some(path) = &args.report {
        write_report(path, &report)?;
        info!("Report written to {}", path.display());
    }

    Ok(Outcome::from_report(&report))
}

fn write_report(path: &Path, report: &BatchReport) -> Result<(), CliError> {
    let to_err = |source: std::io::Error| CliError::Report {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::create(path).map_err(to_err)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| to_err(e.into()))?;
    writer.flush().map_err(to_err)
}

/// Entry point shared by the binary: dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<Outcome, CliError> {
    match &cli.command {
        Command::List(args) => {
            let config = load_config(cli.config.as_deref(), &args.overrides)?;
            run_list(args, &config, &mut std::io::stdout().lock())
        }
        Command::Download(args) => {
            let config = load_config(cli.config.as_deref(), &args.overrides)?;
            let interrupt = Interrupt::install()?;
            let mut session = Session::new(config)?;
            let mut prompt: Box<dyn ConflictPrompt> = match args.on_conflict.fixed() {
                Some(choice) => Box::new(FixedChoice(choice)),
                None => Box::new(LinePrompt::new(std::io::stdin().lock(), std::io::stderr())),
            };
            let progress = ProgressRenderer::new(std::io::stderr(), true);
            run_download(args, &mut session, prompt.as_mut(), Some(&interrupt), progress)
        }
    }
}
