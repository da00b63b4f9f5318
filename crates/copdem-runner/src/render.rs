//! Terminal rendering of batch events.

use copdem_download::{DownloadEvent, JobStatus, Progress, ProgressMode};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// Resolution of the batch bar. The batch fraction maps onto `0..=BAR_STEPS`.
const BAR_STEPS: u64 = 1000;

const BYTES_TEMPLATE: &str = "[{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}";
const TILES_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.green/white}] {percent:>3}% of tiles {msg}";

/// Human-readable size, e.g. `12.3 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if (bytes as f64) < MIB {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB)
    }
}

/// Bar message for the tile being transferred.
pub fn progress_message(current_tile: &str, job: &Progress) -> String {
    match job {
        Progress::Known { done, total } => {
            format!("{} {} / {}", current_tile, format_bytes(*done), format_bytes(*total))
        }
        Progress::Unknown { done } => format!("{} {} / ?", current_tile, format_bytes(*done)),
    }
}

fn bar_style(mode: ProgressMode) -> ProgressStyle {
    let (template, chars) = match mode {
        ProgressMode::Bytes => (BYTES_TEMPLATE, "=>-"),
        ProgressMode::Tiles => (TILES_TEMPLATE, "##-"),
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(chars)
}

/// Draws batch events as an `indicatif` bar with status lines above it.
///
/// When the bar cannot be drawn (hidden target, stderr not a terminal) the
/// status lines go to `out` instead.
pub struct ProgressRenderer<W> {
    out: W,
    draw: bool,
    bar: Option<ProgressBar>,
}

impl<W: Write> ProgressRenderer<W> {
    /// `draw` selects a stderr bar; otherwise the bar is hidden.
    pub fn new(out: W, draw: bool) -> Self {
        Self { out, draw, bar: None }
    }

    fn start_bar(&self, mode: ProgressMode) -> ProgressBar {
        let target = if self.draw {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(BAR_STEPS), target);
        bar.set_style(bar_style(mode));
        if mode == ProgressMode::Tiles && !bar.is_hidden() {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        bar
    }

    fn line(&mut self, text: &str) -> std::io::Result<()> {
        match &self.bar {
            Some(bar) if !bar.is_hidden() => {
                bar.println(text);
                Ok(())
            }
            _ => writeln!(self.out, "{}", text),
        }
    }

    /// Render one event. Returns `true` once the batch has finished.
    pub fn handle(&mut self, event: &DownloadEvent) -> std::io::Result<bool> {
        match event {
            DownloadEvent::BatchProgress {
                fraction,
                mode,
                current_tile,
                job,
            } => {
                let bar = match self.bar.take() {
                    Some(bar) => bar,
                    None => self.start_bar(*mode),
                };
                bar.set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64);
                bar.set_message(progress_message(current_tile, job));
                self.bar = Some(bar);
                Ok(false)
            }
            DownloadEvent::TileStatusChanged { tile, status } => {
                let label = match status {
                    JobStatus::Done => "done",
                    JobStatus::Skipped => "skipped (exists)",
                    JobStatus::Failed => "FAILED",
                    JobStatus::Cancelled => "cancelled",
                    JobStatus::Pending | JobStatus::InProgress => return Ok(false),
                };
                self.line(&format!("{:<48} {}", tile.file_name(), label))?;
                Ok(false)
            }
            DownloadEvent::BatchFinished { state, tally } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                writeln!(self.out, "Batch {:?}: {}", state, tally)?;
                self.out.flush()?;
                Ok(true)
            }
        }
    }
}
