//! Terminal conflict prompt.

use copdem_download::{ConflictChoice, ConflictPrompt};
use std::io::{BufRead, Write};

/// Names shown before the list is truncated.
const MAX_LISTED: usize = 10;

/// Map a typed answer to a choice.
pub fn parse_choice(answer: &str) -> Option<ConflictChoice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "o" | "overwrite" => Some(ConflictChoice::OverwriteAll),
        "s" | "skip" => Some(ConflictChoice::SkipExisting),
        "c" | "cancel" => Some(ConflictChoice::CancelBatch),
        _ => None,
    }
}

/// Asks on a line-oriented terminal. End of input cancels the batch.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, conflicting: &[String]) -> std::io::Result<ConflictChoice> {
        writeln!(
            self.output,
            "{} file(s) already exist in the destination:",
            conflicting.len()
        )?;
        for name in conflicting.iter().take(MAX_LISTED) {
            writeln!(self.output, "  {}", name)?;
        }
        if conflicting.len() > MAX_LISTED {
            writeln!(self.output, "  ... and {} more", conflicting.len() - MAX_LISTED)?;
        }

        loop {
            write!(self.output, "[o]verwrite all, [s]kip existing, [c]ancel? ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(ConflictChoice::CancelBatch);
            }
            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => writeln!(self.output, "Please answer o, s or c.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> ConflictPrompt for LinePrompt<R, W> {
    fn decide(&mut self, conflicting: &[String]) -> ConflictChoice {
        self.ask(conflicting).unwrap_or_else(|e| {
            tracing::warn!("Conflict prompt failed ({}), cancelling batch", e);
            ConflictChoice::CancelBatch
        })
    }
}
