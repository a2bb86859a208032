use std::io::{self, Write};

use serde::Serialize;

use crate::app::{Action, GrabResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_grab(result: &GrabResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    /// Listing lines in list mode, a short summary otherwise.
    pub fn print_grab(result: &GrabResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_grab(&mut stdout, result)
    }

    pub fn write_grab<W: Write>(out: &mut W, result: &GrabResult) -> io::Result<()> {
        if result.list_only {
            for item in &result.items {
                writeln!(out, "{}", item.list_line())?;
            }
        } else {
            let count = |action: Action| {
                result
                    .items
                    .iter()
                    .filter(|item| item.action == action)
                    .count()
            };
            writeln!(
                out,
                "{}: {} downloaded, {} skipped",
                result.repository,
                count(Action::Downloaded),
                count(Action::Skipped)
            )?;
            for item in &result.items {
                let action = match item.action {
                    Action::Downloaded => "downloaded",
                    Action::Skipped => "skipped",
                    Action::Listed => "listed",
                };
                writeln!(out, "  {} ({action}) {}", item.accession, item.files.join(","))?;
            }
        }
        if let Some(path) = &result.metadata_path {
            writeln!(out, "metadata: {path}")?;
        }
        Ok(())
    }
}
