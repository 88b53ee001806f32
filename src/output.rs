use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    DeleteResult, IngestResult, PlanResult, ProgressEvent, ProgressSink, RegisteredFile,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(result: &IngestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_registered(result: &RegisteredFile) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_delete(result: &DeleteResult) -> io::Result<()> {
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

/// Prints progress lines as they happen.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let message = event
            .message
            .split_once("; ")
            .map(|(_, rest)| rest)
            .unwrap_or(&event.message);
        match event.elapsed {
            Some(elapsed) => println!("{message} ({} ms)", elapsed.as_millis()),
            None => println!("{message}"),
        }
    }
}
