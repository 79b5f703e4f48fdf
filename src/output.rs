use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunReport, UnitStatus};
use crate::domain::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Console,
    Json,
}

/// Prints each progress event as one line on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        println!("{event}");
    }
}

impl ConsoleOutput {
    pub fn print_summary(report: &RunReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let written = report.artifacts().count();
        let failed = report.queries.iter().filter(|query| query.failed()).count();
        println!("{cyan}📦 collection summary{reset}");
        println!("{green}✅ artifacts written: {written}{reset}");
        if failed > 0 {
            println!("{red}❌ queries with failures: {failed}{reset}");
        }
        if written == 0 {
            println!("{yellow}⚠️  no data to save{reset}");
        }

        for query in &report.queries {
            let color = if query.failed() {
                red
            } else if query.artifact.is_some() {
                green
            } else {
                yellow
            };
            println!("{color}• {} ({} records){reset}", query.query, query.records);
            for unit in &query.units {
                let status = match &unit.status {
                    UnitStatus::Success { records } => format!("{records} records"),
                    UnitStatus::Empty => "empty".to_string(),
                    UnitStatus::Exhausted { reason } => format!("failed: {reason}"),
                };
                println!("{color}   {} -> {status}{reset}", unit.unit);
            }
            if let Some(artifact) = &query.artifact {
                println!("{color}   📁 {}{reset}", artifact.path);
            }
            if let Some(error) = &query.persist_error {
                println!("{red}   {error}{reset}");
            }
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_catalog(catalog: &[WorkItem]) -> io::Result<()> {
        Self::print_json(&catalog)
    }

    pub fn print_urls(urls: &[(String, String)]) -> io::Result<()> {
        #[derive(Serialize)]
        struct Entry<'a> {
            unit: &'a str,
            url: &'a str,
        }
        let entries: Vec<_> = urls
            .iter()
            .map(|(unit, url)| Entry { unit, url })
            .collect();
        Self::print_json(&entries)
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
