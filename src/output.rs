use std::io::{self, Write};

use serde::Serialize;

use crate::orchestrator::RunReport;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::registry::MergeReport;
use crate::summary::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &Summary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_merge(report: &MergeReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &Summary) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        Self::write_summary(&mut stdout, summary)
    }

    pub fn write_summary(out: &mut impl Write, summary: &Summary) -> io::Result<()> {
        writeln!(out, "Total links:  {}", summary.total)?;
        writeln!(out, "  completed:  {}", summary.completed)?;
        writeln!(out, "  failed:     {}", summary.failed)?;
        writeln!(out, "  error:      {}", summary.error)?;
        writeln!(out, "  pending:    {}", summary.pending)?;
        if summary.processing > 0 {
            writeln!(out, "  processing: {} (interrupted, will resume)", summary.processing)?;
        }
        for (kind, count) in &summary.by_provider {
            writeln!(out, "  {kind}: {count}")?;
        }
        for group in &summary.rows {
            writeln!(out, "Row {}:", group.row)?;
            for link in &group.links {
                write!(out, "  {} [{}] {} {}", link.id, link.status, link.provider, link.url)?;
                if let Some(error) = &link.error {
                    write!(out, " ({error})")?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

pub struct TextProgress;

impl ProgressSink for TextProgress {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event {
            ProgressEvent::LinkStarted {
                id,
                index,
                total,
                kind,
                url,
            } => writeln!(stderr, "[{}/{}] {id} ({kind}) {url}", index + 1, total),
            ProgressEvent::Step { step } => writeln!(stderr, "    {}", step.as_str()),
            ProgressEvent::Download { file, bytes } => {
                writeln!(stderr, "    downloading {file}: {bytes} bytes")
            }
            ProgressEvent::Extracted { entries } => {
                writeln!(stderr, "    extracted {entries} file(s)")
            }
            ProgressEvent::LinkFinished { id, status, detail } => match detail {
                Some(detail) => writeln!(stderr, "    {id}: {status} ({detail})"),
                None => writeln!(stderr, "    {id}: {status}"),
            },
            ProgressEvent::Pacing { delay } => {
                writeln!(stderr, "    waiting {}s before the next link", delay.as_secs())
            }
        };
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(io::stderr(), "{line}");
        }
    }
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json { OutputMode::Json } else { OutputMode::Text }
    }

    pub fn progress(self) -> &'static dyn ProgressSink {
        match self {
            OutputMode::Json => &JsonOutput,
            OutputMode::Text => &TextProgress,
        }
    }
}
