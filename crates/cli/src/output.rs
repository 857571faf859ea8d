// Output formatting for CLI

use anyhow::{Context, Result};
use revive_engine::{JobOutcome, JobStatus, RunReport};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                let json =
                    serde_json::to_string_pretty(value).context("Failed to serialize output")?;
                println!("{json}");
            }
            OutputFormat::Text => {
                // Text format is handled by the caller
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print the final report in the requested format
pub fn print_report(report: &RunReport, output: OutputFormat) -> Result<()> {
    if !output.is_text() {
        return output.print_value(report);
    }

    if report.is_empty() {
        println!("No jobs run");
        return Ok(());
    }

    print_table_header(&[
        ("JOB", 16),
        ("STATUS", 12),
        ("ATTEMPTS", 8),
        ("DONE", 6),
        ("LEFT", 6),
    ]);
    for outcome in report.jobs.values() {
        print_outcome(outcome);
    }

    println!();
    print_field(
        "Completed",
        &format!("{}/{}", report.count(JobStatus::Completed), report.len()),
    );
    for status in [
        JobStatus::Abandoned,
        JobStatus::Faulted,
        JobStatus::Interrupted,
    ] {
        let count = report.count(status);
        if count > 0 {
            print_field(&capitalize(&status.to_string()), &count.to_string());
        }
    }
    print_field("Attempts", &report.total_attempts().to_string());
    print_field(
        "Elapsed",
        &format!("{:.2}s", report.elapsed().num_milliseconds() as f64 / 1000.0),
    );

    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    let status = outcome.status.to_string();
    let attempts = outcome.attempts.to_string();
    let completed = outcome.completed_units.to_string();
    let remaining = outcome.remaining_units.to_string();
    print_table_row(&[
        (outcome.job_id.as_str(), 16),
        (&status, 12),
        (&attempts, 8),
        (&completed, 6),
        (&remaining, 6),
    ]);
    if let Some(fault) = &outcome.fault {
        println!("  fault: {fault}");
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| {
            let s = if val.chars().count() > *width {
                let cut: String = val.chars().take(width.saturating_sub(3)).collect();
                format!("{cut}...")
            } else {
                val.to_string()
            };
            format!("{:<width$}", s, width = width)
        })
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}
