//! Outcome rendering for `offload run`

use anyhow::Result;
use colored::Colorize;
use offload_core::application::TaskReport;
use offload_core::domain::Outcome;

/// Print the report as pretty JSON
pub fn print_json(report: &TaskReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Print the report as colored text
pub fn print_text(report: &TaskReport) {
    match &report.outcome {
        Outcome::Success { value } => {
            println!("{} {}", "✓".green().bold(), value);
        }
        Outcome::Failure { failure } => {
            println!(
                "{} {} {}",
                "✗".red().bold(),
                format!("[{}]", failure.kind).yellow(),
                failure.message
            );
        }
        Outcome::AbnormalTermination { code, detail } => {
            let mut line = format!("Worker stopped with exit code {}", code);
            if let Some(detail) = detail {
                line.push_str(&format!(" ({})", detail));
            }
            println!("{} {}", "✗".red().bold(), line);
        }
    }

    println!(
        "  {} {}  {} {}ms",
        "task".dimmed(),
        report.id.dimmed(),
        "duration".dimmed(),
        report.duration_ms
    );
}
