//! Result printing.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;

use v2x_core::Outcome;
use v2x_trust::{RunSummary, Scenario, TallySummary};

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable, colored
    #[default]
    Pretty,
    /// JSON output
    Json,
}

/// Print the outcome of a `query` run.
pub fn print_run(
    format: OutputFormat,
    scenario: Scenario,
    run: &RunSummary,
    tally: &TallySummary,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let value = json!({
                "scenario": scenario,
                "completed": run.completed,
                "attempts": run.attempts,
                "timeouts": run.timeouts,
                "listener_failures": run.listener_failures,
                "elapsed_ms": u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX),
                "tally": tally,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Pretty => {
            println!(
                "{} scenario {} ({})",
                "Finished:".green().bold(),
                scenario.number(),
                scenario.to_string().cyan()
            );
            println!(
                "  {} {}   {} {}   {} {}",
                "rounds:".bold(),
                run.completed,
                "attempts:".bold(),
                run.attempts,
                "timeouts:".bold(),
                run.timeouts
            );
            println!();
            for outcome in Outcome::ALL {
                let count = tally.counts.get(&outcome).copied().unwrap_or(0);
                let label = format!("{:<22}", outcome.label());
                let label = if outcome.is_trusted() {
                    label.green()
                } else {
                    label.red()
                };
                println!("  {label} {count}");
            }
            println!();
            println!("  {} {:.1}%", "trusted:".bold(), tally.trusted_percent);
            print_mean("process response", tally.mean_process_ms);
            print_mean("round trip", tally.mean_round_trip_ms);
            print_mean("send query", tally.mean_send_ms);
        }
    }
    Ok(())
}

fn print_mean(label: &str, value: Option<f64>) {
    let shown = value.map_or_else(|| "-".dimmed().to_string(), |ms| format!("{ms:.3} ms"));
    println!("  {} {shown}", format!("{label}:").bold());
}

/// Print a single key/value result line.
pub fn print_field(format: OutputFormat, key: &str, value: impl Serialize + std::fmt::Display) {
    match format {
        OutputFormat::Json => println!("{}", json!({ key: value })),
        OutputFormat::Pretty => println!("{} {value}", format!("{key}:").bold()),
    }
}
