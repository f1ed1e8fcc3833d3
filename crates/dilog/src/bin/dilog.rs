//! Offline tooling for `.dilog` trace files.
//!
//! # Usage
//!
//! ```bash
//! # Per-prefix statistics for a recorded trace
//! dilog summary --trace mychannel.dilog
//!
//! # Indented block tree
//! dilog tree --trace mychannel.dilog
//!
//! # Check that one recorded run matches another up to reordered
//! # loop iterations
//! dilog verify-pair --reference run1/c.dilog --candidate run2/c.dilog
//! ```

use clap::{Parser, Subcommand};
use dilog::inspect;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dilog")]
#[command(about = "Inspect and compare divergence-detection trace files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show summary statistics for a trace file.
    Summary {
        /// Path to the trace file.
        #[arg(short, long)]
        trace: PathBuf,

        /// Emit the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render the block tree of a trace file.
    Tree {
        /// Path to the trace file.
        #[arg(short, long)]
        trace: PathBuf,
    },

    /// Verify that one recorded trace matches another up to reordered
    /// block iterations.
    VerifyPair {
        /// The trace treated as canonical.
        #[arg(short, long)]
        reference: PathBuf,

        /// The trace replayed against the reference.
        #[arg(short, long)]
        candidate: PathBuf,

        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Summary { trace, json } => cmd_summary(&trace, json),
        Commands::Tree { trace } => cmd_tree(&trace),
        Commands::VerifyPair {
            reference,
            candidate,
            json,
        } => cmd_verify_pair(&reference, &candidate, json),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("dilog: {err}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_summary(trace: &PathBuf, json: bool) -> Result<ExitCode, dilog::DilogError> {
    let summary = inspect::summarize(trace)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary).map_err(std::io::Error::other)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", summary.file);
    println!(
        "  {} lines: {} messages, {} opens, {} closes (max depth {})",
        summary.lines, summary.messages, summary.opens, summary.closes, summary.max_depth
    );
    if !summary.iterations.is_empty() {
        println!("  iterations per block:");
        for (prefix, count) in &summary.iterations {
            println!("    {prefix:<40} {count}");
        }
    }
    if !summary.malformed.is_empty() {
        let lines: Vec<String> = summary.malformed.iter().map(u64::to_string).collect();
        println!("  malformed lines: {}", lines.join(", "));
    }
    if !summary.balanced {
        println!("  WARNING: open/close frames are not balanced");
    }
    Ok(if summary.balanced && summary.malformed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_tree(trace: &PathBuf) -> Result<ExitCode, dilog::DilogError> {
    print!("{}", inspect::render_tree(trace)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify_pair(
    reference: &PathBuf,
    candidate: &PathBuf,
    json: bool,
) -> Result<ExitCode, dilog::DilogError> {
    let report = inspect::verify_pair(reference, candidate)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report).map_err(std::io::Error::other)?);
    } else if report.matched {
        println!(
            "MATCH: {} verified against {} ({} lines)",
            candidate.display(),
            reference.display(),
            report.lines_verified
        );
    } else {
        println!(
            "DIVERGED after {} lines: {}",
            report.lines_verified,
            report.divergence.as_deref().unwrap_or("unknown")
        );
    }
    Ok(if report.matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
