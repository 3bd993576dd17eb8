//! CLI entrypoint for the heapcensus harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use heapcensus_core::ExpectationReport;
use heapcensus_core::structured_log::validate_log_file;
use heapcensus_fixtures::scenarios;
use heapcensus_harness::{AnalysisResult, DEFAULT_TOLERANCE, validate_analysis};

/// Planning and validation tooling for heap census fixtures.
#[derive(Debug, Parser)]
#[command(name = "heapcensus-harness")]
#[command(about = "Plans fixture censuses and validates analyzer results")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every fixture scenario.
    List,
    /// Print the expectation report of a scenario without running it.
    Plan {
        /// Scenario name (see `list`).
        #[arg(long)]
        scenario: String,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check an analyzer result against an expectation report.
    Validate {
        /// Expectation report written by a fixture or by `plan`.
        #[arg(long)]
        expected: PathBuf,
        /// Analyzer result JSON (`items: [{type, amount, avg_size}]`).
        #[arg(long)]
        analysis: PathBuf,
        /// Fraction of each expected count that must be recovered.
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
        /// Print the verdict as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Validate a structured JSONL fixture log.
    ValidateLog {
        /// Log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::List => {
            for scenario in &scenarios::CATALOG {
                println!("{:<18} {}", scenario.name, scenario.title);
            }
        }
        Command::Plan { scenario, output } => {
            let Some(found) = scenarios::find(&scenario) else {
                return Err(format!("unknown scenario '{scenario}' (try `list`)").into());
            };
            let report = ExpectationReport::plan_only(found.name, &found.expectations());
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    report.write_to(&path)?;
                    eprintln!("Wrote plan for {} to {}", found.name, path.display());
                }
                None => println!("{}", report.to_json()?),
            }
        }
        Command::Validate {
            expected,
            analysis,
            tolerance,
            json,
        } => {
            let report = ExpectationReport::read_from(&expected)?;
            let result = AnalysisResult::read_from(&analysis)?;
            let verdict = validate_analysis(&report, &result, tolerance)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print!("{}", verdict.render());
            }
            if !verdict.passed {
                let failed = verdict.checks.iter().filter(|c| !c.passed).count();
                return Err(format!("analyzer validation failed: {failed} check(s)").into());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            if !errors.is_empty() {
                return Err(format!("{} invalid field(s) in {lines} line(s)", errors.len()).into());
            }
            println!("{lines} log line(s) valid");
        }
    }

    Ok(())
}
