//! `arbiter`: score remediation plans with two LLM judges.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "arbiter", version, about = "Dual-judge remediation plan evaluation")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a batch of plans and print the batch result as JSON
    Evaluate(EvaluateArgs),

    /// Probe the configured judges' providers
    Probe(ConfigArgs),

    /// Validate a config file and print it with defaults filled in
    CheckConfig(ConfigArgs),
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Runtime config (YAML); defaults apply when omitted
    #[arg(short, long, env = "ARBITER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct EvaluateArgs {
    /// JSON file holding an array of plans
    #[arg(short, long)]
    plans: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace both judges with scripted providers
    #[arg(long)]
    dry_run: bool,

    /// Print plans ranked by final score instead of the full result
    #[arg(long)]
    ranked: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "arbiter=debug" } else { "arbiter=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // stdout carries JSON only
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Evaluate(args) => commands::evaluate(args).await,
        Commands::Probe(args) => commands::probe(args).await,
        Commands::CheckConfig(args) => commands::check_config(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate() {
        let cli = Cli::parse_from([
            "arbiter", "-v", "evaluate", "--plans", "plans.json", "--dry-run", "--ranked",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Evaluate(args) => {
                assert_eq!(args.plans, PathBuf::from("plans.json"));
                assert!(args.dry_run);
                assert!(args.ranked);
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
