// Copyright 2026 Marketlens Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use marketlens_runtime::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "marketlens",
    about = "Marketlens: normalized product records from marketplace listing URLs",
    version,
    after_help = "Run 'marketlens <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a normalized record from a listing URL
    Extract {
        /// Listing URL
        url: String,
        /// JSON extraction config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only run these strategies (api, structured_metadata, browser). Can be repeated.
        #[arg(long = "only")]
        only: Vec<String>,
    },
    /// Check environment and effective configuration
    Doctor {
        /// JSON extraction config
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(json: bool, verbose: bool) {
    let default = if verbose {
        "marketlens_runtime=debug"
    } else {
        "marketlens_runtime=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    if cli.quiet {
        std::env::set_var(cli::output::QUIET_ENV, "1");
    }
    if cli.verbose {
        std::env::set_var(cli::output::VERBOSE_ENV, "1");
    }
    init_tracing(cli.json, cli.verbose);

    let result = match cli.command {
        Commands::Extract { url, config, only } => {
            cli::extract_cmd::run(&url, config.as_deref(), &only).await
        }
        Commands::Doctor { config } => cli::doctor::run(config.as_deref()).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "marketlens", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success (partial records included), 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
