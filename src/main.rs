mod cli;
mod commands;
mod config;
mod error;
mod ingest;
mod model;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;

    match cli.command {
        Commands::InitDb(args) => commands::database::init_db(&global, args),
        Commands::Scrape(args) => commands::scrape::run(&global, args),
        Commands::CheckUpdates(args) => commands::check_updates::run(&global, args),
        Commands::Stats(args) => commands::stats::run(&global, args),
        Commands::Search(args) => commands::search::run(&global, args),
        Commands::Backup(args) => commands::database::backup(&global, args),
        Commands::Vacuum => commands::database::vacuum(&global),
        Commands::ListTitles(args) => commands::titles::run(&global, args),
    }
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
