use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(
    name = "ecfr",
    version,
    about = "Electronic Code of Federal Regulations bulk-data ingestion and search"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(long, global = true, env = "ECFR_DB_PATH", default_value = "data/ecfr.db")]
    pub db_path: PathBuf,

    #[arg(long, global = true, env = "ECFR_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    InitDb(InitDbArgs),
    Scrape(ScrapeArgs),
    CheckUpdates(CheckUpdatesArgs),
    Stats(StatsArgs),
    Search(SearchArgs),
    Backup(BackupArgs),
    Vacuum,
    ListTitles(ListTitlesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InitDbArgs {
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = clap::value_parser!(u32).range(1..=50)
    )]
    pub titles: Vec<u32>,

    #[arg(long, default_value_t = false)]
    pub force: bool,

    #[arg(long, default_value_t = false, conflicts_with = "titles")]
    pub incremental: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CheckUpdatesArgs {
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = clap::value_parser!(u32).range(1..=50)
    )]
    pub titles: Vec<u32>,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 1000)]
    pub retry_delay_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub request_delay_ms: u64,

    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = false)]
    pub no_validate: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    pub query: String,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    pub destination: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ListTitlesArgs {
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub title: Option<u32>,
}
