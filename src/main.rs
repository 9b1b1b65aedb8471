use std::path::PathBuf;

use clap::{Parser, Subcommand};
use difysync::{
   Error, Result,
   cmd::{self, config::SaveArgs},
   remote::ListQuery,
};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the difysync application
#[derive(Parser)]
#[command(name = "difysync")]
#[command(about = "Sync file store directories into Dify knowledge bases")]
#[command(version)]
struct Cli {
   #[arg(long, global = true, env = "DIFYSYNC_CONFIG", help = "Config file (default: ~/.difysync/config.toml)")]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for difysync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Reconcile mappings, then sync changes until interrupted")]
   Watch,

   #[command(about = "Upload every file under the configured mappings")]
   Scan {
      #[arg(long, help = "Only scan the mapping with this local path")]
      mapping: Option<String>,

      #[arg(short, long, help = "Hide the progress bar")]
      quiet: bool,
   },

   #[command(about = "Show or change settings")]
   Config {
      #[command(subcommand)]
      action: ConfigCmd,
   },

   #[command(about = "Print the document identifier for a store path")]
   Name {
      #[arg(help = "Store path, e.g. /alice/files/reports/q1.md")]
      path: String,

      #[arg(long, help = "Modification time in unix seconds (default: now)")]
      mtime: Option<i64>,

      #[arg(long, help = "Naming pattern (default: configured)")]
      pattern: Option<String>,
   },

   #[command(about = "List documents of a dataset")]
   Docs {
      #[arg(help = "Dataset id")]
      dataset: String,

      #[arg(short, long, help = "Filter by name keyword")]
      keyword: Option<String>,

      #[arg(long, default_value = "1")]
      page: u32,

      #[arg(long, default_value = "20", help = "Page size (1-100)")]
      limit: u32,

      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Validate settings and probe mapped datasets")]
   Check {
      #[arg(long, help = "JSON output")]
      json: bool,
   },
}

#[derive(Subcommand)]
enum ConfigCmd {
   #[command(about = "Print current settings")]
   Get,

   #[command(about = "Update settings")]
   Save {
      #[arg(long, help = "Dify base URL")]
      url: Option<String>,

      #[arg(long, help = "Dataset API key")]
      api_key: Option<String>,

      #[arg(long, help = "Naming pattern")]
      pattern: Option<String>,

      #[arg(long = "map", value_name = "PATH=DATASET", help = "Add or replace a mapping")]
      map: Vec<String>,

      #[arg(long, help = "Remove existing mappings first")]
      clear_mappings: bool,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(
         EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("difysync=info")),
      )
      .with_writer(std::io::stderr)
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      if !matches!(err, Error::Reported { .. }) {
         eprintln!("{err}");
      }
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   match cli.command {
      Cmd::Watch => cmd::watch::execute(cli.config).await,
      Cmd::Scan { mapping, quiet } => cmd::scan::execute(cli.config, mapping, quiet).await,
      Cmd::Config { action: ConfigCmd::Get } => cmd::config::get(cli.config),
      Cmd::Config {
         action: ConfigCmd::Save { url, api_key, pattern, map, clear_mappings },
      } => cmd::config::save(cli.config, SaveArgs { url, api_key, pattern, map, clear_mappings }),
      Cmd::Name { path, mtime, pattern } => {
         cmd::name::execute(cli.config, &path, mtime, pattern.as_deref())
      },
      Cmd::Docs { dataset, keyword, page, limit, json } => {
         cmd::docs::execute(cli.config, &dataset, ListQuery { keyword, page, limit }, json).await
      },
      Cmd::Check { json } => cmd::check::execute(cli.config, json).await,
   }
}
