mod cmd_discover;
mod cmd_lens;
mod cmd_run;
mod cmd_watch;
mod render;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use spectree_ginkgo::{RunnerConfig, Workspace};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spectree")]
#[command(about = "Discover, run, and watch Ginkgo specs as a test tree")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover suites and print the test tree
    Discover,
    /// Discover, then run one item and print statuses for it and its leaves
    Run {
        /// Item id, as printed by `discover`
        node_id: String,
    },
    /// List runnable items located in a test file
    Lens {
        /// Test file, absolute or relative to the root
        file: PathBuf,
    },
    /// Rediscover whenever a test file changes
    Watch {
        /// Exit after this many completed passes
        #[arg(long)]
        max_passes: Option<usize>,
    },
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (defaults to <root>/spectree.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ginkgo executable
    #[arg(long, global = true)]
    pub ginkgo: Option<String>,

    /// Extra environment variable for Ginkgo (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair, global = true)]
    pub env: Vec<(String, String)>,

    /// Build tags, comma separated
    #[arg(long, value_delimiter = ',', global = true)]
    pub tags: Vec<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at debug level (overridden by SPECTREE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

impl GlobalOpts {
    pub fn root(&self) -> Result<PathBuf> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("failed to read current directory")?,
        };
        std::fs::canonicalize(&root)
            .with_context(|| format!("workspace root {} is not accessible", root.display()))
    }

    /// Config file values with command-line overrides applied.
    pub fn runner_config(&self, root: &std::path::Path) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RunnerConfig::for_workspace(root),
        };
        if let Some(ginkgo) = &self.ginkgo {
            config = config.with_ginkgo_path(ginkgo.clone());
        }
        for (key, value) in &self.env {
            config = config.with_env(key.clone(), value.clone());
        }
        if !self.tags.is_empty() {
            config = config.with_build_tags(self.tags.iter().cloned());
        }
        Ok(config)
    }

    pub fn workspace(&self) -> Result<Workspace> {
        let root = self.root()?;
        let config = self.runner_config(&root)?;
        Ok(Workspace::new(root, config))
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SPECTREE_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.opts.verbose);

    match cli.command {
        Commands::Discover => cmd_discover::run(&cli.opts).await,
        Commands::Run { node_id } => cmd_run::run(&cli.opts, &node_id).await,
        Commands::Lens { file } => cmd_lens::run(&cli.opts, &file).await,
        Commands::Watch { max_passes } => cmd_watch::run(&cli.opts, max_passes).await,
    }
}
