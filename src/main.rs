mod chart;
mod config;
mod console;
mod sampler;
mod series;
mod signals;
mod target;
mod watcher;

use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::chart::render_watch_charts;
use crate::config::{ConfigError, GrapherConfig};
use crate::console::Console;
use crate::sampler::{SamplerCommand, SamplerError};
use crate::signals::install_signal_handlers;
use crate::target::collect_targets;
use crate::watcher::WatchSet;

/// Watch processes by pid or command-line pattern, sample their CPU, IO and
/// memory activity with pidstat, and render PNG charts when watching ends.
#[derive(Parser, Debug)]
#[command(name = "pidgraph", version, about)]
pub struct Cli {
    /// Pids to watch (separate by a comma)
    #[arg(short, long, value_name = "PIDS", value_delimiter = ',')]
    pids: Vec<i32>,

    /// Command-line patterns to watch, matched as regex fragments; useful
    /// when programs start later and their pid is unknown (separate by a comma)
    #[arg(short = 'a', long, value_name = "PATTERNS", value_delimiter = ',')]
    patterns: Vec<String>,

    /// Directory charts are written into
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Config file path (default: pidgraph.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extra logging (resolver attempts, sampler lifecycle)
    #[arg(short, long)]
    verbose: bool,
}

enum FatalError {
    Config(ConfigError),
    Sampler(SamplerError),
    OutputDir(PathBuf),
    NoTargets,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::Config(e) => write!(f, "{e}"),
            FatalError::Sampler(e) => write!(f, "{e}"),
            FatalError::OutputDir(path) => {
                write!(f, "output directory {} does not exist", path.display())
            }
            FatalError::NoTargets => {
                write!(f, "no watch targets given; use --pids or --patterns")
            }
        }
    }
}

impl fmt::Debug for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for FatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FatalError::Config(e) => Some(e),
            FatalError::Sampler(e) => Some(e),
            FatalError::OutputDir(_) | FatalError::NoTargets => None,
        }
    }
}

impl From<ConfigError> for FatalError {
    fn from(e: ConfigError) -> Self {
        FatalError::Config(e)
    }
}

impl From<SamplerError> for FatalError {
    fn from(e: SamplerError) -> Self {
        FatalError::Sampler(e)
    }
}

async fn run(cli: Cli) -> Result<(), FatalError> {
    let config = GrapherConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "resolved configuration");

    let sampler = SamplerCommand::from_config(&config.sampler);
    sampler.preflight()?;

    if !cli.directory.is_dir() {
        return Err(FatalError::OutputDir(cli.directory));
    }

    let targets = collect_targets(&cli.pids, &cli.patterns);
    if targets.is_empty() {
        return Err(FatalError::NoTargets);
    }

    let console = Console::stdout();
    console.note(&format!(
        "Press Ctrl-C to stop watching and render the charts in {}",
        cli.directory.display()
    ));

    let watch = WatchSet::spawn(targets, sampler, &config, console.clone());
    let signal_task = install_signal_handlers(watch.stop_handle(), console.clone());

    let results = watch.wait().await;
    signal_task.abort();

    let mut entries: Vec<_> = results.into_iter().collect();
    entries.sort_by_key(|(pid, _)| *pid);
    for (pid, series) in &entries {
        console.note(&format!(
            "Creating activity charts for pid {pid} ({})",
            series.cmdline
        ));
        match render_watch_charts(series, &cli.directory, &config.chart) {
            Ok(paths) => {
                for path in paths {
                    tracing::debug!(path = %path.display(), "chart written");
                }
            }
            Err(e) => {
                tracing::error!(pid, error = %e, "chart rendering failed");
                console.note(&format!("failed to render charts for pid {pid}: {e}"));
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        eprintln!("pidgraph: {e}");
        std::process::exit(1);
    }
}
