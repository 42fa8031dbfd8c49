//! ocsprenewer - Main entry point
//!
//! Renews OCSP staples once, or keeps them fresh forever with `--persist`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{info, warn};

use ocsprenewer::signals::spawn_signal_forwarder;
use ocsprenewer::{Renewer, Scheduler};
use ocsprenewer_config::{lint_config, Config};

/// Pause before a persistent run exits on error
const PERSIST_EXIT_PAUSE: Duration = Duration::from_secs(1);

/// ocsprenewer - keep OCSP staples fresh
#[derive(Parser, Debug)]
#[command(name = "ocsprenewer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML); flags override its values
    #[arg(short = 'c', long = "config", env = "OCSPRENEWER_CONFIG")]
    config: Option<PathBuf>,

    /// Keep running and renew staples as they age
    #[arg(short = 'p', long = "persist")]
    persist: bool,

    /// One-shot: only renew staples that need it
    #[arg(long = "if-needed")]
    if_needed: bool,

    /// Persistent: renew everything at start-up
    #[arg(long = "now")]
    now: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Neither query responders nor write staples
    #[arg(short = 'n', long = "not-really")]
    not_really: bool,

    /// Input paths are directories to scan
    #[arg(long = "dirs")]
    dirs: bool,

    /// Directory to write staples into
    #[arg(short = 'o', long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Staple filename extension
    #[arg(long = "extension")]
    extension: Option<String>,

    /// Renew after this fraction (or percentage) of a staple's lifetime
    #[arg(long = "timer-t1")]
    timer_t1: Option<f64>,

    /// Skip certificates without OCSP information in directory scans
    #[arg(long = "allow-nonocsp-in-dir")]
    allow_nonocsp_in_dir: bool,

    /// Space-separated certificate extensions for directory scans
    #[arg(long = "cert-extensions")]
    cert_extensions: Option<String>,

    /// Filename suffix to exclude from directory scans (repeatable)
    #[arg(long = "exclude-suffix")]
    exclude_suffix: Vec<String>,

    /// Directory of issuer certificates (repeatable)
    #[arg(long = "issuer-dir")]
    issuer_dir: Vec<PathBuf>,

    /// Certificate files, or directories with --dirs
    paths: Vec<PathBuf>,
}

impl Cli {
    /// Overlay command-line values onto a base configuration
    fn apply(&self, mut config: Config) -> Config {
        config.directories |= self.dirs;
        config.allow_non_ocsp_in_dir |= self.allow_nonocsp_in_dir;
        if let Some(dir) = &self.out_dir {
            config.output_dir = dir.clone();
        }
        if let Some(ext) = &self.extension {
            config.extension = ext.clone();
        }
        if let Some(t1) = self.timer_t1 {
            config.timer_t1 = t1;
        }
        if let Some(exts) = &self.cert_extensions {
            config.cert_extensions = exts.clone();
        }
        if !self.exclude_suffix.is_empty() {
            config.exclude_suffixes = self.exclude_suffix.clone();
        }
        if !self.issuer_dir.is_empty() {
            config.issuer_dirs = self.issuer_dir.clone();
        }
        if !self.paths.is_empty() {
            config.input_paths = self.paths.clone();
        }

        config.immediate = if self.persist {
            config.immediate || self.now
        } else {
            config.immediate || !self.if_needed
        };
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(run(&cli));

    if result.is_err() && cli.persist {
        std::thread::sleep(PERSIST_EXIT_PAUSE);
    }
    result
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let base = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => Config::default(),
    };

    let config = cli
        .apply(base)
        .validate()
        .context("Configuration validation failed")?;

    for warning in lint_config(&config) {
        warn!("{}", warning);
    }

    let renewer = Renewer::new(config).context("Failed to set up renewer")?;
    renewer.set_not_really(cli.not_really);

    if !cli.persist {
        let immediate = renewer.config().immediate;
        let summary = renewer.one_shot(immediate).await?;
        info!(
            renewed = summary.renewed,
            not_due = summary.not_due,
            skipped = summary.skipped,
            dry_run = summary.dry_run,
            "Done"
        );
        return Ok(());
    }

    renewer
        .basic_checks()
        .context("Start-up checks failed")?;

    let renewer = Arc::new(renewer);
    spawn_signal_forwarder(renewer.clone()).context("Failed to register signal handlers")?;
    let scheduler = Scheduler::new(renewer).context("Failed to start scheduler")?;

    info!("ocsprenewer running persistently");
    scheduler.run().await;
    Ok(())
}
