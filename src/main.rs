use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use ratewarden::config::WardenConfig;
use ratewarden::Limiter;

/// Run client identifiers through a configured rate limiter.
#[derive(Debug, Parser)]
#[command(name = "ratewarden", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter, overriding the configured level (ignored when RUST_LOG is set)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Client identifiers to check; read one per line from stdin when empty
    clients: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = WardenConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_tracing(level, cli.json)?;

    info!("Starting Ratewarden");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = config.limiter.build().context("failed to build limiter")?;
    info!(algorithm = %limiter.algorithm(), "Rate limiter initialized");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tally = Tally::default();

    if cli.clients.is_empty() {
        debug!("Reading client identifiers from stdin");
        for line in io::stdin().lock().lines() {
            let line = line.context("failed to read stdin")?;
            let client = line.trim();
            if client.is_empty() {
                continue;
            }
            tally.check(&limiter, client, &mut out)?;
        }
    } else {
        for client in &cli.clients {
            tally.check(&limiter, client, &mut out)?;
        }
    }

    tally.write_summary(&mut out)?;
    info!(
        admitted = tally.admitted,
        rejected = tally.rejected,
        "Ratewarden finished"
    );
    Ok(())
}

/// Running count of decisions.
#[derive(Debug, Default)]
struct Tally {
    admitted: u64,
    rejected: u64,
}

impl Tally {
    fn check(
        &mut self,
        limiter: &impl Limiter,
        client: &str,
        out: &mut impl Write,
    ) -> io::Result<()> {
        if limiter.allow(client) {
            self.admitted += 1;
            writeln!(out, "{}\tallowed", client)
        } else {
            self.rejected += 1;
            writeln!(out, "{}\trejected", client)
        }
    }

    fn write_summary(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "admitted={} rejected={}", self.admitted, self.rejected)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {:?}", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
