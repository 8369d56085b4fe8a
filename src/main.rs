use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use treesync::config::{BackendSpec, Config};
use treesync::sync::{
    ChangeSet, SyncEngine, SyncObserver, SyncReport, TransferOp, TransferOutcome,
};

#[derive(Parser)]
#[command(name = "treesync", version, about = "Replicate one storage tree onto another")]
struct Cli {
    /// Config file (default: <config-dir>/treesync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local directory to use as the master tree, overriding the config
    #[arg(long, global = true)]
    master: Option<PathBuf>,

    /// Local directory to use as the slave tree, overriding the config
    #[arg(long, global = true)]
    slave: Option<PathBuf>,

    /// Extra exclusion prefix, repeatable
    #[arg(long = "exclude", global = true, value_name = "PREFIX")]
    excludes: Vec<String>,

    /// Print the result as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push master changes to the slave. Never deletes.
    Sync { folder: Option<String> },
    /// Copy entries missing on the master back from the slave.
    Restore { folder: Option<String> },
    /// Delete slave entries absent from the master. Destructive.
    Prune {
        folder: Option<String>,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show what a sync would transfer, without touching either tree.
    Plan { folder: Option<String> },
}

/// Progress-bar sink for interactive runs; one bar per phase.
struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl SyncObserver for ProgressObserver {
    fn on_phase(&self, op: TransferOp, total: usize) {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template("{msg:8} {bar:30} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(op.to_string());

        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.take() {
                previous.finish_and_clear();
            }
            if total > 0 {
                *slot = Some(bar);
            }
        }
    }

    fn on_outcome(&self, outcome: &TransferOutcome) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(1);
                if outcome.failed() {
                    bar.println(format!("failed: {} {}", outcome.op, outcome.path));
                }
            }
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    if let (Some(master), Some(slave)) = (&cli.master, &cli.slave) {
        return Ok(Config {
            master: BackendSpec::Local { root: master.clone() },
            slave: BackendSpec::Local { root: slave.clone() },
            sync: Default::default(),
        });
    }

    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(master) = &cli.master {
        config.master = BackendSpec::Local { root: master.clone() };
    }
    if let Some(slave) = &cli.slave {
        config.slave = BackendSpec::Local { root: slave.clone() };
    }
    Ok(config)
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let classes = [
        ("writes", &report.writes),
        ("updates", &report.updates),
        ("recovers", &report.recovers),
        ("deletes", &report.deletes),
    ];
    for (name, counts) in classes {
        if counts.attempted > 0 {
            println!(
                "{:8} {} attempted, {} succeeded, {} failed",
                name, counts.attempted, counts.succeeded, counts.failed
            );
        }
    }
    println!(
        "{} copied in {:.1}s",
        humansize::format_size(report.bytes_copied, humansize::BINARY),
        report.elapsed_ms as f64 / 1000.0
    );

    for failure in &report.failures {
        eprintln!("failed {} {}: {}", failure.op, failure.path, failure.reason);
    }

    Ok(())
}

fn print_plan(changes: &ChangeSet, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(changes)?);
        return Ok(());
    }

    for entry in &changes.writes {
        println!("+ {} ({})", entry.path, entry.format_size());
    }
    for entry in &changes.updates {
        println!("~ {} ({})", entry.path, entry.format_size());
    }
    for entry in &changes.deletes {
        println!("- {} (slave only; sync keeps it, prune removes it)", entry.path);
    }
    println!(
        "{} writes, {} updates, {} slave-only entries",
        changes.writes.len(),
        changes.updates.len(),
        changes.deletes.len()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    let master = config.master.build()?;
    let slave = config.slave.build()?;

    let mut options = config.sync_options()?;
    for prefix in &cli.excludes {
        options.scope = options.scope.with_exclude(prefix)?;
    }

    let mut engine = SyncEngine::new(master, slave, options);

    let progress = Arc::new(ProgressObserver::new());
    if !cli.json {
        engine = engine.with_observer(progress.clone());
    }

    let report = match &cli.command {
        Command::Sync { folder } => Some(engine.sync(folder.as_deref()).await?),
        Command::Restore { folder } => Some(engine.restore(folder.as_deref()).await?),
        Command::Prune { folder, yes } => {
            if !yes {
                bail!("prune deletes slave entries absent from the master; re-run with --yes to confirm");
            }
            Some(engine.prune(folder.as_deref()).await?)
        }
        Command::Plan { folder } => {
            let changes = engine.plan(folder.as_deref()).await?;
            progress.finish();
            print_plan(&changes, cli.json)?;
            None
        }
    };

    if let Some(report) = report {
        progress.finish();
        print_report(&report, cli.json)?;
        if !report.is_clean() {
            std::process::exit(1);
        }
    }

    Ok(())
}
