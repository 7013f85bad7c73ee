use std::{
    io::{self, IsTerminal},
    path::PathBuf,
};

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use n8n_api::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use n8nback_sync::sync::{self, BackupReport, RestoreReport, StatusReport, VerifyReport};

#[derive(Parser, Debug)]
#[command(name = "n8nback")]
#[command(author, version, about = "n8n workflow backup and restore tool", long_about = None)]
pub struct Cli {
    /// Server URL. Default: environment `N8N_URL` or <http://127.0.0.1:5678>
    #[arg(short = 'u', long, env = "N8N_URL", global = true)]
    pub url: Option<String>,

    /// Api key for the public REST api
    #[arg(long, env = "N8N_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Print machine-readable output where applicable
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose mode (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Color mode for CLI and log output
    #[arg(long, value_enum, default_value_t = ColorArg::Auto, global = true)]
    pub color: ColorArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the server's workflows into the mirror directory
    Backup(MirrorArgs),

    /// Re-import changed mirror workflows, fixing cross-workflow references
    Restore(RestoreArgs),

    /// Classify mirror files against the server without changing anything
    Status(MirrorArgs),

    /// Report trigger-input drift between mirror and server
    Verify(MirrorArgs),
}

#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// Mirror directory holding the workflow json files
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Mirror directory holding the workflow json files
    #[arg(long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Resolve and report without importing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

pub async fn run(cli: Cli) -> Result<()> {
    let gateway = build_gateway(&cli)?;
    match cli.command {
        Commands::Backup(args) => handle_backup(&gateway, cli.json, &args).await,
        Commands::Restore(args) => handle_restore(&gateway, cli.json, &args).await,
        Commands::Status(args) => handle_status(&gateway, cli.json, &args).await,
        Commands::Verify(args) => handle_verify(&gateway, cli.json, &args).await,
    }
}

fn build_gateway(cli: &Cli) -> Result<HttpGateway> {
    let mut config = ClientConfig::default();
    if let Some(url) = cli.url.as_ref() {
        config = config.base_url(url);
    }
    if let Some(api_key) = cli.api_key.as_ref() {
        config = config.api_key(api_key);
    }
    Ok(HttpGateway::new(N8nClient::with_config(config)?))
}

async fn handle_backup(gateway: &HttpGateway, json: bool, args: &MirrorArgs) -> Result<()> {
    let progress = ProgressReporter::new(json, "Backing up workflows");
    let report = sync::backup(gateway, &args.dir).await?;
    progress.finish("Backup completed");
    if json {
        emit_json(&report)?;
    } else {
        print_backup_summary(&report);
    }
    Ok(())
}

async fn handle_restore(gateway: &HttpGateway, json: bool, args: &RestoreArgs) -> Result<()> {
    let progress = ProgressReporter::new(json, "Restoring workflows");
    let report = sync::restore(gateway, &args.dir, args.dry_run).await?;
    progress.finish(if args.dry_run {
        "Restore preflight completed"
    } else {
        "Restore completed"
    });
    if json {
        emit_json(&report)?;
    } else {
        print_restore_summary(&report);
    }
    if report.failed > 0 {
        bail!("{} workflow import(s) failed", report.failed);
    }
    Ok(())
}

async fn handle_status(gateway: &HttpGateway, json: bool, args: &MirrorArgs) -> Result<()> {
    let report = sync::status(gateway, &args.dir).await?;
    if json {
        emit_json(&report)?;
    } else {
        print_status_summary(&report);
    }
    Ok(())
}

async fn handle_verify(gateway: &HttpGateway, json: bool, args: &MirrorArgs) -> Result<()> {
    let report = sync::verify(gateway, &args.dir).await?;
    if json {
        emit_json(&report)?;
    } else {
        print_verify_summary(&report);
    }
    Ok(())
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

fn print_backup_summary(report: &BackupReport) {
    info!(
        "backup summary: exported={} kept={} duplicates={} archived={}",
        report.exported, report.kept, report.duplicates_removed, report.archived_removed
    );
    println!(
        "mirror={} exported={} kept={} (removed {} duplicate, {} archived)",
        report.mirror, report.exported, report.kept, report.duplicates_removed,
        report.archived_removed
    );
    print_warnings(&report.warnings);
}

fn print_restore_summary(report: &RestoreReport) {
    if report.dry_run {
        println!(
            "dry-run: would import {}/{} workflows ({} unchanged)",
            report.attempted,
            report.attempted + report.skipped_unchanged,
            report.skipped_unchanged
        );
    } else {
        println!(
            "imported {}/{} workflows ({} unchanged, failed: {})",
            report.imported, report.attempted, report.skipped_unchanged, report.failed
        );
    }
    if report.fuzzy_resolved > 0 {
        println!("- {} reference(s) resolved by fuzzy match", report.fuzzy_resolved);
    }
    if report.unresolved_references > 0 {
        println!(
            "- {} reference(s) left unresolved",
            report.unresolved_references
        );
    }
    if !report.imported_names.is_empty() {
        println!("imported workflows:");
        for name in &report.imported_names {
            println!("  - {name}");
        }
    }
    if !report.failed_names.is_empty() {
        println!("failed workflows:");
        for name in &report.failed_names {
            println!("  - {name}");
        }
        warn!("restore completed with failures");
    }
    print_warnings(&report.warnings);
}

fn print_status_summary(report: &StatusReport) {
    for entry in &report.entries {
        println!(
            "{:<10} {:<20} {} ({})",
            entry.classification.to_string(),
            entry.id,
            entry.name,
            entry.path
        );
    }
    println!(
        "{} unchanged, {} new, {} modified",
        report.unchanged, report.new, report.modified
    );
}

fn print_verify_summary(report: &VerifyReport) {
    if report.drifted.is_empty() {
        println!("checked {} workflows, no trigger-input drift", report.checked);
        return;
    }
    for entry in &report.drifted {
        println!("{} ({}):", entry.name, entry.id);
        for input in &entry.drift.added {
            println!("  + {} ({})", input.name, input.kind);
        }
        for input in &entry.drift.removed {
            println!("  - {} ({})", input.name, input.kind);
        }
        for (name, local, remote) in &entry.drift.retyped {
            println!("  ~ {name}: {local} -> {remote}");
        }
    }
    println!(
        "checked {} workflows, {} drifted",
        report.checked,
        report.drifted.len()
    );
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("! {warning}");
    }
}

fn progress_enabled(json: bool, stderr_is_tty: bool) -> bool {
    !json && stderr_is_tty
}

struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    fn new(json: bool, message: &str) -> Self {
        let enabled = progress_enabled(json, io::stderr().is_terminal());
        if enabled {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar.set_message(message.to_string());
            Self { bar: Some(bar) }
        } else {
            Self { bar: None }
        }
    }

    fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }
}
