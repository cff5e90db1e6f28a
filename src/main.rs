//! Binary entry point for haul.
//!
//! Inspects containers without a destination store: every kind is treated
//! as unknown, so objects are listed but never imported.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use haul::config::HaulConfig;
use haul::io::formats::FORMAT_VERSION;
use haul::observability::{self, LoggingConfig};
use haul::{CodecRegistry, ImportContainer, ImportSession, MemoryStore};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// haul - Export and import object graphs as portable containers.
#[derive(Parser)]
#[command(name = "haul")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "HAUL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print every object in a container.
    Dump {
        /// Container file (YAML or ZIP).
        path: PathBuf,
    },

    /// Print the container header.
    Inspect {
        /// Container file (YAML or ZIP).
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<HaulConfig> {
    match path {
        Some(path) => HaulConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(HaulConfig::load_default()),
    }
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Dump { path } => cmd_dump(&path),
        Commands::Inspect { path } => cmd_inspect(&path),
    }
}

/// Opens a container with every kind treated as unknown.
fn open(path: &Path) -> Result<ImportSession<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ImportContainer::new(CodecRegistry::new())
        .with_ignore_unknown(true)
        .read(BufReader::new(file), &MemoryStore::new())
        .with_context(|| format!("reading container {}", path.display()))
}

fn cmd_dump(path: &Path) -> Result<()> {
    let session = open(path)?;
    let stdout = io::stdout();
    session
        .dump_objects(stdout.lock())
        .context("writing object listing")?;
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let session = open(path)?;
    let mut counts: BTreeMap<&str, usize> = session
        .object_kinds()
        .iter()
        .map(|kind| (kind.as_str(), 0))
        .collect();
    for record in session.records() {
        *counts.entry(record.id.kind.as_str()).or_default() += 1;
    }

    let mut out = io::stdout().lock();
    writeln!(out, "Container: {}", path.display())?;
    writeln!(
        out,
        "Format:    {}",
        if session.is_archive() { "zip" } else { "yaml" }
    )?;
    writeln!(out, "Version:   {FORMAT_VERSION}")?;
    writeln!(out, "Objects:   {}", session.records().len())?;
    writeln!(out, "\nKinds:")?;
    for (kind, count) in &counts {
        writeln!(out, "  {kind:<30} {count}")?;
    }
    if !session.metadata().is_null() {
        let metadata =
            serde_yaml_ng::to_string(session.metadata()).context("rendering metadata")?;
        writeln!(out, "\nMetadata:")?;
        for line in metadata.lines() {
            writeln!(out, "  {line}")?;
        }
    }
    Ok(())
}
