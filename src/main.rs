//! iso-commander - disc image discovery, index and batch operations
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use iso_commander::config::{CliArgs, Command, EngineConfig, TransferArgs};
use iso_commander::engine::Engine;
use iso_commander::ops::{parse_destinations, ExternalConverter, ImageFormat, OperationKind, TransferRequest};
use iso_commander::progress::{
    print_batch_summary, print_header, print_import_summary, print_list, print_prune_summary,
    print_scan_summary, BatchProgress, ProgressReporter,
};
use iso_commander::selection::parse_selection;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = EngineConfig::from_args(&args).context("Invalid configuration")?;
    let engine = Engine::new(config).context("Failed to initialize engine")?;

    // Setup signal handler for graceful cancellation
    let cancel = engine.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping...");
        cancel.cancel();
    })
    .context("Failed to set signal handler")?;

    match args.command {
        Command::Import { roots } => run_import(&engine, Some(roots)),
        Command::AutoImport => run_import(&engine, None),
        Command::List { filters } => run_list(&engine, &filters),
        Command::Prune => run_prune(&engine),
        Command::Copy(transfer) => run_transfer(&engine, OperationKind::Copy, transfer),
        Command::Move(transfer) => run_transfer(&engine, OperationKind::Move, transfer),
        Command::Delete { selection, filters } => run_transfer(
            &engine,
            OperationKind::Delete,
            TransferArgs {
                selection,
                destinations: String::new(),
                filters,
                overwrite: false,
            },
        ),
        Command::Convert {
            format,
            roots,
            select,
            overwrite,
        } => run_convert(&engine, format, &roots, select.as_deref(), overwrite),
        Command::Clear => {
            engine.clear().context("Failed to clear the index")?;
            println!("Index cleared: {}", engine.index().path().display());
            Ok(())
        }
    }
}

/// Import `roots`, or the folder history when `None`
fn run_import(engine: &Engine, roots: Option<Vec<PathBuf>>) -> Result<()> {
    let config = engine.config();
    if config.show_progress {
        print_header("import", engine.pool().size(), &engine.index().path().display().to_string());
    }

    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Scanning for ISO images...");
    }

    let report = match roots {
        Some(roots) => engine.import(&roots),
        None => engine.auto_import(),
    }
    .context("Import failed")?;

    if let Some(ref p) = progress {
        if report.traversal.interrupted {
            p.finish("Scan interrupted");
        } else {
            p.finish_and_clear();
        }
    }

    if report.roots.is_empty() {
        warn!("No folders to scan; run `import <DIR>` first");
    }

    print_import_summary(&report, config.verbose);
    Ok(())
}

fn run_list(engine: &Engine, filters: &[String]) -> Result<()> {
    let view = engine.filtered(filters).context("Filtering failed")?;
    for filter in &view.unmatched {
        println!("No match for filter '{}'", filter);
    }

    if view.stack.base().is_empty() {
        println!("The index is empty; run `import <DIR>` to find images");
        return Ok(());
    }

    print_list(view.stack.current(), &view.stack.queries());
    Ok(())
}

fn run_prune(engine: &Engine) -> Result<()> {
    let report = engine.prune().context("Prune failed")?;
    print_prune_summary(&report);
    Ok(())
}

fn run_transfer(engine: &Engine, kind: OperationKind, args: TransferArgs) -> Result<()> {
    let destinations = if kind.needs_destination() {
        parse_destinations(&args.destinations).context("Invalid destinations")?
    } else {
        Vec::new()
    };

    let view = engine.filtered(&args.filters).context("Filtering failed")?;
    for filter in &view.unmatched {
        println!("No match for filter '{}'; ignored", filter);
    }

    let selection = parse_selection(&args.selection, view.stack.len());
    for message in &selection.errors {
        println!("{}", message);
    }
    let sources = selection.resolve(&view.stack);
    if sources.is_empty() {
        bail!("Nothing selected");
    }

    info!(kind = %kind, items = sources.len(), "Selection resolved");

    let request = TransferRequest {
        kind,
        sources,
        destinations,
        overwrite: args.overwrite,
    };

    let progress = engine
        .config()
        .show_progress
        .then(|| BatchProgress::start(&kind.to_string(), engine.counters()));
    let result = engine.run_transfer(request);
    if let Some(p) = progress {
        p.finish();
    }

    let report = result.with_context(|| format!("{} failed", kind))?;
    print_batch_summary(&report, engine.config().verbose);
    Ok(())
}

fn run_convert(
    engine: &Engine,
    format: ImageFormat,
    roots: &[PathBuf],
    selection: Option<&str>,
    overwrite: bool,
) -> Result<()> {
    if !format.is_convertible() {
        bail!("{} images are already ISO", format);
    }

    let progress = engine
        .config()
        .show_progress
        .then(|| BatchProgress::start("convert", engine.counters()));
    let result = engine.convert(format, roots, selection, Arc::new(ExternalConverter), overwrite);
    if let Some(p) = progress {
        p.finish();
    }

    let report = result.context("Conversion failed")?;
    print_scan_summary(&report.scan, engine.config().verbose);
    for message in &report.selection_errors {
        println!("{}", message);
    }

    match report.batch {
        Some(batch) => print_batch_summary(&batch, engine.config().verbose),
        None if report.scan.interrupted => println!("Scan interrupted; nothing converted"),
        None => println!("No {} images to convert", format),
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("iso_commander=debug,warn")
    } else {
        EnvFilter::new("iso_commander=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
