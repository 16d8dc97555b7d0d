mod cli;
mod config;
mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use cutout_core::{Collection, CollectionView, SourceFile};
use cutout_engine::{
    collect_archive_entries, write_downloads, ArchiveEncoder, AtomicFileWriter, BatchScheduler,
    CommandTransform, EngineEvent, EngineHandle, RunOutcome, RunSummary, TransformAdapter,
    ZipEncoder,
};
use cutout_logging::{
    cutout_debug, cutout_error, cutout_info, cutout_warn, level_from_verbosity,
};

use crate::cli::Cli;
use crate::config::Settings;
use crate::logging::LogDestination;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const FAILED_ITEMS_EXIT: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let destination = if cli.log_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    logging::initialize(destination, level_from_verbosity(cli.verbose));

    match run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            cutout_warn!("{} item(s) failed", failed);
            ExitCode::from(FAILED_ITEMS_EXIT)
        }
        Err(err) => {
            cutout_error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of failed items.
fn run(cli: &Cli) -> Result<usize> {
    let settings = Settings::resolve(cli, config::load(cli.config.as_deref())?)?;

    let mut collection = Collection::new();
    let report = collection.add_sources(read_inputs(&cli.inputs)?);
    for skipped in &report.filtered_out {
        cutout_warn!("Skipping {}: {:?}", skipped.name, skipped.reason);
    }
    mark_keep_original(&mut collection, &cli.keep_original)?;
    if collection.is_empty() {
        cutout_warn!("No supported images among the inputs");
        return Ok(0);
    }

    let adapter = TransformAdapter::new(
        Arc::new(CommandTransform::new(settings.command.clone())),
        settings.transform.clone(),
    );
    let scheduler = Arc::new(BatchScheduler::new(
        Arc::new(Mutex::new(collection)),
        adapter,
    ));
    let engine = EngineHandle::new(scheduler.clone()).context("failed to start engine thread")?;
    let summary = drive(&engine)?;
    cutout_info!(
        "Run finished: {} processed, {} succeeded, {} failed",
        summary.processed,
        summary.succeeded,
        summary.failed
    );

    print_report(&scheduler.lock().view());
    export(&scheduler, &settings, cli.archive.as_ref())?;
    Ok(summary.failed)
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(SourceFile::new(name, bytes))
        })
        .collect()
}

fn mark_keep_original(collection: &mut Collection, names: &[String]) -> Result<()> {
    for name in names {
        let ids: Vec<_> = collection
            .iter()
            .filter(|item| item.source_name() == name.as_str())
            .map(|item| item.id())
            .collect();
        if ids.is_empty() {
            cutout_warn!("--keep-original {:?} matches no input", name);
        }
        for id in ids {
            collection.set_keep_original(id, true)?;
        }
    }
    Ok(())
}

fn drive(engine: &EngineHandle) -> Result<RunSummary> {
    engine.run_all();
    loop {
        match engine.recv_timeout(POLL_INTERVAL) {
            Ok(EngineEvent::Progress(update)) => {
                cutout_debug!("Item {} at {}%", update.item_id, update.percent);
            }
            Ok(EngineEvent::RunFinished(RunOutcome::Finished(summary))) => return Ok(summary),
            Ok(EngineEvent::RunFinished(RunOutcome::AlreadyRunning)) => {
                bail!("a run was already in progress")
            }
            Ok(EngineEvent::RunAborted) => bail!("the batch run aborted"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                bail!("engine thread stopped before the run finished")
            }
        }
    }
}

fn print_report(view: &CollectionView) {
    for row in &view.items {
        let marker = if row.keep_original { " (original)" } else { "" };
        match &row.error {
            Some(error) => println!("{:<8} {}{}: {}", row.state, row.name, marker, error),
            None => println!("{:<8} {}{}", row.state, row.name, marker),
        }
    }
    println!(
        "{} done, {} failed, {} exportable",
        view.done, view.failed, view.exportable
    );
}

fn export(
    scheduler: &BatchScheduler,
    settings: &Settings,
    archive: Option<&Option<PathBuf>>,
) -> Result<()> {
    let Some(target) = archive else {
        let writer = AtomicFileWriter::new(settings.out_dir.clone());
        let written = write_downloads(&scheduler.lock(), &settings.export, &writer)?;
        cutout_info!("Wrote {} file(s) to {:?}", written.len(), writer.dir());
        return Ok(());
    };

    let path = target
        .clone()
        .unwrap_or_else(|| settings.out_dir.join(default_archive_name(Utc::now())));
    let entries = collect_archive_entries(&scheduler.lock(), &settings.export);
    let payload = ZipEncoder::new(settings.export.compression).encode(&entries)?;
    let (dir, name) = split_target(&path)?;
    let written = AtomicFileWriter::new(dir).write(&name, &payload)?;
    cutout_info!("Wrote {} entries to {:?}", entries.len(), written);
    Ok(())
}

fn default_archive_name(now: DateTime<Utc>) -> String {
    format!("cutout-{}.zip", now.format("%Y%m%dT%H%M%SZ"))
}

fn split_target(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .with_context(|| format!("archive path {:?} has no file name", path))?
        .to_string_lossy()
        .into_owned();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}
