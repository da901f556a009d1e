//! The subcommands of the `dirmodel` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dirmodel::directory::{DeepCountStatus, DirectoryStats};
use dirmodel::io::LocalIo;
use dirmodel::{
    AttributeSet, CallbackTarget, ClientId, DirectoryError, DirectoryEvent, DirectoryRegistry,
    EngineContext, FileRecord,
};
use tokio::select;
use tracing::{debug, info};

use crate::app_config::Config;

fn registry(config: &Config) -> DirectoryRegistry {
    let ctx = EngineContext::new(Arc::new(LocalIo::current())).with_config(config.engine);
    DirectoryRegistry::new(ctx)
}

fn absolute(dir: &Path) -> Result<PathBuf, std::io::Error> {
    std::path::absolute(dir)
}

fn describe(record: &FileRecord) -> String {
    let mut line = record.name().to_owned();
    if let Some(info) = record.info() {
        if info.is_dir() {
            line.push('/');
        }
        if let Some(size) = info.size {
            line.push_str(&format!("\t{}", bytesize::ByteSize::b(size)));
        }
        if let Some(mime) = &info.mime_type {
            line.push_str(&format!("\t{mime}"));
        }
    }
    if let Some(count) = record.item_count() {
        line.push_str(&format!("\t{count} items"));
    } else if record.item_count_failed() {
        line.push_str("\t? items");
    }
    if let Some(target) = record.activation_target() {
        line.push_str(&format!("\t-> {target}"));
    }
    if let Some(preview) = record.preview_text()
        && let Some(first) = preview.lines().next()
    {
        line.push_str(&format!("\t\"{first}\""));
    }
    line
}

/// Print every entry of `dir` once the requested attributes are known.
pub async fn list(config: Config, dir: PathBuf, attrs: AttributeSet) -> Result<(), DirectoryError> {
    let registry = registry(&config);
    let dir = absolute(&dir).map_err(|_| DirectoryError::InvalidName(dir.display().to_string()))?;
    let lease = registry.open(&dir);
    let ready = lease
        .wait_until_ready(CallbackTarget::AllFiles, attrs | AttributeSet::FILE_LIST)
        .await?;
    for record in ready.into_files() {
        println!("{}", describe(&record));
    }
    Ok(())
}

/// Print the recursive totals below `dir`.
pub async fn count(config: Config, dir: PathBuf) -> Result<(), DirectoryError> {
    let registry = registry(&config);
    let dir = absolute(&dir).map_err(|_| DirectoryError::InvalidName(dir.display().to_string()))?;
    let lease = registry.open(&dir);
    let ready = lease
        .wait_until_ready(CallbackTarget::Directory, AttributeSet::DEEP_COUNT)
        .await?;
    for record in ready.into_files() {
        let counts = record.deep_counts();
        debug!(status = ?record.deep_count_status(), "Recursive count finished.");
        if record.deep_count_status() != DeepCountStatus::Done {
            continue;
        }
        println!(
            "{}: {} directories, {} files, {} ({} unreadable)",
            record.path().display(),
            counts.directories,
            counts.files,
            bytesize::ByteSize::b(counts.total_size),
            counts.unreadable,
        );
    }
    Ok(())
}

fn print_event(event: &DirectoryEvent) {
    match event {
        DirectoryEvent::FilesAdded(files) => files.iter().for_each(|f| println!("+ {}", describe(f))),
        DirectoryEvent::FilesChanged(files) => {
            files.iter().for_each(|f| println!("~ {}", describe(f)));
        }
        DirectoryEvent::FilesRemoved(files) => files.iter().for_each(|f| println!("- {}", f.name())),
        DirectoryEvent::MetadataChanged => println!("* metadata changed"),
        DirectoryEvent::ListingComplete => println!("= listing complete"),
    }
}

fn log_stats(stats: &DirectoryStats) {
    debug!(
        files = stats.files,
        monitors = stats.monitors,
        in_flight = ?stats.in_flight,
        "Directory state."
    );
}

/// Keep `dir` monitored and print its notifications until interrupted.
pub async fn watch(config: Config, dir: PathBuf, attrs: AttributeSet) -> Result<(), DirectoryError> {
    let registry = registry(&config);
    let dir = absolute(&dir).map_err(|_| DirectoryError::InvalidName(dir.display().to_string()))?;
    let lease = registry.open(&dir);
    let mut events = lease.subscribe();
    let client = ClientId::next();
    lease.monitor_add(CallbackTarget::AllFiles, attrs, client)?;
    info!(dir = %dir.display(), "Watching. Press Ctrl+C to stop.");

    loop {
        select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                debug!("Received Ctrl+C signal, shutting down...");
                break;
            }
        }
    }

    if let Ok(stats) = lease.stats().await {
        log_stats(&stats);
    }
    lease.monitor_remove(CallbackTarget::AllFiles, client)
}

/// Run `fut` to completion on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("Failed to create Tokio runtime: {e}"));
    runtime.block_on(fut)
}
