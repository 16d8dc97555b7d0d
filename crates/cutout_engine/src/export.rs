use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use bytes::Bytes;
use cutout_core::{suffixed_name, Collection, ExportEntry};
use cutout_logging::{cutout_info, cutout_warn};
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::persist::{AtomicFileWriter, PersistError};
use crate::scheduler::BatchScheduler;
use crate::OutputFormat;

pub const MANIFEST_NAME: &str = "manifest.json";

/// What happens when two entries map to the same archive path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// The later entry replaces the earlier one, keeping the earlier position.
    #[default]
    LastWriteWins,
    /// Later duplicates are renamed `name (1).ext`, `name (2).ext`, ...
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveCompression {
    /// Images are already compressed; storing is fastest.
    #[default]
    Stored,
    Deflated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_extension: String,
    pub collision: CollisionPolicy,
    pub compression: ArchiveCompression,
    pub include_manifest: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::for_format(OutputFormat::default())
    }
}

impl ExportOptions {
    pub fn for_format(format: OutputFormat) -> Self {
        Self {
            output_extension: format.extension().to_string(),
            collision: CollisionPolicy::default(),
            compression: ArchiveCompression::default(),
            include_manifest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Container boundary: `(path, bytes)` entries in, one opaque payload out.
pub trait ArchiveEncoder: Send + Sync {
    fn encode(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ExportError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipEncoder {
    compression: ArchiveCompression,
}

impl ZipEncoder {
    pub fn new(compression: ArchiveCompression) -> Self {
        Self { compression }
    }
}

impl ArchiveEncoder for ZipEncoder {
    fn encode(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ExportError> {
        let method = match self.compression {
            ArchiveCompression::Stored => CompressionMethod::Stored,
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
        };
        let options = SimpleFileOptions::default().compression_method(method);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in entries {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Turns exportable entries into archive paths under `policy`.
pub fn resolve_collisions(entries: Vec<ExportEntry>, policy: CollisionPolicy) -> Vec<ArchiveEntry> {
    let mut out: Vec<ArchiveEntry> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        match (positions.get(&entry.name).copied(), policy) {
            (None, _) => {
                positions.insert(entry.name.clone(), out.len());
                out.push(ArchiveEntry {
                    path: entry.name,
                    bytes: entry.bytes,
                });
            }
            (Some(index), CollisionPolicy::LastWriteWins) => {
                cutout_warn!(
                    "archive path {} reused by item {}; keeping the later one",
                    entry.name,
                    entry.item_id
                );
                out[index].bytes = entry.bytes;
            }
            (Some(_), CollisionPolicy::Suffix) => {
                let path = (1..)
                    .map(|n| suffixed_name(&entry.name, n))
                    .find(|candidate| !positions.contains_key(candidate))
                    .unwrap_or_else(|| entry.name.clone());
                positions.insert(path.clone(), out.len());
                out.push(ArchiveEntry {
                    path,
                    bytes: entry.bytes,
                });
            }
        }
    }
    out
}

fn manifest(entries: &[ExportEntry], archived: &[ArchiveEntry]) -> Result<ArchiveEntry, ExportError> {
    let manifest = json!({
        "entry_count": archived.len(),
        "items": entries.iter().map(|e| {
            json!({
                "item_id": e.item_id,
                "name": e.name,
                "original": e.original,
                "bytes": e.bytes.len(),
            })
        }).collect::<Vec<_>>(),
        "paths": archived.iter().map(|a| a.path.as_str()).collect::<Vec<_>>(),
    });
    Ok(ArchiveEntry {
        path: MANIFEST_NAME.to_string(),
        bytes: Bytes::from(serde_json::to_vec_pretty(&manifest)?),
    })
}

/// Selects one entry per exportable item, in collection order.
pub fn collect_archive_entries(collection: &Collection, options: &ExportOptions) -> Vec<ArchiveEntry> {
    let entries = collection.export_entries(&options.output_extension);
    let skipped = collection.len() - entries.len();
    if skipped > 0 {
        cutout_info!("{skipped} items have nothing to export and are left out");
    }
    if !options.include_manifest {
        return resolve_collisions(entries, options.collision);
    }
    let mut archived = resolve_collisions(entries.clone(), options.collision);
    match manifest(&entries, &archived) {
        Ok(entry) => archived.push(entry),
        Err(err) => cutout_warn!("manifest skipped: {err}"),
    }
    archived
}

/// Builds one archive payload from a snapshot of the collection.
///
/// The collection lock is held only while entries are selected; encoding
/// runs on the blocking pool.
pub async fn build_archive(
    scheduler: &BatchScheduler,
    options: &ExportOptions,
) -> Result<Bytes, ExportError> {
    let entries = {
        let collection = scheduler.lock();
        collect_archive_entries(&collection, options)
    };
    let encoder = ZipEncoder::new(options.compression);
    encode_entries(entries, encoder).await
}

pub async fn encode_entries<E>(entries: Vec<ArchiveEntry>, encoder: E) -> Result<Bytes, ExportError>
where
    E: ArchiveEncoder + 'static,
{
    let count = entries.len();
    let payload = tokio::task::spawn_blocking(move || encoder.encode(&entries)).await??;
    cutout_info!("archive built: {} entries, {} bytes", count, payload.len());
    Ok(Bytes::from(payload))
}

/// Writes every exportable item as its own file (the single-item download,
/// applied to the whole collection).
pub fn write_downloads(
    collection: &Collection,
    options: &ExportOptions,
    writer: &AtomicFileWriter,
) -> Result<Vec<PathBuf>, ExportError> {
    let entries = resolve_collisions(
        collection.export_entries(&options.output_extension),
        options.collision,
    );
    let mut written = Vec::with_capacity(entries.len());
    for entry in entries {
        written.push(writer.write(&entry.path, &entry.bytes)?);
    }
    cutout_info!("wrote {} downloads to {:?}", written.len(), writer.dir());
    Ok(written)
}
