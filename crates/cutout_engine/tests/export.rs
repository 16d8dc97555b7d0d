use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cutout_core::{Collection, ExportEntry, SourceFile};
use cutout_engine::{
    build_archive, collect_archive_entries, resolve_collisions, write_downloads, ArchiveCompression,
    ArchiveEntry, AtomicFileWriter, BatchScheduler, CollisionPolicy, ExportOptions, OutputFormat,
    StageProgress, Transform, TransformAdapter, TransformConfig, TransformError, MANIFEST_NAME,
};
use pretty_assertions::assert_eq;

struct EchoTransform;

#[async_trait::async_trait]
impl Transform for EchoTransform {
    async fn transform(
        &self,
        input: Bytes,
        _config: &TransformConfig,
        _progress: &dyn StageProgress,
    ) -> Result<Bytes, TransformError> {
        Ok(Bytes::from([&b"cut:"[..], &input[..]].concat()))
    }
}

fn scheduler_with(names: &[&str]) -> BatchScheduler {
    let mut collection = Collection::new();
    collection.add_sources(
        names
            .iter()
            .map(|name| SourceFile::new(*name, name.as_bytes().to_vec())),
    );
    let adapter = TransformAdapter::new(Arc::new(EchoTransform), TransformConfig::default());
    BatchScheduler::new(Arc::new(Mutex::new(collection)), adapter)
}

fn read_zip(payload: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(payload)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).unwrap();
            (file.name().to_string(), bytes)
        })
        .collect()
}

fn entry(item_id: u64, name: &str, bytes: &'static [u8]) -> ExportEntry {
    ExportEntry {
        item_id,
        name: name.to_string(),
        bytes: Bytes::from_static(bytes),
        original: false,
    }
}

#[tokio::test]
async fn keep_original_exports_source_under_its_own_name() {
    cutout_logging::initialize_for_tests();
    let scheduler = scheduler_with(&["a.jpg", "b.png", "c.webp"]);
    {
        let mut collection = scheduler.lock();
        for id in collection.ids() {
            collection.set_keep_original(id, true).unwrap();
        }
    }

    let payload = build_archive(&scheduler, &ExportOptions::default()).await.unwrap();

    assert_eq!(
        read_zip(&payload),
        vec![
            ("a.jpg".to_string(), b"a.jpg".to_vec()),
            ("b.png".to_string(), b"b.png".to_vec()),
            ("c.webp".to_string(), b"c.webp".to_vec()),
        ]
    );
}

#[tokio::test]
async fn transformed_items_get_derived_names_and_unexportable_items_are_skipped() {
    cutout_logging::initialize_for_tests();
    let scheduler = scheduler_with(&["cat.jpg"]);
    scheduler.run_all().await;
    scheduler
        .lock()
        .add_sources(vec![SourceFile::new("dog.jpg", b"dog".to_vec())]);

    let payload = build_archive(&scheduler, &ExportOptions::for_format(OutputFormat::Png))
        .await
        .unwrap();

    assert_eq!(
        read_zip(&payload),
        vec![("cat.png".to_string(), b"cut:cat.jpg".to_vec())]
    );
}

#[tokio::test]
async fn archive_reflects_latest_keep_original_choice() {
    cutout_logging::initialize_for_tests();
    let scheduler = scheduler_with(&["cat.jpg"]);
    scheduler.run_all().await;
    let options = ExportOptions::for_format(OutputFormat::Webp);

    scheduler.lock().set_keep_original(1, true).unwrap();
    let first = build_archive(&scheduler, &options).await.unwrap();
    scheduler.lock().set_keep_original(1, false).unwrap();
    let second = build_archive(&scheduler, &options).await.unwrap();

    assert_eq!(read_zip(&first)[0].0, "cat.jpg");
    assert_eq!(read_zip(&second)[0].0, "cat.webp");
    // Building archives never touches handles.
    let stats = scheduler.lock().resource_stats();
    assert_eq!((stats.acquired, stats.released), (2, 0));
}

#[tokio::test]
async fn empty_collection_builds_an_empty_archive() {
    let scheduler = scheduler_with(&[]);
    let payload = build_archive(&scheduler, &ExportOptions::default()).await.unwrap();
    assert!(read_zip(&payload).is_empty());
}

#[tokio::test]
async fn deflated_archive_round_trips() {
    let scheduler = scheduler_with(&["a.png"]);
    scheduler.run_all().await;
    let options = ExportOptions {
        compression: ArchiveCompression::Deflated,
        ..ExportOptions::default()
    };

    let payload = build_archive(&scheduler, &options).await.unwrap();

    assert_eq!(read_zip(&payload), vec![("a.png".to_string(), b"cut:a.png".to_vec())]);
}

#[test]
fn colliding_names_last_write_wins() {
    let archived = resolve_collisions(
        vec![
            entry(1, "cat.png", b"first"),
            entry(2, "dog.png", b"dog"),
            entry(3, "cat.png", b"second"),
        ],
        CollisionPolicy::LastWriteWins,
    );

    assert_eq!(
        archived,
        vec![
            ArchiveEntry {
                path: "cat.png".to_string(),
                bytes: Bytes::from_static(b"second"),
            },
            ArchiveEntry {
                path: "dog.png".to_string(),
                bytes: Bytes::from_static(b"dog"),
            },
        ]
    );
}

#[test]
fn colliding_names_can_be_suffixed() {
    let archived = resolve_collisions(
        vec![
            entry(1, "cat.png", b"1"),
            entry(2, "cat.png", b"2"),
            entry(3, "cat (1).png", b"3"),
            entry(4, "cat.png", b"4"),
        ],
        CollisionPolicy::Suffix,
    );

    let paths: Vec<_> = archived.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["cat.png", "cat (1).png", "cat (1) (1).png", "cat (2).png"]);
}

#[tokio::test]
async fn manifest_lists_exported_items() {
    let scheduler = scheduler_with(&["a.png", "b.png"]);
    scheduler.run_all().await;
    scheduler.lock().set_keep_original(2, true).unwrap();
    let options = ExportOptions {
        include_manifest: true,
        ..ExportOptions::default()
    };

    let entries = collect_archive_entries(&scheduler.lock(), &options);

    assert_eq!(entries.len(), 3);
    let manifest = entries.last().unwrap();
    assert_eq!(manifest.path, MANIFEST_NAME);
    let json: serde_json::Value = serde_json::from_slice(&manifest.bytes).unwrap();
    assert_eq!(json["entry_count"], 2);
    assert_eq!(json["items"][1]["original"], true);
    assert_eq!(json["paths"][0], "a.png");
}

#[tokio::test]
async fn downloads_are_written_as_individual_files() {
    let temp = tempfile::TempDir::new().unwrap();
    let scheduler = scheduler_with(&["cat.jpg", "dog.jpg"]);
    scheduler.run_all().await;
    scheduler.lock().set_keep_original(2, true).unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("out"));

    let written = write_downloads(&scheduler.lock(), &ExportOptions::default(), &writer).unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(
        std::fs::read(temp.path().join("out").join("cat.png")).unwrap(),
        b"cut:cat.jpg"
    );
    assert_eq!(
        std::fs::read(temp.path().join("out").join("dog.jpg")).unwrap(),
        b"dog.jpg"
    );
}
