//! End-to-end tests of the commands against a temporary store.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use media_daemon::{import, media_url, reindex, reset, status};
use media_indexing::{
    IndexCheckpoint, PathGenerator, PathGeneratorChain, MEDIA_INDEXER_NAME, SEARCH_INDEXER_NAME,
};
use media_storage::Storage;
use media_types::{EntityId, MediaRecord, Settings, ThumbnailRecord};

fn settings(dir: &TempDir) -> Settings {
    Settings {
        db_path: dir.path().join("db").to_string_lossy().into_owned(),
        batch_size: 2,
        workers: 2,
        languages: vec!["en".to_string(), "de".to_string()],
        ..Settings::default()
    }
}

fn open_storage(settings: &Settings) -> Storage {
    Storage::open(&settings.expanded_db_path()).unwrap()
}

fn write_records(dir: &TempDir) -> std::path::PathBuf {
    let file = dir.path().join("records.jsonl");
    fs::write(
        &file,
        r#"{"kind": "media", "id": "m1", "file_name": "beach", "file_extension": "jpg"}
{"kind": "media", "id": "m2", "file_name": "dunes", "file_extension": "png"}
{"kind": "thumbnail", "id": "t1", "media_id": "m1", "width": 400, "height": 300}
"#,
    )
    .unwrap();
    file
}

async fn import_file(settings: &Settings, file: &Path) {
    let summary = import(settings.clone(), file).await.unwrap();
    assert_eq!(summary.media, 2);
    assert_eq!(summary.thumbnails, 1);
    assert_eq!(summary.dead_lettered, 0);
    assert!(summary.handled > 0);
}

#[tokio::test]
async fn test_import_derives_paths_and_documents() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let file = write_records(&dir);
    import_file(&settings, &file).await;

    let storage = open_storage(&settings);
    let paths = PathGeneratorChain::from_settings(&settings);

    let m1 = storage.get_media(&EntityId::new("m1")).unwrap().unwrap();
    let t1 = storage.get_thumbnail(&EntityId::new("t1")).unwrap().unwrap();
    let mut bare = m1.clone();
    bare.path = None;
    assert_eq!(
        m1.path.as_deref(),
        Some(paths.generate_path(&bare, None).unwrap().as_str())
    );
    assert_eq!(
        t1.path.as_deref(),
        Some(paths.generate_path(&bare, Some(&t1)).unwrap().as_str())
    );
    let cached = m1.thumbnails_ro.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].id, t1.id);

    let m2 = storage.get_media(&EntityId::new("m2")).unwrap().unwrap();
    assert!(m2.path.is_some());
    assert_eq!(m2.thumbnails_ro, Some(Vec::new()));

    // Two media documents and one thumbnail document per language
    assert_eq!(storage.search_document_count("en").unwrap(), 3);
    assert_eq!(storage.search_document_count("de").unwrap(), 3);
}

#[tokio::test]
async fn test_status_after_import() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let file = write_records(&dir);
    import_file(&settings, &file).await;

    let report = status(settings).unwrap();
    assert_eq!(report.media_count, 2);
    assert_eq!(report.thumbnail_count, 1);
    assert_eq!(report.search_document_count, 6);
    assert_eq!(report.indexers.len(), 2);

    let media = &report.indexers[0];
    assert_eq!(media.name, MEDIA_INDEXER_NAME);
    assert_eq!(media.total, 2);
    assert!(media.checkpoint.is_none());
    assert_eq!(report.indexers[1].name, SEARCH_INDEXER_NAME);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["indexers"][0]["total"], 2);
}

#[tokio::test]
async fn test_reindex_backfills_records_written_without_events() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    {
        let storage = open_storage(&settings);
        for i in 0..5 {
            let media = MediaRecord::new(EntityId::new(format!("m{}", i)), format!("file-{}", i))
                .with_extension("jpg");
            storage.put_media(&media).unwrap();
        }
        let thumbnail = ThumbnailRecord::new(EntityId::new("t0"), EntityId::new("m0"), 64, 64);
        storage.put_thumbnail(&thumbnail).unwrap();
    }

    let summaries = reindex(settings.clone(), None).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.completed && s.dead_lettered == 0));
    assert_eq!(summaries[0].indexer, MEDIA_INDEXER_NAME);
    assert_eq!(summaries[0].processed, 5);

    let storage = open_storage(&settings);
    for i in 0..5 {
        let media = storage
            .get_media(&EntityId::new(format!("m{}", i)))
            .unwrap()
            .unwrap();
        assert!(media.path.is_some());
        assert!(media.thumbnails_ro.is_some());
    }
    let thumbnail = storage.get_thumbnail(&EntityId::new("t0")).unwrap().unwrap();
    assert!(thumbnail.path.is_some());
    assert_eq!(storage.search_document_count("en").unwrap(), 6);
    assert!(IndexCheckpoint::load(&storage, MEDIA_INDEXER_NAME)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reindex_unknown_indexer() {
    let dir = TempDir::new().unwrap();
    let err = reindex(settings(&dir), Some("nope.indexer"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nope.indexer"));
}

#[test]
fn test_reset_clears_checkpoints() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    {
        let storage = open_storage(&settings);
        IndexCheckpoint::new(MEDIA_INDEXER_NAME).save(&storage).unwrap();
        IndexCheckpoint::new(SEARCH_INDEXER_NAME).save(&storage).unwrap();
    }

    assert_eq!(reset(settings.clone(), Some(MEDIA_INDEXER_NAME)).unwrap(), 1);
    assert_eq!(reset(settings.clone(), None).unwrap(), 1);
    assert_eq!(reset(settings.clone(), None).unwrap(), 0);
    assert!(reset(settings.clone(), Some("nope.indexer")).is_err());

    let storage = open_storage(&settings);
    assert!(IndexCheckpoint::load(&storage, SEARCH_INDEXER_NAME)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_url_of_media_and_thumbnail() {
    let dir = TempDir::new().unwrap();
    let settings = settings(&dir);
    let file = write_records(&dir);
    import_file(&settings, &file).await;

    let media = media_url(settings.clone(), "M1", None, Some("https://cdn.example.com/")).unwrap();
    assert!(media.relative.ends_with("beach.jpg"));
    assert_eq!(
        media.absolute,
        format!("https://cdn.example.com/{}", media.relative)
    );

    let thumbnail = media_url(settings.clone(), "m1", Some("t1"), None).unwrap();
    assert!(thumbnail.relative.ends_with("beach_400x300.jpg"));
    assert_eq!(
        thumbnail.absolute,
        format!("{}/{}", settings.app_url, thumbnail.relative)
    );

    // t1 belongs to m1, not m2
    assert!(media_url(settings.clone(), "m2", Some("t1"), None).is_err());
    assert!(media_url(settings, "missing", None, None).is_err());
}
