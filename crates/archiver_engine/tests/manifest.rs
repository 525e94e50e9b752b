use std::fs;

use archiver_core::{sha256_hex, ArtifactKind, EntryKey, ManifestEntry, UpsertOutcome};
use archiver_engine::{ManifestError, ManifestHandle, ManifestManager, MANIFEST_FILENAME};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn entry(url: &str, path: &str, body: &[u8], kind: ArtifactKind) -> ManifestEntry {
    ManifestEntry {
        url: url.to_string(),
        path: path.to_string(),
        sha256: sha256_hex(body),
        bytes: body.len() as u64,
        kind,
        downloaded_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    }
}

#[test]
fn missing_manifest_loads_empty() {
    let temp = TempDir::new().unwrap();
    let manager = ManifestManager::load(&temp.path().join(MANIFEST_FILENAME)).unwrap();
    assert!(manager.manifest().is_empty());
}

#[test]
fn save_sorts_entries_and_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    let mut manager = ManifestManager::load(&path).unwrap();
    manager.upsert(entry("https://b.example/2", "b.md", b"b", ArtifactKind::Document));
    manager.upsert(entry("https://a.example/1", "images/a.png", b"a", ArtifactKind::Image));
    manager.upsert(entry("https://a.example/1", "a.md", b"a", ArtifactKind::Document));
    assert!(manager.save().unwrap());

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["schema_version"], 1);
    let keys: Vec<(String, String)> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["url"].as_str().unwrap().to_string(),
                e["kind"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            ("https://a.example/1".to_string(), "document".to_string()),
            ("https://a.example/1".to_string(), "image".to_string()),
            ("https://b.example/2".to_string(), "document".to_string()),
        ]
    );

    let reloaded = ManifestManager::load(&path).unwrap();
    assert_eq!(reloaded.manifest(), manager.manifest());
}

#[test]
fn unchanged_manifest_is_not_rewritten() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    let mut manager = ManifestManager::load(&path).unwrap();
    manager.upsert(entry("https://a.example/1", "a.md", b"a", ArtifactKind::Document));
    assert!(manager.save().unwrap());
    let before = fs::read(&path).unwrap();

    let mut again = ManifestManager::load(&path).unwrap();
    let mut same = entry("https://a.example/1", "a.md", b"a", ArtifactKind::Document);
    same.downloaded_at = Utc::now();
    assert_eq!(again.upsert(same), UpsertOutcome::Unchanged);
    assert!(!again.save().unwrap());
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn unsupported_schema_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    fs::write(&path, r#"{"schema_version": 99, "entries": []}"#).unwrap();
    let err = ManifestManager::load(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Invalid { .. }));
}

#[test]
fn malformed_json_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    fs::write(&path, "{ not json").unwrap();
    let err = ManifestManager::load(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Malformed { .. }));
}

#[test]
fn entries_escaping_the_root_are_rejected_on_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    let doc = serde_json::json!({
        "schema_version": 1,
        "entries": [{
            "url": "https://x.example/",
            "path": "../outside.md",
            "sha256": sha256_hex(b"x"),
            "bytes": 1,
            "kind": "document",
            "downloaded_at": "2024-01-01T00:00:00Z"
        }]
    });
    fs::write(&path, doc.to_string()).unwrap();
    let err = ManifestManager::load(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Invalid { .. }));
}

#[tokio::test]
async fn handle_serialises_concurrent_upserts() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(MANIFEST_FILENAME);
    let handle = ManifestHandle::spawn(ManifestManager::load(&path).unwrap());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let url = format!("https://img.example/{}.png", i % 10);
            let body = format!("img {}", i % 10);
            handle
                .upsert(entry(&url, &format!("images/{}.png", i % 10), body.as_bytes(), ArtifactKind::Image))
                .await
        }));
    }
    let mut inserted = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() == UpsertOutcome::Inserted {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 10);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 10);
    assert!(snapshot
        .get(&EntryKey::new("https://img.example/3.png", ArtifactKind::Image))
        .is_some());
    assert!(handle.save().await.unwrap());
    assert!(path.exists());
}
