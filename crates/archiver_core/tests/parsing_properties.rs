use std::path::Component;

use archiver_core::{check_relative, sanitize_component, Manifest, ManifestFile};
use proptest::prelude::*;

/// Path-like strings built from separators, dot segments and plain names.
fn path_like() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec!["..", ".", "a", "b.png", "/", "\\", "C:", " ", "%2e"]),
        0..10,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn accepted_relative_paths_never_leave_the_root(raw in prop_oneof![path_like(), "\\PC{0,40}"]) {
        if let Ok(path) = check_relative(&raw) {
            prop_assert!(path.components().all(|c| matches!(c, Component::Normal(_))), "{raw:?} -> {path:?}");
            prop_assert!(!path.as_os_str().is_empty());
        }
    }

    #[test]
    fn sanitized_names_are_single_safe_components(raw in "\\PC{0,120}") {
        let name = sanitize_component(&raw);
        prop_assert!(!name.is_empty());
        prop_assert!(!name.contains(['/', '\\']));
        prop_assert!(name != "." && name != "..");
        let checked = check_relative(&name);
        prop_assert!(checked.is_ok(), "{name:?}");
    }

    #[test]
    fn arbitrary_manifest_text_never_panics(text in "\\PC{0,200}") {
        if let Ok(file) = serde_json::from_str::<ManifestFile>(&text) {
            let _ = Manifest::from_file(file);
        }
    }

    #[test]
    fn loaded_manifests_only_hold_safe_paths(
        paths in prop::collection::vec(path_like(), 0..6),
        digest in "[0-9a-f]{64}|[0-9a-zA-Z]{0,70}",
    ) {
        let entries: Vec<_> = paths
            .iter()
            .enumerate()
            .map(|(i, path)| serde_json::json!({
                "url": format!("https://ex.com/{i}"),
                "path": path,
                "sha256": digest,
                "bytes": 1,
                "kind": "file",
                "downloaded_at": "2024-01-01T00:00:00Z",
            }))
            .collect();
        let text = serde_json::json!({"schema_version": 1, "entries": entries}).to_string();
        let file: ManifestFile = serde_json::from_str(&text).unwrap();
        if let Ok(manifest) = Manifest::from_file(file) {
            prop_assert_eq!(manifest.len(), paths.len());
            for entry in manifest.entries() {
                prop_assert!(check_relative(&entry.path).is_ok());
            }
        }
    }
}
