use archiver_core::{check_relative, ArchiveConfig, ArchiveFlags};
use archiver_engine::{discover_assets, resolve_url};
use proptest::prelude::*;
use url::Url;

fn reference() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,60}",
        prop::collection::vec(
            prop::sample::select(vec![
                "/", "..", ".", "%2F", "%2e", "\\", "img", "a.png", "?x=1", "#f", "https://", "cdn",
                "/image/fetch/", "https%3A%2F%2F", "javascript:", "data:",
            ]),
            0..10,
        )
        .prop_map(|parts| parts.concat()),
    ]
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

proptest! {
    #[test]
    fn resolved_urls_are_http_only(raw in reference()) {
        let base = Url::parse("https://blog.example/p/post").unwrap();
        if let Some(url) = resolve_url(&raw, Some(&base)) {
            prop_assert!(matches!(url.scheme(), "http" | "https"), "{raw:?} -> {url}");
        }
        let _ = resolve_url(&raw, None);
    }

    #[test]
    fn planned_asset_paths_stay_in_their_directory(refs in prop::collection::vec(reference(), 1..5)) {
        let config = ArchiveConfig {
            flags: ArchiveFlags {
                download_images: true,
                download_files: true,
                ..ArchiveFlags::default()
            },
            ..ArchiveConfig::default()
        };
        let html: String = refs
            .iter()
            .map(|r| {
                let r = escape_attribute(r);
                format!("<p><img src=\"{r}\"><a href=\"{r}\">f</a></p>")
            })
            .collect();

        for asset in discover_assets(&html, "https://blog.example/p/post", &config) {
            let checked = check_relative(&asset.local_path);
            prop_assert!(checked.is_ok(), "{:?}", asset.local_path);
            prop_assert!(
                asset.local_path.starts_with("images/") || asset.local_path.starts_with("files/"),
                "{:?}",
                asset.local_path
            );
            prop_assert_eq!(asset.local_path.matches('/').count(), 1);
        }
    }
}
