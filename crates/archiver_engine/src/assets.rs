use std::collections::HashSet;

use archiver_core::{asset_file_name, asset_name_parts, ArchiveConfig, Asset, AssetKind};
use scraper::{Html, Selector};
use url::Url;

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
const DEFAULT_FILE_EXTENSION: &str = "bin";
/// Link targets with these extensions are pages, not attachments.
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp"];
const CDN_FETCH_MARKER: &str = "/image/fetch/";

/// Find the images and attachments referenced by `content_html`.
///
/// Relative references resolve against `base_url`. Each distinct attribute value
/// yields at most one asset, in document order.
pub fn discover_assets(content_html: &str, base_url: &str, config: &ArchiveConfig) -> Vec<Asset> {
    let flags = config.flags;
    if !flags.download_images && !flags.download_files {
        return Vec::new();
    }

    let fragment = Html::parse_fragment(content_html);
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    if flags.download_images {
        if let Ok(sel) = Selector::parse("img[src]") {
            for img in fragment.select(&sel) {
                let Some(raw) = img.value().attr("src") else {
                    continue;
                };
                if !seen.insert(raw.to_string()) {
                    continue;
                }
                if let Some(asset) = image_asset(raw, base.as_ref(), config) {
                    assets.push(asset);
                }
            }
        }
    }

    if flags.download_files {
        if let Ok(sel) = Selector::parse("a[href]") {
            for anchor in fragment.select(&sel) {
                let Some(raw) = anchor.value().attr("href") else {
                    continue;
                };
                if seen.contains(raw) {
                    continue;
                }
                if let Some(asset) = file_asset(raw, base.as_ref(), config) {
                    seen.insert(raw.to_string());
                    assets.push(asset);
                }
            }
        }
    }

    assets
}

fn image_asset(raw: &str, base: Option<&Url>, config: &ArchiveConfig) -> Option<Asset> {
    let resolved = resolve_url(raw, base)?;
    let source_url = config.image_quality.resolve_variant(resolved.as_str());
    let (name, extension) = asset_file_name(&source_url, DEFAULT_IMAGE_EXTENSION);
    Some(Asset {
        local_path: format!("{}/{name}", config.images_dir.trim_end_matches('/')),
        suggested_local_name: name,
        extension,
        source_url,
        reference: raw.to_string(),
        kind: AssetKind::Image,
        quality_tier: Some(config.image_quality),
    })
}

fn file_asset(raw: &str, base: Option<&Url>, config: &ArchiveConfig) -> Option<Asset> {
    let resolved = resolve_url(raw, base)?;
    if resolved.as_str().contains(CDN_FETCH_MARKER) {
        return None;
    }
    let (_, extension) = asset_name_parts(resolved.path());
    let extension = extension?;
    if PAGE_EXTENSIONS.contains(&extension.as_str()) || !config.allows_extension(&extension) {
        return None;
    }
    let source_url = String::from(resolved);
    let (name, extension) = asset_file_name(&source_url, DEFAULT_FILE_EXTENSION);
    Some(Asset {
        local_path: format!("{}/{name}", config.files_dir.trim_end_matches('/')),
        suggested_local_name: name,
        extension,
        source_url,
        reference: raw.to_string(),
        kind: AssetKind::File,
        quality_tier: None,
    })
}

/// Absolute http(s) URL for `reference`, or `None` for anchors, scripts, data URIs
/// and anything that cannot be resolved.
pub fn resolve_url(reference: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('?') {
        return None;
    }
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => base?.join(trimmed).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}
