use std::collections::BTreeMap;

use archiver_core::{ArtifactKind, Manifest};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use scraper::{Html, Selector};

use crate::convert::escape_html;

pub const INDEX_FILENAME: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub title: String,
    pub published: DateTime<Utc>,
    pub document_path: String,
}

/// Render the archive index page: newest post first, ties broken by path so the
/// output only depends on the set of entries.
pub fn build_index(entries: &[IndexEntry]) -> String {
    let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        b.published
            .cmp(&a.published)
            .then_with(|| a.document_path.cmp(&b.document_path))
    });

    let mut page = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Archive</title>\n</head>\n<body>\n<h1>Archive</h1>\n<ul>\n",
    );
    for entry in sorted {
        let date = entry.published.format("%Y-%m-%d");
        let stamp = entry.published.to_rfc3339_opts(SecondsFormat::Secs, true);
        page.push_str(&format!(
            "<li><time datetime=\"{stamp}\">{date}</time> <a href=\"{href}\">{title}</a></li>\n",
            href = escape_html(&entry.document_path),
            title = escape_html(&entry.title),
        ));
    }
    page.push_str("</ul>\n</body>\n</html>\n");
    page
}

/// Read back the entries of a page written by [`build_index`].
pub fn parse_index(page: &str) -> Vec<IndexEntry> {
    let (Ok(item_sel), Ok(time_sel), Ok(link_sel)) = (
        Selector::parse("li"),
        Selector::parse("time[datetime]"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };
    let document = Html::parse_document(page);
    document
        .select(&item_sel)
        .filter_map(|item| {
            let stamp = item.select(&time_sel).next()?.value().attr("datetime")?;
            let link = item.select(&link_sel).next()?;
            Some(IndexEntry {
                title: link.text().collect(),
                published: parse_stamp(stamp)?,
                document_path: link.value().attr("href")?.to_string(),
            })
        })
        .collect()
}

fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(stamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Entries for a rewritten index: `current` plus every `previous` entry whose
/// document the manifest still records. `current` wins when both list a path.
pub fn merge_index(
    previous: Vec<IndexEntry>,
    current: &[IndexEntry],
    manifest: &Manifest,
) -> Vec<IndexEntry> {
    let mut merged: BTreeMap<String, IndexEntry> = previous
        .into_iter()
        .filter(|entry| {
            manifest
                .find_by_path(&entry.document_path)
                .is_some_and(|recorded| recorded.kind == ArtifactKind::Document)
        })
        .map(|entry| (entry.document_path.clone(), entry))
        .collect();
    for entry in current {
        merged.insert(entry.document_path.clone(), entry.clone());
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(title: &str, day: u32, path: &str) -> IndexEntry {
        IndexEntry {
            title: title.to_string(),
            published: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            document_path: path.to_string(),
        }
    }

    #[test]
    fn newest_first_regardless_of_input_order() {
        let a = [entry("Old", 1, "old.md"), entry("New <3", 9, "new.md")];
        let b = [entry("New <3", 9, "new.md"), entry("Old", 1, "old.md")];
        let page = build_index(&a);
        assert_eq!(page, build_index(&b));
        let new_at = page.find("New &lt;3").unwrap();
        let old_at = page.find("Old").unwrap();
        assert!(new_at < old_at);
    }

    #[test]
    fn written_page_reads_back() {
        let entries = vec![entry("New <3 & more", 9, "new--ab.md"), entry("Old", 1, "old--cd.md")];
        let mut parsed = parse_index(&build_index(&entries));
        parsed.sort_by(|a, b| b.published.cmp(&a.published));
        assert_eq!(parsed, entries);
    }

    #[test]
    fn merge_keeps_recorded_documents_only() {
        use archiver_core::{sha256_hex, ManifestEntry};

        let mut manifest = Manifest::new();
        for (url, path) in [("https://ex.com/p/old", "old--cd.md"), ("https://ex.com/p/new", "new--ab.md")] {
            manifest.upsert(ManifestEntry {
                url: url.to_string(),
                path: path.to_string(),
                sha256: sha256_hex(path.as_bytes()),
                bytes: 1,
                kind: ArtifactKind::Document,
                downloaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            });
        }
        let previous = vec![
            entry("Old", 1, "old--cd.md"),
            entry("Stale title", 9, "new--ab.md"),
            entry("Dropped", 5, "gone--ef.html"),
        ];
        let current = [entry("New", 9, "new--ab.md")];

        let merged = merge_index(previous, &current, &manifest);
        assert_eq!(merged, vec![entry("New", 9, "new--ab.md"), entry("Old", 1, "old--cd.md")]);
    }
}
