use std::collections::HashSet;

use archive_logging::{archive_debug, archive_warn, redact_url};
use archiver_core::{document_file_name, ArchiveConfig, Asset, ContentBlob, OutputFormat, Post};

use crate::assets::discover_assets;
use crate::convert::{renderer_for, DocumentParts};
use crate::decode::decode_bytes;
use crate::extract::extract_content;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("content of {url} is empty")]
    EmptyContent { url: String },
    #[error("content of {url} is {media_kind}, not HTML")]
    NotHtml { url: String, media_kind: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDocument {
    /// Document path relative to the archive root.
    pub relative_path: String,
    pub body: String,
    pub format: OutputFormat,
}

/// A rendered post plus the assets it references.
///
/// `document` assumes every asset ends up at its planned local path. When some
/// asset cannot be written, [`ProcessedPost::reconcile`] renders the document again
/// with those references left pointing at the remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPost {
    pub post: Post,
    pub title: String,
    pub document: ProcessedDocument,
    pub assets: Vec<Asset>,
    content_html: String,
    add_source_url: bool,
}

impl ProcessedPost {
    /// Render the document again with `failed` assets pointing at their remote URL.
    pub fn reconcile(&self, failed: &[&Asset]) -> ProcessedDocument {
        if failed.is_empty() {
            return self.document.clone();
        }
        let failed_refs: HashSet<&str> = failed.iter().map(|a| a.reference.as_str()).collect();
        let rewrites: Vec<(&str, &str)> = self
            .assets
            .iter()
            .map(|a| {
                let target = if failed_refs.contains(a.reference.as_str()) {
                    a.source_url.as_str()
                } else {
                    a.local_path.as_str()
                };
                (a.reference.as_str(), target)
            })
            .collect();
        render(
            &self.post,
            &self.title,
            &self.content_html,
            &rewrites,
            self.document.format,
            self.add_source_url,
        )
    }
}

/// Turns fetched post content into an archive document.
#[derive(Debug, Default, Clone, Copy)]
pub struct Processor;

impl Processor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(
        &self,
        post: &Post,
        blob: &ContentBlob,
        config: &ArchiveConfig,
    ) -> Result<ProcessedPost, ProcessError> {
        if let Some(kind) = blob.media_kind.as_deref() {
            if !is_html_like(kind) {
                return Err(ProcessError::NotHtml {
                    url: redact_url(&post.source_url),
                    media_kind: kind.to_string(),
                });
            }
        }

        let decoded = decode_bytes(&blob.bytes, blob.media_kind.as_deref());
        if decoded.lossy {
            archive_warn!(
                "{} contained malformed {} sequences",
                redact_url(&post.source_url),
                decoded.encoding
            );
        }
        if decoded.text.trim().is_empty() {
            return Err(ProcessError::EmptyContent {
                url: redact_url(&post.source_url),
            });
        }

        let extracted = extract_content(&decoded.text);
        let title = if post.title.trim().is_empty() {
            extracted.title.unwrap_or_else(|| post.slug.clone())
        } else {
            post.title.clone()
        };

        let assets = discover_assets(&extracted.content_html, &post.source_url, config);
        archive_debug!(
            "{} references {} asset(s)",
            redact_url(&post.source_url),
            assets.len()
        );

        let rewrites: Vec<(&str, &str)> = assets
            .iter()
            .map(|a| (a.reference.as_str(), a.local_path.as_str()))
            .collect();
        let document = render(
            post,
            &title,
            &extracted.content_html,
            &rewrites,
            config.format,
            config.flags.add_source_url,
        );

        Ok(ProcessedPost {
            post: post.clone(),
            title,
            document,
            assets,
            content_html: extracted.content_html,
            add_source_url: config.flags.add_source_url,
        })
    }
}

fn render(
    post: &Post,
    title: &str,
    content_html: &str,
    rewrites: &[(&str, &str)],
    format: OutputFormat,
    add_source_url: bool,
) -> ProcessedDocument {
    let body_html = rewrite_references(content_html, rewrites);
    let body = renderer_for(format).render(&DocumentParts {
        title,
        published: &post.publish_timestamp,
        stable_id: &post.stable_id,
        source_url: &post.source_url,
        body_html: &body_html,
        add_source_url,
    });
    ProcessedDocument {
        relative_path: document_file_name(&post.slug, &post.source_url, format),
        body,
        format,
    }
}

/// Replace every attribute value equal to a reference with its target.
///
/// `html` is serializer output, so attribute values appear double-quoted with
/// `&`, `"` and no-break spaces escaped; references are escaped the same way
/// before matching.
fn rewrite_references(html: &str, rewrites: &[(&str, &str)]) -> String {
    let mut out = html.to_string();
    for (reference, target) in rewrites {
        if reference == target {
            continue;
        }
        let from = format!("=\"{}\"", escape_attribute(reference));
        let to = format!("=\"{}\"", escape_attribute(target));
        out = out.replace(&from, &to);
    }
    out
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('"', "&quot;")
}

fn is_html_like(media_kind: &str) -> bool {
    let essence = media_kind
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.is_empty()
        || essence == "text/html"
        || essence == "application/xhtml+xml"
        || essence == "text/plain"
}
