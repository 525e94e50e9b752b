use archiver_core::OutputFormat;
use chrono::{DateTime, Utc};

use crate::frontmatter::build_front_matter;
use crate::text::html_to_text;

/// Everything a renderer needs for one post.
#[derive(Debug, Clone, Copy)]
pub struct DocumentParts<'a> {
    pub title: &'a str,
    pub published: &'a DateTime<Utc>,
    pub stable_id: &'a str,
    pub source_url: &'a str,
    pub body_html: &'a str,
    pub add_source_url: bool,
}

pub trait Renderer: Send + Sync {
    fn render(&self, parts: &DocumentParts<'_>) -> String;
}

pub fn renderer_for(format: OutputFormat) -> &'static dyn Renderer {
    match format {
        OutputFormat::Html => &HtmlRenderer,
        OutputFormat::Md => &MarkdownRenderer,
        OutputFormat::Txt => &TextRenderer,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, parts: &DocumentParts<'_>) -> String {
        let title = escape_html(parts.title);
        let date = parts.published.format("%Y-%m-%d");
        let mut doc = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<article>\n<h1>{title}</h1>\n<p><time datetime=\"{date}\">{date}</time></p>\n{body}\n</article>\n",
            body = parts.body_html.trim(),
        );
        if parts.add_source_url {
            let url = escape_html(parts.source_url);
            doc.push_str(&format!(
                "<footer><p>Source: <a href=\"{url}\">{url}</a></p></footer>\n"
            ));
        }
        doc.push_str("</body>\n</html>\n");
        doc
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, parts: &DocumentParts<'_>) -> String {
        let mut doc = build_front_matter(parts.title, parts.published, parts.stable_id);
        doc.push_str(&format!("# {}\n\n", parts.title));
        doc.push_str(html2md::parse_html(parts.body_html).trim());
        doc.push('\n');
        if parts.add_source_url {
            doc.push_str(&format!("\n---\n\nSource: <{}>\n", parts.source_url));
        }
        doc
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&self, parts: &DocumentParts<'_>) -> String {
        let rule = "=".repeat(parts.title.chars().count().max(1));
        let mut doc = format!(
            "{}\n{rule}\n{}\n\n",
            parts.title,
            parts.published.format("%Y-%m-%d")
        );
        doc.push_str(&html_to_text(parts.body_html));
        doc.push('\n');
        if parts.add_source_url {
            doc.push_str(&format!("\nSource: {}\n", parts.source_url));
        }
        doc
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parts<'a>(published: &'a DateTime<Utc>, add_source_url: bool) -> DocumentParts<'a> {
        DocumentParts {
            title: "Fish & Chips",
            published,
            stable_id: "7",
            source_url: "https://ex.com/p/fish",
            body_html: "<p>Hello <strong>there</strong></p>",
            add_source_url,
        }
    }

    #[test]
    fn html_escapes_title_and_appends_source() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let doc = HtmlRenderer.render(&parts(&date, true));
        assert!(doc.contains("<title>Fish &amp; Chips</title>"));
        assert!(doc.contains("<time datetime=\"2024-01-02\">2024-01-02</time>"));
        assert!(doc.contains("Source: <a href=\"https://ex.com/p/fish\">"));
    }

    #[test]
    fn markdown_has_front_matter_and_heading() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let doc = MarkdownRenderer.render(&parts(&date, false));
        assert!(doc.starts_with("---\ntitle: Fish & Chips\ndate: 2024-01-02\nid: \"7\"\n---\n\n# Fish & Chips\n\n"));
        assert!(doc.contains("**there**"));
        assert!(!doc.contains("Source:"));
    }

    #[test]
    fn text_underlines_the_title() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let doc = TextRenderer.render(&parts(&date, true));
        assert!(doc.starts_with("Fish & Chips\n============\n2024-01-02\n\nHello there\n"));
        assert!(doc.ends_with("\nSource: https://ex.com/p/fish\n"));
    }
}
