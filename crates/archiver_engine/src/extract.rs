use scraper::{Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub content_html: String,
}

/// Narrow a fetched page to the post body.
///
/// Fragments (no `<html>` or `<body>` element) are returned as-is. Full pages yield
/// the first `.body.markup`, `<article>`, or `<body>` element, in that order of
/// preference, plus the `<title>` text.
pub fn extract_content(html: &str) -> ExtractedContent {
    if !looks_like_page(html) {
        return ExtractedContent {
            title: None,
            content_html: Html::parse_fragment(html).root_element().inner_html(),
        };
    }

    let doc = Html::parse_document(html);
    let title = first_match(&doc, "title")
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let content_html = ["div.body.markup", "article", "body"]
        .iter()
        .find_map(|sel| first_match(&doc, sel))
        .map(|node| node.inner_html())
        .unwrap_or_else(|| doc.root_element().html());

    ExtractedContent {
        title,
        content_html,
    }
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<scraper::ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn looks_like_page(html: &str) -> bool {
    let head = html
        .get(..html.len().min(2048))
        .unwrap_or(html)
        .to_ascii_lowercase();
    head.contains("<html") || head.contains("<body") || head.contains("<!doctype")
}
