use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Render an HTML fragment as readable plain text.
///
/// Block elements become paragraphs, list items get a `- ` bullet, images become
/// `[image: <src>]`, and links keep their text followed by the target in angle
/// brackets when the two differ.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut ctx = TextContext::default();
    for child in fragment.root_element().children() {
        visit_node(child, &mut ctx);
    }
    ctx.finish()
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut TextContext) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_children(element: ElementRef<'_>, ctx: &mut TextContext) {
    for child in element.children() {
        visit_node(child, ctx);
    }
}

fn visit_element(element: ElementRef<'_>, ctx: &mut TextContext) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "br" => ctx.line_break(),
        "hr" => {
            ctx.paragraph_break();
            ctx.append_raw("----");
            ctx.paragraph_break();
        }
        "img" => {
            if let Some(src) = element.value().attr("src").map(str::trim) {
                if !src.is_empty() {
                    ctx.append_raw(&format!("[image: {src}]"));
                }
            }
        }
        "a" => {
            let start = ctx.out.len();
            visit_children(element, ctx);
            let label = ctx.out[start..].trim().to_string();
            if let Some(href) = element.value().attr("href").map(str::trim) {
                if !href.is_empty() && !href.starts_with('#') && label != href {
                    ctx.append_raw(&format!(" <{href}>"));
                }
            }
        }
        "li" => {
            ctx.line_break();
            ctx.append_raw("- ");
            visit_children(element, ctx);
            ctx.line_break();
        }
        "ul" | "ol" => {
            ctx.paragraph_break();
            visit_children(element, ctx);
            ctx.paragraph_break();
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            ctx.paragraph_break();
            let start = ctx.out.len();
            visit_children(element, ctx);
            let width = ctx.out[start..].trim().chars().count();
            if width > 0 && matches!(tag.as_str(), "h1" | "h2") {
                let rule = if tag == "h1" { '=' } else { '-' };
                ctx.line_break();
                ctx.append_raw(&rule.to_string().repeat(width));
            }
            ctx.paragraph_break();
        }
        "p" | "div" | "section" | "article" | "header" | "footer" | "figure" | "figcaption"
        | "table" | "tr" | "blockquote" | "pre" => {
            ctx.paragraph_break();
            visit_children(element, ctx);
            ctx.paragraph_break();
        }
        "script" | "style" | "noscript" | "iframe" | "template" | "nav" => {}
        _ => visit_children(element, ctx),
    }
}

#[derive(Default)]
struct TextContext {
    out: String,
    /// Pending newlines owed before the next visible character (0, 1 or 2).
    pending_breaks: u8,
}

impl TextContext {
    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.out.is_empty() || self.pending_breaks > 0 || self.out.ends_with(' ') {
                    continue;
                }
                self.out.push(' ');
            } else {
                self.flush_breaks();
                self.out.push(ch);
            }
        }
    }

    fn append_raw(&mut self, text: &str) {
        self.flush_breaks();
        self.out.push_str(text);
    }

    fn line_break(&mut self) {
        self.pending_breaks = self.pending_breaks.max(1);
    }

    fn paragraph_break(&mut self) {
        self.pending_breaks = 2;
    }

    fn flush_breaks(&mut self) {
        if self.pending_breaks == 0 || self.out.is_empty() {
            self.pending_breaks = 0;
            return;
        }
        while self.out.ends_with(' ') {
            self.out.pop();
        }
        for _ in 0..self.pending_breaks {
            self.out.push('\n');
        }
        self.pending_breaks = 0;
    }

    fn finish(self) -> String {
        self.out
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::html_to_text;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_blocks_lists_and_images() {
        let html = "<h1>Title</h1><p>Hello   <b>world</b>.</p><ul><li>one</li><li>two</li></ul><p><img src=\"images/a--1.png\"></p>";
        assert_eq!(
            html_to_text(html),
            "Title\n=====\n\nHello world.\n\n- one\n- two\n\n[image: images/a--1.png]"
        );
    }

    #[test]
    fn links_keep_their_target() {
        let html = "<p>See <a href=\"https://ex.com/x\">this</a> and <a href=\"https://ex.com/y\">https://ex.com/y</a></p>";
        assert_eq!(
            html_to_text(html),
            "See this <https://ex.com/x> and https://ex.com/y"
        );
    }
}
