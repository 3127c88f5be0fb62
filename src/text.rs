//! Rich-text HTML fragments to plain, lightly marked-up text.

use ego_tree::NodeRef;
use scraper::{node::Node, ElementRef, Html};

/// Converts an HTML fragment into a readable plain-text block.
///
/// Embedded images are dropped. Hyperlinks collapse to their visible text
/// when the link merely displays its own target or points at a relative
/// (intra-Redmine) location; remaining absolute links render as
/// `[text](href)`. Block elements become paragraph breaks, list items get a
/// `*` marker, and preformatted blocks keep their line structure. The
/// result is trimmed, and re-normalizing already-plain text returns it
/// unchanged.
pub fn normalize_fragment(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    normalize_element(fragment.root_element())
}

/// Same conversion over an element already parsed out of a larger page.
pub fn normalize_element(root: ElementRef<'_>) -> String {
    let mut writer = TextWriter::default();
    for child in root.children() {
        writer.visit(&child);
    }
    writer.finish()
}

#[derive(Default)]
struct TextWriter {
    out: String,
}

impl TextWriter {
    fn visit(&mut self, node: &NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.push_inline(text),
            Node::Element(element) => self.visit_element(node, element.name()),
            _ => {}
        }
    }

    fn visit_element(&mut self, node: &NodeRef<'_, Node>, tag: &str) {
        match tag {
            "img" | "script" | "style" | "head" | "title" => {}
            "br" => self.push_newline(),
            "a" => self.visit_link(node),
            "pre" => self.push_preformatted(node),
            "p" | "div" | "table" | "ul" | "ol" | "dl" | "blockquote" | "h1" | "h2" | "h3"
            | "h4" | "h5" | "h6" => {
                self.break_block();
                self.visit_children(node);
                self.break_block();
            }
            "li" | "dt" | "dd" => {
                self.break_line();
                if tag == "li" {
                    self.out.push_str("* ");
                }
                self.visit_children(node);
                self.break_line();
            }
            "tr" => {
                self.break_line();
                self.visit_children(node);
                self.break_line();
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: &NodeRef<'_, Node>) {
        for child in node.children() {
            self.visit(&child);
        }
    }

    fn visit_link(&mut self, node: &NodeRef<'_, Node>) {
        let href = match node.value() {
            Node::Element(element) => element.attr("href").map(str::to_string),
            _ => None,
        };
        let label = link_label(node);

        match href {
            Some(href) if keeps_link(&href, &label) => {
                self.push_inline(&format!("[{label}]({href})"));
            }
            _ => self.push_inline(&label),
        }
    }

    fn push_preformatted(&mut self, node: &NodeRef<'_, Node>) {
        let mut raw = String::new();
        collect_raw_text(node, &mut raw);

        let lines: Vec<&str> = raw
            .lines()
            .map(str::trim_end)
            .skip_while(|line| line.is_empty())
            .collect();
        let last_real = lines.iter().rposition(|line| !line.is_empty());

        self.break_block();
        if let Some(last) = last_real {
            for (index, line) in lines[..=last].iter().enumerate() {
                if index > 0 {
                    self.out.push('\n');
                }
                self.out.push_str(line);
            }
        }
        self.break_block();
    }

    /// Appends inline text: horizontal whitespace collapses to single
    /// spaces, newlines survive but never stack past a blank line.
    fn push_inline(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.push_newline();
            } else if ch.is_whitespace() {
                self.push_space();
            } else {
                self.out.push(ch);
            }
        }
    }

    fn push_space(&mut self) {
        if matches!(self.out.chars().last(), Some(c) if !c.is_whitespace()) {
            self.out.push(' ');
        }
    }

    fn push_newline(&mut self) {
        if self.out.is_empty() || self.out.ends_with("\n\n") {
            return;
        }
        while self.out.ends_with(' ') {
            self.out.pop();
        }
        self.out.push('\n');
    }

    fn break_block(&mut self) {
        if self.out.is_empty() {
            return;
        }
        while self.out.ends_with([' ', '\n']) {
            self.out.pop();
        }
        self.out.push_str("\n\n");
    }

    fn break_line(&mut self) {
        while self.out.ends_with(' ') {
            self.out.pop();
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn finish(self) -> String {
        self.out.trim().to_string()
    }
}

/// A link survives only when it is an absolute web URL that adds
/// information beyond its visible text.
fn keeps_link(href: &str, label: &str) -> bool {
    let absolute = href.starts_with("http://") || href.starts_with("https://");
    absolute && !label.is_empty() && href != label
}

/// Visible text of a link, images skipped, whitespace collapsed.
fn link_label(node: &NodeRef<'_, Node>) -> String {
    let mut raw = String::new();
    collect_label_text(node, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_label_text(node: &NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if element.name() == "img" => {}
            Node::Element(_) => collect_label_text(&child, out),
            _ => {}
        }
    }
}

fn collect_raw_text(node: &NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => collect_raw_text(&child, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_blank_lines() {
        let text = normalize_fragment("<p>First paragraph.</p><p>Second one.</p>");
        assert_eq!(text, "First paragraph.\n\nSecond one.");
    }

    #[test]
    fn images_are_dropped() {
        let text = normalize_fragment(r#"<p>Before <img src="shot.png" alt="screen"> after.</p>"#);
        assert_eq!(text, "Before after.");
    }

    #[test]
    fn self_referential_links_collapse_to_text() {
        let text = normalize_fragment(
            r#"<p>See <a href="http://example.com/a">http://example.com/a</a>.</p>"#,
        );
        assert_eq!(text, "See http://example.com/a.");
    }

    #[test]
    fn relative_links_collapse_to_text() {
        let text = normalize_fragment(r#"<p>Dup of <a href="/issues/17">bug 17</a>.</p>"#);
        assert_eq!(text, "Dup of bug 17.");
    }

    #[test]
    fn absolute_links_keep_their_target() {
        let text = normalize_fragment(r#"<p><a href="https://example.com/doc">the doc</a></p>"#);
        assert_eq!(text, "[the doc](https://example.com/doc)");
    }

    #[test]
    fn list_items_are_marked() {
        let text = normalize_fragment("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(text, "* one\n* two");
    }

    #[test]
    fn preformatted_blocks_keep_lines() {
        let text = normalize_fragment("<p>Trace:</p><pre>line one\nline two</pre>");
        assert_eq!(text, "Trace:\n\nline one\nline two");
    }

    #[test]
    fn emphasis_is_flattened() {
        let text = normalize_fragment("<p>A <strong>bold</strong> and <em>subtle</em> claim.</p>");
        assert_eq!(text, "A bold and subtle claim.");
    }

    #[test]
    fn idempotent_on_plain_text() {
        let samples = [
            "already plain",
            "two lines\nof text",
            "para one\n\npara two",
            "* one\n* two",
            "See [the doc](https://example.com/doc) for details.",
        ];
        for sample in samples {
            let once = normalize_fragment(sample);
            assert_eq!(once, sample, "first pass changed {sample:?}");
            assert_eq!(normalize_fragment(&once), once, "not idempotent on {sample:?}");
        }
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let text = normalize_fragment("  <p>  padded  </p>  ");
        assert_eq!(text, "padded");
    }
}
