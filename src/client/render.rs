//! Markdown-to-HTML conversion restricted to a safe element set.
//!
//! Raw HTML in the source is re-escaped as text instead of being passed
//! through, so the output only ever contains elements the markdown renderer
//! itself emits. Link and image destinations outside a small scheme
//! allow-list are stripped (their inner text survives).

use pulldown_cmark::{html, Event, Options, Parser, Tag};

/// Convert raw assistant text to sanitized HTML. Returns `None` for empty or
/// whitespace-only input (nothing to render). Never returns an empty body:
/// if conversion yields nothing for non-empty input, the escaped raw text is
/// used instead.
pub fn render_markdown(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(raw, options).filter_map(|event| match event {
        Event::Html(markup) => Some(Event::Text(markup)),
        Event::Start(Tag::Link(_, ref dest, _)) | Event::End(Tag::Link(_, ref dest, _))
            if !safe_destination(dest) =>
        {
            None
        }
        Event::Start(Tag::Image(_, ref dest, _)) | Event::End(Tag::Image(_, ref dest, _))
            if !safe_destination(dest) =>
        {
            None
        }
        other => Some(other),
    });

    let mut out = String::new();
    html::push_html(&mut out, events);

    if out.trim().is_empty() {
        return Some(format!("<p>{}</p>\n", html_escape::encode_text(raw)));
    }
    Some(out)
}

fn safe_destination(dest: &str) -> bool {
    let dest = dest.trim();
    let lower = dest.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || dest.starts_with('#')
        || dest.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        assert_eq!(
            render_markdown("**bold** and _em_").as_deref(),
            Some("<p><strong>bold</strong> and <em>em</em></p>\n")
        );
    }

    #[test]
    fn plain_text_becomes_a_paragraph() {
        assert_eq!(render_markdown("Hi there").as_deref(), Some("<p>Hi there</p>\n"));
    }

    #[test]
    fn whitespace_only_input_is_skipped() {
        assert!(render_markdown("").is_none());
        assert!(render_markdown("   \n\t").is_none());
    }

    #[test]
    fn raw_html_is_escaped_not_passed_through() {
        let out = render_markdown("<script>alert(1)</script>").unwrap();
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn inline_html_is_escaped() {
        let out = render_markdown("hello <img src=x onerror=alert(1)> world").unwrap();
        assert!(!out.contains("<img"));
        assert!(out.contains("&lt;img"));
    }

    #[test]
    fn javascript_links_are_stripped_but_text_survives() {
        let out = render_markdown("[click](javascript:alert(1))").unwrap();
        assert_eq!(out, "<p>click</p>\n");
    }

    #[test]
    fn http_links_are_kept() {
        let out = render_markdown("[site](https://example.com)").unwrap();
        assert!(out.contains(r#"<a href="https://example.com">site</a>"#));
    }

    #[test]
    fn code_blocks_render_as_pre() {
        let out = render_markdown("```\nlet x = 1;\n```").unwrap();
        assert!(out.contains("<pre><code>"));
        assert!(out.contains("let x = 1;"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let input = "# Title\n\nsome *text* with [a link](https://example.com)";
        assert_eq!(render_markdown(input), render_markdown(input));
    }
}
