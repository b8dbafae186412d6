// src/extractors/normalize.rs
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, Html};

static WHITESPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RUN_RE"));

// Elements whose text never renders.
const NON_RENDERED_TAGS: [&str; 3] = ["script", "style", "noscript"];

/// True when the text is one of the extractor's failure strings rather than content.
pub fn is_failure_signal(text: &str) -> bool {
    text.to_lowercase().contains("not found")
}

/// Cleans extracted text: non-breaking spaces become spaces, control
/// characters are dropped, whitespace runs collapse to one space and the
/// result is trimmed. Failure strings and empty input pass through untouched.
///
/// Idempotent: whitespace control characters are folded into the collapse
/// step instead of being deleted afterwards, so no double spaces can appear.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() || is_failure_signal(text) {
        return text.to_string();
    }

    let without_controls: String = text
        .replace('\u{a0}', " ")
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    WHITESPACE_RUN_RE
        .replace_all(&without_controls, " ")
        .trim()
        .to_string()
}

/// Flattens a parsed document to plain text: every rendered text node is
/// trimmed, blanks are dropped, and the rest are joined with single spaces.
pub fn document_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .map_or(false, |name| NON_RENDERED_TAGS.contains(&name));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_nbsp() {
        assert_eq!(clean_text("  Net\u{a0}sales \n\n increased\t 5%  "), "Net sales increased 5%");
    }

    #[test]
    fn removes_control_characters() {
        assert_eq!(clean_text("Revenue\u{0}\u{7f}\u{9f} grew"), "Revenue grew");
        assert_eq!(clean_text("a \u{1} b"), "a b");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "  a \u{1} b\u{a0}\u{a0}c\r\n",
            "Item 7.\u{85}Management\u{2019}s Discussion",
            "plain",
            "\t\u{0b}\u{0c}",
        ];
        for sample in samples {
            let once = clean_text(sample);
            assert_eq!(clean_text(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn failure_strings_pass_through() {
        assert_eq!(clean_text("Item 7  not found"), "Item 7  not found");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn document_text_skips_scripts_and_joins_nodes() {
        let html = r#"<html><head><style>p { color: red }</style></head>
            <body><p>Item 7.</p><div>  Management&#8217;s <b>Discussion</b></div>
            <script>var x = 1;</script></body></html>"#;
        let document = Html::parse_document(html);
        assert_eq!(document_text(&document), "Item 7. Management\u{2019}s Discussion");
    }
}
