// src/utils/html_debug.rs
use crate::extractors::normalize::is_failure_signal;
use crate::extractors::SectionExtractor;
use crate::utils::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

static ITEM_7_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)item\s*7").expect("Failed to compile ITEM_7_MENTION_RE"));

static MDNA_MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)management['’]s discussion").expect("Failed to compile MDNA_MENTION_RE")
});

const PREVIEW_CHARS: usize = 200;

/// What the extractor makes of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugReport {
    pub size_bytes: usize,
    pub item7_mentions: usize,
    pub mdna_mentions: usize,
    /// Characters in the extracted section, or in the failure message.
    pub result_len: usize,
    pub preview: String,
    pub would_succeed: bool,
    pub annotated_path: Option<PathBuf>,
}

/// Runs extraction on one file and counts the heading mentions it contains.
/// An annotated copy of the markup is written next to the file when possible.
pub fn debug_extraction(path: &Path, extractor: &SectionExtractor, min_section_chars: usize) -> Result<DebugReport, AppError> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);

    let item7_mentions = ITEM_7_MENTION_RE.find_iter(&content).count();
    let mdna_mentions = MDNA_MENTION_RE.find_iter(&content).count();

    let result = extractor
        .extract_item_7(&content)
        .unwrap_or_else(|e| e.to_string());
    let result_len = result.chars().count();
    let preview: String = result.chars().take(PREVIEW_CHARS).collect();
    let would_succeed = result_len > min_section_chars && !is_failure_signal(&result);

    let annotated = annotated_path(path);
    let annotated_path = match create_debug_html(&content, &annotated) {
        Ok(()) => Some(annotated),
        Err(e) => {
            tracing::warn!("Failed to create debug HTML: {}", e);
            None
        }
    };

    Ok(DebugReport {
        size_bytes: bytes.len(),
        item7_mentions,
        mdna_mentions,
        result_len,
        preview,
        would_succeed,
        annotated_path,
    })
}

/// `<file>.annotated.html`, alongside the original.
pub fn annotated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".annotated.html");
    path.with_file_name(name)
}

/// Saves a HTML document with the given byte ranges wrapped in highlight spans.
/// Ranges overlapping an earlier highlight are skipped.
pub fn save_debug_html(html: &str, path: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    let mut file = File::create(path)?;

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    debug_html.push_str(".highlight-item7 { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-mdna { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0);

    let mut last_pos = 0;
    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > html.len() || start >= end {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match highlight_type {
            "item7" => "highlight-item7",
            "mdna" => "highlight-mdna",
            _ => "highlight-custom",
        };
        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type
        ));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }
    debug_html.push_str(&html[last_pos..]);
    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;
    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Highlights every Item 7 and MD&A heading mention in the document.
pub fn create_debug_html(html: &str, path: &Path) -> Result<(), AppError> {
    let mut highlights = Vec::new();
    for (re, kind) in [(&*ITEM_7_MENTION_RE, "item7"), (&*MDNA_MENTION_RE, "mdna")] {
        highlights.extend(re.find_iter(html).map(|m| (m.start(), m.end(), kind)));
    }
    save_debug_html(html, path, &highlights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_mentions_and_annotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filing.htm");
        let body = "Revenue grew in every geographic segment this year. ".repeat(30);
        std::fs::write(
            &path,
            format!(
                "<html><body><p>Item 7. Management's Discussion and Analysis</p><p>{}</p><p>Item 8. Financial Statements</p></body></html>",
                body
            ),
        )
        .unwrap();

        let report = debug_extraction(&path, &SectionExtractor::new(1000, 1000), 1000).unwrap();

        assert_eq!(report.item7_mentions, 1);
        assert_eq!(report.mdna_mentions, 1);
        assert!(report.would_succeed);
        assert!(report.preview.starts_with("Item 7. Management's Discussion"));
        assert_eq!(report.preview.chars().count(), 200);

        let annotated = report.annotated_path.unwrap();
        assert_eq!(annotated, dir.path().join("filing.htm.annotated.html"));
        let html = std::fs::read_to_string(annotated).unwrap();
        assert!(html.contains("<span class=\"highlight-item7\""));
        assert!(html.contains("<span class=\"highlight-mdna\""));
    }

    #[test]
    fn failing_document_reports_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.htm");
        std::fs::write(&path, "<html>Item 7</html>").unwrap();

        let report = debug_extraction(&path, &SectionExtractor::new(1000, 1000), 1000).unwrap();
        assert_eq!(report.preview, "File too small or empty");
        assert!(!report.would_succeed);
    }

    #[test]
    fn overlapping_highlights_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.html");
        save_debug_html("abcdef", &path, &[(0, 4, "item7"), (2, 5, "mdna")]).unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<span class=\"highlight-item7\" title=\"Position: 0-4, Type: item7\">abcd</span>ef"));
        assert!(!html.contains("highlight-mdna\" title"));
    }
}
