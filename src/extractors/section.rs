// src/extractors/section.rs

// --- Imports ---
use crate::extractors::normalize::{clean_text, document_text};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

// --- Regex Patterns (Lazy Static) ---
// The apostrophe in "Management's" shows up as ', ’, ‘ or ` depending on the filer.
static ITEM_7_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Item\s+7\.\s+Management['’‘`s]{0,2}\s+Discussion\s+and\s+Analysis")
        .expect("Failed to compile ITEM_7_HEADING_RE")
});

static MDNA_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Management['’‘`s]{0,2}\s+Discussion\s+and\s+Analysis")
        .expect("Failed to compile MDNA_TITLE_RE")
});

static MDNA_ABBREVIATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)MD&A").expect("Failed to compile MDNA_ABBREVIATION_RE"));

static ITEM_7_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Item\s+7\.").expect("Failed to compile ITEM_7_NUMBER_RE"));

// Item 7A (market risk) or Item 8 (financial statements) closes the section.
static ITEM_7_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Item\s+7A\.|Item\s+8\.").expect("Failed to compile ITEM_7_END_RE")
});

// --- Data Structures ---

/// One occurrence of a section heading and the span it governs, as byte
/// offsets into the flattened document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMatch {
    pub start: usize,
    pub end: usize,
    pub char_len: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractedSection {
    pub section_name: String,
    pub content: String,
    /// Path of the source document relative to the batch input directory.
    pub source_name: String,
    pub source_stem: String,
    pub fiscal_year: String,
}

/// A way of locating candidate section spans in flattened document text.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn find_candidates(&self, text: &str) -> Vec<CandidateMatch>;
}

/// Spans run from each heading match up to the next end marker, or to the
/// end of the text. Matches never overlap: the search resumes where the
/// previous span stopped.
pub struct PatternExtractionStrategy {
    name: &'static str,
    start: &'static Regex,
    end: &'static Regex,
}

impl PatternExtractionStrategy {
    pub fn new(name: &'static str, start: &'static Regex, end: &'static Regex) -> Self {
        Self { name, start, end }
    }
}

impl ExtractionStrategy for PatternExtractionStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn find_candidates(&self, text: &str) -> Vec<CandidateMatch> {
        let mut candidates = Vec::new();
        let mut pos = 0;

        while pos <= text.len() {
            let Some(heading) = self.start.find_at(text, pos) else {
                break;
            };
            let end = self
                .end
                .find_at(text, heading.end())
                .map_or(text.len(), |m| m.start());

            candidates.push(CandidateMatch {
                start: heading.start(),
                end,
                char_len: text[heading.start()..end].chars().count(),
            });
            pos = end.max(heading.end());
        }

        candidates
    }
}

/// Picks the longest candidate; on ties the earliest one wins.
pub fn longest_candidate(candidates: &[CandidateMatch]) -> Option<CandidateMatch> {
    candidates.iter().fold(None, |best: Option<CandidateMatch>, c| match best {
        Some(b) if b.char_len >= c.char_len => Some(b),
        _ => Some(*c),
    })
}

// --- Main Extractor Structure ---

/// Locates the MD&A (Item 7) narrative in a filing document.
///
/// Strategies are tried in order; the first one producing any candidate
/// decides, and the longest of its candidates is taken as the real section.
/// Table-of-contents entries match the same heading but stop at the next
/// listed item almost immediately, so they lose on length.
pub struct SectionExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    min_document_chars: usize,
    min_section_chars: usize,
}

impl SectionExtractor {
    pub fn new(min_document_chars: usize, min_section_chars: usize) -> Self {
        let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
            Box::new(PatternExtractionStrategy::new("item-7-heading", &ITEM_7_HEADING_RE, &ITEM_7_END_RE)),
            Box::new(PatternExtractionStrategy::new("mdna-title", &MDNA_TITLE_RE, &ITEM_7_END_RE)),
            Box::new(PatternExtractionStrategy::new("mdna-abbreviation", &MDNA_ABBREVIATION_RE, &ITEM_7_END_RE)),
            Box::new(PatternExtractionStrategy::new("item-7-number", &ITEM_7_NUMBER_RE, &ITEM_7_END_RE)),
        ];
        Self { strategies, min_document_chars, min_section_chars }
    }

    /// Extracts the cleaned Item 7 text from raw HTML.
    pub fn extract_item_7(&self, html_content: &str) -> Result<String, ExtractError> {
        if html_content.trim().is_empty() || html_content.chars().count() < self.min_document_chars {
            return Err(ExtractError::TooSmall);
        }

        let document = Html::parse_document(html_content);
        let text = document_text(&document);
        tracing::debug!("Flattened document to {} bytes of text", text.len());

        self.extract_from_text(&text)
    }

    /// Runs the strategy chain over already-flattened text.
    pub fn extract_from_text(&self, text: &str) -> Result<String, ExtractError> {
        let (strategy, best) = self
            .strategies
            .iter()
            .find_map(|strategy| {
                let candidates = strategy.find_candidates(text);
                tracing::trace!("Strategy '{}' produced {} candidates", strategy.name(), candidates.len());
                longest_candidate(&candidates).map(|best| (strategy.name(), best))
            })
            .ok_or(ExtractError::SectionNotFound)?;

        tracing::debug!(
            "Selected {} char span at byte {} using strategy '{}'",
            best.char_len,
            best.start,
            strategy
        );

        let section = clean_text(text[best.start..best.end].trim());
        if section.chars().count() < self.min_section_chars {
            tracing::debug!("Section from '{}' is only {} chars", strategy, section.chars().count());
            return Err(ExtractError::SectionTooShort);
        }

        Ok(section)
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn body(sentences: usize) -> String {
        "Net sales increased due to higher demand for services and products. ".repeat(sentences)
    }

    fn filing(inner: &str) -> String {
        format!("<html><head><title>10-K</title></head><body>{}</body></html>", inner)
    }

    #[test]
    fn small_documents_are_rejected() {
        let extractor = SectionExtractor::new(1000, 1000);
        let err = extractor.extract_item_7("<html><body>Item 7.</body></html>").unwrap_err();
        assert_eq!(err.to_string(), "File too small or empty");
        assert_eq!(extractor.extract_item_7("").unwrap_err(), ExtractError::TooSmall);
    }

    #[test]
    fn body_section_beats_table_of_contents_entry() {
        let html = filing(&format!(
            r#"<table>
                 <tr><td>Item 7. Management&#8217;s Discussion and Analysis of Financial Condition</td><td>21</td></tr>
                 <tr><td>Item 7A. Quantitative and Qualitative Disclosures About Market Risk</td><td>30</td></tr>
                 <tr><td>Item 8. Financial Statements and Supplementary Data</td><td>31</td></tr>
               </table>
               <p>Item 7. Management&#8217;s Discussion and Analysis of Financial Condition and Results of Operations</p>
               <p>{}</p>
               <p>Item 7A. Quantitative and Qualitative Disclosures About Market Risk</p>
               <p>Interest rate risk is limited.</p>"#,
            body(30)
        ));

        let extractor = SectionExtractor::new(1000, 1000);
        let section = extractor.extract_item_7(&html).unwrap();

        assert!(section.starts_with("Item 7. Management\u{2019}s Discussion and Analysis of Financial Condition and Results"));
        assert!(section.contains("Net sales increased"));
        assert!(!section.contains("Item 7A."));
        assert!(!section.contains("Interest rate risk"));
        assert!(section.chars().count() > 1000);
    }

    #[test]
    fn falls_back_to_title_without_item_number() {
        let html = filing(&format!(
            "<h2>Management's Discussion and Analysis</h2><p>{}</p><h2>Item 8. Financial Statements</h2>",
            body(25)
        ));
        let extractor = SectionExtractor::new(1000, 1000);
        let section = extractor.extract_item_7(&html).unwrap();
        assert!(section.starts_with("Management's Discussion and Analysis"));
        assert!(!section.contains("Financial Statements"));
    }

    #[test]
    fn falls_back_to_abbreviation_then_bare_item_number() {
        let extractor = SectionExtractor::new(1000, 1000);

        let abbreviated = format!("MD&A overview. {}", body(20));
        assert!(extractor.extract_from_text(&abbreviated).unwrap().starts_with("MD&A overview."));

        let numbered = format!("Item 7. Operating Review {} Item 8. Statements", body(20));
        let section = extractor.extract_from_text(&numbered).unwrap();
        assert!(section.starts_with("Item 7. Operating Review"));
        assert!(section.ends_with("products."));
    }

    #[test]
    fn section_runs_to_end_of_document_without_end_marker() {
        let text = format!("Item 7. Management's Discussion and Analysis {}", body(20));
        let extractor = SectionExtractor::new(1000, 1000);
        let section = extractor.extract_from_text(&text).unwrap();
        assert_eq!(section, clean_text(&text));
    }

    #[test]
    fn missing_heading_reports_not_found() {
        let html = filing(&format!("<p>{}</p>", body(30)));
        let extractor = SectionExtractor::new(1000, 1000);
        let err = extractor.extract_item_7(&html).unwrap_err();
        assert_eq!(err.to_string(), "Item 7 not found");
    }

    #[test]
    fn short_section_is_rejected() {
        let html = filing(&format!(
            "<p>{}</p><p>Item 7. Management's Discussion and Analysis</p><p>See annual report.</p><p>Item 8. Financial Statements</p>",
            body(30)
        ));
        let extractor = SectionExtractor::new(1000, 1000);
        let err = extractor.extract_item_7(&html).unwrap_err();
        assert_eq!(err.to_string(), "Extracted Item 7 too short");
    }

    #[test]
    fn candidates_do_not_overlap_and_longest_wins() {
        let strategy = PatternExtractionStrategy::new("item-7-number", &ITEM_7_NUMBER_RE, &ITEM_7_END_RE);
        let text = "Item 7. toc Item 8. x Item 7. the real and longer body Item 7A. y";
        let candidates = strategy.find_candidates(text);

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].end <= candidates[1].start);
        let best = longest_candidate(&candidates).unwrap();
        assert_eq!(&text[best.start..best.end], "Item 7. the real and longer body ");
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let a = CandidateMatch { start: 0, end: 5, char_len: 5 };
        let b = CandidateMatch { start: 10, end: 15, char_len: 5 };
        assert_eq!(longest_candidate(&[a, b]), Some(a));
        assert_eq!(longest_candidate(&[]), None);
    }
}
