// src/extractors/fiscal_year.rs
use once_cell::sync::Lazy;
use regex::Regex;

pub const UNKNOWN_YEAR: &str = "unknown_year";

// Content heuristics, tried in order. Capture group 1 is the year.
static CONTENT_YEAR_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)fiscal\s+year\s+ended\s+.*?\b(20\d{2})\b",
        r"(?i)for\s+the\s+year\s+ended\s+.*?\b(20\d{2})\b",
        r"(?i)\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+(20\d{2})\b",
        r"(?i)\bFY\s*(20\d{2})\b",
        r"(?i)\b(20\d{2})\s+Annual\s+Report",
    ]
    .iter()
    .map(|pat| Regex::new(pat).expect("Failed to compile CONTENT_YEAR_RE"))
    .collect()
});

// 0000320193-23-000106: filer id, two-digit year, sequence.
static ACCESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{10})-(\d{2})-(\d{6})").expect("Failed to compile ACCESSION_RE"));

static BARE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})").expect("Failed to compile BARE_YEAR_RE"));

/// Infers the fiscal year an MD&A section reports on.
///
/// The section text is consulted first; after that the source name (an
/// accession number, then any `20xx` token); otherwise [`UNKNOWN_YEAR`].
pub fn resolve_fiscal_year(content: &str, source_name: &str) -> String {
    for re in CONTENT_YEAR_RE.iter() {
        if let Some(caps) = re.captures(content) {
            tracing::trace!("Fiscal year matched content pattern {}", re.as_str());
            return caps[1].to_string();
        }
    }

    if let Some(caps) = ACCESSION_RE.captures(source_name) {
        return format!("20{}", &caps[2]);
    }

    if let Some(caps) = BARE_YEAR_RE.captures(source_name) {
        return caps[1].to_string();
    }

    UNKNOWN_YEAR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiscal_year_ended_phrase_wins() {
        let text = "Results for the fiscal year ended September 30, 2023 compared with 2022.";
        assert_eq!(resolve_fiscal_year(text, "doc.htm"), "2023");
    }

    #[test]
    fn year_ended_phrase_and_month_date() {
        assert_eq!(resolve_fiscal_year("For the year ended December 31, 2021, revenue rose", "x"), "2021");
        assert_eq!(resolve_fiscal_year("As of June 30 2020 we had cash", "x"), "2020");
    }

    #[test]
    fn fy_and_annual_report_forms() {
        assert_eq!(resolve_fiscal_year("Guidance for FY2024 remains unchanged", "x"), "2024");
        assert_eq!(resolve_fiscal_year("See our 2019 Annual Report for details", "x"), "2019");
    }

    #[test]
    fn accession_number_in_source_name() {
        assert_eq!(resolve_fiscal_year("no dates here", "0000320193-23-000106"), "2023");
        // The filer id contains "2019"; the accession fragment must take precedence.
        assert_eq!(
            resolve_fiscal_year("no dates here", "0000320193-23-000106/primary-document.html"),
            "2023"
        );
    }

    #[test]
    fn bare_year_in_filename() {
        assert_eq!(resolve_fiscal_year("no dates here", "aapl-20240928.htm"), "2024");
    }

    #[test]
    fn every_content_pattern_compiles() {
        assert_eq!(CONTENT_YEAR_RE.len(), 5);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(resolve_fiscal_year("Revenue grew strongly.", "primary-document.html"), UNKNOWN_YEAR);
    }
}
