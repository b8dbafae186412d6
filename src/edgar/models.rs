// src/edgar/models.rs
#![allow(non_snake_case)]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Structure representing the EDGAR company submission index
/// Example: https://data.sec.gov/submissions/CIK0000320193.json
#[derive(Debug, Deserialize)]
pub struct CompanySubmission {
    pub cik: String,
    #[serde(default)]
    pub name: String,
    pub filings: Filings,
}

#[derive(Debug, Deserialize)]
pub struct Filings {
    pub recent: FilingsList,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FilingsList {
    pub accessionNumber: Vec<String>,
    pub filingDate: Vec<String>,
    pub reportDate: Vec<String>,
    pub form: Vec<String>,
    pub primaryDocument: Vec<String>,
}

/// Simple struct representing a specific filing we want to process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilingInfo {
    pub accession_number: String,
    pub filing_date: String,
    pub form_type: String,
    pub identifier: String,
    pub company_name: String,
    pub cik: String,
    pub primary_doc: String,
    pub year: u32,
}

impl FilingInfo {
    /// Constructs the URL to access the primary document of this filing
    pub fn primary_doc_url(&self, base_url: &str) -> String {
        let acc_no_dashes = self.accession_number.replace('-', "");
        let cik = self.cik.trim_start_matches('0');
        format!(
            "{}/Archives/edgar/data/{}/{}/{}",
            base_url, cik, acc_no_dashes, self.primary_doc
        )
    }

    /// Local file name for the primary document, keeping its extension.
    pub fn local_file_name(&self) -> String {
        let ext = std::path::Path::new(&self.primary_doc)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| matches!(e.to_ascii_lowercase().as_str(), "htm" | "html" | "txt" | "xml"))
            .unwrap_or("html");
        format!("primary-document.{}", ext)
    }
}

/// Form types EDGAR serves that the downloader accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilingType {
    #[serde(rename = "10-K")]
    Form10K,
    #[serde(rename = "10-Q")]
    Form10Q,
    #[serde(rename = "8-K")]
    Form8K,
    #[serde(rename = "S-1")]
    FormS1,
    #[serde(rename = "13F-HR")]
    Form13F,
    #[serde(rename = "4")]
    Form4,
    #[serde(rename = "DEF 14A")]
    DefProxy,
    #[serde(rename = "10-KSB")]
    Form10KSB,
    #[serde(rename = "10-QSB")]
    Form10QSB,
    #[serde(rename = "20-F")]
    Form20F,
    #[serde(rename = "40-F")]
    Form40F,
    #[serde(rename = "6-K")]
    Form6K,
    #[serde(rename = "10")]
    Form10,
    #[serde(rename = "8-A")]
    Form8A,
    #[serde(rename = "485BPOS")]
    Form485BPOS,
    #[serde(rename = "497")]
    Form497,
    #[serde(rename = "N-1A")]
    FormN1A,
    #[serde(rename = "N-2")]
    FormN2,
    #[serde(rename = "NT 10-K")]
    FormNT10K,
    #[serde(rename = "NT 10-Q")]
    FormNT10Q,
}

impl FilingType {
    pub const ALL: [FilingType; 20] = [
        FilingType::Form10K,
        FilingType::Form10Q,
        FilingType::Form8K,
        FilingType::FormS1,
        FilingType::Form13F,
        FilingType::Form4,
        FilingType::DefProxy,
        FilingType::Form10KSB,
        FilingType::Form10QSB,
        FilingType::Form20F,
        FilingType::Form40F,
        FilingType::Form6K,
        FilingType::Form10,
        FilingType::Form8A,
        FilingType::Form485BPOS,
        FilingType::Form497,
        FilingType::FormN1A,
        FilingType::FormN2,
        FilingType::FormNT10K,
        FilingType::FormNT10Q,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilingType::Form10K => "10-K",
            FilingType::Form10Q => "10-Q",
            FilingType::Form8K => "8-K",
            FilingType::FormS1 => "S-1",
            FilingType::Form13F => "13F-HR",
            FilingType::Form4 => "4",
            FilingType::DefProxy => "DEF 14A",
            FilingType::Form10KSB => "10-KSB",
            FilingType::Form10QSB => "10-QSB",
            FilingType::Form20F => "20-F",
            FilingType::Form40F => "40-F",
            FilingType::Form6K => "6-K",
            FilingType::Form10 => "10",
            FilingType::Form8A => "8-A",
            FilingType::Form485BPOS => "485BPOS",
            FilingType::Form497 => "497",
            FilingType::FormN1A => "N-1A",
            FilingType::FormN2 => "N-2",
            FilingType::FormNT10K => "NT 10-K",
            FilingType::FormNT10Q => "NT 10-Q",
        }
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FilingType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unsupported filing type '{}'", s))
    }
}

/// What to fetch: a ticker or a numeric CIK, one form type, a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub ticker: Option<String>,
    pub cik: Option<String>,
    pub filing_type: FilingType,
    pub years_back: u32,
}

impl DownloadRequest {
    /// All-digit input is a CIK, anything else a ticker (upper-cased).
    pub fn from_input(input: &str, filing_type: FilingType, years_back: u32) -> Self {
        let input = input.trim();
        let (ticker, cik) = if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            (None, Some(input.to_string()))
        } else if input.is_empty() {
            (None, None)
        } else {
            (Some(input.to_uppercase()), None)
        };
        Self { ticker, cik, filing_type, years_back }
    }

    /// Directory name the filings land under: the ticker, else the CIK.
    pub fn identifier(&self) -> Option<&str> {
        self.ticker.as_deref().or(self.cik.as_deref())
    }
}

/// What the downloader reports back once the directory is populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub success: bool,
    pub count: usize,
    pub dir: PathBuf,
}
