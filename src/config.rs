// src/config.rs
use std::path::{Path, PathBuf};

/// Runtime configuration passed explicitly into every component.
///
/// `AppConfig::default()` carries the documented defaults; the CLI overrides
/// individual fields before anything is constructed.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root for downloaded filings and every generated artifact.
    pub data_dir: PathBuf,
    /// Downloader layout: `<data_dir>/<filings_subdir>/<identifier>/<form>/`.
    pub filings_subdir: String,
    /// MD&A artifacts: `<data_dir>/<sections_subdir>/<identifier>/<form>/`.
    pub sections_subdir: String,
    pub tables_subdir: String,
    pub reports_subdir: String,

    /// Documents shorter than this (in characters) are skipped outright.
    pub min_document_chars: usize,
    /// Extracted sections shorter than this after cleaning are rejected.
    pub min_section_chars: usize,
    /// How much preceding text is gathered to classify a table.
    pub table_context_chars: usize,

    // EDGAR
    pub user_agent: String,
    pub edgar_base_url: String,
    pub edgar_data_url: String,
    pub request_delay_ms: u64,

    // Gemini
    pub gemini_key_file: PathBuf,
    pub gemini_endpoint: String,
    pub gemini_fast_model: String,
    pub gemini_long_model: String,
    pub long_model_threshold_chars: usize,
    pub max_analysis_chars: usize,
    pub truncate_to_chars: usize,

    // XBRL-JSON conversion
    pub sec_api_key_file: PathBuf,
    pub xbrl_endpoint: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("edgar_data"),
            filings_subdir: "sec-edgar-filings".to_string(),
            sections_subdir: "mda_sections".to_string(),
            tables_subdir: "financial_statements".to_string(),
            reports_subdir: "reports".to_string(),
            min_document_chars: 1000,
            min_section_chars: 1000,
            table_context_chars: 500,
            user_agent: "MdnaExtractor admin@example.com".to_string(),
            edgar_base_url: "https://www.sec.gov".to_string(),
            edgar_data_url: "https://data.sec.gov".to_string(),
            request_delay_ms: 150,
            gemini_key_file: PathBuf::from("gemini_api_key.txt"),
            gemini_endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            gemini_fast_model: "gemini-1.5-flash".to_string(),
            gemini_long_model: "gemini-1.5-pro".to_string(),
            long_model_threshold_chars: 100_000,
            max_analysis_chars: 200_000,
            truncate_to_chars: 190_000,
            sec_api_key_file: PathBuf::from("sec_api_key.txt"),
            xbrl_endpoint: "https://api.sec-api.io/xbrl-to-json".to_string(),
        }
    }
}

impl AppConfig {
    /// Directory the downloader populates for one (identifier, form type) pair.
    pub fn filings_dir(&self, identifier: &str, form_type: &str) -> PathBuf {
        self.data_dir
            .join(&self.filings_subdir)
            .join(identifier)
            .join(form_type)
    }

    pub fn sections_dir(&self, identifier: &str, form_type: &str) -> PathBuf {
        self.data_dir
            .join(&self.sections_subdir)
            .join(identifier)
            .join(form_type)
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.data_dir.join(&self.tables_subdir)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join(&self.reports_subdir)
    }
}

/// Reads a single-line credential file. A missing or blank file yields `None`.
pub fn load_credential(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let key = raw.trim();
            if key.is_empty() {
                tracing::warn!("Credential file {} is empty", path.display());
                None
            } else {
                Some(key.to_string())
            }
        }
        Err(e) => {
            tracing::debug!("Could not read credential file {}: {}", path.display(), e);
            None
        }
    }
}
