// src/edgar/client.rs
use crate::config::AppConfig;
use crate::edgar::models::{CompanySubmission, DownloadOutcome, DownloadRequest, FilingInfo};
use crate::edgar::FilingDownloader;
use crate::utils::error::EdgarError;
use async_trait::async_trait;
use chrono::Datelike;
use reqwest::header;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// EDGAR client that fills the downloader directory layout:
/// `<data_dir>/<filings_subdir>/<identifier>/<form>/<accession>/primary-document.<ext>`.
pub struct EdgarClient {
    http: reqwest::Client,
    base_url: String,
    data_url: String,
    request_delay: Duration,
    filings_root: PathBuf,
}

impl EdgarClient {
    /// Creates a reqwest client configured for EDGAR interaction.
    pub fn new(config: &AppConfig) -> Result<Self, EdgarError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str()) // SEC rejects requests without a contact User-Agent
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url: config.edgar_base_url.trim_end_matches('/').to_string(),
            data_url: config.edgar_data_url.trim_end_matches('/').to_string(),
            request_delay: Duration::from_millis(config.request_delay_ms),
            filings_root: config.data_dir.join(&config.filings_subdir),
        })
    }

    /// Issues a rate-limited GET and maps the common EDGAR failure statuses.
    async fn get(&self, url: &str) -> Result<reqwest::Response, EdgarError> {
        // SEC asks for at most 10 requests/second; stay well under it.
        tokio::time::sleep(self.request_delay).await;

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json,application/xml,text/html,text/plain,*/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::FORBIDDEN {
                tracing::warn!("Received 403 Forbidden - check User-Agent and rate limits.");
                return Err(EdgarError::RateLimited);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(EdgarError::FilingDocNotFound(url.to_string()));
            }
            return Err(EdgarError::Http(status));
        }
        Ok(response)
    }

    /// Downloads a specific filing document from its URL.
    pub async fn download_filing_doc(&self, url: &str) -> Result<String, EdgarError> {
        tracing::info!("Downloading document from: {}", url);
        let body = self.get(url).await?.text().await?;
        tracing::debug!("Successfully downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }

    /// Gets the zero-padded CIK (Central Index Key) for a ticker symbol
    pub async fn get_cik_from_ticker(&self, ticker: &str) -> Result<String, EdgarError> {
        let url = format!("{}/files/company_tickers.json", self.base_url);
        let json: serde_json::Value = self.get(&url).await?.json().await?;
        cik_for_ticker(&json, ticker)
    }

    /// Fetches the company submission data for a given CIK
    pub async fn get_company_submissions(&self, cik: &str) -> Result<CompanySubmission, EdgarError> {
        let url = format!("{}/submissions/CIK{}.json", self.data_url, cik);
        let submission: CompanySubmission = self.get(&url).await?.json().await?;
        Ok(submission)
    }

    async fn resolve_cik(&self, request: &DownloadRequest) -> Result<String, EdgarError> {
        match (&request.ticker, &request.cik) {
            (Some(ticker), _) => self.get_cik_from_ticker(ticker).await,
            (None, Some(cik)) => pad_cik(cik),
            (None, None) => Err(EdgarError::MissingIdentifier),
        }
    }

    async fn fetch_filings(&self, request: &DownloadRequest) -> Result<DownloadOutcome, EdgarError> {
        let identifier = request.identifier().ok_or(EdgarError::MissingIdentifier)?.to_string();
        let form = request.filing_type.as_str();
        let dir = self.filings_root.join(&identifier).join(form);

        let cik = self.resolve_cik(request).await?;
        let submissions = self.get_company_submissions(&cik).await?;

        let end_year = chrono::Utc::now().year() as u32;
        let start_year = end_year.saturating_sub(request.years_back);
        let filings = select_filings(&submissions, &identifier, form, start_year, end_year)?;
        tracing::info!("Found {} {} filings for {} between {} and {}", filings.len(), form, identifier, start_year, end_year);

        let mut count = 0;
        for filing in &filings {
            let url = filing.primary_doc_url(&self.base_url);
            if store_filing(&dir, filing, self.download_filing_doc(&url).await) {
                count += 1;
            }
        }

        if count > 0 && !dir.exists() {
            tracing::warn!("Download reported success but directory not found at {}", dir.display());
            return Ok(DownloadOutcome { success: false, count: 0, dir });
        }

        Ok(DownloadOutcome { success: true, count, dir })
    }
}

#[async_trait]
impl FilingDownloader for EdgarClient {
    async fn download(&self, request: &DownloadRequest) -> DownloadOutcome {
        match self.fetch_filings(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error downloading filings: {}", e);
                let identifier = request.identifier().unwrap_or_default();
                DownloadOutcome {
                    success: false,
                    count: 0,
                    dir: self.filings_root.join(identifier).join(request.filing_type.as_str()),
                }
            }
        }
    }
}

/// Writes one downloaded primary document to
/// `<dir>/<accession>/primary-document.<ext>`. A failed download or write is
/// logged and the filing skipped.
fn store_filing(dir: &Path, filing: &FilingInfo, downloaded: Result<String, EdgarError>) -> bool {
    let written = downloaded.and_then(|content| {
        let filing_dir = dir.join(&filing.accession_number);
        fs::create_dir_all(&filing_dir)?;
        let path = filing_dir.join(filing.local_file_name());
        fs::write(&path, content)?;
        Ok(path)
    });

    match written {
        Ok(path) => {
            tracing::debug!("Saved {} to {}", filing.accession_number, path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Skipping filing {}: {}", filing.accession_number, e);
            false
        }
    }
}

fn pad_cik(cik: &str) -> Result<String, EdgarError> {
    let number: u64 = cik
        .trim()
        .parse()
        .map_err(|_| EdgarError::Parse(format!("Invalid CIK '{}'", cik)))?;
    Ok(format!("{:010}", number))
}

/// Looks a ticker up in the `company_tickers.json` map.
pub fn cik_for_ticker(json: &serde_json::Value, ticker: &str) -> Result<String, EdgarError> {
    let ticker = ticker.to_uppercase();
    let companies = json
        .as_object()
        .ok_or_else(|| EdgarError::Parse("Invalid JSON structure".to_string()))?;

    for company in companies.values() {
        let matches = company
            .get("ticker")
            .and_then(|t| t.as_str())
            .map_or(false, |t| t.eq_ignore_ascii_case(&ticker));
        if matches {
            let cik = company
                .get("cik_str")
                .and_then(|c| c.as_u64())
                .ok_or_else(|| EdgarError::Parse("Invalid CIK format".to_string()))?;
            return Ok(format!("{:010}", cik));
        }
    }

    Err(EdgarError::Parse(format!("Could not find CIK for ticker {}", ticker)))
}

/// Recent filings of the requested form whose filing year lies in `[start_year, end_year]`, newest first.
pub fn select_filings(
    submissions: &CompanySubmission,
    identifier: &str,
    form: &str,
    start_year: u32,
    end_year: u32,
) -> Result<Vec<FilingInfo>, EdgarError> {
    let recent = &submissions.filings.recent;
    let mut filings = Vec::new();

    for (i, form_type) in recent.form.iter().enumerate() {
        if !form_type.eq_ignore_ascii_case(form) {
            continue;
        }
        let filing_date = recent
            .filingDate
            .get(i)
            .ok_or_else(|| EdgarError::Parse("Missing filing date".to_string()))?;
        let year = filing_date
            .get(0..4)
            .and_then(|y| y.parse::<u32>().ok())
            .ok_or_else(|| EdgarError::Parse(format!("Invalid date format '{}'", filing_date)))?;
        if year < start_year || year > end_year {
            continue;
        }

        let accession_number = recent
            .accessionNumber
            .get(i)
            .ok_or_else(|| EdgarError::Parse("Missing accession number".to_string()))?;
        let primary_doc = recent
            .primaryDocument
            .get(i)
            .ok_or_else(|| EdgarError::Parse("Missing primary document".to_string()))?;

        filings.push(FilingInfo {
            accession_number: accession_number.clone(),
            filing_date: filing_date.clone(),
            form_type: form_type.clone(),
            identifier: identifier.to_string(),
            company_name: submissions.name.clone(),
            cik: submissions.cik.clone(),
            primary_doc: primary_doc.clone(),
            year,
        });
    }

    filings.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
    Ok(filings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBMISSIONS: &str = r#"{
        "cik": "0000320193",
        "name": "Apple Inc.",
        "filings": { "recent": {
            "accessionNumber": ["0000320193-24-000123", "0000320193-24-000081", "0000320193-23-000106", "0000320193-15-000001"],
            "filingDate": ["2024-11-01", "2024-08-02", "2023-11-03", "2015-10-28"],
            "reportDate": ["2024-09-28", "2024-06-29", "2023-09-30", "2015-09-26"],
            "form": ["10-K", "10-Q", "10-K", "10-K"],
            "primaryDocument": ["aapl-20240928.htm", "aapl-20240629.htm", "aapl-20230930.htm", "a201510-k.htm"]
        } }
    }"#;

    #[test]
    fn selects_form_within_lookback_window() {
        let submissions: CompanySubmission = serde_json::from_str(SUBMISSIONS).unwrap();
        let filings = select_filings(&submissions, "AAPL", "10-K", 2020, 2024).unwrap();

        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].accession_number, "0000320193-24-000123");
        assert_eq!(filings[1].year, 2023);
        assert!(filings.iter().all(|f| f.company_name == "Apple Inc."));
    }

    #[test]
    fn ticker_lookup_pads_cik() {
        let json = serde_json::json!({
            "0": { "cik_str": 789019, "ticker": "MSFT", "title": "MICROSOFT CORP" },
            "1": { "cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc." }
        });
        assert_eq!(cik_for_ticker(&json, "aapl").unwrap(), "0000320193");
        assert!(matches!(cik_for_ticker(&json, "ZZZZ"), Err(EdgarError::Parse(_))));
    }

    #[test]
    fn failed_filing_is_skipped_without_losing_others() {
        let submissions: CompanySubmission = serde_json::from_str(SUBMISSIONS).unwrap();
        let filings = select_filings(&submissions, "AAPL", "10-K", 2015, 2024).unwrap();
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the second filing's directory should go.
        fs::write(dir.path().join(&filings[1].accession_number), "blocked").unwrap();

        assert!(store_filing(dir.path(), &filings[0], Ok("<html>2024</html>".to_string())));
        assert!(!store_filing(dir.path(), &filings[1], Ok("<html>2023</html>".to_string())));
        assert!(!store_filing(dir.path(), &filings[2], Err(EdgarError::RateLimited)));

        let saved = dir.path().join("0000320193-24-000123/primary-document.htm");
        assert_eq!(fs::read_to_string(saved).unwrap(), "<html>2024</html>");
        assert!(!dir.path().join(&filings[2].accession_number).exists());
    }

    #[test]
    fn numeric_cik_is_padded() {
        assert_eq!(pad_cik("320193").unwrap(), "0000320193");
        assert!(pad_cik("abc").is_err());
    }
}
