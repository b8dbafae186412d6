// src/batch.rs
use crate::config::AppConfig;
use crate::edgar::models::DownloadRequest;
use crate::edgar::FilingDownloader;
use crate::extractors::normalize::is_failure_signal;
use crate::extractors::{resolve_fiscal_year, ExtractedSection, SectionExtractor, StatementCategory, TableExtractor};
use crate::storage::{is_section_artifact, StorageManager};
use crate::utils::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static ACCESSION_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10}-\d{2}-\d{6}$").expect("Failed to compile ACCESSION_DIR_RE"));

/// One filing document, read once and dropped after extraction.
#[derive(Debug)]
pub struct FilingDocument {
    pub path: PathBuf,
    /// Path relative to the batch input directory.
    pub source_name: String,
    /// Stem used in artifact names.
    pub source_stem: String,
    pub content: String,
    pub size_bytes: u64,
}

impl FilingDocument {
    /// Reads a document, replacing invalid UTF-8 sequences.
    pub fn load(root: &Path, path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let source_name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        Ok(Self {
            path: path.to_path_buf(),
            source_name,
            source_stem: source_stem(path),
            size_bytes: bytes.len() as u64,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// File stem, prefixed with the accession number when the document sits in
/// an accession-named directory (the downloader names every primary document
/// the same way).
pub fn source_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let accession = path
        .parent()
        .and_then(Path::file_name)
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| ACCESSION_DIR_RE.is_match(p));

    match accession {
        Some(accession) => format!("{}_{}", accession, stem),
        None => stem,
    }
}

fn is_markup_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("htm") || e.eq_ignore_ascii_case("html"))
}

/// Every `.htm`/`.html` file under `root`, recursively, sorted by path.
/// Directory symlinks are not followed; unreadable entries are logged and skipped.
pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir() && is_markup_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    found.sort();
    found
}

/// Aggregate counts for one orchestrator run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub documents_found: usize,
    /// Documents that were read and run through extraction.
    pub documents_processed: usize,
    /// Documents skipped or failed (unreadable, too small, nothing extracted).
    pub documents_failed: usize,
    /// Documents that produced at least one artifact.
    pub documents_with_artifacts: usize,
    /// Sections or tables extracted.
    pub extracted: usize,
    /// Writes that were verified on disk.
    pub artifacts_written: usize,
    pub write_failures: usize,
    /// Artifacts found by listing the output directory afterwards.
    pub artifacts_on_disk: usize,
}

impl BatchResult {
    pub fn is_consistent(&self) -> bool {
        self.artifacts_written == self.artifacts_on_disk
    }

    pub fn succeeded(&self) -> bool {
        self.artifacts_on_disk > 0
    }
}

/// Runs the narrative and table extraction paths over a directory of filings.
pub struct BatchOrchestrator {
    min_document_chars: usize,
    sections: SectionExtractor,
    tables: TableExtractor,
}

impl BatchOrchestrator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            min_document_chars: config.min_document_chars,
            sections: SectionExtractor::new(config.min_document_chars, config.min_section_chars),
            tables: TableExtractor::new(config.table_context_chars),
        }
    }

    fn documents(&self, input_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        if !input_dir.is_dir() {
            return Err(AppError::Config(format!(
                "Input directory not found: {}",
                input_dir.display()
            )));
        }
        Ok(discover_documents(input_dir))
    }

    /// Extracts one MD&A section per document into `output_dir`.
    ///
    /// Artifacts from earlier runs are removed first, once the input directory
    /// is known to exist. Per-document failures are logged and counted; only
    /// a missing input or output directory setup can fail the run.
    pub fn run_sections(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchResult, AppError> {
        let paths = self.documents(input_dir)?;

        let storage = StorageManager::new(output_dir)?;
        let cleared = storage.clear_artifacts(is_section_artifact)?;
        if cleared > 0 {
            tracing::info!("Removed {} MD&A files from a previous run", cleared);
        }
        tracing::info!("MD&A sections will be saved to: {}", output_dir.display());

        let mut result = BatchResult { documents_found: paths.len(), ..Default::default() };
        tracing::info!("Found {} HTML files to process", paths.len());

        for (i, path) in paths.iter().enumerate() {
            tracing::info!("Processing file {}/{}: {}", i + 1, paths.len(), path.display());

            let document = match FilingDocument::load(input_dir, path) {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!("Error processing {}: {}", path.display(), e);
                    result.documents_failed += 1;
                    continue;
                }
            };

            tracing::debug!("Read {} bytes from {}", document.size_bytes, document.path.display());

            if document.content.chars().count() < self.min_document_chars {
                tracing::warn!("Skipped: {} - File too small ({} bytes)", document.source_name, document.size_bytes);
                result.documents_failed += 1;
                continue;
            }
            result.documents_processed += 1;

            let Some(section) = self.extract_section(&document) else {
                result.documents_failed += 1;
                continue;
            };
            result.extracted += 1;
            tracing::info!("Found MD&A section for fiscal year {}", section.fiscal_year);

            match storage.save_section(&section) {
                Ok(path) => {
                    result.artifacts_written += 1;
                    result.documents_with_artifacts += 1;
                    tracing::debug!("Saved MD&A to {}", path.display());
                }
                Err(e) => {
                    tracing::error!("Error: MD&A for {} not written properly: {}", document.source_name, e);
                    result.write_failures += 1;
                }
            }
        }

        let on_disk = storage.list_artifacts(is_section_artifact)?;
        result.artifacts_on_disk = on_disk.len();
        report(&result, "MD&A", &on_disk);
        Ok(result)
    }

    fn extract_section(&self, document: &FilingDocument) -> Option<ExtractedSection> {
        let content = match self.sections.extract_item_7(&document.content) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("No valid MD&A section found in {}: {}", document.source_name, e);
                return None;
            }
        };
        if is_failure_signal(&content) {
            tracing::warn!("No valid MD&A section found in {}: section text reads as a failure", document.source_name);
            return None;
        }

        let fiscal_year = resolve_fiscal_year(&content, &document.source_name);
        Some(ExtractedSection {
            section_name: "Item 7".to_string(),
            content,
            source_name: document.source_name.clone(),
            source_stem: document.source_stem.clone(),
            fiscal_year,
        })
    }

    /// Extracts balance sheet, income and cash flow tables (or only `only`)
    /// into `output_dir` as `<stem>_<category>_<n>.csv`. Existing files are
    /// left in place; only files written by this run are counted back.
    pub fn run_tables(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        only: Option<StatementCategory>,
    ) -> Result<BatchResult, AppError> {
        let storage = StorageManager::new(output_dir)?;
        let paths = self.documents(input_dir)?;
        let mut result = BatchResult { documents_found: paths.len(), ..Default::default() };
        let mut written: HashSet<String> = HashSet::new();

        for path in &paths {
            let document = match FilingDocument::load(input_dir, path) {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!("Error processing {}: {}", path.display(), e);
                    result.documents_failed += 1;
                    continue;
                }
            };
            result.documents_processed += 1;

            let html = Html::parse_document(&document.content);
            let mut saved_any = false;

            let extracted = match only {
                Some(category) => vec![(category, self.tables.extract_tables(&html, category))],
                None => self.tables.extract_all(&html),
            };
            for (category, tables) in extracted {
                let mut saved = 0;
                for (i, table) in tables.iter().enumerate() {
                    result.extracted += 1;
                    match storage.save_table(table, &document.source_stem, category, i + 1) {
                        Ok(path) => {
                            saved += 1;
                            result.artifacts_written += 1;
                            if let Some(name) = path.file_name() {
                                written.insert(name.to_string_lossy().into_owned());
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to save {} table {} of {}: {}", category.as_str(), i + 1, document.source_name, e);
                            result.write_failures += 1;
                        }
                    }
                }
                if saved > 0 {
                    tracing::info!("Extracted {} {} tables from {}", saved, category.as_str(), document.source_name);
                    saved_any = true;
                }
            }

            if saved_any {
                result.documents_with_artifacts += 1;
            } else {
                result.documents_failed += 1;
            }
        }

        let on_disk = storage.list_artifacts(|name| written.contains(name))?;
        result.artifacts_on_disk = on_disk.len();
        report(&result, "table", &on_disk);
        Ok(result)
    }
}

fn report(result: &BatchResult, kind: &str, on_disk: &[PathBuf]) {
    tracing::info!(
        "Extraction summary: {} files found, {} processed, {} failed, {} {} units extracted, {} written, {} on disk",
        result.documents_found,
        result.documents_processed,
        result.documents_failed,
        result.extracted,
        kind,
        result.artifacts_written,
        result.artifacts_on_disk
    );
    if result.write_failures > 0 {
        tracing::warn!("{} {} files could not be written", result.write_failures, kind);
    }
    if !result.is_consistent() {
        let names: Vec<String> = on_disk
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        tracing::warn!(
            "Discrepancy between counted {} files ({}) and files on disk ({}): {:?}",
            kind,
            result.artifacts_written,
            result.artifacts_on_disk,
            names
        );
    }
}

/// Result of the download-then-extract pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub success: bool,
    pub downloaded: usize,
    pub sections_on_disk: usize,
    pub sections_dir: PathBuf,
}

/// Downloads filings (unless `skip_download`) and extracts their MD&A
/// sections into the configured sections directory.
pub async fn download_and_extract<D: FilingDownloader>(
    config: &AppConfig,
    downloader: &D,
    request: &DownloadRequest,
    skip_download: bool,
) -> Result<PipelineOutcome, AppError> {
    let identifier = request
        .identifier()
        .ok_or_else(|| AppError::Config("Either a ticker or CIK number must be provided".to_string()))?;
    let form = request.filing_type.as_str();
    let filings_dir = config.filings_dir(identifier, form);
    let sections_dir = config.sections_dir(identifier, form);

    let downloaded = if skip_download {
        discover_documents(&filings_dir).len()
    } else {
        let outcome = downloader.download(request).await;
        tracing::info!("Downloaded {} filings into {}", outcome.count, outcome.dir.display());
        if !outcome.success || outcome.count == 0 {
            return Ok(PipelineOutcome { success: false, downloaded: 0, sections_on_disk: 0, sections_dir });
        }
        outcome.count
    };

    let result = BatchOrchestrator::new(config).run_sections(&filings_dir, &sections_dir)?;
    tracing::info!(
        "Successfully extracted {} MD&A sections out of {} filings",
        result.artifacts_on_disk,
        downloaded
    );

    Ok(PipelineOutcome {
        success: true,
        downloaded,
        sections_on_disk: result.artifacts_on_disk,
        sections_dir,
    })
}
