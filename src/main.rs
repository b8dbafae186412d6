// src/main.rs
mod analysis;
mod batch;
mod config;
mod edgar;
mod extractors;
mod storage;
mod utils;
mod xbrl;

use analysis::AnalysisFocus;
use batch::BatchOrchestrator;
use clap::{Parser, Subcommand};
use config::AppConfig;
use edgar::client::EdgarClient;
use edgar::models::{DownloadRequest, FilingType};
use edgar::FilingDownloader;
use extractors::{SectionExtractor, StatementCategory};
use std::path::PathBuf;
use storage::StorageManager;
use utils::AppError;

/// Command Line Interface for the SEC MD&A extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory for downloaded filings and generated artifacts
    #[arg(long, global = true, default_value = "edgar_data")]
    data_dir: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Minimum length in characters of an extracted section (default: 1000)
    #[arg(long, global = true)]
    min_section_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the supported filing types
    Forms,

    /// Download filings from EDGAR
    Download {
        /// Ticker symbol or numeric CIK
        input: String,
        #[arg(short, long, default_value = "10-K")]
        form_type: FilingType,
        #[arg(short, long, default_value_t = 5)]
        years_back: u32,
    },

    /// Download filings, then extract their MD&A sections
    Mdna {
        /// Ticker symbol or numeric CIK
        input: String,
        #[arg(short, long, default_value = "10-K")]
        form_type: FilingType,
        #[arg(short, long, default_value_t = 5)]
        years_back: u32,
        /// Reuse filings already on disk
        #[arg(long)]
        skip_download: bool,
        /// Run the language-model analysis on the extracted sections
        #[arg(long, value_enum)]
        analyze: Option<AnalysisFocus>,
    },

    /// Extract MD&A sections from a directory of filings
    Sections {
        #[arg(short, long)]
        input_dir: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Extract balance sheet, income and cash flow tables from a directory of filings
    Tables {
        #[arg(short, long)]
        input_dir: PathBuf,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Only extract one statement category
        #[arg(long, value_enum)]
        category: Option<StatementCategory>,
    },

    /// Analyze previously extracted MD&A sections
    Analyze {
        /// Ticker symbol or numeric CIK
        identifier: String,
        #[arg(short, long, default_value = "10-K")]
        form_type: FilingType,
        #[arg(long, value_enum, default_value = "comprehensive")]
        focus: AnalysisFocus,
        /// Report path (defaults to the reports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a filing's XBRL data into statement tables
    Xbrl {
        /// URL of the filing's primary document
        url: String,
        /// Conversion API key (defaults to the key file)
        #[arg(long)]
        api_key: Option<String>,
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Diagnose extraction on a single document
    Debug {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();
    utils::logging::setup_logging(args.verbose);
    tracing::debug!("Starting with args: {:?}", args);

    let mut config = AppConfig { data_dir: args.data_dir.clone(), ..AppConfig::default() };
    if let Some(size) = args.min_section_size {
        config.min_section_chars = size;
    }

    match args.command {
        Command::Forms => {
            for form in FilingType::ALL {
                println!("{}", form);
            }
            Ok(())
        }
        Command::Download { input, form_type, years_back } => {
            let request = DownloadRequest::from_input(&input, form_type, years_back);
            let client = EdgarClient::new(&config)?;
            let outcome = client.download(&request).await;
            if !outcome.success {
                return Err(AppError::Processing(format!("Failed to download {} filings for {}", form_type, input)));
            }
            tracing::info!("Downloaded {} filings to {}", outcome.count, outcome.dir.display());
            Ok(())
        }
        Command::Mdna { input, form_type, years_back, skip_download, analyze } => {
            let request = DownloadRequest::from_input(&input, form_type, years_back);
            let client = EdgarClient::new(&config)?;
            let outcome = batch::download_and_extract(&config, &client, &request, skip_download).await?;

            if !outcome.success || outcome.sections_on_disk == 0 {
                return Err(AppError::Processing(format!(
                    "Failed to extract any MD&A sections from {} filings",
                    outcome.downloaded
                )));
            }

            if let Some(focus) = analyze {
                let identifier = request.identifier().unwrap_or(&input);
                let report = config.reports_dir().join(analysis::report_file_name(identifier, form_type.as_str(), focus));
                analysis::analyze_sections(&config, &outcome.sections_dir, focus, &report).await?;
            }
            Ok(())
        }
        Command::Sections { input_dir, output_dir } => {
            let result = BatchOrchestrator::new(&config).run_sections(&input_dir, &output_dir)?;
            if !result.succeeded() {
                return Err(AppError::Processing(format!(
                    "Failed to extract any MD&A sections from {} files",
                    result.documents_found
                )));
            }
            Ok(())
        }
        Command::Tables { input_dir, output_dir, category } => {
            let output_dir = output_dir.unwrap_or_else(|| config.tables_dir());
            let result = BatchOrchestrator::new(&config).run_tables(&input_dir, &output_dir, category)?;
            tracing::info!(
                "Processed {} files; {} contained financial tables",
                result.documents_processed,
                result.documents_with_artifacts
            );
            if !result.succeeded() {
                return Err(AppError::Processing("No financial tables were extracted".to_string()));
            }
            Ok(())
        }
        Command::Analyze { identifier, form_type, focus, output } => {
            let request = DownloadRequest::from_input(&identifier, form_type, 0);
            let identifier = request.identifier().unwrap_or(&identifier);
            let sections_dir = config.sections_dir(identifier, form_type.as_str());
            let report = output.unwrap_or_else(|| {
                config.reports_dir().join(analysis::report_file_name(identifier, form_type.as_str(), focus))
            });
            analysis::analyze_sections(&config, &sections_dir, focus, &report).await?;
            Ok(())
        }
        Command::Xbrl { url, api_key, output_dir } => {
            let api_key = api_key
                .or_else(|| config::load_credential(&config.sec_api_key_file))
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "SEC API key not found. Pass --api-key or create '{}'",
                        config.sec_api_key_file.display()
                    ))
                })?;
            let output_dir = output_dir.unwrap_or_else(|| config.tables_dir());
            run_xbrl(&config, &url, api_key, &output_dir).await
        }
        Command::Debug { file } => {
            let extractor = SectionExtractor::new(config.min_document_chars, config.min_section_chars);
            let report = utils::html_debug::debug_extraction(&file, &extractor, config.min_section_chars)?;

            tracing::info!("Debugging extraction for: {}", file.display());
            tracing::info!("File size: {} bytes", report.size_bytes);
            tracing::info!("Item 7 mentions: {}", report.item7_mentions);
            tracing::info!("MD&A mentions: {}", report.mdna_mentions);
            tracing::info!("Extraction result length: {}", report.result_len);
            tracing::info!("First {} chars: {}...", report.preview.chars().count(), report.preview);
            if let Some(path) = &report.annotated_path {
                tracing::info!("Annotated HTML: {}", path.display());
            }

            if !report.would_succeed {
                return Err(AppError::Processing(format!("Extraction would fail for {}", file.display())));
            }
            tracing::info!("Extraction would succeed");
            Ok(())
        }
    }
}

/// Fetches XBRL-JSON for one filing and writes the three statements as CSV.
async fn run_xbrl(config: &AppConfig, url: &str, api_key: String, output_dir: &std::path::Path) -> Result<(), AppError> {
    let client = xbrl::XbrlClient::new(&config.xbrl_endpoint, api_key)?;
    let json = client.fetch_xbrl_json(url).await?;

    let storage = StorageManager::new(output_dir)?;
    storage.save_json("xbrl_data.json", &json)?;

    let mut written = 0;
    for category in StatementCategory::ALL {
        let table = xbrl::statement_table(&json, category);
        if table.is_empty() {
            continue;
        }
        match storage.save_named_table(&table, &xbrl::statement_file_name(category)) {
            Ok(path) => {
                tracing::info!("Saved {} statement to {}", category.as_str(), path.display());
                written += 1;
            }
            Err(e) => tracing::error!("Failed to save {} statement: {}", category.as_str(), e),
        }
    }

    if written == 0 {
        return Err(AppError::Processing(format!("No financial statements found in XBRL data for {}", url)));
    }
    Ok(())
}
