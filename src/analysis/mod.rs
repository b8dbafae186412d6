// src/analysis/mod.rs
use crate::config::{load_credential, AppConfig};
use crate::storage::StorageManager;
use crate::utils::error::{AnalysisError, AppError, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const TRUNCATION_NOTICE: &str = "\n\n[Content truncated due to length...]";

/// What the language model is asked to focus on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AnalysisFocus {
    Comprehensive,
    Revenue,
    Profitability,
    Risks,
}

impl AnalysisFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisFocus::Comprehensive => "comprehensive",
            AnalysisFocus::Revenue => "revenue",
            AnalysisFocus::Profitability => "profitability",
            AnalysisFocus::Risks => "risks",
        }
    }

    pub fn build_prompt(&self, mdna_text: &str) -> String {
        let (instruction, points, closing) = match self {
            AnalysisFocus::Comprehensive => (
                "Analyze this MD&A section and provide a comprehensive financial analysis:",
                "Include:\n\
                 1. Revenue and growth analysis\n\
                 2. Profitability analysis\n\
                 3. Liquidity and solvency assessment\n\
                 4. Key business risks\n\
                 5. Forward-looking statements\n\
                 6. Overall financial health assessment",
                "Format as a markdown report with clear headings and bullet points where appropriate.",
            ),
            AnalysisFocus::Revenue => (
                "Analyze revenue trends from this MD&A section:",
                "Focus on:\n\
                 - Revenue trends over time\n\
                 - Revenue segments and their performance\n\
                 - Key drivers of growth or decline\n\
                 - Seasonality factors\n\
                 - Geographic distribution if available\n\
                 - Forward guidance on revenue\n\
                 - Competitive landscape impact on revenue",
                "Return in markdown format with clear headings and bullet points where appropriate.",
            ),
            AnalysisFocus::Profitability => (
                "Analyze profitability from this MD&A section:",
                "Focus on:\n\
                 - Gross, operating and net profit margins and their trends\n\
                 - Cost structure and the key expenses affecting profitability\n\
                 - Efficiency improvements or concerns\n\
                 - Comparison to industry benchmarks if mentioned\n\
                 - Future profitability outlook",
                "Return in markdown format with clear headings and bullet points where appropriate.",
            ),
            AnalysisFocus::Risks => (
                "Extract and summarize risk factors from this MD&A section:",
                "Include:\n\
                 - Financial risks (debt, liquidity, currency, interest rate)\n\
                 - Operational risks (supply chain, production, infrastructure)\n\
                 - Market risks (competition, demand shifts, pricing pressure)\n\
                 - Regulatory and compliance risks\n\
                 - Environmental and sustainability risks\n\
                 - Technology and cybersecurity risks\n\
                 - Forward-looking risk assessments and mitigation strategies mentioned",
                "Return in markdown format with clear headings and bullet points where appropriate.",
            ),
        };
        format!("{}\n\n{}\n\n{}\n\n{}\n", instruction, mdna_text, points, closing)
    }
}

/// Cuts text longer than `max_chars` down to `keep_chars` and appends the
/// truncation notice. Returns whether truncation happened.
pub fn truncate_for_model(text: &str, max_chars: usize, keep_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let mut truncated: String = text.chars().take(keep_chars).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    (truncated, true)
}

/// An opaque text-in, text-out model call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, AnalysisError>;
}

// --- Gemini REST payloads ---
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/{}:generateContent?key={}", self.endpoint, model, self.api_key);
        let request = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: prompt }] }],
        };

        tracing::info!("Sending {} chars to {}", prompt.len(), model);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Http { status, body });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Runs one analysis request against a model with the configured limits.
pub struct Analyzer<M> {
    model: M,
    fast_model: String,
    long_model: String,
    long_model_threshold_chars: usize,
    max_chars: usize,
    truncate_to_chars: usize,
}

impl<M: LanguageModel> Analyzer<M> {
    pub fn new(model: M, config: &AppConfig) -> Self {
        Self {
            model,
            fast_model: config.gemini_fast_model.clone(),
            long_model: config.gemini_long_model.clone(),
            long_model_threshold_chars: config.long_model_threshold_chars,
            max_chars: config.max_analysis_chars,
            truncate_to_chars: config.truncate_to_chars,
        }
    }

    /// Returns the markdown report. On failure the error's `Display` is the
    /// descriptive message shown to the user.
    pub async fn analyze(&self, text: &str, focus: AnalysisFocus) -> Result<String, AnalysisError> {
        let length = text.chars().count();
        let model = if length > self.long_model_threshold_chars {
            &self.long_model
        } else {
            &self.fast_model
        };

        let (text, truncated) = truncate_for_model(text, self.max_chars, self.truncate_to_chars);
        if truncated {
            tracing::warn!("Text is very long ({} chars) - analysis may be limited or incomplete.", length);
        }

        self.model
            .generate(model, &focus.build_prompt(&text))
            .await
            .map_err(|e| {
                tracing::error!("{} analysis failed: {}", focus.as_str(), e);
                AnalysisError::Failed(Box::new(e))
            })
    }
}

/// Loads the credential and analyzes with Gemini.
pub async fn analyze_with_gemini(config: &AppConfig, text: &str, focus: AnalysisFocus) -> Result<String, AnalysisError> {
    let api_key = load_credential(&config.gemini_key_file)
        .ok_or_else(|| AnalysisError::MissingCredential(config.gemini_key_file.display().to_string()))?;
    let client = GeminiClient::new(&config.gemini_endpoint, api_key)?;
    Analyzer::new(client, config).analyze(text, focus).await
}

/// Combines the sections in `sections_dir`, analyzes them and writes the
/// report to `report_path`. Nothing is written when the analysis fails.
pub async fn analyze_sections(
    config: &AppConfig,
    sections_dir: &Path,
    focus: AnalysisFocus,
    report_path: &Path,
) -> Result<PathBuf, AppError> {
    let combined = combine_sections(sections_dir)?;
    if combined.trim().is_empty() {
        return Err(AppError::Processing(format!("No MD&A sections found in {}", sections_dir.display())));
    }
    tracing::info!("Analyzing {} chars of MD&A text ({})", combined.chars().count(), focus.as_str());

    let report = analyze_with_gemini(config, &combined, focus).await.map_err(|e| {
        tracing::error!("{}", e);
        AppError::Ai(e)
    })?;

    let (dir, file_name) = match (report_path.parent(), report_path.file_name()) {
        (Some(dir), Some(name)) => (dir, name.to_string_lossy().into_owned()),
        _ => return Err(AppError::Config(format!("Invalid report path {}", report_path.display()))),
    };
    let saved = StorageManager::new(dir)?.save_text(&file_name, &report)?;
    tracing::info!("Analysis saved to {}", saved.display());
    Ok(saved)
}

/// Concatenates every `.txt` section in `dir` (sorted by name), each under a
/// `--- FROM FILE: <name> ---` banner. Unreadable files are logged and skipped.
pub fn combine_sections(dir: &Path) -> Result<String, StorageError> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "txt"))
        .collect();
    paths.sort();

    let mut combined = String::new();
    for path in paths {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match fs::read_to_string(&path) {
            Ok(content) => {
                combined.push_str(&format!("\n\n--- FROM FILE: {} ---\n\n", name));
                combined.push_str(&content);
            }
            Err(e) => tracing::warn!("Error reading {}: {}", name, e),
        }
    }
    Ok(combined)
}

/// `<identifier>_<form>_<focus>_analysis.md`, with spaces in the form replaced.
pub fn report_file_name(identifier: &str, form_type: &str, focus: AnalysisFocus) -> String {
    format!("{}_{}_{}_analysis.md", identifier, form_type.replace(' ', "_"), focus.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, model: &str, prompt: &str) -> Result<String, AnalysisError> {
            self.calls.lock().unwrap().push((model.to_string(), prompt.to_string()));
            if self.fail {
                Err(AnalysisError::EmptyResponse)
            } else {
                Ok("## Report".to_string())
            }
        }
    }

    fn small_config() -> AppConfig {
        AppConfig {
            long_model_threshold_chars: 50,
            max_analysis_chars: 100,
            truncate_to_chars: 80,
            ..AppConfig::default()
        }
    }

    #[test]
    fn prompt_embeds_text_and_focus() {
        let prompt = AnalysisFocus::Risks.build_prompt("SECTION TEXT");
        assert!(prompt.starts_with("Extract and summarize risk factors"));
        assert!(prompt.contains("SECTION TEXT"));
        assert!(prompt.contains("cybersecurity"));
    }

    #[test]
    fn truncation_keeps_prefix_and_appends_notice() {
        let (short, cut) = truncate_for_model("abc", 10, 5);
        assert_eq!((short.as_str(), cut), ("abc", false));

        let long = "x".repeat(20);
        let (text, cut) = truncate_for_model(&long, 10, 5);
        assert!(cut);
        assert_eq!(text, format!("xxxxx{}", TRUNCATION_NOTICE));
    }

    #[test]
    fn short_text_uses_fast_model() {
        let analyzer = Analyzer::new(RecordingModel::default(), &small_config());
        let report = tokio_test::block_on(analyzer.analyze("brief", AnalysisFocus::Revenue)).unwrap();

        assert_eq!(report, "## Report");
        let calls = analyzer.model.calls.lock().unwrap();
        assert_eq!(calls[0].0, "gemini-1.5-flash");
        assert!(calls[0].1.contains("brief"));
    }

    #[test]
    fn long_text_is_truncated_and_uses_long_model() {
        let analyzer = Analyzer::new(RecordingModel::default(), &small_config());
        let text = "y".repeat(150);
        tokio_test::block_on(analyzer.analyze(&text, AnalysisFocus::Comprehensive)).unwrap();

        let calls = analyzer.model.calls.lock().unwrap();
        assert_eq!(calls[0].0, "gemini-1.5-pro");
        assert!(calls[0].1.contains(&format!("{}{}", "y".repeat(80), TRUNCATION_NOTICE)));
        assert!(!calls[0].1.contains(&"y".repeat(81)));
    }

    #[test]
    fn model_failure_is_a_typed_error() {
        let model = RecordingModel { fail: true, ..Default::default() };
        let analyzer = Analyzer::new(model, &small_config());
        let err = tokio_test::block_on(analyzer.analyze("brief", AnalysisFocus::Risks)).unwrap_err();
        assert_eq!(err.to_string(), "Gemini Analysis failed: Gemini response contained no text");
    }

    #[test]
    fn missing_credential_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            gemini_key_file: dir.path().join("gemini_api_key.txt"),
            ..AppConfig::default()
        };
        let err = tokio_test::block_on(analyze_with_gemini(&config, "text", AnalysisFocus::Comprehensive)).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingCredential(_)));
        assert!(err.to_string().starts_with("Gemini API key not found."));
    }

    #[test]
    fn failed_analysis_writes_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let sections = dir.path().join("sections");
        fs::create_dir_all(&sections).unwrap();
        fs::write(sections.join("MDNA_2023_a.txt"), "Revenue grew.").unwrap();
        let config = AppConfig {
            gemini_key_file: dir.path().join("none.txt"),
            ..AppConfig::default()
        };
        let report = dir.path().join("reports/AAPL_10-K_risks_analysis.md");

        let err = tokio_test::block_on(analyze_sections(&config, &sections, AnalysisFocus::Risks, &report)).unwrap_err();

        assert!(matches!(err, AppError::Ai(AnalysisError::MissingCredential(_))));
        assert!(!report.exists());
    }

    #[test]
    fn empty_sections_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.md");
        let err = tokio_test::block_on(analyze_sections(&AppConfig::default(), dir.path(), AnalysisFocus::Revenue, &report))
            .unwrap_err();
        assert!(matches!(err, AppError::Processing(_)));
        assert!(!report.exists());
    }

    #[test]
    fn sections_are_combined_with_banners() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("MDNA_2023_b.txt"), "second").unwrap();
        fs::write(dir.path().join("MDNA_2022_a.txt"), "first").unwrap();
        fs::write(dir.path().join("ignore.csv"), "x").unwrap();

        let combined = combine_sections(dir.path()).unwrap();
        assert_eq!(
            combined,
            "\n\n--- FROM FILE: MDNA_2022_a.txt ---\n\nfirst\n\n--- FROM FILE: MDNA_2023_b.txt ---\n\nsecond"
        );
        assert_eq!(
            report_file_name("AAPL", "DEF 14A", AnalysisFocus::Risks),
            "AAPL_DEF_14A_risks_analysis.md"
        );
    }
}
