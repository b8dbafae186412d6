// src/xbrl/mod.rs
use crate::extractors::structured::{RawTable, StructuredTable};
use crate::extractors::table::StatementCategory;
use crate::utils::error::EdgarError;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Client for an XBRL-to-JSON conversion service (sec-api.io compatible).
pub struct XbrlClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl XbrlClient {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self, EdgarError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, endpoint: endpoint.to_string(), api_key })
    }

    /// Fetches the converted XBRL facts for the filing at `filing_url`.
    pub async fn fetch_xbrl_json(&self, filing_url: &str) -> Result<Value, EdgarError> {
        tracing::info!("Requesting XBRL-JSON for {}", filing_url);
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            &[("htm-url", filing_url), ("token", self.api_key.as_str())],
        )
        .map_err(|e| EdgarError::Parse(format!("Invalid XBRL endpoint: {}", e)))?;

        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("XBRL conversion failed with status {}: {}", status, body);
            return Err(EdgarError::Http(status));
        }

        let json = response.json::<Value>().await?;
        Ok(json)
    }
}

/// How a statement labels the period of each fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodRule {
    /// `startDate-endDate`
    Range,
    /// `instant`
    Instant,
    /// `instant` when present, otherwise the range.
    InstantOrRange,
}

impl StatementCategory {
    fn xbrl_section(&self) -> &'static str {
        match self {
            StatementCategory::Balance => "BalanceSheets",
            StatementCategory::Income => "StatementsOfIncome",
            StatementCategory::CashFlow => "StatementsOfCashFlows",
        }
    }

    fn period_rule(&self) -> PeriodRule {
        match self {
            StatementCategory::Balance => PeriodRule::Instant,
            StatementCategory::Income => PeriodRule::Range,
            StatementCategory::CashFlow => PeriodRule::InstantOrRange,
        }
    }

    // Income facts without a value are skipped; the other statements record 0.
    fn missing_value_is_zero(&self) -> bool {
        !matches!(self, StatementCategory::Income)
    }
}

fn period_label(period: &Value, rule: PeriodRule) -> Option<String> {
    let field = |name: &str| period.get(name).and_then(Value::as_str);
    let range = || Some(format!("{}-{}", field("startDate")?, field("endDate")?));
    match rule {
        PeriodRule::Range => range(),
        PeriodRule::Instant => field("instant").map(str::to_string),
        PeriodRule::InstantOrRange => field("instant").map(str::to_string).or_else(range),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builds one statement from XBRL-JSON: a row per line item, a column per
/// period (sorted). Facts tied to a segment are ignored and the first fact
/// for a period wins. A missing section yields an empty table.
pub fn statement_table(xbrl: &Value, category: StatementCategory) -> StructuredTable {
    let Some(items) = xbrl.get(category.xbrl_section()).and_then(Value::as_object) else {
        tracing::warn!("No {} data found in this filing", category.xbrl_section());
        return StructuredTable::from_raw(RawTable::default());
    };

    let rule = category.period_rule();
    let mut periods: BTreeSet<String> = BTreeSet::new();
    let mut rows: Vec<(String, HashMap<String, String>)> = Vec::new();

    for (item, facts) in items {
        let mut values: HashMap<String, String> = HashMap::new();
        for fact in facts.as_array().into_iter().flatten() {
            if fact.get("segment").is_some() {
                continue;
            }
            let Some(period) = fact.get("period").and_then(|p| period_label(p, rule)) else {
                continue;
            };
            if values.contains_key(&period) {
                continue;
            }
            let value = match fact.get("value") {
                Some(v) => value_text(v),
                None if category.missing_value_is_zero() => "0".to_string(),
                None => continue,
            };
            periods.insert(period.clone());
            values.insert(period, value);
        }
        rows.push((item.clone(), values));
    }

    let periods: Vec<String> = periods.into_iter().collect();
    let mut header = vec!["item".to_string()];
    header.extend(periods.iter().cloned());

    let body_rows = rows
        .into_iter()
        .map(|(item, mut values)| {
            let mut row = vec![item];
            row.extend(periods.iter().map(|p| values.remove(p).unwrap_or_default()));
            row
        })
        .collect();

    StructuredTable::from_raw(RawTable { header_rows: vec![header], body_rows })
}

/// `xbrl_<category>.csv`
pub fn statement_file_name(category: StatementCategory) -> String {
    format!("xbrl_{}.csv", category.as_str())
}
