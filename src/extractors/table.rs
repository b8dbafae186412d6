// src/extractors/table.rs
use crate::extractors::structured::{RawTable, StructuredTable};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));

// Siblings whose text counts as a table's descriptive context.
const CONTEXT_TAGS: [&str; 11] = ["p", "div", "font", "b", "strong", "h1", "h2", "h3", "h4", "h5", "h6"];

// Layout wrappers the context search may climb out of.
const CONTAINER_TAGS: [&str; 3] = ["div", "center", "section"];

// Guards against absurd span attributes.
const MAX_SPAN: usize = 1000;

// --- Keyword Patterns (Lazy Static) ---
// Filers title statements in the plural ("Statements of Operations"), so
// "statement of" also accepts "statements of".
fn compile_keywords(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pat| pat.replace("statement of", "statements? of"))
        .map(|pat| Regex::new(&format!("(?i){}", pat)).expect("Failed to compile table keyword pattern"))
        .collect()
}

static BALANCE_KEYWORDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_keywords(&[
        "balance sheet",
        "financial position",
        "assets.*liabilities",
        "statement of financial position",
    ])
});

static INCOME_KEYWORDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_keywords(&[
        "income statement",
        "statement of operations",
        "statement of earnings",
        "profit and loss",
    ])
});

static CASHFLOW_KEYWORDS: Lazy<Vec<Regex>> =
    Lazy::new(|| compile_keywords(&["cash flow", "cash flows", "statement of cash flows"]));

/// The financial statements the table path looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum StatementCategory {
    Balance,
    Income,
    #[value(name = "cashflow")]
    CashFlow,
}

impl StatementCategory {
    pub const ALL: [StatementCategory; 3] =
        [StatementCategory::Balance, StatementCategory::Income, StatementCategory::CashFlow];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementCategory::Balance => "balance",
            StatementCategory::Income => "income",
            StatementCategory::CashFlow => "cashflow",
        }
    }

    fn keywords(&self) -> &'static [Regex] {
        match self {
            StatementCategory::Balance => &BALANCE_KEYWORDS,
            StatementCategory::Income => &INCOME_KEYWORDS,
            StatementCategory::CashFlow => &CASHFLOW_KEYWORDS,
        }
    }

    /// Byte offset just past the last keyword hit in `context`, if any.
    fn last_keyword_end(&self, context: &str) -> Option<usize> {
        self.keywords()
            .iter()
            .filter_map(|re| re.find_iter(context).last().map(|m| m.end()))
            .max()
    }
}

/// A table found in a document together with the text leading up to it.
#[derive(Debug, Clone)]
pub struct TableCandidate<'a> {
    pub element: ElementRef<'a>,
    pub context: String,
}

impl<'a> TableCandidate<'a> {
    /// Assigns at most one category: the one whose keyword appears closest to
    /// the end of the context, i.e. nearest the table. Ties go to the earlier
    /// category in [`StatementCategory::ALL`].
    pub fn classify(&self) -> Option<StatementCategory> {
        let mut best: Option<(StatementCategory, usize)> = None;
        for category in StatementCategory::ALL {
            if let Some(pos) = category.last_keyword_end(&self.context) {
                if best.map_or(true, |(_, best_pos)| pos > best_pos) {
                    best = Some((category, pos));
                }
            }
        }
        best.map(|(category, _)| category)
    }
}

pub struct TableExtractor {
    context_chars: usize,
}

impl TableExtractor {
    pub fn new(context_chars: usize) -> Self {
        Self { context_chars }
    }

    /// Collects every distinct table in the document, nested ones included.
    /// Tables whose markup is identical to one already seen are skipped.
    pub fn scan<'a>(&self, document: &'a Html) -> Vec<TableCandidate<'a>> {
        let mut seen: HashSet<u64> = HashSet::new();
        let mut candidates = Vec::new();

        for element in document.select(&TABLE_SELECTOR) {
            let content_hash = content_hash(&element);
            if !seen.insert(content_hash) {
                tracing::trace!("Skipping duplicate table {:x}", content_hash);
                continue;
            }
            let context = preceding_context(element, self.context_chars);
            candidates.push(TableCandidate { element, context });
        }

        tracing::debug!("Scanned {} distinct tables", candidates.len());
        candidates
    }

    /// Extracts the cleaned tables of one statement category.
    pub fn extract_tables(&self, document: &Html, category: StatementCategory) -> Vec<StructuredTable> {
        let candidates = self.scan(document);
        self.convert(&candidates, category)
    }

    /// Extracts all categories from a single scan, in [`StatementCategory::ALL`] order.
    pub fn extract_all(&self, document: &Html) -> Vec<(StatementCategory, Vec<StructuredTable>)> {
        let candidates = self.scan(document);
        StatementCategory::ALL
            .iter()
            .map(|&category| (category, self.convert(&candidates, category)))
            .collect()
    }

    fn convert(&self, candidates: &[TableCandidate<'_>], category: StatementCategory) -> Vec<StructuredTable> {
        candidates
            .iter()
            .filter(|candidate| candidate.classify() == Some(category))
            .filter_map(|candidate| match parse_table(candidate.element) {
                Ok(raw) => {
                    let table = StructuredTable::from_raw(raw);
                    if table.is_meaningful() {
                        Some(table)
                    } else {
                        tracing::debug!("Dropping {} table with {} columns after cleaning", category.as_str(), table.columns.len());
                        None
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {} table: {}", category.as_str(), e);
                    None
                }
            })
            .collect()
    }
}

fn content_hash(element: &ElementRef) -> u64 {
    let mut hasher = DefaultHasher::new();
    element.html().hash(&mut hasher);
    hasher.finish()
}

/// Text of an element with each text node trimmed and blanks dropped.
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Walks backwards through preceding siblings gathering text from
/// paragraph/heading-like elements. When the siblings run out before the
/// limit is reached, the walk climbs into the enclosing layout container and
/// continues from there. Only the last `limit` characters are kept.
fn preceding_context(table: ElementRef, limit: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut gathered = 0;
    let mut anchor = table;

    'climb: loop {
        for sibling in anchor.prev_siblings().filter_map(ElementRef::wrap) {
            if gathered >= limit {
                break 'climb;
            }
            if !CONTEXT_TAGS.contains(&sibling.value().name()) {
                continue;
            }
            let text = element_text(sibling);
            if !text.is_empty() {
                gathered += text.chars().count() + 1;
                parts.push(text);
            }
        }

        match anchor.parent().and_then(ElementRef::wrap) {
            Some(parent) if gathered < limit && CONTAINER_TAGS.contains(&parent.value().name()) => {
                anchor = parent;
            }
            _ => break,
        }
    }

    parts.reverse();
    let joined = parts.join(" ");
    let total = joined.chars().count();
    if total > limit {
        joined.chars().skip(total - limit).collect()
    } else {
        joined
    }
}

/// Rows that belong to this table, excluding rows of tables nested in its cells.
fn own_rows(table: ElementRef) -> Vec<(ElementRef, bool)> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push((child, false)),
            section @ ("thead" | "tbody" | "tfoot") => {
                let in_head = section == "thead";
                rows.extend(
                    child
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter(|el| el.value().name() == "tr")
                        .map(|el| (el, in_head)),
                );
            }
            _ => {}
        }
    }
    rows
}

fn fill_carried(grid_row: &mut Vec<String>, carried: &mut [Option<(String, usize)>]) {
    while let Some(slot) = carried.get_mut(grid_row.len()) {
        let Some((text, remaining)) = slot.as_mut() else {
            break;
        };
        grid_row.push(text.clone());
        *remaining -= 1;
        if *remaining == 0 {
            *slot = None;
        }
    }
}

fn span_attr(cell: ElementRef, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

/// Converts a table element into a grid, expanding `colspan`/`rowspan` by
/// repeating the cell text. Rows inside `<thead>`, or leading rows made only
/// of `<th>` cells, become header rows.
pub fn parse_table(table: ElementRef) -> Result<RawTable, ExtractError> {
    let rows = own_rows(table);
    if rows.is_empty() {
        return Err(ExtractError::TableParse("table has no rows".to_string()));
    }

    let has_thead = rows.iter().any(|(_, in_head)| *in_head);
    let mut raw = RawTable::default();
    // Per column: text carried down by a rowspan and how many rows remain.
    let mut carried: Vec<Option<(String, usize)>> = Vec::new();

    for (tr, in_head) in rows {
        let cells: Vec<ElementRef> = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .collect();
        let all_th = !cells.is_empty() && cells.iter().all(|c| c.value().name() == "th");

        let mut grid_row: Vec<String> = Vec::new();
        for cell in cells {
            fill_carried(&mut grid_row, &mut carried);
            let text = element_text(cell).replace('\u{a0}', " ");
            let colspan = span_attr(cell, "colspan");
            let rowspan = span_attr(cell, "rowspan");
            for _ in 0..colspan {
                let col = grid_row.len();
                if rowspan > 1 {
                    if carried.len() <= col {
                        carried.resize(col + 1, None);
                    }
                    carried[col] = Some((text.clone(), rowspan - 1));
                }
                grid_row.push(text.clone());
            }
        }
        fill_carried(&mut grid_row, &mut carried);

        if grid_row.is_empty() {
            continue;
        }
        let is_header = if has_thead { in_head } else { all_th && raw.body_rows.is_empty() };
        if is_header {
            raw.header_rows.push(grid_row);
        } else {
            raw.body_rows.push(grid_row);
        }
    }

    if raw.header_rows.is_empty() && raw.body_rows.is_empty() {
        return Err(ExtractError::TableParse("table has no cells".to_string()));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::structured::{Cell, ColumnKind};

    const BALANCE_SHEET: &str = r#"
        <p>Apple Inc.</p>
        <p><b>CONSOLIDATED BALANCE SHEETS</b></p>
        <p>(In millions)</p>
        <table>
          <tr><td></td><td>September 30, 2023</td><td></td><td>September 24, 2022</td></tr>
          <tr><td>Total current assets</td><td>$ 143,566</td><td></td><td>$ 135,405</td></tr>
          <tr><td>Total assets</td><td>352,583</td><td></td><td>352,755</td></tr>
        </table>"#;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{}</body></html>", body))
    }

    #[test]
    fn balance_sheet_is_found_only_for_balance_keywords() {
        let document = doc(BALANCE_SHEET);
        let extractor = TableExtractor::new(500);

        let balance = extractor.extract_tables(&document, StatementCategory::Balance);
        assert_eq!(balance.len(), 1);
        let table = &balance[0];
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.kinds[0], ColumnKind::Text);
        assert_eq!(table.rows[1][1], Cell::Text("143566".to_string()));

        assert!(extractor.extract_tables(&document, StatementCategory::Income).is_empty());
        assert!(extractor.extract_tables(&document, StatementCategory::CashFlow).is_empty());
    }

    #[test]
    fn single_column_table_is_excluded() {
        let document = doc(
            r#"<p>Consolidated Balance Sheets</p>
               <table><tr><td>Total assets</td><td></td></tr><tr><td>Total liabilities</td><td> </td></tr></table>"#,
        );
        let extractor = TableExtractor::new(500);
        assert!(extractor.extract_tables(&document, StatementCategory::Balance).is_empty());
    }

    #[test]
    fn table_in_layout_container_uses_context_outside_it() {
        let document = doc(
            r#"<h2>Consolidated Statements of Operations</h2>
               <div><div><table>
                 <tr><th>Item</th><th>2023</th></tr>
                 <tr><td>Net sales</td><td>383,285</td></tr>
               </table></div></div>"#,
        );
        let extractor = TableExtractor::new(500);
        let income = extractor.extract_tables(&document, StatementCategory::Income);
        assert_eq!(income.len(), 1);
        assert_eq!(income[0].columns, vec!["Item", "2023"]);
        assert_eq!(income[0].kinds[1], ColumnKind::Numeric);
        assert_eq!(income[0].rows[0][1], Cell::Number(383285.0));
    }

    #[test]
    fn duplicate_tables_are_scanned_once() {
        let table = "<table><tr><td>Cash</td><td>1</td></tr></table>";
        let document = doc(&format!(
            "<p>Statement of Cash Flows</p>{}<p>Statement of Cash Flows</p>{}",
            table, table
        ));
        let extractor = TableExtractor::new(500);
        assert_eq!(extractor.scan(&document).len(), 1);
        assert_eq!(extractor.extract_tables(&document, StatementCategory::CashFlow).len(), 1);
    }

    #[test]
    fn nearest_keyword_decides_category() {
        let document = doc(
            r#"<p>The balance sheet is discussed above.</p>
               <p>Consolidated Statements of Cash Flows</p>
               <table><tr><td>Operating activities</td><td>110,543</td></tr></table>"#,
        );
        let extractor = TableExtractor::new(500);
        let candidates = extractor.scan(&document);
        assert_eq!(candidates[0].classify(), Some(StatementCategory::CashFlow));
        assert!(extractor.extract_tables(&document, StatementCategory::Balance).is_empty());
    }

    #[test]
    fn context_is_capped_to_nearest_text() {
        let far = "balance sheet ".repeat(100);
        let document = doc(&format!(
            "<p>{}</p><p>Statement of Earnings</p><table><tr><td>a</td><td>1</td></tr></table>",
            far
        ));
        let extractor = TableExtractor::new(50);
        let candidates = extractor.scan(&document);
        assert_eq!(candidates[0].context.chars().count(), 50);
        assert!(candidates[0].context.ends_with("Statement of Earnings"));
    }

    #[test]
    fn spans_are_expanded_and_nested_rows_ignored() {
        let document = doc(
            r#"<table>
                 <thead><tr><th rowspan="2">Item</th><th colspan="2">Years ended</th></tr>
                        <tr><th>2023</th><th>2022</th></tr></thead>
                 <tbody><tr><td>Revenue<table><tr><td>nested</td></tr></table></td><td>10</td><td>9</td></tr></tbody>
               </table>"#,
        );
        let table = document.select(&TABLE_SELECTOR).next().unwrap();
        let raw = parse_table(table).unwrap();

        assert_eq!(raw.header_rows.len(), 2);
        assert_eq!(raw.header_rows[0], vec!["Item", "Years ended", "Years ended"]);
        assert_eq!(raw.header_rows[1], vec!["Item", "2023", "2022"]);
        assert_eq!(raw.body_rows.len(), 1);

        let structured = StructuredTable::from_raw(raw);
        assert_eq!(structured.columns, vec!["Item", "Years ended 2023", "Years ended 2022"]);
    }

    #[test]
    fn every_keyword_pattern_compiles() {
        assert_eq!(BALANCE_KEYWORDS.len(), 4);
        assert_eq!(INCOME_KEYWORDS.len(), 4);
        assert_eq!(CASHFLOW_KEYWORDS.len(), 3);
    }

    #[test]
    fn empty_table_is_a_parse_error() {
        let document = doc("<table></table>");
        let table = document.select(&TABLE_SELECTOR).next().unwrap();
        assert!(matches!(parse_table(table), Err(ExtractError::TableParse(_))));
    }
}
