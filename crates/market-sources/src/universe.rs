use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use market_core::{EquityIndex, SourceError, UniverseSource};
use scraper::{ElementRef, Html, Selector};

use crate::session::SourceSession;

const SP500_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";
const NASDAQ100_URL: &str = "https://en.wikipedia.org/wiki/Nasdaq-100";

/// Constituent lists scraped from Wikipedia's `#constituents` tables.
pub struct WikipediaUniverse {
    session: SourceSession,
}

impl WikipediaUniverse {
    pub fn new(session: SourceSession) -> Self {
        Self { session }
    }

    fn url(index: EquityIndex) -> &'static str {
        match index {
            EquityIndex::Sp500 => SP500_URL,
            EquityIndex::Nasdaq100 => NASDAQ100_URL,
        }
    }
}

#[async_trait]
impl UniverseSource for WikipediaUniverse {
    async fn constituents(&self, index: EquityIndex) -> Result<Vec<String>, SourceError> {
        let html = self.session.get_text(Self::url(index)).await?;
        parse_constituents(&html)
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Format(format!("selector {}: {:?}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extract symbols from `table#constituents`. The ticker column is found by
/// its header (`Symbol` or `Ticker`); the first column is used otherwise.
pub fn parse_constituents(html: &str) -> Result<Vec<String>, SourceError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table#constituents")?;
    let row_sel = selector("tr")?;
    let header_sel = selector("th")?;
    let cell_sel = selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| SourceError::Format("constituents table not found".to_string()))?;

    let mut rows = table.select(&row_sel);
    let column = rows
        .next()
        .map(|header| {
            header
                .select(&header_sel)
                .map(cell_text)
                .position(|h| h.eq_ignore_ascii_case("symbol") || h.eq_ignore_ascii_case("ticker"))
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let mut seen = HashSet::new();
    let tickers: Vec<String> = rows
        .filter_map(|row| row.select(&cell_sel).nth(column).map(cell_text))
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('.', "-"))
        .filter(|t| seen.insert(t.clone()))
        .collect();

    if tickers.is_empty() {
        return Err(SourceError::Empty("constituents table has no rows".to_string()));
    }
    Ok(tickers)
}

/// Resolves both index universes once per run.
pub struct TickerUniverseResolver {
    source: Arc<dyn UniverseSource>,
}

impl TickerUniverseResolver {
    pub fn new(source: Arc<dyn UniverseSource>) -> Self {
        Self { source }
    }

    pub async fn resolve(&self, index: EquityIndex) -> Result<Vec<String>, SourceError> {
        tracing::info!("Fetching {} ticker list...", index.display_name());
        let tickers = self.source.constituents(index).await?;
        tracing::info!("Found {} {} tickers", tickers.len(), index.display_name());
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sp500_layout_symbol_first() {
        let html = r#"<html><body>
            <table id="other"><tr><th>Symbol</th></tr><tr><td>NOPE</td></tr></table>
            <table id="constituents">
              <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th></tr>
              <tr><td><a href="/x">MMM</a></td><td>3M</td><td>Industrials</td></tr>
              <tr><td>BRK.B</td><td>Berkshire Hathaway</td><td>Financials</td></tr>
              <tr><td>BF.B</td><td>Brown-Forman</td><td>Consumer Staples</td></tr>
            </table></body></html>"#;
        let tickers = parse_constituents(html).unwrap();
        assert_eq!(tickers, vec!["MMM", "BRK-B", "BF-B"]);
    }

    #[test]
    fn test_nasdaq_layout_company_first() {
        let html = r#"<table id="constituents">
              <tr><th>Company</th><th>Ticker</th><th>GICS Sector</th></tr>
              <tr><td>Adobe Inc.</td><td>ADBE</td><td>Information Technology</td></tr>
              <tr><td>Alphabet Inc. (Class A)</td><td>GOOGL</td><td>Communication Services</td></tr>
              <tr><td>Alphabet Inc. (Class A)</td><td>GOOGL</td><td>Communication Services</td></tr>
            </table>"#;
        let tickers = parse_constituents(html).unwrap();
        assert_eq!(tickers, vec!["ADBE", "GOOGL"]);
    }

    #[test]
    fn test_missing_table() {
        let err = parse_constituents("<html><body><p>moved</p></body></html>").unwrap_err();
        assert!(matches!(err, SourceError::Format(_)));
    }
}
