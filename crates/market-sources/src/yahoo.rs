use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use market_core::{
    BarInterval, CompanyProfile, NewsItem, NewsSource, PriceHistorySource, RawBar, SourceError,
};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::session::SourceSession;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];

/// Yahoo Finance chart, profile and headline endpoints.
///
/// Profile lookups need a session cookie plus a crumb token; both are
/// obtained lazily and refreshed once when Yahoo answers 401.
pub struct YahooClient {
    session: SourceSession,
    crumb: Mutex<Option<String>>,
    news_count: usize,
}

impl YahooClient {
    pub fn new(session: SourceSession) -> Self {
        Self {
            session,
            crumb: Mutex::new(None),
            news_count: 20,
        }
    }

    pub async fn chart(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: BarInterval,
    ) -> Result<Vec<RawBar>, SourceError> {
        let url = format!("{}/{}", CHART_URL, urlencoding::encode(symbol));
        let response: ChartResponse = self
            .session
            .send_json(self.session.get(&url).query(&[
                ("period1", from.timestamp().to_string()),
                ("period2", to.timestamp().to_string()),
                ("interval", interval.as_str().to_string()),
                ("includePrePost", "false".to_string()),
            ]))
            .await?;
        parse_chart(symbol, response)
    }

    async fn crumb(&self) -> Result<String, SourceError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // fc.yahoo.com answers 404 but sets the session cookie in the jar.
        if let Err(e) = self
            .session
            .send(self.session.get(COOKIE_URL).header("Referer", "https://finance.yahoo.com/"))
            .await
        {
            tracing::debug!("Yahoo cookie request: {}", e);
        }

        for endpoint in CRUMB_URLS {
            match self.session.get_text(endpoint).await {
                Ok(body) => {
                    let body = body.trim();
                    if !body.is_empty() && !body.contains('<') && body.len() < 64 {
                        *cached = Some(body.to_string());
                        return Ok(body.to_string());
                    }
                    tracing::warn!("Unusable Yahoo crumb from {}", endpoint);
                }
                Err(e) => tracing::warn!("Yahoo crumb request to {} failed: {}", endpoint, e),
            }
        }

        Err(SourceError::Empty("failed to fetch Yahoo crumb from all endpoints".to_string()))
    }

    async fn invalidate_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    async fn quote_summary(&self, symbol: &str) -> Result<QuoteSummaryResponse, SourceError> {
        let url = format!("{}/{}", QUOTE_SUMMARY_URL, urlencoding::encode(symbol));
        let crumb = self.crumb().await?;
        self.session
            .send_json(
                self.session
                    .get(&url)
                    .query(&[("modules", "assetProfile,price"), ("crumb", crumb.as_str())]),
            )
            .await
    }

    pub async fn search_news(&self, symbol: &str) -> Result<Vec<NewsItem>, SourceError> {
        let response: SearchResponse = self
            .session
            .send_json(self.session.get(SEARCH_URL).query(&[
                ("q", symbol.to_string()),
                ("quotesCount", "0".to_string()),
                ("newsCount", self.news_count.to_string()),
            ]))
            .await?;
        Ok(parse_search_news(response))
    }
}

#[async_trait]
impl PriceHistorySource for YahooClient {
    async fn bars(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: BarInterval,
    ) -> Result<Vec<RawBar>, SourceError> {
        let to = Utc::now();
        self.chart(symbol, to - lookback, to, interval).await
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, SourceError> {
        let response = match self.quote_summary(symbol).await {
            Err(SourceError::Status { status: 401, .. }) => {
                tracing::debug!("Yahoo rejected crumb for {}, refreshing", symbol);
                self.invalidate_crumb().await;
                self.quote_summary(symbol).await?
            }
            other => other?,
        };
        parse_profile(symbol, response)
    }
}

#[async_trait]
impl NewsSource for YahooClient {
    async fn headlines(&self, symbol: &str) -> Result<Vec<NewsItem>, SourceError> {
        self.search_news(symbol).await
    }
}

// -- Wire types --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    result: Option<Vec<QuoteSummaryResult>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    #[serde(rename = "assetProfile")]
    asset_profile: Option<AssetProfile>,
    price: Option<PriceModule>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceModule {
    #[serde(rename = "marketCap")]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    news: Vec<SearchNews>,
}

#[derive(Debug, Deserialize)]
struct SearchNews {
    title: Option<String>,
    link: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "providerPublishTime")]
    provider_publish_time: Option<i64>,
    summary: Option<String>,
}

fn describe(error: Option<ApiErrorBody>) -> String {
    match error {
        Some(e) => format!(
            "{}: {}",
            e.code.unwrap_or_default(),
            e.description.unwrap_or_default()
        ),
        None => "no result".to_string(),
    }
}

pub fn parse_chart(symbol: &str, response: ChartResponse) -> Result<Vec<RawBar>, SourceError> {
    let result = match response.chart.result.and_then(|r| r.into_iter().next()) {
        Some(r) => r,
        None => {
            return Err(SourceError::Empty(format!(
                "chart for {}: {}",
                symbol,
                describe(response.chart.error)
            )))
        }
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let bars: Vec<RawBar> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            Some(RawBar {
                timestamp: DateTime::from_timestamp(*ts, 0)?,
                open: at(&quote.open, i),
                high: at(&quote.high, i),
                low: at(&quote.low, i),
                close: at(&quote.close, i),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(SourceError::Empty(format!("no bars returned for {}", symbol)));
    }
    Ok(bars)
}

pub fn parse_profile(symbol: &str, response: QuoteSummaryResponse) -> Result<CompanyProfile, SourceError> {
    let result = match response.quote_summary.result.and_then(|r| r.into_iter().next()) {
        Some(r) => r,
        None => {
            return Err(SourceError::Empty(format!(
                "profile for {}: {}",
                symbol,
                describe(response.quote_summary.error)
            )))
        }
    };

    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let (sector, industry) = match result.asset_profile {
        Some(p) => (non_empty(p.sector), non_empty(p.industry)),
        None => (None, None),
    };

    Ok(CompanyProfile {
        sector,
        industry,
        market_cap: result.price.and_then(|p| p.market_cap).and_then(|m| m.raw),
    })
}

pub fn parse_search_news(response: SearchResponse) -> Vec<NewsItem> {
    response
        .news
        .into_iter()
        .filter_map(|n| {
            Some(NewsItem {
                title: n.title?,
                link: n.link?,
                publisher: n.publisher.unwrap_or_default(),
                summary: n.summary.unwrap_or_default(),
                published_at: n.provider_publish_time.and_then(|t| DateTime::from_timestamp(t, 0)),
            })
        })
        .collect()
}
