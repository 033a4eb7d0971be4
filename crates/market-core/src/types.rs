use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bar as returned by an upstream source; any value may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

/// Resampled OHLC bucket. `time` is the bucket start in the reference zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarInterval {
    OneHour,
    OneDay,
}

impl BarInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarInterval::OneHour => "1h",
            BarInterval::OneDay => "1d",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSnapshot {
    pub current: Option<f64>,
    #[serde(default)]
    pub history: Vec<OhlcBar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TimeSeriesSnapshot {
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            current: None,
            history: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Sector, industry and size of a listed company.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
}

// -- Sentiment ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FearGreedCategory {
    #[serde(rename = "Extreme Fear")]
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    #[serde(rename = "Extreme Greed")]
    ExtremeGreed,
    Unknown,
}

impl FearGreedCategory {
    pub fn from_value(value: Option<f64>) -> Self {
        match value {
            None => FearGreedCategory::Unknown,
            Some(v) if v <= 25.0 => FearGreedCategory::ExtremeFear,
            Some(v) if v <= 45.0 => FearGreedCategory::Fear,
            Some(v) if v <= 55.0 => FearGreedCategory::Neutral,
            Some(v) if v <= 75.0 => FearGreedCategory::Greed,
            Some(_) => FearGreedCategory::ExtremeGreed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FearGreedCategory::ExtremeFear => "Extreme Fear",
            FearGreedCategory::Fear => "Fear",
            FearGreedCategory::Neutral => "Neutral",
            FearGreedCategory::Greed => "Greed",
            FearGreedCategory::ExtremeGreed => "Extreme Greed",
            FearGreedCategory::Unknown => "Unknown",
        }
    }
}

/// One point of the sentiment index history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentSample {
    pub at: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub now: i64,
    pub previous_close: Option<i64>,
    pub prev_week: Option<i64>,
    pub prev_month: Option<i64>,
    pub prev_year: Option<i64>,
    pub category: FearGreedCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SentimentSnapshot {
    Reading(SentimentReading),
    /// `now` is always null; kept so the persisted shape stays `{now, error}`.
    Unavailable { now: Option<i64>, error: String },
}

impl SentimentSnapshot {
    pub fn unavailable(error: impl Into<String>) -> Self {
        SentimentSnapshot::Unavailable {
            now: None,
            error: error.into(),
        }
    }

    pub fn reading(&self) -> Option<&SentimentReading> {
        match self {
            SentimentSnapshot::Reading(r) => Some(r),
            SentimentSnapshot::Unavailable { .. } => None,
        }
    }
}

impl Default for SentimentSnapshot {
    fn default() -> Self {
        SentimentSnapshot::unavailable(String::new())
    }
}

/// Input for the gauge chart collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeReading {
    pub center_value: f64,
    pub points: Vec<GaugePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugePoint {
    pub label: String,
    pub category: FearGreedCategory,
    pub value: Option<i64>,
}

// -- Calendar ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Economic,
    UsEarnings,
    JpEarnings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// `MM/DD HH:MM` in the reference zone (`MM/DD` when no time is published).
    pub datetime: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Which calendar page a table set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarFeed {
    Economic,
    UsEarnings,
    JpEarnings,
}

/// Cell text of one HTML table, row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSection {
    #[serde(default)]
    pub economic: Vec<CalendarEvent>,
    #[serde(default)]
    pub us_earnings: Vec<CalendarEvent>,
    #[serde(default)]
    pub jp_earnings: Vec<CalendarEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Heatmaps ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EquityIndex {
    Sp500,
    Nasdaq100,
}

impl EquityIndex {
    pub const ALL: [EquityIndex; 2] = [EquityIndex::Sp500, EquityIndex::Nasdaq100];

    pub fn key(&self) -> &'static str {
        match self {
            EquityIndex::Sp500 => "sp500",
            EquityIndex::Nasdaq100 => "nasdaq",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EquityIndex::Sp500 => "S&P 500",
            EquityIndex::Nasdaq100 => "NASDAQ 100",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PerformanceWindow {
    OneDay,
    OneWeek,
    OneMonth,
}

impl PerformanceWindow {
    pub const ALL: [PerformanceWindow; 3] = [
        PerformanceWindow::OneDay,
        PerformanceWindow::OneWeek,
        PerformanceWindow::OneMonth,
    ];

    /// Trading days between the compared closes.
    pub fn lag(&self) -> usize {
        match self {
            PerformanceWindow::OneDay => 1,
            PerformanceWindow::OneWeek => 5,
            PerformanceWindow::OneMonth => 20,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            PerformanceWindow::OneDay => "1d",
            PerformanceWindow::OneWeek => "1w",
            PerformanceWindow::OneMonth => "1m",
        }
    }
}

/// Snapshot key of a heatmap: `sp500_heatmap_1d`, or `sp500_heatmap` for the
/// compatibility copy when `window` is `None`.
pub fn heatmap_key(index: EquityIndex, window: Option<PerformanceWindow>) -> String {
    match window {
        Some(w) => format!("{}_heatmap_{}", index.key(), w.key()),
        None => format!("{}_heatmap", index.key()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPerformance {
    pub ticker: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    pub performance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorAggregate {
    pub sector: String,
    pub performance: f64,
    pub constituents: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    #[serde(default)]
    pub stocks: Vec<StockPerformance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sectors: Vec<SectorAggregate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_commentary: Option<String>,
}

impl Heatmap {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// -- News & narrative --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsTopic {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fact: String,
    #[serde(default)]
    pub interpretation: String,
    #[serde(default)]
    pub impact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsDigest {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<NewsTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub title: String,
    pub content: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_report: Option<WeeklyReport>,
}

// -- Snapshot ----------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSection {
    #[serde(default)]
    pub vix: TimeSeriesSnapshot,
    #[serde(default)]
    pub t_note_future: TimeSeriesSnapshot,
    #[serde(default)]
    pub fear_and_greed: SentimentSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_commentary: Option<String>,
}

/// The daily snapshot. The fetch phase fills everything but the narrative
/// fields and the timestamps; the generate phase adds those.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub market: MarketSection,
    #[serde(default)]
    pub news_raw: Vec<NewsItem>,
    #[serde(default)]
    pub news: NewsDigest,
    #[serde(default)]
    pub indicators: CalendarSection,
    #[serde(flatten)]
    pub heatmaps: BTreeMap<String, Heatmap>,
    #[serde(default)]
    pub column: ColumnSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl MarketSnapshot {
    pub fn heatmap(&self, index: EquityIndex, window: Option<PerformanceWindow>) -> Option<&Heatmap> {
        self.heatmaps.get(&heatmap_key(index, window))
    }

    pub fn heatmap_mut(&mut self, index: EquityIndex, window: Option<PerformanceWindow>) -> &mut Heatmap {
        self.heatmaps.entry(heatmap_key(index, window)).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        let cases = [
            (0.0, FearGreedCategory::ExtremeFear),
            (25.0, FearGreedCategory::ExtremeFear),
            (26.0, FearGreedCategory::Fear),
            (45.0, FearGreedCategory::Fear),
            (46.0, FearGreedCategory::Neutral),
            (55.0, FearGreedCategory::Neutral),
            (56.0, FearGreedCategory::Greed),
            (75.0, FearGreedCategory::Greed),
            (76.0, FearGreedCategory::ExtremeGreed),
            (100.0, FearGreedCategory::ExtremeGreed),
        ];
        for (value, expected) in cases {
            assert_eq!(FearGreedCategory::from_value(Some(value)), expected, "value {}", value);
        }
        assert_eq!(FearGreedCategory::from_value(None), FearGreedCategory::Unknown);
    }

    #[test]
    fn test_category_is_total_over_fractions() {
        assert_eq!(FearGreedCategory::from_value(Some(25.5)), FearGreedCategory::Fear);
        assert_eq!(FearGreedCategory::from_value(Some(-3.0)), FearGreedCategory::ExtremeFear);
        assert_eq!(FearGreedCategory::from_value(Some(75.01)), FearGreedCategory::ExtremeGreed);
    }

    #[test]
    fn test_category_serializes_with_spaces() {
        let json = serde_json::to_string(&FearGreedCategory::ExtremeFear).unwrap();
        assert_eq!(json, "\"Extreme Fear\"");
    }

    #[test]
    fn test_sentiment_unavailable_shape() {
        let snap = SentimentSnapshot::unavailable("[E004] boom");
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value, serde_json::json!({"now": null, "error": "[E004] boom"}));

        let back: SentimentSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_sentiment_reading_deserializes() {
        let value = serde_json::json!({
            "now": 40, "previous_close": 38, "prev_week": null,
            "prev_month": 60, "prev_year": 20, "category": "Fear"
        });
        let snap: SentimentSnapshot = serde_json::from_value(value).unwrap();
        let reading = snap.reading().unwrap();
        assert_eq!(reading.now, 40);
        assert_eq!(reading.prev_week, None);
        assert_eq!(reading.category, FearGreedCategory::Fear);
    }

    #[test]
    fn test_heatmap_keys() {
        assert_eq!(heatmap_key(EquityIndex::Sp500, Some(PerformanceWindow::OneDay)), "sp500_heatmap_1d");
        assert_eq!(heatmap_key(EquityIndex::Nasdaq100, Some(PerformanceWindow::OneMonth)), "nasdaq_heatmap_1m");
        assert_eq!(heatmap_key(EquityIndex::Nasdaq100, None), "nasdaq_heatmap");
    }

    #[test]
    fn test_snapshot_flattens_heatmaps() {
        let mut snapshot = MarketSnapshot::default();
        snapshot.heatmap_mut(EquityIndex::Sp500, Some(PerformanceWindow::OneWeek)).stocks.push(
            StockPerformance {
                ticker: "AAPL".into(),
                sector: "Technology".into(),
                industry: "Consumer Electronics".into(),
                market_cap: 3.0e12,
                performance: 1.25,
            },
        );

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["sp500_heatmap_1w"]["stocks"][0]["ticker"], "AAPL");
        assert!(value.get("date").is_none());
        assert_eq!(value["column"], serde_json::json!({}));

        let back: MarketSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_failed_heatmap_shape() {
        let value = serde_json::to_value(Heatmap::failed("[E006] x")).unwrap();
        assert_eq!(value, serde_json::json!({"stocks": [], "error": "[E006] x"}));
    }

    #[test]
    fn test_calendar_event_type_field() {
        let event = CalendarEvent {
            datetime: "10/18 21:30".into(),
            kind: EventKind::UsEarnings,
            name: None,
            importance: None,
            previous: None,
            forecast: None,
            ticker: Some("AAPL".into()),
            company: Some("(Apple)".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "us_earnings");
        assert!(value.get("name").is_none());
    }
}
