use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use market_core::{
    ErrorCode, FearGreedCategory, GaugePoint, GaugeReading, SentimentHistorySource,
    SentimentReading, SentimentSample, SentimentSnapshot, SourceError,
};
use serde::Deserialize;

use crate::session::SourceSession;

const GRAPH_DATA_URL: &str = "https://production.dataviz.cnn.io/index/fearandgreed/graphdata";

/// CNN's Fear & Greed graph data endpoint.
pub struct CnnFearGreedClient {
    session: SourceSession,
}

impl CnnFearGreedClient {
    pub fn new(session: SourceSession) -> Self {
        Self { session }
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphData {
    fear_and_greed_historical: Option<HistoricalSeries>,
}

#[derive(Debug, Deserialize)]
struct HistoricalSeries {
    #[serde(default)]
    data: Vec<GraphPoint>,
}

#[derive(Debug, Deserialize)]
struct GraphPoint {
    /// Milliseconds since the epoch.
    x: f64,
    y: f64,
}

pub fn parse_graph_data(data: GraphData) -> Vec<SentimentSample> {
    data.fear_and_greed_historical
        .map(|h| h.data)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            Some(SentimentSample {
                at: DateTime::from_timestamp_millis(p.x as i64)?,
                value: p.y,
            })
        })
        .collect()
}

#[async_trait]
impl SentimentHistorySource for CnnFearGreedClient {
    async fn history(&self, since: NaiveDate) -> Result<Vec<SentimentSample>, SourceError> {
        let url = format!("{}/{}", GRAPH_DATA_URL, since.format("%Y-%m-%d"));
        let data: GraphData = self.session.get_json(&url).await?;
        Ok(parse_graph_data(data))
    }
}

#[derive(Debug, Clone)]
pub struct SentimentConfig {
    /// Offsets for previous close, one week, one month and one year ago.
    pub lookback_days: [i64; 4],
    pub history_days: i64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            lookback_days: [1, 7, 30, 365],
            history_days: 400,
        }
    }
}

impl SentimentConfig {
    /// `SENTIMENT_LOOKBACK_DAYS` is a comma separated list of four offsets.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookback_days = std::env::var("SENTIMENT_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| parse_lookbacks(&v))
            .unwrap_or(defaults.lookback_days);
        let history_days = std::env::var("SENTIMENT_HISTORY_DAYS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.history_days);

        Self {
            lookback_days,
            history_days,
        }
    }
}

fn parse_lookbacks(raw: &str) -> Option<[i64; 4]> {
    let days: Vec<i64> = raw
        .split(',')
        .map(|d| d.trim().parse().ok())
        .collect::<Option<Vec<_>>>()?;
    days.try_into().ok()
}

const LOOKBACK_LABELS: [&str; 4] = ["Previous close", "1 week ago", "1 month ago", "1 year ago"];

/// Closest sample to `target`; the first one wins when two are equally close.
pub fn nearest_sample(samples: &[SentimentSample], target: DateTime<Utc>) -> Option<&SentimentSample> {
    samples
        .iter()
        .min_by_key(|s| (s.at - target).num_milliseconds().abs())
}

/// Derive the reading and gauge input from a history ending at "now".
pub fn build_reading(
    samples: &[SentimentSample],
    now: DateTime<Utc>,
    config: &SentimentConfig,
) -> Result<(SentimentReading, GaugeReading), SourceError> {
    let current = samples
        .last()
        .ok_or_else(|| SourceError::Empty("no historical data found".to_string()))?
        .value;

    let lookbacks: Vec<Option<f64>> = config
        .lookback_days
        .iter()
        .map(|days| nearest_sample(samples, now - Duration::days(*days)).map(|s| s.value))
        .collect();
    let rounded: Vec<Option<i64>> = lookbacks.iter().map(|v| v.map(round_index)).collect();

    let reading = SentimentReading {
        now: round_index(current),
        previous_close: rounded[0],
        prev_week: rounded[1],
        prev_month: rounded[2],
        prev_year: rounded[3],
        category: FearGreedCategory::from_value(Some(current)),
    };

    let gauge = GaugeReading {
        center_value: round_index(current) as f64,
        points: LOOKBACK_LABELS
            .iter()
            .zip(lookbacks.iter().zip(rounded.iter()))
            .map(|(label, (raw, value))| GaugePoint {
                label: label.to_string(),
                category: FearGreedCategory::from_value(*raw),
                value: *value,
            })
            .collect(),
    };

    Ok((reading, gauge))
}

/// Ties go to the even integer: 44.5 publishes as 44.
fn round_index(value: f64) -> i64 {
    value.round_ties_even() as i64
}

pub struct SentimentIndexFetcher {
    source: Arc<dyn SentimentHistorySource>,
    config: SentimentConfig,
}

impl SentimentIndexFetcher {
    pub fn new(source: Arc<dyn SentimentHistorySource>, config: SentimentConfig) -> Self {
        Self { source, config }
    }

    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<(SentimentReading, GaugeReading), SourceError> {
        let since = (now - Duration::days(self.config.history_days)).date_naive();
        let samples = self.source.history(since).await?;
        build_reading(&samples, now, &self.config)
    }

    /// Collapse any failure into `{now: null, error}`.
    pub async fn fetch_snapshot(&self, now: DateTime<Utc>) -> (SentimentSnapshot, Option<GaugeReading>) {
        match self.fetch(now).await {
            Ok((reading, gauge)) => {
                tracing::info!("Fear & Greed: {} ({})", reading.now, reading.category.label());
                (SentimentSnapshot::Reading(reading), Some(gauge))
            }
            Err(e) => {
                tracing::error!("Error fetching Fear & Greed Index: {}", e);
                (SentimentSnapshot::unavailable(ErrorCode::FearGreed.message(e)), None)
            }
        }
    }
}
