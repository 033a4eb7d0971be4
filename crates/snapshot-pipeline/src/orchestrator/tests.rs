use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Asia::Tokyo;
use market_core::{
    BarInterval, CalendarFeed, CalendarSource, CompanyProfile, GaugeReading, NewsItem, NewsSource,
    PriceHistorySource, RawBar, RawTable, SentimentHistorySource, SentimentSample, SourceError,
    UniverseSource,
};
use market_sources::CalendarConfig;
use market_sources::SentimentConfig;

use super::*;
use crate::config::PipelineConfig;
use crate::context::PipelineSources;
use crate::gauge::{GaugeError, GaugeRenderer};
use crate::heatmap::HeatmapConfig;

fn now() -> DateTime<Tz> {
    Tokyo.with_ymd_and_hms(2024, 5, 10, 20, 0, 0).unwrap()
}

fn bar(at: DateTime<Utc>, close: f64) -> RawBar {
    RawBar {
        timestamp: at,
        open: Some(close),
        high: Some(close + 0.5),
        low: Some(close - 0.5),
        close: Some(close),
    }
}

struct FakePrices;

#[async_trait]
impl PriceHistorySource for FakePrices {
    async fn bars(&self, symbol: &str, _: chrono::Duration, interval: BarInterval) -> Result<Vec<RawBar>, SourceError> {
        let end = now().with_timezone(&Utc);
        match (symbol, interval) {
            ("^TNX", _) => Err(SourceError::Status {
                status: 404,
                url: "chart/^TNX".into(),
            }),
            ("^VIX", BarInterval::OneHour) => Ok((0..8)
                .map(|h| bar(end - chrono::Duration::hours(8 - h), 14.0 + h as f64 * 0.111))
                .collect()),
            (_, BarInterval::OneDay) => Ok((0..22)
                .map(|d| bar(end - chrono::Duration::days(22 - d), 100.0 + d as f64))
                .collect()),
            _ => Err(SourceError::Empty(symbol.to_string())),
        }
    }

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, SourceError> {
        if symbol == "FAIL" {
            return Err(SourceError::Network("reset".into()));
        }
        Ok(CompanyProfile {
            sector: Some("Technology".into()),
            industry: Some("Semiconductors".into()),
            market_cap: Some(2.5e12),
        })
    }
}

struct FakeSentiment;

#[async_trait]
impl SentimentHistorySource for FakeSentiment {
    async fn history(&self, _: NaiveDate) -> Result<Vec<SentimentSample>, SourceError> {
        let end = now().with_timezone(&Utc);
        Ok((0..=400)
            .rev()
            .map(|d| SentimentSample {
                at: end - chrono::Duration::days(d),
                value: if d == 0 { 64.4 } else { 40.0 },
            })
            .collect())
    }
}

struct FakeCalendar {
    fail_all: bool,
}

#[async_trait]
impl CalendarSource for FakeCalendar {
    async fn tables(&self, feed: CalendarFeed) -> Result<Vec<RawTable>, SourceError> {
        if self.fail_all || feed == CalendarFeed::Economic {
            return Err(SourceError::Status {
                status: 503,
                url: format!("{:?}", feed),
            });
        }
        Ok(vec![RawTable {
            rows: vec![vec!["2024/05/12".into(), "08:00".into(), "AAPL".into(), "Apple Inc.".into()]],
        }])
    }
}

struct FakeUniverse {
    failing: Vec<EquityIndex>,
}

#[async_trait]
impl UniverseSource for FakeUniverse {
    async fn constituents(&self, index: EquityIndex) -> Result<Vec<String>, SourceError> {
        if self.failing.contains(&index) {
            return Err(SourceError::Format("table#constituents not found".into()));
        }
        Ok(vec!["NVDA".into(), "FAIL".into()])
    }
}

struct FakeNews;

#[async_trait]
impl NewsSource for FakeNews {
    async fn headlines(&self, symbol: &str) -> Result<Vec<NewsItem>, SourceError> {
        Ok(vec![NewsItem {
            title: format!("{} closes higher", symbol),
            link: "https://example.com/markets".into(),
            publisher: "Wire".into(),
            summary: String::new(),
            published_at: Some(now().with_timezone(&Utc) - chrono::Duration::hours(2)),
        }])
    }
}

#[derive(Default)]
struct RecordingGauge {
    rendered: Mutex<Vec<GaugeReading>>,
    fail: bool,
}

impl GaugeRenderer for RecordingGauge {
    fn render(&self, reading: &GaugeReading) -> Result<(), GaugeError> {
        if self.fail {
            return Err(GaugeError::Render(std::fmt::Error));
        }
        self.rendered.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

fn context(
    data_dir: &std::path::Path,
    calendar_fails: bool,
    failing_universes: &[EquityIndex],
    gauge: Arc<RecordingGauge>,
) -> PipelineContext {
    PipelineContext {
        config: PipelineConfig {
            data_dir: data_dir.to_path_buf(),
            heatmap: HeatmapConfig {
                batch_size: 1,
                batch_pause: Duration::ZERO,
                failure_pause: Duration::ZERO,
                lookback_days: 35,
            },
            ..PipelineConfig::default()
        },
        sources: PipelineSources {
            prices: Arc::new(FakePrices),
            sentiment: Arc::new(FakeSentiment),
            calendar: Arc::new(FakeCalendar {
                fail_all: calendar_fails,
            }),
            universe: Arc::new(FakeUniverse {
                failing: failing_universes.to_vec(),
            }),
            news: Arc::new(FakeNews),
        },
        calendar: CalendarConfig::default(),
        sentiment: SentimentConfig::default(),
        gauge,
    }
}

#[tokio::test]
async fn test_failed_task_does_not_affect_others() {
    let tmp = tempfile::tempdir().unwrap();
    let gauge = Arc::new(RecordingGauge::default());
    let orchestrator = PipelineOrchestrator::new(context(tmp.path(), false, &[], gauge.clone()));

    let (snapshot, report) = orchestrator.run_fetch(now()).await.unwrap();

    let order: Vec<_> = report.outcomes.iter().map(|(t, _)| *t).collect();
    assert_eq!(order, FetchTask::ORDER.to_vec());

    // T-note failed: placeholder with the E003 code, nothing else touched.
    assert!(matches!(report.outcome(FetchTask::TNoteFuture), Some(TaskOutcome::Failed(_))));
    let t_note = &snapshot.market.t_note_future;
    assert_eq!(t_note.current, None);
    assert!(t_note.history.is_empty());
    assert!(t_note.error.as_deref().unwrap().starts_with("[E003]"));

    assert_eq!(report.outcome(FetchTask::Vix), Some(&TaskOutcome::Completed));
    assert_eq!(snapshot.market.vix.current, Some(14.78));
    assert!(!snapshot.market.vix.history.is_empty());

    let reading = snapshot.market.fear_and_greed.reading().unwrap();
    assert_eq!(reading.now, 64);
    assert_eq!(reading.prev_week, Some(40));
    assert_eq!(gauge.rendered.lock().unwrap().len(), 1);

    // One calendar feed failed: the others still parsed.
    assert!(matches!(report.outcome(FetchTask::Calendar), Some(TaskOutcome::Partial(_))));
    assert!(snapshot.indicators.economic.is_empty());
    assert_eq!(snapshot.indicators.us_earnings.len(), 1);
    assert!(snapshot.indicators.error.as_deref().unwrap().starts_with("[E007]"));

    // Three indexes return the same link; it is kept once.
    assert_eq!(snapshot.news_raw.len(), 1);

    let one_day = snapshot.heatmap(EquityIndex::Sp500, Some(PerformanceWindow::OneDay)).unwrap();
    assert_eq!(one_day.stocks.len(), 1);
    assert_eq!(one_day.stocks[0].ticker, "NVDA");
    assert_eq!(snapshot.heatmap(EquityIndex::Sp500, None), Some(one_day));
    assert_eq!(snapshot.heatmaps.len(), 8);
    assert!(matches!(report.outcome(FetchTask::Heatmaps), Some(TaskOutcome::Partial(_))));

    let written = std::fs::read_to_string(tmp.path().join("data_raw.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert!(value["market"]["t_note_future"]["current"].is_null());
    assert!(value.get("sp500_heatmap_1m").is_some());
}

fn assert_failed_keys(snapshot: &MarketSnapshot, index: EquityIndex) {
    let keys = std::iter::once(None).chain(PerformanceWindow::ALL.into_iter().map(Some));
    for window in keys {
        let heatmap = snapshot.heatmap(index, window).unwrap();
        assert!(heatmap.stocks.is_empty());
        assert!(heatmap.error.as_deref().unwrap().starts_with("[E006]"));
    }
}

#[tokio::test]
async fn test_universe_failure_only_marks_that_index() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(context(
        tmp.path(),
        false,
        &[EquityIndex::Nasdaq100],
        Arc::new(RecordingGauge::default()),
    ));

    let (snapshot, report) = orchestrator.collect(now()).await;

    assert!(matches!(report.outcome(FetchTask::Heatmaps), Some(TaskOutcome::Partial(_))));
    assert_eq!(snapshot.heatmaps.len(), 8);
    assert_failed_keys(&snapshot, EquityIndex::Nasdaq100);

    let one_day = snapshot.heatmap(EquityIndex::Sp500, Some(PerformanceWindow::OneDay)).unwrap();
    assert!(one_day.error.is_none());
    assert_eq!(one_day.stocks.len(), 1);
    assert_eq!(snapshot.heatmap(EquityIndex::Sp500, None), Some(one_day));
}

#[tokio::test]
async fn test_all_universes_failing_fails_task() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(context(
        tmp.path(),
        true,
        &EquityIndex::ALL,
        Arc::new(RecordingGauge::default()),
    ));

    let (snapshot, report) = orchestrator.collect(now()).await;

    assert!(matches!(report.outcome(FetchTask::Heatmaps), Some(TaskOutcome::Failed(_))));
    assert_eq!(snapshot.heatmaps.len(), 8);
    for index in EquityIndex::ALL {
        assert_failed_keys(&snapshot, index);
    }

    assert!(matches!(report.outcome(FetchTask::Calendar), Some(TaskOutcome::Failed(_))));
    assert!(snapshot.indicators.us_earnings.is_empty());
    assert!(snapshot.indicators.error.as_deref().unwrap().starts_with("[E007]"));
    assert!(!tmp.path().join("data_raw.json").exists());
}

#[tokio::test]
async fn test_heatmap_failure_stays_isolated_in_raw_file() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = PipelineOrchestrator::new(context(
        tmp.path(),
        false,
        &[EquityIndex::Sp500],
        Arc::new(RecordingGauge::default()),
    ));

    orchestrator.run_fetch(now()).await.unwrap();

    let written = std::fs::read_to_string(tmp.path().join("data_raw.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&written).unwrap();

    assert_eq!(value["market"]["fear_and_greed"]["now"], 64);
    assert_eq!(value["indicators"]["us_earnings"].as_array().unwrap().len(), 1);
    for key in ["sp500_heatmap", "sp500_heatmap_1d", "sp500_heatmap_1w", "sp500_heatmap_1m"] {
        assert!(value[key]["error"].as_str().unwrap().starts_with("[E006]"), "{}", key);
        assert_eq!(value[key]["stocks"], serde_json::json!([]));
    }
    for key in ["nasdaq_heatmap", "nasdaq_heatmap_1d", "nasdaq_heatmap_1w", "nasdaq_heatmap_1m"] {
        assert!(value[key].get("error").is_none(), "{}", key);
        assert_eq!(value[key]["stocks"][0]["ticker"], "NVDA");
    }
}

#[tokio::test]
async fn test_gauge_failure_keeps_reading() {
    let tmp = tempfile::tempdir().unwrap();
    let gauge = Arc::new(RecordingGauge {
        fail: true,
        ..Default::default()
    });
    let orchestrator = PipelineOrchestrator::new(context(tmp.path(), false, &[], gauge));

    let (snapshot, report) = orchestrator.collect(now()).await;

    assert_eq!(report.outcome(FetchTask::FearGreed), Some(&TaskOutcome::Completed));
    assert!(snapshot.market.fear_and_greed.reading().is_some());
}

#[test]
fn test_placeholder_shapes() {
    let mut snapshot = MarketSnapshot::default();
    let failure = TaskFailure::new(ErrorCode::FearGreed, "timeout");
    apply_placeholder(&mut snapshot, FetchTask::FearGreed, &failure);

    let value = serde_json::to_value(&snapshot.market.fear_and_greed).unwrap();
    assert!(value["now"].is_null());
    assert_eq!(value["error"], "[E004] Failed to fetch Fear & Greed Index data.: timeout");
}
