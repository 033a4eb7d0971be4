//! Fetch phase: run each data task in order, isolate failures, persist the
//! raw snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use market_core::{
    sanitize, CalendarSection, EquityIndex, ErrorCode, Heatmap, MarketSnapshot, PerformanceWindow,
    SentimentSnapshot, TimeSeriesSnapshot,
};
use market_sources::{
    CalendarParser, NewsCollector, SentimentIndexFetcher, TickerUniverseResolver, TimeSeriesFetcher,
    TimeSeriesRequest,
};

use crate::context::PipelineContext;
use crate::error::{ArtifactError, SnapshotError};
use crate::heatmap::HeatmapAggregator;

pub const VIX_SYMBOL: &str = "^VIX";
pub const T_NOTE_SYMBOL: &str = "^TNX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTask {
    Vix,
    TNoteFuture,
    FearGreed,
    Calendar,
    News,
    Heatmaps,
}

impl FetchTask {
    pub const ORDER: [FetchTask; 6] = [
        FetchTask::Vix,
        FetchTask::TNoteFuture,
        FetchTask::FearGreed,
        FetchTask::Calendar,
        FetchTask::News,
        FetchTask::Heatmaps,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FetchTask::Vix => "vix",
            FetchTask::TNoteFuture => "t_note_future",
            FetchTask::FearGreed => "fear_greed",
            FetchTask::Calendar => "calendar",
            FetchTask::News => "news",
            FetchTask::Heatmaps => "heatmaps",
        }
    }
}

/// A task that produced nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub code: ErrorCode,
    pub detail: String,
}

impl TaskFailure {
    pub fn new(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Self {
            code,
            detail: detail.to_string(),
        }
    }

    pub fn message(&self) -> String {
        self.code.message(&self.detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    /// Finished with part of its data missing.
    Partial(String),
    /// Placeholder written in place of the task's data.
    Failed(String),
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub outcomes: Vec<(FetchTask, TaskOutcome)>,
}

impl FetchReport {
    pub fn outcome(&self, task: FetchTask) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|(t, _)| *t == task).map(|(_, o)| o)
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Failed(_)))
            .count()
    }
}

/// Replace the fields owned by `task` with its failure placeholder.
pub fn apply_placeholder(snapshot: &mut MarketSnapshot, task: FetchTask, failure: &TaskFailure) {
    let message = failure.message();
    match task {
        FetchTask::Vix => snapshot.market.vix = TimeSeriesSnapshot::degraded(message),
        FetchTask::TNoteFuture => snapshot.market.t_note_future = TimeSeriesSnapshot::degraded(message),
        FetchTask::FearGreed => snapshot.market.fear_and_greed = SentimentSnapshot::unavailable(message),
        FetchTask::Calendar => {
            snapshot.indicators = CalendarSection {
                error: Some(message),
                ..Default::default()
            }
        }
        FetchTask::News => snapshot.news_raw = Vec::new(),
        FetchTask::Heatmaps => {
            for index in EquityIndex::ALL {
                fill_failed_heatmaps(snapshot, index, &message);
            }
        }
    }
}

/// Error-annotated placeholder in all four keys of one index.
fn fill_failed_heatmaps(snapshot: &mut MarketSnapshot, index: EquityIndex, message: &str) {
    *snapshot.heatmap_mut(index, None) = Heatmap::failed(message);
    for window in PerformanceWindow::ALL {
        *snapshot.heatmap_mut(index, Some(window)) = Heatmap::failed(message);
    }
}

fn series_outcome(series: &TimeSeriesSnapshot) -> TaskOutcome {
    match &series.error {
        Some(error) => TaskOutcome::Failed(error.clone()),
        None => TaskOutcome::Completed,
    }
}

fn partial_if(partial: bool, note: impl FnOnce() -> String) -> TaskOutcome {
    if partial {
        TaskOutcome::Partial(note())
    } else {
        TaskOutcome::Completed
    }
}

pub struct PipelineOrchestrator {
    ctx: PipelineContext,
}

impl PipelineOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run every task, then sanitize and write `data_raw.json`. Only the final
    /// write can fail the run.
    pub async fn run_fetch(&self, now: DateTime<Tz>) -> Result<(MarketSnapshot, FetchReport), SnapshotError> {
        tracing::info!("--- Starting Raw Data Fetch ---");
        let (snapshot, report) = self.collect(now).await;

        let artifacts = self.ctx.artifacts();
        let clean = sanitize(&snapshot).map_err(ArtifactError::from)?;
        let path = artifacts.write_raw(&clean)?;

        tracing::info!(
            "--- Raw Data Fetch Completed ({} of {} tasks failed). Saved to {} ---",
            report.failed(),
            report.outcomes.len(),
            path.display()
        );
        Ok((snapshot, report))
    }

    /// Run the tasks in order without touching the disk.
    pub async fn collect(&self, now: DateTime<Tz>) -> (MarketSnapshot, FetchReport) {
        let mut snapshot = MarketSnapshot::default();
        let mut report = FetchReport::default();

        for task in FetchTask::ORDER {
            tracing::info!("Running fetch task '{}'", task.name());
            let outcome = match self.run_task(task, &mut snapshot, now).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    apply_placeholder(&mut snapshot, task, &failure);
                    TaskOutcome::Failed(failure.message())
                }
            };
            match &outcome {
                TaskOutcome::Completed => {}
                TaskOutcome::Partial(note) => {
                    tracing::warn!("Fetch task '{}' finished partially: {}", task.name(), note)
                }
                TaskOutcome::Failed(message) => {
                    tracing::error!("Failed to execute fetch task '{}': {}", task.name(), message)
                }
            }
            report.outcomes.push((task, outcome));
        }
        (snapshot, report)
    }

    /// `Err` leaves the placeholder to the caller; sources that degrade on
    /// their own report `Ok(TaskOutcome::Failed)` with the fields already set.
    async fn run_task(
        &self,
        task: FetchTask,
        snapshot: &mut MarketSnapshot,
        now: DateTime<Tz>,
    ) -> Result<TaskOutcome, TaskFailure> {
        match task {
            FetchTask::Vix => {
                snapshot.market.vix = self.fetch_series(VIX_SYMBOL).await;
                Ok(series_outcome(&snapshot.market.vix))
            }
            FetchTask::TNoteFuture => {
                snapshot.market.t_note_future = self.fetch_series(T_NOTE_SYMBOL).await;
                Ok(series_outcome(&snapshot.market.t_note_future))
            }
            FetchTask::FearGreed => Ok(self.fetch_fear_greed(snapshot, now.with_timezone(&Utc)).await),
            FetchTask::Calendar => self.fetch_calendar(snapshot, now).await,
            FetchTask::News => {
                let collector = NewsCollector::new(self.ctx.sources.news.clone());
                snapshot.news_raw = collector.collect(now.with_timezone(&Utc)).await;
                Ok(partial_if(snapshot.news_raw.is_empty(), || "no news in the last 24 hours".to_string()))
            }
            FetchTask::Heatmaps => self.fetch_heatmaps(snapshot).await,
        }
    }

    async fn fetch_series(&self, symbol: &str) -> TimeSeriesSnapshot {
        let fetcher = TimeSeriesFetcher::new(self.ctx.sources.prices.clone(), self.ctx.timezone());
        fetcher.fetch_or_degraded(&TimeSeriesRequest::intraday(symbol)).await
    }

    async fn fetch_fear_greed(&self, snapshot: &mut MarketSnapshot, now: DateTime<Utc>) -> TaskOutcome {
        let fetcher = SentimentIndexFetcher::new(self.ctx.sources.sentiment.clone(), self.ctx.sentiment.clone());
        let (sentiment, gauge) = fetcher.fetch_snapshot(now).await;

        if let Some(gauge) = gauge {
            if let Err(e) = self.ctx.gauge.render(&gauge) {
                tracing::warn!("Fear & Greed gauge not rendered: {}", e);
            }
        }
        let outcome = match &sentiment {
            SentimentSnapshot::Reading(_) => TaskOutcome::Completed,
            SentimentSnapshot::Unavailable { error, .. } => TaskOutcome::Failed(error.clone()),
        };
        snapshot.market.fear_and_greed = sentiment;
        outcome
    }

    async fn fetch_calendar(&self, snapshot: &mut MarketSnapshot, now: DateTime<Tz>) -> Result<TaskOutcome, TaskFailure> {
        let parser = CalendarParser::new(self.ctx.calendar.clone());
        let collection = parser.collect(self.ctx.sources.calendar.as_ref(), now).await;

        if collection.all_failed() {
            let detail = collection
                .failures
                .iter()
                .map(|(feed, e)| format!("{:?}: {}", feed, e))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TaskFailure::new(ErrorCode::Calendar, detail));
        }

        let note = collection.section.error.clone();
        snapshot.indicators = collection.section;
        Ok(note.map_or(TaskOutcome::Completed, TaskOutcome::Partial))
    }

    /// Each universe is handled on its own: a failed constituent scrape only
    /// marks that index's four keys. The task fails when no universe resolves.
    async fn fetch_heatmaps(&self, snapshot: &mut MarketSnapshot) -> Result<TaskOutcome, TaskFailure> {
        let aggregator = HeatmapAggregator::new(
            self.ctx.sources.prices.clone(),
            TickerUniverseResolver::new(self.ctx.sources.universe.clone()),
            self.ctx.config.heatmap.clone(),
        );

        let mut unresolved = Vec::new();
        let mut failed_tickers = 0;
        for index in EquityIndex::ALL {
            let tickers = match aggregator.resolve(index).await {
                Ok(tickers) => tickers,
                Err(e) => {
                    let failure = TaskFailure::new(ErrorCode::Heatmap, format!("{}: {}", index.display_name(), e));
                    tracing::error!("Could not resolve {} constituents: {}", index.display_name(), e);
                    fill_failed_heatmaps(snapshot, index, &failure.message());
                    unresolved.push(failure.detail);
                    continue;
                }
            };

            tracing::info!("Fetching {} heatmap for {} tickers", index.display_name(), tickers.len());
            let report = aggregator.aggregate(&tickers).await;
            failed_tickers += report.failed();

            for (window, heatmap) in report.heatmaps() {
                if window == PerformanceWindow::OneDay {
                    *snapshot.heatmap_mut(index, None) = heatmap.clone();
                }
                *snapshot.heatmap_mut(index, Some(window)) = heatmap;
            }
        }

        if unresolved.len() == EquityIndex::ALL.len() {
            return Err(TaskFailure::new(ErrorCode::Heatmap, unresolved.join("; ")));
        }

        let mut notes = unresolved;
        if failed_tickers > 0 {
            notes.push(format!("{} tickers could not be fetched", failed_tickers));
        }
        Ok(partial_if(!notes.is_empty(), || notes.join("; ")))
    }
}

#[cfg(test)]
mod tests;
