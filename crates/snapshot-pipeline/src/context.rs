use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use market_core::{CalendarSource, NewsSource, PriceHistorySource, SentimentHistorySource, UniverseSource};
use market_sources::{
    CalendarConfig, CnnFearGreedClient, MonexCalendarClient, SentimentConfig, SessionConfig, SourceSession,
    WikipediaUniverse, YahooClient,
};

use crate::artifacts::ArtifactStore;
use crate::config::PipelineConfig;
use crate::error::SnapshotError;
use crate::gauge::{GaugeRenderer, SvgGaugeRenderer};

/// Upstream data sources for one run.
#[derive(Clone)]
pub struct PipelineSources {
    pub prices: Arc<dyn PriceHistorySource>,
    pub sentiment: Arc<dyn SentimentHistorySource>,
    pub calendar: Arc<dyn CalendarSource>,
    pub universe: Arc<dyn UniverseSource>,
    pub news: Arc<dyn NewsSource>,
}

impl PipelineSources {
    /// Production clients sharing one browser-like session.
    pub fn live(session: SourceSession) -> Self {
        let yahoo = Arc::new(YahooClient::new(session.clone()));
        Self {
            prices: yahoo.clone(),
            news: yahoo,
            sentiment: Arc::new(CnnFearGreedClient::new(session.clone())),
            calendar: Arc::new(MonexCalendarClient::new(session.clone())),
            universe: Arc::new(WikipediaUniverse::new(session)),
        }
    }
}

/// Everything a pipeline phase needs, passed explicitly.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub sources: PipelineSources,
    pub calendar: CalendarConfig,
    pub sentiment: SentimentConfig,
    pub gauge: Arc<dyn GaugeRenderer>,
}

impl PipelineContext {
    pub fn from_env() -> Result<Self, SnapshotError> {
        let config = PipelineConfig::from_env()?;
        let session = SourceSession::new(SessionConfig::from_env())?;
        let calendar = CalendarConfig::from_env()
            .map_err(|e| SnapshotError::Config(format!("earnings overrides: {}", e)))?;

        Ok(Self {
            gauge: Arc::new(SvgGaugeRenderer::new(config.gauge_path.clone())),
            sources: PipelineSources::live(session),
            calendar,
            sentiment: SentimentConfig::from_env(),
            config,
        })
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.config.data_dir.clone(), self.config.retention_days)
    }

    pub fn timezone(&self) -> Tz {
        self.config.timezone
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.config.timezone)
    }
}
