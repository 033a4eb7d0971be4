use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::error::SourceError;
use crate::types::*;

/// Price bars and company metadata for listed symbols.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn bars(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: BarInterval,
    ) -> Result<Vec<RawBar>, SourceError>;

    async fn profile(&self, symbol: &str) -> Result<CompanyProfile, SourceError>;
}

/// Sparse history of the Fear & Greed index.
#[async_trait]
pub trait SentimentHistorySource: Send + Sync {
    async fn history(&self, since: NaiveDate) -> Result<Vec<SentimentSample>, SourceError>;
}

/// Every table found on a calendar page, in document order.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn tables(&self, feed: CalendarFeed) -> Result<Vec<RawTable>, SourceError>;
}

/// Constituent symbols of an equity index.
#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn constituents(&self, index: EquityIndex) -> Result<Vec<String>, SourceError>;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn headlines(&self, symbol: &str) -> Result<Vec<NewsItem>, SourceError>;
}
