use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use market_core::{NewsItem, NewsSource};

/// Major US index symbols whose headlines feed the digest.
pub const INDEX_SYMBOLS: [&str; 3] = ["^IXIC", "^GSPC", "^DJI"];

pub struct NewsCollector {
    source: Arc<dyn NewsSource>,
    symbols: Vec<String>,
    window: Duration,
}

impl NewsCollector {
    pub fn new(source: Arc<dyn NewsSource>) -> Self {
        Self {
            source,
            symbols: INDEX_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            window: Duration::hours(24),
        }
    }

    /// Headlines for every index, one request at a time. A failing symbol is
    /// logged and skipped.
    pub async fn collect(&self, now: DateTime<Utc>) -> Vec<NewsItem> {
        let mut raw = Vec::new();
        for symbol in &self.symbols {
            match self.source.headlines(symbol).await {
                Ok(items) if items.is_empty() => tracing::warn!("No news returned for {}", symbol),
                Ok(items) => raw.extend(items),
                Err(e) => tracing::error!("Failed to fetch news for {}: {}", symbol, e),
            }
        }

        let total = raw.len();
        let curated = curate(raw, now, self.window);
        tracing::info!(
            "Fetched {} raw news items, kept {} from the last {}h",
            total,
            curated.len(),
            self.window.num_hours()
        );
        curated
    }
}

/// Deduplicate by link (first occurrence wins), keep items published within
/// `window` of `now`, newest first. Undated items are dropped.
pub fn curate(items: Vec<NewsItem>, now: DateTime<Utc>, window: Duration) -> Vec<NewsItem> {
    let cutoff = now - window;
    let mut seen = HashSet::new();

    let mut kept: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.link.clone()))
        .filter(|item| item.published_at.is_some_and(|t| t >= cutoff))
        .collect();

    kept.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use market_core::SourceError;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn item(link: &str, hours_ago: i64) -> NewsItem {
        NewsItem {
            title: format!("title {}", link),
            link: link.to_string(),
            publisher: "Wire".to_string(),
            summary: String::new(),
            published_at: Some(now() - Duration::hours(hours_ago)),
        }
    }

    #[test]
    fn test_curate_dedupes_filters_and_sorts() {
        let mut undated = item("d", 1);
        undated.published_at = None;
        let items = vec![item("a", 5), item("b", 1), item("a", 2), item("c", 30), undated];

        let kept = curate(items, now(), Duration::hours(24));
        let links: Vec<_> = kept.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["b", "a"]);
        assert_eq!(kept[1].published_at, Some(now() - Duration::hours(5)));
    }

    struct PerSymbol;

    #[async_trait]
    impl NewsSource for PerSymbol {
        async fn headlines(&self, symbol: &str) -> Result<Vec<NewsItem>, SourceError> {
            match symbol {
                "^IXIC" => Ok(vec![item("x", 1)]),
                "^GSPC" => Err(SourceError::Network("reset".into())),
                _ => Ok(vec![item("x", 1), item("y", 3)]),
            }
        }
    }

    #[tokio::test]
    async fn test_collect_skips_failing_symbol() {
        let collector = NewsCollector::new(Arc::new(PerSymbol));
        let news = collector.collect(now()).await;
        let links: Vec<_> = news.iter().map(|i| i.link.as_str()).collect();
        assert_eq!(links, vec!["x", "y"]);
    }
}
