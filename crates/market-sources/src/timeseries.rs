use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use chrono_tz::Tz;
use market_core::{
    BarInterval, ErrorCode, OhlcBar, PriceHistorySource, RawBar, SourceError, TimeSeriesSnapshot,
};

/// What to pull for one symbol and how coarsely to resample it.
#[derive(Debug, Clone)]
pub struct TimeSeriesRequest {
    pub symbol: String,
    pub lookback: Duration,
    pub interval: BarInterval,
    pub bucket: Duration,
}

impl TimeSeriesRequest {
    /// 60 days of hourly bars in 4-hour buckets.
    pub fn intraday(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            lookback: Duration::days(60),
            interval: BarInterval::OneHour,
            bucket: Duration::hours(4),
        }
    }
}

pub struct TimeSeriesFetcher {
    source: Arc<dyn PriceHistorySource>,
    timezone: Tz,
}

impl TimeSeriesFetcher {
    pub fn new(source: Arc<dyn PriceHistorySource>, timezone: Tz) -> Self {
        Self { source, timezone }
    }

    /// Fetch and resample, reporting failures to the caller.
    pub async fn fetch(&self, request: &TimeSeriesRequest) -> Result<TimeSeriesSnapshot, SourceError> {
        let bars = self
            .source
            .bars(&request.symbol, request.lookback, request.interval)
            .await?;

        let current = last_close(&bars)
            .ok_or_else(|| SourceError::Empty(format!("no closes returned for {}", request.symbol)))?;

        Ok(TimeSeriesSnapshot {
            current: Some(round2(current)),
            history: resample(&bars, request.bucket, self.timezone),
            error: None,
        })
    }

    /// Like [`fetch`](Self::fetch) but never fails: errors become a degraded
    /// snapshot with `current: null` and an `[E003]` message.
    pub async fn fetch_or_degraded(&self, request: &TimeSeriesRequest) -> TimeSeriesSnapshot {
        match self.fetch(request).await {
            Ok(snapshot) => {
                tracing::info!(
                    "{}: current {:?}, {} buckets",
                    request.symbol,
                    snapshot.current,
                    snapshot.history.len()
                );
                snapshot
            }
            Err(e) => {
                tracing::error!("Time series fetch for {} failed: {}", request.symbol, e);
                TimeSeriesSnapshot::degraded(
                    ErrorCode::ExternalApi.message(format!("{} failed: {}", request.symbol, e)),
                )
            }
        }
    }
}

fn last_close(bars: &[RawBar]) -> Option<f64> {
    bars.iter().rev().find_map(|b| b.close)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group bars into fixed buckets aligned to local midnight of the first bar's
/// day in `tz`. Buckets holding any bar with a missing value are dropped, as
/// are buckets that received no bars.
pub fn resample(bars: &[RawBar], bucket: Duration, tz: Tz) -> Vec<OhlcBar> {
    let bucket_secs = bucket.num_seconds();
    if bars.is_empty() || bucket_secs <= 0 {
        return Vec::new();
    }

    let mut local: Vec<(NaiveDateTime, &RawBar)> = bars
        .iter()
        .map(|b| (b.timestamp.with_timezone(&tz).naive_local(), b))
        .collect();
    local.sort_by_key(|(t, _)| *t);

    let origin = match local.first() {
        Some((t, _)) => t.date().and_hms_opt(0, 0, 0).unwrap_or(*t),
        None => return Vec::new(),
    };

    let mut buckets: BTreeMap<i64, Vec<&RawBar>> = BTreeMap::new();
    for (time, bar) in &local {
        let index = (*time - origin).num_seconds().div_euclid(bucket_secs);
        buckets.entry(index).or_default().push(bar);
    }

    buckets
        .into_iter()
        .filter_map(|(index, members)| {
            let time = origin + Duration::seconds(index * bucket_secs);
            aggregate(time, &members)
        })
        .collect()
}

fn aggregate(time: NaiveDateTime, members: &[&RawBar]) -> Option<OhlcBar> {
    let mut open = None;
    let mut high = f64::NEG_INFINITY;
    let mut low = f64::INFINITY;
    let mut close = None;

    for bar in members {
        let (o, h, l, c) = (bar.open?, bar.high?, bar.low?, bar.close?);
        open.get_or_insert(o);
        high = high.max(h);
        low = low.min(l);
        close = Some(c);
    }

    Some(OhlcBar {
        time,
        open: round2(open?),
        high: round2(high),
        low: round2(low),
        close: round2(close?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use market_core::CompanyProfile;

    fn bar(ts: DateTime<Utc>, o: f64, h: f64, l: f64, c: f64) -> RawBar {
        RawBar {
            timestamp: ts,
            open: Some(o),
            high: Some(h),
            low: Some(l),
            close: Some(c),
        }
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn local(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_resample_buckets_in_reference_zone() {
        // 00:30 UTC is 09:30 JST; 09:30-11:30 share the 08:00 bucket.
        let bars = vec![
            bar(utc(0, 30), 10.0, 11.0, 9.5, 10.5),
            bar(utc(1, 30), 10.5, 12.0, 10.0, 11.0),
            bar(utc(2, 30), 11.0, 11.5, 8.0, 9.0),
            bar(utc(3, 30), 9.0, 9.5, 8.5, 9.25),
        ];
        let out = resample(&bars, Duration::hours(4), chrono_tz::Asia::Tokyo);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].time, local(8));
        assert_eq!(out[0].open, 10.0);
        assert_eq!(out[0].high, 12.0);
        assert_eq!(out[0].low, 8.0);
        assert_eq!(out[0].close, 9.0);
        assert_eq!(out[1].time, local(12));
        assert_eq!(out[1].open, 9.0);
        assert_eq!(out[1].low, 8.5);
        assert_eq!(out[1].close, 9.25);
    }

    #[test]
    fn test_resample_drops_bucket_with_missing_value() {
        let mut broken = bar(utc(2, 30), 11.0, 11.5, 8.0, 9.0);
        broken.high = None;
        let bars = vec![bar(utc(0, 30), 10.0, 11.0, 9.5, 10.5), broken, bar(utc(3, 30), 9.0, 9.5, 8.5, 9.2)];

        let out = resample(&bars, Duration::hours(4), chrono_tz::Asia::Tokyo);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, local(12));
    }

    #[test]
    fn test_resample_rounds_to_two_decimals() {
        let bars = vec![bar(utc(0, 0), 1.234, 1.239, 1.111, 1.115)];
        let out = resample(&bars, Duration::hours(4), chrono_tz::Asia::Tokyo);
        assert_eq!(out[0].open, 1.23);
        assert_eq!(out[0].high, 1.24);
        assert_eq!(out[0].low, 1.11);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], Duration::hours(4), chrono_tz::Asia::Tokyo).is_empty());
    }

    struct FixedBars(Result<Vec<RawBar>, SourceError>);

    #[async_trait]
    impl PriceHistorySource for FixedBars {
        async fn bars(&self, _: &str, _: Duration, _: BarInterval) -> Result<Vec<RawBar>, SourceError> {
            self.0.clone()
        }

        async fn profile(&self, _: &str) -> Result<CompanyProfile, SourceError> {
            Ok(CompanyProfile::default())
        }
    }

    #[tokio::test]
    async fn test_current_is_last_raw_close() {
        let mut last = bar(utc(3, 30), 9.0, 9.5, 8.5, 9.257);
        last.low = None;
        let source = FixedBars(Ok(vec![bar(utc(0, 30), 10.0, 11.0, 9.5, 10.5), last]));
        let fetcher = TimeSeriesFetcher::new(Arc::new(source), chrono_tz::Asia::Tokyo);

        let snapshot = fetcher.fetch(&TimeSeriesRequest::intraday("^VIX")).await.unwrap();
        assert_eq!(snapshot.current, Some(9.26));
        // The 12:00 bucket is incomplete and dropped, but current still sees it.
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].close, 10.5);
    }

    #[tokio::test]
    async fn test_empty_result_is_distinguishable() {
        let fetcher = TimeSeriesFetcher::new(Arc::new(FixedBars(Ok(vec![]))), chrono_tz::Asia::Tokyo);
        let err = fetcher.fetch(&TimeSeriesRequest::intraday("^TNX")).await.unwrap_err();
        assert!(matches!(err, SourceError::Empty(_)));
    }

    #[tokio::test]
    async fn test_degraded_snapshot_on_failure() {
        let source = FixedBars(Err(SourceError::Network("connection reset".into())));
        let fetcher = TimeSeriesFetcher::new(Arc::new(source), chrono_tz::Asia::Tokyo);

        let snapshot = fetcher.fetch_or_degraded(&TimeSeriesRequest::intraday("^VIX")).await;
        assert_eq!(snapshot.current, None);
        assert!(snapshot.history.is_empty());
        assert!(snapshot.error.unwrap().starts_with("[E003]"));
    }
}
