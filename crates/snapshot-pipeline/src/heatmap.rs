//! Per-ticker returns over 1 day, 1 week and 1 month, with sector means.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use market_core::{
    BarInterval, CompanyProfile, EquityIndex, Heatmap, PerformanceWindow, PriceHistorySource, RawBar,
    SectorAggregate, SourceError, StockPerformance,
};
use market_sources::TickerUniverseResolver;

#[derive(Debug, Clone)]
pub struct HeatmapConfig {
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_pause: Duration,
    /// Pause after a ticker whose fetch failed.
    pub failure_pause: Duration,
    pub lookback_days: i64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            batch_pause: Duration::from_secs(3),
            failure_pause: Duration::from_millis(500),
            lookback_days: 35,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Exclusion {
    MissingSector,
    MissingIndustry,
    MissingMarketCap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerReturns {
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
    /// Only windows with enough history and a non-zero base close.
    pub returns: BTreeMap<PerformanceWindow, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickerOutcome {
    Included(TickerReturns),
    Excluded(Exclusion),
    Failed(SourceError),
}

#[derive(Debug, Default)]
pub struct HeatmapReport {
    pub outcomes: Vec<(String, TickerOutcome)>,
}

impl HeatmapReport {
    pub fn included(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Included(_)))
    }

    pub fn excluded(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Excluded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&TickerOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn stocks(&self, window: PerformanceWindow) -> Vec<StockPerformance> {
        self.outcomes
            .iter()
            .filter_map(|(ticker, outcome)| match outcome {
                TickerOutcome::Included(r) => r.returns.get(&window).map(|perf| StockPerformance {
                    ticker: ticker.clone(),
                    sector: r.sector.clone(),
                    industry: r.industry.clone(),
                    market_cap: r.market_cap,
                    performance: *perf,
                }),
                _ => None,
            })
            .collect()
    }

    /// One heatmap per window, each with its sector rollup.
    pub fn heatmaps(&self) -> BTreeMap<PerformanceWindow, Heatmap> {
        PerformanceWindow::ALL
            .into_iter()
            .map(|window| {
                let stocks = self.stocks(window);
                let sectors = sector_aggregates(&stocks);
                (
                    window,
                    Heatmap {
                        stocks,
                        sectors,
                        ..Default::default()
                    },
                )
            })
            .collect()
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage change from the close `lag` sessions back to the last close.
/// `None` without `lag + 1` closes, on a zero base, or a non-finite result.
pub fn compute_return(closes: &[f64], lag: usize) -> Option<f64> {
    if closes.len() < lag + 1 {
        return None;
    }
    let recent = *closes.last()?;
    let past = closes[closes.len() - 1 - lag];
    if past == 0.0 {
        return None;
    }
    let change = ((recent - past) / past) * 100.0;
    change.is_finite().then(|| round2(change))
}

pub fn window_returns(bars: &[RawBar]) -> BTreeMap<PerformanceWindow, f64> {
    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close).collect();
    PerformanceWindow::ALL
        .into_iter()
        .filter_map(|w| compute_return(&closes, w.lag()).map(|r| (w, r)))
        .collect()
}

/// Mean performance per sector, best first. Sectors with no stocks are absent.
pub fn sector_aggregates(stocks: &[StockPerformance]) -> Vec<SectorAggregate> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for stock in stocks {
        let entry = sums.entry(stock.sector.as_str()).or_insert((0.0, 0));
        entry.0 += stock.performance;
        entry.1 += 1;
    }

    let mut sectors: Vec<SectorAggregate> = sums
        .into_iter()
        .map(|(sector, (sum, count))| SectorAggregate {
            sector: sector.to_string(),
            performance: round2(sum / count as f64),
            constituents: count,
        })
        .collect();
    sectors.sort_by(|a, b| b.performance.total_cmp(&a.performance));
    sectors
}

fn classify_profile(profile: CompanyProfile) -> Result<(String, String, f64), Exclusion> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty() && s != "N/A");
    let sector = present(profile.sector).ok_or(Exclusion::MissingSector)?;
    let industry = present(profile.industry).ok_or(Exclusion::MissingIndustry)?;
    let market_cap = profile
        .market_cap
        .filter(|c| c.is_finite() && *c != 0.0)
        .ok_or(Exclusion::MissingMarketCap)?;
    Ok((sector, industry, market_cap))
}

pub struct HeatmapAggregator {
    prices: Arc<dyn PriceHistorySource>,
    universe: TickerUniverseResolver,
    config: HeatmapConfig,
}

impl HeatmapAggregator {
    pub fn new(prices: Arc<dyn PriceHistorySource>, universe: TickerUniverseResolver, config: HeatmapConfig) -> Self {
        Self {
            prices,
            universe,
            config,
        }
    }

    pub async fn resolve(&self, index: EquityIndex) -> Result<Vec<String>, SourceError> {
        self.universe.resolve(index).await
    }

    /// Evaluate `tickers` in batches, one request at a time.
    pub async fn aggregate(&self, tickers: &[String]) -> HeatmapReport {
        let mut report = HeatmapReport::default();
        let batch_size = self.config.batch_size.max(1);
        let batches = tickers.chunks(batch_size).count();

        for (i, batch) in tickers.chunks(batch_size).enumerate() {
            for ticker in batch {
                let outcome = self.evaluate(ticker).await;
                match &outcome {
                    TickerOutcome::Failed(e) => {
                        tracing::error!("Could not fetch data for {}: {}", ticker, e);
                        tokio::time::sleep(self.config.failure_pause).await;
                    }
                    TickerOutcome::Excluded(reason) => {
                        tracing::warn!("Skipping {}: {:?}", ticker, reason);
                    }
                    TickerOutcome::Included(_) => {}
                }
                report.outcomes.push((ticker.clone(), outcome));
            }

            if i + 1 < batches {
                tracing::info!(
                    "Processed {}/{} tickers, waiting...",
                    (i + 1) * batch_size,
                    tickers.len()
                );
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        tracing::info!(
            "Heatmap: {} included, {} excluded, {} failed",
            report.included(),
            report.excluded(),
            report.failed()
        );
        report
    }

    async fn evaluate(&self, ticker: &str) -> TickerOutcome {
        let profile = match self.prices.profile(ticker).await {
            Ok(profile) => profile,
            Err(e) => return TickerOutcome::Failed(e),
        };
        let (sector, industry, market_cap) = match classify_profile(profile) {
            Ok(fields) => fields,
            Err(reason) => return TickerOutcome::Excluded(reason),
        };

        let lookback = chrono::Duration::days(self.config.lookback_days);
        let bars = match self.prices.bars(ticker, lookback, BarInterval::OneDay).await {
            Ok(bars) => bars,
            Err(e) => return TickerOutcome::Failed(e),
        };

        TickerOutcome::Included(TickerReturns {
            sector,
            industry,
            market_cap,
            returns: window_returns(&bars),
        })
    }
}
