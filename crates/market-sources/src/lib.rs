//! Upstream clients and the fetch-side algorithms that normalize what they
//! return: OHLC resampling, nearest-neighbor sentiment lookback, calendar
//! table extraction, constituent scraping and headline curation.

pub mod calendar;
pub mod fear_greed;
pub mod news;
pub mod session;
pub mod timeseries;
pub mod universe;
pub mod yahoo;

pub use calendar::{CalendarCollection, CalendarConfig, CalendarParser, MonexCalendarClient};
pub use fear_greed::{CnnFearGreedClient, SentimentConfig, SentimentIndexFetcher};
pub use news::NewsCollector;
pub use session::{SessionConfig, SourceSession};
pub use timeseries::{TimeSeriesFetcher, TimeSeriesRequest};
pub use universe::{TickerUniverseResolver, WikipediaUniverse};
pub use yahoo::YahooClient;
