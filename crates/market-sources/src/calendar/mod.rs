//! Economic indicator and earnings calendars.
//!
//! The three Monex pages are parsed into [`CalendarEvent`]s. Economic rows use
//! a fixed column layout; earnings pages reorder their columns often enough
//! that each cell is classified by shape instead (see [`classify`]).

pub mod classify;
pub mod monex;
pub mod schedule;
pub mod watchlist;

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveTime};
use chrono_tz::Tz;
use market_core::{
    CalendarEvent, CalendarFeed, CalendarSection, CalendarSource, ErrorCode, EventKind, RawTable,
    RowSkip, SourceError,
};

pub use classify::{CellClassifier, CellRole, CellRules, Column, ColumnRoles, RowFields};
pub use monex::MonexCalendarClient;
pub use schedule::{RetentionWindow, When};
pub use watchlist::{load_overrides, EarningsOverride, Watchlist};

/// Values the source prints for "no figure".
const EMPTY_FIGURES: [&str; 4] = ["-", "--", "None", ""];
const EMPTY_FIGURE: &str = "--";
const COMPANY_NAME_MAX_CHARS: usize = 20;

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    /// Position of the indicator table among the page's tables.
    pub economic_table_index: usize,
    pub economic_columns: ColumnRoles,
    pub earnings_columns: ColumnRoles,
    pub min_importance: usize,
    pub economic_window: RetentionWindow,
    pub earnings_window: RetentionWindow,
    /// Added to US earnings times to move them into the reference zone.
    pub us_earnings_offset: Duration,
    pub us_rules: CellRules,
    pub jp_rules: CellRules,
    pub us_watchlist: Watchlist,
    pub jp_watchlist: Watchlist,
    pub overrides: Vec<EarningsOverride>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            economic_table_index: 2,
            economic_columns: ColumnRoles::economic(),
            earnings_columns: ColumnRoles::Heuristic,
            min_importance: 1,
            economic_window: RetentionWindow {
                before: Duration::hours(2),
                after: Some(Duration::hours(26)),
            },
            earnings_window: RetentionWindow {
                before: Duration::hours(2),
                after: None,
            },
            us_earnings_offset: Duration::hours(13),
            us_rules: CellRules {
                name_min_chars: 4,
                ..CellRules::default()
            },
            jp_rules: CellRules::default(),
            us_watchlist: Watchlist::us_default(),
            jp_watchlist: Watchlist::jp_default(),
            overrides: Vec::new(),
        }
    }
}

impl CalendarConfig {
    /// Defaults overridden by `CALENDAR_MIN_IMPORTANCE`,
    /// `CALENDAR_WINDOW_BEFORE_HOURS`, `CALENDAR_WINDOW_AFTER_HOURS`,
    /// `US_EARNINGS_OFFSET_HOURS` and `EARNINGS_OVERRIDES_PATH`.
    pub fn from_env() -> Result<Self, SourceError> {
        let mut config = Self::default();

        if let Some(stars) = env_number("CALENDAR_MIN_IMPORTANCE") {
            config.min_importance = stars as usize;
        }
        if let Some(hours) = env_number("CALENDAR_WINDOW_BEFORE_HOURS") {
            config.economic_window.before = Duration::hours(hours);
            config.earnings_window.before = Duration::hours(hours);
        }
        if let Some(hours) = env_number("CALENDAR_WINDOW_AFTER_HOURS") {
            config.economic_window.after = Some(Duration::hours(hours));
        }
        if let Some(hours) = env_number("US_EARNINGS_OFFSET_HOURS") {
            config.us_earnings_offset = Duration::hours(hours);
        }
        if let Ok(path) = std::env::var("EARNINGS_OVERRIDES_PATH") {
            let path = PathBuf::from(path);
            config.overrides = load_overrides(&path)?;
            tracing::info!("Loaded {} earnings overrides from {}", config.overrides.len(), path.display());
        }
        Ok(config)
    }
}

fn env_number(key: &str) -> Option<i64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(v) if v >= 0 => Some(v),
        _ => {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}

/// Kept events plus the rows that were dropped and why.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub events: Vec<CalendarEvent>,
    /// `(table, row, reason)`
    pub skipped: Vec<(usize, usize, RowSkip)>,
}

impl ParseReport {
    fn record(&mut self, table: usize, row: usize, outcome: Result<CalendarEvent, RowSkip>) {
        match outcome {
            Ok(event) => self.events.push(event),
            Err(reason) => self.skipped.push((table, row, reason)),
        }
    }

    fn log(&self, feed: &str) {
        tracing::debug!(
            "{} calendar: kept {} rows, skipped {}",
            feed,
            self.events.len(),
            self.skipped.len()
        );
        for (table, row, reason) in &self.skipped {
            tracing::trace!("{} table {} row {} skipped: {}", feed, table, row, reason);
        }
    }
}

/// Calendar section plus the feeds that could not be fetched.
#[derive(Debug)]
pub struct CalendarCollection {
    pub section: CalendarSection,
    pub failures: Vec<(CalendarFeed, SourceError)>,
}

impl CalendarCollection {
    pub fn all_failed(&self) -> bool {
        self.failures.len() == 3
    }
}

pub struct CalendarParser {
    config: CalendarConfig,
    economic: CellClassifier,
    us: CellClassifier,
    jp: CellClassifier,
}

impl CalendarParser {
    pub fn new(config: CalendarConfig) -> Self {
        let economic = CellClassifier::new(CellRules::default(), Watchlist::exact(Vec::<String>::new()));
        let us = CellClassifier::new(config.us_rules.clone(), config.us_watchlist.clone());
        let jp = CellClassifier::new(config.jp_rules.clone(), config.jp_watchlist.clone());
        Self {
            config,
            economic,
            us,
            jp,
        }
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Fetch and parse all three feeds. A failing feed leaves its list empty
    /// and is reported in `failures` and in the section's error message.
    pub async fn collect(&self, source: &dyn CalendarSource, now: DateTime<Tz>) -> CalendarCollection {
        let mut section = CalendarSection::default();
        let mut failures = Vec::new();

        for feed in [CalendarFeed::Economic, CalendarFeed::UsEarnings, CalendarFeed::JpEarnings] {
            let tables = match source.tables(feed).await {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::error!("Failed to fetch {:?} calendar: {}", feed, e);
                    failures.push((feed, e));
                    continue;
                }
            };
            match feed {
                CalendarFeed::Economic => section.economic = self.parse_economic(&tables, now).events,
                CalendarFeed::UsEarnings => section.us_earnings = self.parse_us_earnings(&tables, now).events,
                CalendarFeed::JpEarnings => section.jp_earnings = self.parse_jp_earnings(&tables, now).events,
            }
        }

        if !failures.is_empty() {
            let detail = failures
                .iter()
                .map(|(feed, e)| format!("{:?}: {}", feed, e))
                .collect::<Vec<_>>()
                .join("; ");
            section.error = Some(ErrorCode::Calendar.message(detail));
        }

        tracing::info!(
            "Calendar: {} economic, {} US earnings, {} JP earnings",
            section.economic.len(),
            section.us_earnings.len(),
            section.jp_earnings.len()
        );
        CalendarCollection { section, failures }
    }

    pub fn parse_economic(&self, tables: &[RawTable], now: DateTime<Tz>) -> ParseReport {
        let mut report = ParseReport::default();
        let index = self.config.economic_table_index;
        let Some(table) = tables.get(index) else {
            tracing::warn!("Economic calendar has {} tables, expected index {}", tables.len(), index);
            return report;
        };

        for (i, row) in table.rows.iter().enumerate() {
            report.record(index, i, self.economic_row(row, now));
        }
        report.log("Economic");
        report
    }

    fn economic_row(&self, row: &[String], now: DateTime<Tz>) -> Result<CalendarEvent, RowSkip> {
        let fields = fields_of(row, &self.config.economic_columns, &self.economic)?;

        let date = fields.date.as_deref().ok_or(RowSkip::MissingDate)?;
        if date.contains("発表") || !date.chars().any(|c| c.is_ascii_digit()) {
            return Err(RowSkip::Header);
        }
        let time = fields.time.as_deref().ok_or(RowSkip::MissingTime)?;

        let stars = fields.stars();
        if stars < self.config.min_importance {
            return Err(RowSkip::BelowImportance {
                stars,
                required: self.config.min_importance,
            });
        }

        let when = schedule::resolve(date, Some(time), now)?;
        if !self.config.economic_window.contains(&when, now) {
            return Err(RowSkip::OutsideWindow);
        }

        Ok(CalendarEvent {
            datetime: when.label(),
            kind: EventKind::Economic,
            name: Some(figure(fields.name)),
            importance: fields.importance,
            previous: Some(figure(fields.previous)),
            forecast: Some(figure(fields.forecast)),
            ticker: None,
            company: None,
        })
    }

    /// Watched US names from every table, followed by the override table.
    pub fn parse_us_earnings(&self, tables: &[RawTable], now: DateTime<Tz>) -> ParseReport {
        let mut report = ParseReport::default();
        for (t, table) in tables.iter().enumerate() {
            for (i, row) in table.rows.iter().enumerate() {
                report.record(t, i, self.us_row(row, now));
            }
        }

        for entry in &self.config.overrides {
            match self.override_event(entry, now) {
                Some(event) => report.events.push(event),
                None => tracing::debug!("Override for {} on {} is outside the window", entry.ticker, entry.date),
            }
        }
        report.log("US earnings");
        report
    }

    fn us_row(&self, row: &[String], now: DateTime<Tz>) -> Result<CalendarEvent, RowSkip> {
        let fields = fields_of(row, &self.config.earnings_columns, &self.us)?;

        let ticker = fields.ticker.ok_or(RowSkip::MissingTicker)?;
        let date = fields.date.as_deref().ok_or(RowSkip::MissingDate)?;
        let time = fields.time.as_deref().ok_or(RowSkip::MissingTime)?;

        let local = schedule::resolve(date, Some(time), now)?;
        let when = When {
            at: local.at + self.config.us_earnings_offset,
            has_time: true,
        };
        if !self.config.earnings_window.contains(&when, now) {
            return Err(RowSkip::OutsideWindow);
        }

        Ok(earnings_event(EventKind::UsEarnings, &when, ticker, fields.name.as_deref()))
    }

    fn override_event(&self, entry: &EarningsOverride, now: DateTime<Tz>) -> Option<CalendarEvent> {
        let naive = entry.date.and_time(entry.time.unwrap_or(NaiveTime::MIN));
        let when = schedule::localize(naive, now.timezone(), entry.time.is_some())?;
        if !self.config.earnings_window.contains(&when, now) {
            return None;
        }
        Some(earnings_event(
            EventKind::UsEarnings,
            &when,
            entry.ticker.clone(),
            Some(&entry.company),
        ))
    }

    /// Watched TSE codes from every table. The time is optional.
    pub fn parse_jp_earnings(&self, tables: &[RawTable], now: DateTime<Tz>) -> ParseReport {
        let mut report = ParseReport::default();
        for (t, table) in tables.iter().enumerate() {
            for (i, row) in table.rows.iter().enumerate() {
                report.record(t, i, self.jp_row(row, now));
            }
        }
        report.log("JP earnings");
        report
    }

    fn jp_row(&self, row: &[String], now: DateTime<Tz>) -> Result<CalendarEvent, RowSkip> {
        let fields = fields_of(row, &self.config.earnings_columns, &self.jp)?;

        let ticker = fields.ticker.ok_or(RowSkip::MissingTicker)?;
        let date = fields.date.as_deref().ok_or(RowSkip::MissingDate)?;

        let when = schedule::resolve(date, fields.time.as_deref(), now)?;
        if !self.config.earnings_window.contains(&when, now) {
            return Err(RowSkip::OutsideWindow);
        }

        Ok(earnings_event(EventKind::JpEarnings, &when, ticker, fields.name.as_deref()))
    }
}

fn fields_of(row: &[String], columns: &ColumnRoles, classifier: &CellClassifier) -> Result<RowFields, RowSkip> {
    match columns {
        ColumnRoles::Heuristic => Ok(classify::classify_row(row, classifier)),
        ColumnRoles::Positional(cols) => {
            if row.len() < cols.len() {
                return Err(RowSkip::TooFewCells {
                    expected: cols.len(),
                    found: row.len(),
                });
            }
            Ok(classify::positional_row(row, cols))
        }
    }
}

fn figure(value: Option<String>) -> String {
    match value {
        Some(v) if !EMPTY_FIGURES.contains(&v.trim()) => v.trim().to_string(),
        _ => EMPTY_FIGURE.to_string(),
    }
}

fn earnings_event(kind: EventKind, when: &When, ticker: String, name: Option<&str>) -> CalendarEvent {
    let company = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!("({})", n.chars().take(COMPANY_NAME_MAX_CHARS).collect::<String>()))
        .unwrap_or_default();
    CalendarEvent {
        datetime: when.label(),
        kind,
        name: None,
        importance: None,
        previous: None,
        forecast: None,
        ticker: Some(ticker),
        company: Some(company),
    }
}
