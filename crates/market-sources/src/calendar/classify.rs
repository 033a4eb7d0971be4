//! Shape-based cell classification for calendar tables whose column order is
//! not stable.

use std::sync::LazyLock;

use regex::Regex;

use super::watchlist::Watchlist;

static LEADING_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^（(]+)").expect("leading name pattern"));

pub const IMPORTANCE_MARK: char = '★';
const IMPORTANCE_BLANK: char = '☆';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRole {
    Date,
    Time,
    /// Number of filled importance marks.
    Importance(usize),
    /// Watched symbol, plus a company name when the cell embeds one.
    Ticker { symbol: String, name: Option<String> },
    Name,
    Unknown,
}

/// Rule set applied in order; the first rule that matches decides the role.
#[derive(Debug, Clone)]
pub struct CellRules {
    pub date_min_chars: usize,
    pub time_min_chars: usize,
    pub name_min_chars: usize,
}

impl Default for CellRules {
    fn default() -> Self {
        Self {
            date_min_chars: 8,
            time_min_chars: 5,
            name_min_chars: 3,
        }
    }
}

pub struct CellClassifier {
    rules: CellRules,
    watchlist: Watchlist,
}

impl CellClassifier {
    pub fn new(rules: CellRules, watchlist: Watchlist) -> Self {
        Self { rules, watchlist }
    }

    pub fn classify(&self, cell: &str) -> CellRole {
        let cell = cell.trim();
        let chars = cell.chars().count();
        if cell.is_empty() {
            return CellRole::Unknown;
        }

        if cell.contains('/') && chars >= self.rules.date_min_chars {
            return CellRole::Date;
        }
        if cell.contains(':') && chars >= self.rules.time_min_chars {
            return CellRole::Time;
        }
        if cell.chars().all(|c| c == IMPORTANCE_MARK || c == IMPORTANCE_BLANK) {
            return CellRole::Importance(importance_stars(cell));
        }
        if let Some(symbol) = self.watchlist.find(cell) {
            let name = if self.watchlist.embeds_symbols() && !cell.chars().all(|c| c.is_ascii_digit()) {
                LEADING_NAME
                    .captures(cell)
                    .map(|c| c[1].trim().to_string())
                    .filter(|n| !n.is_empty() && n != &symbol)
            } else {
                None
            };
            return CellRole::Ticker { symbol, name };
        }
        if chars >= self.rules.name_min_chars
            && !cell.contains('/')
            && !cell.chars().all(|c| c.is_ascii_digit())
        {
            return CellRole::Name;
        }
        CellRole::Unknown
    }
}

pub fn importance_stars(cell: &str) -> usize {
    cell.chars().filter(|c| *c == IMPORTANCE_MARK).count()
}

/// Cells of one row sorted into roles. Each role keeps its first candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFields {
    pub date: Option<String>,
    pub time: Option<String>,
    pub importance: Option<String>,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub previous: Option<String>,
    pub forecast: Option<String>,
}

impl RowFields {
    pub fn stars(&self) -> usize {
        self.importance.as_deref().map(importance_stars).unwrap_or(0)
    }
}

/// Assign roles left to right with first-match-wins per role.
pub fn classify_row(row: &[String], classifier: &CellClassifier) -> RowFields {
    let mut fields = RowFields::default();
    for cell in row {
        let text = cell.trim();
        match classifier.classify(text) {
            CellRole::Date => {
                fields.date.get_or_insert_with(|| text.to_string());
            }
            CellRole::Time => {
                fields.time.get_or_insert_with(|| text.to_string());
            }
            CellRole::Importance(_) => {
                fields.importance.get_or_insert_with(|| text.to_string());
            }
            CellRole::Ticker { symbol, name } => {
                if fields.ticker.is_none() {
                    fields.ticker = Some(symbol);
                    if let Some(name) = name {
                        fields.name.get_or_insert(name);
                    }
                }
            }
            CellRole::Name => {
                fields.name.get_or_insert_with(|| text.to_string());
            }
            CellRole::Unknown => {}
        }
    }
    fields
}

/// Meaning of a column in a fixed-layout table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Date,
    Time,
    Importance,
    Country,
    Ticker,
    Name,
    Previous,
    Forecast,
    Ignore,
}

/// How a table's cells map to roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRoles {
    /// Classify every cell by shape.
    Heuristic,
    /// Fixed column order.
    Positional(Vec<Column>),
}

impl ColumnRoles {
    /// Layout of the economic indicator table.
    pub fn economic() -> Self {
        ColumnRoles::Positional(vec![
            Column::Date,
            Column::Time,
            Column::Importance,
            Column::Country,
            Column::Name,
            Column::Previous,
            Column::Forecast,
            Column::Ignore,
            Column::Ignore,
        ])
    }
}

pub fn positional_row(row: &[String], columns: &[Column]) -> RowFields {
    let mut fields = RowFields::default();
    for (column, cell) in columns.iter().zip(row) {
        let text = cell.trim();
        if text.is_empty() {
            continue;
        }
        let value = Some(text.to_string());
        match column {
            Column::Date => fields.date = value,
            Column::Time => fields.time = value,
            Column::Importance => fields.importance = value,
            Column::Country => fields.country = value,
            Column::Ticker => fields.ticker = value,
            Column::Name => fields.name = value,
            Column::Previous => fields.previous = value,
            Column::Forecast => fields.forecast = value,
            Column::Ignore => {}
        }
    }
    fields
}
