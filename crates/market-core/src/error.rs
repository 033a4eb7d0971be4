use std::fmt;

use thiserror::Error;

/// Failure talking to an upstream data source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Empty response: {0}")]
    Empty(String),

    #[error("Unexpected format: {0}")]
    Format(String),
}

/// Error codes carried in degraded placeholders and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingApiKey,
    DataFileRead,
    ExternalApi,
    FearGreed,
    Generation,
    Heatmap,
    Calendar,
}

impl ErrorCode {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::MissingApiKey => "E001",
            ErrorCode::DataFileRead => "E002",
            ErrorCode::ExternalApi => "E003",
            ErrorCode::FearGreed => "E004",
            ErrorCode::Generation => "E005",
            ErrorCode::Heatmap => "E006",
            ErrorCode::Calendar => "E007",
        }
    }

    pub fn meaning(self) -> &'static str {
        match self {
            ErrorCode::MissingApiKey => "Text generation API key is not configured.",
            ErrorCode::DataFileRead => "Data file could not be read.",
            ErrorCode::ExternalApi => "Failed to connect to an external API.",
            ErrorCode::FearGreed => "Failed to fetch Fear & Greed Index data.",
            ErrorCode::Generation => "AI content generation failed.",
            ErrorCode::Heatmap => "Failed to fetch heatmap data.",
            ErrorCode::Calendar => "Failed to fetch calendar data.",
        }
    }

    /// Render `"[E00n] <meaning>: <detail>"`.
    pub fn message(self, detail: impl fmt::Display) -> String {
        format!("[{}] {}: {}", self.code(), self.meaning(), detail)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a calendar row produced no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSkip {
    /// Row is a header or an announcement banner.
    Header,
    MissingDate,
    MissingTime,
    MissingTicker,
    /// Positional layout expected more cells than the row has.
    TooFewCells { expected: usize, found: usize },
    BelowImportance { stars: usize, required: usize },
    UnparseableDate(String),
    OutsideWindow,
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkip::Header => f.write_str("header row"),
            RowSkip::MissingDate => f.write_str("no date cell"),
            RowSkip::MissingTime => f.write_str("no time cell"),
            RowSkip::MissingTicker => f.write_str("no watched ticker"),
            RowSkip::TooFewCells { expected, found } => {
                write!(f, "expected {} cells, found {}", expected, found)
            }
            RowSkip::BelowImportance { stars, required } => {
                write!(f, "importance {} below {}", stars, required)
            }
            RowSkip::UnparseableDate(raw) => write!(f, "unparseable date '{}'", raw),
            RowSkip::OutsideWindow => f.write_str("outside retention window"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_message() {
        let msg = ErrorCode::Heatmap.message("timeout");
        assert_eq!(msg, "[E006] Failed to fetch heatmap data.: timeout");
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            ErrorCode::MissingApiKey,
            ErrorCode::DataFileRead,
            ErrorCode::ExternalApi,
            ErrorCode::FearGreed,
            ErrorCode::Generation,
            ErrorCode::Heatmap,
            ErrorCode::Calendar,
        ];
        let rendered: std::collections::HashSet<_> = codes.iter().map(|c| c.code()).collect();
        assert_eq!(rendered.len(), codes.len());
    }
}
