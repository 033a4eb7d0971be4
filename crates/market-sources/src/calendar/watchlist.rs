use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use market_core::SourceError;
use regex::Regex;
use serde::Deserialize;

static FOUR_DIGIT_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").expect("four digit code pattern"));

/// Large-cap US names whose earnings dates are worth surfacing.
pub const US_EARNINGS_WATCHLIST: &[&str] = &[
    "AAPL", "NVDA", "MSFT", "GOOG", "META", "AMZN", "NFLX", "BRK-B", "TSLA", "AVGO",
    "LLY", "WMT", "JPM", "V", "UNH", "XOM", "ORCL", "MA", "HD", "PG", "COST", "JNJ",
    "ABBV", "TMUS", "BAC", "CRM", "KO", "CVX", "VZ", "MRK", "AMD", "PEP", "CSCO",
    "LIN", "ACN", "WFC", "TMO", "ADBE", "MCD", "ABT", "BX", "PM", "NOW", "IBM", "AXP",
    "MS", "TXN", "GE", "QCOM", "CAT", "ISRG", "DHR", "INTU", "DIS", "CMCSA", "AMGN",
    "T", "GS", "PFE", "NEE", "CHTR", "RTX", "BKNG", "UBER", "AMAT", "SPGI", "LOW",
    "BLK", "PGR", "UNP", "SYK", "HON", "ETN", "SCHW", "LMT", "TJX", "COP", "ANET",
    "BSX", "KKR", "VRTX", "C", "PANW", "ADP", "NKE", "BA", "MDT", "FI", "UPS", "SBUX",
    "ADI", "CB", "GILD", "MU", "BMY", "DE", "PLD", "MMC", "INTC", "AMT", "SO", "LRCX",
    "ELV", "DELL", "PLTR", "REGN", "MDLZ", "MO", "HCA", "SHW", "KLAC", "ICE", "CI", "ABNB",
];

/// Four-digit TSE codes of large domestic issuers.
pub const JP_EARNINGS_WATCHLIST: &[&str] = &[
    "7203", "8306", "6501", "6861", "6758", "9983", "6098", "9984", "8316", "9432",
    "4519", "4063", "8058", "8001", "8766", "8035", "9433", "8031", "7974", "4568",
    "9434", "8411", "2914", "7267", "7741", "7011", "4502", "6857", "6902", "4661",
    "6503", "3382", "6367", "8725", "4578", "6702", "6981", "6146", "7751", "6178",
    "4543", "4901", "6273", "8053", "8002", "6954", "5108", "8591", "6301", "8801",
    "6723", "8750", "6762", "6594", "9020", "6701", "9613", "4503", "8267", "8630",
    "6752", "6201", "9022", "7733", "4452", "4689", "2802", "5401", "1925", "7269",
    "8802", "8113", "2502", "8015", "4612", "4307", "1605", "8309", "8308", "1928",
    "8604", "9101", "6326", "4684", "7532", "9735", "8830", "9503", "5020", "3659",
    "9843", "6971", "7832", "4091", "7309", "4755", "9104", "4716", "7936", "9766",
    "4507", "8697", "5802", "2503", "7270", "6920", "6869", "6988", "2801", "2587",
    "3407", "5803", "7201", "8593", "9531", "4523", "9107", "7202", "3092", "8601",
    "5019", "9202", "9435", "1802", "4768", "7911", "4151", "9502", "6586", "7701",
    "3402", "7272", "9532", "9697", "4911", "9021", "8795", "3064", "7259", "1812",
    "2897", "7912", "4324", "6504", "7013", "7550", "6645", "5713", "5411", "4188",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// The whole cell is the symbol.
    Exact,
    /// The first four-digit run in the cell is the symbol.
    EmbeddedCode,
}

/// Symbols recognized as tickers during cell classification.
#[derive(Debug, Clone)]
pub struct Watchlist {
    symbols: HashSet<String>,
    mode: MatchMode,
}

impl Watchlist {
    pub fn exact<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            mode: MatchMode::Exact,
        }
    }

    pub fn embedded_codes<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            mode: MatchMode::EmbeddedCode,
        }
    }

    pub fn us_default() -> Self {
        Self::exact(US_EARNINGS_WATCHLIST.iter().copied())
    }

    pub fn jp_default() -> Self {
        Self::embedded_codes(JP_EARNINGS_WATCHLIST.iter().copied())
    }

    pub fn embeds_symbols(&self) -> bool {
        self.mode == MatchMode::EmbeddedCode
    }

    pub fn find(&self, cell: &str) -> Option<String> {
        let candidate = match self.mode {
            MatchMode::Exact => cell.trim(),
            MatchMode::EmbeddedCode => FOUR_DIGIT_CODE.find(cell)?.as_str(),
        };
        self.symbols.get(candidate).cloned()
    }
}

/// Known announcement injected into the US earnings list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EarningsOverride {
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    pub ticker: String,
    pub company: String,
}

/// Read an override table: a JSON array of `{date, time?, ticker, company}`.
pub fn load_overrides(path: &Path) -> Result<Vec<EarningsOverride>, SourceError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SourceError::Format(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| SourceError::Format(format!("invalid override table {}: {}", path.display(), e)))
}
