use async_trait::async_trait;
use market_core::{CalendarFeed, CalendarSource, RawTable, SourceError};
use scraper::{ElementRef, Html, Selector};

use crate::session::SourceSession;

const ECONOMIC_URL: &str = "https://mst.monex.co.jp/pc/servlet/ITS/report/EconomyIndexCalendar";
const US_EARNINGS_URL: &str = "https://mst.monex.co.jp/mst/servlet/ITS/fi/FIClosingCalendarUSGuest";
const JP_EARNINGS_URL: &str = "https://mst.monex.co.jp/mst/servlet/ITS/fi/FIClosingCalendarJPGuest";

/// Monex calendar pages. They are served as Shift_JIS.
pub struct MonexCalendarClient {
    session: SourceSession,
}

impl MonexCalendarClient {
    pub fn new(session: SourceSession) -> Self {
        Self { session }
    }

    fn url(feed: CalendarFeed) -> &'static str {
        match feed {
            CalendarFeed::Economic => ECONOMIC_URL,
            CalendarFeed::UsEarnings => US_EARNINGS_URL,
            CalendarFeed::JpEarnings => JP_EARNINGS_URL,
        }
    }
}

#[async_trait]
impl CalendarSource for MonexCalendarClient {
    async fn tables(&self, feed: CalendarFeed) -> Result<Vec<RawTable>, SourceError> {
        let bytes = self.session.get_bytes(Self::url(feed)).await?;
        let html = decode_shift_jis(&bytes);
        extract_tables(&html)
    }
}

/// Decode a Shift_JIS page, replacing malformed sequences.
pub fn decode_shift_jis(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(bytes);
    if had_errors {
        tracing::debug!("Replaced malformed Shift_JIS sequences");
    }
    text.into_owned()
}

/// Every `<table>` in document order with rowspan/colspan cells repeated into
/// the positions they cover. Rows of nested tables belong to the nested table
/// only.
pub fn extract_tables(html: &str) -> Result<Vec<RawTable>, SourceError> {
    let document = Html::parse_document(html);
    let table_sel = parse_selector("table")?;
    let row_sel = parse_selector("tr")?;

    Ok(document
        .select(&table_sel)
        .map(|table| {
            let rows = table
                .select(&row_sel)
                .filter(|row| owning_table(*row).map(|t| t.id()) == Some(table.id()));
            RawTable {
                rows: expand_spans(rows),
            }
        })
        .collect())
}

fn parse_selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Format(format!("selector {}: {:?}", css, e)))
}

fn owning_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

fn span(cell: &ElementRef<'_>, attr: &str) -> usize {
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, 64)
}

fn normalized_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

struct Carried {
    text: String,
    rows_left: usize,
}

fn expand_spans<'a>(rows: impl Iterator<Item = ElementRef<'a>>) -> Vec<Vec<String>> {
    let mut carried: Vec<Option<Carried>> = Vec::new();
    let mut out = Vec::new();

    for row in rows {
        let mut cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"));

        let mut line: Vec<String> = Vec::new();
        let mut col = 0;

        loop {
            while let Some(Some(c)) = carried.get_mut(col) {
                line.push(c.text.clone());
                c.rows_left -= 1;
                if c.rows_left == 0 {
                    carried[col] = None;
                }
                col += 1;
            }

            let Some(cell) = cells.next() else { break };
            let text = normalized_text(&cell);
            let rowspan = span(&cell, "rowspan");
            for _ in 0..span(&cell, "colspan") {
                if rowspan > 1 {
                    if carried.len() <= col {
                        carried.resize_with(col + 1, || None);
                    }
                    carried[col] = Some(Carried {
                        text: text.clone(),
                        rows_left: rowspan - 1,
                    });
                }
                line.push(text.clone());
                col += 1;
            }
        }

        if !line.is_empty() {
            out.push(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_shift_jis() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("決算発表 ★★");
        assert_eq!(decode_shift_jis(&bytes), "決算発表 ★★");
    }

    #[test]
    fn test_extract_tables_in_document_order() {
        let html = r#"<html><body>
            <table><tr><td>nav</td></tr></table>
            <table>
              <tr><th>日付</th><th>時刻</th></tr>
              <tr><td> 05/10(金) </td><td>21:30</td></tr>
            </table></body></html>"#;
        let tables = extract_tables(html).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows, vec![vec!["nav".to_string()]]);
        assert_eq!(tables[1].rows[1], vec!["05/10(金)".to_string(), "21:30".to_string()]);
    }

    #[test]
    fn test_rowspan_repeats_cell() {
        let html = r#"<table>
            <tr><td rowspan="2">05/10(金)</td><td>21:30</td><td>★★★</td></tr>
            <tr><td>23:00</td><td>★</td></tr>
            <tr><td>05/11(土)</td><td colspan="2">休場</td></tr>
          </table>"#;
        let tables = extract_tables(html).unwrap();
        let rows = &tables[0].rows;

        assert_eq!(rows[1], vec!["05/10(金)", "23:00", "★"]);
        assert_eq!(rows[2], vec!["05/11(土)", "休場", "休場"]);
    }

    #[test]
    fn test_nested_table_rows_stay_nested() {
        let html = r#"<table id="outer">
            <tr><td>outer<table><tr><td>inner</td></tr></table></td></tr>
          </table>"#;
        let tables = extract_tables(html).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(tables[1].rows, vec![vec!["inner".to_string()]]);
    }
}
