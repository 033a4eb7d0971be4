use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use market_core::RowSkip;
use regex::Regex;

static FULL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})/(\d{1,2})/(\d{1,2})").expect("full date pattern"));
static MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})").expect("month day pattern"));
static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("clock pattern"));

/// A resolved event time in the reference zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct When {
    pub at: DateTime<Tz>,
    /// False when the source published only a date.
    pub has_time: bool,
}

impl When {
    pub fn label(&self) -> String {
        if self.has_time {
            self.at.format("%m/%d %H:%M").to_string()
        } else {
            self.at.format("%m/%d").to_string()
        }
    }
}

/// `YYYY/MM/DD`, or `MM/DD` resolved to the year that puts it closest to `today`.
pub fn parse_date(cell: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(c) = FULL_DATE.captures(cell) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }
    let c = MONTH_DAY.captures(cell)?;
    infer_year(c[1].parse().ok()?, c[2].parse().ok()?, today)
}

fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    [today.year() - 1, today.year(), today.year() + 1]
        .into_iter()
        .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
        .min_by_key(|d| (*d - today).num_days().abs())
}

pub fn parse_clock(cell: &str) -> Option<NaiveTime> {
    let c = CLOCK.captures(cell)?;
    NaiveTime::from_hms_opt(c[1].parse().ok()?, c[2].parse().ok()?, 0)
}

/// Combine a date cell and an optional time cell. A clock time embedded in
/// the date cell is used when there is no separate time cell.
pub fn resolve(date_cell: &str, time_cell: Option<&str>, now: DateTime<Tz>) -> Result<When, RowSkip> {
    let date = parse_date(date_cell, now.date_naive())
        .ok_or_else(|| RowSkip::UnparseableDate(date_cell.to_string()))?;

    let time = match time_cell {
        Some(cell) => Some(parse_clock(cell).ok_or_else(|| RowSkip::UnparseableDate(cell.to_string()))?),
        None => parse_clock(date_cell),
    };

    localize(date.and_time(time.unwrap_or(NaiveTime::MIN)), now.timezone(), time.is_some())
        .ok_or_else(|| RowSkip::UnparseableDate(date_cell.to_string()))
}

pub fn localize(naive: NaiveDateTime, tz: Tz, has_time: bool) -> Option<When> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|at| When { at, has_time })
}

/// Open interval around "now" that an event must fall into to be kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionWindow {
    pub before: Duration,
    /// `None` keeps everything after the lower bound.
    pub after: Option<Duration>,
}

impl RetentionWindow {
    /// Date-only events are kept when their day is today or later.
    pub fn contains(&self, when: &When, now: DateTime<Tz>) -> bool {
        if !when.has_time {
            let upper_ok = self
                .after
                .map_or(true, |a| when.at.date_naive() <= (now + a).date_naive());
            return when.at.date_naive() >= now.date_naive() && upper_ok;
        }
        when.at > now - self.before && self.after.map_or(true, |a| when.at < now + a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Tokyo;

    fn now() -> DateTime<Tz> {
        Tokyo.with_ymd_and_hms(2024, 12, 30, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_month_day_rolls_into_next_year() {
        let today = now().date_naive();
        assert_eq!(parse_date("01/02(木)", today), NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(parse_date("12/27(金)", today), NaiveDate::from_ymd_opt(2024, 12, 27));
        assert_eq!(parse_date("2024/11/05", today), NaiveDate::from_ymd_opt(2024, 11, 5));
        assert_eq!(parse_date("発表日", today), None);
    }

    #[test]
    fn test_resolve_uses_embedded_clock() {
        let when = resolve("2024/12/30 15:00", None, now()).unwrap();
        assert!(when.has_time);
        assert_eq!(when.label(), "12/30 15:00");

        let date_only = resolve("2024/12/31日", None, now()).unwrap();
        assert!(!date_only.has_time);
        assert_eq!(date_only.label(), "12/31");
    }

    #[test]
    fn test_resolve_rejects_bad_time_cell() {
        let err = resolve("12/30(月)", Some("未定"), now()).unwrap_err();
        assert_eq!(err, RowSkip::UnparseableDate("未定".into()));
    }

    #[test]
    fn test_window_bounds_are_open() {
        let window = RetentionWindow {
            before: Duration::hours(2),
            after: Some(Duration::hours(26)),
        };
        let at = |h: i64| When {
            at: now() + Duration::hours(h),
            has_time: true,
        };
        assert!(!window.contains(&at(-2), now()));
        assert!(window.contains(&at(-1), now()));
        assert!(window.contains(&at(25), now()));
        assert!(!window.contains(&at(26), now()));
    }

    #[test]
    fn test_open_ended_window_keeps_future() {
        let window = RetentionWindow {
            before: Duration::hours(2),
            after: None,
        };
        let far = When {
            at: now() + Duration::days(40),
            has_time: true,
        };
        assert!(window.contains(&far, now()));

        let yesterday = localize(
            NaiveDate::from_ymd_opt(2024, 12, 29).unwrap().and_time(NaiveTime::MIN),
            Tokyo,
            false,
        )
        .unwrap();
        assert!(!window.contains(&yesterday, now()));
    }
}
