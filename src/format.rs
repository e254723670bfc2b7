//! Currency and calendar-date formatting used by reports and exports.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

/// `TZS 1,500` style amount: rounded to a whole unit, `,` grouping.
pub fn format_currency(amount: f64, currency: &str) -> String {
    format!("{currency} {}", group_thousands(amount))
}

fn group_thousands(amount: f64) -> String {
    let rounded = amount.round();
    if !rounded.is_finite() {
        return "0".to_string();
    }
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if negative && out != "0" {
        out.insert(0, '-');
    }
    out
}

/// Two-decimal percentage, e.g. `75.00%`.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

/// The viewer's calendar day for a stored timestamp.
pub fn local_day<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// `M/D/YYYY` without zero padding.
pub fn format_day(day: NaiveDate) -> String {
    format!("{}/{}/{}", day.month(), day.day(), day.year())
}

pub fn format_local_date<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> String {
    format_day(local_day(ts, tz))
}

/// Inverse of [`format_day`].
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `1/15/2024` -> `1-15-2024`, for use in file names.
pub fn file_safe_date(date: &str) -> String {
    date.replace('/', "-")
}
