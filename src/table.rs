//! In-memory sort and filter for report tables.
//!
//! Sorting is a stable three-way comparison on one named field, so rows that
//! compare equal keep their input order in either direction. Filters are a
//! conjunction of substring predicates, one per field.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{BooksError, Result};
use crate::format::{format_day, format_local_date, parse_day};
use crate::models::{Cost, DailyReport, Profile, Sale};

/// A field value as seen by sort and filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Day(NaiveDate),
}

impl Cell<'_> {
    /// Mixed kinds order by kind: numbers, timestamps, days, then text.
    fn rank(&self) -> u8 {
        match self {
            Cell::Number(_) => 0,
            Cell::Timestamp(_) => 1,
            Cell::Day(_) => 2,
            Cell::Text(_) => 3,
        }
    }

    fn compare(&self, other: &Cell<'_>) -> Ordering {
        match (self, other) {
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            (Cell::Day(a), Cell::Day(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn contains<Tz: TimeZone>(&self, needle: &str, tz: &Tz) -> bool {
        match self {
            Cell::Text(text) => text.to_lowercase().contains(&needle.to_lowercase()),
            Cell::Number(n) => n.to_string().contains(needle),
            Cell::Timestamp(ts) => format_local_date(ts, tz).contains(needle),
            Cell::Day(day) => format_day(*day).contains(needle),
        }
    }
}

/// A row type whose fields can be addressed by their literal names.
pub trait TableRow {
    const FIELDS: &'static [&'static str];

    fn cell(&self, field: &str) -> Option<Cell<'_>>;
}

impl TableRow for Sale {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "description",
        "quantity",
        "price",
        "total",
        "created_at",
    ];

    fn cell(&self, field: &str) -> Option<Cell<'_>> {
        Some(match field {
            "id" => Cell::Number(self.id as f64),
            "description" => Cell::Text(&self.description),
            "quantity" => Cell::Number(self.quantity as f64),
            "price" => Cell::Number(self.price),
            "total" => Cell::Number(self.total()),
            "created_at" => Cell::Timestamp(self.created_at),
            _ => return None,
        })
    }
}

impl TableRow for Cost {
    const FIELDS: &'static [&'static str] = &["id", "description", "amount", "created_at"];

    fn cell(&self, field: &str) -> Option<Cell<'_>> {
        Some(match field {
            "id" => Cell::Number(self.id as f64),
            "description" => Cell::Text(&self.description),
            "amount" => Cell::Number(self.amount),
            "created_at" => Cell::Timestamp(self.created_at),
            _ => return None,
        })
    }
}

impl TableRow for Profile {
    const FIELDS: &'static [&'static str] = &["email", "role"];

    fn cell(&self, field: &str) -> Option<Cell<'_>> {
        Some(match field {
            "email" => Cell::Text(&self.email),
            "role" => Cell::Text(self.role.as_str()),
            _ => return None,
        })
    }
}

impl TableRow for DailyReport {
    const FIELDS: &'static [&'static str] = &["date", "totalSales", "totalCosts", "netProfit"];

    fn cell(&self, field: &str) -> Option<Cell<'_>> {
        Some(match field {
            "date" => match parse_day(&self.date) {
                Some(day) => Cell::Day(day),
                None => Cell::Text(&self.date),
            },
            "totalSales" => Cell::Number(self.total_sales),
            "totalCosts" => Cell::Number(self.total_costs),
            "netProfit" => Cell::Number(self.net_profit()),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ascending")]
    Asc,
    #[serde(alias = "descending")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub needle: String,
}

impl FieldFilter {
    pub fn new(field: &str, needle: &str) -> Self {
        Self {
            field: field.to_string(),
            needle: needle.to_string(),
        }
    }
}

fn check_field<R: TableRow>(field: &str) -> Result<()> {
    if R::FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(BooksError::validation(
            field,
            format!("unknown field; expected one of {}", R::FIELDS.join(", ")),
        ))
    }
}

/// A newly ordered copy of `rows`.
pub fn sort_rows<R: TableRow + Clone>(rows: &[R], spec: &SortSpec) -> Result<Vec<R>> {
    check_field::<R>(&spec.field)?;
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        let ord = match (a.cell(&spec.field), b.cell(&spec.field)) {
            (Some(x), Some(y)) => x.compare(&y),
            _ => Ordering::Equal,
        };
        match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    Ok(sorted)
}

/// Rows matching every filter. Blank needles match everything.
pub fn filter_rows<R: TableRow + Clone, Tz: TimeZone>(
    rows: &[R],
    filters: &[FieldFilter],
    tz: &Tz,
) -> Result<Vec<R>> {
    for filter in filters {
        check_field::<R>(&filter.field)?;
    }
    let active: Vec<(&str, &str)> = filters
        .iter()
        .map(|f| (f.field.as_str(), f.needle.trim()))
        .filter(|(_, needle)| !needle.is_empty())
        .collect();

    Ok(rows
        .iter()
        .filter(|row| {
            active.iter().all(|(field, needle)| {
                row.cell(field)
                    .map(|cell| cell.contains(needle, tz))
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sale(id: i64, description: &str, quantity: i64, price: f64, day: u32) -> Sale {
        Sale {
            id,
            user_id: Uuid::nil(),
            description: description.into(),
            quantity,
            price,
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        }
    }

    fn ids(rows: &[Sale]) -> Vec<i64> {
        rows.iter().map(|r| r.id).collect()
    }

    fn sample() -> Vec<Sale> {
        vec![
            sale(1, "Exercise books", 2, 500.0, 3),
            sale(2, "Pens", 10, 200.0, 1),
            sale(3, "Ruler", 1, 500.0, 2),
            sale(4, "exercise BOOKS (A4)", 4, 800.0, 15),
            sale(5, "Glue", 1, 200.0, 5),
        ]
    }

    #[test]
    fn numeric_sort_reverses_except_ties() {
        let rows = sample();
        let asc = sort_rows(&rows, &SortSpec::new("price", SortDirection::Asc)).unwrap();
        let desc = sort_rows(&rows, &SortSpec::new("price", SortDirection::Desc)).unwrap();

        // ties (2,5) at 200 and (1,3) at 500 keep input order both ways
        assert_eq!(ids(&asc), vec![2, 5, 1, 3, 4]);
        assert_eq!(ids(&desc), vec![4, 1, 3, 2, 5]);
    }

    #[test]
    fn text_and_timestamp_sorts() {
        let rows = sample();
        let by_desc = sort_rows(&rows, &SortSpec::new("description", SortDirection::Asc)).unwrap();
        assert_eq!(ids(&by_desc), vec![1, 5, 2, 3, 4]);

        let newest = sort_rows(&rows, &SortSpec::new("created_at", SortDirection::Desc)).unwrap();
        assert_eq!(ids(&newest), vec![4, 5, 1, 3, 2]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let spec = SortSpec::new("total", SortDirection::Desc);
        let once = sort_rows(&sample(), &spec).unwrap();
        let twice = sort_rows(&once, &spec).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn description_filter_is_case_insensitive() {
        let found = filter_rows(&sample(), &[FieldFilter::new("description", "EXERCISE")], &Utc)
            .unwrap();
        assert_eq!(ids(&found), vec![1, 4]);
    }

    #[test]
    fn filters_are_a_conjunction() {
        let filters = [
            FieldFilter::new("description", "exercise"),
            FieldFilter::new("created_at", "1/15/"),
        ];
        let found = filter_rows(&sample(), &filters, &Utc).unwrap();
        assert_eq!(ids(&found), vec![4]);
    }

    #[test]
    fn unmatched_filter_yields_empty() {
        let found =
            filter_rows(&sample(), &[FieldFilter::new("description", "stapler")], &Utc).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn blank_needle_keeps_everything() {
        let found = filter_rows(&sample(), &[FieldFilter::new("description", "  ")], &Utc).unwrap();
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn filter_and_sort_commute() {
        let filters = [FieldFilter::new("price", "5")];
        let spec = SortSpec::new("quantity", SortDirection::Asc);
        let a = sort_rows(&filter_rows(&sample(), &filters, &Utc).unwrap(), &spec).unwrap();
        let b = filter_rows(&sort_rows(&sample(), &spec).unwrap(), &filters, &Utc).unwrap();
        assert_eq!(a, b);
        assert_eq!(ids(&a), vec![3, 1]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = sort_rows(&sample(), &SortSpec::new("colour", SortDirection::Asc)).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "colour");
        assert!(filter_rows(&sample(), &[FieldFilter::new("nope", "x")], &Utc).is_err());
    }

    #[test]
    fn daily_reports_sort_by_calendar_date() {
        let reports = vec![
            DailyReport::empty("9/30/2024"),
            DailyReport::empty("10/1/2024"),
            DailyReport::empty("1/5/2024"),
        ];
        let sorted = sort_rows(&reports, &SortSpec::new("date", SortDirection::Asc)).unwrap();
        let dates: Vec<&str> = sorted.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(dates, vec!["1/5/2024", "9/30/2024", "10/1/2024"]);
    }

    #[test]
    fn unparseable_dates_sort_after_real_ones() {
        let reports = vec![
            DailyReport::empty("not-a-date"),
            DailyReport::empty("1/2/2024"),
            DailyReport::empty("1/9/2024"),
            DailyReport::empty("not-a-date"),
            DailyReport::empty("1/5/2024"),
        ];
        let asc = sort_rows(&reports, &SortSpec::new("date", SortDirection::Asc)).unwrap();
        let dates: Vec<&str> = asc.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(
            dates,
            vec!["1/2/2024", "1/5/2024", "1/9/2024", "not-a-date", "not-a-date"]
        );

        let desc = sort_rows(&reports, &SortSpec::new("date", SortDirection::Desc)).unwrap();
        let dates: Vec<&str> = desc.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(
            dates,
            vec!["not-a-date", "not-a-date", "1/9/2024", "1/5/2024", "1/2/2024"]
        );
    }

    #[test]
    fn direction_accepts_long_names() {
        let dir: SortDirection = serde_json::from_str("\"descending\"").unwrap();
        assert_eq!(dir, SortDirection::Desc);
    }
}
