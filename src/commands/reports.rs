use chrono::TimeZone;
use serde::{Deserialize, Serialize};

use super::{fail, CommandResult};
use crate::auth::Capability;
use crate::error::Result;
use crate::models::{Cost, DailyReport, ReportSnapshot, Sale, SummaryTotals};
use crate::table::{filter_rows, sort_rows, FieldFilter, SortSpec, TableRow};
use crate::{export, reports, Books};

const CSV_CONTENT_TYPE: &str = "text/csv";
const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Rendered export ready to be saved or downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Sort and filter state of a report table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportView {
    #[serde(default)]
    pub sort: Option<SortSpec>,
    #[serde(default)]
    pub filters: Vec<FieldFilter>,
}

impl ReportView {
    fn apply<R: TableRow + Clone, Tz: TimeZone>(&self, rows: &[R], tz: &Tz) -> Result<Vec<R>> {
        let filtered = filter_rows(rows, &self.filters, tz)?;
        match &self.sort {
            Some(spec) => sort_rows(&filtered, spec),
            None => Ok(filtered),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

pub async fn summary(books: &Books) -> CommandResult<SummaryTotals> {
    reports::summary_totals(&books.store, &books.session, books.config.summary_window)
        .await
        .map_err(fail(
            "summary_totals",
            "Failed to fetch summary. Please try again.",
        ))
}

pub async fn daily_reports<Tz: TimeZone>(books: &Books, tz: &Tz) -> CommandResult<Vec<DailyReport>> {
    reports::daily_reports(&books.store, &books.session, books.config.daily_window, tz)
        .await
        .map_err(fail(
            "daily_reports",
            "Failed to fetch daily reports. Please try again.",
        ))
}

/// The last submitted snapshot, `None` if the user never submitted one.
pub async fn snapshot(books: &Books) -> CommandResult<Option<ReportSnapshot>> {
    match reports::get_snapshot(&books.store, &books.session).await {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(super::notice_for(
            "get_snapshot",
            "Failed to fetch report. Please try again.",
            err,
        )),
    }
}

// ---------------------------------------------------------------------------
// Detail reports (admin)
// ---------------------------------------------------------------------------

pub async fn sales_report<Tz: TimeZone>(
    books: &Books,
    view: &ReportView,
    tz: &Tz,
) -> CommandResult<Vec<Sale>> {
    const GENERIC: &str = "Failed to fetch sales. Please try again later.";
    let rows = reports::sales_report(&books.store, &books.session)
        .await
        .map_err(fail("sales_report", GENERIC))?;
    view.apply(&rows, tz).map_err(fail("sales_report", GENERIC))
}

pub async fn costs_report<Tz: TimeZone>(
    books: &Books,
    view: &ReportView,
    tz: &Tz,
) -> CommandResult<Vec<Cost>> {
    const GENERIC: &str = "Failed to fetch costs. Please try again later.";
    let rows = reports::costs_report(&books.store, &books.session)
        .await
        .map_err(fail("costs_report", GENERIC))?;
    view.apply(&rows, tz).map_err(fail("costs_report", GENERIC))
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn render(
    books: &Books,
    capability: Capability,
    file_name: String,
    content_type: &'static str,
    build: impl FnOnce(&str) -> Result<Vec<u8>>,
) -> CommandResult<ExportFile> {
    let generic = "Failed to export report. Please try again.";
    books
        .session
        .require(capability)
        .and_then(|_| build(books.currency()))
        .map(|bytes| ExportFile {
            file_name,
            content_type,
            bytes,
        })
        .map_err(fail("export", generic))
}

fn csv_bytes(text: Result<String>) -> Result<Vec<u8>> {
    text.map(String::into_bytes)
}

pub fn export_sales_csv<Tz: TimeZone>(books: &Books, rows: &[Sale], tz: &Tz) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewReports,
        "sales_report.csv".into(),
        CSV_CONTENT_TYPE,
        |currency| csv_bytes(export::sales_csv(rows, currency, tz)),
    )
}

pub fn export_costs_csv<Tz: TimeZone>(books: &Books, rows: &[Cost], tz: &Tz) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewReports,
        "costs_report.csv".into(),
        CSV_CONTENT_TYPE,
        |currency| csv_bytes(export::costs_csv(rows, currency, tz)),
    )
}

pub fn export_daily_reports_csv(books: &Books, rows: &[DailyReport]) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewDashboard,
        "daily_reports.csv".into(),
        CSV_CONTENT_TYPE,
        |currency| csv_bytes(export::daily_reports_csv(rows, currency)),
    )
}

pub fn export_daily_report_pdf(books: &Books, report: &DailyReport) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewDashboard,
        export::daily_report_file_name(&report.date),
        PDF_CONTENT_TYPE,
        |currency| export::daily_report_pdf(report, currency),
    )
}

pub fn export_sales_pdf<Tz: TimeZone>(books: &Books, rows: &[Sale], tz: &Tz) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewReports,
        "sales_report.pdf".into(),
        PDF_CONTENT_TYPE,
        |currency| export::sales_pdf(rows, currency, tz),
    )
}

pub fn export_costs_pdf<Tz: TimeZone>(books: &Books, rows: &[Cost], tz: &Tz) -> CommandResult<ExportFile> {
    render(
        books,
        Capability::ViewReports,
        "costs_report.pdf".into(),
        PDF_CONTENT_TYPE,
        |currency| export::costs_pdf(rows, currency, tz),
    )
}
