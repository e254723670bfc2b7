//! CSV and PDF rendering of report tables.
//!
//! Amounts are written the way they are shown on screen (`TZS 1,500`) and
//! dates as the viewer's local `M/D/YYYY`.

use chrono::TimeZone;
use csv::Writer;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::{BooksError, Result};
use crate::format::{file_safe_date, format_currency, format_local_date, format_percent};
use crate::models::{Cost, DailyReport, Sale};

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn finish_csv(wtr: Writer<Vec<u8>>) -> Result<String> {
    let data = wtr
        .into_inner()
        .map_err(|e| BooksError::Export(format!("CSV writer error: {e}")))?;
    String::from_utf8(data).map_err(|e| BooksError::Export(format!("UTF-8 conversion error: {e}")))
}

pub fn sales_csv<Tz: TimeZone>(sales: &[Sale], currency: &str, tz: &Tz) -> Result<String> {
    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record(["Date", "Description", "Quantity", "Price", "Total"])?;
    for sale in sales {
        wtr.write_record([
            format_local_date(&sale.created_at, tz),
            sale.description.clone(),
            sale.quantity.to_string(),
            format_currency(sale.price, currency),
            format_currency(sale.total(), currency),
        ])?;
    }
    finish_csv(wtr)
}

pub fn costs_csv<Tz: TimeZone>(costs: &[Cost], currency: &str, tz: &Tz) -> Result<String> {
    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record(["Date", "Description", "Amount"])?;
    for cost in costs {
        wtr.write_record([
            format_local_date(&cost.created_at, tz),
            cost.description.clone(),
            format_currency(cost.amount, currency),
        ])?;
    }
    finish_csv(wtr)
}

pub fn daily_reports_csv(reports: &[DailyReport], currency: &str) -> Result<String> {
    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record([
        "Date",
        "Total Sales",
        "Total Costs",
        "Net Profit",
        "Profit Margin",
    ])?;
    for report in reports {
        wtr.write_record([
            report.date.clone(),
            format_currency(report.total_sales, currency),
            format_currency(report.total_costs, currency),
            format_currency(report.net_profit(), currency),
            format_percent(report.profit_margin()),
        ])?;
    }
    finish_csv(wtr)
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

// A4 portrait, in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const TITLE_SIZE: f32 = 18.0;
const BODY_SIZE: f32 = 10.0;
const ROW_HEIGHT: f32 = 18.0;
const ROWS_PER_PAGE: usize = 36;

/// A titled table laid out over as many pages as its rows need.
struct PdfTable<'a> {
    title: String,
    headers: &'a [&'a str],
    /// Left edge of each column, relative to the margin.
    columns: &'a [f32],
    rows: Vec<Vec<String>>,
}

impl PdfTable<'_> {
    fn page_content(&self, rows: &[Vec<String>], first_page: bool) -> Content {
        let mut ops = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        if first_page {
            text_at(&mut ops, "F2", TITLE_SIZE, MARGIN, y, &self.title);
            y -= TITLE_SIZE * 2.0;
        }

        for (header, x) in self.headers.iter().zip(self.columns) {
            text_at(&mut ops, "F2", BODY_SIZE, MARGIN + x, y, header);
        }
        rule(&mut ops, y - 6.0);
        y -= ROW_HEIGHT + 4.0;

        for row in rows {
            for (cell, x) in row.iter().zip(self.columns) {
                text_at(&mut ops, "F1", BODY_SIZE, MARGIN + x, y, cell);
            }
            y -= ROW_HEIGHT;
        }

        Content { operations: ops }
    }

    fn render(&self) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        // An empty table still gets one page with its title and header.
        let chunks: Vec<&[Vec<String>]> = if self.rows.is_empty() {
            vec![&self.rows[..]]
        } else {
            self.rows.chunks(ROWS_PER_PAGE).collect()
        };

        let mut kids: Vec<Object> = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let content = self.page_content(chunk, i == 0);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| BooksError::Export(format!("PDF write error: {e}")))?;
        Ok(out)
    }
}

fn text_at(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    ops.push(Operation::new("ET", vec![]));
}

fn rule(ops: &mut Vec<Operation>, y: f32) {
    ops.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
    ops.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
    ops.push(Operation::new("S", vec![]));
}

/// One-page statement of a single day's totals.
pub fn daily_report_pdf(report: &DailyReport, currency: &str) -> Result<Vec<u8>> {
    PdfTable {
        title: format!("Daily Report for {}", report.date),
        headers: &["Description", "Amount"],
        columns: &[0.0, 300.0],
        rows: vec![
            vec![
                "Total Sales".to_string(),
                format_currency(report.total_sales, currency),
            ],
            vec![
                "Total Costs".to_string(),
                format_currency(report.total_costs, currency),
            ],
            vec![
                "Net Profit".to_string(),
                format_currency(report.net_profit(), currency),
            ],
        ],
    }
    .render()
}

pub fn sales_pdf<Tz: TimeZone>(sales: &[Sale], currency: &str, tz: &Tz) -> Result<Vec<u8>> {
    PdfTable {
        title: "Sales Report".to_string(),
        headers: &["Date", "Description", "Qty", "Price", "Total"],
        columns: &[0.0, 75.0, 265.0, 310.0, 405.0],
        rows: sales
            .iter()
            .map(|sale| {
                vec![
                    format_local_date(&sale.created_at, tz),
                    sale.description.clone(),
                    sale.quantity.to_string(),
                    format_currency(sale.price, currency),
                    format_currency(sale.total(), currency),
                ]
            })
            .collect(),
    }
    .render()
}

pub fn costs_pdf<Tz: TimeZone>(costs: &[Cost], currency: &str, tz: &Tz) -> Result<Vec<u8>> {
    PdfTable {
        title: "Costs Report".to_string(),
        headers: &["Date", "Description", "Amount"],
        columns: &[0.0, 75.0, 365.0],
        rows: costs
            .iter()
            .map(|cost| {
                vec![
                    format_local_date(&cost.created_at, tz),
                    cost.description.clone(),
                    format_currency(cost.amount, currency),
                ]
            })
            .collect(),
    }
    .render()
}

/// `daily_report_1-1-2024.pdf`
pub fn daily_report_file_name(date: &str) -> String {
    format!("daily_report_{}.pdf", file_safe_date(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use uuid::Uuid;

    fn sale(id: i64, description: &str, quantity: i64, price: f64) -> Sale {
        Sale {
            id,
            user_id: Uuid::nil(),
            description: description.into(),
            quantity,
            price,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 22, 30, 0).unwrap(),
        }
    }

    fn cost(id: i64, description: &str, amount: f64) -> Cost {
        Cost {
            id,
            user_id: Uuid::nil(),
            description: description.into(),
            amount,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        }
    }

    fn records(csv_text: &str) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(csv_text.as_bytes());
        rdr.records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn sales_csv_reparses_to_the_same_cells() {
        let rows = vec![
            sale(1, "Exercise books, A4", 2, 1500.0),
            sale(2, "Pens \"blue\"", 10, 200.0),
        ];
        let text = sales_csv(&rows, "TZS", &Utc).unwrap();
        let parsed = records(&text);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], vec!["Date", "Description", "Quantity", "Price", "Total"]);
        assert_eq!(
            parsed[1],
            vec!["1/1/2024", "Exercise books, A4", "2", "TZS 1,500", "TZS 3,000"]
        );
        assert_eq!(parsed[2][1], "Pens \"blue\"");
    }

    #[test]
    fn csv_dates_follow_the_viewer_zone() {
        // 22:30 UTC is already the next day in Dar es Salaam.
        let eat = FixedOffset::east_opt(3 * 3600).unwrap();
        let text = sales_csv(&[sale(1, "Pens", 1, 100.0)], "TZS", &eat).unwrap();
        assert_eq!(records(&text)[1][0], "1/2/2024");
    }

    #[test]
    fn empty_exports_have_only_a_header() {
        assert_eq!(records(&costs_csv(&[], "TZS", &Utc).unwrap()).len(), 1);
        assert_eq!(records(&daily_reports_csv(&[], "TZS").unwrap()).len(), 1);
    }

    #[test]
    fn daily_csv_carries_profit_and_margin() {
        let report = DailyReport {
            date: "1/1/2024".into(),
            total_sales: 2000.0,
            total_costs: 500.0,
        };
        let parsed = records(&daily_reports_csv(&[report], "TZS").unwrap());
        assert_eq!(
            parsed[1],
            vec!["1/1/2024", "TZS 2,000", "TZS 500", "TZS 1,500", "75.00%"]
        );
    }

    #[test]
    fn daily_pdf_is_a_single_titled_page() {
        let report = DailyReport {
            date: "1/1/2024".into(),
            total_sales: 2000.0,
            total_costs: 500.0,
        };
        let bytes = daily_report_pdf(&report, "TZS").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("Daily Report for 1/1/2024"));
        assert!(raw.contains("Net Profit"));
        assert!(raw.contains("TZS 1,500"));
    }

    #[test]
    fn long_listings_span_pages() {
        let costs: Vec<Cost> = (0..(ROWS_PER_PAGE as i64 + 1))
            .map(|i| cost(i, "Rent", 100.0))
            .collect();
        let doc = Document::load_mem(&costs_pdf(&costs, "TZS", &Utc).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let empty = Document::load_mem(&sales_pdf(&[], "TZS", &Utc).unwrap()).unwrap();
        assert_eq!(empty.get_pages().len(), 1);
    }

    #[test]
    fn file_name_uses_dashes() {
        assert_eq!(daily_report_file_name("1/1/2024"), "daily_report_1-1-2024.pdf");
    }
}
