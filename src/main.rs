use anyhow::{bail, Context};
use chrono::Local;
use std::path::{Path, PathBuf};

use esanga_books_lib::commands::{self, reports::ExportFile, Notice};
use esanga_books_lib::{AppConfig, Books};

fn notice_error(notice: Notice) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", notice.title, notice.description)
}

fn write_export(dir: &Path, file: &ExportFile) -> anyhow::Result<()> {
    let path = dir.join(&file.file_name);
    std::fs::write(&path, &file.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = file.bytes.len(), "export written");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    esanga_books_lib::init_logging(Some(&config));

    let (Ok(email), Ok(password)) = (std::env::var("BOOKS_EMAIL"), std::env::var("BOOKS_PASSWORD"))
    else {
        bail!("BOOKS_EMAIL and BOOKS_PASSWORD must be set");
    };
    let export_dir = std::env::var("BOOKS_EXPORT_DIR").ok().map(PathBuf::from);

    let books = Books::new(config)?;
    let (profile, _) = commands::auth::login(&books, &email, &password)
        .await
        .map_err(notice_error)?;

    let summary = commands::reports::summary(&books).await.map_err(notice_error)?;
    let daily = commands::reports::daily_reports(&books, &Local)
        .await
        .map_err(notice_error)?;

    let snapshot = serde_json::json!({
        "user": profile,
        "currency": books.currency(),
        "summary": {
            "totalSales": summary.total_sales,
            "totalCosts": summary.total_costs,
            "netProfit": summary.net_profit(),
            "profitMargin": summary.profit_margin(),
            "salesCount": summary.sales_count,
            "costsCount": summary.costs_count,
        },
        "dailyReports": daily,
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(dir) = export_dir {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let file = commands::reports::export_daily_reports_csv(&books, &daily)
            .map_err(notice_error)?;
        write_export(&dir, &file)?;
        // daily reports come newest first
        if let Some(latest) = daily.first() {
            let pdf = commands::reports::export_daily_report_pdf(&books, latest)
                .map_err(notice_error)?;
            write_export(&dir, &pdf)?;
        }
    }

    if let Err(notice) = commands::auth::logout(&books).await {
        tracing::warn!(description = %notice.description, "sign-out failed");
    }
    Ok(())
}
