//! Daily and period reporting.
//!
//! Daily reports bucket a trailing window of sales and costs by the
//! viewer's calendar day; summary totals sum everything inside their own
//! (by default unbounded) window. Both fetch the two tables in parallel and
//! fail as a whole if either fetch fails. Nothing here is persisted except
//! the explicit snapshot written by [`save_snapshot`].

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::auth::{Capability, SessionContext};
use crate::config::Window;
use crate::error::Result;
use crate::format::{format_local_date, parse_day};
use crate::ledger::{COSTS_TABLE, SALES_TABLE};
use crate::models::{Cost, DailyReport, ReportSnapshot, ReportUpsert, Sale, SummaryTotals};
use crate::store::{Query, StoreClient};

/// The columns daily bucketing needs from a sale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaleLine {
    pub created_at: DateTime<Utc>,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CostLine {
    pub created_at: DateTime<Utc>,
    pub amount: f64,
}

// ---------------------------------------------------------------------------
// Pure aggregation
// ---------------------------------------------------------------------------

/// Bucket sales and costs by local calendar day, newest day first.
///
/// A day with only sales (or only costs) still gets a report with the other
/// side at zero.
pub fn aggregate_daily<Tz: TimeZone>(
    sales: &[SaleLine],
    costs: &[CostLine],
    tz: &Tz,
) -> Vec<DailyReport> {
    let mut by_date: HashMap<String, DailyReport> = HashMap::new();

    for sale in sales {
        let key = format_local_date(&sale.created_at, tz);
        by_date
            .entry(key.clone())
            .or_insert_with(|| DailyReport::empty(key))
            .total_sales += sale.price * sale.quantity as f64;
    }

    for cost in costs {
        let key = format_local_date(&cost.created_at, tz);
        by_date
            .entry(key.clone())
            .or_insert_with(|| DailyReport::empty(key))
            .total_costs += cost.amount;
    }

    let mut reports: Vec<DailyReport> = by_date.into_values().collect();
    sort_newest_first(&mut reports);
    reports
}

/// Order reports by their parsed date, newest first.
pub fn sort_newest_first(reports: &mut [DailyReport]) {
    reports.sort_by_key(|r| Reverse(parse_day(&r.date)));
}

/// Sum every sale and cost; counts are row counts.
pub fn summarize(sales: &[SaleLine], costs: &[CostLine]) -> SummaryTotals {
    SummaryTotals {
        total_sales: sales.iter().map(|s| s.price * s.quantity as f64).sum(),
        total_costs: costs.iter().map(|c| c.amount).sum(),
        sales_count: sales.len(),
        costs_count: costs.len(),
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

fn window_query(
    columns: &str,
    user_id: uuid::Uuid,
    window: Window,
    now: DateTime<Utc>,
) -> Query {
    let mut query = Query::new().select(columns).eq("user_id", user_id);
    if let Some(since) = window.since(now) {
        query = query.gte("created_at", since.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    query
}

/// Fetch the window's sale and cost lines for the current user, in parallel.
async fn fetch_lines(
    store: &StoreClient,
    ctx: &SessionContext,
    window: Window,
    now: DateTime<Utc>,
) -> Result<(Vec<SaleLine>, Vec<CostLine>)> {
    let actor = ctx.require(Capability::ViewDashboard)?;
    let sales_query = window_query("created_at, price, quantity", actor.user_id, window, now);
    let costs_query = window_query("created_at, amount", actor.user_id, window, now);

    let (sales, costs) = tokio::try_join!(
        store.select::<SaleLine>(&actor.token, SALES_TABLE, &sales_query),
        store.select::<CostLine>(&actor.token, COSTS_TABLE, &costs_query),
    )?;
    debug!(
        user_id = %actor.user_id,
        sales = sales.len(),
        costs = costs.len(),
        ?window,
        "fetched report lines"
    );
    Ok((sales, costs))
}

/// Daily reports for the current user over `window`, newest day first.
pub async fn daily_reports<Tz: TimeZone>(
    store: &StoreClient,
    ctx: &SessionContext,
    window: Window,
    tz: &Tz,
) -> Result<Vec<DailyReport>> {
    let (sales, costs) = fetch_lines(store, ctx, window, Utc::now()).await?;
    Ok(aggregate_daily(&sales, &costs, tz))
}

/// Summary totals for the current user over `window`.
pub async fn summary_totals(
    store: &StoreClient,
    ctx: &SessionContext,
    window: Window,
) -> Result<SummaryTotals> {
    let (sales, costs) = fetch_lines(store, ctx, window, Utc::now()).await?;
    Ok(summarize(&sales, &costs))
}

// ---------------------------------------------------------------------------
// Detail reports (admin)
// ---------------------------------------------------------------------------

fn detail_query(user_id: uuid::Uuid) -> Query {
    Query::new()
        .eq("user_id", user_id)
        .order("created_at", false)
}

/// Full sales listing behind the sales report screen.
pub async fn sales_report(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Sale>> {
    let actor = ctx.require(Capability::ViewReports)?;
    store
        .select(&actor.token, SALES_TABLE, &detail_query(actor.user_id))
        .await
}

pub async fn costs_report(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Cost>> {
    let actor = ctx.require(Capability::ViewReports)?;
    store
        .select(&actor.token, COSTS_TABLE, &detail_query(actor.user_id))
        .await
}

// ---------------------------------------------------------------------------
// Persisted snapshot
// ---------------------------------------------------------------------------

/// The user's stored snapshot; `NotFound` when none was ever saved.
pub async fn get_snapshot(store: &StoreClient, ctx: &SessionContext) -> Result<ReportSnapshot> {
    let actor = ctx.require(Capability::ViewDashboard)?;
    store
        .select_single(
            &actor.token,
            "reports",
            &Query::new().eq("user_id", actor.user_id),
            "report",
        )
        .await
}

/// Upsert the user's snapshot from freshly computed totals.
pub async fn save_snapshot(
    store: &StoreClient,
    ctx: &SessionContext,
    summary: &SummaryTotals,
) -> Result<ReportSnapshot> {
    let actor = ctx.require(Capability::RecordEntries)?;
    let row = ReportUpsert::from_summary(actor.user_id, summary, Utc::now());
    let snapshot: ReportSnapshot = store.upsert(&actor.token, "reports", &row, "user_id").await?;
    info!(
        user_id = %actor.user_id,
        sales_count = snapshot.sales_count,
        costs_count = snapshot.costs_count,
        "report snapshot saved"
    );
    Ok(snapshot)
}
