//! Sales and cost entry.
//!
//! Every read and write is scoped to the acting user. Deletes repeat the
//! owner filter next to the id so a stray id can never touch another
//! user's row. Rows are insert/delete only; there is no update path.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::auth::{Capability, SessionContext};
use crate::error::Result;
use crate::models::{Cost, CostInsert, NewCost, NewSale, Sale, SaleInsert};
use crate::store::{Query, StoreClient};

pub const SALES_TABLE: &str = "sales";
pub const COSTS_TABLE: &str = "costs";
pub const RECENT_COSTS_LIMIT: usize = 10;

fn newest_first(user_id: uuid::Uuid) -> Query {
    Query::new()
        .eq("user_id", user_id)
        .order("created_at", false)
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

pub async fn list_sales(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Sale>> {
    let actor = ctx.require(Capability::RecordEntries)?;
    store
        .select(&actor.token, SALES_TABLE, &newest_first(actor.user_id))
        .await
}

pub async fn add_sale(store: &StoreClient, ctx: &SessionContext, sale: &NewSale) -> Result<Sale> {
    let actor = ctx.require(Capability::RecordEntries)?;
    sale.validate()?;
    let row = SaleInsert {
        user_id: actor.user_id,
        description: sale.description.trim(),
        quantity: sale.quantity,
        price: sale.price,
    };
    let created: Sale = store.insert(&actor.token, SALES_TABLE, &row).await?;
    info!(user_id = %actor.user_id, sale_id = created.id, "sale recorded");
    Ok(created)
}

pub async fn delete_sale(store: &StoreClient, ctx: &SessionContext, id: i64) -> Result<()> {
    let actor = ctx.require(Capability::RecordEntries)?;
    store
        .delete(
            &actor.token,
            SALES_TABLE,
            &Query::new().eq("id", id).eq("user_id", actor.user_id),
        )
        .await?;
    info!(user_id = %actor.user_id, sale_id = id, "sale deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

pub async fn list_costs(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Cost>> {
    let actor = ctx.require(Capability::RecordEntries)?;
    store
        .select(&actor.token, COSTS_TABLE, &newest_first(actor.user_id))
        .await
}

/// Costs recorded since the start of the current UTC day.
pub async fn costs_today(store: &StoreClient, ctx: &SessionContext) -> Result<Vec<Cost>> {
    costs_since(store, ctx, start_of_utc_day(Utc::now())).await
}

pub async fn costs_since(
    store: &StoreClient,
    ctx: &SessionContext,
    since: DateTime<Utc>,
) -> Result<Vec<Cost>> {
    let actor = ctx.require(Capability::RecordEntries)?;
    let query = Query::new()
        .eq("user_id", actor.user_id)
        .gte("created_at", since.to_rfc3339_opts(SecondsFormat::Secs, true))
        .order("created_at", false);
    store.select(&actor.token, COSTS_TABLE, &query).await
}

pub async fn recent_costs(
    store: &StoreClient,
    ctx: &SessionContext,
    limit: usize,
) -> Result<Vec<Cost>> {
    let actor = ctx.require(Capability::RecordEntries)?;
    store
        .select(
            &actor.token,
            COSTS_TABLE,
            &newest_first(actor.user_id).limit(limit),
        )
        .await
}

pub async fn add_cost(store: &StoreClient, ctx: &SessionContext, cost: &NewCost) -> Result<Cost> {
    let actor = ctx.require(Capability::RecordEntries)?;
    cost.validate()?;
    let row = CostInsert {
        user_id: actor.user_id,
        description: cost.description.trim(),
        amount: cost.amount,
    };
    let created: Cost = store.insert(&actor.token, COSTS_TABLE, &row).await?;
    info!(user_id = %actor.user_id, cost_id = created.id, "cost recorded");
    Ok(created)
}

pub async fn delete_cost(store: &StoreClient, ctx: &SessionContext, id: i64) -> Result<()> {
    let actor = ctx.require(Capability::RecordEntries)?;
    store
        .delete(
            &actor.token,
            COSTS_TABLE,
            &Query::new().eq("id", id).eq("user_id", actor.user_id),
        )
        .await?;
    info!(user_id = %actor.user_id, cost_id = id, "cost deleted");
    Ok(())
}

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}
