use serde::Serialize;
use tracing::info;

use super::{fail, CommandResult, Notice};
use crate::models::{NewSale, Sale, SummaryTotals};
use crate::{ledger, reports, Books};

/// The sales entry screen's list. Local changes follow confirmed writes
/// only.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SalesBook {
    sales: Vec<Sale>,
}

impl SalesBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    pub async fn load(&mut self, books: &Books) -> CommandResult<()> {
        self.sales = ledger::list_sales(&books.store, &books.session)
            .await
            .map_err(fail("list_sales", "Failed to fetch sales. Please try again."))?;
        Ok(())
    }

    pub async fn add(&mut self, books: &Books, sale: &NewSale) -> CommandResult<Notice> {
        let created = ledger::add_sale(&books.store, &books.session, sale)
            .await
            .map_err(fail("add_sale", "Failed to add sale. Please try again."))?;
        self.sales.insert(0, created);
        Ok(Notice::success(
            "Sale Added",
            "The sale has been successfully recorded.",
        ))
    }

    pub async fn delete(&mut self, books: &Books, id: i64) -> CommandResult<Notice> {
        ledger::delete_sale(&books.store, &books.session, id)
            .await
            .map_err(fail("delete_sale", "Failed to delete sale. Please try again."))?;
        self.sales.retain(|s| s.id != id);
        Ok(Notice::success(
            "Sale Deleted",
            "The sale has been removed from the list.",
        ))
    }

    /// Persist the current summary snapshot and report how many entries the
    /// screen was showing.
    pub async fn submit_daily_report(&self, books: &Books) -> CommandResult<Notice> {
        const GENERIC: &str = "Failed to submit daily report. Please try again.";
        let summary: SummaryTotals =
            reports::summary_totals(&books.store, &books.session, books.config.summary_window)
                .await
                .map_err(fail("submit_daily_report", GENERIC))?;
        reports::save_snapshot(&books.store, &books.session, &summary)
            .await
            .map_err(fail("submit_daily_report", GENERIC))?;
        info!(entries = self.sales.len(), "daily sales report submitted");
        Ok(Notice::success(
            "Daily Sales Report Submitted",
            format!("{} sales entries have been submitted.", self.sales.len()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::books_for;
    use crate::models::Role;
    use mockito::Matcher;

    fn sale_json(id: i64, user_id: uuid::Uuid) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "description": "Pens",
            "quantity": 3,
            "price": 200,
            "created_at": "2024-01-01T10:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn added_sale_is_prepended() {
        let mut server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let _list = server
            .mock("GET", "/rest/v1/sales")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::json!([sale_json(1, user_id)]).to_string())
            .create_async()
            .await;
        let _insert = server
            .mock("POST", "/rest/v1/sales")
            .with_status(201)
            .with_body(sale_json(2, user_id).to_string())
            .create_async()
            .await;

        let mut book = SalesBook::new();
        book.load(&books).await.unwrap();
        let notice = book
            .add(
                &books,
                &NewSale {
                    description: "Pens".into(),
                    quantity: 3,
                    price: 200.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(notice.title, "Sale Added");
        let ids: Vec<i64> = book.sales().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn failed_delete_leaves_the_list_alone() {
        let mut server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let _list = server
            .mock("GET", "/rest/v1/sales")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::json!([sale_json(7, user_id)]).to_string())
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", "/rest/v1/sales")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;

        let mut book = SalesBook::new();
        book.load(&books).await.unwrap();
        let notice = book.delete(&books, 7).await.unwrap_err();

        assert_eq!(notice.description, "Failed to delete sale. Please try again.");
        assert_eq!(book.sales().len(), 1);
    }

    #[tokio::test]
    async fn submit_reports_entry_count() {
        let mut server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let _sales = server
            .mock("GET", "/rest/v1/sales")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::json!([sale_json(1, user_id), sale_json(2, user_id)]).to_string())
            .create_async()
            .await;
        let _costs = server
            .mock("GET", "/rest/v1/costs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let snapshot = server
            .mock("POST", "/rest/v1/reports")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "total_sales": 1200.0,
                "sales_count": 2
            })))
            .with_status(201)
            .with_body(
                serde_json::json!({
                    "id": 1,
                    "user_id": user_id,
                    "total_sales": 1200.0,
                    "total_costs": 0.0,
                    "profit_loss": 1200.0,
                    "sales_count": 2,
                    "costs_count": 0,
                    "created_at": "2024-01-01T00:00:00+00:00",
                    "updated_at": "2024-01-01T00:00:00+00:00"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut book = SalesBook::new();
        book.load(&books).await.unwrap();
        let notice = book.submit_daily_report(&books).await.unwrap();

        assert_eq!(notice.description, "2 sales entries have been submitted.");
        snapshot.assert_async().await;
    }
}
