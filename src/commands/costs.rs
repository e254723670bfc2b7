use serde::Serialize;
use tracing::info;

use super::{fail, CommandResult, Notice};
use crate::auth::Capability;
use crate::ledger::{self, RECENT_COSTS_LIMIT};
use crate::models::{Cost, NewCost};
use crate::Books;

/// The cost entry screen: today's costs plus a short recent list.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBook {
    daily: Vec<Cost>,
    recent: Vec<Cost>,
}

impl CostBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn daily(&self) -> &[Cost] {
        &self.daily
    }

    pub fn recent(&self) -> &[Cost] {
        &self.recent
    }

    pub async fn load(&mut self, books: &Books) -> CommandResult<()> {
        self.daily = ledger::costs_today(&books.store, &books.session)
            .await
            .map_err(fail(
                "costs_today",
                "Failed to fetch daily costs. Please try again.",
            ))?;
        self.recent = ledger::recent_costs(&books.store, &books.session, RECENT_COSTS_LIMIT)
            .await
            .map_err(fail(
                "recent_costs",
                "Failed to fetch recent costs. Please try again.",
            ))?;
        Ok(())
    }

    pub async fn add(&mut self, books: &Books, cost: &NewCost) -> CommandResult<Notice> {
        let created = ledger::add_cost(&books.store, &books.session, cost)
            .await
            .map_err(fail("add_cost", "Failed to add cost. Please try again."))?;
        self.daily.insert(0, created.clone());
        self.recent.insert(0, created);
        self.recent.truncate(RECENT_COSTS_LIMIT);
        Ok(Notice::success(
            "Cost Added",
            "The cost has been successfully recorded.",
        ))
    }

    pub async fn delete(&mut self, books: &Books, id: i64) -> CommandResult<Notice> {
        ledger::delete_cost(&books.store, &books.session, id)
            .await
            .map_err(fail("delete_cost", "Failed to delete cost. Please try again."))?;
        self.daily.retain(|c| c.id != id);
        self.recent.retain(|c| c.id != id);
        Ok(Notice::success(
            "Cost Deleted",
            "The cost has been removed from the list.",
        ))
    }

    /// Hand off today's list and clear it from the screen.
    pub fn submit_daily_report(&mut self, books: &Books) -> CommandResult<Notice> {
        let actor = books.session.require(Capability::RecordEntries).map_err(fail(
            "submit_cost_report",
            "Failed to submit daily report. Please try again.",
        ))?;
        let count = self.daily.len();
        info!(user_id = %actor.user_id, entries = count, "daily cost report submitted");
        self.daily.clear();
        Ok(Notice::success(
            "Daily Cost Report Submitted",
            format!("{count} cost entries have been submitted."),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::books_for;
    use crate::models::Role;
    use mockito::Matcher;

    fn cost_json(id: i64, user_id: uuid::Uuid) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "description": "Rent",
            "amount": 500,
            "created_at": "2024-01-01T10:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn recent_list_stays_capped() {
        let mut server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let full: Vec<serde_json::Value> = (1..=RECENT_COSTS_LIMIT as i64)
            .map(|id| cost_json(id, user_id))
            .collect();
        let _list = server
            .mock("GET", "/rest/v1/costs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::Value::Array(full).to_string())
            .create_async()
            .await;
        let _insert = server
            .mock("POST", "/rest/v1/costs")
            .with_status(201)
            .with_body(cost_json(99, user_id).to_string())
            .create_async()
            .await;

        let mut book = CostBook::new();
        book.load(&books).await.unwrap();
        book.add(
            &books,
            &NewCost {
                description: "Rent".into(),
                amount: 500.0,
            },
        )
        .await
        .unwrap();

        assert_eq!(book.recent().len(), RECENT_COSTS_LIMIT);
        assert_eq!(book.recent()[0].id, 99);
        assert_eq!(book.daily()[0].id, 99);
    }

    #[tokio::test]
    async fn delete_removes_from_both_lists() {
        let mut server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let _list = server
            .mock("GET", "/rest/v1/costs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(serde_json::json!([cost_json(4, user_id), cost_json(5, user_id)]).to_string())
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", "/rest/v1/costs")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await;

        let mut book = CostBook::new();
        book.load(&books).await.unwrap();
        let notice = book.delete(&books, 4).await.unwrap();

        assert_eq!(notice.title, "Cost Deleted");
        assert!(book.daily().iter().all(|c| c.id != 4));
        assert!(book.recent().iter().all(|c| c.id != 4));
    }

    #[tokio::test]
    async fn load_failure_is_a_notice() {
        let mut server = mockito::Server::new_async().await;
        let (books, _) = books_for(&server.url(), Role::User);
        let _list = server
            .mock("GET", "/rest/v1/costs")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let notice = CostBook::new().load(&books).await.unwrap_err();
        assert_eq!(
            notice.description,
            "Failed to fetch daily costs. Please try again."
        );
    }

    #[tokio::test]
    async fn submit_clears_today_only() {
        let server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        let mut book = CostBook::new();
        let cost: Cost = serde_json::from_value(cost_json(1, user_id)).unwrap();
        book.daily.push(cost.clone());
        book.recent.push(cost);

        let notice = book.submit_daily_report(&books).unwrap();
        assert_eq!(notice.description, "1 cost entries have been submitted.");
        assert!(book.daily().is_empty());
        assert_eq!(book.recent().len(), 1);
    }

    #[tokio::test]
    async fn submit_needs_a_signed_in_user() {
        let server = mockito::Server::new_async().await;
        let (books, user_id) = books_for(&server.url(), Role::User);
        books.session.sign_out();
        let mut book = CostBook::new();
        book.daily
            .push(serde_json::from_value(cost_json(1, user_id)).unwrap());

        let notice = book.submit_daily_report(&books).unwrap_err();
        assert_eq!(notice.description, "Please sign in to continue.");
        assert_eq!(book.daily().len(), 1);
    }
}
