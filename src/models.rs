//! Row types for the `sales`, `costs`, `profiles` and `reports` tables,
//! plus the derived report shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{BooksError, FieldError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub user_id: Uuid,
    pub description: String,
    pub quantity: i64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub fn total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub id: i64,
    pub user_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Sale payload before the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSale {
    pub description: String,
    pub quantity: i64,
    pub price: f64,
}

impl NewSale {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "is required"));
        }
        if self.quantity < 1 {
            errors.push(FieldError::new("quantity", "must be a positive whole number"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            errors.push(FieldError::new("price", "must be a non-negative amount"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BooksError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCost {
    pub description: String,
    pub amount: f64,
}

impl NewCost {
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.description.trim().is_empty() {
            errors.push(FieldError::new("description", "is required"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            errors.push(FieldError::new("amount", "must be a non-negative amount"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BooksError::Validation(errors))
        }
    }
}

/// Insert body for `sales`, owner attached.
#[derive(Debug, Serialize)]
pub(crate) struct SaleInsert<'a> {
    pub user_id: Uuid,
    pub description: &'a str,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CostInsert<'a> {
    pub user_id: Uuid,
    pub description: &'a str,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// The role a "Make Admin" / "Make User" toggle switches to.
    pub fn toggled(&self) -> Role {
        match self {
            Role::Admin => Role::User,
            Role::User => Role::Admin,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BooksError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(BooksError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Per-day aggregate. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: String,
    pub total_sales: f64,
    pub total_costs: f64,
}

impl DailyReport {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            total_sales: 0.0,
            total_costs: 0.0,
        }
    }

    pub fn net_profit(&self) -> f64 {
        self.total_sales - self.total_costs
    }

    /// Net profit as a percentage of sales; a day without sales has margin 0.
    pub fn profit_margin(&self) -> f64 {
        profit_margin(self.total_sales, self.total_costs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub total_sales: f64,
    pub total_costs: f64,
    pub sales_count: usize,
    pub costs_count: usize,
}

impl SummaryTotals {
    pub fn net_profit(&self) -> f64 {
        self.total_sales - self.total_costs
    }

    pub fn profit_margin(&self) -> f64 {
        profit_margin(self.total_sales, self.total_costs)
    }
}

pub fn profit_margin(total_sales: f64, total_costs: f64) -> f64 {
    if total_sales == 0.0 {
        return 0.0;
    }
    let margin = (total_sales - total_costs) / total_sales * 100.0;
    if margin.is_finite() {
        margin
    } else {
        0.0
    }
}

/// The single persisted summary row a user keeps in `reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub id: i64,
    pub user_id: Uuid,
    pub total_sales: f64,
    pub total_costs: f64,
    pub profit_loss: f64,
    pub sales_count: i64,
    pub costs_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportUpsert {
    pub user_id: Uuid,
    pub total_sales: f64,
    pub total_costs: f64,
    pub profit_loss: f64,
    pub sales_count: i64,
    pub costs_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl ReportUpsert {
    pub fn from_summary(user_id: Uuid, summary: &SummaryTotals, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_sales: summary.total_sales,
            total_costs: summary.total_costs,
            profit_loss: summary.net_profit(),
            sales_count: summary.sales_count as i64,
            costs_count: summary.costs_count as i64,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_payload_validation_reports_each_field() {
        let bad = NewSale {
            description: "  ".into(),
            quantity: 0,
            price: -1.0,
        };
        let err = bad.validate().unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["description", "quantity", "price"]);

        let good = NewSale {
            description: "Exercise books".into(),
            quantity: 3,
            price: 1500.0,
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn cost_payload_rejects_nan_amount() {
        let bad = NewCost {
            description: "Rent".into(),
            amount: f64::NAN,
        };
        assert_eq!(bad.validate().unwrap_err().field_errors()[0].field, "amount");
    }

    #[test]
    fn daily_report_derives_profit_and_margin() {
        let report = DailyReport {
            date: "1/1/2024".into(),
            total_sales: 2000.0,
            total_costs: 500.0,
        };
        assert_eq!(report.net_profit(), 1500.0);
        assert_eq!(report.profit_margin(), 75.0);
    }

    #[test]
    fn zero_sales_day_has_zero_margin() {
        let report = DailyReport {
            date: "1/2/2024".into(),
            total_sales: 0.0,
            total_costs: 300.0,
        };
        assert_eq!(report.net_profit(), -300.0);
        assert_eq!(report.profit_margin(), 0.0);
    }

    #[test]
    fn roles_parse_and_toggle() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::User.toggled(), Role::Admin);
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
    }

    #[test]
    fn sale_rows_deserialize_from_store_json() {
        let raw = serde_json::json!({
            "id": 7,
            "user_id": "6f1c1b0e-0f5e-4c39-9a59-2d7f1f7a0c11",
            "description": "Pens",
            "quantity": 4,
            "price": 250,
            "created_at": "2024-01-01T09:30:00.123456+00:00"
        });
        let sale: Sale = serde_json::from_value(raw).expect("sale row");
        assert_eq!(sale.total(), 1000.0);
    }
}
