//! Record store client.
//!
//! Thin wrapper over the project's PostgREST endpoint (`/rest/v1/<table>`).
//! Every call carries the project `apikey` plus the caller's bearer token so
//! the backend's row-level policies apply; this module never widens a query
//! beyond the filters it is given.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{BooksError, Result};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// PostgREST code for "JSON object requested, multiple (or no) rows returned".
const NO_ROWS_CODE: &str = "PGRST116";

/// Filter/order/limit parameters for one PostgREST call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    columns: Option<String>,
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.params.push(("order".into(), format!("{column}.{dir}")));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.params.push(("limit".into(), n.to_string()));
        self
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.params.push((column.to_string(), format!("{op}.{value}")));
        self
    }

    /// Query-string pairs; reads default to `select=*`.
    fn read_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".into()),
        )];
        pairs.extend(self.params.iter().cloned());
        pairs
    }

    fn filter_pairs(&self) -> Vec<(String, String)> {
        self.params.clone()
    }
}

#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    config: Arc<AppConfig>,
}

impl StoreClient {
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BooksError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Filtered select returning every matching row.
    pub async fn select<T: DeserializeOwned>(
        &self,
        bearer: &str,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>> {
        let req = self
            .request(Method::GET, table, bearer)
            .query(&query.read_pairs());
        let body = self.send(table, req).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Select exactly one row; zero rows is [`BooksError::NotFound`].
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        bearer: &str,
        table: &str,
        query: &Query,
        entity: &'static str,
    ) -> Result<T> {
        let req = self
            .request(Method::GET, table, bearer)
            .header("Accept", SINGLE_OBJECT)
            .query(&query.read_pairs());
        let body = self.send(table, req).await.map_err(|e| no_rows_as_not_found(e, entity))?;
        Ok(serde_json::from_value(body)?)
    }

    /// Insert one row and return it as stored.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        bearer: &str,
        table: &str,
        row: &B,
    ) -> Result<T> {
        let req = self
            .request(Method::POST, table, bearer)
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "return=representation")
            .json(row);
        let body = self.send(table, req).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Insert or merge on `on_conflict` and return the resulting row.
    pub async fn upsert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        bearer: &str,
        table: &str,
        row: &B,
        on_conflict: &str,
    ) -> Result<T> {
        let req = self
            .request(Method::POST, table, bearer)
            .header("Accept", SINGLE_OBJECT)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", on_conflict)])
            .json(row);
        let body = self.send(table, req).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Patch every row matching `query`; returns the updated rows.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        bearer: &str,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<T>> {
        let req = self
            .request(Method::PATCH, table, bearer)
            .header("Prefer", "return=representation")
            .query(&query.filter_pairs())
            .json(patch);
        let body = self.send(table, req).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn delete(&self, bearer: &str, table: &str, query: &Query) -> Result<()> {
        let req = self
            .request(Method::DELETE, table, bearer)
            .query(&query.filter_pairs());
        self.send(table, req).await.map(|_| ())
    }

    fn request(&self, method: Method, table: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.rest_url(table))
            .header("apikey", self.config.anon_key.as_str())
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Content-Type", "application/json")
    }

    async fn send(&self, table: &str, req: RequestBuilder) -> Result<Value> {
        let start = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.supabase_url, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.config.supabase_url, &e))?;
        debug!(
            table,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "record store call"
        );

        if !status.is_success() {
            let err = remote_error(status, &body_text);
            warn!(table, error = %err, "record store call failed");
            return Err(err);
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body_text)?)
    }
}

/// Convert a transport failure into a user-friendly message.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> BooksError {
    if err.is_connect() {
        return BooksError::Network(format!("Cannot reach backend at {url}"));
    }
    if err.is_timeout() {
        return BooksError::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return BooksError::Network(format!("Invalid backend URL: {url}"));
    }
    BooksError::Network(format!("Network error communicating with {url}: {err}"))
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session is invalid or expired".to_string(),
        403 => "Not permitted by row-level policy".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Build a [`BooksError::Remote`] from a PostgREST or GoTrue error body.
pub(crate) fn remote_error(status: StatusCode, body_text: &str) -> BooksError {
    let json = serde_json::from_str::<Value>(body_text).ok();
    let message = json
        .as_ref()
        .and_then(|j| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| j.get(*k).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| status_message(status));
    let code = json
        .as_ref()
        .and_then(|j| j.get("code"))
        .map(|c| match c {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    let message = match code {
        Some(code) if !message.contains(&code) => format!("{message} [{code}]"),
        _ => message,
    };
    BooksError::Remote {
        status: status.as_u16(),
        message,
    }
}

fn no_rows_as_not_found(err: BooksError, entity: &'static str) -> BooksError {
    match err {
        BooksError::Remote { ref message, .. } if message.contains(NO_ROWS_CODE) => {
            BooksError::NotFound { entity }
        }
        other => other,
    }
}
