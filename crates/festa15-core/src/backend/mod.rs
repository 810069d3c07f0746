//! Backend abstraction over the hosted data platform.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      FestaEngine                        │
//! └────────────────────────────┬────────────────────────────┘
//!                              │ dyn Backend
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌─────────────┐               ┌─────────────┐
//!        │ HttpBackend │               │ MockBackend │
//!        │  rest/v1    │               │  in-memory  │
//!        │  auth/v1    │               │  tables +   │
//!        │  storage/v1 │               │  counters   │
//!        └─────────────┘               └─────────────┘
//! ```
//!
//! All persistence, auth, object storage and realtime go through this one
//! trait, so the engine never knows which side it is talking to. Queries
//! are deliberately thin: equality filters, one optional ordering, one
//! optional limit. That is the whole shape the app needs, and it keeps the
//! mock faithful.

mod http;
mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FestaError, FestaResult};
use crate::types::UserId;

/// Buffer size for live feed channels.
pub(crate) const FEED_CHANNEL_CAPACITY: usize = 64;

/// Tables the app reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Invites,
    Rsvps,
    Messages,
    Photos,
    EventConfig,
    ThemeConfig,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Invites => "invites",
            Table::Rsvps => "rsvps",
            Table::Messages => "messages",
            Table::Photos => "photos",
            Table::EventConfig => "event_config",
            Table::ThemeConfig => "theme_config",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single record as the backend sees it.
pub type Row = serde_json::Value;

/// Serialize a domain value into a row.
pub fn to_row<T: Serialize>(value: &T) -> FestaResult<Row> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize a row into a domain value.
pub fn from_row<T: DeserializeOwned>(row: Row) -> FestaResult<T> {
    Ok(serde_json::from_value(row)?)
}

/// Equality-only filter, in the builder style of the hosted query API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Row)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column = value` clause.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Row>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Row)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Row-level evaluation, used by the mock backend. A missing column
    /// never matches.
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses
            .iter()
            .all(|(column, want)| row.get(column) == Some(want))
    }
}

/// Sort direction for [`SelectQuery::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// A select with equality filters, one optional ordering and a limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filter: Filter,
    pub order: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an equality clause on the filter.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Row>) -> Self {
        self.filter = self.filter.eq(column, value);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// An authenticated backend session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: Option<String>,
    pub access_token: String,
    /// True for sessions minted without credentials.
    pub anonymous: bool,
}

/// Which kind of change a live feed reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live stream of changed rows for one table.
///
/// Dropping the feed aborts the producer task behind it, so teardown is a
/// plain drop and nothing keeps polling after logout.
#[derive(Debug)]
pub struct ChangeFeed {
    rows: mpsc::Receiver<Row>,
    _guard: FeedGuard,
}

impl ChangeFeed {
    pub fn new(rows: mpsc::Receiver<Row>, guard: FeedGuard) -> Self {
        Self {
            rows,
            _guard: guard,
        }
    }

    /// Next changed row, or `None` once the producer has stopped.
    pub async fn next(&mut self) -> Option<Row> {
        self.rows.recv().await
    }
}

/// Aborts the producer task when dropped.
#[derive(Debug)]
pub struct FeedGuard {
    task: Option<JoinHandle<()>>,
}

impl FeedGuard {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Everything the engine needs from the hosted platform.
///
/// Object-safe so the engine can hold `Arc<dyn Backend>` and tests can
/// swap in the mock.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable name for logs and mode assertions.
    fn name(&self) -> &'static str;

    // ── data ────────────────────────────────────────────────────────────

    async fn select(&self, table: Table, query: SelectQuery) -> FestaResult<Vec<Row>>;

    /// Insert one row. Returns the stored representation, including any
    /// backend-assigned columns.
    async fn insert(&self, table: Table, row: Row) -> FestaResult<Row>;

    /// Patch every row matching `filter`. Returns the updated rows.
    async fn update(&self, table: Table, patch: Row, filter: Filter) -> FestaResult<Vec<Row>>;

    /// Insert, or replace the row sharing `conflict_column`.
    async fn upsert(&self, table: Table, row: Row, conflict_column: &str) -> FestaResult<Row>;

    // ── auth ────────────────────────────────────────────────────────────

    /// The current session, if one is established.
    async fn session(&self) -> FestaResult<Option<AuthSession>>;

    async fn sign_in_anonymously(&self) -> FestaResult<AuthSession>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> FestaResult<AuthSession>;

    async fn sign_up(&self, email: &str, password: &str) -> FestaResult<AuthSession>;

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> FestaResult<()>;

    async fn sign_out(&self) -> FestaResult<()>;

    // ── object storage ──────────────────────────────────────────────────

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FestaResult<()>;

    /// Public URL for a stored object. Pure string assembly.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    // ── realtime ────────────────────────────────────────────────────────

    /// Start watching `table` for `change`s.
    async fn subscribe(&self, table: Table, change: ChangeKind) -> FestaResult<ChangeFeed>;

    // ── provided helpers ────────────────────────────────────────────────

    /// Exactly one row, or an error either way.
    async fn select_one(&self, table: Table, query: SelectQuery) -> FestaResult<Row> {
        let mut rows = self.select(table, query).await?;
        match rows.len() {
            0 => Err(FestaError::RowNotFound {
                table: table.as_str(),
            }),
            1 => Ok(rows.remove(0)),
            n => Err(FestaError::MultipleRows {
                table: table.as_str(),
                count: n,
            }),
        }
    }

    /// Zero or one row; more than one is an error.
    async fn select_optional(&self, table: Table, query: SelectQuery) -> FestaResult<Option<Row>> {
        let mut rows = self.select(table, query).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            n => Err(FestaError::MultipleRows {
                table: table.as_str(),
                count: n,
            }),
        }
    }
}
