//! In-memory backend used when no hosted credentials are configured.
//!
//! Faithful to the hosted service within what the app exercises: rows live
//! in per-table vectors, auth is a handful of in-memory accounts, uploads
//! land in a map, and subscriptions ride broadcast channels. Call counters
//! and a write-failure injector make tests precise about what touched the
//! backend and what happens when a write dies mid-flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rand::{distr::Alphanumeric, Rng};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::error::{FestaError, FestaResult};
use crate::types::{Segment, UserId};

use super::{
    AuthSession, Backend, ChangeFeed, ChangeKind, FeedGuard, Filter, Order, Row, SelectQuery,
    Table, FEED_CHANNEL_CAPACITY,
};

#[derive(Debug, Clone)]
struct MockAccount {
    user_id: UserId,
    /// `None` for accounts that only ever signed in via magic link.
    password: Option<String>,
}

/// The stand-in backend for mock mode and tests.
pub struct MockBackend {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    next_ids: RwLock<HashMap<Table, i64>>,
    objects: RwLock<HashMap<String, Bytes>>,
    accounts: RwLock<HashMap<String, MockAccount>>,
    current: RwLock<Option<AuthSession>>,
    magic_links: RwLock<Vec<String>>,
    feeds: RwLock<HashMap<(Table, ChangeKind), broadcast::Sender<Row>>>,

    anonymous_enabled: AtomicBool,
    fail_writes: AtomicU64,

    reads: AtomicU64,
    writes: AtomicU64,
    uploads: AtomicU64,
    auth_calls: AtomicU64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_ids: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            magic_links: RwLock::new(Vec::new()),
            feeds: RwLock::new(HashMap::new()),
            anonymous_enabled: AtomicBool::new(true),
            fail_writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            auth_calls: AtomicU64::new(0),
        }
    }

    /// A backend pre-seeded with demo data: a few unused invites plus the
    /// event and theme singletons. This is what mock mode boots with.
    pub fn with_event_defaults() -> Self {
        let mock = Self::new();
        for code in ["G15-J01", "G15-J02", "G15-J03"] {
            mock.seed_invite(code, Segment::Young);
        }
        for code in ["G15-A01", "G15-A02"] {
            mock.seed_invite(code, Segment::Adult);
        }
        mock.seed_row(
            Table::EventConfig,
            json!({
                "id": 1,
                "event_name": "Festa de 15 Anos da Gabriela",
                "venue": "Espaço Jardim das Flores",
                "event_date": "2026-11-21",
                "welcome_message": "Bem-vindo à festa! Confirme sua presença e deixe um recado.",
            }),
        );
        mock.seed_row(
            Table::ThemeConfig,
            json!({
                "id": 1,
                "palette": "CLASSIC",
                "updated_at": 0,
            }),
        );
        mock
    }

    // ── test and seed controls ──────────────────────────────────────────

    /// Insert a row directly, bypassing counters and feeds.
    pub fn seed_row(&self, table: Table, row: Row) {
        if let Some(id) = row.get("id").and_then(Row::as_i64) {
            let mut ids = self.next_ids.write();
            let next = ids.entry(table).or_insert(0);
            *next = (*next).max(id);
        }
        self.tables.write().entry(table).or_default().push(row);
    }

    /// Seed one unused invite.
    pub fn seed_invite(&self, code: &str, segment: Segment) {
        self.seed_row(
            Table::Invites,
            json!({
                "code": code,
                "segment": segment,
                "used": false,
                "redeemed_by": null,
            }),
        );
    }

    /// Toggle the anonymous sign-in provider, mirroring the project-level
    /// switch on the hosted service.
    pub fn set_anonymous_enabled(&self, enabled: bool) {
        self.anonymous_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Make the next `count` row writes fail with a backend error.
    pub fn inject_write_failures(&self, count: u64) {
        self.fail_writes.store(count, Ordering::Relaxed);
    }

    /// Simulate the guest opening the emailed magic link: establishes a
    /// session for `email` and returns it.
    pub fn complete_magic_link(&self, email: &str) -> AuthSession {
        let email = email.trim().to_lowercase();
        let account = self.ensure_account(&email);
        let session = AuthSession {
            user_id: account.user_id,
            email: Some(email),
            access_token: mock_token(),
            anonymous: false,
        };
        *self.current.write() = Some(session.clone());
        session
    }

    /// Snapshot of one table, for assertions.
    pub fn table_rows(&self, table: Table) -> Vec<Row> {
        self.tables.read().get(&table).cloned().unwrap_or_default()
    }

    /// Stored object bytes, if the upload happened.
    pub fn object(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.objects.read().get(&object_key(bucket, path)).cloned()
    }

    /// Emails a magic link was requested for, in order.
    pub fn magic_link_requests(&self) -> Vec<String> {
        self.magic_links.read().clone()
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn auth_call_count(&self) -> u64 {
        self.auth_calls.load(Ordering::Relaxed)
    }

    // ── internals ───────────────────────────────────────────────────────

    fn ensure_account(&self, email: &str) -> MockAccount {
        let mut accounts = self.accounts.write();
        accounts
            .entry(email.to_string())
            .or_insert_with(|| MockAccount {
                user_id: UserId::new(Uuid::new_v4().to_string()),
                password: None,
            })
            .clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_writes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn store_session(&self, session: AuthSession) -> AuthSession {
        *self.current.write() = Some(session.clone());
        session
    }

    fn notify(&self, table: Table, change: ChangeKind, row: &Row) {
        let tx = self.feeds.read().get(&(table, change)).cloned();
        if let Some(tx) = tx {
            // nobody listening is fine
            let _ = tx.send(row.clone());
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn select(&self, table: Table, query: SelectQuery) -> FestaResult<Vec<Row>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut rows: Vec<Row> = self
            .tables
            .read()
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_columns(a, b, column);
                match order {
                    Order::Ascending => ordering,
                    Order::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Row) -> FestaResult<Row> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.take_injected_failure() {
            return Err(FestaError::Backend("injected write failure".into()));
        }

        let mut stored = row;
        if matches!(table, Table::Messages | Table::Photos) && stored.get("id").is_none() {
            let mut ids = self.next_ids.write();
            let next = ids.entry(table).or_insert(0);
            *next += 1;
            if let Some(obj) = stored.as_object_mut() {
                obj.insert("id".to_string(), Row::from(*next));
            }
        }

        {
            let mut tables = self.tables.write();
            let rows = tables.entry(table).or_default();
            if table == Table::Invites {
                // unique code column, mirroring the hosted constraint
                if let Some(code) = stored.get("code").and_then(Row::as_str) {
                    if rows
                        .iter()
                        .any(|row| row.get("code").and_then(Row::as_str) == Some(code))
                    {
                        return Err(FestaError::Conflict(format!(
                            "duplicate invite code {code}"
                        )));
                    }
                }
            }
            rows.push(stored.clone());
        }

        self.notify(table, ChangeKind::Insert, &stored);
        Ok(stored)
    }

    async fn update(&self, table: Table, patch: Row, filter: Filter) -> FestaResult<Vec<Row>> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.take_injected_failure() {
            return Err(FestaError::Backend("injected write failure".into()));
        }

        let mut updated = Vec::new();
        {
            let mut tables = self.tables.write();
            if let Some(rows) = tables.get_mut(&table) {
                for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                    merge_patch(row, &patch);
                    updated.push(row.clone());
                }
            }
        }

        for row in &updated {
            self.notify(table, ChangeKind::Update, row);
        }
        Ok(updated)
    }

    async fn upsert(&self, table: Table, row: Row, conflict_column: &str) -> FestaResult<Row> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.take_injected_failure() {
            return Err(FestaError::Backend("injected write failure".into()));
        }

        let key = row.get(conflict_column).cloned();
        let mut result = row;
        let mut kind = ChangeKind::Insert;
        {
            let mut tables = self.tables.write();
            let rows = tables.entry(table).or_default();
            let position = key
                .as_ref()
                .and_then(|key| rows.iter().position(|row| row.get(conflict_column) == Some(key)));
            match position {
                Some(index) => {
                    merge_patch(&mut rows[index], &result);
                    result = rows[index].clone();
                    kind = ChangeKind::Update;
                }
                None => rows.push(result.clone()),
            }
        }

        self.notify(table, kind, &result);
        Ok(result)
    }

    async fn session(&self) -> FestaResult<Option<AuthSession>> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.current.read().clone())
    }

    async fn sign_in_anonymously(&self) -> FestaResult<AuthSession> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        if !self.anonymous_enabled.load(Ordering::Relaxed) {
            return Err(FestaError::AnonymousDisabled);
        }
        let session = AuthSession {
            user_id: UserId::new(Uuid::new_v4().to_string()),
            email: None,
            access_token: mock_token(),
            anonymous: true,
        };
        Ok(self.store_session(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> FestaResult<AuthSession> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        let email = email.trim().to_lowercase();
        let account = self.accounts.read().get(&email).cloned();
        let Some(account) = account else {
            return Err(FestaError::AuthRejected(format!("unknown account {email}")));
        };
        if account.password.as_deref() != Some(password) {
            return Err(FestaError::AuthRejected("wrong password".into()));
        }
        let session = AuthSession {
            user_id: account.user_id,
            email: Some(email),
            access_token: mock_token(),
            anonymous: false,
        };
        Ok(self.store_session(session))
    }

    async fn sign_up(&self, email: &str, password: &str) -> FestaResult<AuthSession> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        let email = email.trim().to_lowercase();
        if self.accounts.read().contains_key(&email) {
            return Err(FestaError::AuthRejected(format!(
                "account already exists: {email}"
            )));
        }
        let account = MockAccount {
            user_id: UserId::new(Uuid::new_v4().to_string()),
            password: Some(password.to_string()),
        };
        self.accounts.write().insert(email.clone(), account.clone());
        let session = AuthSession {
            user_id: account.user_id,
            email: Some(email),
            access_token: mock_token(),
            anonymous: false,
        };
        Ok(self.store_session(session))
    }

    async fn send_magic_link(&self, email: &str, _redirect_to: &str) -> FestaResult<()> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        let email = email.trim().to_lowercase();
        self.ensure_account(&email);
        self.magic_links.write().push(email);
        Ok(())
    }

    async fn sign_out(&self) -> FestaResult<()> {
        self.auth_calls.fetch_add(1, Ordering::Relaxed);
        *self.current.write() = None;
        Ok(())
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FestaResult<()> {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.objects
            .write()
            .insert(object_key(bucket, path), bytes);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("mock://storage/{bucket}/{path}")
    }

    async fn subscribe(&self, table: Table, change: ChangeKind) -> FestaResult<ChangeFeed> {
        let tx = {
            let mut feeds = self.feeds.write();
            feeds
                .entry((table, change))
                .or_insert_with(|| broadcast::channel(FEED_CHANNEL_CAPACITY).0)
                .clone()
        };
        let mut source = tx.subscribe();
        let (out_tx, out_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(row) => {
                        if out_tx.send(row).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "mock feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(ChangeFeed::new(out_rx, FeedGuard::new(task)))
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{bucket}/{path}")
}

fn mock_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Overlay `patch`'s fields onto `target`. Both must be objects.
fn merge_patch(target: &mut Row, patch: &Row) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Column comparison for mock-side ordering. Nulls and missing columns
/// sort first.
fn compare_columns(a: &Row, b: &Row, column: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering as O;

    let a = a.get(column).unwrap_or(&Row::Null);
    let b = b.get(column).unwrap_or(&Row::Null);
    match (a, b) {
        (Row::Number(x), Row::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(O::Equal),
        (Row::String(x), Row::String(y)) => x.cmp(y),
        (Row::Bool(x), Row::Bool(y)) => x.cmp(y),
        (Row::Null, Row::Null) => O::Equal,
        (Row::Null, _) => O::Less,
        (_, Row::Null) => O::Greater,
        _ => O::Equal,
    }
}
