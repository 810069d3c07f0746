//! REST client for the hosted backend.
//!
//! Three surfaces hang off one endpoint and publishable key:
//!
//! ```text
//! {url}/rest/v1/{table}     rows, PostgREST query grammar
//! {url}/auth/v1/...         token endpoints
//! {url}/storage/v1/...      object storage
//! ```
//!
//! Realtime is approximated by polling: [`HttpBackend::subscribe`] spawns a
//! task that re-queries past a watermark column every couple of seconds.
//! At this event's scale that is indistinguishable from a push channel and
//! needs no extra protocol.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::BackendConfig;
use crate::error::{FestaError, FestaResult};
use crate::types::UserId;

use super::{
    AuthSession, Backend, ChangeFeed, ChangeKind, FeedGuard, Filter, Order, Row, SelectQuery,
    Table, FEED_CHANNEL_CAPACITY,
};

/// How often subscription pollers re-query.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Rows fetched per poll. More than this in one interval means a very
/// lively party; the next tick catches up.
const POLL_PAGE: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the hosted service.
pub struct HttpBackend {
    http: Client,
    url: String,
    key: String,
    session: RwLock<Option<AuthSession>>,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> FestaResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            session: RwLock::new(None),
        })
    }

    /// Build from a detected-online configuration.
    pub fn from_config(config: &BackendConfig) -> FestaResult<Self> {
        let (url, key) = config.credentials().ok_or_else(|| {
            FestaError::InvalidOperation("backend credentials missing or placeholder".into())
        })?;
        Self::new(url, key)
    }

    /// Adopt a session obtained out of band, e.g. tokens the host app
    /// extracted from a magic link redirect.
    pub fn adopt_session(&self, session: AuthSession) {
        *self.session.write() = Some(session);
    }

    fn bearer(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|session| session.access_token.clone())
            .unwrap_or_else(|| self.key.clone())
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    fn query_pairs(query: &SelectQuery) -> Vec<(String, String)> {
        let mut pairs = filter_pairs(&query.filter);
        if let Some((column, order)) = &query.order {
            let direction = match order {
                Order::Ascending => "asc",
                Order::Descending => "desc",
            };
            pairs.push(("order".into(), format!("{column}.{direction}")));
        }
        if let Some(limit) = query.limit {
            pairs.push(("limit".into(), limit.to_string()));
        }
        pairs
    }

    fn store_session(&self, token: TokenResponse, anonymous: bool) -> AuthSession {
        let session = AuthSession {
            user_id: UserId::new(token.user.id),
            email: token.user.email,
            access_token: token.access_token,
            anonymous,
        };
        *self.session.write() = Some(session.clone());
        session
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn select(&self, table: Table, query: SelectQuery) -> FestaResult<Vec<Row>> {
        let resp = self
            .http
            .get(self.rest_url(table))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .query(&Self::query_pairs(&query))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn insert(&self, table: Table, row: Row) -> FestaResult<Row> {
        let resp = self
            .http
            .post(self.rest_url(table))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        let mut rows: Vec<Row> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| FestaError::Backend(format!("empty insert response from {table}")))
    }

    async fn update(&self, table: Table, patch: Row, filter: Filter) -> FestaResult<Vec<Row>> {
        let resp = self
            .http
            .patch(self.rest_url(table))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .header("Prefer", "return=representation")
            .query(&filter_pairs(&filter))
            .json(&patch)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn upsert(&self, table: Table, row: Row, conflict_column: &str) -> FestaResult<Row> {
        let resp = self
            .http
            .post(self.rest_url(table))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", conflict_column)])
            .json(&row)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        let mut rows: Vec<Row> = resp.json().await?;
        rows.pop()
            .ok_or_else(|| FestaError::Backend(format!("empty upsert response from {table}")))
    }

    async fn session(&self) -> FestaResult<Option<AuthSession>> {
        Ok(self.session.read().clone())
    }

    async fn sign_in_anonymously(&self) -> FestaResult<AuthSession> {
        // an empty signup body mints a credential-less identity
        let resp = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.key)
            .json(&json!({}))
            .send()
            .await?;
        let status = resp.status();
        if matches!(
            status,
            StatusCode::FORBIDDEN
                | StatusCode::NOT_FOUND
                | StatusCode::GONE
                | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            // the project has the anonymous provider switched off
            return Err(FestaError::AnonymousDisabled);
        }
        if !status.is_success() {
            return Err(read_error(resp).await);
        }
        let token: TokenResponse = resp.json().await?;
        Ok(self.store_session(token, true))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> FestaResult<AuthSession> {
        let resp = self
            .http
            .post(self.auth_url("token"))
            .header("apikey", &self.key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(FestaError::AuthRejected(body_text(resp).await));
        }
        if !status.is_success() {
            return Err(read_error(resp).await);
        }
        let token: TokenResponse = resp.json().await?;
        Ok(self.store_session(token, false))
    }

    async fn sign_up(&self, email: &str, password: &str) -> FestaResult<AuthSession> {
        let resp = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(FestaError::AuthRejected(body_text(resp).await));
        }
        if !status.is_success() {
            return Err(read_error(resp).await);
        }
        let token: TokenResponse = resp.json().await?;
        Ok(self.store_session(token, false))
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> FestaResult<()> {
        let resp = self
            .http
            .post(self.auth_url("magiclink"))
            .header("apikey", &self.key)
            .json(&json!({ "email": email, "redirect_to": redirect_to }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        Ok(())
    }

    async fn sign_out(&self) -> FestaResult<()> {
        let resp = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .send()
            .await;
        if let Err(error) = resp {
            tracing::warn!(%error, "logout request failed, dropping local session");
        }
        *self.session.write() = None;
        Ok(())
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> FestaResult<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.url, bucket, path);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.key)
            .bearer_auth(self.bearer())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, bucket, path)
    }

    async fn subscribe(&self, table: Table, change: ChangeKind) -> FestaResult<ChangeFeed> {
        let poller = Poller {
            http: self.http.clone(),
            url: self.url.clone(),
            key: self.key.clone(),
            bearer: self.bearer(),
            table,
            change,
        };
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let task = tokio::spawn(poller.run(tx));
        Ok(ChangeFeed::new(rx, FeedGuard::new(task)))
    }
}

/// Background task that approximates a realtime channel by re-querying
/// past a watermark: row `id` for inserts, `updated_at` for updates.
struct Poller {
    http: Client,
    url: String,
    key: String,
    bearer: String,
    table: Table,
    change: ChangeKind,
}

impl Poller {
    fn column(&self) -> &'static str {
        match self.change {
            ChangeKind::Insert => "id",
            ChangeKind::Update => "updated_at",
        }
    }

    async fn run(self, tx: mpsc::Sender<Row>) {
        // start past the current tail so history is not replayed
        let mut watermark = self.initial_watermark().await;
        let mut ticker = time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.fetch_newer(watermark).await {
                Ok(rows) => {
                    for row in rows {
                        if let Some(mark) = row.get(self.column()).and_then(Row::as_i64) {
                            watermark = watermark.max(mark);
                        }
                        if tx.send(row).await.is_err() {
                            return;
                        }
                    }
                }
                Err(error) => {
                    tracing::debug!(%error, table = %self.table, change = %self.change, "poll failed");
                }
            }
        }
    }

    async fn initial_watermark(&self) -> i64 {
        let column = self.column();
        let result = self
            .http
            .get(format!("{}/rest/v1/{}", self.url, self.table))
            .header("apikey", &self.key)
            .bearer_auth(&self.bearer)
            .query(&[
                ("order", format!("{column}.desc")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Vec<Row>>()
                .await
                .ok()
                .and_then(|rows| rows.first().and_then(|row| row.get(column)?.as_i64()))
                .unwrap_or(0),
            _ => 0,
        }
    }

    async fn fetch_newer(&self, watermark: i64) -> FestaResult<Vec<Row>> {
        let column = self.column();
        let resp = self
            .http
            .get(format!("{}/rest/v1/{}", self.url, self.table))
            .header("apikey", &self.key)
            .bearer_auth(&self.bearer)
            .query(&[
                (column, format!("gt.{watermark}")),
                ("order", format!("{column}.asc")),
                ("limit", POLL_PAGE.to_string()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        Ok(resp.json().await?)
    }
}

/// Render filter clauses in the `column=eq.value` query grammar. Strings
/// go bare, other scalars use their JSON form.
fn filter_pairs(filter: &Filter) -> Vec<(String, String)> {
    filter
        .clauses()
        .iter()
        .map(|(column, value)| {
            let rendered = match value {
                Row::String(s) => s.clone(),
                other => other.to_string(),
            };
            (column.clone(), format!("eq.{rendered}"))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

async fn body_text(resp: Response) -> String {
    resp.text().await.unwrap_or_default()
}

async fn read_error(resp: Response) -> FestaError {
    let status = resp.status();
    let body = body_text(resp).await;
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FestaError::AuthRejected(body),
        StatusCode::CONFLICT => FestaError::Conflict(body),
        _ => FestaError::Backend(format!("{status}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new("https://example.supabase.co/", "anon-key").unwrap()
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let http = backend();
        assert_eq!(
            http.rest_url(Table::Invites),
            "https://example.supabase.co/rest/v1/invites"
        );
        assert_eq!(
            http.auth_url("signup"),
            "https://example.supabase.co/auth/v1/signup"
        );
    }

    #[test]
    fn test_public_url_shape() {
        let http = backend();
        assert_eq!(
            http.public_url("event-photos", "u-1/2_festa.jpg"),
            "https://example.supabase.co/storage/v1/object/public/event-photos/u-1/2_festa.jpg"
        );
    }

    #[test]
    fn test_query_pairs_grammar() {
        let query = SelectQuery::new()
            .eq("status", "APPROVED")
            .eq("featured", true)
            .order_by("created_at", Order::Descending)
            .limit(50);
        let pairs = HttpBackend::query_pairs(&query);
        assert_eq!(
            pairs,
            vec![
                ("status".to_string(), "eq.APPROVED".to_string()),
                ("featured".to_string(), "eq.true".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_pairs_render_scalars_bare() {
        // strings must not keep their JSON quotes in the query grammar
        let pairs = filter_pairs(&Filter::new().eq("code", "G15-J01").eq("id", 7));
        assert_eq!(
            pairs,
            vec![
                ("code".to_string(), "eq.G15-J01".to_string()),
                ("id".to_string(), "eq.7".to_string()),
            ]
        );
    }

    #[test]
    fn test_bearer_prefers_session_token() {
        let http = backend();
        assert_eq!(http.bearer(), "anon-key");

        http.adopt_session(AuthSession {
            user_id: UserId::new("u-1"),
            email: None,
            access_token: "jwt".into(),
            anonymous: true,
        });
        assert_eq!(http.bearer(), "jwt");
    }

    #[test]
    fn test_poller_watermark_column() {
        let http = backend();
        let insert = Poller {
            http: http.http.clone(),
            url: http.url.clone(),
            key: http.key.clone(),
            bearer: http.bearer(),
            table: Table::Messages,
            change: ChangeKind::Insert,
        };
        assert_eq!(insert.column(), "id");

        let update = Poller {
            table: Table::ThemeConfig,
            change: ChangeKind::Update,
            ..insert
        };
        assert_eq!(update.column(), "updated_at");
    }
}
