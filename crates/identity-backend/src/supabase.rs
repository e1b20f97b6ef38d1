//! Supabase implementation of the identity backend.
//!
//! Talks to GoTrue (`/auth/v1/*`) for tokens and users and to PostgREST
//! (`/rest/v1/profiles`) for extended profiles. The current session is kept
//! in memory; every change is announced on the session event channel the
//! same way the hosted client libraries do.

use crate::{
    BackendError, BackendResult, IdentityBackend, Profile, ProfileSource, Session, SessionEvent,
    SignIn, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Token endpoint response (password and refresh grants).
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Map<String, Value>,
}

/// GoTrue error body. Newer servers send `error_code`/`msg`, older ones
/// `error`/`error_description`.
#[derive(Debug, Default, Deserialize)]
struct GoTrueError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Row of the `profiles` table.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default, alias = "full_name")]
    display_name: Option<String>,
    #[serde(default, alias = "username")]
    handle: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default, alias = "language")]
    locale: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl From<ProfileRow> for User {
    fn from(row: ProfileRow) -> Self {
        User::new(row.id).with_profile(Profile {
            display_name: row.display_name,
            handle: row.handle,
            avatar_url: row.avatar_url,
            bio: row.bio,
            locale: row.locale,
            role: row.role,
        })
    }
}

fn metadata_string(metadata: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| metadata.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Profile attributes carried in GoTrue user metadata.
fn profile_from_metadata(user: &GoTrueUser) -> Profile {
    let metadata = &user.user_metadata;
    Profile {
        display_name: metadata_string(metadata, &["full_name", "name", "display_name"]),
        handle: metadata_string(metadata, &["user_name", "preferred_username", "handle"])
            .or_else(|| {
                user.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(String::from)
            }),
        avatar_url: metadata_string(metadata, &["avatar_url", "picture"]),
        bio: metadata_string(metadata, &["bio"]),
        locale: metadata_string(metadata, &["locale", "language"]),
        role: metadata_string(metadata, &["role"]),
    }
}

fn session_from_token(data: TokenResponse, now: DateTime<Utc>) -> Session {
    let expires_at = data
        .expires_at
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| data.expires_in.map(|secs| now + Duration::seconds(secs)));
    let metadata = profile_from_metadata(&data.user);

    Session {
        access_token: data.access_token,
        refresh_token: data.refresh_token,
        user_id: data.user.id,
        issued_at: now,
        expires_at,
        user_metadata: metadata,
    }
}

/// Map a failed GoTrue response to a typed error.
fn classify_failure(status: StatusCode, body: &str) -> BackendError {
    let parsed: GoTrueError = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_code
        .or(parsed.error)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let message = parsed
        .msg
        .or(parsed.error_description)
        .unwrap_or_else(|| format!("HTTP {status}"));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return BackendError::Unavailable(message);
    }
    if code == "email_not_confirmed" || message.to_ascii_lowercase().contains("not confirmed") {
        return BackendError::UnconfirmedAccount(message);
    }
    if matches!(code.as_str(), "invalid_credentials" | "invalid_grant")
        || status == StatusCode::BAD_REQUEST
    {
        return BackendError::InvalidCredentials(message);
    }
    BackendError::Rejected(message)
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_connect() || e.is_timeout() {
        BackendError::Unavailable(e.to_string())
    } else {
        BackendError::Http(e)
    }
}

async fn failure_from_response(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body_len = body.len(), "Backend request failed");
    classify_failure(status, &body)
}

/// Supabase-backed identity backend.
pub struct SupabaseBackend {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseBackend {
    /// Create a backend for a Supabase project.
    ///
    /// # Arguments
    /// * `supabase_url` - Project URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - Publishable (anon) API key
    pub fn new(supabase_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http_client: Client::new(),
            supabase_url: supabase_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            current: Mutex::new(None),
            events,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, table)
    }

    fn current(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    fn replace_current(&self, session: Option<Session>) {
        *self.current.lock() = session;
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> BackendResult<Session> {
        let url = self.auth_url(&format!("token?grant_type={grant_type}"));
        debug!(url = %url, "Requesting token");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let data: TokenResponse = response.json().await.map_err(transport_error)?;
        Ok(session_from_token(data, Utc::now()))
    }

    /// Exchange the refresh token for a new session, replacing the current one.
    async fn refresh(&self, refresh_token: &str) -> BackendResult<Session> {
        let session = self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await?;
        info!(user_id = %session.user_id, "Session refreshed");
        self.replace_current(Some(session.clone()));
        self.emit(SessionEvent::Active(session.clone()));
        Ok(session)
    }
}

#[async_trait]
impl IdentityBackend for SupabaseBackend {
    async fn get_current_session(&self) -> BackendResult<Option<Session>> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            info!(user_id = %session.user_id, "Session expired without refresh token");
            self.replace_current(None);
            self.emit(SessionEvent::Cleared);
            return Ok(None);
        };

        match self.refresh(&refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "Refresh rejected, dropping session");
                self.replace_current(None);
                self.emit(SessionEvent::Cleared);
                Ok(None)
            }
        }
    }

    async fn get_user_by_token(&self, token: &str) -> BackendResult<Option<User>> {
        let url = self.auth_url("user");
        debug!(url = %url, "Resolving user from token");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(failure_from_response(response).await);
        }

        let user: GoTrueUser = response.json().await.map_err(transport_error)?;
        let profile = profile_from_metadata(&user);
        Ok(Some(User::new(user.id).with_profile(profile)))
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        secret: &str,
    ) -> BackendResult<SignIn> {
        let session = self
            .token_grant(
                "password",
                serde_json::json!({ "email": identifier, "password": secret }),
            )
            .await?;

        info!(user_id = %session.user_id, "Password sign-in succeeded");
        let user = session.minimal_user();
        self.replace_current(Some(session.clone()));
        self.emit(SessionEvent::Active(session.clone()));
        Ok(SignIn { session, user })
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let result = match self.current() {
            Some(session) => {
                let response = self
                    .http_client
                    .post(self.auth_url("logout"))
                    .header("apikey", &self.publishable_key)
                    .header("Authorization", format!("Bearer {}", session.access_token))
                    .send()
                    .await;
                match response {
                    Ok(r) if r.status().is_success() => Ok(()),
                    // Already gone server-side.
                    Ok(r) if matches!(r.status(), StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) => {
                        Ok(())
                    }
                    Ok(r) => Err(failure_from_response(r).await),
                    Err(e) => Err(transport_error(e)),
                }
            }
            None => Ok(()),
        };

        self.replace_current(None);
        self.emit(SessionEvent::Cleared);
        result
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn adopt_session(&self, session: &Session) {
        self.replace_current(Some(session.clone()));
    }
}

#[async_trait]
impl ProfileSource for SupabaseBackend {
    async fn fetch_profile(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> BackendResult<Option<User>> {
        let url = format!(
            "{}?id=eq.{}&select=*&limit=1",
            self.rest_url("profiles"),
            user_id
        );
        debug!(user_id = %user_id, "Fetching profile");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(failure_from_response(response).await);
        }

        let rows: Vec<ProfileRow> = response.json().await.map_err(transport_error)?;
        Ok(rows.into_iter().next().map(User::from))
    }
}
