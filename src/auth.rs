//! Identity service client and the explicit session context.
//!
//! Sign-in, sign-up, sign-out, token refresh and privileged user creation go
//! to the project's GoTrue endpoint (`/auth/v1`). The signed-in identity is
//! held in a [`SessionContext`] that callers pass to every scoped operation;
//! listeners registered on it are told about sign-in, sign-out, token
//! refresh and role changes. Roles live in the `profiles` table and map to
//! a fixed capability set.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::AppConfig;
use crate::error::{BooksError, FieldError, Result};
use crate::models::{Profile, Role};
use crate::store::{friendly_error, remote_error, Query, StoreClient};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MIN_PASSWORD_LEN: usize = 8;
/// Refresh tokens this close to expiry before using them.
const REFRESH_MARGIN_SECS: i64 = 60;
/// Used when neither the response nor the token carries an expiry.
const DEFAULT_SESSION_SECS: i64 = 3600;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Add and delete own sales and costs.
    RecordEntries,
    /// Summary totals and daily reports.
    ViewDashboard,
    /// Full sales and cost report listings and their exports.
    ViewReports,
    ManageUsers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::RecordEntries => "record_entries",
            Capability::ViewDashboard => "view_dashboard",
            Capability::ViewReports => "view_reports",
            Capability::ManageUsers => "manage_users",
        })
    }
}

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::RecordEntries,
    Capability::ViewDashboard,
    Capability::ViewReports,
    Capability::ManageUsers,
];

const USER_CAPABILITIES: &[Capability] = &[Capability::RecordEntries, Capability::ViewDashboard];

pub fn capabilities_for(role: Role) -> &'static [Capability] {
    match role {
        Role::Admin => ADMIN_CAPABILITIES,
        Role::User => USER_CAPABILITIES,
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Email/password pair; the password is wiped on drop.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: Zeroizing::new(password.to_string()),
        }
    }

    /// Email shape and minimum password length, with per-field detail.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if !looks_like_email(&self.email) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BooksError::Validation(errors))
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// The identity record returned by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct Session {
    pub access_token: Zeroizing<String>,
    pub refresh_token: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
            .or_else(|| jwt_expiry(&self.access_token))
            .unwrap_or_else(|| now + Duration::seconds(DEFAULT_SESSION_SECS));
        Session {
            access_token: Zeroizing::new(self.access_token),
            refresh_token: Zeroizing::new(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// `exp` claim of an unverified JWT. The auth service already verified it;
/// this only schedules refreshes.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

// ---------------------------------------------------------------------------
// Identity service client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IdentityClient {
    http: Client,
    config: Arc<AppConfig>,
}

impl IdentityClient {
    pub fn new(config: Arc<AppConfig>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BooksError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub async fn sign_in_with_password(&self, creds: &Credentials) -> Result<Session> {
        let body = serde_json::json!({
            "email": creds.email,
            "password": creds.password.as_str(),
        });
        let req = self
            .post("token")
            .query(&[("grant_type", "password")])
            .bearer_auth(self.config.anon_key.as_str())
            .json(&body);
        let token: TokenResponse = serde_json::from_value(self.send(req).await?)?;
        let session = token.into_session(Utc::now());
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let req = self
            .post("token")
            .query(&[("grant_type", "refresh_token")])
            .bearer_auth(self.config.anon_key.as_str())
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let token: TokenResponse = serde_json::from_value(self.send(req).await?)?;
        Ok(token.into_session(Utc::now()))
    }

    /// Self-service registration. Depending on project settings the service
    /// answers with a bare user or a user wrapped in a session.
    pub async fn sign_up(&self, creds: &Credentials) -> Result<AuthUser> {
        creds.validate()?;
        let body = serde_json::json!({
            "email": creds.email,
            "password": creds.password.as_str(),
        });
        let req = self
            .post("signup")
            .bearer_auth(self.config.anon_key.as_str())
            .json(&body);
        let value = self.send(req).await?;
        let user = value.get("user").cloned().unwrap_or(value);
        Ok(serde_json::from_value(user)?)
    }

    pub async fn sign_out(&self, session: &Session) -> Result<()> {
        let req = self.post("logout").bearer_auth(session.access_token.as_str());
        self.send(req).await.map(|_| ())
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser> {
        let req = self
            .http
            .get(self.config.auth_url("user"))
            .header("apikey", self.config.anon_key.as_str())
            .bearer_auth(access_token);
        Ok(serde_json::from_value(self.send(req).await?)?)
    }

    /// Fails with the configuration error when no service role key is set.
    pub fn require_admin_api(&self) -> Result<()> {
        self.config.require_service_role_key().map(|_| ())
    }

    /// Create a pre-confirmed user with the service role key.
    pub async fn admin_create_user(&self, creds: &Credentials) -> Result<AuthUser> {
        let service_key = self.config.require_service_role_key()?;
        let body = serde_json::json!({
            "email": creds.email,
            "password": creds.password.as_str(),
            "email_confirm": true,
        });
        let req = self
            .http
            .post(self.config.auth_url("admin/users"))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .json(&body);
        Ok(serde_json::from_value(self.send(req).await?)?)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.config.auth_url(path))
            .header("apikey", self.config.anon_key.as_str())
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value> {
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.config.supabase_url, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.config.supabase_url, &e))?;
        if !status.is_success() {
            return Err(remote_error(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body_text)?)
    }
}

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { user_id: Uuid, role: Role },
    SignedOut,
    TokenRefreshed,
    RoleChanged { role: Role },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// A signed-in user: live session plus the profile row holding the role.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session: Session,
    pub profile: Profile,
}

/// What a scoped operation needs to act for the current user.
#[derive(Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub token: Zeroizing<String>,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Explicit holder of the current identity, passed to every operation that
/// acts for a user.
#[derive(Default)]
pub struct SessionContext {
    identity: Mutex<Option<Identity>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for identity changes.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// The current identity, or `None` when signed out or expired.
    pub fn current(&self) -> Option<Identity> {
        let guard = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|id| !id.session.is_expired(Utc::now()))
            .cloned()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.current().map(|id| id.profile)
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.current()
            .map(|id| capabilities_for(id.profile.role).contains(&capability))
            .unwrap_or(false)
    }

    /// Authorise one operation against the current identity.
    pub fn require(&self, capability: Capability) -> Result<Actor> {
        let identity = self.current().ok_or(BooksError::Unauthenticated)?;
        if !capabilities_for(identity.profile.role).contains(&capability) {
            warn!(
                user_id = %identity.profile.id,
                role = %identity.profile.role,
                %capability,
                "operation denied"
            );
            return Err(BooksError::Forbidden { capability });
        }
        Ok(Actor {
            user_id: identity.profile.id,
            role: identity.profile.role,
            token: identity.session.access_token.clone(),
        })
    }

    pub fn sign_in(&self, session: Session, profile: Profile) {
        let event = AuthEvent::SignedIn {
            user_id: profile.id,
            role: profile.role,
        };
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Identity { session, profile });
        self.emit(&event);
    }

    /// Drop the identity; returns the session that was active, if any.
    pub fn sign_out(&self) -> Option<Session> {
        let previous = self
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            self.emit(&AuthEvent::SignedOut);
        }
        previous.map(|id| id.session)
    }

    pub fn replace_session(&self, session: Session) {
        let replaced = {
            let mut guard = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(identity) if identity.profile.id == session.user.id => {
                    identity.session = session;
                    true
                }
                _ => false,
            }
        };
        if replaced {
            self.emit(&AuthEvent::TokenRefreshed);
        }
    }

    /// Apply a role change made to the signed-in user's own profile.
    pub fn update_role(&self, user_id: Uuid, role: Role) {
        let changed = {
            let mut guard = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(identity) if identity.profile.id == user_id && identity.profile.role != role => {
                    identity.profile.role = role;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(&AuthEvent::RoleChanged { role });
        }
    }

    fn emit(&self, event: &AuthEvent) {
        // Listeners run without the lock held so they may call back in.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn raw_session(&self) -> Option<Session> {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|id| id.session.clone())
    }
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// Load the role-bearing profile for a user.
pub async fn fetch_profile(store: &StoreClient, token: &str, user_id: Uuid) -> Result<Profile> {
    store
        .select_single(
            token,
            "profiles",
            &Query::new().select("id, email, role").eq("id", user_id),
            "profile",
        )
        .await
}

/// Sign in and populate `ctx`. A missing profile leaves the context signed
/// out and reports [`BooksError::NotFound`].
pub async fn sign_in(
    identity: &IdentityClient,
    store: &StoreClient,
    ctx: &SessionContext,
    creds: &Credentials,
) -> Result<Profile> {
    let session = identity.sign_in_with_password(creds).await?;
    let profile = match fetch_profile(store, &session.access_token, session.user.id).await {
        Ok(profile) => profile,
        Err(err) => {
            if let Err(logout_err) = identity.sign_out(&session).await {
                warn!(error = %logout_err, "sign-out after failed profile load failed");
            }
            return Err(err);
        }
    };
    ctx.sign_in(session, profile.clone());
    Ok(profile)
}

pub async fn sign_out(identity: &IdentityClient, ctx: &SessionContext) -> Result<()> {
    let Some(session) = ctx.sign_out() else {
        return Ok(());
    };
    info!(user_id = %session.user.id, "signing out");
    identity.sign_out(&session).await
}

/// Refresh the access token when it is about to expire. Returns whether a
/// refresh happened. A failed refresh signs the context out.
pub async fn refresh_if_needed(identity: &IdentityClient, ctx: &SessionContext) -> Result<bool> {
    let Some(session) = ctx.raw_session() else {
        return Ok(false);
    };
    if !session.needs_refresh(Utc::now()) {
        return Ok(false);
    }
    match identity.refresh_session(&session.refresh_token).await {
        Ok(fresh) => {
            ctx.replace_session(fresh);
            Ok(true)
        }
        Err(err) => {
            warn!(error = %err, "session refresh failed, signing out");
            ctx.sign_out();
            Err(err)
        }
    }
}
