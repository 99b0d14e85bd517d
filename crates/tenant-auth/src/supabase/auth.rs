//! GoTrue-backed identity provider with an in-memory session.

use super::{endpoint, summarize_response_body};
use crate::error::ProviderError;
use crate::session_store::{AuthChange, IdentityProvider, SessionEvent};
use crate::types::{Session, SignUpMetadata, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sessions this close to expiry are refreshed before being handed out.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a SignUpMetadata,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a session when email confirmation is off, otherwise
/// with the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    PendingConfirmation(User),
}

/// Both GoTrue error shapes: `{error, error_description}` and
/// `{error_code, msg, code}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

fn parse_error_body(status: u16, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or(parsed.error);
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .unwrap_or_else(|| format!("HTTP {status}"));
    ProviderError::rejected(Some(status), code, message)
}

async fn rejection(response: Response, operation: &'static str) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = parse_error_body(status.as_u16(), &body);
    warn!(
        status = %status,
        code = error.code.as_deref(),
        body_summary = %summarize_response_body(&body),
        "{operation} rejected by auth server"
    );
    error
}

/// Identity provider speaking to Supabase Auth (GoTrue).
///
/// The current session lives in memory only. Every change is emitted on a
/// broadcast channel.
pub struct SupabaseAuth {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
}

impl SupabaseAuth {
    pub fn new(supabase_url: &str, publishable_key: &str) -> Self {
        Self::with_client(Client::new(), supabase_url, publishable_key)
    }

    pub fn with_client(http_client: Client, supabase_url: &str, publishable_key: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http_client,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            session: Mutex::new(None),
            events,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        endpoint(&self.supabase_url, &format!("auth/v1/{path}"))
    }

    /// The in-memory session, without refreshing it.
    pub fn current(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Seed the provider with a previously obtained session.
    pub fn restore_session(&self, session: Option<Session>) {
        debug!(
            user_id = session.as_ref().map(Session::subject),
            "Restoring session"
        );
        self.replace(session, SessionEvent::InitialSession);
    }

    /// Exchange the refresh token for a new session.
    ///
    /// A session the server refuses to refresh is cleared and `SignedOut` is
    /// emitted. Transport failures leave it in place.
    pub async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(current) = self.current() else {
            return Ok(None);
        };
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            warn!(user_id = %current.subject(), "Session cannot be refreshed, clearing it");
            self.replace(None, SessionEvent::SignedOut);
            return Ok(None);
        };

        let url = self.auth_url("token?grant_type=refresh_token");
        debug!(url = %url, "Refreshing session");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let error = rejection(response, "Token refresh").await;
            if error.status.is_some_and(|status| status < 500 && status != 429) {
                self.replace(None, SessionEvent::SignedOut);
            }
            return Err(error);
        }

        let token: TokenResponse = response.json().await?;
        let session = token.into_session(Utc::now());
        info!(user_id = %session.subject(), "Session refreshed");
        self.replace(Some(session.clone()), SessionEvent::TokenRefreshed);
        Ok(Some(session))
    }

    fn replace(&self, session: Option<Session>, event: SessionEvent) {
        *self.session.lock() = session.clone();
        // No subscribers is fine
        let _ = self.events.send(AuthChange::new(event, session));
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.current() else {
            return Ok(None);
        };

        if session.is_expired_at(Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS)) {
            debug!(user_id = %session.subject(), "Session expired, refreshing before use");
            return self.refresh_session().await;
        }

        Ok(Some(session))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(), ProviderError> {
        let url = self.auth_url("token?grant_type=password");
        debug!(url = %url, "Attempting email/password sign-in");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Sign-in").await);
        }

        let token: TokenResponse = response.json().await?;
        let session = token.into_session(Utc::now());
        info!(user_id = %session.subject(), "Signed in");
        self.replace(Some(session), SessionEvent::SignedIn);
        Ok(())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<(), ProviderError> {
        let url = self.auth_url("signup");
        debug!(url = %url, "Attempting sign-up");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.publishable_key)
            .json(&SignUpRequest {
                email,
                password,
                data: metadata,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Sign-up").await);
        }

        match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                info!(user_id = %session.subject(), "Signed up and signed in");
                self.replace(Some(session), SessionEvent::SignedIn);
            }
            SignUpResponse::PendingConfirmation(user) => {
                info!(user_id = %user.id, "Signed up, email confirmation pending");
            }
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let access_token = self.access_token();
        self.replace(None, SessionEvent::SignedOut);
        info!("Signed out locally");

        let Some(access_token) = access_token else {
            return Ok(());
        };

        let response = self
            .http_client
            .post(self.auth_url("logout"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {access_token}"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, "Sign-out").await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    fn session(expires_at: Option<DateTime<Utc>>, refresh_token: Option<&str>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at,
            user: User {
                id: "u1".to_string(),
                email: Some("u1@example.com".to_string()),
            },
        }
    }

    fn offline_auth() -> SupabaseAuth {
        // Nothing listens here; tests must not reach the network
        SupabaseAuth::new("http://127.0.0.1:9", "publishable")
    }

    #[test]
    fn parses_legacy_error_shape() {
        let error = parse_error_body(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(error.status, Some(400));
        assert_eq!(error.code.as_deref(), Some("invalid_grant"));
        assert_eq!(AuthError::from(error), AuthError::InvalidCredentials);
    }

    #[test]
    fn parses_current_error_shape() {
        let error = parse_error_body(
            422,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert_eq!(error.code.as_deref(), Some("user_already_exists"));
        assert_eq!(error.message, "User already registered");
        assert_eq!(AuthError::from(error), AuthError::AlreadyRegistered);
    }

    #[test]
    fn unparseable_error_body_keeps_status() {
        let error = parse_error_body(502, "<html>Bad gateway</html>");
        assert_eq!(error.message, "HTTP 502");
        assert!(AuthError::from(error).is_transient());
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let now = Utc::now();
        let token: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "a",
                "refresh_token": "r",
                "expires_in": 3600,
                "expires_at": 1700000000,
                "user": { "id": "u1", "email": "u1@example.com", "aud": "authenticated" }
            }"#,
        )
        .unwrap();
        let session = token.into_session(now);
        assert_eq!(session.expires_at, DateTime::from_timestamp(1_700_000_000, 0));
        assert_eq!(session.subject(), "u1");

        let token: TokenResponse = serde_json::from_str(
            r#"{ "access_token": "a", "expires_in": 60, "user": { "id": "u2" } }"#,
        )
        .unwrap();
        assert_eq!(
            token.into_session(now).expires_at,
            Some(now + Duration::seconds(60))
        );
    }

    #[test]
    fn sign_up_response_distinguishes_pending_confirmation() {
        let pending: SignUpResponse =
            serde_json::from_str(r#"{ "id": "u1", "email": "u1@example.com" }"#).unwrap();
        assert!(matches!(pending, SignUpResponse::PendingConfirmation(_)));

        let signed_in: SignUpResponse = serde_json::from_str(
            r#"{ "access_token": "a", "refresh_token": "r", "user": { "id": "u1" } }"#,
        )
        .unwrap();
        assert!(matches!(signed_in, SignUpResponse::Session(_)));
    }

    #[tokio::test]
    async fn restore_session_emits_initial_session() {
        let auth = offline_auth();
        let mut events = auth.subscribe();

        auth.restore_session(Some(session(None, Some("r"))));

        let change = events.recv().await.unwrap();
        assert_eq!(change.event, SessionEvent::InitialSession);
        assert_eq!(change.subject(), Some("u1"));
        assert_eq!(auth.access_token().as_deref(), Some("access"));
    }

    #[tokio::test]
    async fn get_session_returns_valid_session_without_refresh() {
        let auth = offline_auth();
        auth.restore_session(Some(session(
            Some(Utc::now() + Duration::hours(1)),
            Some("r"),
        )));

        let current = auth.get_session().await.unwrap();
        assert_eq!(current.map(|s| s.user.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn expired_session_without_refresh_token_is_cleared() {
        let auth = offline_auth();
        auth.restore_session(Some(session(
            Some(Utc::now() - Duration::minutes(1)),
            None,
        )));
        let mut events = auth.subscribe();

        assert_eq!(auth.get_session().await, Ok(None));
        assert_eq!(events.recv().await.unwrap().event, SessionEvent::SignedOut);
        assert!(auth.current().is_none());
    }

    #[tokio::test]
    async fn sign_out_without_session_clears_and_emits() {
        let auth = offline_auth();
        let mut events = auth.subscribe();

        auth.sign_out().await.unwrap();

        let change = events.recv().await.unwrap();
        assert_eq!(change.event, SessionEvent::SignedOut);
        assert!(change.session.is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_locally_even_when_server_is_unreachable() {
        let auth = offline_auth();
        auth.restore_session(Some(session(None, Some("r"))));
        let mut events = auth.subscribe();

        let result = auth.sign_out().await;

        assert!(result.is_err_and(|error| error.transport));
        assert!(auth.current().is_none());
        assert_eq!(events.recv().await.unwrap().event, SessionEvent::SignedOut);
    }
}
