/// FarmCert session client
///
/// Holds the current token pair and user snapshot in a [`SessionStore`] and
/// recovers from an expired access token by rotating the pair once and
/// resending the original request.

pub mod config;
pub mod error;
pub mod store;

pub use config::{ClientConfig, SessionTtl};
pub use error::{ClientError, ClientResult};
pub use store::{FileSessionStore, MemorySessionStore, SessionSnapshot, SessionStore};

use crate::{
    account::{
        AuthResponse, CreateAdminRequest, LoginRequest, MessageResponse, RegisterRequest, Tokens,
        User,
    },
    auth::BOOTSTRAP_HEADER,
    db::{CertificationStatus, Role},
    error::ErrorResponse,
    farmers::{FarmerStatus, UpdateStatusRequest},
};
use reqwest::{Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt, sync::Arc};

/// Callback invoked once the session can no longer be recovered
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// Client-side session state
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticated(User),
}

/// Landing route for a signed-in user
pub fn home_path(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin/dashboard",
        Role::Farmer => "/dashboard",
    }
}

/// HTTP client with persistent session handling
#[derive(Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    on_session_expired: Option<SessionExpiredHook>,
}

impl fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Create a new session client
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> ClientResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("farmcert-client/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            config,
            store,
            on_session_expired: None,
        })
    }

    /// Register the callback run when refresh fails and the session is dropped
    pub fn on_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    /// Register a farmer account and start its session
    pub async fn register(&self, req: &RegisterRequest) -> ClientResult<User> {
        let response: AuthResponse = self.send_public(Method::POST, "/auth/register", req).await?;
        self.start_session(response).await
    }

    /// Log in and start a session
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.send_public(Method::POST, "/auth/login", &req).await?;
        self.start_session(response).await
    }

    /// Create an admin account. The current session is left untouched.
    ///
    /// With a bootstrap token the request is sent without the session's credentials.
    pub async fn create_admin(
        &self,
        req: &CreateAdminRequest,
        bootstrap_token: Option<&str>,
    ) -> ClientResult<AuthResponse> {
        match bootstrap_token {
            Some(token) => {
                let response = self
                    .http
                    .post(self.config.url("/auth/admin"))
                    .header(BOOTSTRAP_HEADER, token)
                    .json(req)
                    .send()
                    .await?;
                decode(response).await
            }
            None => self.send(Method::POST, "/auth/admin", Some(req)).await,
        }
    }

    /// End the session. Local state is cleared even when the server call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        let remote: ClientResult<MessageResponse> =
            self.send(Method::POST, "/auth/logout", None::<&()>).await;
        if let Err(e) = remote {
            tracing::warn!(error = %e, "logout request failed; clearing local session anyway");
        }

        self.store.clear().await
    }

    /// Rotate the token pair explicitly
    pub async fn refresh(&self) -> ClientResult<Tokens> {
        let refresh_token = self
            .store
            .load()
            .await?
            .refresh_token
            .ok_or(ClientError::SessionExpired)?;

        self.recover(&refresh_token).await
    }

    /// Fresh profile of the signed-in user; the stored snapshot is updated
    pub async fn my_profile(&self) -> ClientResult<User> {
        let user: User = self.send(Method::GET, "/farmers/me", None::<&()>).await?;
        self.store.save_user(&user, &self.config.ttl).await?;
        Ok(user)
    }

    /// Certification status of one farmer
    pub async fn farmer_status(&self, farmer_id: &str) -> ClientResult<FarmerStatus> {
        self.send(
            Method::GET,
            &format!("/farmers/{}/status", farmer_id),
            None::<&()>,
        )
        .await
    }

    /// Certification status of the signed-in farmer
    pub async fn my_status(&self) -> ClientResult<FarmerStatus> {
        let user = self
            .store
            .load()
            .await?
            .user
            .ok_or(ClientError::SessionExpired)?;

        self.farmer_status(&user.id).await
    }

    /// All farmers (admin)
    pub async fn list_farmers(&self) -> ClientResult<Vec<User>> {
        self.send(Method::GET, "/farmers", None::<&()>).await
    }

    /// Set a farmer's certification status (admin)
    pub async fn update_farmer_status(
        &self,
        farmer_id: &str,
        status: CertificationStatus,
    ) -> ClientResult<User> {
        self.send(
            Method::PATCH,
            &format!("/farmers/{}/status", farmer_id),
            Some(&UpdateStatusRequest { status }),
        )
        .await
    }

    /// Current state from the persisted snapshot
    pub async fn state(&self) -> ClientResult<SessionState> {
        let snapshot = self.store.load().await?;
        Ok(match snapshot.user {
            Some(user) if snapshot.access_token.is_some() || snapshot.refresh_token.is_some() => {
                SessionState::Authenticated(user)
            }
            _ => SessionState::Anonymous,
        })
    }

    /// Start-up restore: leftovers of an unrecoverable session are discarded
    pub async fn restore(&self) -> ClientResult<SessionState> {
        let state = self.state().await?;
        if state == SessionState::Anonymous {
            self.store.clear().await?;
        }

        tracing::debug!(
            authenticated = matches!(state, SessionState::Authenticated(_)),
            "session restored"
        );
        Ok(state)
    }

    async fn start_session(&self, response: AuthResponse) -> ClientResult<User> {
        self.store
            .save_tokens(&response.tokens, &self.config.ttl)
            .await?;
        self.store.save_user(&response.user, &self.config.ttl).await?;
        Ok(response.user)
    }

    /// Unauthenticated request; a 401 here is a plain answer, never a refresh trigger
    async fn send_public<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .request(method, self.config.url(path))
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    /// Authenticated request with one refresh-and-retry on 401
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut retried = false;

        loop {
            let session = self.store.load().await?;

            let mut request = self.http.request(method.clone(), self.config.url(path));
            if let Some(token) = &session.access_token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                if let Some(refresh_token) = session.refresh_token {
                    retried = true;
                    tracing::debug!(path, "access token rejected, refreshing");
                    self.recover(&refresh_token).await?;
                    continue;
                }
            }

            return decode(response).await;
        }
    }

    /// Rotate the pair; on any failure drop the session and fire the hook
    async fn recover(&self, refresh_token: &str) -> ClientResult<Tokens> {
        match self.request_refresh(refresh_token).await {
            Ok(tokens) => {
                self.store.save_tokens(&tokens, &self.config.ttl).await?;
                Ok(tokens)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, ending session");
                if let Err(e) = self.store.clear().await {
                    tracing::error!(error = %e, "failed to clear session store");
                }
                if let Some(hook) = &self.on_session_expired {
                    hook();
                }
                Err(ClientError::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> ClientResult<Tokens> {
        let response = self
            .http
            .post(self.config.url("/auth/refresh"))
            .bearer_auth(refresh_token)
            .send()
            .await?;
        decode(response).await
    }
}

/// Decode a success body, or turn the error body into [`ClientError::Api`]
async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_path_by_role() {
        assert_eq!(home_path(Role::Admin), "/admin/dashboard");
        assert_eq!(home_path(Role::Farmer), "/dashboard");
    }

    #[tokio::test]
    async fn test_state_follows_store() {
        let store = Arc::new(MemorySessionStore::new());
        let client = SessionClient::new(ClientConfig::new("http://127.0.0.1:9/api"), store.clone())
            .unwrap();
        assert_eq!(client.state().await.unwrap(), SessionState::Anonymous);

        let now = chrono::Utc::now();
        let user = User {
            id: "u1".to_string(),
            email: "f@x.com".to_string(),
            name: "F".to_string(),
            farm_size: None,
            crop_type: None,
            role: Role::Farmer,
            status: CertificationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let ttl = SessionTtl::default();
        store.save_user(&user, &ttl).await.unwrap();
        // A user without any token is not a session
        assert_eq!(client.restore().await.unwrap(), SessionState::Anonymous);
        assert!(store.load().await.unwrap().user.is_none());

        store.save_user(&user, &ttl).await.unwrap();
        store
            .save_tokens(
                &Tokens {
                    access_token: "a".to_string(),
                    refresh_token: "r".to_string(),
                },
                &ttl,
            )
            .await
            .unwrap();
        assert_eq!(
            client.restore().await.unwrap(),
            SessionState::Authenticated(user)
        );
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_unreachable() {
        let store = Arc::new(MemorySessionStore::new());
        // Port 9 (discard) is not listening; the remote call fails
        let client = SessionClient::new(ClientConfig::new("http://127.0.0.1:9/api"), store.clone())
            .unwrap();
        store
            .save_tokens(
                &Tokens {
                    access_token: "a".to_string(),
                    refresh_token: "r".to_string(),
                },
                &SessionTtl::default(),
            )
            .await
            .unwrap();

        client.logout().await.unwrap();
        assert_eq!(store.load().await.unwrap(), SessionSnapshot::default());
    }
}
