use crate::domain::models::Credentials;
use crate::domain::session::{SessionState, SessionToken};
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::error::AuthError;
use crate::infrastructure::token_store::TokenStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    Explicit,
    Expired,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated { expires_at: DateTime<Utc> },
    Unauthenticated { reason: Option<LogoutReason> },
}

/// What the guarded transport needs from the session: a re-validated bearer
/// token, and a way to report that the backend refused it.
pub trait SessionAccess: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn handle_rejection(&self);
}

pub struct SessionGuard<S, C>
where
    S: TokenStore,
    C: AuthClient,
{
    token_store: Arc<S>,
    auth_client: Arc<C>,
    state: Mutex<SessionState>,
    status: watch::Sender<SessionStatus>,
    now_provider: NowProvider,
}

impl<S, C> SessionGuard<S, C>
where
    S: TokenStore,
    C: AuthClient,
{
    pub fn new(token_store: Arc<S>, auth_client: Arc<C>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unauthenticated { reason: None });
        Self {
            token_store,
            auth_client,
            state: Mutex::new(SessionState::Unauthenticated),
            status,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().is_authenticated()
    }

    pub fn startup(&self) -> Result<SessionState, AuthError> {
        let Some(raw) = self.token_store.load_token()? else {
            debug!("no persisted session token");
            self.clear(None);
            return Ok(SessionState::Unauthenticated);
        };

        match SessionToken::parse(&raw) {
            Ok(token) if token.is_valid_at((self.now_provider)()) => {
                info!(expires_at = %token.expires_at(), "restored persisted session");
                self.authenticate(token.clone());
                Ok(SessionState::Authenticated(token))
            }
            Ok(token) => {
                info!(expires_at = %token.expires_at(), "persisted session token has expired");
                self.clear(Some(LogoutReason::Expired));
                Ok(SessionState::Unauthenticated)
            }
            Err(error) => {
                warn!(%error, "discarding unreadable persisted session token");
                self.clear(None);
                Ok(SessionState::Unauthenticated)
            }
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionToken, AuthError> {
        credentials.validate().map_err(AuthError::InvalidCredentials)?;

        let raw = self.auth_client.login(credentials).await?;
        let token = SessionToken::parse(&raw)
            .map_err(|error| AuthError::MalformedToken(error.to_string()))?;
        if !token.is_valid_at((self.now_provider)()) {
            return Err(AuthError::MalformedToken(
                "login returned an already expired token".to_string(),
            ));
        }

        self.token_store.save_token(token.as_str())?;
        self.authenticate(token.clone());
        info!(username = %credentials.username.trim(), "logged in");
        Ok(token)
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<(), AuthError> {
        credentials.validate().map_err(AuthError::InvalidCredentials)?;
        self.auth_client.register(credentials).await?;
        info!(username = %credentials.username.trim(), "registered account");
        Ok(())
    }

    /// Removes the persisted token first; if that fails the session stays
    /// as it was so the caller can retry.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.token_store.delete_token()?;
        self.transition_to_unauthenticated(LogoutReason::Explicit);
        Ok(())
    }

    fn authenticate(&self, token: SessionToken) {
        let expires_at = token.expires_at();
        *self.lock_state() = SessionState::Authenticated(token);
        self.status
            .send_replace(SessionStatus::Authenticated { expires_at });
    }

    fn transition_to_unauthenticated(&self, reason: LogoutReason) {
        *self.lock_state() = SessionState::Unauthenticated;
        self.status.send_replace(SessionStatus::Unauthenticated {
            reason: Some(reason),
        });
    }

    fn clear(&self, reason: Option<LogoutReason>) {
        *self.lock_state() = SessionState::Unauthenticated;
        self.status
            .send_replace(SessionStatus::Unauthenticated { reason });
        if let Err(error) = self.token_store.delete_token() {
            warn!(%error, "failed to clear persisted session token");
        }
    }

    fn force_logout(&self, reason: LogoutReason) {
        warn!(?reason, "session ended without user action");
        self.clear(Some(reason));
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, C> SessionAccess for SessionGuard<S, C>
where
    S: TokenStore,
    C: AuthClient,
{
    fn access_token(&self) -> Option<String> {
        let now = (self.now_provider)();
        let expired = {
            let state = self.lock_state();
            match &*state {
                SessionState::Authenticated(token) if token.is_valid_at(now) => {
                    return Some(token.as_str().to_string());
                }
                SessionState::Authenticated(_) => true,
                SessionState::Unauthenticated => false,
            }
        };
        if expired {
            self.force_logout(LogoutReason::Expired);
        }
        None
    }

    fn handle_rejection(&self) {
        self.force_logout(LogoutReason::Rejected);
    }
}
