use crate::domain::models::Credentials;
use crate::infrastructure::error::AuthError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const FALLBACK_MESSAGE: &str = "Something went wrong";

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<String, AuthError>;

    async fn register(&self, credentials: &Credentials) -> Result<(), AuthError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Serialize)]
struct CredentialsPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct LoginResponsePayload {
    token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct AuthErrorPayload {
    message: Option<String>,
}

impl ReqwestAuthClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, action: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(&format!("auth/{action}"))
            .map_err(|error| AuthError::Transport(format!("invalid auth url: {error}")))
    }

    async fn post_credentials(
        &self,
        action: &str,
        credentials: &Credentials,
    ) -> Result<String, AuthError> {
        let response = self
            .client
            .post(self.endpoint(action)?)
            .json(&CredentialsPayload {
                username: credentials.username.trim(),
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|error| AuthError::Transport(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            AuthError::Transport(format!("failed reading {action} response: {error}"))
        })?;

        if !status.is_success() {
            return Err(AuthError::InvalidCredentials(error_message(&body)));
        }
        Ok(body)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<AuthErrorPayload>(body)
        .ok()
        .and_then(|payload| payload.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[async_trait]
impl AuthClient for ReqwestAuthClient {
    async fn login(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let body = self.post_credentials("login", credentials).await?;
        let parsed = serde_json::from_str::<LoginResponsePayload>(&body).map_err(|error| {
            AuthError::Transport(format!("invalid login response payload: {error}; body={body}"))
        })?;
        parsed
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::MalformedToken("login response did not include token".to_string())
            })
    }

    async fn register(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.post_credentials("register", credentials).await?;
        Ok(())
    }
}
