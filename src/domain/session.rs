use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed session token: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    exp: Option<i64>,
}

/// Bearer credential issued by the auth service. The expiry is read from the
/// `exp` claim of the token's payload segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    raw: String,
    expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let raw = raw.trim();
        let mut segments = raw.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|error| TokenError::Malformed(format!("payload is not base64url: {error}")))?;
        let claims: TokenClaims = serde_json::from_slice(&decoded).map_err(|error| {
            TokenError::Malformed(format!("payload is not a claim set: {error}"))
        })?;
        let exp = claims
            .exp
            .ok_or_else(|| TokenError::Malformed("missing exp claim".to_string()))?;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| TokenError::Malformed(format!("exp claim {exp} is out of range")))?;

        Ok(Self {
            raw: raw.to_string(),
            expires_at,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub fn is_token_valid(raw: Option<&str>, now: DateTime<Utc>) -> bool {
    raw.and_then(|raw| SessionToken::parse(raw).ok())
        .is_some_and(|token| token.is_valid_at(now))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(SessionToken),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": "1", "exp": expires_at.timestamp() })
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.signature")
}
