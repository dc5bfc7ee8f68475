use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
}

/// Classified failure of a call to the appointment backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("scheduling conflict: {message}")]
    Conflict { message: String },
    #[error("credential rejected by backend")]
    Unauthorized,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Auth transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Storage(#[from] InfraError),
}

impl BackendError {
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            409 => Self::Conflict {
                message: message
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| "Appointment conflict detected".to_string()),
            },
            _ => Self::Other(match message {
                Some(message) if !message.trim().is_empty() => {
                    format!("appointment api error: http {status}; {message}")
                }
                _ => format!("appointment api error: http {status}"),
            }),
        }
    }
}
