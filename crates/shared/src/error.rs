use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorCode {
    EmailExists,
    EmailNotFound,
    InvalidPassword,
    InvalidCredentials,
    InvalidEmail,
    WeakPassword,
    UserDisabled,
    TooManyAttempts,
    Unknown,
}

impl AuthErrorCode {
    /// Maps the auth service's message code (`EMAIL_EXISTS`,
    /// `WEAK_PASSWORD : Password should be ...`) onto a known variant.
    pub fn from_service_message(message: &str) -> Self {
        let code = message.split(" : ").next().unwrap_or_default().trim();
        match code {
            "EMAIL_EXISTS" => Self::EmailExists,
            "EMAIL_NOT_FOUND" => Self::EmailNotFound,
            "INVALID_PASSWORD" => Self::InvalidPassword,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredentials,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "USER_DISABLED" => Self::UserDisabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            _ => Self::Unknown,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::EmailExists => "an account already exists for this email",
            Self::EmailNotFound | Self::InvalidPassword | Self::InvalidCredentials => {
                "email or password is incorrect"
            }
            Self::InvalidEmail => "email address is malformed",
            Self::WeakPassword => "password is too weak",
            Self::UserDisabled => "this account has been disabled",
            Self::TooManyAttempts => "too many attempts, try again later",
            Self::Unknown => "authentication failed",
        }
    }
}

/// Failure reported by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("auth rejected ({code:?}): {message}")]
    Auth { code: AuthErrorCode, message: String },
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {message}")]
    Transport { message: String },
    #[error("undecodable backend response: {message}")]
    Decode { message: String },
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn auth(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self::Auth {
            code,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
