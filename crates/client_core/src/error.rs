use std::fmt;

use serde::{Deserialize, Serialize};
use shared::error::BackendError;
use thiserror::Error;

/// The store's actions, used to tag statuses and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LoadMeetups,
    CreateMeetup,
    SignUp,
    SignIn,
    Logout,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::LoadMeetups,
        ActionKind::CreateMeetup,
        ActionKind::SignUp,
        ActionKind::SignIn,
        ActionKind::Logout,
    ];

    /// Whether a pending call of this kind counts towards `Store::loading`.
    pub fn shows_loading(self) -> bool {
        matches!(self, Self::LoadMeetups | Self::SignUp | Self::SignIn)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LoadMeetups => "load meetups",
            Self::CreateMeetup => "create meetup",
            Self::SignUp => "sign up",
            Self::SignIn => "sign in",
            Self::Logout => "logout",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} failed: {source}")]
    Backend {
        kind: ActionKind,
        source: BackendError,
    },
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("malformed meetup catalog: {0}")]
    MalformedCatalog(String),
}

impl StoreError {
    pub fn backend(kind: ActionKind, source: BackendError) -> Self {
        Self::Backend { kind, source }
    }

    /// The action whose failure produced this error.
    pub fn category(&self) -> ActionKind {
        match self {
            Self::Backend { kind, .. } => *kind,
            Self::NotSignedIn => ActionKind::CreateMeetup,
            Self::MalformedCatalog(_) => ActionKind::LoadMeetups,
        }
    }

    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}
