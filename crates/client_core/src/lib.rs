use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{AuthIdentity, Credentials},
    error::BackendError,
};

pub mod catalog;
pub mod error;
mod firebase;
mod store;

pub use error::{ActionKind, StoreError};
pub use firebase::{FirebaseBackend, FirebaseConfig, DEFAULT_AUTH_URL};
pub use store::{ActionActivity, ActionStatus, Store, StoreEvent, StoreState};

/// Collection holding the meetup records.
pub const MEETUP_COLLECTION: &str = "meetup";

/// Backend-as-a-service collaborator the store delegates durability and
/// identity to.
#[async_trait]
pub trait MeetupBackend: Send + Sync {
    /// Reads a whole collection as a keyed mapping; `None` when it is empty.
    async fn read(&self, collection: &str) -> Result<Option<Value>, BackendError>;
    /// Appends a record and returns the key the backend generated for it.
    async fn write(&self, collection: &str, record: Value) -> Result<String, BackendError>;
    async fn create_account(&self, credentials: &Credentials)
        -> Result<AuthIdentity, BackendError>;
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthIdentity, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
}

pub struct MissingBackend;

#[async_trait]
impl MeetupBackend for MissingBackend {
    async fn read(&self, collection: &str) -> Result<Option<Value>, BackendError> {
        Err(BackendError::unavailable(format!(
            "no backend configured to read {collection}"
        )))
    }

    async fn write(&self, collection: &str, _record: Value) -> Result<String, BackendError> {
        Err(BackendError::unavailable(format!(
            "no backend configured to write {collection}"
        )))
    }

    async fn create_account(
        &self,
        _credentials: &Credentials,
    ) -> Result<AuthIdentity, BackendError> {
        Err(BackendError::unavailable("no auth backend configured"))
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<AuthIdentity, BackendError> {
        Err(BackendError::unavailable("no auth backend configured"))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Err(BackendError::unavailable("no auth backend configured"))
    }
}
