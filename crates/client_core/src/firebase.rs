use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{AuthIdentity, Credentials},
    error::BackendError,
    protocol::{ErrorEnvelope, PasswordAuthRequest, PasswordAuthResponse, PushResponse},
};
use tracing::{debug, info};
use url::Url;

use crate::MeetupBackend;

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: Url,
    pub auth_url: Url,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl FirebaseConfig {
    pub fn new(database_url: Url, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let auth_url = Url::parse(DEFAULT_AUTH_URL)
            .map_err(|err| BackendError::unavailable(format!("invalid auth url: {err}")))?;
        Ok(Self {
            database_url,
            auth_url,
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

/// REST client for a Firebase-style realtime database plus password auth.
pub struct FirebaseBackend {
    http: Client,
    config: FirebaseConfig,
    id_token: RwLock<Option<String>>,
}

impl FirebaseBackend {
    pub fn new(config: FirebaseConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| BackendError::transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            config,
            id_token: RwLock::new(None),
        })
    }

    pub fn has_session_token(&self) -> bool {
        self.id_token.read().is_some()
    }

    fn collection_url(&self, collection: &str) -> Result<Url, BackendError> {
        let mut url = self.config.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::unavailable("database url cannot carry a path"))?
            .pop_if_empty()
            .push(&format!("{collection}.json"));
        if let Some(token) = self.id_token.read().as_deref() {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    fn auth_url(&self, verb: &str) -> Result<Url, BackendError> {
        let mut url = self.config.auth_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::unavailable("auth url cannot carry a path"))?
            .pop_if_empty()
            .push(&format!("accounts:{verb}"));
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    async fn password_auth(
        &self,
        verb: &str,
        credentials: &Credentials,
    ) -> Result<AuthIdentity, BackendError> {
        let url = self.auth_url(verb)?;
        let res = self
            .http
            .post(url)
            .json(&PasswordAuthRequest::from(credentials))
            .send()
            .await
            .map_err(request_error)?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.map_err(request_error)?;
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => envelope.into(),
                Err(_) => BackendError::Status { status, body },
            });
        }

        let body: PasswordAuthResponse = decode(res).await?;
        let identity = AuthIdentity::from(body);
        *self.id_token.write() = identity.id_token.clone();
        info!(uid = %identity.uid, verb, "firebase: password auth succeeded");
        Ok(identity)
    }
}

#[async_trait]
impl MeetupBackend for FirebaseBackend {
    async fn read(&self, collection: &str) -> Result<Option<Value>, BackendError> {
        let url = self.collection_url(collection)?;
        debug!(collection, "firebase: reading collection");
        let res = self.http.get(url).send().await.map_err(request_error)?;
        let value: Value = decode(ensure_success(res).await?).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn write(&self, collection: &str, record: Value) -> Result<String, BackendError> {
        let url = self.collection_url(collection)?;
        debug!(collection, "firebase: pushing record");
        let res = self
            .http
            .post(url)
            .json(&record)
            .send()
            .await
            .map_err(request_error)?;
        let pushed: PushResponse = decode(ensure_success(res).await?).await?;
        Ok(pushed.name)
    }

    async fn create_account(
        &self,
        credentials: &Credentials,
    ) -> Result<AuthIdentity, BackendError> {
        self.password_auth("signUp", credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthIdentity, BackendError> {
        self.password_auth("signInWithPassword", credentials).await
    }

    /// The REST API keeps no server-side session; dropping the token ends it.
    async fn sign_out(&self) -> Result<(), BackendError> {
        self.id_token.write().take();
        Ok(())
    }
}

async fn ensure_success(res: Response) -> Result<Response, BackendError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.map_err(request_error)?;
    Err(BackendError::Status { status, body })
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, BackendError> {
    let bytes = res.bytes().await.map_err(request_error)?;
    serde_json::from_slice(&bytes).map_err(|err| BackendError::decode(err.to_string()))
}

fn request_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::decode(err.to_string())
    } else {
        BackendError::transport(err.to_string())
    }
}

#[cfg(test)]
#[path = "tests/firebase_tests.rs"]
mod tests;
