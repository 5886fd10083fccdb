use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::AppError;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Stored with its `Bearer ` prefix.
    pub token: String,
    pub user_uuid: String,
}

impl Credentials {
    pub fn new(token: &str, user_uuid: &str) -> Self {
        Self {
            token: with_bearer(token.trim()),
            user_uuid: user_uuid.trim().to_string(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        with_bearer(&self.token)
    }

    pub fn masked_token(&self) -> String {
        let visible: String = self.token.chars().take(20).collect();
        format!("{}...", visible)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.masked_token())
            .field("user_uuid", &self.user_uuid)
            .finish()
    }
}

fn with_bearer(token: &str) -> String {
    if token.starts_with(BEARER_PREFIX) {
        token.to_string()
    } else {
        format!("{}{}", BEARER_PREFIX, token)
    }
}

/// Where the token and user uuid live between requests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>, AppError>;
    async fn save(&self, credentials: &Credentials) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>, AppError> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, credentials: &Credentials) -> Result<(), AppError> {
        *self.inner.write().await = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        *self.inner.write().await = None;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()))
    }

    pub async fn sign_in(&self, token: &str, user_uuid: &str) -> Result<Credentials, AppError> {
        if token.trim().is_empty() || user_uuid.trim().is_empty() {
            return Err(AppError::Validation(
                "Please enter both token and user uuid".to_string(),
            ));
        }
        let credentials = Credentials::new(token, user_uuid);
        self.store.save(&credentials).await?;
        info!("Stored credentials for {} ({})", credentials.user_uuid, credentials.masked_token());
        Ok(credentials)
    }

    pub async fn current(&self) -> Result<Option<Credentials>, AppError> {
        self.store.load().await
    }

    pub async fn require(&self) -> Result<Credentials, AppError> {
        self.store
            .load()
            .await?
            .ok_or(AppError::AuthenticationRequired)
    }

    pub async fn sign_out(&self) -> Result<(), AppError> {
        self.store.clear().await?;
        info!("Cleared stored credentials");
        Ok(())
    }

    /// Passes `result` through, dropping the stored credentials first when
    /// the API rejected them.
    pub async fn guard<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                warn!("Session rejected by the KATS API, clearing credentials");
                if let Err(clear_err) = self.store.clear().await {
                    error!("Failed to clear credentials: {}", clear_err);
                }
            }
        }
        result
    }
}
