//! Secret store port
//!
//! Delivery credentials for the mailer are resolved through this port so
//! tests and local runs can feed them from the environment while a real
//! deployment can back it with a managed secret service.

use async_trait::async_trait;
use tabload_common::{PipelineError, Result};

/// Secret name for the mail provider API key.
pub const MAIL_API_KEY: &str = "MAIL_API_KEY";

/// Secret name for the sender address.
pub const MAIL_FROM_ADDRESS: &str = "MAIL_FROM_ADDRESS";

/// Collaborator port for secret resolution.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<String>;
}

/// Environment-backed secret store. Secret names map directly to
/// environment variable names.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, name: &str) -> Result<String> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(PipelineError::Secret(format!("secret {} is not set", name))),
        }
    }
}

/// Mail delivery credentials, loaded at most once per process.
#[derive(Debug, Clone)]
pub struct DeliveryCredentials {
    pub api_key: String,
    pub from_address: String,
}

impl DeliveryCredentials {
    pub async fn load(store: &dyn SecretStore) -> Result<Self> {
        Ok(Self {
            api_key: store.get(MAIL_API_KEY).await?,
            from_address: store.get(MAIL_FROM_ADDRESS).await?,
        })
    }
}
