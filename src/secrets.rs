use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::config::{Config, SecretsBackend};

pub struct SecretsManager {
    client: VaultClient,
    kv_mount: String,
}

impl SecretsManager {
    pub async fn new() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount = env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "auth/approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }

    /// Shared service-to-service secret, stored under `secret/internal`.
    pub async fn get_internal_secret(&self) -> Result<String> {
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, "internal")
            .await
            .context("failed to read secret/internal from Vault")?;

        secret
            .get("secret")
            .cloned()
            .context("secret key not found in Vault secret/internal")
    }
}

/// Returns the internal secret from the configured backend.
pub async fn resolve_internal_secret(config: &Config) -> Result<String> {
    match config.secrets_backend {
        SecretsBackend::Env => config
            .internal_secret
            .clone()
            .context("INTERNAL_SECRET is not set"),
        SecretsBackend::Vault => {
            tracing::info!("Loading internal secret from Vault");
            SecretsManager::new().await?.get_internal_secret().await
        }
    }
}
