//! Service-principal credentials file

use crate::document::load_document;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of the `--azure-creds` file
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureCreds {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl AzureCreds {
    /// Load and validate a credentials file.
    ///
    /// Fields left empty in the file are taken from `AZURE_SUBSCRIPTION_ID`,
    /// `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut creds: AzureCreds = load_document(path)?;
        creds.fill_from_env();

        for (field, value) in [
            ("subscriptionId", &creds.subscription_id),
            ("tenantId", &creds.tenant_id),
            ("clientId", &creds.client_id),
            ("clientSecret", &creds.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    path: path.to_path_buf(),
                    field,
                });
            }
        }

        Ok(creds)
    }

    fn fill_from_env(&mut self) {
        for (var, slot) in [
            ("AZURE_SUBSCRIPTION_ID", &mut self.subscription_id),
            ("AZURE_TENANT_ID", &mut self.tenant_id),
            ("AZURE_CLIENT_ID", &mut self.client_id),
            ("AZURE_CLIENT_SECRET", &mut self.client_secret),
        ] {
            if slot.trim().is_empty()
                && let Ok(value) = std::env::var(var)
            {
                *slot = value;
            }
        }
    }
}

impl std::fmt::Debug for AzureCreds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCreds")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
