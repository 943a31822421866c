//! Identity records exchanged through identity files and the output record

use serde::{Deserialize, Serialize};

/// A pre-provisioned managed identity referenced by client id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedIdentity {
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(
        rename = "credentialsSecretName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credentials_secret_name: Option<String>,
    #[serde(
        rename = "objectEncoding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_encoding: Option<String>,
}

impl ManagedIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }
}

/// Control-plane identities of the ARO-HCP model (`--managed-identities-file`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneManagedIdentities {
    #[serde(default)]
    pub control_plane_operator: ManagedIdentity,
    #[serde(default)]
    pub image_registry: ManagedIdentity,
    #[serde(default)]
    pub ingress: ManagedIdentity,
    #[serde(default)]
    pub network: ManagedIdentity,
    #[serde(default)]
    pub disk: ManagedIdentity,
    #[serde(default)]
    pub file: ManagedIdentity,
    #[serde(default)]
    pub node_pool_management: ManagedIdentity,
    #[serde(default)]
    pub cloud_provider: ManagedIdentity,
}

/// Data-plane identities of the ARO-HCP model (`--data-plane-identities-file`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPlaneManagedIdentities {
    #[serde(rename = "imageRegistryMSIClientID", default)]
    pub image_registry_client_id: String,
    #[serde(rename = "diskMSIClientID", default)]
    pub disk_client_id: String,
    #[serde(rename = "fileMSIClientID", default)]
    pub file_client_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureResourceManagedIdentities {
    pub control_plane: ControlPlaneManagedIdentities,
    #[serde(default)]
    pub data_plane: DataPlaneManagedIdentities,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    #[serde(rename = "clientID", default)]
    pub client_id: String,
}

impl WorkloadIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

/// Self-managed workload identities, one per component of the identity graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentities {
    #[serde(default)]
    pub image_registry: WorkloadIdentity,
    #[serde(default)]
    pub ingress: WorkloadIdentity,
    #[serde(default)]
    pub file: WorkloadIdentity,
    #[serde(default)]
    pub disk: WorkloadIdentity,
    #[serde(default)]
    pub node_pool_management: WorkloadIdentity,
    #[serde(default)]
    pub cloud_provider: WorkloadIdentity,
    #[serde(default)]
    pub network: WorkloadIdentity,
}
