//! Infrastructure output record consumed by cluster creation

use crate::error::{Result, StepContext};
use crate::identity::{AzureResourceManagedIdentities, DataPlaneManagedIdentities, WorkloadIdentities};
use hcpinfra_config::{ConfigError, DocumentFormat, render_document};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraOutput {
    #[serde(rename = "baseDomain")]
    pub base_domain: String,
    #[serde(rename = "publicZoneID")]
    pub public_zone_id: String,
    #[serde(rename = "privateZoneID")]
    pub private_zone_id: String,
    #[serde(rename = "region")]
    pub location: String,
    #[serde(rename = "resourceGroupName")]
    pub resource_group_name: String,
    #[serde(rename = "vnetID")]
    pub vnet_id: String,
    #[serde(rename = "subnetID")]
    pub subnet_id: String,
    #[serde(rename = "infraID")]
    pub infra_id: String,
    #[serde(rename = "securityGroupID")]
    pub security_group_id: String,
    #[serde(
        rename = "controlPlaneMIs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub control_plane_identities: Option<AzureResourceManagedIdentities>,
    #[serde(
        rename = "dataPlaneIdentities",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_plane_identities: Option<DataPlaneManagedIdentities>,
    #[serde(
        rename = "workloadIdentities",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub workload_identities: Option<WorkloadIdentities>,
}

/// Write `value` to `path` (YAML, or JSON by extension).
///
/// If the write fails the rendered document is logged so it is not lost.
pub fn write_output<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let rendered =
        render_document(value, DocumentFormat::for_path(path)).step("serialize result")?;

    if let Err(e) = std::fs::write(path, &rendered) {
        error!(
            path = %path.display(),
            error = %e,
            data = %rendered,
            "Writing output file failed"
        );
        return Err(ConfigError::Io(e)).step("write result to --output-file");
    }
    info!(path = %path.display(), "Wrote output file");
    Ok(())
}

impl InfraOutput {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_output(path, self)
    }
}
