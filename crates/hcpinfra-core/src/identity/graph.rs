//! Workload-identity graph
//!
//! The fixed set of components that run with a workload identity, the
//! suffix of each identity's name and the service-account subjects that may
//! assume it. Create and destroy both walk this list, so adding a component
//! here is enough for it to be provisioned and cleaned up.

use super::model::{WorkloadIdentities, WorkloadIdentity};
use std::fmt;

/// Audience every federated credential is issued for.
pub const FEDERATED_AUDIENCE: &str = "openshift";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityComponent {
    Disk,
    File,
    ImageRegistry,
    Ingress,
    CloudProvider,
    NodePoolManagement,
    Network,
}

impl IdentityComponent {
    pub const ALL: [IdentityComponent; 7] = [
        Self::Disk,
        Self::File,
        Self::ImageRegistry,
        Self::Ingress,
        Self::CloudProvider,
        Self::NodePoolManagement,
        Self::Network,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::File => "file",
            Self::ImageRegistry => "imageRegistry",
            Self::Ingress => "ingress",
            Self::CloudProvider => "cloudProvider",
            Self::NodePoolManagement => "nodePoolManagement",
            Self::Network => "network",
        }
    }

    /// Appended to the cluster name to form the identity's base name.
    pub fn identity_suffix(self) -> &'static str {
        match self {
            Self::Disk => "-disk",
            Self::File => "-file",
            Self::ImageRegistry => "-image-registry",
            Self::Ingress => "-ingress",
            Self::CloudProvider => "-cloud-provider",
            Self::NodePoolManagement => "-node-pool-mgmt",
            Self::Network => "-network",
        }
    }

    /// Field of the workload-identities record owned by this component.
    pub fn slot(self, identities: &WorkloadIdentities) -> &WorkloadIdentity {
        match self {
            Self::Disk => &identities.disk,
            Self::File => &identities.file,
            Self::ImageRegistry => &identities.image_registry,
            Self::Ingress => &identities.ingress,
            Self::CloudProvider => &identities.cloud_provider,
            Self::NodePoolManagement => &identities.node_pool_management,
            Self::Network => &identities.network,
        }
    }

    pub fn slot_mut(self, identities: &mut WorkloadIdentities) -> &mut WorkloadIdentity {
        match self {
            Self::Disk => &mut identities.disk,
            Self::File => &mut identities.file,
            Self::ImageRegistry => &mut identities.image_registry,
            Self::Ingress => &mut identities.ingress,
            Self::CloudProvider => &mut identities.cloud_provider,
            Self::NodePoolManagement => &mut identities.node_pool_management,
            Self::Network => &mut identities.network,
        }
    }

    /// `(credential suffix, namespace, service account)` triples.
    fn credential_subjects(self) -> &'static [(&'static str, &'static str, &'static str)] {
        const CSI_NS: &str = "openshift-cluster-csi-drivers";
        match self {
            Self::Disk => &[
                ("-disk-fed-id-node", CSI_NS, "azure-disk-csi-driver-node-sa"),
                ("-disk-fed-id-operator", CSI_NS, "azure-disk-csi-driver-operator"),
                ("-disk-fed-id-controller", CSI_NS, "azure-disk-csi-driver-controller-sa"),
            ],
            Self::File => &[
                ("-file-fed-id-node", CSI_NS, "azure-file-csi-driver-node-sa"),
                ("-file-fed-id-operator", CSI_NS, "azure-file-csi-driver-operator"),
                ("-file-fed-id-controller", CSI_NS, "azure-file-csi-driver-controller-sa"),
            ],
            Self::ImageRegistry => &[
                ("-image-registry-fed-id-registry", "openshift-image-registry", "registry"),
                (
                    "-image-registry-fed-id-operator",
                    "openshift-image-registry",
                    "cluster-image-registry-operator",
                ),
            ],
            Self::Ingress => &[(
                "-ingress-fed-id",
                "openshift-ingress-operator",
                "ingress-operator",
            )],
            Self::CloudProvider => &[(
                "-cloud-provider-fed-id",
                "kube-system",
                "azure-cloud-provider",
            )],
            Self::NodePoolManagement => &[("-node-pool-mgmt-fed-id", "kube-system", "capi-provider")],
            Self::Network => &[(
                "-network-fed-id",
                "openshift-cloud-network-config-controller",
                "cloud-network-config-controller",
            )],
        }
    }
}

impl fmt::Display for IdentityComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedCredentialConfig {
    pub credential_name: String,
    /// `system:serviceaccount:{namespace}:{service account}`
    pub subject: String,
    pub audience: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDefinition {
    pub component: IdentityComponent,
    pub identity_name_suffix: &'static str,
    pub federated_credentials: Vec<FederatedCredentialConfig>,
}

impl IdentityDefinition {
    /// `{cluster}{suffix}`, without the infra id.
    pub fn base_name(&self, cluster_name: &str) -> String {
        format!("{}{}", cluster_name, self.identity_name_suffix)
    }

    /// `{cluster}{suffix}-{infra_id}`, the name of the identity resource.
    pub fn identity_name(&self, cluster_name: &str, infra_id: &str) -> String {
        crate::naming::identity_name(&self.base_name(cluster_name), infra_id)
    }
}

pub fn service_account_subject(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{}:{}", namespace, service_account)
}

/// Identity definitions for a cluster, in a stable order.
pub fn workload_identity_definitions(cluster_name: &str) -> Vec<IdentityDefinition> {
    IdentityComponent::ALL
        .iter()
        .map(|&component| IdentityDefinition {
            component,
            identity_name_suffix: component.identity_suffix(),
            federated_credentials: component
                .credential_subjects()
                .iter()
                .map(|(suffix, namespace, sa)| FederatedCredentialConfig {
                    credential_name: format!("{}{}", cluster_name, suffix),
                    subject: service_account_subject(namespace, sa),
                    audience: FEDERATED_AUDIENCE.to_string(),
                })
                .collect(),
        })
        .collect()
}
