//! Cloud environments (sovereign clouds)

use crate::error::CloudError;
use std::str::FromStr;

/// Endpoints of one cloud environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfiguration {
    pub name: &'static str,
    /// Token authority, with trailing slash
    pub authority_host: &'static str,
    pub resource_manager_endpoint: &'static str,
    /// Directory (Graph) endpoint used for service-principal lookups
    pub graph_endpoint: &'static str,
}

pub const AZURE_PUBLIC_CLOUD: CloudConfiguration = CloudConfiguration {
    name: "AzurePublicCloud",
    authority_host: "https://login.microsoftonline.com/",
    resource_manager_endpoint: "https://management.azure.com",
    graph_endpoint: "https://graph.microsoft.com",
};

pub const AZURE_US_GOVERNMENT_CLOUD: CloudConfiguration = CloudConfiguration {
    name: "AzureUSGovernmentCloud",
    authority_host: "https://login.microsoftonline.us/",
    resource_manager_endpoint: "https://management.usgovcloudapi.net",
    graph_endpoint: "https://graph.microsoft.us",
};

pub const AZURE_CHINA_CLOUD: CloudConfiguration = CloudConfiguration {
    name: "AzureChinaCloud",
    authority_host: "https://login.chinacloudapi.cn/",
    resource_manager_endpoint: "https://management.chinacloudapi.cn",
    graph_endpoint: "https://microsoftgraph.chinacloudapi.cn",
};

impl CloudConfiguration {
    pub const ALL: [CloudConfiguration; 3] = [
        AZURE_PUBLIC_CLOUD,
        AZURE_US_GOVERNMENT_CLOUD,
        AZURE_CHINA_CLOUD,
    ];

    /// Token scope for resource-manager calls.
    pub fn resource_manager_scope(&self) -> String {
        format!("{}/.default", self.resource_manager_endpoint)
    }

    /// Token scope for directory calls.
    pub fn graph_scope(&self) -> String {
        format!("{}/.default", self.graph_endpoint)
    }
}

impl Default for CloudConfiguration {
    fn default() -> Self {
        AZURE_PUBLIC_CLOUD
    }
}

impl FromStr for CloudConfiguration {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cloud| cloud.name.eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|c| c.name).collect();
                CloudError::InvalidConfig(format!(
                    "unknown cloud '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

impl std::fmt::Display for CloudConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
