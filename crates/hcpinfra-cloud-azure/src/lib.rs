//! Azure provider for hcpinfra
//!
//! This crate implements the `CloudApi` trait against Azure Resource
//! Manager and the Microsoft Graph directory API using plain REST calls.
//!
//! # Features
//!
//! - Client-secret token acquisition with per-scope caching
//! - ARM error classification into `CloudError::Api { status, code, .. }`
//! - Long-running operation polling (`Azure-AsyncOperation` and `Location`)
//!   with `Retry-After` support
//! - `nextLink` paging for list operations
//! - Service-principal lookup by application (client) id
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hcpinfra_cloud::{CloudApi, CloudConfiguration, CancellationToken};
//! use hcpinfra_cloud_azure::{AzureClient, ClientSecretCredential};
//!
//! let cloud: CloudConfiguration = "AzurePublicCloud".parse()?;
//! let credential = ClientSecretCredential::new(tenant, client_id, secret, &cloud);
//! let client = AzureClient::new(subscription, Arc::new(credential), cloud);
//!
//! let lro = client.begin_delete_resource_group("my-cluster-abc123").await?;
//! lro.poll_until_done(&CancellationToken::new()).await?;
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod error;

pub use auth::ClientSecretCredential;
pub use client::AzureClient;
pub use error::{AzureError, Result};
