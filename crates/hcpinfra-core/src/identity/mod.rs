//! Workload and managed identities
//!
//! - [`graph`]: which components get an identity and which service accounts
//!   may assume it
//! - [`manager`]: creating and removing identities and federated credentials
//! - [`model`]: identity records read from and written to documents

pub mod graph;
pub mod manager;
pub mod model;

pub use graph::{
    FederatedCredentialConfig, IdentityComponent, IdentityDefinition,
    workload_identity_definitions,
};
pub use manager::{CreatedIdentity, IdentityManager, WorkloadIdentityOptions};
pub use model::{
    AzureResourceManagedIdentities, ControlPlaneManagedIdentities, DataPlaneManagedIdentities,
    ManagedIdentity, WorkloadIdentities, WorkloadIdentity,
};
