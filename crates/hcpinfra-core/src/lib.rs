//! hcpinfra core
//!
//! Provisioning engines for the cloud infrastructure a hosted control plane
//! needs: resource groups, network, DNS, egress load balancer, identities and
//! role assignments.
//!
//! ## Main pieces
//!
//! - [`create::CreateInfra`]: forward pipeline, fail-fast
//! - [`destroy::DestroyInfra`]: reverse pipeline, best effort in preserve mode
//! - [`iam`]: identity-only create and destroy
//! - [`identity`]: workload-identity graph and identity lifecycle
//! - [`rbac::RbacManager`]: idempotent role assignments
//! - [`network::NetworkBuilder`] and [`resource_group::ResourceGroupManager`]
//!
//! Everything talks to the cloud through [`hcpinfra_cloud::CloudApi`], so the
//! engines run unchanged against Azure or the in-memory fake used in tests.

pub mod create;
pub mod destroy;
pub mod error;
pub mod iam;
pub mod identity;
pub mod naming;
pub mod network;
pub mod output;
pub mod rbac;
pub mod resource_group;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use create::{CreateInfra, CreateInfraOptions, IdentityModel, validate_deployment_model_flags};
pub use destroy::{ClusterOwnership, DestroyInfra, DestroyInfraOptions, NameOwnership};
pub use error::{InfraError, Result};
pub use iam::{CreateIamOptions, DestroyIamOptions, IamInfra};
pub use output::InfraOutput;

use hcpinfra_cloud::{CancellationToken, CloudError};

/// Fail with [`CloudError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CloudError::Cancelled.into());
    }
    Ok(())
}
