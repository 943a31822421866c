//! hcpinfra Cloud Facade
//!
//! Provider-neutral view of the resource-management surface that the
//! provisioning engines in `hcpinfra-core` drive.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  hcpinfra CLI                    │
//! │      (create / destroy / create-iam / ...)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                hcpinfra-core                     │
//! │   orchestrators, identity manager, RBAC engine   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                hcpinfra-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudApi { ... }                   │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────────┐  │
//! │  │  Lro<T>  │  │ Pager<T> │  │  CloudError  │  │
//! │  └──────────┘  └──────────┘  └──────────────┘  │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼──────────────┐
//! │  hcpinfra-cloud-azure │
//! │  (ARM + Graph REST)   │
//! └──────────────────────┘
//! ```

pub mod action;
pub mod api;
pub mod auth;
pub mod cloud;
pub mod error;
pub mod lro;
pub mod model;
pub mod pager;

// Re-exports
pub use action::{ActionResult, ActionType, ApplyResult};
pub use api::CloudApi;
pub use auth::{AccessToken, TokenCredential};
pub use cloud::CloudConfiguration;
pub use error::{CloudError, ErrorKind, Result};
pub use lro::{Lro, PollOperation, PollStatus};
pub use pager::{PageSource, Pager};

// Downstream crates take the cancellation token from here.
pub use tokio_util::sync::CancellationToken;
