//! File-backed configuration for hcpinfra
//!
//! - [`AzureCreds`]: the service-principal credentials file
//! - [`load_document`] / [`write_document`]: identity files and the
//!   infrastructure output record, in YAML or JSON

pub mod credentials;
pub mod document;
pub mod error;

pub use credentials::AzureCreds;
pub use document::{DocumentFormat, load_document, render_document, write_document};
pub use error::*;
