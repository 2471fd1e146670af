//! # LakeMux Core Library
//!
//! Domain logic and shared types for LakeMux.
//!
//! ## Modules
//!
//! - `domain` - Core entities (TenantConfig, PoolDescriptor, CredentialDeclaration)
//! - `error` - The gateway error taxonomy and failure reporting
//! - `config` - Tenants document loading, env overrides, persistence

pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use config::{default_tenants_path, TenantsDocument};
pub use domain::*;
pub use error::{FailureHint, FailureReport, GatewayError};
