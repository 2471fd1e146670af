//! Core domain entities.

pub mod credential;
pub mod tenant;

pub use credential::{CachedToken, CredentialDeclaration};
pub use tenant::{ConnectionDescriptor, PoolDescriptor, PoolKind, SessionAuth, TenantConfig};
