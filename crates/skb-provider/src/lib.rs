// SPDX-License-Identifier: MIT OR Apache-2.0
//! skb-provider
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The provider surface: capability declarations, the Source/Target
//! operation contracts every vendor adapter implements, the shared
//! configuration object, the owned registry, the health monitor, and the
//! two small persistence interfaces (blob store, id-mapping table) the
//! core reads and writes through.
//!
//! Source and Target are orthogonal facets of an adapter, not a class
//! hierarchy: an adapter implements [`Provider`] plus whichever of
//! [`SourceProvider`] / [`TargetProvider`] its vendor supports, and
//! declares the rest through [`ProviderCapabilities`].

/// Capability declarations.
pub mod capability;
/// Provider configuration surface.
pub mod config;
/// Health monitor aggregating provider health into a system status.
pub mod health;
/// Provider registry.
pub mod registry;
/// Blob-store and id-mapping interfaces plus in-memory implementations.
pub mod store;
/// Source/Target operation contracts and paging types.
pub mod traits;

pub use capability::ProviderCapabilities;
pub use config::{AuthenticationConfig, ProviderConfig, RateLimitingConfig, ResilienceOptions};
pub use health::{HealthMonitor, SystemSnapshot, SystemStatus};
pub use registry::{ProviderHandle, ProviderRegistry};
pub use store::{BlobStore, IdMapping, InMemoryBlobStore, InMemoryIdMapping};
pub use traits::{
    AttachmentContent, AttachmentOwner, ConnectionStatus, Page, PageQuery, Provider,
    ProviderMetadata, SourceProvider, TargetProvider, TestCaseQuery,
};
