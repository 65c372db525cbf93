// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability declarations: the named set of operations an adapter says it
//! supports, plus its vendor's rate-limiting posture.

use serde::{Deserialize, Serialize};
use skb_core::EntityType;
use skb_ratelimit::RateLimiterConfig;

/// What one provider can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Whether the adapter implements the Source contract.
    pub can_be_source: bool,
    /// Whether the adapter implements the Target contract.
    pub can_be_target: bool,
    /// Entity types the vendor exposes.
    pub entity_types: Vec<EntityType>,
    /// Binary attachments supported.
    pub supports_attachments: bool,
    /// Execution history readable.
    pub supports_execution_history: bool,
    /// Structured test steps (vs. a single text blob).
    pub supports_test_steps: bool,
    /// Folder hierarchy supported.
    pub supports_hierarchy: bool,
    /// Custom fields supported.
    pub supports_custom_fields: bool,
    /// Vendor-appropriate rate-limiting defaults.
    pub rate_limiting: RateLimiterConfig,
}

impl ProviderCapabilities {
    /// Capabilities of a full read/write provider exposing every entity.
    #[must_use]
    pub fn source_and_target() -> Self {
        Self {
            can_be_source: true,
            can_be_target: true,
            entity_types: vec![
                EntityType::Project,
                EntityType::Folder,
                EntityType::TestCase,
                EntityType::TestCycle,
                EntityType::TestExecution,
                EntityType::Attachment,
                EntityType::FieldDefinition,
            ],
            supports_attachments: true,
            supports_execution_history: true,
            supports_test_steps: true,
            supports_hierarchy: true,
            supports_custom_fields: true,
            rate_limiting: RateLimiterConfig::default(),
        }
    }

    /// Capabilities of a read-only provider.
    #[must_use]
    pub fn source_only() -> Self {
        Self {
            can_be_target: false,
            ..Self::source_and_target()
        }
    }

    /// Replace the rate-limiting defaults.
    #[must_use]
    pub fn with_rate_limiting(mut self, rate_limiting: RateLimiterConfig) -> Self {
        self.rate_limiting = rate_limiting;
        self
    }

    /// Restrict the entity list.
    #[must_use]
    pub fn with_entity_types(mut self, entity_types: Vec<EntityType>) -> Self {
        self.entity_types = entity_types;
        self
    }

    /// Whether the provider exposes the given entity type.
    #[must_use]
    pub fn supports_entity(&self, entity: EntityType) -> bool {
        self.entity_types.contains(&entity)
    }
}
