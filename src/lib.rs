// SPDX-License-Identifier: MIT OR Apache-2.0
//! skidbladnir
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Umbrella crate for the Skidbladnir provider + API-bridge core: one
//! dependency that re-exports the canonical model, the resilience stack,
//! and every vendor adapter.
//!
//! The crates compose bottom-up:
//!
//! - [`core`]: canonical entities and the field-type coercion policy;
//! - [`error`]: the categorised provider-error taxonomy;
//! - [`cancel`], [`ratelimit`], [`retry`], [`cache`], [`resilience`]:
//!   the call-protection stack composed by the facade;
//! - [`auth`], [`http`]: authentication lifecycle and the resilient
//!   HTTP client;
//! - [`provider`]: capability contracts, configuration, registry,
//!   health monitor, and persistence seams;
//! - the vendor adapters ([`zephyr`], [`qtest`], [`azure`], [`rally`],
//!   [`alm`], [`visure`], [`excel`]).

pub use skb_auth as auth;
pub use skb_cache as cache;
pub use skb_cancel as cancel;
pub use skb_core as core;
pub use skb_error as error;
pub use skb_http as http;
pub use skb_provider as provider;
pub use skb_ratelimit as ratelimit;
pub use skb_resilience as resilience;
pub use skb_retry as retry;

pub use alm_provider as alm;
pub use azure_provider as azure;
pub use excel_provider as excel;
pub use qtest_provider as qtest;
pub use rally_provider as rally;
pub use visure_provider as visure;
pub use zephyr_provider as zephyr;
