// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry wiring across every shipped adapter: facet declarations,
//! capability queries, and monitor aggregation.

use skidbladnir::provider::{HealthMonitor, ProviderHandle, ProviderRegistry, SystemStatus};
use skidbladnir::resilience::HealthStatus;
use std::sync::Arc;

fn full_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::zephyr::ZephyrProvider::new(),
    )));
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::qtest::QTestProvider::new(),
    )));
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::azure::AzureProvider::new(),
    )));
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::rally::RallyProvider::new(),
    )));
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::alm::AlmProvider::new(),
    )));
    registry.register(ProviderHandle::source_and_target(Arc::new(
        skidbladnir::visure::VisureProvider::new(),
    )));
    registry.register(ProviderHandle::source_only(Arc::new(
        skidbladnir::excel::ExcelProvider::new(),
    )));
    registry
}

#[test]
fn all_seven_adapters_register() {
    let registry = full_registry();
    assert_eq!(registry.len(), 7);
    let ids: Vec<String> = registry
        .all()
        .iter()
        .map(|h| h.provider().id().to_string())
        .collect();
    assert_eq!(
        ids,
        vec!["alm", "azure", "excel", "qtest", "rally", "visure", "zephyr"]
    );
}

#[test]
fn facet_queries_split_sources_and_targets() {
    let registry = full_registry();
    assert_eq!(registry.source_providers().len(), 7);
    // Excel is source-only.
    let targets = registry.target_providers();
    assert_eq!(targets.len(), 6);
    assert!(targets.iter().all(|t| t.id() != "excel"));
}

#[test]
fn capabilities_match_declared_facets() {
    let registry = full_registry();
    for handle in registry.all() {
        let caps = handle.provider().capabilities();
        assert_eq!(caps.can_be_source, handle.source().is_some(), "{}", handle.provider().id());
        assert_eq!(caps.can_be_target, handle.target().is_some(), "{}", handle.provider().id());
        assert!(
            caps.rate_limiting.max_requests_per_minute > 0,
            "{} must declare rate limits",
            handle.provider().id()
        );
    }
}

#[test]
fn unregister_shuts_an_adapter_out() {
    let mut registry = full_registry();
    assert!(registry.unregister("rally").is_some());
    assert!(registry.get("rally").is_none());
    assert_eq!(registry.source_providers().len(), 6);
}

#[test]
fn monitor_over_uninitialised_adapters_reports_up() {
    // Adapters without clients contribute no health reports; an empty
    // report set plus a healthy probe merges to UP.
    let monitor = HealthMonitor::new();
    let registry = full_registry();
    for handle in registry.all() {
        monitor.watch(Arc::clone(handle.provider()));
    }
    monitor.register_probe("blob-store", || HealthStatus::Healthy);
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, SystemStatus::Up);
    assert_eq!(snapshot.probes.len(), 1);
}
