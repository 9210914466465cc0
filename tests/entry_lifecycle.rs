//! Entry lifecycle integration tests
//!
//! Declaration, live reads, conflicts and reload of entries sharing one
//! registry with an override loader.

use serde_json::json;
use smartconfig::loader::load_toml_str;
use smartconfig::{EntryBuilder, Error, ErrorKind, Origin, Registry};

// === End-to-end scenario ===

#[test]
fn test_timeout_scenario() {
    let registry = Registry::new();

    let first = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 3)
        .register(&registry)
        .unwrap();
    assert_eq!(
        registry.get_attribute("svc.timeout", "retries").unwrap(),
        json!(3)
    );

    // Loader writes after declaration
    registry
        .set_override("svc.timeout", "retries", json!(5))
        .unwrap();
    assert_eq!(first.get("retries").unwrap(), json!(5));

    let err = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 1)
        .register(&registry)
        .unwrap_err();
    assert_eq!(err, Error::path_conflict("svc.timeout"));

    assert!(first.unload());

    // The override outlives the entry, so the new default doesn't apply
    let second = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 1)
        .register(&registry)
        .unwrap();
    assert_eq!(second.get("retries").unwrap(), json!(5));
    assert_eq!(
        registry.origin("svc.timeout", "retries"),
        Some(Origin::Override)
    );
}

#[test]
fn test_redeclare_without_override_gets_new_default() {
    let registry = Registry::new();

    let first = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 3)
        .register(&registry)
        .unwrap();
    drop(first);

    let second = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 1)
        .register(&registry)
        .unwrap();
    assert_eq!(second.get("retries").unwrap(), json!(1));
}

// === Overrides loaded before declaration ===

#[test]
fn test_preloaded_override_wins_over_default() {
    let registry = Registry::new();
    load_toml_str(
        &registry,
        r#"
[app.database]
host = "db.internal"
port = 6543
"#,
    )
    .unwrap();

    let entry = EntryBuilder::new("Database", "app.database")
        .default("host", "localhost")
        .default("port", 5432)
        .default("pool_size", 8)
        .register(&registry)
        .unwrap();

    assert_eq!(entry.get("host").unwrap(), json!("db.internal"));
    assert_eq!(entry.get("port").unwrap(), json!(6543));
    assert_eq!(entry.get("pool_size").unwrap(), json!(8));

    // Only the unset default was contributed
    let record = registry.owner_of("app.database").unwrap();
    assert_eq!(record.contributed.len(), 1);
    assert!(record.contributed.contains("pool_size"));
}

#[test]
fn test_unload_keeps_preloaded_overrides() {
    let registry = Registry::new();
    load_toml_str(&registry, "[app]\nname = \"prod\"").unwrap();

    let entry = EntryBuilder::new("App", "app")
        .default("name", "dev")
        .default("debug", false)
        .register(&registry)
        .unwrap();
    entry.unload();

    assert_eq!(registry.snapshot(), json!({"app": {"name": "prod"}}));
}

// === Validation ===

#[test]
fn test_required_attribute_fails_fast() {
    let registry = Registry::new();

    let err = EntryBuilder::new("Secrets", "app.secrets")
        .annotated("api_token")
        .default("timeout", 30)
        .register(&registry)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigurationKey);
    assert!(err.to_string().contains("api_token"));
    assert!(registry.used_paths().is_empty());
    assert_eq!(registry.snapshot(), json!({}));
}

#[test]
fn test_required_attribute_from_loader() {
    let registry = Registry::new();
    load_toml_str(&registry, "[app.secrets]\napi_token = \"t0k3n\"").unwrap();

    let entry = EntryBuilder::new("Secrets", "app.secrets")
        .annotated("api_token")
        .register(&registry)
        .unwrap();

    assert_eq!(entry.get("api_token").unwrap(), json!("t0k3n"));
}

#[test]
fn test_entry_under_value_is_configuration_error() {
    let registry = Registry::new();
    load_toml_str(&registry, "[app]\ncache = \"redis\"").unwrap();

    let err = EntryBuilder::new("Cache", "app.cache")
        .default("ttl", 60)
        .register(&registry)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!registry.is_claimed("app.cache"));
}

// === Shared namespace ===

#[test]
fn test_nested_entries_share_tree() {
    let registry = Registry::new();
    let parent = EntryBuilder::new("Svc", "svc")
        .default("name", "api")
        .register(&registry)
        .unwrap();
    let child = EntryBuilder::new("Timeout", "svc.timeout")
        .default("retries", 3)
        .register(&registry)
        .unwrap();

    assert_eq!(
        registry.snapshot(),
        json!({"svc": {"name": "api", "timeout": {"retries": 3}}})
    );
    assert_ne!(parent, child);

    drop(parent);
    assert_eq!(child.get("retries").unwrap(), json!(3));
    assert_eq!(registry.snapshot(), json!({"svc": {"timeout": {"retries": 3}}}));

    drop(child);
    assert_eq!(registry.snapshot(), json!({}));
}

#[test]
fn test_global_registry() {
    let path = "tests.entry_lifecycle.global";
    let entry = EntryBuilder::new("Global", path)
        .default("enabled", true)
        .register(Registry::global())
        .unwrap();

    assert!(Registry::global().is_claimed(path));
    assert_eq!(entry.get("enabled").unwrap(), json!(true));

    entry.unload();
    assert!(!Registry::global().is_claimed(path));
}
