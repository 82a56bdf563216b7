use std::sync::Arc;

use savekeep::{
    MigrationChain, SaveError, SaveFormat, SaveStore, StaticDeviceIdentity, StoreEvent,
    StoreSettings,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct Canary {
    marker: String,
    score: i64,
}

fn identity() -> Arc<StaticDeviceIdentity> {
    Arc::new(StaticDeviceIdentity::new("integrity-tests"))
}

async fn open(dir: &std::path::Path, settings: StoreSettings) -> SaveStore {
    let _ = env_logger::builder().is_test(true).try_init();
    SaveStore::open(
        StoreSettings {
            base_dir: dir.to_path_buf(),
            ..settings
        },
        identity(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn corrupted_byte_fails_closed_with_integrity_event() {
    let dir = tempdir().unwrap();
    let store = open(dir.path(), StoreSettings::default()).await;

    let value = Canary {
        marker: "corruption-canary-marker".to_string(),
        score: 77,
    };
    store.save("slot", &value, SaveFormat::Binary).await.unwrap();

    // Flip one byte inside the payload string. The envelope still decodes,
    // so only the checksum can catch the damage.
    let path = dir.path().join("slot.save");
    let mut bytes = std::fs::read(&path).unwrap();
    let needle = b"canary";
    let pos = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .expect("payload marker should be raw in the binary file");
    bytes[pos] = b'x';
    std::fs::write(&path, &bytes).unwrap();

    let mut events = store.subscribe();
    let loaded = store.load("slot", SaveFormat::Binary, Canary::default()).await;
    assert_eq!(loaded, Canary::default(), "corrupt load must fail closed");

    let mut saw_integrity_failure = false;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::LoadFailed {
            key,
            error: SaveError::Integrity(_),
        } = event
        {
            assert_eq!(key, "slot");
            saw_integrity_failure = true;
        }
    }
    assert!(saw_integrity_failure);

    let err = store
        .try_load::<Canary>("slot", SaveFormat::Binary)
        .await
        .unwrap_err();
    assert!(matches!(err, SaveError::Integrity(_)));
}

#[tokio::test]
async fn integrity_disabled_skips_verification() {
    let dir = tempdir().unwrap();
    let store = open(
        dir.path(),
        StoreSettings::default().with_integrity(false),
    )
    .await;

    let value = Canary {
        marker: "unchecked".to_string(),
        score: 1,
    };
    store.save("slot", &value, SaveFormat::Binary).await.unwrap();
    let loaded: Option<Canary> = store.try_load("slot", SaveFormat::Binary).await.unwrap();
    assert_eq!(loaded.unwrap(), value);
}

fn chain_to_v3() -> MigrationChain {
    let mut chain = MigrationChain::new();
    chain.register_fn(2, |mut payload| {
        payload["rank"] = json!("bronze");
        Ok(payload)
    });
    chain.register_fn(3, |mut payload| {
        let score = payload["score"].as_i64().unwrap_or_default();
        payload["score"] = json!(score * 100);
        Ok(payload)
    });
    chain
}

#[tokio::test]
async fn version_1_record_migrates_through_2_to_3_in_order() {
    let dir = tempdir().unwrap();

    {
        let v1_store = open(
            dir.path(),
            StoreSettings::default().with_schema_version(1),
        )
        .await;
        v1_store
            .save("hero", &json!({"score": 10}), SaveFormat::Binary)
            .await
            .unwrap();
    }

    let v3_store = SaveStore::open_with_migrations(
        StoreSettings::new(dir.path()).with_schema_version(3),
        identity(),
        chain_to_v3(),
    )
    .await
    .unwrap();

    let migrated: serde_json::Value = v3_store
        .try_load("hero", SaveFormat::Binary)
        .await
        .unwrap()
        .unwrap();
    // Both handlers applied, in ascending order: 2 added the rank, 3 scaled
    // the score it found afterwards.
    assert_eq!(migrated["rank"], "bronze");
    assert_eq!(migrated["score"], 1000);
}

#[tokio::test]
async fn missing_migration_step_reports_and_falls_back_to_default() {
    let dir = tempdir().unwrap();

    {
        let v1_store = open(
            dir.path(),
            StoreSettings::default().with_schema_version(1),
        )
        .await;
        v1_store
            .save("hero", &json!({"score": 10}), SaveFormat::Binary)
            .await
            .unwrap();
    }

    // Only the 1→2 handler exists but the engine expects version 4.
    let mut partial_chain = MigrationChain::new();
    partial_chain.register_fn(2, |payload| Ok(payload));

    let v4_store = SaveStore::open_with_migrations(
        StoreSettings::new(dir.path()).with_schema_version(4),
        identity(),
        partial_chain,
    )
    .await
    .unwrap();

    let err = v4_store
        .try_load::<serde_json::Value>("hero", SaveFormat::Binary)
        .await
        .unwrap_err();
    assert!(matches!(err, SaveError::Migration(_)));

    let fallback = v4_store
        .load("hero", SaveFormat::Binary, json!({"fresh": true}))
        .await;
    assert_eq!(fallback, json!({"fresh": true}));
}

#[tokio::test]
async fn current_version_record_needs_no_migration() {
    let dir = tempdir().unwrap();
    let store = SaveStore::open_with_migrations(
        StoreSettings::new(dir.path()).with_schema_version(3),
        identity(),
        chain_to_v3(),
    )
    .await
    .unwrap();

    store
        .save("hero", &json!({"score": 10}), SaveFormat::Binary)
        .await
        .unwrap();
    let loaded: serde_json::Value = store
        .try_load("hero", SaveFormat::Binary)
        .await
        .unwrap()
        .unwrap();
    // Written at version 3 already; no handler ran.
    assert_eq!(loaded, json!({"score": 10}));
}
