use std::sync::Arc;

use savekeep::{SaveFormat, SaveStore, StaticDeviceIdentity, StoreSettings};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
struct PlayerProfile {
    level: u32,
    name: String,
    unlocked: Vec<String>,
}

fn sample_profile() -> PlayerProfile {
    PlayerProfile {
        level: 5,
        name: "Ada".to_string(),
        unlocked: vec!["double-jump".to_string(), "dash".to_string()],
    }
}

async fn open_store(dir: &std::path::Path, settings: StoreSettings) -> SaveStore {
    let _ = env_logger::builder().is_test(true).try_init();
    SaveStore::open(
        StoreSettings { base_dir: dir.to_path_buf(), ..settings },
        Arc::new(StaticDeviceIdentity::new("roundtrip-tests")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn every_format_round_trips_a_struct() {
    let dir = tempdir().unwrap();
    let store = open_store(
        dir.path(),
        StoreSettings::default().with_encryption(true),
    )
    .await;

    let profile = sample_profile();
    for format in SaveFormat::ALL {
        let key = format!("slot_{}", format);
        store.save(&key, &profile, format).await.unwrap();
        let loaded = store.load(&key, format, PlayerProfile::default()).await;
        assert_eq!(loaded, profile, "round-trip failed for {}", format);
    }
}

#[tokio::test]
async fn load_of_missing_key_returns_default() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    let loaded = store
        .load("never-saved", SaveFormat::Binary, sample_profile())
        .await;
    assert_eq!(loaded, sample_profile());

    let tried: Option<PlayerProfile> = store
        .try_load("never-saved", SaveFormat::Binary)
        .await
        .unwrap();
    assert!(tried.is_none());
}

#[tokio::test]
async fn encrypted_save_then_delete_then_exists_is_false() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    store
        .save("profile", &sample_profile(), SaveFormat::Encrypted)
        .await
        .unwrap();
    assert!(store.exists("profile", SaveFormat::Encrypted).await);

    let loaded = store
        .load("profile", SaveFormat::Encrypted, PlayerProfile::default())
        .await;
    assert_eq!(loaded, sample_profile());

    assert!(store.delete("profile").await.unwrap());
    assert!(!store.exists("profile", SaveFormat::Encrypted).await);
    assert!(!store.delete("profile").await.unwrap());
}

#[tokio::test]
async fn files_land_under_base_dir_with_format_extensions() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    store
        .save("score", &42u32, SaveFormat::Compressed)
        .await
        .unwrap();
    assert!(dir.path().join("score.sav.gz").exists());

    store.save("score", &42u32, SaveFormat::Json).await.unwrap();
    assert!(dir.path().join("score.json").exists());
}

#[tokio::test]
async fn json_format_is_human_readable_without_encryption() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    store
        .save("readable", &sample_profile(), SaveFormat::Json)
        .await
        .unwrap();
    let text = std::fs::read_to_string(dir.path().join("readable.json")).unwrap();
    assert!(text.trim_start().starts_with('{'));
    assert!(text.contains("Ada"));
}

#[tokio::test]
async fn json_format_is_base64_wrapped_with_encryption() {
    let dir = tempdir().unwrap();
    let store = open_store(
        dir.path(),
        StoreSettings::default().with_encryption(true),
    )
    .await;

    store
        .save("sealed", &sample_profile(), SaveFormat::Json)
        .await
        .unwrap();
    let text = std::fs::read_to_string(dir.path().join("sealed.json")).unwrap();
    assert!(!text.contains("Ada"));
    assert!(!text.trim_start().starts_with('{'));

    let loaded = store
        .load("sealed", SaveFormat::Json, PlayerProfile::default())
        .await;
    assert_eq!(loaded, sample_profile());
}

#[tokio::test]
async fn save_survives_process_restart() {
    let dir = tempdir().unwrap();

    {
        let store = open_store(dir.path(), StoreSettings::default()).await;
        store
            .save("persistent", &sample_profile(), SaveFormat::Binary)
            .await
            .unwrap();
    }

    let reopened = open_store(dir.path(), StoreSettings::default()).await;
    let loaded = reopened
        .load("persistent", SaveFormat::Binary, PlayerProfile::default())
        .await;
    assert_eq!(loaded, sample_profile());
}

#[tokio::test]
async fn other_device_fails_closed_to_default() {
    let dir = tempdir().unwrap();

    {
        let store = open_store(dir.path(), StoreSettings::default()).await;
        store
            .save("portable", &sample_profile(), SaveFormat::Encrypted)
            .await
            .unwrap();
    }

    let other_device = SaveStore::open(
        StoreSettings::new(dir.path()),
        Arc::new(StaticDeviceIdentity::new("a-different-device")),
    )
    .await
    .unwrap();
    let loaded = other_device
        .load("portable", SaveFormat::Encrypted, PlayerProfile::default())
        .await;
    assert_eq!(loaded, PlayerProfile::default());
}

#[tokio::test]
async fn operations_are_recorded_in_the_ring() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    store
        .save("logged", &sample_profile(), SaveFormat::Binary)
        .await
        .unwrap();
    let _ = store
        .load("logged", SaveFormat::Binary, PlayerProfile::default())
        .await;

    let ops = store.recent_operations().unwrap();
    assert!(ops.len() >= 2);
    assert!(ops.iter().all(|op| op.key == "logged" && op.success));
}

#[tokio::test]
async fn invalid_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), StoreSettings::default()).await;

    assert!(store.save("", &1u32, SaveFormat::Binary).await.is_err());
    assert!(
        store
            .save("../escape", &1u32, SaveFormat::Binary)
            .await
            .is_err()
    );
    assert!(
        store
            .save("nested/key", &1u32, SaveFormat::Binary)
            .await
            .is_err()
    );
}
