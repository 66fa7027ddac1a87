use crate::{SyncConfig, SyncError};
use std::io::Write;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_from_file_fills_missing_fields_with_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "defaultVolumeMode": "Filesystem", "defaultDiskSizeGib": 20 }}"#).unwrap();

    let config = SyncConfig::from_file(file.path()).await.unwrap();
    assert_eq!(config.default_volume_mode, "Filesystem");
    assert_eq!(config.default_disk_size_gib, 20);
    assert_eq!(config.default_access_mode, "ReadWriteMany");
    assert_eq!(config.default_termination_grace_period_seconds, 120);
}

#[tokio::test]
async fn test_from_file_rejects_malformed_json() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "defaultVolumeMode = Block").unwrap();

    let err = SyncConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[tokio::test]
async fn test_from_file_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");

    let err = SyncConfig::from_file(&path).await.unwrap_err();
    match err {
        SyncError::Config(message) => assert!(message.contains("sync.json")),
        other => panic!("unexpected error {other:?}"),
    }
}
