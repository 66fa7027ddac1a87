use super::super::{cloud_init_secret, edit_session, snapshot};
use crate::core::domain::model::resource::Secret;
use crate::core::infrastructure::resource_store::MockResourceStore;
use crate::{
    AccessCredentialRow, CredentialKind, EditMode, InMemoryResourceStore, ObjectMetaExt,
    PersistService, RecomposeService, SaveRequest, SecretExt, SyncError,
};
use mockall::Sequence;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn credential_rows() -> Vec<AccessCredentialRow> {
    vec![
        AccessCredentialRow {
            source: CredentialKind::ResetPassword,
            username: "root".to_string(),
            new_password: "password1".to_string(),
            secret_name: "vm1-pw".to_string(),
            ..Default::default()
        },
        AccessCredentialRow {
            source: CredentialKind::InjectSsh,
            users: vec!["ubuntu".to_string()],
            sshkeys: vec!["default/mykey".to_string()],
            secret_name: "vm1-ssh".to_string(),
            ..Default::default()
        },
    ]
}

#[tokio::test]
async fn test_store_failure_stops_after_first_secret() {
    let mut session = edit_session(EditMode::Edit);
    session.model_mut().access_credentials = credential_rows();

    let mut store = MockResourceStore::new();
    let mut seq = Sequence::new();
    store
        .expect_secret()
        .returning(|_, name| Ok((name == "vm1-cloudinit").then(cloud_init_secret)));
    // cloud-init secret, then the first credential secret
    store
        .expect_save_secret()
        .times(2)
        .in_sequence(&mut seq)
        .returning(Ok);
    store
        .expect_save_secret()
        .withf(|secret: &Secret| secret.metadata.name_str() == "vm1-ssh")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(SyncError::Store("connection reset".to_string())));

    let err = session
        .save(&store, &SaveRequest::single())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(ref message) if message == "connection reset"));
}

#[tokio::test]
async fn test_missing_key_writes_no_credential_secret() {
    let mut session = edit_session(EditMode::Edit);
    let mut rows = credential_rows();
    rows[1].sshkeys = vec!["default/gone".to_string()];
    session.model_mut().access_credentials = rows;

    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let err = session
        .save(&store, &SaveRequest::single())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NotFound { ref id, .. } if id == "default/gone"));
    let names: Vec<String> = store
        .secrets()
        .await
        .into_iter()
        .filter_map(|s| s.metadata.name)
        .collect();
    assert_eq!(names, vec!["vm1-cloudinit"]);
}

#[tokio::test]
async fn test_existing_credential_secret_is_updated_in_place() {
    let mut session = edit_session(EditMode::Edit);
    let mut rows = credential_rows();
    rows.truncate(1);
    rows[0].secret_ref = Some("vm1-pw".to_string());
    session.model_mut().access_credentials = rows;

    let mut existing = Secret::with_metadata(super::super::meta("default", "vm1-pw"));
    existing.set_data("root", "old-password");
    existing.set_data("admin", "kept");
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret(), existing]);

    session.save(&store, &SaveRequest::single()).await.unwrap();
    let saved = store
        .secrets()
        .await
        .into_iter()
        .find(|s| s.metadata.name_str() == "vm1-pw")
        .unwrap();
    assert_eq!(saved.decoded("root").unwrap().as_deref(), Some("password1"));
    assert_eq!(saved.decoded("admin").unwrap().as_deref(), Some("kept"));
}

#[tokio::test]
async fn test_clear_text_user_data_is_inlined() {
    let session = {
        let mut session = edit_session(EditMode::Edit);
        let model = session.model_mut();
        model.save_user_data_as_clear_text = true;
        model.save_network_data_as_clear_text = true;
        session
    };
    let snapshot = snapshot();
    let config = session.config().clone();
    let output = RecomposeService::new(&config, &snapshot)
        .recompose(
            session.model(),
            session.original(),
            EditMode::Edit,
            &SaveRequest::single(),
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();

    let volumes = output.resource.vm().unwrap().vmi_spec().unwrap().volumes.clone().unwrap();
    let cloud_init = volumes
        .iter()
        .find_map(|v| v.cloud_init_no_cloud.as_ref())
        .unwrap();
    assert!(cloud_init.secret_ref.is_none());
    assert!(cloud_init.user_data.as_deref().unwrap().contains("password: changeme"));

    let mut store = MockResourceStore::new();
    store
        .expect_secret()
        .returning(|_, name| Ok((name == "vm1-cloudinit").then(cloud_init_secret)));
    store.expect_save_secret().never();
    let saved = PersistService::new(&store, &snapshot)
        .save_cloud_init_secret(&output, session.model(), EditMode::Edit)
        .await
        .unwrap();
    assert!(saved.is_none());
}
