use super::{USER_DATA, cloud_init_secret, edit_session, snapshot, vm_json};
use crate::core::domain::constants::{
    ANNOTATION_CPU_MEMORY_HOTPLUG, ANNOTATION_DYNAMIC_SSH_KEY_NAMES,
    ANNOTATION_DYNAMIC_SSH_KEY_USERS, ANNOTATION_VOLUME_CLAIM_TEMPLATES, HARVESTER_API_VERSION,
    LABEL_CLOUD_INIT, LABEL_OS,
};
use crate::core::domain::model::volume::{ClaimSpecExt, VolumeClaimTemplate};
use crate::core::infrastructure::resource_store::MockResourceStore;
use crate::{
    AccessCredentialRow, CredentialKind, DiskSource, DiskType, EditMode, EditSession,
    InMemoryResourceStore, ObjectMetaExt, OsType, ResourceKind, SaveRequest, SecretExt,
    SyncError, SyncResult, ValidationError, VirtualMachine, VirtualMachineTemplateVersion,
    VmResource,
};
use serde_json::json;

fn claim_templates(vm: &VirtualMachine) -> Vec<VolumeClaimTemplate> {
    serde_json::from_str(
        vm.metadata
            .annotation(ANNOTATION_VOLUME_CLAIM_TEMPLATES)
            .unwrap(),
    )
    .unwrap()
}

#[test]
fn test_edit_load_reads_existing_vm() {
    let session = edit_session(EditMode::Edit);
    let model = session.model();

    assert_eq!(model.cpu, Some(2));
    assert_eq!(model.memory.as_deref(), Some("4Gi"));
    assert!(!model.cpu_memory_hotplug_enabled);
    assert_eq!(model.machine_type, "q35");
    assert_eq!(model.os_type, OsType::Ubuntu);
    assert_eq!(model.image_id, "default/image-ubuntu");
    assert_eq!(model.ssh_key, vec!["default/mykey".to_string()]);
    assert_eq!(model.user_script.as_deref(), Some(USER_DATA));
    assert!(!model.install_agent);
    assert_eq!(model.secret_ref.as_deref(), Some("vm1-cloudinit"));
    assert_eq!(model.secret_name.as_deref(), Some("vm1-cloudinit"));
    assert!(!model.save_user_data_as_clear_text);
    assert!(model.install_usb_tablet);

    assert_eq!(model.disk_rows.len(), 1);
    let disk = &model.disk_rows[0];
    assert_eq!(disk.source, DiskSource::Image);
    assert_eq!(disk.size, "10Gi");
    assert_eq!(disk.real_name, "vm1-disk-0-abcde");
    assert_eq!(model.network_rows[0].network_name, "management Network");
}

#[tokio::test]
async fn test_edit_save_preserves_unmanaged_fields_and_names() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);

    let saved = session.save(&store, &SaveRequest::single()).await?;
    let vm = saved.vm().unwrap();
    let raw = serde_json::to_value(vm)?;

    assert_eq!(raw["metadata"]["resourceVersion"], "1234");
    assert_eq!(raw["spec"]["template"]["spec"]["evictionStrategy"], "LiveMigrate");
    assert_eq!(raw["spec"]["template"]["spec"]["domain"]["features"]["acpi"]["enabled"], true);

    let volumes = vm.vmi_spec().unwrap().volumes.as_ref().unwrap();
    assert_eq!(volumes[0].claim_name(), Some("vm1-disk-0-abcde"));
    let cloud_init = volumes[1].cloud_init_no_cloud.as_ref().unwrap();
    assert_eq!(cloud_init.secret_ref.as_ref().unwrap().name, "vm1-cloudinit");

    let templates = claim_templates(vm);
    assert_eq!(templates[0].spec.storage(), Some("10Gi"));
    assert_eq!(
        templates[0].metadata.annotation("harvesterhci.io/imageId"),
        Some("default/image-ubuntu")
    );

    let secrets = store.secrets().await;
    assert_eq!(secrets.len(), 1);
    let user_data = secrets[0].decoded("userdata")?.unwrap();
    assert!(user_data.starts_with("#cloud-config\n# managed by the platform team\n"));
    assert!(user_data.contains("ssh-ed25519 AAAAC3Nza mykey"));
    Ok(())
}

#[tokio::test]
async fn test_saved_spec_decomposes_to_same_values() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;

    let mut snapshot = snapshot();
    snapshot.secrets = store.secrets().await;
    let reloaded = EditSession::builder()
        .resource(saved)
        .mode(EditMode::Edit)
        .snapshot(snapshot)
        .seed(5)
        .load()?
        .unwrap();

    let before = session.model();
    let after = reloaded.model();
    assert_eq!(after.cpu, before.cpu);
    assert_eq!(after.memory, before.memory);
    assert_eq!(after.disk_rows[0].size, before.disk_rows[0].size);
    assert_eq!(after.ssh_key, before.ssh_key);
    assert!(after.user_script.as_deref().unwrap().contains("ssh-ed25519 AAAAC3Nza mykey"));
    Ok(())
}

#[tokio::test]
async fn test_create_generates_new_secret_with_agent() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Create);
    assert!(session.model().install_agent);
    assert!(
        session
            .model()
            .network_rows
            .iter()
            .all(|row| row.new_create_id.as_ref().is_some_and(|id| id.len() == 10))
    );

    let store = InMemoryResourceStore::new();
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let secret_name = session.model().secret_name.clone().unwrap();
    assert_ne!(secret_name, "vm1-cloudinit");
    assert!(secret_name.starts_with("vm1-"));

    let secrets = store.secrets().await;
    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets[0].metadata.name_str(), secret_name);
    assert_eq!(secrets[0].metadata.label(LABEL_CLOUD_INIT), Some("harvester"));
    assert!(secrets[0].decoded("userdata")?.unwrap().contains("qemu-guest-agent"));

    let vm = saved.vm().unwrap();
    assert_eq!(vm.metadata.label(LABEL_OS), Some("ubuntu"));
    Ok(())
}

#[test]
fn test_new_vm_with_iso_image_gets_cdrom_root_disk() {
    let blank: VirtualMachine = serde_json::from_value(json!({
        "metadata": { "name": "vm2", "namespace": "default" },
        "spec": { "template": { "spec": { "domain": {
            "cpu": { "cores": 1 },
            "resources": { "limits": { "memory": "2Gi" } },
            "devices": {}
        } } } }
    }))
    .unwrap();

    let mut session = EditSession::builder()
        .resource(blank)
        .mode(EditMode::Create)
        .snapshot(snapshot())
        .image("default/image-sles")
        .seed(1)
        .load()
        .unwrap()
        .unwrap();

    let row = &session.model().disk_rows[0];
    assert_eq!(row.bus, "sata");
    assert_eq!(row.disk_type, DiskType::CdRom);
    assert_eq!(row.size, "4Gi");
    assert_eq!(row.name, "disk-0");

    session.set_root_image("default/image-sles").unwrap();
    assert_eq!(session.model().os_type, OsType::Sles);
    assert!(
        session
            .model()
            .user_script
            .as_deref()
            .unwrap()
            .contains("qemu-ga.service")
    );
}

#[tokio::test]
async fn test_disabling_hotplug_removes_hotplug_shape() -> SyncResult<()> {
    let mut raw = vm_json();
    raw["metadata"]["annotations"][ANNOTATION_CPU_MEMORY_HOTPLUG] = json!("true");
    raw["spec"]["template"]["spec"]["resources"] = json!({ "overcommitGuestOverhead": true });
    raw["spec"]["template"]["spec"]["domain"]["cpu"] = json!({ "sockets": 2, "cores": 1, "maxSockets": 8 });
    raw["spec"]["template"]["spec"]["domain"]["memory"] = json!({ "guest": "4Gi", "maxGuest": "16Gi" });
    raw["spec"]["template"]["spec"]["domain"]["resources"] = json!({ "limits": { "cpu": "8", "memory": "16Gi" } });
    let vm: VirtualMachine = serde_json::from_value(raw)?;

    let mut session = EditSession::builder()
        .resource(vm)
        .mode(EditMode::Edit)
        .snapshot(snapshot())
        .seed(2)
        .load()?
        .unwrap();
    let model = session.model();
    assert!(model.cpu_memory_hotplug_enabled);
    assert_eq!((model.cpu, model.max_cpu), (Some(2), Some(8)));
    assert_eq!(model.max_memory.as_deref(), Some("16Gi"));

    session.update_cpu_memory(Some(2), Some("4Gi".to_string()), None, None, false);
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let vm = saved.vm().unwrap();
    let domain = vm.domain().unwrap();

    assert_eq!(domain.cpu.as_ref().unwrap().max_sockets, None);
    assert_eq!(domain.cpu.as_ref().unwrap().cores, Some(2));
    assert!(domain.memory.is_none());
    assert!(vm.vmi_spec().unwrap().resources.is_none());
    assert_eq!(domain.resources.as_ref().unwrap().limit("memory").as_deref(), Some("4Gi"));
    assert_eq!(vm.metadata.annotation(ANNOTATION_CPU_MEMORY_HOTPLUG), None);
    Ok(())
}

#[tokio::test]
async fn test_enabling_hotplug_writes_hotplug_shape() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    session.update_cpu_memory(
        Some(2),
        Some("4Gi".to_string()),
        Some(8),
        Some("16Gi".to_string()),
        true,
    );
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let domain = saved.vm().unwrap().domain().unwrap();

    let cpu = domain.cpu.as_ref().unwrap();
    assert_eq!((cpu.sockets, cpu.cores, cpu.max_sockets), (Some(2), Some(1), Some(8)));
    let memory = domain.memory.as_ref().unwrap();
    assert_eq!(memory.guest.as_deref(), Some("4Gi"));
    assert_eq!(memory.max_guest.as_deref(), Some("16Gi"));
    let resources = domain.resources.as_ref().unwrap();
    assert_eq!(resources.limit("cpu").as_deref(), Some("8"));
    assert_eq!(resources.limit("memory").as_deref(), Some("16Gi"));
    Ok(())
}

#[tokio::test]
async fn test_boot_order_follows_row_order() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    session.add_volume();
    session.add_volume();
    session.model_mut().disk_rows.reverse();
    let names: Vec<String> = session
        .model()
        .disk_rows
        .iter()
        .map(|row| row.name.clone())
        .collect();
    assert_eq!(names, vec!["disk-2", "disk-1", "disk-0"]);

    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let disks = saved.vm().unwrap().domain().unwrap().devices.disks.clone().unwrap();

    for (index, name) in names.iter().enumerate() {
        assert_eq!(&disks[index].name, name);
        assert_eq!(disks[index].boot_order, Some(index as u32 + 1));
    }
    // New volumes get fresh claim names; the existing one keeps its name.
    let templates = claim_templates(saved.vm().unwrap());
    assert_eq!(templates.len(), 3);
    assert!(templates[0].metadata.name_str().starts_with("vm1-disk-2-"));
    assert_eq!(templates[2].metadata.name_str(), "vm1-disk-0-abcde");
    Ok(())
}

#[tokio::test]
async fn test_clone_forces_new_volume_names() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Clone);
    let store = InMemoryResourceStore::new();
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let claim = saved.vm().unwrap().vmi_spec().unwrap().volumes.as_ref().unwrap()[0]
        .claim_name()
        .unwrap()
        .to_string();
    assert_ne!(claim, "vm1-disk-0-abcde");
    assert!(claim.starts_with("vm1-disk-0-"));
    Ok(())
}

#[tokio::test]
async fn test_hotplug_without_maxima_is_rejected() {
    let mut session = edit_session(EditMode::Edit);
    session.update_cpu_memory(Some(2), Some("4Gi".to_string()), None, None, true);

    let mut store = MockResourceStore::new();
    store.expect_save_secret().never();

    let err = session.save(&store, &SaveRequest::single()).await.unwrap_err();
    match err {
        SyncError::Validation { errors } => assert_eq!(
            errors,
            vec![
                ValidationError::required("Maximum CPU"),
                ValidationError::required("Maximum Memory")
            ]
        ),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_validation_failure_touches_no_store() {
    let mut session = edit_session(EditMode::Edit);
    session.update_cpu_memory(None, Some("4Gi".to_string()), None, None, false);

    let mut store = MockResourceStore::new();
    store.expect_secret().never();
    store.expect_save_secret().never();

    let err = session.save(&store, &SaveRequest::single()).await.unwrap_err();
    match err {
        SyncError::Validation { errors } => {
            assert_eq!(errors, vec![ValidationError::required("CPU")]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_template_version_save_wraps_vm() -> SyncResult<()> {
    let mut vm = vm_json();
    vm["metadata"]["labels"] = json!({});
    let version: VirtualMachineTemplateVersion = serde_json::from_value(json!({
        "apiVersion": "harvesterhci.io/v1beta1",
        "kind": "VirtualMachineTemplateVersion",
        "metadata": { "name": "tpl-v1", "namespace": "default", "uid": "uid-tpl" },
        "spec": { "templateId": "default/tpl", "vm": vm }
    }))?;

    let mut session = EditSession::builder()
        .resource(version)
        .mode(EditMode::Edit)
        .snapshot(snapshot())
        .seed(3)
        .load()?
        .unwrap();
    // No OS label: the root image decides.
    assert_eq!(session.model().os_type, OsType::Ubuntu);
    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;

    assert_eq!(saved.kind(), ResourceKind::TemplateVersion);
    let VmResource::TemplateVersion(version) = &saved else {
        panic!("expected a template version");
    };
    assert_eq!(version.spec.extra["templateId"], "default/tpl");
    let vm = version.spec.vm.as_ref().unwrap();
    assert!(vm.metadata.annotation(ANNOTATION_VOLUME_CLAIM_TEMPLATES).is_some());
    assert_eq!(vm.metadata.label(LABEL_OS), Some("ubuntu"));
    assert_eq!(vm.metadata.label("harvesterhci.io/creator"), None);

    // Template versions always get their own cloud-init secret.
    let created = store
        .secrets()
        .await
        .into_iter()
        .find(|s| s.metadata.name_str() != "vm1-cloudinit")
        .unwrap();
    assert!(created.metadata.name_str().starts_with("tpl-v1-"));
    let owner = &created.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.api_version, HARVESTER_API_VERSION);
    assert_eq!(owner.kind, "VirtualMachineTemplateVersion");
    Ok(())
}

#[tokio::test]
async fn test_windows_has_no_cloud_init() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    session.set_os_type(OsType::Windows)?;
    let model = session.model();
    assert!(model.ssh_key.is_empty());
    assert!(model.user_script.is_none());
    assert!(model.network_script.is_none());
    assert!(!model.install_agent);

    let store = InMemoryResourceStore::new();
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let vm = saved.vm().unwrap();
    let volumes = vm.vmi_spec().unwrap().volumes.as_ref().unwrap();
    assert!(volumes.iter().all(|v| v.cloud_init_no_cloud.is_none()));
    assert!(store.secrets().await.is_empty());

    session.set_os_type(OsType::Ubuntu)?;
    assert!(session.model().install_agent);
    assert!(
        session
            .model()
            .user_script
            .as_deref()
            .unwrap()
            .contains("qemu-guest-agent.service")
    );
    Ok(())
}

#[test]
fn test_deselected_ssh_key_is_removed_on_create() {
    let mut session = edit_session(EditMode::Create);
    session.set_ssh_keys(vec!["default/mykey".to_string()]);
    assert!(
        session
            .model()
            .user_script
            .as_deref()
            .unwrap()
            .contains("ssh-ed25519 AAAAC3Nza mykey")
    );

    session.set_ssh_keys(Vec::new());
    let user_script = session.model().user_script.clone().unwrap();
    assert!(!user_script.contains("mykey"));
    assert!(user_script.contains("qemu-guest-agent"));
    assert!(session.model().install_agent);
}

#[test]
fn test_user_script_drives_install_agent() {
    let mut session = edit_session(EditMode::Edit);
    assert!(!session.model().install_agent);

    session.set_install_agent(true, false);
    assert!(session.model().install_agent);
    let with_agent = session.model().user_script.clone().unwrap();
    assert!(with_agent.contains("# managed by the platform team"));

    session.set_user_script(Some(USER_DATA.to_string()));
    assert!(!session.model().install_agent);

    session.set_user_script(Some(with_agent));
    assert!(session.model().install_agent);

    session.set_install_agent(false, true);
    let without = session.model().user_script.clone().unwrap();
    assert!(!without.contains("qemu-guest-agent"));
    assert!(without.contains("password: changeme"));
}

#[tokio::test]
async fn test_access_credentials_are_saved_and_annotated() -> SyncResult<()> {
    let mut session = edit_session(EditMode::Edit);
    session.model_mut().access_credentials = vec![
        AccessCredentialRow {
            source: CredentialKind::ResetPassword,
            username: "root".to_string(),
            new_password: "s3cret!".to_string(),
            secret_name: "vm1-pw".to_string(),
            ..Default::default()
        },
        AccessCredentialRow {
            source: CredentialKind::InjectSsh,
            users: vec!["ubuntu".to_string(), "root".to_string()],
            sshkeys: vec!["default/mykey".to_string()],
            secret_name: "vm1-ssh".to_string(),
            ..Default::default()
        },
    ];

    let store = InMemoryResourceStore::with_secrets([cloud_init_secret()]);
    let saved = session.save(&store, &SaveRequest::single()).await?;
    let vm = saved.vm().unwrap();

    let credentials = vm.vmi_spec().unwrap().access_credentials.as_ref().unwrap();
    assert_eq!(credentials.len(), 2);
    assert!(credentials[0].user_password.is_some());
    let ssh = credentials[1].ssh_public_key.as_ref().unwrap();
    assert_eq!(ssh.source.secret.secret_name, "vm1-ssh");

    let template_meta = vm.template_meta().unwrap();
    assert_eq!(
        template_meta.annotation(ANNOTATION_DYNAMIC_SSH_KEY_USERS),
        Some(r#"["root","ubuntu"]"#)
    );
    assert_eq!(
        template_meta.annotation(ANNOTATION_DYNAMIC_SSH_KEY_NAMES),
        Some(r#"{"vm1-ssh":["default/mykey"]}"#)
    );

    let secrets = store.secrets().await;
    let password = secrets.iter().find(|s| s.metadata.name_str() == "vm1-pw").unwrap();
    assert_eq!(password.decoded("root")?.as_deref(), Some("s3cret!"));
    let keys = secrets.iter().find(|s| s.metadata.name_str() == "vm1-ssh").unwrap();
    assert_eq!(
        keys.decoded("default-mykey")?.as_deref(),
        Some("ssh-ed25519 AAAAC3Nza mykey")
    );

    // Loading the saved VM restores both rows.
    let mut snapshot = snapshot();
    snapshot.secrets = secrets;
    let reloaded = EditSession::builder()
        .resource(saved)
        .mode(EditMode::Edit)
        .snapshot(snapshot)
        .load()?
        .unwrap();
    let rows = &reloaded.model().access_credentials;
    assert_eq!(rows[0].username, "root");
    assert_eq!(rows[0].new_password, "s3cret!");
    assert_eq!(rows[0].secret_ref.as_deref(), Some("vm1-pw"));
    assert_eq!(rows[1].users, vec!["ubuntu", "root"]);
    assert_eq!(rows[1].sshkeys, vec!["default/mykey"]);
    Ok(())
}

#[test]
fn test_builder_requires_resource() {
    let err = EditSession::builder().load().err().unwrap();
    assert!(matches!(err, SyncError::Validation { .. }));
}
