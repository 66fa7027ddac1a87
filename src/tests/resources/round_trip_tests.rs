use super::super::{USER_DATA, snapshot, vm, vm_json};
use crate::core::domain::constants::ANNOTATION_VOLUME_CLAIM_TEMPLATES;
use crate::core::domain::value_object::serde_helpers::base64_data;
use crate::{
    DecomposeService, EditMode, InMemoryResourceStore, LoadRequest, ObjectMetaExt,
    RecomposeService, ResourceKind, SaveRequest, SyncConfig, VirtualMachineBackup, VmResource,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

fn round_trip(resource: VmResource, mode: EditMode) -> VmResource {
    let config = SyncConfig::default();
    let snapshot = snapshot();
    let mut rng = StdRng::seed_from_u64(21);
    let model = DecomposeService::new(&config, &snapshot)
        .decompose(&LoadRequest::new(resource.clone(), mode), &mut rng)
        .unwrap()
        .unwrap();
    RecomposeService::new(&config, &snapshot)
        .recompose(&model, &resource, mode, &SaveRequest::single(), &mut rng)
        .unwrap()
        .resource
}

fn template_spec(resource: &VmResource) -> Value {
    serde_json::to_value(resource.vm().unwrap()).unwrap()["spec"]["template"]["spec"].clone()
}

#[test]
fn test_unedited_round_trip_keeps_devices_and_volumes() {
    let original = VmResource::from(vm());
    let saved = round_trip(original.clone(), EditMode::Edit);
    let before = template_spec(&original);
    let after = template_spec(&saved);

    for path in ["/domain/devices/disks", "/domain/devices/interfaces", "/domain/devices/inputs"] {
        assert_eq!(after.pointer(path), before.pointer(path), "{path}");
    }
    assert_eq!(after["networks"], before["networks"]);
    assert_eq!(after["volumes"], before["volumes"]);
    assert_eq!(after["domain"]["cpu"], before["domain"]["cpu"]);
    assert_eq!(after["domain"]["resources"], before["domain"]["resources"]);
    assert_eq!(after["domain"]["machine"], before["domain"]["machine"]);
    assert_eq!(after["terminationGracePeriodSeconds"], json!(120));
    assert_eq!(after["evictionStrategy"], json!("LiveMigrate"));
}

#[test]
fn test_round_trip_keeps_claim_templates() {
    let original = VmResource::from(vm());
    let saved = round_trip(original.clone(), EditMode::Edit);

    let parse = |resource: &VmResource| -> Value {
        let raw = resource
            .vm()
            .unwrap()
            .metadata
            .annotation(ANNOTATION_VOLUME_CLAIM_TEMPLATES)
            .unwrap();
        serde_json::from_str(raw).unwrap()
    };
    let before = parse(&original);
    let after = parse(&saved);
    assert_eq!(after[0]["metadata"]["name"], before[0]["metadata"]["name"]);
    assert_eq!(
        after[0]["spec"]["resources"]["requests"]["storage"],
        json!("10Gi")
    );
    assert_eq!(after[0]["spec"]["storageClassName"], before[0]["spec"]["storageClassName"]);
    assert_eq!(after[0]["spec"]["volumeMode"], json!("Block"));
}

#[test]
fn test_cpu_count_is_stable_with_threads() {
    let mut raw = vm_json();
    raw["spec"]["template"]["spec"]["domain"]["cpu"] = json!({ "sockets": 1, "cores": 2, "threads": 2 });
    let mut resource = VmResource::from(serde_json::from_value::<crate::VirtualMachine>(raw).unwrap());

    let config = SyncConfig::default();
    let snapshot = snapshot();
    let mut rng = StdRng::seed_from_u64(21);
    for _ in 0..3 {
        let model = DecomposeService::new(&config, &snapshot)
            .decompose(&LoadRequest::new(resource.clone(), EditMode::Edit), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(model.cpu, Some(4));
        resource = RecomposeService::new(&config, &snapshot)
            .recompose(&model, &resource, EditMode::Edit, &SaveRequest::single(), &mut rng)
            .unwrap()
            .resource;
    }

    let cpu = template_spec(&resource)["domain"]["cpu"].clone();
    assert_eq!(cpu, json!({ "sockets": 1, "cores": 4, "threads": 1 }));
}

#[test]
fn test_original_resource_is_not_modified() {
    let original = VmResource::from(vm());
    let copy = original.clone();
    let _ = round_trip(original.clone(), EditMode::Clone);
    assert_eq!(original, copy);
}

#[test]
fn test_running_flag_becomes_run_strategy() {
    let mut raw = vm_json();
    raw["spec"]["running"] = json!(true);
    raw["spec"]["runStrategy"] = Value::Null;
    let resource = VmResource::from(serde_json::from_value::<crate::VirtualMachine>(raw).unwrap());

    let saved = round_trip(resource, EditMode::Edit);
    let spec = saved.vm().unwrap().spec.as_ref().unwrap();
    assert_eq!(spec.running, None);
    assert_eq!(spec.run_strategy.as_deref(), Some("RerunOnFailure"));
}

fn backup() -> VirtualMachineBackup {
    serde_json::from_value(json!({
        "metadata": { "name": "vm1-backup", "namespace": "default", "uid": "uid-backup" },
        "status": {
            "source": vm_json(),
            "volumeBackups": [{ "name": "vb-0", "volumeName": "disk-0" }],
            "secretBackups": [{
                "name": "vm1-cloudinit",
                "data": { "userdata": base64_data::encode(USER_DATA) }
            }]
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_backup_restore_writes_only_the_source_spec() {
    let resource = VmResource::from(backup());
    let mut session = crate::EditSession::builder()
        .resource(resource.clone())
        .mode(EditMode::Edit)
        .snapshot(snapshot())
        .seed(4)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(session.model().user_script.as_deref(), Some(USER_DATA));
    assert_eq!(session.model().secret_name, None);
    assert_eq!(
        session.model().disk_rows[0]
            .volume_backup
            .as_ref()
            .and_then(|b| b.name.as_deref()),
        Some("vb-0")
    );

    session.update_cpu_memory(Some(6), Some("8Gi".to_string()), None, None, false);
    let saved = session
        .save(&InMemoryResourceStore::new(), &SaveRequest::single())
        .await
        .unwrap();

    assert_eq!(saved.kind(), ResourceKind::Backup);
    let source = saved.vm().unwrap();
    let original = resource.vm().unwrap();
    assert_eq!(source.metadata, original.metadata);
    assert_eq!(source.domain().unwrap().cpu.as_ref().unwrap().cores, Some(6));
    assert_eq!(saved.volume_backups(), resource.volume_backups());
}
