mod integration;
mod resources;

use crate::core::domain::model::meta::{ObjectMeta, object_meta};
use crate::core::domain::model::resource::{
    Secret, SecretExt, SshKeyPair, SshKeyPairSpec, VmImage,
};
use crate::core::domain::model::virtual_machine::VirtualMachine;
use crate::{EditMode, EditSession, ResourceSnapshot};
use serde_json::{Value, json};

pub(crate) const USER_DATA: &str = "#cloud-config\n# managed by the platform team\npassword: changeme\nchpasswd:\n  expire: false\n";

pub(crate) fn meta(namespace: &str, name: &str) -> ObjectMeta {
    object_meta(namespace, name)
}

/// A VM as Harvester stores it: one image-backed root disk, a cloud-init
/// secret, a pod network and the USB tablet.
pub(crate) fn vm_json() -> Value {
    let claim_templates = json!([{
        "metadata": {
            "name": "vm1-disk-0-abcde",
            "annotations": { "harvesterhci.io/imageId": "default/image-ubuntu" }
        },
        "spec": {
            "accessModes": ["ReadWriteMany"],
            "resources": { "requests": { "storage": "10Gi" } },
            "volumeMode": "Block",
            "storageClassName": "longhorn-image-ubuntu"
        }
    }]);

    json!({
        "apiVersion": "kubevirt.io/v1",
        "kind": "VirtualMachine",
        "metadata": {
            "name": "vm1",
            "namespace": "default",
            "uid": "uid-vm1",
            "resourceVersion": "1234",
            "annotations": {
                "harvesterhci.io/volumeClaimTemplates": claim_templates.to_string()
            },
            "labels": {
                "harvesterhci.io/creator": "harvester",
                "harvesterhci.io/os": "ubuntu"
            }
        },
        "spec": {
            "runStrategy": "RerunOnFailure",
            "template": {
                "metadata": {
                    "annotations": { "harvesterhci.io/sshNames": "[\"default/mykey\"]" },
                    "labels": { "harvesterhci.io/vmName": "vm1" }
                },
                "spec": {
                    "evictionStrategy": "LiveMigrate",
                    "terminationGracePeriodSeconds": 120,
                    "domain": {
                        "machine": { "type": "q35" },
                        "cpu": { "sockets": 1, "cores": 2, "threads": 1 },
                        "resources": { "limits": { "cpu": "2", "memory": "4Gi" } },
                        "features": { "acpi": { "enabled": true } },
                        "devices": {
                            "disks": [
                                { "name": "disk-0", "disk": { "bus": "virtio" }, "bootOrder": 1 },
                                { "name": "cloudinitdisk", "disk": { "bus": "virtio" } }
                            ],
                            "interfaces": [{
                                "name": "default",
                                "model": "virtio",
                                "masquerade": {},
                                "macAddress": "52:54:00:12:34:56"
                            }],
                            "inputs": [{ "bus": "usb", "name": "tablet", "type": "tablet" }]
                        }
                    },
                    "networks": [{ "name": "default", "pod": {} }],
                    "volumes": [
                        {
                            "name": "disk-0",
                            "persistentVolumeClaim": { "claimName": "vm1-disk-0-abcde" }
                        },
                        {
                            "name": "cloudinitdisk",
                            "cloudInitNoCloud": {
                                "secretRef": { "name": "vm1-cloudinit" },
                                "networkDataSecretRef": { "name": "vm1-cloudinit" }
                            }
                        }
                    ]
                }
            }
        }
    })
}

pub(crate) fn vm() -> VirtualMachine {
    serde_json::from_value(vm_json()).unwrap()
}

pub(crate) fn cloud_init_secret() -> Secret {
    let mut secret = Secret::with_metadata(meta("default", "vm1-cloudinit"));
    secret.set_data("userdata", USER_DATA);
    secret.set_data("networkdata", "");
    secret
}

pub(crate) fn snapshot() -> ResourceSnapshot {
    ResourceSnapshot {
        images: vec![
            VmImage {
                id: "default/image-ubuntu".to_string(),
                display_name: "ubuntu-22.04.qcow2".to_string(),
                storage_class_name: Some("longhorn-image-ubuntu".to_string()),
                image_suffix: Some("qcow2".to_string()),
                virtual_size: Some(2 * 1024 * 1024 * 1024),
                os_type: Some("ubuntu".to_string()),
                ..Default::default()
            },
            VmImage {
                id: "default/image-sles".to_string(),
                display_name: "sles15.iso".to_string(),
                storage_class_name: Some("longhorn-image-sles".to_string()),
                image_suffix: Some("iso".to_string()),
                // 3.5 GiB
                virtual_size: Some(3_758_096_384),
                os_type: Some("SLEs".to_string()),
                ..Default::default()
            },
        ],
        ssh_keys: vec![SshKeyPair {
            metadata: meta("default", "mykey"),
            spec: SshKeyPairSpec {
                public_key: "ssh-ed25519 AAAAC3Nza mykey".to_string(),
            },
        }],
        secrets: vec![cloud_init_secret()],
        ..Default::default()
    }
}

pub(crate) fn edit_session(mode: EditMode) -> EditSession {
    EditSession::builder()
        .resource(vm())
        .mode(mode)
        .snapshot(snapshot())
        .seed(11)
        .load()
        .unwrap()
        .unwrap()
}
