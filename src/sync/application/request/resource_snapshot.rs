use crate::core::domain::model::meta::ObjectMetaExt;
use crate::core::domain::model::resource::{
    ConfigMap, ConfigMapExt, PersistentVolumeClaim, Secret, Setting, SshKeyPair, StorageClass,
    VmImage,
};
use serde::{Deserialize, Serialize};

/// A read-only copy of the collaborator resources the mapping consults.
///
/// The caller fetches these once per edit session; decompose and recompose
/// never reach back into the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub images: Vec<VmImage>,
    pub pvcs: Vec<PersistentVolumeClaim>,
    pub storage_classes: Vec<StorageClass>,
    pub ssh_keys: Vec<SshKeyPair>,
    pub secrets: Vec<Secret>,
    pub settings: Vec<Setting>,
    /// Cloud-init templates.
    pub config_maps: Vec<ConfigMap>,
}

impl ResourceSnapshot {
    pub fn image(&self, id: &str) -> Option<&VmImage> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn pvc(&self, namespace: &str, name: &str) -> Option<&PersistentVolumeClaim> {
        self.pvcs
            .iter()
            .find(|pvc| pvc.metadata.is_named(namespace, name))
    }

    pub fn storage_class(&self, name: &str) -> Option<&StorageClass> {
        self.storage_classes
            .iter()
            .find(|class| class.metadata.name_str() == name)
    }

    /// Whether the claim's storage class encrypts its volumes.
    pub fn is_pvc_encrypted(&self, pvc: &PersistentVolumeClaim) -> bool {
        pvc.spec
            .as_ref()
            .and_then(|spec| spec.storage_class_name.as_deref())
            .and_then(|name| self.storage_class(name))
            .is_some_and(StorageClass::is_encrypted)
    }

    pub fn ssh_key(&self, id: &str) -> Option<&SshKeyPair> {
        self.ssh_keys.iter().find(|key| key.id() == id)
    }

    /// Public keys of the given key pair ids, skipping unknown ids.
    pub fn ssh_public_keys(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.ssh_key(id))
            .map(|key| key.spec.public_key.clone())
            .collect()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<&Secret> {
        self.secrets
            .iter()
            .find(|s| s.metadata.is_named(namespace, name))
    }

    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings.iter().find(|s| s.metadata.name_str() == name)
    }

    /// The `cloudInit` text of a cloud-init template, by `namespace/name`.
    pub fn cloud_init_template(&self, id: &str) -> Option<&str> {
        self.config_maps
            .iter()
            .find(|map| map.metadata.id() == id)
            .and_then(|map| map.cloud_init())
    }
}
