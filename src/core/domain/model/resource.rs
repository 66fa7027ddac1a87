//! Collaborator resources the synchronizer reads from the resource store:
//! images, volumes, storage classes, SSH keys, secrets, settings and
//! cloud-init templates.

use super::meta::{ObjectMeta, ObjectMetaExt};
use crate::core::domain::error::{SyncError, SyncResult};
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret};

/// A Harvester VM image as the form needs it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmImage {
    /// `namespace/name`.
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// File suffix of the source (e.g. `iso`, `qcow2`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_suffix: Option<String>,
    /// Downloaded size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Virtual (expanded) size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_size: Option<u64>,
    /// OS type declared by the image (`harvesterhci.io/os` label).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default)]
    pub is_encrypted: bool,
}

impl VmImage {
    pub fn is_iso(&self) -> bool {
        self.image_suffix
            .as_deref()
            .is_some_and(|suffix| suffix.to_ascii_lowercase().ends_with("iso"))
    }

    /// The larger of the downloaded and virtual sizes.
    pub fn image_size(&self) -> Option<u64> {
        match (self.size, self.virtual_size) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
        .filter(|size| *size > 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClass {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl StorageClass {
    pub fn is_encrypted(&self) -> bool {
        self.parameters.get("encrypted").map(String::as_str) == Some("true")
    }
}

/// A `harvesterhci.io/v1beta1` KeyPair.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyPair {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SshKeyPairSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyPairSpec {
    #[serde(default)]
    pub public_key: String,
}

impl SshKeyPair {
    pub fn id(&self) -> String {
        self.metadata.id()
    }

    /// Key of this pair inside an access-credential secret.
    pub fn secret_key(&self) -> String {
        format!("{}-{}", self.metadata.namespace_str(), self.metadata.name_str())
    }
}

pub trait SecretExt {
    /// An empty secret of type `secret`.
    fn with_metadata(metadata: ObjectMeta) -> Self;
    fn id(&self) -> String;
    fn set_data(&mut self, key: &str, value: &str);
    /// Decodes the UTF-8 value stored under `key`.
    fn decoded(&self, key: &str) -> SyncResult<Option<String>>;
}

impl SecretExt for Secret {
    fn with_metadata(metadata: ObjectMeta) -> Self {
        Secret {
            metadata,
            type_: Some("secret".to_string()),
            data: Some(BTreeMap::new()),
            ..Default::default()
        }
    }

    fn id(&self) -> String {
        self.metadata.id()
    }

    fn set_data(&mut self, key: &str, value: &str) {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
    }

    fn decoded(&self, key: &str) -> SyncResult<Option<String>> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|bytes| {
                String::from_utf8(bytes.0.clone()).map_err(|e| {
                    SyncError::Parse(format!("secret key {key} is not UTF-8: {e}"))
                })
            })
            .transpose()
    }
}

/// A `harvesterhci.io/v1beta1` Setting.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Setting {
    /// The configured value, or the built-in default when unset.
    pub fn effective(&self) -> Option<&str> {
        self.value
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(self.default.as_deref())
    }
}

/// Cloud-init templates are ConfigMaps with a `cloudInit` key.
pub trait ConfigMapExt {
    fn cloud_init(&self) -> Option<&str>;
}

impl ConfigMapExt for ConfigMap {
    fn cloud_init(&self) -> Option<&str> {
        self.data.as_ref()?.get("cloudInit").map(String::as_str)
    }
}
