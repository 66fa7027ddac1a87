//! Domain models for volumes, networks and the volume-claim templates
//! Harvester keeps in the `harvesterhci.io/volumeClaimTemplates` annotation.

use super::meta::ObjectMeta;
use super::virtual_machine::Extra;
use k8s_openapi::api::core::v1::VolumeResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, TypedLocalObjectReference};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PvcVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_disk: Option<ContainerDisk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_init_no_cloud: Option<CloudInitNoCloud>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Volume {
    pub fn claim_name(&self) -> Option<&str> {
        self.persistent_volume_claim
            .as_ref()
            .map(|pvc| pvc.claim_name.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvcVolumeSource {
    #[serde(default)]
    pub claim_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotpluggable: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDisk {
    #[serde(default)]
    pub image: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Cloud-init data, inline or through a secret reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloud {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data_secret_ref: Option<LocalObjectReference>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalObjectReference {
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A network definition; either `pod` or `multus` is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<Extra>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multus: Option<MultusNetwork>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultusNetwork {
    #[serde(default)]
    pub network_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A PersistentVolumeClaim template provisioned for one disk row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
}

pub trait ClaimSpecExt {
    fn storage(&self) -> Option<&str>;
    fn first_access_mode(&self) -> Option<&str>;
}

impl ClaimSpecExt for PersistentVolumeClaimSpec {
    fn storage(&self) -> Option<&str> {
        self.resources
            .as_ref()?
            .requests
            .as_ref()?
            .get("storage")
            .map(|quantity| quantity.0.as_str())
    }

    fn first_access_mode(&self) -> Option<&str> {
        self.access_modes.as_ref()?.first().map(String::as_str)
    }
}

/// Resource requirements requesting `size` of storage.
pub fn storage_request(size: impl Into<String>) -> VolumeResourceRequirements {
    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), K8sQuantity(size.into()));
    VolumeResourceRequirements {
        requests: Some(requests),
        ..Default::default()
    }
}
