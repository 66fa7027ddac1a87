//! Domain models for the KubeVirt `VirtualMachine` resource.
//!
//! Only the fields the VM editor manages are typed. Every struct carries a
//! flattened `extra` map so fields the editor does not know about survive a
//! load/save cycle untouched.

use super::domain::DomainSpec;
use super::volume::{Network, Volume};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use super::meta::{ObjectMeta, OwnerReference};
pub use k8s_openapi::api::core::v1::Affinity;

/// Unmanaged fields preserved verbatim.
pub type Extra = Map<String, Value>;

/// A KubeVirt virtual machine (`kubevirt.io/v1`, kind `VirtualMachine`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<VirtualMachineSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl VirtualMachine {
    /// The instance template spec, if the resource has loaded that far.
    pub fn vmi_spec(&self) -> Option<&VmiSpec> {
        self.spec.as_ref()?.template.as_ref()?.spec.as_ref()
    }

    pub fn domain(&self) -> Option<&DomainSpec> {
        self.vmi_spec()?.domain.as_ref()
    }

    pub fn template_meta(&self) -> Option<&ObjectMeta> {
        self.spec.as_ref()?.template.as_ref()?.metadata.as_ref()
    }

    pub fn template_mut(&mut self) -> &mut VmiTemplate {
        self.spec
            .get_or_insert_with(Default::default)
            .template
            .get_or_insert_with(Default::default)
    }

    pub fn template_meta_mut(&mut self) -> &mut ObjectMeta {
        self.template_mut()
            .metadata
            .get_or_insert_with(Default::default)
    }

    pub fn vmi_spec_mut(&mut self) -> &mut VmiSpec {
        self.template_mut().spec.get_or_insert_with(Default::default)
    }

    pub fn domain_mut(&mut self) -> &mut DomainSpec {
        self.vmi_spec_mut()
            .domain
            .get_or_insert_with(Default::default)
    }
}

/// `VirtualMachine.spec`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_strategy: Option<String>,
    /// Legacy boolean superseded by `runStrategy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<VmiTemplate>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// `VirtualMachine.spec.template`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmiTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<VmiSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// `VirtualMachine.spec.template.spec`, the instance specification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmiSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<Network>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_credentials: Option<Vec<AccessCredential>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
    /// Pod-level resources, only present on hotplug-shaped specs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One entry of `spec.template.spec.accessCredentials`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<CredentialSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_password: Option<CredentialSpec>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Source secret and propagation method of an access credential.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    #[serde(default)]
    pub source: CredentialSecretSource,
    #[serde(default)]
    pub propagation_method: PropagationMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSecretSource {
    #[serde(default)]
    pub secret: SecretName,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretName {
    #[serde(default)]
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qemu_guest_agent: Option<QemuGuestAgentPropagation>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QemuGuestAgentPropagation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}
