//! The three resources the VM editor can be opened on.
//!
//! A plain VM carries its spec directly; a template version wraps a VM under
//! `spec.vm`; a backup keeps the VM it was taken from under `status.source`
//! together with per-volume and per-secret backup records.

use super::virtual_machine::{Extra, ObjectMeta, VirtualMachine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A `harvesterhci.io/v1beta1` VirtualMachineTemplateVersion.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineTemplateVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TemplateVersionSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<VirtualMachine>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A `harvesterhci.io/v1beta1` VirtualMachineBackup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineBackup {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupStatus>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<VirtualMachine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_backups: Option<Vec<VolumeBackup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_backups: Option<Vec<SecretBackup>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBackup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub volume_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A backed-up secret; `data` values are base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBackup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Discriminates how a resource embeds its VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VirtualMachine,
    TemplateVersion,
    Backup,
}

/// The resource an edit session is opened on.
#[derive(Debug, Clone, PartialEq)]
pub enum VmResource {
    VirtualMachine(VirtualMachine),
    TemplateVersion(VirtualMachineTemplateVersion),
    Backup(VirtualMachineBackup),
}

impl VmResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            VmResource::VirtualMachine(_) => ResourceKind::VirtualMachine,
            VmResource::TemplateVersion(_) => ResourceKind::TemplateVersion,
            VmResource::Backup(_) => ResourceKind::Backup,
        }
    }

    /// The embedded VM, if it is present yet.
    pub fn vm(&self) -> Option<&VirtualMachine> {
        match self {
            VmResource::VirtualMachine(vm) => Some(vm),
            VmResource::TemplateVersion(version) => version.spec.vm.as_ref(),
            VmResource::Backup(backup) => backup.status.as_ref()?.source.as_ref(),
        }
    }

    /// Metadata of the outer resource (the VM itself for plain VMs).
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            VmResource::VirtualMachine(vm) => &vm.metadata,
            VmResource::TemplateVersion(version) => &version.metadata,
            VmResource::Backup(backup) => &backup.metadata,
        }
    }

    pub fn volume_backups(&self) -> &[VolumeBackup] {
        match self {
            VmResource::Backup(backup) => backup
                .status
                .as_ref()
                .and_then(|s| s.volume_backups.as_deref())
                .unwrap_or_default(),
            _ => &[],
        }
    }

    pub fn secret_backups(&self) -> &[SecretBackup] {
        match self {
            VmResource::Backup(backup) => backup
                .status
                .as_ref()
                .and_then(|s| s.secret_backups.as_deref())
                .unwrap_or_default(),
            _ => &[],
        }
    }

    /// Returns a copy of this resource with `vm` embedded in place of the
    /// current VM.
    pub fn with_vm(&self, vm: VirtualMachine) -> VmResource {
        match self {
            VmResource::VirtualMachine(_) => VmResource::VirtualMachine(vm),
            VmResource::TemplateVersion(version) => {
                let mut version = version.clone();
                version.spec.vm = Some(vm);
                VmResource::TemplateVersion(version)
            }
            VmResource::Backup(backup) => {
                let mut backup = backup.clone();
                backup.status.get_or_insert_with(Default::default).source = Some(vm);
                VmResource::Backup(backup)
            }
        }
    }

    /// The VM to submit, consuming the resource.
    pub fn into_vm(self) -> Option<VirtualMachine> {
        match self {
            VmResource::VirtualMachine(vm) => Some(vm),
            VmResource::TemplateVersion(version) => version.spec.vm,
            VmResource::Backup(backup) => backup.status?.source,
        }
    }
}

impl From<VirtualMachine> for VmResource {
    fn from(vm: VirtualMachine) -> Self {
        VmResource::VirtualMachine(vm)
    }
}

impl From<VirtualMachineTemplateVersion> for VmResource {
    fn from(version: VirtualMachineTemplateVersion) -> Self {
        VmResource::TemplateVersion(version)
    }
}

impl From<VirtualMachineBackup> for VmResource {
    fn from(backup: VirtualMachineBackup) -> Self {
        VmResource::Backup(backup)
    }
}
