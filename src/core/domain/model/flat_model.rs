//! The flat, form-friendly view of a virtual machine.
//!
//! A [`FlatModel`] is produced by decomposing a VM spec, edited through an
//! [`crate::EditSession`] and recomposed into a new spec at save time. It is
//! never persisted itself.

use super::vm_resource::VolumeBackup;
use serde::{Deserialize, Serialize};
use super::volume::TypedLocalObjectReference;

/// How the editor was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    #[default]
    Create,
    Edit,
    Clone,
    View,
}

impl EditMode {
    pub fn is_create(self) -> bool {
        matches!(self, EditMode::Create)
    }

    pub fn is_clone(self) -> bool {
        matches!(self, EditMode::Clone)
    }

    pub fn is_edit(self) -> bool {
        matches!(self, EditMode::Edit)
    }
}

/// Guest operating system, as stored in the `harvesterhci.io/os` label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum OsType {
    #[serde(rename = "windows")]
    Windows,
    #[default]
    #[serde(rename = "linux")]
    Linux,
    #[serde(rename = "SLEs")]
    Sles,
    #[serde(rename = "debian")]
    Debian,
    #[serde(rename = "fedora")]
    Fedora,
    #[serde(rename = "gentoo")]
    Gentoo,
    #[serde(rename = "oracle")]
    Oracle,
    #[serde(rename = "redhat")]
    RedHat,
    #[serde(rename = "openSUSE")]
    OpenSuse,
    #[serde(rename = "ubuntu")]
    Ubuntu,
    #[serde(rename = "otherLinux")]
    OtherLinux,
}

impl OsType {
    pub const ALL: [OsType; 11] = [
        OsType::Windows,
        OsType::Linux,
        OsType::Sles,
        OsType::Debian,
        OsType::Fedora,
        OsType::Gentoo,
        OsType::Oracle,
        OsType::RedHat,
        OsType::OpenSuse,
        OsType::Ubuntu,
        OsType::OtherLinux,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OsType::Windows => "windows",
            OsType::Linux => "linux",
            OsType::Sles => "SLEs",
            OsType::Debian => "debian",
            OsType::Fedora => "fedora",
            OsType::Gentoo => "gentoo",
            OsType::Oracle => "oracle",
            OsType::RedHat => "redhat",
            OsType::OpenSuse => "openSUSE",
            OsType::Ubuntu => "ubuntu",
            OsType::OtherLinux => "otherLinux",
        }
    }

    /// Extra spellings recognised when inferring the OS from an image.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            OsType::RedHat => &["redhat", "rhel"],
            OsType::OtherLinux => &["centos"],
            _ => &[],
        }
    }

    /// Resolves an OS label or image OS name, case-insensitively.
    pub fn from_label(label: &str) -> Option<OsType> {
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        OsType::ALL.into_iter().find(|os| {
            os.as_str().eq_ignore_ascii_case(label)
                || os.aliases().iter().any(|a| a.eq_ignore_ascii_case(label))
        })
    }

    pub fn is_windows(self) -> bool {
        matches!(self, OsType::Windows)
    }

    /// SUSE distributions ship the guest agent as `qemu-ga.service`.
    pub fn is_suse_family(self) -> bool {
        matches!(self, OsType::Sles | OsType::OpenSuse)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum RunStrategy {
    Always,
    #[default]
    RerunOnFailure,
    Manual,
    Halted,
}

impl RunStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStrategy::Always => "Always",
            RunStrategy::RerunOnFailure => "RerunOnFailure",
            RunStrategy::Manual => "Manual",
            RunStrategy::Halted => "Halted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Always" => Some(RunStrategy::Always),
            "RerunOnFailure" => Some(RunStrategy::RerunOnFailure),
            "Manual" => Some(RunStrategy::Manual),
            "Halted" => Some(RunStrategy::Halted),
            _ => None,
        }
    }
}

/// What happens to the VM when its host enters maintenance mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum MaintenanceStrategy {
    #[default]
    Migrate,
    ShutdownAndRestartAfterEnable,
    ShutdownAndRestartAfterDisable,
    Shutdown,
}

impl MaintenanceStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MaintenanceStrategy::Migrate => "Migrate",
            MaintenanceStrategy::ShutdownAndRestartAfterEnable => "ShutdownAndRestartAfterEnable",
            MaintenanceStrategy::ShutdownAndRestartAfterDisable => "ShutdownAndRestartAfterDisable",
            MaintenanceStrategy::Shutdown => "Shutdown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Migrate" => Some(MaintenanceStrategy::Migrate),
            "ShutdownAndRestartAfterEnable" => Some(MaintenanceStrategy::ShutdownAndRestartAfterEnable),
            "ShutdownAndRestartAfterDisable" => {
                Some(MaintenanceStrategy::ShutdownAndRestartAfterDisable)
            }
            "Shutdown" => Some(MaintenanceStrategy::Shutdown),
            _ => None,
        }
    }
}

/// Where a disk row's data comes from. Kinds are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DiskSource {
    #[default]
    #[serde(rename = "virtual-image")]
    Image,
    #[serde(rename = "New")]
    New,
    #[serde(rename = "attach-volume")]
    AttachVolume,
    #[serde(rename = "container")]
    Container,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DiskType {
    #[default]
    #[serde(rename = "disk")]
    Disk,
    #[serde(rename = "cd-rom")]
    CdRom,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskRow {
    /// Row identity within the session; not written to the spec.
    pub id: String,
    pub boot_order: u32,
    pub source: DiskSource,
    pub name: String,
    /// Claim name the disk had when it was loaded.
    pub real_name: String,
    pub bus: String,
    #[serde(rename = "type")]
    pub disk_type: DiskType,
    pub volume_name: String,
    pub container: String,
    pub access_mode: String,
    pub size: String,
    pub volume_mode: String,
    pub image: String,
    pub storage_class_name: String,
    pub hotpluggable: bool,
    pub data_source: Option<TypedLocalObjectReference>,
    pub namespace: String,
    pub is_encrypted: bool,
    pub volume_backup: Option<VolumeBackup>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    #[default]
    Masquerade,
    Bridge,
    Sriov,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRow {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
    pub is_pod: bool,
    /// Set on rows the user has not saved yet.
    pub new_create_id: Option<String>,
    pub model: Option<String>,
    pub mac_address: Option<String>,
    pub network_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum CredentialKind {
    #[default]
    #[serde(rename = "userPassword")]
    ResetPassword,
    #[serde(rename = "sshPublicKey")]
    InjectSsh,
}

/// One guest-agent access credential.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCredentialRow {
    pub source: CredentialKind,
    pub username: String,
    pub new_password: String,
    pub users: Vec<String>,
    /// SSH key pair ids (`namespace/name`).
    pub sshkeys: Vec<String>,
    pub secret_name: String,
    /// Name of the secret that already backs this row, if any.
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatModel {
    pub cpu: Option<u32>,
    pub memory: Option<String>,
    pub max_cpu: Option<u32>,
    pub max_memory: Option<String>,
    pub cpu_memory_hotplug_enabled: bool,
    pub reserved_memory: Option<String>,
    pub machine_type: String,
    pub termination_grace_period_seconds: i64,
    pub run_strategy: RunStrategy,
    pub maintenance_strategy: MaintenanceStrategy,
    pub os_type: OsType,
    pub image_id: String,

    pub disk_rows: Vec<DiskRow>,
    pub network_rows: Vec<NetworkRow>,
    /// Claim names that already existed when the VM was loaded.
    pub has_created_volumes: Vec<String>,

    /// Selected SSH key pair ids.
    pub ssh_key: Vec<String>,
    pub access_credentials: Vec<AccessCredentialRow>,

    pub user_script: Option<String>,
    pub network_script: Option<String>,
    pub user_data_template_id: Option<String>,
    pub secret_name: Option<String>,
    pub secret_ref: Option<String>,
    pub save_user_data_as_clear_text: bool,
    pub save_network_data_as_clear_text: bool,

    pub efi_enabled: bool,
    pub secure_boot: bool,
    pub efi_persistent_state_enabled: bool,
    pub tpm_enabled: bool,
    pub tpm_persistent_state_enabled: bool,
    pub cpu_pinning: bool,
    #[serde(rename = "installUSBTablet")]
    pub install_usb_tablet: bool,
    pub install_agent: bool,
}

impl FlatModel {
    pub fn is_windows(&self) -> bool {
        self.os_type.is_windows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_os_type_from_label() {
        assert_eq!(OsType::from_label("ubuntu"), Some(OsType::Ubuntu));
        assert_eq!(OsType::from_label("SLEs"), Some(OsType::Sles));
        assert_eq!(OsType::from_label("RHEL"), Some(OsType::RedHat));
        assert_eq!(OsType::from_label("centos"), Some(OsType::OtherLinux));
        assert_eq!(OsType::from_label("plan9"), None);
        assert_eq!(OsType::from_label(""), None);
        assert!(OsType::OpenSuse.is_suse_family());
        assert!(!OsType::Ubuntu.is_suse_family());
    }

    #[test]
    fn test_strategies_parse_their_own_names() {
        for strategy in [
            MaintenanceStrategy::Migrate,
            MaintenanceStrategy::ShutdownAndRestartAfterEnable,
            MaintenanceStrategy::ShutdownAndRestartAfterDisable,
            MaintenanceStrategy::Shutdown,
        ] {
            assert_eq!(MaintenanceStrategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(RunStrategy::parse("Halted"), Some(RunStrategy::Halted));
        assert_eq!(RunStrategy::parse("running"), None);
    }

    #[test]
    fn test_disk_row_wire_names() {
        let row = DiskRow {
            source: DiskSource::AttachVolume,
            disk_type: DiskType::CdRom,
            ..Default::default()
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["source"], json!("attach-volume"));
        assert_eq!(value["type"], json!("cd-rom"));
        assert_eq!(
            serde_json::to_value(CredentialKind::InjectSsh).unwrap(),
            json!("sshPublicKey")
        );
    }
}
