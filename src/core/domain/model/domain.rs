//! Domain models for `spec.template.spec.domain`: CPU, memory, resources,
//! devices and boot firmware.

use super::virtual_machine::Extra;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    /// Guest memory, only present on hotplug-shaped specs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<GuestMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
    #[serde(default)]
    pub devices: Devices,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<Firmware>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sockets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedicated_cpu_placement: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Cpu {
    /// Total vCPUs: sockets x cores x threads, each defaulting to 1.
    pub fn vcpus(&self) -> u32 {
        self.sockets
            .unwrap_or(1)
            .saturating_mul(self.cores.unwrap_or(1))
            .saturating_mul(self.threads.unwrap_or(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_guest: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Requests and limits. Values stay JSON because hand-written manifests
/// often use bare numbers (`cpu: 2`) where the editor writes strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ResourceRequirements {
    pub fn limit(&self, key: &str) -> Option<String> {
        quantity_text(self.limits.as_ref()?.get(key)?)
    }

    pub fn request(&self, key: &str) -> Option<String> {
        quantity_text(self.requests.as_ref()?.get(key)?)
    }

    pub fn set_limit(&mut self, key: &str, value: Option<String>) {
        let limits = self.limits.get_or_insert_with(BTreeMap::new);
        match value {
            Some(value) => {
                limits.insert(key.to_string(), Value::String(value));
            }
            None => {
                limits.remove(key);
            }
        }
    }
}

fn quantity_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Machine {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disks: Option<Vec<Disk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<Interface>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<Input>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<Tpm>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A disk device. Exactly one of `disk` / `cdrom` is expected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdrom: Option<DiskTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<u32>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Disk {
    pub fn bus(&self) -> Option<&str> {
        self.disk
            .as_ref()
            .and_then(|d| d.bus.as_deref())
            .or_else(|| self.cdrom.as_ref().and_then(|d| d.bus.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl DiskTarget {
    pub fn with_bus(bus: &str) -> Self {
        Self {
            bus: Some(bus.to_string()),
            extra: Extra::new(),
        }
    }
}

/// A network interface; the binding method is the key that is present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masquerade: Option<Extra>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<Extra>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sriov: Option<Extra>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Input {
    pub bus: String,
    pub name: String,
    #[serde(rename = "type")]
    pub input_type: String,
}

impl Input {
    /// The USB tablet pointer installed by default on new VMs.
    pub fn usb_tablet() -> Self {
        Self {
            bus: "usb".to_string(),
            name: "tablet".to_string(),
            input_type: "tablet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tpm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootloader: Option<Bootloader>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootloader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efi: Option<Efi>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Efi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_boot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smm: Option<FeatureState>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl DomainSpec {
    pub fn efi(&self) -> Option<&Efi> {
        self.firmware.as_ref()?.bootloader.as_ref()?.efi.as_ref()
    }

    pub fn efi_mut(&mut self) -> &mut Efi {
        self.firmware
            .get_or_insert_with(Default::default)
            .bootloader
            .get_or_insert_with(Default::default)
            .efi
            .get_or_insert_with(Default::default)
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        self.cpu.get_or_insert_with(Default::default)
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRequirements {
        self.resources.get_or_insert_with(Default::default)
    }
}
