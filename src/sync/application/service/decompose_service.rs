use crate::cloud_init::{has_install_agent, initial_user_data};
use crate::core::domain::constants::{
    ACCESS_MODE_RWX, ANNOTATION_CPU_MEMORY_HOTPLUG, ANNOTATION_DYNAMIC_SSH_KEY_NAMES,
    ANNOTATION_IMAGE_ID, ANNOTATION_RESERVED_MEMORY, ANNOTATION_SSH_NAMES,
    ANNOTATION_VOLUME_CLAIM_TEMPLATES, BUS_SATA, BUS_VIRTIO, CLOUD_INIT_DISK,
    LABEL_MAINTENANCE_STRATEGY, LABEL_OS, MANAGEMENT_NETWORK, ROOT_DISK_NAME, SECRET_NETWORK_DATA,
    SECRET_USER_DATA, VOLUME_MODE_BLOCK,
};
use crate::core::domain::error::SyncResult;
use crate::core::domain::model::domain::{DomainSpec, Input};
use crate::core::domain::model::flat_model::{
    AccessCredentialRow, CredentialKind, DiskRow, DiskSource, DiskType, FlatModel, InterfaceType,
    MaintenanceStrategy, NetworkRow, OsType, RunStrategy,
};
use crate::core::domain::model::meta::ObjectMetaExt;
use crate::core::domain::model::resource::{Secret, SecretExt, VmImage};
use crate::core::domain::model::sync_config::SyncConfig;
use crate::core::domain::model::virtual_machine::{VirtualMachine, VmiSpec};
use crate::core::domain::model::vm_resource::{ResourceKind, SecretBackup, VolumeBackup};
use crate::core::domain::model::volume::{ClaimSpecExt, CloudInitNoCloud, VolumeClaimTemplate};
use crate::core::domain::value_object::serde_helpers::{base64_data, json_annotation};
use crate::core::domain::value_object::{Quantity, SUFFIX_LENGTH, normalize_gib, random_suffix};
use crate::sync::application::request::load_request::LoadRequest;
use crate::sync::application::request::resource_snapshot::ResourceSnapshot;
use rand::Rng;
use std::collections::BTreeMap;

const NETWORK_ROW_ID_LENGTH: usize = 10;

/// CPU and memory as the form shows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CpuMemory {
    pub cpu: Option<u32>,
    pub memory: Option<String>,
    pub max_cpu: Option<u32>,
    pub max_memory: Option<String>,
    pub hotplug: bool,
}

/// Reads the CPU/memory quadruple from either spec shape.
///
/// Hotplug is on when the VM carries the hotplug annotation or the guest
/// memory has a `maxGuest`. A `limits.memory` missing from a hand-written
/// spec falls back to `requests.memory`.
pub(crate) fn cpu_memory(vm: &VirtualMachine, domain: &DomainSpec) -> CpuMemory {
    let limit_memory = domain
        .resources
        .as_ref()
        .and_then(|r| r.limit("memory").or_else(|| r.request("memory")));
    let max_guest = domain.memory.as_ref().and_then(|m| m.max_guest.clone());
    let hotplug = vm.metadata.annotation(ANNOTATION_CPU_MEMORY_HOTPLUG) == Some("true")
        || max_guest.is_some();
    let cpu = domain.cpu.as_ref().map(|c| c.vcpus());

    if hotplug {
        CpuMemory {
            cpu,
            memory: domain
                .memory
                .as_ref()
                .and_then(|m| m.guest.clone())
                .or(limit_memory.clone()),
            max_cpu: domain.cpu.as_ref().and_then(|c| c.max_sockets),
            max_memory: max_guest.or(limit_memory),
            hotplug,
        }
    } else {
        CpuMemory {
            cpu,
            memory: limit_memory,
            max_cpu: None,
            max_memory: None,
            hotplug,
        }
    }
}

/// Maps a nested VM spec onto a [`FlatModel`].
pub struct DecomposeService<'a> {
    config: &'a SyncConfig,
    snapshot: &'a ResourceSnapshot,
}

impl<'a> DecomposeService<'a> {
    pub fn new(config: &'a SyncConfig, snapshot: &'a ResourceSnapshot) -> Self {
        Self { config, snapshot }
    }

    /// Decomposes the VM embedded in `request.resource`.
    ///
    /// Returns `Ok(None)` while the resource has no spec or no domain yet;
    /// callers decompose again once it has loaded.
    pub fn decompose<R: Rng + ?Sized>(
        &self,
        request: &LoadRequest,
        rng: &mut R,
    ) -> SyncResult<Option<FlatModel>> {
        let resource = &request.resource;
        let Some(vm) = resource.vm() else {
            tracing::debug!("resource has no virtual machine yet");
            return Ok(None);
        };
        let (Some(spec), Some(vmi), Some(domain)) = (vm.spec.as_ref(), vm.vmi_spec(), vm.domain())
        else {
            tracing::debug!(vm = vm.metadata.name_str(), "virtual machine spec is not loaded yet");
            return Ok(None);
        };

        let mode = request.mode;
        let namespace = match vm.metadata.namespace_str() {
            "" => resource.metadata().namespace_str().to_string(),
            namespace => namespace.to_string(),
        };
        let template_annotations = vm.template_meta().and_then(|m| m.annotations.as_ref());
        let claim_templates: Vec<VolumeClaimTemplate> = json_annotation(
            vm.metadata.annotations.as_ref(),
            ANNOTATION_VOLUME_CLAIM_TEMPLATES,
        );

        let cpu_memory = cpu_memory(vm, domain);

        let run_strategy = if spec.running.is_some() {
            RunStrategy::RerunOnFailure
        } else {
            spec.run_strategy
                .as_deref()
                .and_then(RunStrategy::parse)
                .unwrap_or_default()
        };
        let maintenance_strategy = vm
            .metadata
            .label(LABEL_MAINTENANCE_STRATEGY)
            .and_then(MaintenanceStrategy::parse)
            .unwrap_or_default();
        let image_id = claim_templates
            .iter()
            .filter_map(|t| t.metadata.annotation(ANNOTATION_IMAGE_ID))
            .find(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| request.image_id.clone())
            .unwrap_or_default();

        // Unlabelled VMs take the OS their root image declares.
        let os_type = vm
            .metadata
            .label(LABEL_OS)
            .and_then(OsType::from_label)
            .or_else(|| {
                self.snapshot
                    .image(&image_id)
                    .and_then(|image| image.os_type.as_deref())
                    .and_then(OsType::from_label)
            })
            .unwrap_or_default();

        let disk_rows = self.disk_rows(
            vm,
            vmi,
            &namespace,
            &claim_templates,
            &image_id,
            resource.volume_backups(),
            rng,
        );
        let network_rows = self.network_rows(
            vmi,
            request.from_template || mode.is_create(),
            rng,
        );

        let cloud_init = vmi
            .volumes
            .iter()
            .flatten()
            .find_map(|v| v.cloud_init_no_cloud.as_ref());
        let (mut user_script, network_script) = match resource.kind() {
            ResourceKind::Backup => self.backup_cloud_init(resource.secret_backups().first()),
            _ => self.cloud_init_data(&namespace, cloud_init),
        };
        if mode.is_create() && !request.existing_user_data && !os_type.is_windows() {
            user_script = Some(initial_user_data(os_type)?);
        }
        let install_agent = has_install_agent(user_script.as_deref(), os_type, true);

        let secret_ref = cloud_init
            .and_then(|c| c.secret_ref.as_ref())
            .filter(|r| self.snapshot.secret(&namespace, &r.name).is_some())
            .map(|r| r.name.clone());
        let secret_name = match resource.kind() {
            ResourceKind::Backup => None,
            _ => secret_ref.clone(),
        };

        let efi = domain.efi();
        let tpm = domain.devices.tpm.as_ref();
        let usb_tablet = Input::usb_tablet();

        let model = FlatModel {
            cpu: cpu_memory.cpu,
            memory: cpu_memory.memory,
            max_cpu: cpu_memory.max_cpu,
            max_memory: cpu_memory.max_memory,
            cpu_memory_hotplug_enabled: cpu_memory.hotplug,
            reserved_memory: vm
                .metadata
                .annotation(ANNOTATION_RESERVED_MEMORY)
                .map(str::to_string),
            machine_type: domain
                .machine
                .as_ref()
                .and_then(|m| m.machine_type.clone())
                .unwrap_or_else(|| self.config.default_machine_type.clone()),
            termination_grace_period_seconds: vmi
                .termination_grace_period_seconds
                .filter(|s| *s != 0)
                .unwrap_or(self.config.default_termination_grace_period_seconds),
            run_strategy,
            maintenance_strategy,
            os_type,
            image_id,
            disk_rows,
            network_rows,
            has_created_volumes: vmi
                .volumes
                .iter()
                .flatten()
                .filter_map(|v| v.claim_name())
                .map(str::to_string)
                .collect(),
            ssh_key: json_annotation(template_annotations, ANNOTATION_SSH_NAMES),
            access_credentials: self.access_credentials(vm, vmi, &namespace),
            user_script,
            network_script,
            user_data_template_id: None,
            secret_name,
            secret_ref,
            save_user_data_as_clear_text: cloud_init
                .is_some_and(|c| c.user_data.is_some() && c.secret_ref.is_none()),
            save_network_data_as_clear_text: cloud_init
                .is_some_and(|c| c.network_data.is_some() && c.network_data_secret_ref.is_none()),
            efi_enabled: efi.is_some(),
            secure_boot: efi.and_then(|e| e.secure_boot).unwrap_or(false),
            efi_persistent_state_enabled: efi.and_then(|e| e.persistent).unwrap_or(false),
            tpm_enabled: tpm.is_some(),
            tpm_persistent_state_enabled: tpm.and_then(|t| t.persistent).unwrap_or(false),
            cpu_pinning: domain
                .cpu
                .as_ref()
                .and_then(|c| c.dedicated_cpu_placement)
                .unwrap_or(false),
            install_usb_tablet: domain
                .devices
                .inputs
                .iter()
                .flatten()
                .any(|i| *i == usb_tablet),
            install_agent,
        };

        tracing::debug!(
            vm = vm.metadata.name_str(),
            disks = model.disk_rows.len(),
            networks = model.network_rows.len(),
            hotplug = model.cpu_memory_hotplug_enabled,
            "decomposed virtual machine"
        );
        Ok(Some(model))
    }

    #[allow(clippy::too_many_arguments)]
    fn disk_rows<R: Rng + ?Sized>(
        &self,
        vm: &VirtualMachine,
        vmi: &VmiSpec,
        namespace: &str,
        claim_templates: &[VolumeClaimTemplate],
        image_id: &str,
        volume_backups: &[VolumeBackup],
        rng: &mut R,
    ) -> Vec<DiskRow> {
        let disks = vm
            .domain()
            .and_then(|d| d.devices.disks.as_deref())
            .unwrap_or_default();
        let backup_for = |name: &str| {
            volume_backups
                .iter()
                .find(|b| b.volume_name == name)
                .cloned()
        };

        if disks.is_empty() {
            return vec![self.root_disk_row(image_id, backup_for(ROOT_DISK_NAME), rng)];
        }

        let volumes = vmi.volumes.as_deref().unwrap_or_default();
        let mut rows: Vec<DiskRow> = Vec::with_capacity(disks.len());

        for (index, disk) in disks.iter().enumerate() {
            let Some(volume) = volumes.iter().find(|v| v.name == disk.name) else {
                tracing::warn!(disk = %disk.name, "disk has no matching volume, skipping");
                continue;
            };

            let mut row = DiskRow {
                id: random_suffix(rng, SUFFIX_LENGTH),
                name: disk.name.clone(),
                bus: disk.bus().unwrap_or_default().to_string(),
                disk_type: if disk.cdrom.is_some() {
                    DiskType::CdRom
                } else {
                    DiskType::Disk
                },
                boot_order: disk.boot_order.filter(|o| *o > 0).unwrap_or(index as u32),
                namespace: namespace.to_string(),
                volume_backup: backup_for(&disk.name),
                ..Default::default()
            };

            if let Some(container) = volume.container_disk.as_ref() {
                row.source = DiskSource::Container;
                row.container = container.image.clone();
            }

            if let Some(claim_name) = volume.claim_name() {
                row.volume_name = claim_name.to_string();
                row.real_name = claim_name.to_string();

                if let Some(template) = claim_templates.iter().find(|t| t.metadata.name_str() == claim_name) {
                    match template.metadata.annotation(ANNOTATION_IMAGE_ID) {
                        Some(image) => {
                            row.source = DiskSource::Image;
                            row.image = image.to_string();
                        }
                        None => row.source = DiskSource::New,
                    }
                    let spec = &template.spec;
                    row.volume_mode = spec.volume_mode.clone().unwrap_or_default();
                    row.access_mode = spec.first_access_mode().unwrap_or_default().to_string();
                    row.size = spec.storage().unwrap_or("10Gi").to_string();
                    row.storage_class_name = spec.storage_class_name.clone().unwrap_or_default();
                    row.data_source = spec.data_source.clone();
                } else {
                    // Volumes attached before claim templates were recorded.
                    let pvc = self.snapshot.pvc(namespace, claim_name);
                    let spec = pvc.and_then(|p| p.spec.as_ref());
                    row.source = DiskSource::AttachVolume;
                    row.access_mode = spec
                        .and_then(|s| s.first_access_mode())
                        .unwrap_or(ACCESS_MODE_RWX)
                        .to_string();
                    row.size = spec.and_then(|s| s.storage()).unwrap_or("10Gi").to_string();
                    row.storage_class_name = spec
                        .and_then(|s| s.storage_class_name.clone())
                        .unwrap_or_default();
                    row.volume_mode = spec
                        .and_then(|s| s.volume_mode.clone())
                        .unwrap_or_else(|| VOLUME_MODE_BLOCK.to_string());
                    row.volume_name = pvc.map(|p| p.metadata.name_str().to_string()).unwrap_or_default();
                }

                row.hotpluggable = volume
                    .persistent_volume_claim
                    .as_ref()
                    .and_then(|p| p.hotpluggable)
                    .unwrap_or(false);
            }

            if !row.size.is_empty() {
                row.size = normalize_gib(&row.size, "10Gi");
            }
            if row.volume_mode.is_empty() {
                row.volume_mode = self.config.default_volume_mode.clone();
            }
            row.is_encrypted = self
                .snapshot
                .pvc(namespace, &row.volume_name)
                .is_some_and(|pvc| self.snapshot.is_pvc_encrypted(pvc));

            rows.push(row);
        }

        rows.sort_by_key(|row| row.boot_order);
        rows.retain(|row| row.name != CLOUD_INIT_DISK);
        rows
    }

    /// The single root disk of a VM that has no disks yet, sized from the
    /// selected image.
    fn root_disk_row<R: Rng + ?Sized>(
        &self,
        image_id: &str,
        volume_backup: Option<VolumeBackup>,
        rng: &mut R,
    ) -> DiskRow {
        let image = self.snapshot.image(image_id);
        let is_iso = image.is_some_and(VmImage::is_iso);
        let default_gib = self.config.default_disk_size_gib;

        let size_gib = match image.and_then(VmImage::image_size) {
            Some(bytes) => {
                let gib = Quantity::from_bytes(bytes).ceil_gib();
                if is_iso { gib } else { gib.max(default_gib) }
            }
            None => default_gib,
        };

        DiskRow {
            id: random_suffix(rng, SUFFIX_LENGTH),
            source: DiskSource::Image,
            name: ROOT_DISK_NAME.to_string(),
            // The root disk is backed by an image volume, which is always RWX.
            access_mode: ACCESS_MODE_RWX.to_string(),
            bus: if is_iso { BUS_SATA } else { BUS_VIRTIO }.to_string(),
            disk_type: if is_iso {
                DiskType::CdRom
            } else {
                DiskType::Disk
            },
            size: format!("{size_gib}Gi"),
            image: image_id.to_string(),
            volume_mode: VOLUME_MODE_BLOCK.to_string(),
            is_encrypted: image.is_some_and(|i| i.is_encrypted),
            volume_backup,
            ..Default::default()
        }
    }

    fn network_rows<R: Rng + ?Sized>(
        &self,
        vmi: &VmiSpec,
        new_rows: bool,
        rng: &mut R,
    ) -> Vec<NetworkRow> {
        let networks = vmi.networks.as_deref().unwrap_or_default();
        let interfaces = vmi
            .domain
            .as_ref()
            .and_then(|d| d.devices.interfaces.as_deref())
            .unwrap_or_default();

        interfaces
            .iter()
            .enumerate()
            .map(|(index, iface)| {
                let network = networks.iter().find(|n| n.name == iface.name);
                let interface_type = if iface.sriov.is_some() {
                    InterfaceType::Sriov
                } else if iface.bridge.is_some() {
                    InterfaceType::Bridge
                } else {
                    InterfaceType::Masquerade
                };
                let is_pod = network.is_some_and(|n| n.pod.is_some());
                let network_name = if is_pod {
                    MANAGEMENT_NETWORK.to_string()
                } else {
                    network
                        .and_then(|n| n.multus.as_ref())
                        .map(|m| m.network_name.clone())
                        .unwrap_or_default()
                };

                NetworkRow {
                    index,
                    name: iface.name.clone(),
                    interface_type,
                    is_pod,
                    new_create_id: new_rows.then(|| random_suffix(rng, NETWORK_ROW_ID_LENGTH)),
                    model: iface.model.clone(),
                    mac_address: iface.mac_address.clone(),
                    network_name,
                }
            })
            .collect()
    }

    /// User and network data, inline or from the referenced secrets.
    fn cloud_init_data(
        &self,
        namespace: &str,
        cloud_init: Option<&CloudInitNoCloud>,
    ) -> (Option<String>, Option<String>) {
        let Some(cloud_init) = cloud_init else {
            return (None, None);
        };
        let from_secret = |name: Option<&str>, key: &str| {
            let secret = self.snapshot.secret(namespace, name?)?;
            decoded(secret, key)
        };

        let user_data = cloud_init.user_data.clone().or_else(|| {
            from_secret(cloud_init.secret_ref.as_ref().map(|r| r.name.as_str()), SECRET_USER_DATA)
        });
        let network_data = cloud_init.network_data.clone().or_else(|| {
            from_secret(
                cloud_init
                    .network_data_secret_ref
                    .as_ref()
                    .map(|r| r.name.as_str()),
                SECRET_NETWORK_DATA,
            )
        });
        (user_data, network_data)
    }

    fn backup_cloud_init(
        &self,
        record: Option<&SecretBackup>,
    ) -> (Option<String>, Option<String>) {
        let Some(record) = record else {
            return (None, None);
        };
        let decode = |key: &str| {
            let raw = record.data.get(key)?;
            match base64_data::decode(raw) {
                Ok(text) => Some(text).filter(|t| !t.is_empty()),
                Err(e) => {
                    tracing::warn!(secret = %record.name, key, error = %e, "ignoring undecodable secret backup data");
                    None
                }
            }
        };
        (decode(SECRET_USER_DATA), decode(SECRET_NETWORK_DATA))
    }

    fn access_credentials(
        &self,
        vm: &VirtualMachine,
        vmi: &VmiSpec,
        namespace: &str,
    ) -> Vec<AccessCredentialRow> {
        let key_names: BTreeMap<String, Vec<String>> = json_annotation(
            vm.template_meta().and_then(|m| m.annotations.as_ref()),
            ANNOTATION_DYNAMIC_SSH_KEY_NAMES,
        );

        vmi.access_credentials
            .iter()
            .flatten()
            .filter_map(|credential| {
                if let Some(password) = credential.user_password.as_ref() {
                    let secret_name = password.source.secret.secret_name.clone();
                    let secret = self.snapshot.secret(namespace, &secret_name);
                    let (username, new_password) = secret
                        .and_then(|s| {
                            let username = s.data.as_ref()?.keys().next()?.clone();
                            let password = decoded(s, &username).unwrap_or_default();
                            Some((username, password))
                        })
                        .unwrap_or_default();
                    Some(AccessCredentialRow {
                        source: CredentialKind::ResetPassword,
                        username,
                        new_password,
                        secret_ref: secret.map(|s| s.metadata.name_str().to_string()),
                        secret_name,
                        ..Default::default()
                    })
                } else if let Some(ssh) = credential.ssh_public_key.as_ref() {
                    let secret_name = ssh.source.secret.secret_name.clone();
                    Some(AccessCredentialRow {
                        source: CredentialKind::InjectSsh,
                        users: ssh
                            .propagation_method
                            .qemu_guest_agent
                            .as_ref()
                            .and_then(|q| q.users.clone())
                            .unwrap_or_default(),
                        sshkeys: key_names.get(&secret_name).cloned().unwrap_or_default(),
                        secret_ref: self
                            .snapshot
                            .secret(namespace, &secret_name)
                            .map(|s| s.metadata.name_str().to_string()),
                        secret_name,
                        ..Default::default()
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

fn decoded(secret: &Secret, key: &str) -> Option<String> {
    match secret.decoded(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(secret = %secret.id(), key, error = %e, "ignoring undecodable secret data");
            None
        }
    }
}
