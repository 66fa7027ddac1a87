use crate::cloud_init::{UserDataOptions, build_user_data};
use crate::core::domain::constants::{
    ANNOTATION_CPU_MEMORY_HOTPLUG, ANNOTATION_DYNAMIC_SSH_KEY_NAMES,
    ANNOTATION_DYNAMIC_SSH_KEY_USERS, ANNOTATION_IMAGE_ID, ANNOTATION_RESERVED_MEMORY,
    ANNOTATION_SSH_NAMES, ANNOTATION_VOLUME_CLAIM_TEMPLATES, BUS_VIRTIO, CLOUD_INIT_DISK,
    CREATOR_HARVESTER, LABEL_CREATOR, LABEL_HOSTNAME, LABEL_MAINTENANCE_STRATEGY, LABEL_OS,
    LABEL_VM_NAME, LABEL_VM_NAME_PREFIX,
};
use crate::core::domain::error::SyncResult;
use crate::core::domain::model::domain::{
    Disk, DiskTarget, DomainSpec, FeatureState, GuestMemory, Input, Interface, Machine, Tpm,
};
use crate::core::domain::model::flat_model::{
    AccessCredentialRow, CredentialKind, DiskRow, DiskSource, DiskType, EditMode, FlatModel,
    InterfaceType, MaintenanceStrategy, NetworkRow,
};
use crate::core::domain::model::meta::{LabelSelector, ObjectMeta, ObjectMetaExt};
use crate::core::domain::model::sync_config::SyncConfig;
use crate::core::domain::model::virtual_machine::{
    AccessCredential, CredentialSecretSource, CredentialSpec, Extra, PropagationMethod,
    QemuGuestAgentPropagation, SecretName, VirtualMachine,
};
use crate::core::domain::model::vm_resource::{ResourceKind, VmResource};
use crate::core::domain::model::volume::{
    CloudInitNoCloud, ContainerDisk, LocalObjectReference, MultusNetwork, Network,
    PersistentVolumeClaimSpec, PvcVolumeSource, Volume, VolumeClaimTemplate, storage_request,
};
use crate::core::domain::value_object::serde_helpers::{json_annotation, to_json_annotation};
use crate::core::domain::value_object::{
    generate_secret_name, generate_volume_name, trim_trailing_hyphens, with_gib_suffix,
};
use crate::sync::application::request::resource_snapshot::ResourceSnapshot;
use crate::sync::application::request::save_request::SaveRequest;
use k8s_openapi::api::core::v1::{PodAffinityTerm, WeightedPodAffinityTerm};
use rand::Rng;
use std::collections::BTreeMap;

/// Everything a save needs besides the rebuilt resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomposeOutput {
    pub resource: VmResource,
    /// User data to store in the cloud-init secret.
    pub user_data: Option<String>,
    pub network_data: Option<String>,
    /// Name of the cloud-init secret the new spec refers to.
    pub secret_name: Option<String>,
    /// Credential rows with their final secret names.
    pub access_credentials: Vec<AccessCredentialRow>,
    /// Secrets must be created rather than updated in place.
    pub need_new_secret: bool,
}

/// Maps a [`FlatModel`] back onto the resource it was loaded from.
pub struct RecomposeService<'a> {
    config: &'a SyncConfig,
    snapshot: &'a ResourceSnapshot,
}

impl<'a> RecomposeService<'a> {
    pub fn new(config: &'a SyncConfig, snapshot: &'a ResourceSnapshot) -> Self {
        Self { config, snapshot }
    }

    /// Rebuilds the nested spec from `model`.
    ///
    /// `original` is never modified. Fields the form does not manage are
    /// carried over from it unchanged.
    pub fn recompose<R: Rng + ?Sized>(
        &self,
        model: &FlatModel,
        original: &VmResource,
        mode: EditMode,
        save: &SaveRequest,
        rng: &mut R,
    ) -> SyncResult<RecomposeOutput> {
        let kind = original.kind();
        let mut vm = original.vm().cloned().unwrap_or_default();
        let name = match original.metadata().name_str() {
            "" => vm.metadata.name_str().to_string(),
            name => name.to_string(),
        };
        let need_new_secret = kind == ResourceKind::TemplateVersion || mode.is_create();

        let (user_data, network_data) = if model.is_windows() {
            (None, None)
        } else {
            let ssh_public_keys = self.snapshot.ssh_public_keys(&model.ssh_key);
            let template = model
                .user_data_template_id
                .as_deref()
                .and_then(|id| self.snapshot.cloud_init_template(id));
            let user_data = build_user_data(&UserDataOptions {
                user_script: model.user_script.as_deref(),
                ssh_public_keys: &ssh_public_keys,
                install_agent: model.install_agent,
                os_type: model.os_type,
                delete_package: false,
                template,
            });
            let network_data = model.network_script.clone().filter(|s| !s.is_empty());
            (user_data, network_data)
        };

        self.apply_other(&mut vm, model);
        apply_cpu_memory(&mut vm, model);
        apply_devices(vm.domain_mut(), model);
        let access_credentials = apply_access_credentials(&mut vm, model, &name, need_new_secret, rng)?;
        apply_network_rows(&mut vm, &model.network_rows);

        let mut disks = Vec::with_capacity(model.disk_rows.len() + 1);
        let mut volumes = Vec::with_capacity(model.disk_rows.len() + 1);
        let mut claim_templates = Vec::with_capacity(model.disk_rows.len());

        for (index, row) in model.disk_rows.iter().enumerate() {
            let volume_name = if row.source == DiskSource::AttachVolume {
                row.volume_name.clone()
            } else if mode.is_clone() || !model.has_created_volumes.contains(&row.real_name) {
                generate_volume_name(&name, &row.name, rng)
            } else {
                row.real_name.clone()
            };

            disks.push(disk_device(row, index));
            volumes.push(volume_entry(row, &volume_name));
            if row.source != DiskSource::Container {
                claim_templates.push(self.claim_template(row, &volume_name));
            }
        }

        let secret_name = if need_new_secret || model.secret_name.is_none() {
            generate_secret_name(&name, rng)
        } else {
            model.secret_name.clone()
        };

        if (user_data.is_some() || network_data.is_some()) && !model.is_windows() {
            disks.push(Disk {
                name: CLOUD_INIT_DISK.to_string(),
                disk: Some(DiskTarget::with_bus(BUS_VIRTIO)),
                ..Default::default()
            });
            volumes.push(cloud_init_volume(
                model,
                user_data.as_deref(),
                network_data.as_deref(),
                secret_name.as_deref(),
            ));
        }

        vm.domain_mut().devices.disks = Some(disks);
        vm.vmi_spec_mut().volumes = Some(volumes).filter(|v| !v.is_empty());

        let template_meta = vm.template_meta_mut();
        template_meta.set_annotation(ANNOTATION_SSH_NAMES, to_json_annotation(&model.ssh_key)?);
        template_meta.set_label(LABEL_VM_NAME, name.as_str());

        let spec = vm.spec.get_or_insert_with(Default::default);
        spec.run_strategy = Some(model.run_strategy.as_str().to_string());
        spec.running = None;

        match kind {
            ResourceKind::VirtualMachine => {
                if save.is_batch() {
                    apply_batch_anti_affinity(&mut vm, &save.name_prefix);
                }
                vm.metadata.set_annotation(
                    ANNOTATION_VOLUME_CLAIM_TEMPLATES,
                    to_json_annotation(&claim_templates)?,
                );
                vm.metadata.set_label(LABEL_CREATOR, CREATOR_HARVESTER);
                vm.metadata.set_label(LABEL_OS, model.os_type.as_str());
            }
            ResourceKind::TemplateVersion => {
                vm.metadata.set_annotation(
                    ANNOTATION_VOLUME_CLAIM_TEMPLATES,
                    to_json_annotation(&claim_templates)?,
                );
                vm.metadata.set_label(LABEL_OS, model.os_type.as_str());
            }
            ResourceKind::Backup => {}
        }

        tracing::debug!(
            vm = %name,
            disks = model.disk_rows.len(),
            claims = claim_templates.len(),
            need_new_secret,
            "recomposed virtual machine"
        );

        Ok(RecomposeOutput {
            resource: original.with_vm(vm),
            user_data,
            network_data,
            secret_name,
            access_credentials,
            need_new_secret,
        })
    }

    fn apply_other(&self, vm: &mut VirtualMachine, model: &FlatModel) {
        let domain = vm.domain_mut();
        let machine_type = match model.machine_type.as_str() {
            "" if !self.config.default_machine_type.is_empty() => {
                self.config.default_machine_type.clone()
            }
            machine_type => machine_type.to_string(),
        };
        domain
            .machine
            .get_or_insert_with(Machine::default)
            .machine_type = Some(machine_type);

        vm.vmi_spec_mut().termination_grace_period_seconds =
            Some(model.termination_grace_period_seconds);

        let metadata = &mut vm.metadata;
        match model.reserved_memory.as_deref().filter(|m| !m.is_empty()) {
            Some(reserved) => metadata.set_annotation(ANNOTATION_RESERVED_MEMORY, reserved),
            None => metadata.remove_annotation(ANNOTATION_RESERVED_MEMORY),
        }
        if model.cpu_memory_hotplug_enabled {
            metadata.set_annotation(ANNOTATION_CPU_MEMORY_HOTPLUG, "true");
        } else {
            metadata.remove_annotation(ANNOTATION_CPU_MEMORY_HOTPLUG);
        }
        match model.maintenance_strategy {
            MaintenanceStrategy::Migrate => metadata.remove_label(LABEL_MAINTENANCE_STRATEGY),
            strategy => metadata.set_label(LABEL_MAINTENANCE_STRATEGY, strategy.as_str()),
        }
    }

    fn claim_template(&self, row: &DiskRow, volume_name: &str) -> VolumeClaimTemplate {
        let mut metadata = ObjectMeta {
            name: Some(volume_name.to_string()),
            ..Default::default()
        };
        let mut spec = PersistentVolumeClaimSpec {
            access_modes: Some(vec![row.access_mode.clone()]),
            resources: Some(storage_request(with_gib_suffix(&row.size))),
            volume_mode: Some(row.volume_mode.clone()),
            data_source: row.data_source.clone(),
            ..Default::default()
        };

        match row.source {
            DiskSource::New | DiskSource::AttachVolume => {
                spec.storage_class_name = Some(row.storage_class_name.clone());
            }
            DiskSource::Image => match self.snapshot.image(&row.image) {
                Some(image) => {
                    spec.storage_class_name = image.storage_class_name.clone();
                    metadata.set_annotation(ANNOTATION_IMAGE_ID, image.id.as_str());
                }
                None => metadata.set_annotation(ANNOTATION_IMAGE_ID, ""),
            },
            DiskSource::Container => {}
        }

        VolumeClaimTemplate { metadata, spec }
    }
}

/// Writes the CPU/memory shape selected by the hotplug flag and removes
/// every field of the other shape.
///
/// Threads are always written as 1 so the count read back is `cpu`. A
/// hotplug shape without maxima uses the current values as the maxima.
fn apply_cpu_memory(vm: &mut VirtualMachine, model: &FlatModel) {
    if model.cpu_memory_hotplug_enabled {
        let max_cpu = model.max_cpu.or(model.cpu);
        let max_memory = model.max_memory.clone().or_else(|| model.memory.clone());

        let domain = vm.domain_mut();
        let cpu = domain.cpu_mut();
        cpu.sockets = model.cpu;
        cpu.cores = Some(1);
        cpu.threads = Some(1);
        cpu.max_sockets = max_cpu;

        let resources = domain.resources_mut();
        resources.set_limit("cpu", max_cpu.map(|c| c.to_string()));
        resources.set_limit("memory", max_memory.clone());

        let memory = domain.memory.get_or_insert_with(GuestMemory::default);
        memory.guest = model.memory.clone();
        memory.max_guest = max_memory;
    } else {
        vm.vmi_spec_mut().resources = None;

        let domain = vm.domain_mut();
        let cpu = domain.cpu_mut();
        cpu.sockets = Some(1);
        cpu.cores = model.cpu;
        cpu.threads = Some(1);
        cpu.max_sockets = None;

        let resources = domain.resources_mut();
        resources.set_limit("cpu", model.cpu.map(|c| c.to_string()));
        resources.set_limit("memory", model.memory.clone());
        domain.memory = None;
    }
}

/// Boot firmware, TPM, CPU pinning and the USB tablet.
fn apply_devices(domain: &mut DomainSpec, model: &FlatModel) {
    if model.efi_enabled {
        domain.efi_mut().secure_boot = Some(model.secure_boot);

        if model.secure_boot {
            domain
                .features
                .get_or_insert_with(Default::default)
                .smm
                .get_or_insert_with(FeatureState::default)
                .enabled = Some(true);
        } else if let Some(features) = domain.features.as_mut() {
            if let Some(smm) = features.smm.as_mut() {
                smm.enabled = None;
                if smm.extra.is_empty() {
                    features.smm = None;
                }
            }
        }

        domain.efi_mut().persistent = model.efi_persistent_state_enabled.then_some(true);
    } else {
        domain.firmware = None;
        if let Some(features) = domain.features.as_mut() {
            features.smm = None;
        }
    }

    if model.cpu_pinning {
        domain.cpu_mut().dedicated_cpu_placement = Some(true);
    } else if let Some(cpu) = domain.cpu.as_mut() {
        cpu.dedicated_cpu_placement = None;
    }

    domain.devices.tpm = model.tpm_enabled.then(|| Tpm {
        persistent: model.tpm_persistent_state_enabled.then_some(true),
        ..Default::default()
    });

    let tablet = Input::usb_tablet();
    let inputs = domain.devices.inputs.get_or_insert_with(Vec::new);
    let present = inputs.contains(&tablet);
    if model.install_usb_tablet && !present {
        inputs.push(tablet);
    } else if !model.install_usb_tablet && present {
        inputs.retain(|input| *input != tablet);
    }
    if inputs.is_empty() {
        domain.devices.inputs = None;
    }
}

fn apply_access_credentials<R: Rng + ?Sized>(
    vm: &mut VirtualMachine,
    model: &FlatModel,
    name: &str,
    need_new_secret: bool,
    rng: &mut R,
) -> SyncResult<Vec<AccessCredentialRow>> {
    let mut users: Vec<String> = json_annotation(
        vm.template_meta().and_then(|m| m.annotations.as_ref()),
        ANNOTATION_DYNAMIC_SSH_KEY_USERS,
    );
    let mut key_names: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut rows = model.access_credentials.clone();
    let mut entries = Vec::with_capacity(rows.len());

    for row in rows.iter_mut() {
        if need_new_secret {
            row.secret_name = generate_secret_name(name, rng).unwrap_or_default();
        }
        let source = CredentialSecretSource {
            secret: SecretName {
                secret_name: row.secret_name.clone(),
            },
        };

        match row.source {
            CredentialKind::ResetPassword => {
                users.push(row.username.clone());
                entries.push(AccessCredential {
                    user_password: Some(CredentialSpec {
                        source,
                        propagation_method: PropagationMethod {
                            qemu_guest_agent: Some(QemuGuestAgentPropagation::default()),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                });
            }
            CredentialKind::InjectSsh => {
                users.extend(row.users.iter().cloned());
                key_names.insert(row.secret_name.clone(), row.sshkeys.clone());
                entries.push(AccessCredential {
                    ssh_public_key: Some(CredentialSpec {
                        source,
                        propagation_method: PropagationMethod {
                            qemu_guest_agent: Some(QemuGuestAgentPropagation {
                                users: Some(row.users.clone()),
                            }),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                });
            }
        }
    }

    let vmi = vm.vmi_spec_mut();
    if !entries.is_empty() || vmi.access_credentials.is_some() {
        vmi.access_credentials = Some(entries);
    }

    if !users.is_empty() {
        let mut seen = Vec::with_capacity(users.len());
        for user in users {
            if !seen.contains(&user) {
                seen.push(user);
            }
        }
        let template_meta = vm.template_meta_mut();
        template_meta.set_annotation(ANNOTATION_DYNAMIC_SSH_KEY_USERS, to_json_annotation(&seen)?);
        template_meta.set_annotation(ANNOTATION_DYNAMIC_SSH_KEY_NAMES, to_json_annotation(&key_names)?);
    }

    Ok(rows)
}

/// Regenerates interfaces and networks positionally from the rows.
fn apply_network_rows(vm: &mut VirtualMachine, rows: &[NetworkRow]) {
    let interfaces = rows
        .iter()
        .map(|row| {
            let mut interface = Interface {
                name: row.name.clone(),
                model: row.model.clone(),
                mac_address: row.mac_address.clone().filter(|mac| !mac.is_empty()),
                ..Default::default()
            };
            match row.interface_type {
                InterfaceType::Masquerade => interface.masquerade = Some(Extra::new()),
                InterfaceType::Bridge => interface.bridge = Some(Extra::new()),
                InterfaceType::Sriov => interface.sriov = Some(Extra::new()),
            }
            interface
        })
        .collect();
    let networks = rows
        .iter()
        .map(|row| Network {
            name: row.name.clone(),
            pod: row.is_pod.then(Extra::new),
            multus: (!row.is_pod).then(|| MultusNetwork {
                network_name: row.network_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    vm.domain_mut().devices.interfaces = Some(interfaces);
    vm.vmi_spec_mut().networks = Some(networks);
}

fn disk_device(row: &DiskRow, index: usize) -> Disk {
    let target = DiskTarget::with_bus(&row.bus);
    let (disk, cdrom) = match row.disk_type {
        DiskType::Disk => (Some(target), None),
        DiskType::CdRom => (None, Some(target)),
    };
    Disk {
        name: row.name.clone(),
        disk,
        cdrom,
        boot_order: Some(index as u32 + 1),
        ..Default::default()
    }
}

fn volume_entry(row: &DiskRow, volume_name: &str) -> Volume {
    let mut volume = Volume {
        name: row.name.clone(),
        ..Default::default()
    };
    match row.source {
        DiskSource::Container => {
            volume.container_disk = Some(ContainerDisk {
                image: row.container.clone(),
                ..Default::default()
            });
        }
        DiskSource::Image | DiskSource::New | DiskSource::AttachVolume => {
            volume.persistent_volume_claim = Some(PvcVolumeSource {
                claim_name: volume_name.to_string(),
                hotpluggable: row.hotpluggable.then_some(true),
                ..Default::default()
            });
        }
    }
    volume
}

/// Routes user and network data inline or through the cloud-init secret.
fn cloud_init_volume(
    model: &FlatModel,
    user_data: Option<&str>,
    network_data: Option<&str>,
    secret_name: Option<&str>,
) -> Volume {
    let secret_ref = |clear_text: bool| match secret_name {
        Some(name) if !clear_text => Some(LocalObjectReference::new(name)),
        _ => None,
    };

    let mut cloud_init = CloudInitNoCloud {
        secret_ref: secret_ref(model.save_user_data_as_clear_text),
        network_data_secret_ref: secret_ref(model.save_network_data_as_clear_text),
        ..Default::default()
    };
    if cloud_init.secret_ref.is_none() {
        cloud_init.user_data = user_data.map(str::to_string);
    }
    if cloud_init.network_data_secret_ref.is_none() {
        cloud_init.network_data = network_data.map(str::to_string);
    }

    Volume {
        name: CLOUD_INIT_DISK.to_string(),
        cloud_init_no_cloud: Some(cloud_init),
        ..Default::default()
    }
}

/// Spreads the VMs of one batch across hosts.
fn apply_batch_anti_affinity(vm: &mut VirtualMachine, name_prefix: &str) {
    let prefix = trim_trailing_hyphens(name_prefix).to_string();
    vm.template_meta_mut()
        .set_label(LABEL_VM_NAME_PREFIX, prefix.as_str());

    let rule = WeightedPodAffinityTerm {
        weight: 1,
        pod_affinity_term: PodAffinityTerm {
            topology_key: LABEL_HOSTNAME.to_string(),
            label_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([(LABEL_VM_NAME_PREFIX.to_string(), prefix)])),
                ..Default::default()
            }),
            ..Default::default()
        },
    };

    vm.vmi_spec_mut()
        .affinity
        .get_or_insert_with(Default::default)
        .pod_anti_affinity
        .get_or_insert_with(Default::default)
        .preferred_during_scheduling_ignored_during_execution
        .get_or_insert_with(Vec::new)
        .push(rule);
}
