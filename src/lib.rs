pub mod cloud_init;
mod core;
mod sync;

pub use crate::core::domain::constants;
pub use crate::core::domain::error::{SyncError, SyncResult, ValidationError};
pub use crate::core::domain::model;
pub use crate::core::domain::model::flat_model::{
    AccessCredentialRow, CredentialKind, DiskRow, DiskSource, DiskType, EditMode, FlatModel,
    InterfaceType, MaintenanceStrategy, NetworkRow, OsType, RunStrategy,
};
pub use crate::core::domain::model::meta::ObjectMetaExt;
pub use crate::core::domain::model::resource::SecretExt;
pub use crate::core::domain::model::sync_config::SyncConfig;
pub use crate::core::domain::model::virtual_machine::VirtualMachine;
pub use crate::core::domain::model::vm_resource::{
    ResourceKind, VirtualMachineBackup, VirtualMachineTemplateVersion, VmResource,
};
pub use crate::core::domain::value_object::{
    CredentialPassword, MIN_PASSWORD_LENGTH, Quantity, normalize_gib,
};
pub use crate::core::infrastructure::resource_store::{InMemoryResourceStore, ResourceStore};
pub use crate::sync::application::request::load_request::LoadRequest;
pub use crate::sync::application::request::resource_snapshot::ResourceSnapshot;
pub use crate::sync::application::request::save_request::SaveRequest;
pub use crate::sync::application::service::{
    DecomposeService, PersistService, RecomposeOutput, RecomposeService, ValidationService,
};

use crate::cloud_init::{UserDataOptions, build_user_data, has_install_agent, initial_user_data};
use crate::core::domain::value_object::{SUFFIX_LENGTH, random_suffix};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// An editing session over one VM resource.
///
/// The session keeps the resource it was loaded from untouched and edits a
/// [`FlatModel`]. The `set_*` methods apply the same side effects the VM
/// form applies when a field changes, and [`EditSession::save`] maps the
/// model back onto the resource and persists the secrets it refers to.
///
/// # Examples
///
/// ```
/// use harvester_vm_sync::{EditMode, EditSession, InMemoryResourceStore, SaveRequest, SyncResult, VirtualMachine};
///
/// #[tokio::main]
/// async fn main() -> SyncResult<()> {
///     let vm: VirtualMachine = serde_json::from_str(
///         r#"{
///             "metadata": { "name": "vm1", "namespace": "default" },
///             "spec": { "template": { "spec": { "domain": {
///                 "cpu": { "cores": 2 },
///                 "resources": { "limits": { "memory": "4Gi" } },
///                 "devices": {}
///             } } } }
///         }"#,
///     )?;
///
///     let Some(mut session) = EditSession::builder()
///         .resource(vm)
///         .mode(EditMode::Edit)
///         .seed(42)
///         .load()?
///     else {
///         return Ok(());
///     };
///
///     session.update_cpu_memory(Some(4), Some("8Gi".to_string()), None, None, false);
///
///     let store = InMemoryResourceStore::new();
///     let saved = session.save(&store, &SaveRequest::single()).await?;
///     let domain = saved.vm().and_then(|vm| vm.domain()).expect("domain");
///     assert_eq!(domain.cpu.as_ref().and_then(|cpu| cpu.cores), Some(4));
///     Ok(())
/// }
/// ```
pub struct EditSession {
    config: SyncConfig,
    snapshot: ResourceSnapshot,
    mode: EditMode,
    original: VmResource,
    model: FlatModel,
    rng: StdRng,
}

/// Builder for [`EditSession`]
#[derive(Debug, Default)]
pub struct EditSessionBuilder {
    resource: Option<VmResource>,
    mode: EditMode,
    config: Option<SyncConfig>,
    snapshot: ResourceSnapshot,
    image_id: Option<String>,
    existing_user_data: bool,
    from_template: bool,
    seed: Option<u64>,
}

impl EditSessionBuilder {
    pub fn resource(mut self, resource: impl Into<VmResource>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn mode(mut self, mode: EditMode) -> Self {
        self.mode = mode;
        self
    }

    /// Defaults to [`SyncConfig::from_settings`] over the snapshot's settings.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn snapshot(mut self, snapshot: ResourceSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Image for the root disk of a VM that has no disks yet.
    pub fn image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn existing_user_data(mut self) -> Self {
        self.existing_user_data = true;
        self
    }

    pub fn from_template(mut self) -> Self {
        self.from_template = true;
        self
    }

    /// Seeds the generator of name suffixes, for reproducible output.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Decomposes the resource and opens the session.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no resource was given, and propagates
    /// decompose failures. `Ok(None)` means the resource has not loaded far
    /// enough to be edited yet.
    pub fn load(self) -> SyncResult<Option<EditSession>> {
        let resource = self
            .resource
            .ok_or_else(|| SyncError::from(ValidationError::required("Resource")))?;
        let config = self
            .config
            .unwrap_or_else(|| SyncConfig::from_settings(&self.snapshot.settings));
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut request = LoadRequest::new(resource, self.mode);
        request.image_id = self.image_id;
        request.existing_user_data = self.existing_user_data;
        request.from_template = self.from_template;

        EditSession::load(request, config, self.snapshot, rng)
    }
}

impl EditSession {
    /// Creates a new builder for an edit session
    pub fn builder() -> EditSessionBuilder {
        EditSessionBuilder::default()
    }

    /// Decomposes `request.resource` into a new session.
    pub fn load(
        request: LoadRequest,
        config: SyncConfig,
        snapshot: ResourceSnapshot,
        mut rng: StdRng,
    ) -> SyncResult<Option<Self>> {
        let model = DecomposeService::new(&config, &snapshot).decompose(&request, &mut rng)?;
        Ok(model.map(|model| Self {
            config,
            snapshot,
            mode: request.mode,
            original: request.resource,
            model,
            rng,
        }))
    }

    pub fn model(&self) -> &FlatModel {
        &self.model
    }

    /// Direct access to the model for fields without side effects.
    pub fn model_mut(&mut self) -> &mut FlatModel {
        &mut self.model
    }

    /// The resource as it was loaded.
    pub fn original(&self) -> &VmResource {
        &self.original
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Toggles "install guest agent" and rewrites the user data accordingly.
    ///
    /// With `delete_package` the agent package is removed too, unless the
    /// selected cloud-init template installs it.
    pub fn set_install_agent(&mut self, install_agent: bool, delete_package: bool) {
        self.model.install_agent = install_agent;
        self.model.user_script = self.rebuild_user_data(install_agent, self.model.os_type, delete_package);
    }

    /// Changes the OS type.
    ///
    /// Switching to Windows drops SSH keys, user and network data and the
    /// guest agent. Switching away from Windows starts over from the initial
    /// guest agent document.
    pub fn set_os_type(&mut self, os_type: OsType) -> SyncResult<()> {
        let previous = self.model.os_type;
        if previous == os_type {
            return Ok(());
        }
        self.model.os_type = os_type;

        if os_type.is_windows() {
            self.model.ssh_key.clear();
            self.model.user_script = None;
            self.model.network_script = None;
            self.model.install_agent = false;
        } else if previous.is_windows() {
            self.model.install_agent = true;
            self.set_user_script(Some(initial_user_data(os_type)?));
        } else {
            let user_script = self.rebuild_user_data(self.model.install_agent, os_type, false);
            self.set_user_script(user_script);
        }
        tracing::debug!(from = previous.as_str(), to = os_type.as_str(), "os type changed");
        Ok(())
    }

    /// Replaces the user data, re-deriving "install guest agent" from it.
    pub fn set_user_script(&mut self, user_script: Option<String>) {
        self.model.install_agent = has_install_agent(
            user_script.as_deref(),
            self.model.os_type,
            self.model.install_agent,
        );
        self.model.user_script = user_script;
    }

    pub fn set_network_script(&mut self, network_script: Option<String>) {
        self.model.network_script = network_script;
    }

    /// Loads a cloud-init template into the user data.
    pub fn set_user_data_template(&mut self, template_id: &str) -> SyncResult<()> {
        let text = self
            .snapshot
            .cloud_init_template(template_id)
            .ok_or_else(|| SyncError::NotFound {
                kind: "configmap".to_string(),
                id: template_id.to_string(),
            })?
            .to_string();
        self.model.user_data_template_id = Some(template_id.to_string());
        self.set_user_script(Some(text));
        Ok(())
    }

    /// Changes the selected SSH key pairs.
    ///
    /// On create, the public keys of deselected pairs are also removed from
    /// the user data.
    pub fn set_ssh_keys(&mut self, ssh_keys: Vec<String>) {
        let removed: Vec<String> = self
            .model
            .ssh_key
            .iter()
            .filter(|id| !ssh_keys.contains(id))
            .cloned()
            .collect();
        if !removed.is_empty() && self.mode.is_create() {
            let public_keys = self.snapshot.ssh_public_keys(&removed);
            self.model.user_script =
                cloud_init::remove_ssh_keys(self.model.user_script.as_deref(), &public_keys);
        }

        self.model.ssh_key = ssh_keys;
        let user_script = self.rebuild_user_data(self.model.install_agent, self.model.os_type, false);
        self.set_user_script(user_script);
    }

    /// Selects the image of the root disk. On create the OS type follows the
    /// image.
    pub fn set_root_image(&mut self, image_id: &str) -> SyncResult<()> {
        self.model.image_id = image_id.to_string();
        if let Some(row) = self
            .model
            .disk_rows
            .iter_mut()
            .find(|row| row.source == DiskSource::Image)
        {
            row.image = image_id.to_string();
        }

        if self.mode.is_create() {
            let os_type = self
                .snapshot
                .image(image_id)
                .and_then(|image| image.os_type.as_deref())
                .and_then(OsType::from_label);
            if let Some(os_type) = os_type {
                self.set_os_type(os_type)?;
            }
        }
        Ok(())
    }

    pub fn update_cpu_memory(
        &mut self,
        cpu: Option<u32>,
        memory: Option<String>,
        max_cpu: Option<u32>,
        max_memory: Option<String>,
        hotplug_enabled: bool,
    ) {
        self.model.cpu = cpu;
        self.model.memory = memory;
        self.model.max_cpu = max_cpu;
        self.model.max_memory = max_memory;
        self.model.cpu_memory_hotplug_enabled = hotplug_enabled;
    }

    /// Appends a new blank volume with the storage defaults of the cluster.
    pub fn add_volume(&mut self) -> &DiskRow {
        let taken = |name: &str| self.model.disk_rows.iter().any(|row| row.name == name);
        let name = (0..)
            .map(|index| format!("disk-{index}"))
            .find(|name| !taken(name))
            .unwrap_or_default();

        let row = DiskRow {
            id: random_suffix(&mut self.rng, SUFFIX_LENGTH),
            source: DiskSource::New,
            name,
            bus: constants::BUS_VIRTIO.to_string(),
            disk_type: DiskType::Disk,
            access_mode: self.config.default_access_mode.clone(),
            size: format!("{}Gi", self.config.default_disk_size_gib),
            volume_mode: self.config.default_volume_mode.clone(),
            boot_order: self.model.disk_rows.len() as u32 + 1,
            ..Default::default()
        };
        self.model.disk_rows.push(row);
        &self.model.disk_rows[self.model.disk_rows.len() - 1]
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        ValidationService::validate(&self.model)
    }

    /// Validates, recomposes and persists the session.
    ///
    /// Returns the resource to submit to the cluster. Nothing is written to
    /// `store` when validation fails.
    ///
    /// # Errors
    ///
    /// * [`SyncError::Validation`] with every form error
    /// * [`SyncError::NotFound`] for a selected SSH key missing from the snapshot
    /// * Any error reported by `store`; secrets saved before it stay saved
    pub async fn save<S>(&mut self, store: &S, request: &SaveRequest) -> SyncResult<VmResource>
    where
        S: ResourceStore + ?Sized,
    {
        let errors = self.validate();
        if !errors.is_empty() {
            tracing::debug!(count = errors.len(), "validation failed, nothing saved");
            return Err(SyncError::Validation { errors });
        }

        let output = RecomposeService::new(&self.config, &self.snapshot).recompose(
            &self.model,
            &self.original,
            self.mode,
            request,
            &mut self.rng,
        )?;

        let persist = PersistService::new(store, &self.snapshot);
        persist
            .save_cloud_init_secret(&output, &self.model, self.mode)
            .await?;
        persist.save_access_credentials(&output).await?;

        self.model.secret_name = output.secret_name.clone();
        self.model.access_credentials = output.access_credentials;
        Ok(output.resource)
    }

    fn rebuild_user_data(&self, install_agent: bool, os_type: OsType, delete_package: bool) -> Option<String> {
        let ssh_public_keys = self.snapshot.ssh_public_keys(&self.model.ssh_key);
        build_user_data(&UserDataOptions {
            user_script: self.model.user_script.as_deref(),
            ssh_public_keys: &ssh_public_keys,
            install_agent,
            os_type,
            delete_package,
            template: self
                .model
                .user_data_template_id
                .as_deref()
                .and_then(|id| self.snapshot.cloud_init_template(id)),
        })
    }
}

#[cfg(test)]
mod tests;
