use crate::core::domain::constants::{
    CREATOR_HARVESTER, HARVESTER_API_VERSION, KUBEVIRT_API_VERSION, LABEL_CLOUD_INIT,
    SECRET_NETWORK_DATA, SECRET_USER_DATA,
};
use crate::core::domain::error::{SyncError, SyncResult};
use crate::core::domain::model::flat_model::{CredentialKind, EditMode, FlatModel};
use crate::core::domain::model::meta::{ObjectMeta, ObjectMetaExt, OwnerReference};
use crate::core::domain::model::resource::{Secret, SecretExt};
use crate::core::domain::model::vm_resource::VmResource;
use crate::core::domain::value_object::CredentialPassword;
use crate::core::infrastructure::resource_store::ResourceStore;
use crate::sync::application::request::resource_snapshot::ResourceSnapshot;
use crate::sync::application::service::recompose_service::RecomposeOutput;
use std::collections::BTreeMap;

/// Writes the secrets a recomposed spec refers to.
pub struct PersistService<'a, S: ResourceStore + ?Sized> {
    store: &'a S,
    snapshot: &'a ResourceSnapshot,
}

impl<'a, S: ResourceStore + ?Sized> PersistService<'a, S> {
    pub fn new(store: &'a S, snapshot: &'a ResourceSnapshot) -> Self {
        Self { store, snapshot }
    }

    /// Saves user and network data to the cloud-init secret.
    ///
    /// Returns the stored secret, or `None` when nothing had to be written.
    pub async fn save_cloud_init_secret(
        &self,
        output: &RecomposeOutput,
        model: &FlatModel,
        mode: EditMode,
    ) -> SyncResult<Option<Secret>> {
        let resource = &output.resource;
        let Some(vm) = resource.vm().filter(|vm| vm.spec.is_some()) else {
            return Ok(None);
        };
        let Some(secret_name) = output.secret_name.as_deref() else {
            return Ok(None);
        };
        if model.is_windows() {
            return Ok(None);
        }

        let namespace = namespace_of(resource);
        let referenced = vm
            .vmi_spec()
            .and_then(|spec| spec.volumes.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|v| v.cloud_init_no_cloud.as_ref())
            .find_map(|c| c.secret_ref.as_ref().or(c.network_data_secret_ref.as_ref()))
            .map(|r| r.name.clone());

        let mut existing = match referenced {
            Some(name) => self.store.secret(&namespace, &name).await?,
            None => None,
        };
        // Data removed while editing still has to be cleared from the old secret.
        if existing.is_none() && mode.is_edit() {
            if let Some(old) = model.secret_ref.as_deref() {
                existing = self.store.secret(&namespace, old).await?;
            }
        }

        let mut secret = match existing {
            Some(secret) if !output.need_new_secret => secret,
            _ => new_secret(resource, secret_name, &namespace),
        };

        if model.save_user_data_as_clear_text && model.save_network_data_as_clear_text {
            tracing::debug!(secret = %secret.id(), "all cloud-init data is inline, skipping secret");
            return Ok(None);
        }

        secret.set_data(SECRET_USER_DATA, output.user_data.as_deref().unwrap_or_default());
        secret.set_data(
            SECRET_NETWORK_DATA,
            output.network_data.as_deref().unwrap_or_default(),
        );
        let saved = self.store.save_secret(secret).await?;
        tracing::info!(secret = %saved.id(), "saved cloud-init secret");
        Ok(Some(saved))
    }

    /// Saves one secret per access-credential row.
    ///
    /// Every secret is built before the first write. A failing write stops
    /// the loop; secrets written before it stay written.
    pub async fn save_access_credentials(&self, output: &RecomposeOutput) -> SyncResult<Vec<Secret>> {
        let resource = &output.resource;
        if resource.vm().is_none_or(|vm| vm.spec.is_none()) {
            return Ok(Vec::new());
        }
        let namespace = namespace_of(resource);

        let mut pending = Vec::with_capacity(output.access_credentials.len());
        for row in &output.access_credentials {
            let existing = match row.secret_ref.as_deref() {
                Some(name) if !output.need_new_secret => self.store.secret(&namespace, name).await?,
                _ => None,
            };
            let mut secret =
                existing.unwrap_or_else(|| new_secret(resource, &row.secret_name, &namespace));

            match row.source {
                CredentialKind::ResetPassword => {
                    let password = CredentialPassword::new(row.new_password.as_str())?;
                    secret.set_data(&row.username, password.as_str());
                }
                CredentialKind::InjectSsh => {
                    for id in &row.sshkeys {
                        let key = self.snapshot.ssh_key(id).ok_or_else(|| SyncError::NotFound {
                            kind: "sshkey".to_string(),
                            id: id.clone(),
                        })?;
                        secret.set_data(&key.secret_key(), &key.spec.public_key);
                    }
                }
            }
            pending.push(secret);
        }

        let mut saved = Vec::with_capacity(pending.len());
        for secret in pending {
            let secret = self.store.save_secret(secret).await?;
            tracing::info!(secret = %secret.id(), "saved access credential secret");
            saved.push(secret);
        }
        Ok(saved)
    }
}

fn namespace_of(resource: &VmResource) -> String {
    match resource.metadata().namespace_str() {
        "" => resource
            .vm()
            .map(|vm| vm.metadata.namespace_str().to_string())
            .unwrap_or_default(),
        namespace => namespace.to_string(),
    }
}

fn owner_references(resource: &VmResource) -> Vec<OwnerReference> {
    let metadata = resource.metadata();
    let (kind, api_version) = match resource {
        VmResource::VirtualMachine(vm) => (
            vm.kind.clone().unwrap_or_else(|| "VirtualMachine".to_string()),
            KUBEVIRT_API_VERSION,
        ),
        VmResource::TemplateVersion(version) => (
            version
                .kind
                .clone()
                .unwrap_or_else(|| "VirtualMachineTemplateVersion".to_string()),
            HARVESTER_API_VERSION,
        ),
        VmResource::Backup(_) => ("VirtualMachineBackup".to_string(), HARVESTER_API_VERSION),
    };
    vec![OwnerReference {
        api_version: api_version.to_string(),
        kind,
        name: metadata.name_str().to_string(),
        uid: metadata.uid.clone().unwrap_or_default(),
        ..Default::default()
    }]
}

fn new_secret(resource: &VmResource, name: &str, namespace: &str) -> Secret {
    Secret::with_metadata(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            LABEL_CLOUD_INIT.to_string(),
            CREATOR_HARVESTER.to_string(),
        )])),
        owner_references: Some(owner_references(resource)),
        ..Default::default()
    })
}
