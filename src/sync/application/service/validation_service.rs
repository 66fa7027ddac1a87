use crate::core::domain::error::ValidationError;
use crate::core::domain::model::flat_model::{AccessCredentialRow, CredentialKind, DiskSource, FlatModel};
use crate::core::domain::value_object::{CredentialPassword, validate_quantity, with_gib_suffix};

/// Form checks run before anything is recomposed or persisted.
pub struct ValidationService;

impl ValidationService {
    /// Collects every validation message for `model`.
    ///
    /// Credential rows are checked in order and checking stops after the
    /// first row that has errors.
    pub fn validate(model: &FlatModel) -> Vec<ValidationError> {
        let mut errors = Self::validate_cpu_memory(model);
        errors.extend(Self::validate_disk_sizes(model));
        errors.extend(Self::validate_access_credentials(&model.access_credentials));
        errors
    }

    fn validate_cpu_memory(model: &FlatModel) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if model.cpu.is_none_or(|cpu| cpu == 0) {
            errors.push(ValidationError::required("CPU"));
        }
        if model.memory.as_deref().is_none_or(str::is_empty) {
            errors.push(ValidationError::required("Memory"));
        }
        if model.cpu_memory_hotplug_enabled {
            if model.max_cpu.is_none_or(|cpu| cpu == 0) {
                errors.push(ValidationError::required("Maximum CPU"));
            }
            if model.max_memory.as_deref().is_none_or(str::is_empty) {
                errors.push(ValidationError::required("Maximum Memory"));
            }
        }
        errors
    }

    fn validate_disk_sizes(model: &FlatModel) -> Vec<ValidationError> {
        model
            .disk_rows
            .iter()
            .filter(|row| row.source != DiskSource::Container)
            .filter_map(|row| validate_quantity(&with_gib_suffix(&row.size)).err())
            .collect()
    }

    fn validate_access_credentials(rows: &[AccessCredentialRow]) -> Vec<ValidationError> {
        for row in rows {
            let mut errors = Vec::new();
            match row.source {
                CredentialKind::ResetPassword => {
                    if row.username.is_empty() {
                        errors.push(ValidationError::required("Username"));
                    }
                    if let Err(e) = CredentialPassword::new(row.new_password.as_str()) {
                        errors.push(e);
                    }
                }
                CredentialKind::InjectSsh => {
                    if row.users.is_empty() {
                        errors.push(ValidationError::required("Username"));
                    }
                    if row.sshkeys.is_empty() {
                        errors.push(ValidationError::required("SSH Key"));
                    }
                }
            }
            if !errors.is_empty() {
                return errors;
            }
        }
        Vec::new()
    }
}
