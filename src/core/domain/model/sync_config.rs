use super::meta::ObjectMetaExt;
use super::resource::Setting;
use crate::core::domain::constants::{
    ACCESS_MODE_RWX, SETTING_DEFAULT_STORAGE_CLASS, SETTING_VM_TERMINATION_PERIOD,
    VOLUME_MODE_BLOCK,
};
use crate::core::domain::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Cluster-level defaults applied while decomposing and recomposing specs.
///
/// # Examples
///
/// ```
/// use harvester_vm_sync::SyncConfig;
///
/// let config = SyncConfig::default();
/// assert_eq!(config.default_volume_mode, "Block");
/// assert_eq!(config.default_termination_grace_period_seconds, 120);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Volume mode for disk rows whose claim does not declare one
    pub default_volume_mode: String,
    /// Access mode of the default storage class
    pub default_access_mode: String,
    /// Grace period used when a spec does not set one
    pub default_termination_grace_period_seconds: i64,
    /// Machine type used when a spec does not set one; empty means cluster default
    pub default_machine_type: String,
    /// Size of the synthesized root disk when no image size is known
    pub default_disk_size_gib: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_volume_mode: VOLUME_MODE_BLOCK.to_string(),
            default_access_mode: ACCESS_MODE_RWX.to_string(),
            default_termination_grace_period_seconds: 120,
            default_machine_type: String::new(),
            default_disk_size_gib: 10,
        }
    }
}

/// Value of the `default-storage-class` setting.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageClassSetting {
    #[serde(default)]
    volume_mode: Option<String>,
    #[serde(default)]
    access_modes: Option<Value>,
}

impl SyncConfig {
    /// Builds a configuration from Harvester settings, falling back to the
    /// defaults for anything missing or malformed.
    pub fn from_settings(settings: &[Setting]) -> Self {
        let mut config = Self::default();
        let find = |name: &str| settings.iter().find(|s| s.metadata.name_str() == name);

        if let Some(raw) = find(SETTING_DEFAULT_STORAGE_CLASS).and_then(Setting::effective) {
            match serde_json::from_str::<StorageClassSetting>(raw) {
                Ok(setting) => {
                    if let Some(mode) = setting.volume_mode.filter(|m| !m.is_empty()) {
                        config.default_volume_mode = mode;
                    }
                    // Older clusters store a single string, newer ones a list.
                    let access_mode = match setting.access_modes {
                        Some(Value::String(mode)) => Some(mode),
                        Some(Value::Array(modes)) => modes
                            .into_iter()
                            .find_map(|m| m.as_str().map(str::to_string)),
                        _ => None,
                    };
                    if let Some(mode) = access_mode.filter(|m| !m.is_empty()) {
                        config.default_access_mode = mode;
                    }
                }
                Err(e) => {
                    tracing::warn!(setting = SETTING_DEFAULT_STORAGE_CLASS, error = %e, "ignoring malformed setting");
                }
            }
        }

        if let Some(raw) = find(SETTING_VM_TERMINATION_PERIOD).and_then(Setting::effective) {
            match raw.trim().parse::<i64>() {
                Ok(seconds) => config.default_termination_grace_period_seconds = seconds,
                Err(e) => {
                    tracing::warn!(setting = SETTING_VM_TERMINATION_PERIOD, error = %e, "ignoring malformed setting");
                }
            }
        }

        config
    }

    /// Loads a configuration from a JSON file. Missing fields take their
    /// default values.
    pub async fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))
    }
}
