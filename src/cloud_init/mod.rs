//! Cloud-init user data editing.
//!
//! The "install guest agent" and "SSH keys" options of the VM form are
//! applied to the user's cloud-config document here, without disturbing
//! comments or keys the options do not own.

pub mod document;
pub mod guest_agent;
pub mod ssh_keys;

pub use document::{CLOUD_CONFIG_HEADER, CloudConfigDocument, has_cloud_config_header};
pub use guest_agent::{has_install_agent, initial_user_data};

use crate::core::domain::error::SyncResult;
use crate::core::domain::model::flat_model::OsType;

/// Inputs for [`build_user_data`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UserDataOptions<'a> {
    /// The document as the user last edited it.
    pub user_script: Option<&'a str>,
    /// Public keys of the selected SSH key pairs.
    pub ssh_public_keys: &'a [String],
    pub install_agent: bool,
    pub os_type: OsType,
    /// Also remove the agent package when uninstalling.
    pub delete_package: bool,
    /// The cloud-init template the document came from, if any.
    pub template: Option<&'a str>,
}

/// Produces the user data to save from the user's document and the form
/// options.
///
/// A document that cannot be parsed is returned unchanged. An empty result
/// yields `None`.
pub fn build_user_data(options: &UserDataOptions<'_>) -> Option<String> {
    match try_build_user_data(options) {
        Ok(user_data) => user_data,
        Err(e) => {
            tracing::warn!(error = %e, "unable to parse user data, keeping it unchanged");
            options.user_script.map(str::to_string)
        }
    }
}

fn try_build_user_data(options: &UserDataOptions<'_>) -> SyncResult<Option<String>> {
    let mut doc = CloudConfigDocument::parse(options.user_script.unwrap_or_default())?;
    ssh_keys::merge_ssh_keys(&mut doc, options.ssh_public_keys)?;
    if options.install_agent {
        guest_agent::merge_qga(&mut doc, options.os_type)?;
    } else {
        guest_agent::delete_qga(
            &mut doc,
            options.os_type,
            options.delete_package,
            options.template,
        )?;
    }
    Ok(doc.render())
}

/// Removes deselected SSH public keys from the user's document.
///
/// A document that cannot be parsed is returned unchanged.
pub fn remove_ssh_keys(user_script: Option<&str>, removed: &[String]) -> Option<String> {
    let result = CloudConfigDocument::parse(user_script.unwrap_or_default()).and_then(|mut doc| {
        ssh_keys::delete_ssh_keys(&mut doc, removed)?;
        Ok(doc.render())
    });
    match result {
        Ok(user_data) => user_data,
        Err(e) => {
            tracing::warn!(error = %e, "unable to parse user data, keeping it unchanged");
            user_script.map(str::to_string)
        }
    }
}
