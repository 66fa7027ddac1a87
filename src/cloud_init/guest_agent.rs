//! Merging and removing the QEMU guest agent block of a cloud-config document.

use super::document::CloudConfigDocument;
use crate::core::domain::error::SyncResult;
use crate::core::domain::model::flat_model::OsType;
use serde_yaml::Value;

pub const QGA_PACKAGE: &str = "qemu-guest-agent";
pub const QGA_SERVICE: &str = "qemu-guest-agent.service";
pub const QGA_SUSE_SERVICE: &str = "qemu-ga.service";

const PACKAGE_UPDATE: &str = "package_update";
const PACKAGES: &str = "packages";
const RUNCMD: &str = "runcmd";

/// The guest agent unit for `os`.
pub fn service_name(os: OsType) -> &'static str {
    if os.is_suse_family() {
        QGA_SUSE_SERVICE
    } else {
        QGA_SERVICE
    }
}

/// `systemctl enable --now <service>` for the given OS.
pub fn runcmd(os: OsType) -> Vec<String> {
    enable_command(service_name(os))
}

/// The command written for the other guest agent unit; it is replaced
/// rather than duplicated when the OS type changes.
fn similar_runcmd(os: OsType) -> Vec<String> {
    let other = if os.is_suse_family() {
        QGA_SERVICE
    } else {
        QGA_SUSE_SERVICE
    };
    enable_command(other)
}

fn enable_command(service: &str) -> Vec<String> {
    ["systemctl", "enable", "--now", service]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn command_value(command: &[String]) -> Value {
    Value::Sequence(command.iter().cloned().map(Value::String).collect())
}

fn is_command(entry: &Value, command: &[String]) -> bool {
    match entry.as_sequence() {
        Some(items) => {
            items.len() == command.len()
                && items
                    .iter()
                    .zip(command)
                    .all(|(item, expected)| item.as_str() == Some(expected.as_str()))
        }
        None => false,
    }
}

fn package_value() -> Value {
    Value::String(QGA_PACKAGE.to_string())
}

/// Ensures the document installs and enables the guest agent.
///
/// `package_update` is set, the package is added to `packages` and the enable
/// command to `runcmd`. A command for the other agent unit is replaced in
/// place; a `packages` or `runcmd` value that is not a list is overwritten.
pub fn merge_qga(doc: &mut CloudConfigDocument, os: OsType) -> SyncResult<()> {
    let command = runcmd(os);
    let similar = similar_runcmd(os);

    doc.set(PACKAGE_UPDATE, Value::Bool(true))?;

    let packages = match doc.get(PACKAGES) {
        Some(Value::Sequence(items)) => {
            let mut items = items.clone();
            if !items.contains(&package_value()) {
                items.push(package_value());
            }
            items
        }
        _ => vec![package_value()],
    };
    doc.set(PACKAGES, Value::Sequence(packages))?;

    let commands = match doc.get(RUNCMD) {
        Some(Value::Sequence(items)) => {
            let mut items = items.clone();
            if let Some(index) = items.iter().position(|c| is_command(c, &similar)) {
                items[index] = command_value(&command);
            } else if !items.iter().any(|c| is_command(c, &command)) {
                items.push(command_value(&command));
            }
            items
        }
        _ => vec![command_value(&command)],
    };
    doc.set(RUNCMD, Value::Sequence(commands))?;

    Ok(())
}

/// Removes the guest agent enable command and, when `delete_package` is set,
/// the agent package. The package stays when `template` (the cloud-init
/// template the user data was built from) declares it too.
///
/// Lists left empty are removed unless protected by a `#cloud-config`
/// comment; an empty `packages` list also drops `package_update`.
pub fn delete_qga(
    doc: &mut CloudConfigDocument,
    os: OsType,
    delete_package: bool,
    template: Option<&str>,
) -> SyncResult<()> {
    let command = runcmd(os);

    match doc.get(PACKAGES).cloned() {
        Some(Value::Sequence(mut items)) => {
            if delete_package && !template_declares_package(template) {
                items.retain(|p| p != &package_value());
            }
            if items.is_empty() {
                doc.clear_sequence(PACKAGES)?;
                doc.delete_unprotected(PACKAGE_UPDATE);
            } else {
                doc.set(PACKAGES, Value::Sequence(items))?;
            }
        }
        None | Some(Value::Null) => {
            doc.delete_unprotected(PACKAGE_UPDATE);
        }
        Some(_) => {}
    }

    if let Some(Value::Sequence(mut items)) = doc.get(RUNCMD).cloned() {
        items.retain(|c| !is_command(c, &command));
        if items.is_empty() {
            doc.clear_sequence(RUNCMD)?;
        } else {
            doc.set(RUNCMD, Value::Sequence(items))?;
        }
    }

    Ok(())
}

fn template_declares_package(template: Option<&str>) -> bool {
    template
        .and_then(|text| serde_yaml::from_str::<Value>(text).ok())
        .and_then(|value| {
            value
                .get(PACKAGES)
                .and_then(Value::as_sequence)
                .map(|items| items.contains(&package_value()))
        })
        .unwrap_or(false)
}

/// Whether `user_data` already installs and enables the guest agent for `os`.
///
/// Empty or unparseable user data yields `default`.
pub fn has_install_agent(user_data: Option<&str>, os: OsType, default: bool) -> bool {
    let Some(text) = user_data.filter(|t| !t.trim().is_empty()) else {
        return default;
    };
    let value = match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Null) => return default,
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "user data is not valid YAML");
            return default;
        }
    };

    let command = runcmd(os);
    let has_package = value
        .get(PACKAGES)
        .and_then(Value::as_sequence)
        .is_some_and(|items| items.contains(&package_value()));
    let has_command = value
        .get(RUNCMD)
        .and_then(Value::as_sequence)
        .is_some_and(|items| items.iter().any(|c| is_command(c, &command)));

    has_package && has_command
}

/// The user data written for a new VM: a cloud-config document that only
/// installs the guest agent.
pub fn initial_user_data(os: OsType) -> SyncResult<String> {
    let mut doc = CloudConfigDocument::default();
    merge_qga(&mut doc, os)?;
    Ok(doc.render().unwrap_or_default())
}
