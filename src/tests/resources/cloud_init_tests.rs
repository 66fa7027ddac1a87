use super::super::{edit_session, snapshot, vm};
use crate::core::domain::model::resource::ConfigMap;
use crate::{EditMode, EditSession, SyncError};
use serde_yaml::Value;
use std::collections::BTreeMap;

fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
}

fn template_session(cloud_init: &str) -> EditSession {
    let mut snapshot = snapshot();
    snapshot.config_maps.push(ConfigMap {
        metadata: super::super::meta("default", "ubuntu-agent"),
        data: Some(BTreeMap::from([("cloudInit".to_string(), cloud_init.to_string())])),
        ..Default::default()
    });
    EditSession::builder()
        .resource(vm())
        .mode(EditMode::Edit)
        .snapshot(snapshot)
        .seed(7)
        .load()
        .unwrap()
        .unwrap()
}

#[test]
fn test_agent_merges_into_existing_packages() {
    let mut session = template_session("#cloud-config\npackages:\n  - curl\n");
    session.set_user_data_template("default/ubuntu-agent").unwrap();
    session.set_ssh_keys(Vec::new());
    assert!(!session.model().install_agent);

    session.set_install_agent(true, false);
    let doc = yaml(session.model().user_script.as_deref().unwrap());
    assert_eq!(doc["packages"], yaml("[curl, qemu-guest-agent]"));
    assert_eq!(doc["package_update"], Value::Bool(true));
    assert_eq!(
        doc["runcmd"],
        yaml("[[systemctl, enable, --now, qemu-guest-agent.service]]")
    );
}

#[test]
fn test_template_package_survives_uninstall() {
    let template = "#cloud-config\npackage_update: true\npackages:\n  - qemu-guest-agent\nruncmd:\n  - [systemctl, enable, --now, qemu-guest-agent.service]\n";
    let mut session = template_session(template);
    session.set_user_data_template("default/ubuntu-agent").unwrap();
    assert_eq!(
        session.model().user_data_template_id.as_deref(),
        Some("default/ubuntu-agent")
    );
    assert!(session.model().install_agent);

    session.set_install_agent(false, true);
    let doc = yaml(session.model().user_script.as_deref().unwrap());
    assert_eq!(doc["packages"], yaml("[qemu-guest-agent]"));
    assert!(doc.get("runcmd").is_none());
}

#[test]
fn test_unknown_template_is_not_found() {
    let mut session = edit_session(EditMode::Edit);
    let err = session.set_user_data_template("default/missing").unwrap_err();
    assert!(matches!(err, SyncError::NotFound { ref kind, .. } if kind == "configmap"));
    assert_eq!(session.model().user_data_template_id, None);
}

#[test]
fn test_comments_survive_key_merge_and_removal() {
    let mut session = edit_session(EditMode::Create);
    session.set_user_script(Some(
        "#cloud-config\n# hostname comes from DHCP\nhostname: vm1\n".to_string(),
    ));

    session.set_ssh_keys(vec!["default/mykey".to_string()]);
    let merged = session.model().user_script.clone().unwrap();
    assert!(merged.starts_with("#cloud-config\n# hostname comes from DHCP\nhostname: vm1\n"));
    assert!(merged.contains("ssh-ed25519 AAAAC3Nza mykey"));

    session.set_ssh_keys(Vec::new());
    let removed = session.model().user_script.clone().unwrap();
    assert!(removed.contains("# hostname comes from DHCP\nhostname: vm1\n"));
    assert!(!removed.contains("mykey"));
}
