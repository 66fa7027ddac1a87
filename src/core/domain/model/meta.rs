//! Accessors over the Kubernetes object metadata every resource carries.

use std::collections::BTreeMap;

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

/// Builds metadata holding only a namespace and a name.
pub fn object_meta(namespace: impl Into<String>, name: impl Into<String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(namespace.into()),
        ..Default::default()
    }
}

pub trait ObjectMetaExt {
    fn name_str(&self) -> &str;
    fn namespace_str(&self) -> &str;
    fn annotation(&self, key: &str) -> Option<&str>;
    fn label(&self, key: &str) -> Option<&str>;
    fn set_annotation(&mut self, key: &str, value: impl Into<String>);
    fn remove_annotation(&mut self, key: &str);
    fn set_label(&mut self, key: &str, value: impl Into<String>);
    fn remove_label(&mut self, key: &str);

    /// `namespace/name`, the id format of the resource store.
    fn id(&self) -> String {
        format!("{}/{}", self.namespace_str(), self.name_str())
    }

    fn is_named(&self, namespace: &str, name: &str) -> bool {
        self.namespace_str() == namespace && self.name_str() == name
    }
}

impl ObjectMetaExt for ObjectMeta {
    fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.as_ref()?.get(key).map(String::as_str)
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
    }

    fn remove_annotation(&mut self, key: &str) {
        if let Some(annotations) = self.annotations.as_mut() {
            annotations.remove(key);
        }
    }

    fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
    }

    fn remove_label(&mut self, key: &str) {
        if let Some(labels) = self.labels.as_mut() {
            labels.remove(key);
        }
    }
}
