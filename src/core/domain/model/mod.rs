pub mod domain;
pub mod flat_model;
pub mod meta;
pub mod resource;
pub mod sync_config;
pub mod virtual_machine;
pub mod vm_resource;
pub mod volume;
