//! Harvester label and annotation keys, and the fixed names the VM editor writes.

pub const ANNOTATION_RESERVED_MEMORY: &str = "harvesterhci.io/reservedMemory";
pub const ANNOTATION_CPU_MEMORY_HOTPLUG: &str = "harvesterhci.io/enableCPUAndMemoryHotplug";
pub const ANNOTATION_SSH_NAMES: &str = "harvesterhci.io/sshNames";
pub const ANNOTATION_VOLUME_CLAIM_TEMPLATES: &str = "harvesterhci.io/volumeClaimTemplates";
pub const ANNOTATION_IMAGE_ID: &str = "harvesterhci.io/imageId";
pub const ANNOTATION_DYNAMIC_SSH_KEY_USERS: &str = "harvesterhci.io/dynamic-ssh-key-users";
pub const ANNOTATION_DYNAMIC_SSH_KEY_NAMES: &str = "harvesterhci.io/dynamic-ssh-key-names";

pub const LABEL_MAINTENANCE_STRATEGY: &str = "harvesterhci.io/maintain-mode-strategy";
pub const LABEL_VM_NAME: &str = "harvesterhci.io/vmName";
pub const LABEL_VM_NAME_PREFIX: &str = "harvesterhci.io/vmNamePrefix";
pub const LABEL_CREATOR: &str = "harvesterhci.io/creator";
pub const LABEL_OS: &str = "harvesterhci.io/os";
pub const LABEL_CLOUD_INIT: &str = "harvesterhci.io/cloud-init-template";
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

pub const CREATOR_HARVESTER: &str = "harvester";

/// Harvester settings read when building a [`crate::SyncConfig`].
pub const SETTING_DEFAULT_STORAGE_CLASS: &str = "default-storage-class";
pub const SETTING_VM_TERMINATION_PERIOD: &str = "vm-termination-period";

/// Name shared by the cloud-init disk and its volume.
pub const CLOUD_INIT_DISK: &str = "cloudinitdisk";

/// Display name of the pod network in network rows.
pub const MANAGEMENT_NETWORK: &str = "management Network";

pub const ROOT_DISK_NAME: &str = "disk-0";

pub const VOLUME_MODE_BLOCK: &str = "Block";
pub const ACCESS_MODE_RWX: &str = "ReadWriteMany";

pub const BUS_VIRTIO: &str = "virtio";
pub const BUS_SATA: &str = "sata";

pub const KUBEVIRT_API_VERSION: &str = "kubevirt.io/v1";
pub const HARVESTER_API_VERSION: &str = "harvesterhci.io/v1beta1";

/// Secret data keys of the cloud-init secret.
pub const SECRET_USER_DATA: &str = "userdata";
pub const SECRET_NETWORK_DATA: &str = "networkdata";
