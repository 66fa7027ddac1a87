use crate::core::domain::model::flat_model::EditMode;
use crate::core::domain::model::vm_resource::VmResource;

/// What to decompose, and how the editor was opened.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub resource: VmResource,
    pub mode: EditMode,
    /// Image picked for the root disk of a VM that has no disks yet.
    pub image_id: Option<String>,
    /// The caller already supplies user data, so a new VM keeps it instead
    /// of getting the initial guest agent document.
    pub existing_user_data: bool,
    /// The resource was instantiated from a VM template.
    pub from_template: bool,
}

impl LoadRequest {
    pub fn new(resource: impl Into<VmResource>, mode: EditMode) -> Self {
        Self {
            resource: resource.into(),
            mode,
            image_id: None,
            existing_user_data: false,
            from_template: false,
        }
    }

    pub fn with_image(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_existing_user_data(mut self) -> Self {
        self.existing_user_data = true;
        self
    }

    pub fn from_template(mut self) -> Self {
        self.from_template = true;
        self
    }
}
