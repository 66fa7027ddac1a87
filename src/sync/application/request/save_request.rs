/// Options of a save that are not part of the flat model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Number of VMs created from this submission.
    pub count: u32,
    /// Shared name prefix of a multi-VM batch.
    pub name_prefix: String,
}

impl SaveRequest {
    pub fn single() -> Self {
        Self {
            count: 1,
            name_prefix: String::new(),
        }
    }

    /// A batch of `count` VMs named `<prefix><n>`.
    pub fn batch(name_prefix: impl Into<String>, count: u32) -> Self {
        Self {
            count,
            name_prefix: name_prefix.into(),
        }
    }

    pub fn is_batch(&self) -> bool {
        self.count > 1
    }
}

impl Default for SaveRequest {
    fn default() -> Self {
        Self::single()
    }
}
