mod credential_password;
mod quantity;
mod resource_name;
pub mod serde_helpers;

pub use credential_password::{CredentialPassword, MIN_PASSWORD_LENGTH};
pub use quantity::{Quantity, normalize_gib, with_gib_suffix};
pub use resource_name::{
    SUFFIX_LENGTH, generate_secret_name, generate_volume_name, random_suffix,
    trim_trailing_hyphens,
};

// Re-export validation functions for internal use
pub(crate) use quantity::validate_quantity;
