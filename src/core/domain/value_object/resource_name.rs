use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of the random suffix appended to generated resource names.
pub const SUFFIX_LENGTH: usize = 5;

/// Returns `len` random lowercase alphanumeric characters.
pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .collect()
}

/// Builds `<prefix>-<suffix>`, the naming scheme of cloud-init and
/// access-credential secrets. Returns `None` for an empty prefix.
pub fn generate_secret_name<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }
    Some(format!("{prefix}-{}", random_suffix(rng, SUFFIX_LENGTH)))
}

/// Builds the claim name of a disk that needs a new volume.
pub fn generate_volume_name<R: Rng + ?Sized>(vm_name: &str, disk_name: &str, rng: &mut R) -> String {
    format!("{vm_name}-{disk_name}-{}", random_suffix(rng, SUFFIX_LENGTH))
}

pub fn trim_trailing_hyphens(value: &str) -> &str {
    value.trim_end_matches('-')
}
