use crate::core::domain::error::ValidationError;

const GIBIBYTE: f64 = 1024.0 * 1024.0 * 1024.0;

/// Binary and decimal suffixes accepted by Kubernetes resource quantities.
const SUFFIXES: [(&str, f64); 13] = [
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", GIBIBYTE),
    ("Ti", GIBIBYTE * 1024.0),
    ("Pi", GIBIBYTE * 1024.0 * 1024.0),
    ("Ei", GIBIBYTE * 1024.0 * 1024.0 * 1024.0),
    ("m", 0.001),
    ("k", 1e3),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
];

/// A storage or memory quantity such as `10Gi`, `512Mi` or `1073741824`.
///
/// The value is kept in bytes so rows can be normalized to whole or
/// fractional GiB the way the VM form displays them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity(f64);

impl Quantity {
    /// Parses a quantity string.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        validate_quantity(value)?;
        let trimmed = value.trim();
        let (number, multiplier) = split_suffix(trimmed);
        let parsed = number
            .parse::<f64>()
            .map_err(|_| ValidationError::Format(format!("Invalid quantity '{value}'")))?;
        Ok(Self(parsed * multiplier))
    }

    /// Creates a quantity from a byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes as f64)
    }

    /// Returns the quantity in bytes.
    pub fn bytes(&self) -> f64 {
        self.0
    }

    /// Whole GiB, rounded up.
    pub fn ceil_gib(&self) -> u64 {
        (self.0 / GIBIBYTE).ceil() as u64
    }

    /// Formats the value in GiB with at most two decimals and a `Gi` suffix,
    /// e.g. `10Gi` or `0.5Gi`.
    pub fn to_gib_string(&self) -> String {
        let gib = (self.0 / GIBIBYTE * 100.0).round() / 100.0;
        let mut text = format!("{gib:.2}");
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
        format!("{text}Gi")
    }
}

fn split_suffix(value: &str) -> (&str, f64) {
    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = value.strip_suffix(suffix) {
            return (number, multiplier);
        }
    }
    if let Some(number) = value.strip_suffix('E') {
        return (number, 1e18);
    }
    (value, 1.0)
}

/// Validates a quantity string.
pub(crate) fn validate_quantity(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::required("Size"));
    }
    let (number, _) = split_suffix(trimmed);
    if number.is_empty() || number.parse::<f64>().map_or(true, |n| n < 0.0) {
        return Err(ValidationError::Format(format!(
            "Invalid quantity '{value}'"
        )));
    }
    Ok(())
}

/// Normalizes a disk size for display: `10Gi` stays `10Gi`, `512Mi` becomes
/// `0.5Gi`, and an unparseable value falls back to `default`.
pub fn normalize_gib(value: &str, default: &str) -> String {
    Quantity::parse(value)
        .or_else(|_| Quantity::parse(default))
        .map(|q| q.to_gib_string())
        .unwrap_or_else(|_| default.to_string())
}

/// Appends the `Gi` unit to bare numbers, as the form accepts `20` for `20Gi`.
pub fn with_gib_suffix(size: &str) -> String {
    if !size.is_empty() && !size.contains("Gi") {
        format!("{size}Gi")
    } else {
        size.to_string()
    }
}
