use crate::error::CoreError;

/// Validate an entity name or attribute key.
///
/// Names must start with an ASCII alphanumeric and may contain
/// alphanumerics, `_`, `.` and `-`. Empty names are rejected.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidName(name.to_string()))
    }
}

/// Validate an attribute key or subkey. Same alphabet as entity names, but
/// a leading underscore is allowed for system keys such as `_contains`.
pub fn validate_key(key: &str) -> Result<(), CoreError> {
    match key.strip_prefix('_') {
        Some(rest) => validate_name(rest),
        None => validate_name(key),
    }
}
