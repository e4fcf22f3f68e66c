//! Policy/Validation Layer (§4.8).
//!
//! Exceptions-for-control-flow in the source are re-expressed here as the
//! repo's own idiom: every `Validate` impl returns *all* the problems it
//! finds in one pass instead of bailing on the first one, so a caller (the
//! REST boundary) can surface the whole list to an operator at once (§9
//! "Exceptions for control flow in validation code").

pub mod device;
pub mod immutability;
pub mod rollout_policy;
pub mod schedule;
pub mod template;

use std::fmt;

/// One validation failure, with the field path it applies to so a caller
/// can build a structured 400/422 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A small capability interface every validator in this crate implements
/// (§9 "Dynamic dispatch for validators and selectors"): `validate`
/// returns every error found, never just the first.
pub trait Validate {
    fn validate(&self) -> Vec<ValidationError>;
}

/// Run a validator and turn an empty result into `Ok`, matching how
/// `flightctl-service` will want to consume this (§7: 400/422 + `Status`).
pub fn check<T: Validate>(value: &T) -> Result<(), Vec<ValidationError>> {
    let errors = value.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

const FORBIDDEN_LABEL_PREFIX_MAX_LEN: usize = 253;
const MAX_ANNOTATION_VALUE_LEN: usize = 16 * 1024;

/// DNS-1123-ish label key validation for `labels`/`annotations` maps (§4.8
/// "Labels/annotations: DNS-1123 keys, bounded sizes"). Keys may carry an
/// optional DNS subdomain prefix (`example.com/key`), matching the
/// convention the rest of the data model already borrows.
pub fn validate_label_key(key: &str) -> Option<String> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };
    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > FORBIDDEN_LABEL_PREFIX_MAX_LEN {
            return Some(format!("label key prefix '{prefix}' has invalid length"));
        }
    }
    if !flightctl_types::metadata::is_dns1123_label(name) {
        return Some(format!("label key '{key}' is not a valid DNS-1123 name"));
    }
    None
}

pub fn validate_label_value(value: &str) -> Option<String> {
    if value.len() > MAX_ANNOTATION_VALUE_LEN {
        return Some("label value exceeds maximum length".to_string());
    }
    None
}

/// Device mount paths the engine must never let a spec write into, because
/// they're owned by the on-device agent itself (§4.8).
pub const FORBIDDEN_DEVICE_MOUNT_PATHS: &[&str] = &[
    "/etc/flightctl/certs",
    "/var/lib/flightctl",
    "/usr/lib/flightctl",
    "/etc/flightctl/config.yaml",
];

pub fn is_forbidden_mount_path(path: &str) -> bool {
    FORBIDDEN_DEVICE_MOUNT_PATHS
        .iter()
        .any(|forbidden| path == *forbidden || path.starts_with(&format!("{forbidden}/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_dns1123_label_key_is_valid() {
        assert_eq!(validate_label_key("site"), None);
        assert_eq!(validate_label_key("flightctl.io/site"), None);
    }

    #[test]
    fn uppercase_label_key_is_rejected() {
        assert!(validate_label_key("Site").is_some());
    }

    #[test]
    fn forbidden_mount_paths_reject_exact_and_nested() {
        assert!(is_forbidden_mount_path("/var/lib/flightctl"));
        assert!(is_forbidden_mount_path("/var/lib/flightctl/state.db"));
        assert!(!is_forbidden_mount_path("/var/lib/myapp"));
    }
}
