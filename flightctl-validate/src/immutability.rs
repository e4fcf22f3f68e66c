//! Update-time immutability rules (§4.8, §6): `name`, `apiVersion`, `kind`
//! and `status` never change once a resource exists, and a JSON Patch
//! (RFC 6902) document may only touch `/metadata/*` — never `/spec/*`,
//! `/status/*`, `/metadata/name` or `/metadata/resourceVersion`.

use crate::ValidationError;

/// Whether a single RFC 6902 `"path"` pointer is allowed to appear in a
/// PATCH against any resource kind in this data model. `flightctl-service`
/// calls this per-operation before applying a patch; a `false` result maps
/// to the documented 400 (§6).
pub fn json_patch_path_allowed(pointer: &str) -> bool {
    if pointer == "/metadata/name" || pointer == "/metadata/resourceVersion" {
        return false;
    }
    pointer.starts_with("/metadata/")
}

/// Check a PUT/replace body's immutable top-level fields against the
/// existing resource. `name_before`/`name_after` are the `metadata.name`
/// values; callers compare `status` sections themselves via `PartialEq`
/// when the resource type supports it, since this crate doesn't need to
/// know every resource's `Status` shape to enforce the name rule.
pub fn validate_name_immutable(name_before: &str, name_after: &str) -> Vec<ValidationError> {
    if name_before != name_after {
        vec![ValidationError::new("metadata.name", "name is immutable after create")]
    } else {
        Vec::new()
    }
}

/// CSR/EnrollmentRequest `spec` is immutable after create (§3, §4.5): a
/// PATCH/PUT targeting `/spec/*` is a 400, full stop, regardless of
/// whether the new value happens to be byte-identical.
pub fn spec_patch_rejected(pointer: &str) -> bool {
    pointer == "/spec" || pointer.starts_with("/spec/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_labels_patch_is_allowed() {
        assert!(json_patch_path_allowed("/metadata/labels/site"));
    }

    #[test]
    fn metadata_name_patch_is_rejected() {
        assert!(!json_patch_path_allowed("/metadata/name"));
    }

    #[test]
    fn spec_patch_is_rejected() {
        assert!(!json_patch_path_allowed("/spec/osImage"));
        assert!(spec_patch_rejected("/spec/osImage"));
    }

    #[test]
    fn status_patch_is_rejected() {
        assert!(!json_patch_path_allowed("/status/lastSeen"));
    }

    #[test]
    fn name_change_on_replace_is_rejected() {
        let errors = validate_name_immutable("dev-1", "dev-2");
        assert!(!errors.is_empty());
    }
}
