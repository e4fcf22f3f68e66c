//! Template-expression validation (§4.8): a fleet template must parse under
//! the restricted grammar `flightctl-render` owns, and must execute
//! successfully against a dummy device (`name = "name"`, no labels).
//!
//! Parsing and evaluation themselves are not reimplemented here — this
//! module only drives `flightctl_render::template` over every string leaf
//! of a `DeviceSpec` and turns its errors into [`ValidationError`]s the
//! rest of this crate's API returns.

use flightctl_render::template::{self, DeviceView};
use flightctl_types::DeviceSpec;
use serde_json::Value;

use crate::ValidationError;

fn dummy_view() -> DeviceView {
    DeviceView {
        name: "name".to_string(),
        labels: Default::default(),
    }
}

/// Walk every string leaf of `template`, parse it under the restricted
/// grammar, and execute it against the dummy device. Any parse failure
/// (including a rejected `if`/`range`/`with`/`define`) or evaluation
/// failure (reference to a non-exposed field) is collected and returned —
/// this function never stops at the first bad field (§9).
pub fn validate_template(template: &DeviceSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let json = match serde_json::to_value(template) {
        Ok(v) => v,
        Err(e) => {
            errors.push(ValidationError::new("spec.template.spec", e.to_string()));
            return errors;
        }
    };
    let view = dummy_view();
    walk(&json, "spec.template.spec", &view, &mut errors);
    errors
}

fn walk(value: &Value, path: &str, view: &DeviceView, errors: &mut Vec<ValidationError>) {
    match value {
        Value::String(s) => match template::parse(s) {
            Ok(nodes) => {
                if let Err(e) = template::execute(&nodes, view) {
                    errors.push(ValidationError::new(path, e.to_string()));
                }
            }
            Err(e) => errors.push(ValidationError::new(path, e.to_string())),
        },
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{path}[{i}]"), view, errors);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                walk(v, &format!("{path}.{k}"), view, errors);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{ConsoleConfig, OciReference};

    fn spec(os_image: &str) -> DeviceSpec {
        DeviceSpec {
            os_image: OciReference(os_image.to_string()),
            config_providers: Vec::new(),
            applications: Vec::new(),
            resource_monitors: Vec::new(),
            systemd_matches: Vec::new(),
            console: ConsoleConfig::default(),
        }
    }

    #[test]
    fn plain_placeholder_template_is_valid() {
        let errors = validate_template(&spec("quay.io/example/{{ .metadata.labels.site }}-os:latest"));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn control_flow_construct_is_rejected() {
        let errors = validate_template(&spec("{{ if .metadata.name }}x{{ end }}"));
        assert!(!errors.is_empty());
    }

    #[test]
    fn non_exposed_field_reference_is_rejected() {
        let errors = validate_template(&spec("{{ .status.lastSeen }}"));
        assert!(!errors.is_empty());
    }

    #[test]
    fn missing_label_does_not_fail_validation() {
        let errors = validate_template(&spec("{{ .metadata.labels.missing }}"));
        assert!(errors.is_empty(), "{errors:?}");
    }
}
