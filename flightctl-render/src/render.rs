use flightctl_types::{Device, DeviceSpec};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::template::{self, DeviceView, TemplateError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("fleet template is not valid JSON: {0}")]
    InvalidTemplateShape(#[from] serde_json::Error),
    #[error("placeholder parse error in field '{field}': {source}")]
    Parse {
        field: String,
        #[source]
        source: TemplateError,
    },
    #[error("placeholder resolution error in field '{field}': {source}")]
    Resolve {
        field: String,
        #[source]
        source: TemplateError,
    },
}

/// The restricted device view a fleet template may address (§4.1): name and
/// labels, nothing from `spec` or `status`.
fn view_for(device: &Device) -> DeviceView {
    DeviceView {
        name: device.metadata.name.clone(),
        labels: device.metadata.labels.clone(),
    }
}

/// Render every string leaf of a fleet template against a single device's
/// restricted view (§4.1), producing a concrete [`DeviceSpec`] with no
/// placeholders left in it. Any reference to a field the device view
/// doesn't expose fails the whole render rather than partially applying
/// (§4.1, §4.8).
pub fn render(template: &DeviceSpec, device: &Device) -> Result<DeviceSpec, RenderError> {
    let view = view_for(device);
    let template_json = serde_json::to_value(template)?;
    let rendered_json = render_value(template_json, &view, "$")?;
    let rendered: DeviceSpec = serde_json::from_value(rendered_json)?;
    Ok(rendered)
}

fn render_value(value: Value, view: &DeviceView, path: &str) -> Result<Value, RenderError> {
    match value {
        Value::String(s) => Ok(Value::String(render_string(&s, view, path)?)),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(render_value(item, view, &format!("{path}[{i}]"))?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map.into_iter() {
                let child_path = format!("{path}.{k}");
                out.insert(k, render_value(v, view, &child_path)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}

fn render_string(raw: &str, view: &DeviceView, path: &str) -> Result<String, RenderError> {
    let nodes = template::parse(raw).map_err(|source| RenderError::Parse {
        field: path.to_string(),
        source,
    })?;
    template::execute(&nodes, view).map_err(|source| RenderError::Resolve {
        field: path.to_string(),
        source,
    })
}

/// Canonical content hash of a rendered device spec (§3's `Hash(spec)`).
/// `serde_json`'s default map type is a `BTreeMap`, so object keys are
/// already emitted in sorted order — the same spec always hashes the same
/// way regardless of struct field declaration order.
pub fn hash_spec(spec: &DeviceSpec) -> Result<String, RenderError> {
    let canonical = serde_json::to_vec(spec)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::metadata::ObjectMeta;
    use flightctl_types::device::{ConsoleConfig, DeviceStatus, OciReference};
    use std::collections::BTreeMap;

    fn device(name: &str, site: &str) -> Device {
        let mut labels = BTreeMap::new();
        labels.insert("site".to_string(), site.to_string());
        let mut metadata = ObjectMeta::new("org-1", name);
        metadata.labels = labels;
        Device {
            metadata,
            spec: DeviceSpec {
                os_image: OciReference("quay.io/example/os@sha256:deadbeef".to_string()),
                config_providers: Vec::new(),
                applications: Vec::new(),
                resource_monitors: Vec::new(),
                systemd_matches: Vec::new(),
                console: ConsoleConfig::default(),
            },
            status: DeviceStatus::default(),
        }
    }

    fn template(os_image: &str) -> DeviceSpec {
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
    fn renders_placeholder_in_string_leaf() {
        let tpl = template("quay.io/example/{{ .metadata.labels.site }}-os:latest");
        let dev = device("dev-1", "madrid");
        let out = render(&tpl, &dev).unwrap();
        assert_eq!(out.os_image.0, "quay.io/example/madrid-os:latest");
    }

    #[test]
    fn non_exposed_field_reference_fails_the_render() {
        let tpl = template("quay.io/example/{{ .status.lastSeen }}:latest");
        let dev = device("dev-1", "madrid");
        let err = render(&tpl, &dev).unwrap_err();
        assert!(matches!(err, RenderError::Resolve { .. }));
    }

    #[test]
    fn identical_rendered_specs_hash_identically() {
        let tpl = template("quay.io/example/{{ .metadata.labels.site }}-os:latest");
        let a = render(&tpl, &device("dev-1", "madrid")).unwrap();
        let b = render(&tpl, &device("dev-2", "madrid")).unwrap();
        assert_eq!(hash_spec(&a).unwrap(), hash_spec(&b).unwrap());
    }

    #[test]
    fn differently_rendered_specs_hash_differently() {
        let tpl = template("quay.io/example/{{ .metadata.labels.site }}-os:latest");
        let a = render(&tpl, &device("dev-1", "madrid")).unwrap();
        let b = render(&tpl, &device("dev-2", "lisbon")).unwrap();
        assert_ne!(hash_spec(&a).unwrap(), hash_spec(&b).unwrap());
    }
}
