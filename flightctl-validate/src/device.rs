//! Validation rules for a `DeviceSpec` — resource monitors, alert rules,
//! applications, and the forbidden-mount-path check (§4.8).

use std::collections::HashSet;

use flightctl_types::device::{AppType, ApplicationSpec, DeviceSpec, MonitorType, ResourceMonitor};

use crate::{is_forbidden_mount_path, ValidationError};

/// Full validation of a `DeviceSpec`, used both for a standalone device and
/// for a fleet's template (minus the template-expression pass, which lives
/// in [`crate::template`] since it needs the restricted grammar, not this
/// module's structural checks).
pub fn validate_device_spec(spec: &DeviceSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_resource_monitors(&spec.resource_monitors, &mut errors);
    validate_applications(&spec.applications, &mut errors);
    errors
}

fn validate_resource_monitors(monitors: &[ResourceMonitor], errors: &mut Vec<ValidationError>) {
    let mut seen_types = HashSet::new();
    for (i, monitor) in monitors.iter().enumerate() {
        let field = format!("spec.resourceMonitors[{i}]");
        if !seen_types.insert(monitor.monitor_type) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate monitorType {:?}", monitor.monitor_type),
            ));
        }
        if matches!(monitor.monitor_type, MonitorType::Cpu | MonitorType::Memory) && monitor.path.is_some() {
            errors.push(ValidationError::new(
                format!("{field}.path"),
                "CPU and Memory monitors must not carry a path field",
            ));
        }
        if monitor.sampling_interval_seconds >= monitor.alert_duration_seconds {
            errors.push(ValidationError::new(
                format!("{field}.samplingIntervalSeconds"),
                "sampling interval must be less than alert duration",
            ));
        }

        let mut seen_severities = HashSet::new();
        for (j, rule) in monitor.alert_rules.iter().enumerate() {
            let rule_field = format!("{field}.alertRules[{j}]");
            if !seen_severities.insert(rule.severity) {
                errors.push(ValidationError::new(&rule_field, "duplicate severity for this monitor"));
            }
            if rule.percentage > 100 {
                errors.push(ValidationError::new(
                    format!("{rule_field}.percentage"),
                    "percentage must be 0..=100",
                ));
            }
        }
        validate_severity_ordering(&monitor.alert_rules, &field, errors);
    }
}

fn validate_severity_ordering(
    rules: &[flightctl_types::device::AlertRule],
    field: &str,
    errors: &mut Vec<ValidationError>,
) {
    use flightctl_types::device::AlertSeverity;
    let pct = |sev: AlertSeverity| rules.iter().find(|r| r.severity == sev).map(|r| r.percentage);
    let (info, warning, critical) = (
        pct(AlertSeverity::Info),
        pct(AlertSeverity::Warning),
        pct(AlertSeverity::Critical),
    );
    if let (Some(i), Some(w)) = (info, warning) {
        if i >= w {
            errors.push(ValidationError::new(
                format!("{field}.alertRules"),
                "info percentage must be less than warning percentage",
            ));
        }
    }
    if let (Some(w), Some(c)) = (warning, critical) {
        if w >= c {
            errors.push(ValidationError::new(
                format!("{field}.alertRules"),
                "warning percentage must be less than critical percentage",
            ));
        }
    }
}

fn validate_applications(apps: &[ApplicationSpec], errors: &mut Vec<ValidationError>) {
    let mut seen_names = HashSet::new();
    for (i, app) in apps.iter().enumerate() {
        let field = format!("spec.applications[{i}]");
        if !seen_names.insert(app.name.clone()) {
            errors.push(ValidationError::new(&field, format!("duplicate application name '{}'", app.name)));
        }

        let mut seen_volumes = HashSet::new();
        for volume in &app.volumes {
            if !seen_volumes.insert(volume.name.clone()) {
                errors.push(ValidationError::new(
                    format!("{field}.volumes"),
                    format!("duplicate volume name '{}'", volume.name),
                ));
            }
            if !is_valid_mount_spec(&volume.mount) {
                errors.push(ValidationError::new(
                    format!("{field}.volumes"),
                    format!("volume mount '{}' must be of the form <host>:<container>", volume.mount),
                ));
            } else if let Some(host_path) = volume.mount.split(':').next() {
                if is_forbidden_mount_path(host_path) {
                    errors.push(ValidationError::new(
                        format!("{field}.volumes"),
                        format!("host path '{host_path}' is reserved for the agent"),
                    ));
                }
            }
        }

        if app.app_type != AppType::Container {
            if !app.ports.is_empty() {
                errors.push(ValidationError::new(
                    format!("{field}.ports"),
                    "ports are only valid for appType Container",
                ));
            }
            if app.resources.is_some() {
                errors.push(ValidationError::new(
                    format!("{field}.resources"),
                    "resources are only valid for appType Container",
                ));
            }
        }

        match app.app_type {
            AppType::Compose => {
                if app.compose_file_path.as_deref().is_none_or(str::is_empty) {
                    errors.push(ValidationError::new(format!("{field}.composeFilePath"), "required for appType Compose"));
                }
            }
            AppType::Quadlet => match &app.quadlet_file_path {
                None => errors.push(ValidationError::new(format!("{field}.quadletFilePath"), "required for appType Quadlet")),
                Some(path) => {
                    if path.ends_with(".build") {
                        errors.push(ValidationError::new(
                            format!("{field}.quadletFilePath"),
                            "quadlet '.build' unit type is not supported",
                        ));
                    }
                }
            },
            AppType::Container => {
                if let Some(image) = &app.image {
                    if !image.is_digest_pinned() && !image.0.contains("/.image") && !is_fully_qualified_ref(&image.0) {
                        errors.push(ValidationError::new(
                            format!("{field}.image"),
                            "OCI reference must be fully qualified unless behind a .image reference",
                        ));
                    }
                } else {
                    errors.push(ValidationError::new(format!("{field}.image"), "required for appType Container"));
                }
            }
        }
    }
}

fn is_valid_mount_spec(mount: &str) -> bool {
    let mut parts = mount.splitn(2, ':');
    let host = parts.next().unwrap_or("");
    let container = parts.next();
    !host.is_empty() && host.starts_with('/') && container.is_some_and(|c| !c.is_empty() && c.starts_with('/'))
}

/// A "fully qualified" OCI reference names an explicit registry host (has a
/// `.` or `:` before the first `/`), matching the usual Docker/OCI
/// convention for distinguishing `registry.example.com/ns/img` from a
/// bare `library/img` that would resolve against an implicit default.
fn is_fully_qualified_ref(reference: &str) -> bool {
    match reference.split('/').next() {
        Some(first) => first.contains('.') || first.contains(':'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightctl_types::device::{AlertRule, AlertSeverity, OciReference, VolumeMount};

    fn monitor(kind: MonitorType, path: Option<&str>) -> ResourceMonitor {
        ResourceMonitor {
            monitor_type: kind,
            path: path.map(str::to_string),
            sampling_interval_seconds: 10,
            alert_duration_seconds: 60,
            alert_rules: vec![
                AlertRule { severity: AlertSeverity::Info, percentage: 50 },
                AlertRule { severity: AlertSeverity::Warning, percentage: 75 },
                AlertRule { severity: AlertSeverity::Critical, percentage: 90 },
            ],
        }
    }

    #[test]
    fn cpu_monitor_with_path_is_rejected() {
        let errors = {
            let mut e = Vec::new();
            validate_resource_monitors(&[monitor(MonitorType::Cpu, Some("/proc"))], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.field.ends_with(".path")));
    }

    #[test]
    fn disk_monitor_with_path_is_accepted() {
        let errors = {
            let mut e = Vec::new();
            validate_resource_monitors(&[monitor(MonitorType::Disk, Some("/data"))], &mut e);
            e
        };
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn duplicate_monitor_type_is_rejected() {
        let errors = {
            let mut e = Vec::new();
            validate_resource_monitors(&[monitor(MonitorType::Cpu, None), monitor(MonitorType::Cpu, None)], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.message.contains("duplicate monitorType")));
    }

    #[test]
    fn non_monotonic_severity_percentages_are_rejected() {
        let mut m = monitor(MonitorType::Disk, None);
        m.alert_rules[1].percentage = 10; // warning below info
        let errors = {
            let mut e = Vec::new();
            validate_resource_monitors(&[m], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.message.contains("warning percentage")));
    }

    #[test]
    fn volume_mount_must_be_host_colon_container() {
        assert!(is_valid_mount_spec("/host/data:/container/data"));
        assert!(!is_valid_mount_spec("relative:/container"));
        assert!(!is_valid_mount_spec("/host/data"));
    }

    #[test]
    fn forbidden_host_mount_is_rejected() {
        let app = ApplicationSpec {
            name: "app1".to_string(),
            app_type: AppType::Container,
            image: Some(OciReference("quay.io/example/img@sha256:deadbeef".to_string())),
            compose_file_path: None,
            quadlet_file_path: None,
            volumes: vec![VolumeMount {
                mount: "/var/lib/flightctl:/data".to_string(),
                name: "state".to_string(),
            }],
            ports: Vec::new(),
            resources: None,
        };
        let errors = {
            let mut e = Vec::new();
            validate_applications(&[app], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.message.contains("reserved for the agent")));
    }

    #[test]
    fn non_container_app_rejects_ports() {
        let app = ApplicationSpec {
            name: "app1".to_string(),
            app_type: AppType::Compose,
            image: None,
            compose_file_path: Some("compose.yaml".to_string()),
            quadlet_file_path: None,
            volumes: Vec::new(),
            ports: vec![flightctl_types::device::ApplicationPort { host_port: 80, container_port: 80 }],
            resources: None,
        };
        let errors = {
            let mut e = Vec::new();
            validate_applications(&[app], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.field.ends_with(".ports")));
    }

    #[test]
    fn quadlet_build_unit_is_rejected() {
        let app = ApplicationSpec {
            name: "app1".to_string(),
            app_type: AppType::Quadlet,
            image: None,
            compose_file_path: None,
            quadlet_file_path: Some("unit.build".to_string()),
            volumes: Vec::new(),
            ports: Vec::new(),
            resources: None,
        };
        let errors = {
            let mut e = Vec::new();
            validate_applications(&[app], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.message.contains(".build")));
    }

    #[test]
    fn non_qualified_image_reference_without_image_suffix_is_rejected() {
        let app = ApplicationSpec {
            name: "app1".to_string(),
            app_type: AppType::Container,
            image: Some(OciReference("library/img:latest".to_string())),
            compose_file_path: None,
            quadlet_file_path: None,
            volumes: Vec::new(),
            ports: Vec::new(),
            resources: None,
        };
        let errors = {
            let mut e = Vec::new();
            validate_applications(&[app], &mut e);
            e
        };
        assert!(errors.iter().any(|e| e.field.ends_with(".image")));
    }
}
