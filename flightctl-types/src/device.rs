use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::ObjectMeta;

/// OCI image reference used for the device's os image and container
/// applications. Validation of "fully qualified unless behind `.image`
/// reference" happens in `flightctl-validate`; this type only carries the
/// raw string plus the parsed-out digest/tag split so callers don't
/// reimplement the split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OciReference(pub String);

impl OciReference {
    pub fn is_digest_pinned(&self) -> bool {
        self.0.contains('@')
    }
}

/// Discriminated auth-provider/repository secret. The discriminator
/// (`kind`) must survive a hide/restore round trip (§4.7, §9) even though
/// the secret payload fields get replaced with `*****`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AuthProviderSpec {
    Basic {
        username: String,
        password: Option<String>,
    },
    OAuthClientCredentials {
        client_id: String,
        client_secret: Option<String>,
    },
    Ssh {
        username: String,
        ssh_private_key: Option<String>,
    },
    Tls {
        tls_key: Option<String>,
    },
    PrivateKey {
        private_key_passphrase: Option<String>,
    },
}

impl AuthProviderSpec {
    /// Replace every secret field with the literal `*****`, preserving the
    /// discriminator (§4.7).
    pub fn hide_sensitive_data(&mut self) {
        const HIDDEN: &str = "*****";
        match self {
            AuthProviderSpec::Basic { password, .. } => {
                if password.is_some() {
                    *password = Some(HIDDEN.to_string());
                }
            }
            AuthProviderSpec::OAuthClientCredentials { client_secret, .. } => {
                if client_secret.is_some() {
                    *client_secret = Some(HIDDEN.to_string());
                }
            }
            AuthProviderSpec::Ssh { ssh_private_key, .. } => {
                if ssh_private_key.is_some() {
                    *ssh_private_key = Some(HIDDEN.to_string());
                }
            }
            AuthProviderSpec::Tls { tls_key } => {
                if tls_key.is_some() {
                    *tls_key = Some(HIDDEN.to_string());
                }
            }
            AuthProviderSpec::PrivateKey {
                private_key_passphrase,
            } => {
                if private_key_passphrase.is_some() {
                    *private_key_passphrase = Some(HIDDEN.to_string());
                }
            }
        }
    }

    pub fn discriminator(&self) -> &'static str {
        match self {
            AuthProviderSpec::Basic { .. } => "Basic",
            AuthProviderSpec::OAuthClientCredentials { .. } => "OAuthClientCredentials",
            AuthProviderSpec::Ssh { .. } => "Ssh",
            AuthProviderSpec::Tls { .. } => "Tls",
            AuthProviderSpec::PrivateKey { .. } => "PrivateKey",
        }
    }
}

/// OCI registry auth, carrying the same hide-on-read obligation for its
/// `password` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl OciAuth {
    pub fn hide_sensitive_data(&mut self) {
        if self.password.is_some() {
            self.password = Some("*****".to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfigProviderSpec {
    Inline {
        files: Vec<InlineFile>,
    },
    GitRepository {
        repository: String,
        path: String,
        target_revision: String,
    },
    HttpRepository {
        repository: String,
        file_path: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineFile {
    pub path: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppType {
    Container,
    Compose,
    Quadlet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    /// `<host>:<container>` form, validated in `flightctl-validate`.
    pub mount: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationPort {
    pub host_port: u16,
    pub container_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResources {
    pub cpu_millis: Option<u32>,
    pub memory_mb: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    pub app_type: AppType,
    pub image: Option<OciReference>,
    pub compose_file_path: Option<String>,
    pub quadlet_file_path: Option<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default)]
    pub ports: Vec<ApplicationPort>,
    pub resources: Option<ApplicationResources>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorType {
    Cpu,
    Memory,
    Disk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub severity: AlertSeverity,
    pub percentage: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMonitor {
    pub monitor_type: MonitorType,
    /// Forbidden for `Cpu`/`Memory` monitors (§4.8).
    pub path: Option<String>,
    pub sampling_interval_seconds: u64,
    pub alert_duration_seconds: u64,
    pub alert_rules: Vec<AlertRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdMatch {
    pub pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

/// A device's desired state, and also the shape of a `Fleet`'s template
/// (§3). Placeholders like `{{ .metadata.labels.key }}` only ever appear in
/// string-typed fields when this struct is used as a template; once
/// rendered, every placeholder has been substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub os_image: OciReference,
    #[serde(default)]
    pub config_providers: Vec<ConfigProviderSpec>,
    #[serde(default)]
    pub applications: Vec<ApplicationSpec>,
    #[serde(default)]
    pub resource_monitors: Vec<ResourceMonitor>,
    #[serde(default)]
    pub systemd_matches: Vec<SystemdMatch>,
    #[serde(default)]
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceUpdatingReason {
    Preparing,
    ReadyToUpdate,
    ApplyingUpdate,
    Rebooting,
    Updated,
    Error,
    RollingBack,
    Retrying,
    Canceled,
}

impl DeviceUpdatingReason {
    /// Terminal for batch evaluation purposes (§4.4).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeviceUpdatingReason::Updated
                | DeviceUpdatingReason::Error
                | DeviceUpdatingReason::Canceled
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, DeviceUpdatingReason::Error | DeviceUpdatingReason::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCondition {
    pub kind: String,
    pub status: bool,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfigStatus {
    /// Reported by the agent. Service-side `annotations.renderedVersion` is
    /// the source of truth for ordering (§3).
    pub rendered_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: DeviceConfigStatus,
    #[serde(default)]
    pub conditions: Vec<DeviceCondition>,
    #[serde(default)]
    pub applications: Vec<ApplicationStatus>,
    pub updating_reason: Option<DeviceUpdatingReason>,
    pub management_cert_serial: Option<String>,
    pub management_cert_not_after: Option<DateTime<Utc>>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            last_seen: None,
            config: DeviceConfigStatus::default(),
            conditions: Vec::new(),
            applications: Vec::new(),
            updating_reason: None,
            management_cert_serial: None,
            management_cert_not_after: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub metadata: ObjectMeta,
    pub spec: DeviceSpec,
    #[serde(default)]
    pub status: DeviceStatus,
}

/// Default disconnect timeout named in §3.
pub const DEFAULT_DISCONNECT_TIMEOUT_SECS: i64 = 5 * 60;

impl crate::metadata::WithMeta for Device {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Device {
    pub fn is_managed(&self) -> bool {
        self.metadata.owner.is_some()
    }

    pub fn is_disconnected(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        match self.status.last_seen {
            None => true,
            Some(seen) => (now - seen).num_seconds() > timeout_secs,
        }
    }

    pub fn annotation(&self, key: crate::metadata::AnnotationKey) -> Option<&str> {
        self.metadata.get_annotation(key)
    }

    /// "Up to date relative to fleet" per §3's invariant.
    pub fn is_up_to_date(&self, fleet_template_version: u64) -> bool {
        let rendered_template_version = self
            .annotation(crate::metadata::AnnotationKey::RenderedTemplateVersion)
            .and_then(|v| v.parse::<u64>().ok());
        let rendered_version = self
            .annotation(crate::metadata::AnnotationKey::RenderedVersion)
            .and_then(|v| v.parse::<u64>().ok());
        rendered_template_version == Some(fleet_template_version)
            && self.status.config.rendered_version == rendered_version
    }
}

/// Service-side rule for computing the next `renderedVersion`: the greater
/// of what the service already has and what the device most recently
/// reported, plus one (§4.1). Never let a retry overwrite a higher version
/// that raced ahead of it.
pub fn next_rendered_version(service_version: u64, device_reported_version: Option<u64>) -> u64 {
    service_version.max(device_reported_version.unwrap_or(0)) + 1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFailure {
    pub attempts: u32,
    pub last_error: Option<String>,
}

pub type DeviceLabels = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_rendered_version_takes_the_greater_plus_one() {
        assert_eq!(next_rendered_version(5, Some(3)), 6);
        assert_eq!(next_rendered_version(3, Some(5)), 6);
        assert_eq!(next_rendered_version(0, None), 1);
    }

    #[test]
    fn hide_sensitive_data_preserves_discriminator() {
        let mut spec = AuthProviderSpec::Basic {
            username: "svc".into(),
            password: Some("hunter2".into()),
        };
        let before = spec.discriminator();
        spec.hide_sensitive_data();
        assert_eq!(spec.discriminator(), before);
        match &spec {
            AuthProviderSpec::Basic { password, .. } => {
                assert_eq!(password.as_deref(), Some("*****"));
            }
            _ => panic!("discriminator changed"),
        }
    }

    #[test]
    fn hide_sensitive_data_leaves_absent_secrets_absent() {
        let mut spec = AuthProviderSpec::Tls { tls_key: None };
        spec.hide_sensitive_data();
        match spec {
            AuthProviderSpec::Tls { tls_key } => assert!(tls_key.is_none()),
            _ => panic!("wrong variant"),
        }
    }
}
