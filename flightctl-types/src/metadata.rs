use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing opaque version stamped by the store on every
/// write. Never regress a device's `renderedVersion` by comparing these
/// with `<`/`>` instead of swapping in whatever the caller supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(pub u64);

impl ResourceVersion {
    pub const INITIAL: ResourceVersion = ResourceVersion(1);

    pub fn next(self) -> ResourceVersion {
        ResourceVersion(self.0 + 1)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(orgId, name)` is the identity of every resource in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub org_id: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(org_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org_id, self.name)
    }
}

/// The closed set of controller-owned annotation keys named in the data
/// model. Nothing else may be written under these keys by a client, and the
/// controller must never invent a new key at runtime (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKey {
    // Fleet-owned
    TemplateVersion,
    DeployingTemplateVersion,
    BatchNumber,
    RolloutApproved,
    RolloutApprovalMethod,
    LastBatchCompletionReport,
    DeviceSelectionConfigDigest,
    // Device-owned
    RenderedVersion,
    RenderedTemplateVersion,
    RenderedSpecHash,
    SelectedForRollout,
    LastRolloutError,
    AwaitingReconnect,
    ConflictPaused,
    Console,
}

impl AnnotationKey {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKey::TemplateVersion => "templateVersion",
            AnnotationKey::DeployingTemplateVersion => "deployingTemplateVersion",
            AnnotationKey::BatchNumber => "batchNumber",
            AnnotationKey::RolloutApproved => "rolloutApproved",
            AnnotationKey::RolloutApprovalMethod => "rolloutApprovalMethod",
            AnnotationKey::LastBatchCompletionReport => "lastBatchCompletionReport",
            AnnotationKey::DeviceSelectionConfigDigest => "deviceSelectionConfigDigest",
            AnnotationKey::RenderedVersion => "renderedVersion",
            AnnotationKey::RenderedTemplateVersion => "renderedTemplateVersion",
            AnnotationKey::RenderedSpecHash => "renderedSpecHash",
            AnnotationKey::SelectedForRollout => "selectedForRollout",
            AnnotationKey::LastRolloutError => "lastRolloutError",
            AnnotationKey::AwaitingReconnect => "awaitingReconnect",
            AnnotationKey::ConflictPaused => "conflictPaused",
            AnnotationKey::Console => "console",
        }
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata common to every resource. `labels` participate in selector
/// matching; `annotations` are the controller-bookkeeping map keyed by
/// [`AnnotationKey`] (stringified) plus whatever free-form keys a client
/// chose to set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub org_id: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub owner: Option<String>,
    pub resource_version: Option<ResourceVersion>,
}

impl ObjectMeta {
    pub fn new(org_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org_id: org_id.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner: None,
            resource_version: None,
        }
    }

    pub fn get_annotation(&self, key: AnnotationKey) -> Option<&str> {
        self.annotations.get(key.as_str()).map(String::as_str)
    }

    pub fn set_annotation(&mut self, key: AnnotationKey, value: impl Into<String>) {
        self.annotations.insert(key.as_str().to_string(), value.into());
    }

    pub fn clear_annotation(&mut self, key: AnnotationKey) {
        self.annotations.remove(key.as_str());
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.org_id.clone(), self.name.clone())
    }
}

/// Uniform accessor so generic store code can read/stamp metadata without
/// knowing which resource kind it's holding.
pub trait WithMeta {
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

/// DNS-1123 label/name validity check shared by the metadata and validation
/// layers: lowercase alphanumerics and `-`, must start/end alphanumeric, at
/// most 63 characters per the usual Kubernetes-style convention this data
/// model borrows.
pub fn is_dns1123_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| is_alnum(b) || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns1123_accepts_simple_names() {
        assert!(is_dns1123_label("madrid-fleet-1"));
        assert!(!is_dns1123_label("Madrid"));
        assert!(!is_dns1123_label("-leading-dash"));
        assert!(!is_dns1123_label("trailing-dash-"));
        assert!(!is_dns1123_label(""));
    }

    #[test]
    fn resource_version_never_compares_equal_after_next() {
        let v = ResourceVersion::INITIAL;
        assert!(v.next() > v);
    }
}
