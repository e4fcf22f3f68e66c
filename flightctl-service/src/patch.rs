//! RFC 6902 JSON Patch, restricted to `/metadata/labels/*` and
//! `/metadata/annotations/*` (§4.5, §4.8, §6): the grammar this module
//! accepts is deliberately small, the same "restrict the grammar instead
//! of validating a general one" idiom `flightctl-render::template` uses
//! for placeholder expressions.

use std::collections::BTreeMap;

use flightctl_types::metadata::{AnnotationKey, ObjectMeta};
use flightctl_validate::immutability::json_patch_path_allowed;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "remove")]
    Remove,
    #[serde(rename = "replace")]
    Replace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatchError {
    #[error("path '{0}' may not be patched")]
    PathNotAllowed(String),
    #[error("path '{0}' does not address a labels or annotations entry")]
    UnsupportedPath(String),
    #[error("annotation key '{0}' is reserved for controller use")]
    ReservedAnnotation(String),
    #[error("op '{op}' on path '{path}' requires a string value")]
    ValueNotString { op: &'static str, path: String },
}

const RESERVED_ANNOTATION_KEYS: &[AnnotationKey] = &[
    AnnotationKey::TemplateVersion,
    AnnotationKey::DeployingTemplateVersion,
    AnnotationKey::BatchNumber,
    AnnotationKey::RolloutApproved,
    AnnotationKey::RolloutApprovalMethod,
    AnnotationKey::LastBatchCompletionReport,
    AnnotationKey::DeviceSelectionConfigDigest,
    AnnotationKey::RenderedVersion,
    AnnotationKey::RenderedTemplateVersion,
    AnnotationKey::RenderedSpecHash,
    AnnotationKey::SelectedForRollout,
    AnnotationKey::LastRolloutError,
    AnnotationKey::AwaitingReconnect,
    AnnotationKey::ConflictPaused,
    AnnotationKey::Console,
];

fn is_reserved_annotation(key: &str) -> bool {
    RESERVED_ANNOTATION_KEYS.iter().any(|k| k.as_str() == key)
}

/// Apply a batch of operations to `metadata.labels`/`metadata.annotations`
/// atomically: either every operation validates and applies, or none of
/// them do and `metadata` is left untouched.
pub fn apply_metadata_patch(metadata: &mut ObjectMeta, ops: &[PatchOperation]) -> Result<(), PatchError> {
    // Validate everything first so a partially-applied patch never escapes.
    for op in ops {
        validate_op(op)?;
    }

    let mut labels = metadata.labels.clone();
    let mut annotations = metadata.annotations.clone();
    for op in ops {
        apply_one(op, &mut labels, &mut annotations)?;
    }
    metadata.labels = labels;
    metadata.annotations = annotations;
    Ok(())
}

fn validate_op(op: &PatchOperation) -> Result<(), PatchError> {
    if !json_patch_path_allowed(&op.path) {
        return Err(PatchError::PathNotAllowed(op.path.clone()));
    }
    let key = map_and_key(&op.path)?;
    if key.0 == MapKind::Annotations && is_reserved_annotation(key.1) {
        return Err(PatchError::ReservedAnnotation(key.1.to_string()));
    }
    if !matches!(op.op, PatchOp::Remove) {
        match &op.value {
            Some(Value::String(_)) => {}
            _ => {
                return Err(PatchError::ValueNotString {
                    op: op_name(&op.op),
                    path: op.path.clone(),
                })
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapKind {
    Labels,
    Annotations,
}

fn map_and_key(path: &str) -> Result<(MapKind, &str), PatchError> {
    if let Some(key) = path.strip_prefix("/metadata/labels/") {
        return Ok((MapKind::Labels, key));
    }
    if let Some(key) = path.strip_prefix("/metadata/annotations/") {
        return Ok((MapKind::Annotations, key));
    }
    Err(PatchError::UnsupportedPath(path.to_string()))
}

fn apply_one(
    op: &PatchOperation,
    labels: &mut BTreeMap<String, String>,
    annotations: &mut BTreeMap<String, String>,
) -> Result<(), PatchError> {
    let (kind, key) = map_and_key(&op.path)?;
    let map = match kind {
        MapKind::Labels => &mut *labels,
        MapKind::Annotations => &mut *annotations,
    };
    match op.op {
        PatchOp::Remove => {
            map.remove(key);
        }
        PatchOp::Add | PatchOp::Replace => {
            let Some(Value::String(value)) = &op.value else {
                return Err(PatchError::ValueNotString { op: op_name(&op.op), path: op.path.clone() });
            };
            map.insert(key.to_string(), value.clone());
        }
    }
    Ok(())
}

fn op_name(op: &PatchOp) -> &'static str {
    match op {
        PatchOp::Add => "add",
        PatchOp::Remove => "remove",
        PatchOp::Replace => "replace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_add_applies() {
        let mut meta = ObjectMeta::new("org1", "dev-1");
        let ops = vec![PatchOperation {
            op: PatchOp::Add,
            path: "/metadata/labels/site".into(),
            value: Some(Value::String("madrid".into())),
        }];
        apply_metadata_patch(&mut meta, &ops).unwrap();
        assert_eq!(meta.labels.get("site"), Some(&"madrid".to_string()));
    }

    #[test]
    fn spec_patch_is_rejected() {
        let mut meta = ObjectMeta::new("org1", "dev-1");
        let ops = vec![PatchOperation {
            op: PatchOp::Replace,
            path: "/spec/osImage".into(),
            value: Some(Value::String("quay.io/x".into())),
        }];
        let err = apply_metadata_patch(&mut meta, &ops).unwrap_err();
        assert!(matches!(err, PatchError::PathNotAllowed(_)));
    }

    #[test]
    fn reserved_annotation_is_rejected() {
        let mut meta = ObjectMeta::new("org1", "dev-1");
        let ops = vec![PatchOperation {
            op: PatchOp::Replace,
            path: "/metadata/annotations/renderedVersion".into(),
            value: Some(Value::String("99".into())),
        }];
        let err = apply_metadata_patch(&mut meta, &ops).unwrap_err();
        assert!(matches!(err, PatchError::ReservedAnnotation(_)));
    }

    #[test]
    fn name_patch_is_rejected() {
        let mut meta = ObjectMeta::new("org1", "dev-1");
        let ops = vec![PatchOperation {
            op: PatchOp::Replace,
            path: "/metadata/name".into(),
            value: Some(Value::String("dev-2".into())),
        }];
        let err = apply_metadata_patch(&mut meta, &ops).unwrap_err();
        assert!(matches!(err, PatchError::PathNotAllowed(_)));
    }

    #[test]
    fn partial_failure_leaves_metadata_untouched() {
        let mut meta = ObjectMeta::new("org1", "dev-1");
        meta.labels.insert("site".into(), "madrid".into());
        let ops = vec![
            PatchOperation {
                op: PatchOp::Add,
                path: "/metadata/labels/function".into(),
                value: Some(Value::String("web".into())),
            },
            PatchOperation {
                op: PatchOp::Replace,
                path: "/metadata/name".into(),
                value: Some(Value::String("dev-2".into())),
            },
        ];
        assert!(apply_metadata_patch(&mut meta, &ops).is_err());
        assert_eq!(meta.labels.len(), 1);
        assert!(!meta.labels.contains_key("function"));
    }
}
