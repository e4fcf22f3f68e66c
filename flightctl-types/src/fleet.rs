use serde::{Deserialize, Serialize};

use crate::device::DeviceSpec;
use crate::metadata::ObjectMeta;
use crate::rollout::{RolloutPolicy, RolloutStatus};
use crate::selector::LabelSelector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetTemplateSpec {
    pub spec: DeviceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSpec {
    pub selector: LabelSelector,
    pub template: FleetTemplateSpec,
    pub rollout_policy: Option<RolloutPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetStatus {
    pub observed_devices: usize,
    #[serde(default)]
    pub rollout_status: RolloutStatus,
    /// Reason detail for `Waiting`/`Suspended`, surfaced to operators.
    pub rollout_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fleet {
    pub metadata: ObjectMeta,
    pub spec: FleetSpec,
    #[serde(default)]
    pub status: FleetStatus,
}

impl crate::metadata::WithMeta for Fleet {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Fleet {
    pub fn rollout_policy(&self) -> Option<&RolloutPolicy> {
        self.spec.rollout_policy.as_ref()
    }

    pub fn annotation(&self, key: crate::metadata::AnnotationKey) -> Option<&str> {
        self.metadata.get_annotation(key)
    }

    pub fn annotation_u64(&self, key: crate::metadata::AnnotationKey) -> Option<u64> {
        self.annotation(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn annotation_u32(&self, key: crate::metadata::AnnotationKey) -> Option<u32> {
        self.annotation(key).and_then(|v| v.parse::<u32>().ok())
    }

    pub fn annotation_bool(&self, key: crate::metadata::AnnotationKey) -> bool {
        self.annotation(key) == Some("true")
    }
}
