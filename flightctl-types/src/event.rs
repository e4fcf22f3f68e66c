use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// The enumerated reason set named in §3/§7. `EventType` is derived from
/// the reason, never set independently, so a caller can't accidentally
/// file a Warning-shaped failure as Normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReason {
    ResourceUpdateFailed,
    FleetRolloutFailed,
    FleetRolloutBatchCompleted,
    FleetRolloutCompleted,
    DeviceSelectedForRollout,
    DeviceUpdated,
    CsrApproved,
    CsrDenied,
    CsrSigningFailed,
    ManagementCertRenewed,
    DeviceConflictPaused,
}

impl EventReason {
    pub fn event_type(self) -> EventType {
        match self {
            EventReason::ResourceUpdateFailed
            | EventReason::FleetRolloutFailed
            | EventReason::CsrDenied
            | EventReason::CsrSigningFailed
            | EventReason::DeviceConflictPaused => EventType::Warning,
            _ => EventType::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventReason::ResourceUpdateFailed => "ResourceUpdateFailed",
            EventReason::FleetRolloutFailed => "FleetRolloutFailed",
            EventReason::FleetRolloutBatchCompleted => "FleetRolloutBatchCompleted",
            EventReason::FleetRolloutCompleted => "FleetRolloutCompleted",
            EventReason::DeviceSelectedForRollout => "DeviceSelectedForRollout",
            EventReason::DeviceUpdated => "DeviceUpdated",
            EventReason::CsrApproved => "CsrApproved",
            EventReason::CsrDenied => "CsrDenied",
            EventReason::CsrSigningFailed => "CsrSigningFailed",
            EventReason::ManagementCertRenewed => "ManagementCertRenewed",
            EventReason::DeviceConflictPaused => "DeviceConflictPaused",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvolvedObject {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub involved_object: InvolvedObject,
    pub reason: EventReason,
    pub actor: String,
    pub source_component: String,
    pub request_id: Option<String>,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.reason.event_type()
    }
}
