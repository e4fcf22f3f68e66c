use serde::{Deserialize, Serialize};

/// The `Status` wire shape every REST error/success envelope uses (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub status: StatusOutcome,
    pub code: u16,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusOutcome {
    Success,
    Failure,
}

impl Status {
    pub fn success(code: u16, message: impl Into<String>) -> Self {
        Self {
            api_version: "v1beta1",
            kind: "Status",
            status: StatusOutcome::Success,
            code,
            reason: String::new(),
            message: message.into(),
        }
    }

    pub fn failure(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            api_version: "v1beta1",
            kind: "Status",
            status: StatusOutcome::Failure,
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }
}
