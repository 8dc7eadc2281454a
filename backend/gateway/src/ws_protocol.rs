//! WebSocket frames for the session channel.
//!
//! Inbound control frames are JSON `{action, data}`. Outbound push frames are plain
//! text `status,data`.

use cipherbus_core::JobResult;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Client -> Server control frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlFrame {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// What a control frame asks for. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    BindSession(String),
}

impl ControlFrame {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn command(&self) -> Option<ControlCommand> {
        match self.action.as_str() {
            // `setUserId` is what older clients send.
            "setSessionId" | "setUserId" => match &self.data {
                Value::String(id) if !id.trim().is_empty() => {
                    Some(ControlCommand::BindSession(id.clone()))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Success,
    Error,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Server -> Client notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    pub status: PushStatus,
    pub data: String,
}

impl PushFrame {
    pub fn success(data: impl Into<String>) -> Self {
        Self {
            status: PushStatus::Success,
            data: data.into(),
        }
    }

    pub fn error(data: impl Into<String>) -> Self {
        Self {
            status: PushStatus::Error,
            data: data.into(),
        }
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PushFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.status.as_str(), self.data)
    }
}

impl From<&JobResult> for PushFrame {
    fn from(result: &JobResult) -> Self {
        match result {
            JobResult::Success(data) => Self::success(data.clone()),
            JobResult::Error(data) => Self::error(data.clone()),
        }
    }
}
