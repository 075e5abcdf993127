use serde::{Deserialize, Serialize};

use super::request::ScanOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Cron,
    Interval,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Interval => "interval",
        }
    }
}

/// A stored, unattended scan definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: String,
    pub trigger_kind: TriggerKind,
    /// Trigger fields, e.g. `{"hour": "3"}` or `{"hours": 12}`.
    pub trigger_spec: serde_json::Value,
    pub target: String,
    #[serde(default)]
    pub config: ScanOptions,
    pub label: String,
}
