//! Fleet domain records shared across fleetdeck crates.
//!
//! These mirror the platform's API payloads. fleetdeck does not interpret
//! them beyond display and counting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Degraded,
    #[default]
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    /// Short indicator used in tables.
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Online => "●",
            Self::Offline => "○",
            Self::Degraded => "◐",
            Self::Unknown => "?",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A managed device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A physical or logical grouping of devices (site, floor, room).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub device_count: u32,
}

/// An operational incident raised against the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Open means anything not resolved or closed.
    pub fn is_open(&self) -> bool {
        !matches!(self.state.as_str(), "resolved" | "closed")
    }
}

/// A support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub assignee: Option<String>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        !matches!(self.status.as_str(), "solved" | "closed")
    }
}

/// Remote operations that can be invoked on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Reboot,
    Locate,
}

impl OperationKind {
    /// Destructive operations need typed confirmation before they run.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Reboot)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Locate => "locate",
        }
    }
}

/// Acknowledgement returned by the platform for a remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationReceipt {
    pub operation_id: String,
    pub device_id: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_unknown_values() {
        let device: Device =
            serde_json::from_str(r#"{"id":"d1","name":"Lobby","status":"rebooting"}"#).unwrap();
        assert_eq!(device.status, DeviceStatus::Unknown);
        assert_eq!(device.space_id, None);
    }

    #[test]
    fn test_open_predicates() {
        let incident = Incident {
            id: "i1".into(),
            title: "Link down".into(),
            severity: "high".into(),
            state: "resolved".into(),
            device_id: None,
            opened_at: None,
        };
        assert!(!incident.is_open());

        let ticket = Ticket {
            id: "t1".into(),
            subject: "Replace sensor".into(),
            status: "open".into(),
            priority: "normal".into(),
            assignee: None,
        };
        assert!(ticket.is_open());
    }

    #[test]
    fn test_operation_kind() {
        assert!(OperationKind::Reboot.is_destructive());
        assert!(!OperationKind::Locate.is_destructive());
        assert_eq!(serde_json::to_string(&OperationKind::Locate).unwrap(), "\"locate\"");
    }
}
