use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::SyncError;

/// Server-assigned identifier shared by every entity kind.
///
/// Ids are always JSON integers on the wire. A string id is a data error, it is
/// never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Enum to represent the status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Pending,
    Intruder,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Pending => "pending",
            DeviceStatus::Intruder => "intruder",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Struct to hold information about a device attached to the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    #[serde(default)]
    pub name: Option<String>,
    pub mac_address: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub status: DeviceStatus,
    #[serde(default)]
    pub user_email: Option<String>,
}

impl Device {
    /// Graph label: the device name, else its MAC, else "Unknown".
    pub fn label(&self) -> &str {
        non_empty(self.name.as_deref())
            .or_else(|| non_empty(Some(self.mac_address.as_str())))
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: EntityId,
    pub user_email: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_mac: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
}

impl JoinRequest {
    pub fn device_label(&self) -> &str {
        non_empty(self.device_name.as_deref()).unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntruderAlert {
    pub id: EntityId,
    /// Nullable on the server side.
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl IntruderAlert {
    pub fn ip_label(&self) -> &str {
        non_empty(self.ip_address.as_deref()).unwrap_or("Unknown")
    }

    pub fn mac_label(&self) -> &str {
        non_empty(self.mac_address.as_deref()).unwrap_or("Unknown")
    }

    pub fn note_label(&self) -> &str {
        non_empty(self.note.as_deref()).unwrap_or("N/A")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub member_count: u64,
}

/// One response of the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub devices: Vec<Device>,
    pub pending_requests: Vec<JoinRequest>,
    #[serde(default)]
    pub intruders: Option<Vec<IntruderAlert>>,
    #[serde(default)]
    pub network: NetworkSummary,
    #[serde(default)]
    pub flash_message: Option<String>,
}

impl Snapshot {
    /// Parses a status body and rejects snapshots that list an id twice
    /// within one entity kind.
    pub fn from_slice(body: &[u8]) -> Result<Self, SyncError> {
        let snapshot: Snapshot = serde_json::from_slice(body)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        ensure_unique("device", self.devices.iter().map(|d| d.id))?;
        ensure_unique("join request", self.pending_requests.iter().map(|r| r.id))?;
        ensure_unique("intruder", self.intruders().iter().map(|i| i.id))?;
        Ok(())
    }

    pub fn intruders(&self) -> &[IntruderAlert] {
        self.intruders.as_deref().unwrap_or(&[])
    }
}

fn ensure_unique(
    kind: &'static str,
    ids: impl Iterator<Item = EntityId>,
) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SyncError::Malformed(format!("duplicate {kind} id {id}")));
        }
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
