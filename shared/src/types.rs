use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry-assigned identifier of a monitored service.
pub type ServiceId = i64;

/// Health value produced by the poller backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    #[serde(rename = "OK", alias = "UP")]
    Ok,
    #[serde(rename = "FAIL", alias = "DOWN")]
    Fail,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::Fail => "FAIL",
            ServiceStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A monitored service as stored by the registry.
/// This is the canonical data model shared by the sync engine, the registry
/// client and the dashboard API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    /// Assigned by the registry, never changes
    pub id: ServiceId,

    /// Display name
    pub name: String,

    /// Polled endpoint, e.g. "http://auth.local:8080/health"
    pub url: String,

    /// Creation time, epoch milliseconds on the wire
    #[serde(rename = "createdDate", alias = "createdAt", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Last status reported for this service
    #[serde(default)]
    pub current_status: ServiceStatus,
}

/// Partial update pushed by the poller for a single service.
///
/// The backend publishes the whole service object; everything except the
/// fields below is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub id: ServiceId,
    pub current_status: ServiceStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Point-in-time listing of the registry, keyed by `id`.
///
/// Wire shape of `GET /services`. Treated as an immutable value: every change
/// produces a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub services: Vec<ServiceEntry>,
}

impl RegistrySnapshot {
    pub fn new(services: Vec<ServiceEntry>) -> Self {
        Self { services }
    }

    pub fn get(&self, id: ServiceId) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services.iter()
    }

    /// Copy of this snapshot with only `current_status` of `id` replaced.
    /// Returns `None` when `id` is not listed.
    pub fn with_status(&self, id: ServiceId, status: ServiceStatus) -> Option<Self> {
        let idx = self.services.iter().position(|s| s.id == id)?;
        let mut services = self.services.clone();
        services[idx].current_status = status;
        Some(Self { services })
    }
}
