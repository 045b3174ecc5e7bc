//! Shared record types for the cluster engine.
//!
//! The director and member records are the two payloads the engine persists
//! in the coordination store. Both serialize through serde_json with a fixed
//! field order, so encoding the same record twice yields identical bytes.
//! The director record relies on this: takeover uses a compare-and-swap
//! against the previously observed payload, which compares byte-for-byte.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a fleet member.
pub type MemberId = String;

/// Payload stored at `cluster/director`.
///
/// Written by the current director on every heartbeat and by any member
/// taking over after expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorRecord {
    /// Identity of the member currently holding the director role.
    #[serde(rename = "MemberID")]
    pub member_id: MemberId,
    /// Wall-clock timestamp of the last heartbeat write.
    #[serde(rename = "LastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl DirectorRecord {
    /// Create a record naming `member_id` as director, stamped now.
    pub fn new(member_id: impl Into<MemberId>) -> Self {
        Self {
            member_id: member_id.into(),
            last_update: Utc::now(),
        }
    }

    /// Encode to the canonical store payload.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a store payload.
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Whether the record's last update is older than `timeout`.
    pub fn is_expired(&self, timeout: std::time::Duration) -> bool {
        let delta = Utc::now().signed_duration_since(self.last_update);
        delta.num_milliseconds() > timeout.as_millis() as i64
    }
}

/// Payload stored at `cluster/members/<id>/status`.
///
/// Republished on every member heartbeat tick; consumed by the work
/// distributor and the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(rename = "MemberID")]
    pub member_id: MemberId,
    #[serde(rename = "Hostname")]
    pub hostname: String,
    #[serde(rename = "ListenAddress")]
    pub listen_address: String,
    #[serde(rename = "LastUpdated")]
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "SemVer")]
    pub semver: String,
}

impl MemberRecord {
    /// Encode to the canonical store payload.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a store payload.
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_director_record_roundtrip() {
        let record = DirectorRecord::new("member-1");
        let payload = record.to_payload().unwrap();
        let decoded = DirectorRecord::from_payload(&payload).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_director_record_deterministic_encoding() {
        // CAS compares the full previous bytes, so re-encoding an unchanged
        // record must produce identical output.
        let record = DirectorRecord::new("member-1");
        let a = record.to_payload().unwrap();
        let b = record.to_payload().unwrap();
        assert_eq!(a, b);

        let reencoded = DirectorRecord::from_payload(&a).unwrap().to_payload().unwrap();
        assert_eq!(a, reencoded);
    }

    #[test]
    fn test_director_record_field_names() {
        let record = DirectorRecord::new("member-1");
        let payload = record.to_payload().unwrap();
        assert!(payload.contains("\"MemberID\""));
        assert!(payload.contains("\"LastUpdate\""));
    }

    #[test]
    fn test_director_record_expiry() {
        let mut record = DirectorRecord::new("member-1");
        assert!(!record.is_expired(Duration::from_secs(5)));

        record.last_update = Utc::now() - chrono::Duration::seconds(10);
        assert!(record.is_expired(Duration::from_secs(5)));
        assert!(!record.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_member_record_roundtrip() {
        let record = MemberRecord {
            member_id: "member-1".to_string(),
            hostname: "host-a".to_string(),
            listen_address: "0.0.0.0:8080".to_string(),
            last_updated: Utc::now(),
            tags: vec!["dc1".to_string(), "linux".to_string()],
            version: "abc123".to_string(),
            semver: "0.3.1".to_string(),
        };
        let payload = record.to_payload().unwrap();
        let decoded = MemberRecord::from_payload(&payload).unwrap();
        assert_eq!(record, decoded);
        assert!(payload.contains("\"SemVer\""));
    }
}
