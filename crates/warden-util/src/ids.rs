//! Strongly-typed identifiers for warden

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, stable identifier of a subject (or of the actor imposing a sanction)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Row identifier of a persisted sanction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SanctionId(i64);

impl SanctionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SanctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an emitted audit event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_equality() {
        let id1 = SubjectId::new("123");
        let id2 = SubjectId::from("123");
        let id3 = SubjectId::new("456");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn event_id_uniqueness() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn ids_serialize_deserialize() {
        let subject = SubjectId::new("user-1");
        let json = serde_json::to_string(&subject).unwrap();
        assert_eq!(json, "\"user-1\"");
        let parsed: SubjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(subject, parsed);

        let sanction = SanctionId::new(42);
        let json = serde_json::to_string(&sanction).unwrap();
        let parsed: SanctionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get(), 42);
    }
}
