use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::Storage;

/// Local copy of the wiring text, stored under the session's storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringDraft {
    pub wiring: String,
    /// Epoch milliseconds of the last write.
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

impl WiringDraft {
    pub fn now(wiring: impl Into<String>) -> Self {
        Self {
            wiring: wiring.into(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Drafts without a string `wiring` field are treated as absent.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let wiring = value.get("wiring")?.as_str()?.to_string();
        let updated_at = value
            .get("updatedAt")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        Some(Self { wiring, updated_at })
    }

    pub fn load(storage: &dyn Storage, key: &str) -> Option<Self> {
        storage.get(key).and_then(|text| Self::parse(&text))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_draft_round_trip() {
        let draft = WiringDraft::now("[]");
        assert!(draft.updated_at > 0);
        let text = draft.to_json();
        assert!(text.contains("\"updatedAt\""));
        assert_eq!(WiringDraft::parse(&text), Some(draft));
    }

    #[test]
    fn test_invalid_drafts_are_absent() {
        let storage = MemoryStorage::new()
            .with_entry("a", r#"{"wiring": 3}"#)
            .with_entry("b", "not json")
            .with_entry("c", r#"{"wiring": "[]"}"#);
        assert_eq!(WiringDraft::load(&storage, "a"), None);
        assert_eq!(WiringDraft::load(&storage, "b"), None);
        assert_eq!(WiringDraft::load(&storage, "missing"), None);
        assert_eq!(WiringDraft::load(&storage, "c").unwrap().updated_at, 0);
    }
}
