use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row parsed out of the externally hosted pre-check-in listing.
/// Ephemeral: produced by the parser, selected in the UI, consumed by the
/// batch orchestrator. Never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipantCandidate {
    pub call_sign: String,
    pub display_name: String,
    pub location: String,
    pub announce: bool,
}

/// Biographical/location/license data from the call-sign directory.
/// Absence of any field except the call sign is a valid outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichmentRecord {
    pub call_sign: String,
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub email: Option<String>,
    pub license_class: Option<String>,
    pub grid: Option<String>,
    pub expiration: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Per-candidate success entry returned by a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub call_sign: String,
    pub participant_id: i64,
    pub operator_id: Option<i64>,
    pub operator_created: bool,
    pub has_enrichment_data: bool,
}

/// Per-candidate failure entry. The batch keeps going past these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub call_sign: String,
    pub error: String,
}

/// Canonical form for call signs: trimmed, uppercase.
pub fn normalize_call_sign(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
