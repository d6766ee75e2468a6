use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of a known radio operator, independent of any session.
/// Serialized camelCase because it rides along in display payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operator {
    pub id: i64,
    pub call_sign: String,
    pub name: Option<String>,
    pub street: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub license_class: Option<String>,
    pub grid: Option<String>,
    pub comment: Option<String>,
}

/// Insert shape for a new operator. The pipeline creates-if-absent and
/// never updates identity fields of an existing operator.
#[derive(Debug, Clone, Default)]
pub struct NewOperator {
    pub call_sign: String,
    pub name: Option<String>,
    pub street: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub license_class: Option<String>,
    pub grid: Option<String>,
    pub comment: Option<String>,
}

/// A cached enrichment record together with when it was written.
/// Freshness is judged at read time against the configured TTL.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub record: crate::model::EnrichmentRecord,
    pub cached_at: DateTime<Utc>,
}
