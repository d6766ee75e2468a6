//! Call-sign directory client: session handshake plus per-call lookups.
//!
//! The directory speaks a two-step GET protocol. The first call trades
//! configured credentials for a short-lived session key; each lookup then
//! carries that key. Replies are XML-ish; fields are extracted tag by tag
//! and any missing tag is simply `None`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::model::{normalize_call_sign, EnrichmentRecord};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to reach directory service: {0}")]
    Network(#[from] reqwest::Error),
    #[error("directory rejected session request: {0}")]
    Credential(String),
    #[error("unexpected directory response: {0}")]
    Protocol(&'static str),
}

/// Seam for the external directory. The pipeline and tests depend on this
/// trait, not on the concrete HTTP client.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// `Ok(None)` means the directory has no record for this call sign;
    /// that is an ordinary outcome, not a fault.
    async fn lookup(&self, call_sign: &str) -> Result<Option<EnrichmentRecord>, LookupError>;
}

pub struct DirectoryClient {
    http: Client,
    base_url: Url,
    username: String,
    password: String,
    // Acquired at most once per client; the lock makes acquisition
    // mutually exclusive so concurrent workers share one handshake.
    session_key: Mutex<Option<String>>,
}

impl fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DirectoryClient {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.directory.base_url)?;
        Ok(Self::with_base_url(
            base_url,
            cfg.directory.username.clone(),
            cfg.directory.password.clone(),
            Duration::from_secs(cfg.directory.timeout_seconds),
        ))
    }

    pub fn with_base_url(
        base_url: Url,
        username: String,
        password: String,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .user_agent("netroster/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            username,
            password,
            session_key: Mutex::new(None),
        }
    }

    /// Return the shared session key, performing the handshake on first use.
    /// The lock is held across acquisition so only one request is in flight.
    async fn session_key(&self) -> Result<String, LookupError> {
        let mut guard = self.session_key.lock().await;
        if let Some(key) = guard.as_ref() {
            return Ok(key.clone());
        }
        let res = self
            .http
            .get(self.base_url.clone())
            .query(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;
        let body = res.text().await?;
        let key = parse_session_reply(&body)?;
        info!("acquired directory session key");
        *guard = Some(key.clone());
        Ok(key)
    }
}

#[async_trait]
impl DirectoryService for DirectoryClient {
    #[instrument(skip(self))]
    async fn lookup(&self, call_sign: &str) -> Result<Option<EnrichmentRecord>, LookupError> {
        let call = normalize_call_sign(call_sign);
        let key = self.session_key().await?;
        let res = self
            .http
            .get(self.base_url.clone())
            .query(&[("s", key.as_str()), ("callsign", call.as_str())])
            .send()
            .await?;
        let body = res.text().await?;
        if let Some(err) = extract_tag(&body, "Error") {
            // The directory reports "no such call" and genuine lookup
            // failures through the same tag with no structured code, so
            // both map to "no enrichment available".
            warn!(call = %call, error = %err, "directory lookup returned no record");
            return Ok(None);
        }
        Ok(Some(parse_lookup_reply(&call, &body)))
    }
}

/// Scan a session reply: an `<Error>` tag fails fast, a `<Key>` tag yields
/// the session key, anything else is a protocol error.
fn parse_session_reply(body: &str) -> Result<String, LookupError> {
    if let Some(err) = extract_tag(body, "Error") {
        return Err(LookupError::Credential(err));
    }
    extract_tag(body, "Key").ok_or(LookupError::Protocol("reply carried neither Key nor Error"))
}

/// Field-by-field extraction; every field is independently optional.
fn parse_lookup_reply(call: &str, body: &str) -> EnrichmentRecord {
    let name = {
        let parts: Vec<String> = [
            extract_tag(body, "fname"),
            extract_tag(body, "mi"),
            extract_tag(body, "name"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    };

    EnrichmentRecord {
        call_sign: extract_tag(body, "call")
            .map(|c| normalize_call_sign(&c))
            .unwrap_or_else(|| call.to_string()),
        name,
        street: extract_tag(body, "addr1"),
        city: extract_tag(body, "addr2"),
        state: extract_tag(body, "state"),
        zip_code: extract_tag(body, "zip"),
        email: extract_tag(body, "email"),
        license_class: extract_tag(body, "class").map(|c| license_class_name(&c)),
        grid: extract_tag(body, "grid"),
        expiration: extract_tag(body, "expdate"),
        fetched_at: Utc::now(),
    }
}

/// Expand single-letter license class codes to their full names so nothing
/// downstream ever sees the raw code. Unknown values pass through.
fn license_class_name(code: &str) -> String {
    let trimmed = code.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "E" => "Amateur Extra".to_string(),
        "A" => "Advanced".to_string(),
        "G" => "General".to_string(),
        "T" => "Technician".to_string(),
        "N" => "Novice".to_string(),
        "P" => "Technician".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Extract the trimmed text of the first `<tag>…</tag>` pair, matching the
/// tag name case-insensitively. Empty content counts as absent.
fn extract_tag(body: &str, tag: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = format!("<{}>", tag.to_ascii_lowercase());
    let close = format!("</{}>", tag.to_ascii_lowercase());
    let start = lower.find(&open)? + open.len();
    let end = lower[start..].find(&close)? + start;
    let value = body[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_OK: &str =
        "<Session><Key>abc123def456</Key><SubExp>non-subscriber</SubExp></Session>";
    const SESSION_BAD: &str = "<Session><Error>Username/password incorrect</Error></Session>";

    const LOOKUP_HIT: &str = "<Callsign>\
        <call>W1AW</call>\
        <fname>Hiram</fname><mi>P</mi><name>Maxim</name>\
        <addr1>225 Main St</addr1><addr2>Newington</addr2>\
        <state>CT</state><zip>06111</zip>\
        <email>w1aw@example.org</email>\
        <class>E</class><grid>FN31pr</grid><expdate>2030-02-01</expdate>\
        </Callsign>";

    #[test]
    fn session_reply_extracts_key() {
        assert_eq!(parse_session_reply(SESSION_OK).unwrap(), "abc123def456");
    }

    #[test]
    fn session_reply_error_fails_fast() {
        let err = parse_session_reply(SESSION_BAD).unwrap_err();
        match err {
            LookupError::Credential(msg) => assert!(msg.contains("incorrect")),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn session_reply_without_key_is_protocol_error() {
        assert!(matches!(
            parse_session_reply("<html>down for maintenance</html>"),
            Err(LookupError::Protocol(_))
        ));
    }

    #[test]
    fn lookup_reply_extracts_all_fields() {
        let rec = parse_lookup_reply("W1AW", LOOKUP_HIT);
        assert_eq!(rec.call_sign, "W1AW");
        assert_eq!(rec.name.as_deref(), Some("Hiram P Maxim"));
        assert_eq!(rec.street.as_deref(), Some("225 Main St"));
        assert_eq!(rec.city.as_deref(), Some("Newington"));
        assert_eq!(rec.state.as_deref(), Some("CT"));
        assert_eq!(rec.zip_code.as_deref(), Some("06111"));
        assert_eq!(rec.email.as_deref(), Some("w1aw@example.org"));
        assert_eq!(rec.license_class.as_deref(), Some("Amateur Extra"));
        assert_eq!(rec.grid.as_deref(), Some("FN31pr"));
        assert_eq!(rec.expiration.as_deref(), Some("2030-02-01"));
    }

    #[test]
    fn lookup_reply_missing_fields_are_none() {
        let rec = parse_lookup_reply("N0CALL", "<Callsign><call>N0CALL</call></Callsign>");
        assert_eq!(rec.call_sign, "N0CALL");
        assert!(rec.name.is_none());
        assert!(rec.street.is_none());
        assert!(rec.license_class.is_none());
    }

    #[test]
    fn lookup_reply_falls_back_to_requested_call() {
        let rec = parse_lookup_reply("KC2XYZ", "<Callsign><state>NY</state></Callsign>");
        assert_eq!(rec.call_sign, "KC2XYZ");
        assert_eq!(rec.state.as_deref(), Some("NY"));
    }

    #[test]
    fn license_class_codes_expand() {
        assert_eq!(license_class_name("E"), "Amateur Extra");
        assert_eq!(license_class_name("A"), "Advanced");
        assert_eq!(license_class_name("g"), "General");
        assert_eq!(license_class_name("T"), "Technician");
        assert_eq!(license_class_name("N"), "Novice");
        assert_eq!(license_class_name("P"), "Technician");
        assert_eq!(license_class_name("General"), "General");
    }

    #[test]
    fn extract_tag_is_case_insensitive_and_trims() {
        assert_eq!(
            extract_tag("<KEY>  abc  </KEY>", "Key").as_deref(),
            Some("abc")
        );
        assert_eq!(extract_tag("<Key></Key>", "Key"), None);
        assert_eq!(extract_tag("no tags here", "Key"), None);
    }
}
