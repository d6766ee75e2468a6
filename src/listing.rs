//! Pre-check-in listing: HTTP fetch plus the two-stage line parser.
//!
//! The upstream listing is not contractually stable. Parsing is line-local
//! and best-effort: a line that matches neither grammar is skipped, never
//! an error.

use crate::model::{normalize_call_sign, RawParticipantCandidate};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to reach listing source: {0}")]
    Network(#[from] reqwest::Error),
    #[error("listing source returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Seam for the listing source so handlers can be tested without a live
/// upstream.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;
}

/// Fetches the raw pre-check-in text from the configured external URL.
#[derive(Debug, Clone)]
pub struct ListingFetcher {
    http: Client,
    url: String,
}

impl ListingFetcher {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.listing.url, Duration::from_secs(cfg.listing.timeout_seconds))
    }

    pub fn new(url: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("netroster/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            url: url.to_string(),
        }
    }

    /// Single bounded-timeout GET. Non-2xx, timeout, and connection
    /// failures all yield `FetchError`; the body is never inspected here.
    #[instrument(skip_all)]
    pub async fn fetch(&self) -> Result<String, FetchError> {
        let res = self.http.get(&self.url).send().await?;
        if !res.status().is_success() {
            return Err(FetchError::Status(res.status()));
        }
        Ok(res.text().await?)
    }

}

#[async_trait]
impl ListingSource for ListingFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        ListingFetcher::fetch(self).await
    }
}

// Strict grammar: `CALLSIGN, Name, Location, Yes|No` with the announce
// token compared case-insensitively.
static STRICT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<call>[A-Z0-9]+)\s*,\s*(?P<name>[^,]*?)\s*,\s*(?P<location>[^,]*?)\s*,\s*(?P<announce>yes|no)\s*$",
    )
    .expect("strict listing grammar")
});

// Lenient fallback: a call-sign-shaped token (3+ alnum) followed by a comma.
static LENIENT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z0-9]{3,}\s*,").expect("lenient listing prefix"));

const MIN_LINE_LEN: usize = 6;

/// Parse raw listing text into candidates. Pure function, no I/O.
///
/// Stage 1 applies the strict grammar to every line; stage 2 (comma-split)
/// runs only when stage 1 produced nothing at all, which is how the
/// upstream's occasional format drift is absorbed without failing a batch.
pub fn parse_listing(raw: &str) -> Vec<RawParticipantCandidate> {
    let strict: Vec<RawParticipantCandidate> =
        raw.lines().filter_map(parse_strict_line).collect();
    if !strict.is_empty() {
        return strict;
    }

    let lenient: Vec<RawParticipantCandidate> =
        raw.lines().filter_map(parse_lenient_line).collect();
    debug!(
        candidates = lenient.len(),
        "strict grammar matched nothing; used lenient fallback"
    );
    lenient
}

fn parse_strict_line(line: &str) -> Option<RawParticipantCandidate> {
    if line.trim().len() < MIN_LINE_LEN {
        return None;
    }
    let caps = STRICT_LINE.captures(line)?;
    Some(RawParticipantCandidate {
        call_sign: normalize_call_sign(&caps["call"]),
        display_name: caps["name"].trim().to_string(),
        location: caps["location"].trim().to_string(),
        announce: caps["announce"].eq_ignore_ascii_case("yes"),
    })
}

fn parse_lenient_line(line: &str) -> Option<RawParticipantCandidate> {
    if !LENIENT_PREFIX.is_match(line) {
        return None;
    }
    let mut parts = line.split(',').map(str::trim);
    let call = parts.next()?;
    let name = parts.next().unwrap_or("");
    let location = parts.next().unwrap_or("");
    let announce = parts
        .next()
        .map(|t| t.eq_ignore_ascii_case("yes"))
        .unwrap_or(false);
    Some(RawParticipantCandidate {
        call_sign: normalize_call_sign(call),
        display_name: name.to_string(),
        location: location.to_string(),
        announce,
    })
}
