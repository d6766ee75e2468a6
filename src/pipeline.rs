//! End-to-end batch processing for selected pre-check-in candidates:
//! operator resolution (create-if-absent), enrichment, and idempotent
//! registration against a net session.
//!
//! Each candidate runs its own state machine; one bad record never aborts
//! the batch. Only request-level problems (unknown session, empty
//! selection) fail the whole call.

use crate::db::{self, NewOperator, Operator, Pool};
use crate::enrich::Enricher;
use crate::model::{
    normalize_call_sign, BatchItemError, BatchItemResult, EnrichmentRecord,
    RawParticipantCandidate,
};
use anyhow::anyhow;
use chrono::Local;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("already checked into this session")]
    Duplicate,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Aggregated outcome of one batch run. Order across items is not
/// guaranteed; callers key on the call sign.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<BatchItemResult>,
    pub errors: Vec<BatchItemError>,
}

/// Find the operator for a call sign or create one, preferring enrichment
/// fields and falling back to the raw candidate's name/location. Returns
/// the operator plus whether this call created it.
///
/// A unique violation on insert means a concurrent creator won the race;
/// that is success — the now-existing row is re-read and returned.
pub async fn resolve_operator(
    pool: &Pool,
    call_sign: &str,
    enrichment: Option<&EnrichmentRecord>,
    fallback_name: Option<&str>,
    fallback_location: Option<&str>,
) -> anyhow::Result<(Operator, bool)> {
    let call = normalize_call_sign(call_sign);
    if let Some(existing) = db::find_operator_by_call(pool, &call).await? {
        return Ok((existing, false));
    }

    let new_op = match enrichment {
        Some(rec) => NewOperator {
            call_sign: call.clone(),
            name: rec.name.clone(),
            street: rec.street.clone(),
            location: join_location(rec.city.as_deref(), rec.state.as_deref()),
            email: rec.email.clone(),
            license_class: rec.license_class.clone(),
            grid: rec.grid.clone(),
            comment: Some(provenance_comment(true)),
        },
        None => NewOperator {
            call_sign: call.clone(),
            name: fallback_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            location: fallback_location
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            comment: Some(provenance_comment(false)),
            ..Default::default()
        },
    };

    match db::insert_operator(pool, &new_op).await {
        Ok(id) => {
            info!(call = %call, id, "created operator");
            Ok((
                Operator {
                    id,
                    call_sign: new_op.call_sign,
                    name: new_op.name,
                    street: new_op.street,
                    location: new_op.location,
                    email: new_op.email,
                    license_class: new_op.license_class,
                    grid: new_op.grid,
                    comment: new_op.comment,
                },
                true,
            ))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            let winner = db::find_operator_by_call(pool, &call)
                .await?
                .ok_or_else(|| anyhow!("operator {} vanished after unique violation", call))?;
            Ok((winner, false))
        }
        Err(err) => Err(err.into()),
    }
}

/// Idempotently attach an operator (or a bare call sign) to a session.
/// `check_in_time` defaults to the current local time-of-day.
pub async fn register_participant(
    pool: &Pool,
    session_id: i64,
    operator_id: Option<i64>,
    call_sign: &str,
    check_in_time: Option<&str>,
    notes: Option<&str>,
) -> Result<i64, RegisterError> {
    let call = normalize_call_sign(call_sign);
    if db::participant_exists(pool, session_id, operator_id, &call)
        .await
        .map_err(RegisterError::Store)?
    {
        return Err(RegisterError::Duplicate);
    }

    let time = match check_in_time {
        Some(t) => t.to_string(),
        None => Local::now().format("%H:%M:%S").to_string(),
    };

    // The duplicate pre-check races with concurrent workers; the partial
    // unique indexes are the backstop and surface as the same error.
    match db::insert_participant(pool, session_id, operator_id, &call, &time, notes).await {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(RegisterError::Duplicate)
        }
        Err(err) => Err(RegisterError::Store(err.into())),
    }
}

pub struct BatchProcessor {
    pool: Pool,
    enricher: Arc<Enricher>,
    max_concurrency: usize,
}

impl BatchProcessor {
    pub fn new(pool: Pool, enricher: Arc<Enricher>, max_concurrency: usize) -> Self {
        Self {
            pool,
            enricher,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run the per-candidate state machine over the selection with bounded
    /// fan-out. Enrichment is the latency-dominated step, so candidates
    /// proceed in parallel up to the cap; result order is unspecified.
    #[instrument(skip(self, candidates), fields(count = candidates.len()))]
    pub async fn process_batch(
        &self,
        candidates: Vec<RawParticipantCandidate>,
        session_id: i64,
    ) -> Result<BatchOutcome, ProcessError> {
        if candidates.is_empty() {
            return Err(ProcessError::Validation(
                "no participants selected".to_string(),
            ));
        }
        if !db::session_exists(&self.pool, session_id)
            .await
            .map_err(ProcessError::Internal)?
        {
            return Err(ProcessError::Validation(format!(
                "unknown session {session_id}"
            )));
        }

        let items: Vec<Result<BatchItemResult, BatchItemError>> = stream::iter(candidates)
            .map(|candidate| self.process_one(candidate, session_id))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for item in items {
            match item {
                Ok(result) => outcome.results.push(result),
                Err(error) => outcome.errors.push(error),
            }
        }
        info!(
            processed = outcome.results.len(),
            errored = outcome.errors.len(),
            "batch complete"
        );
        Ok(outcome)
    }

    async fn process_one(
        &self,
        candidate: RawParticipantCandidate,
        session_id: i64,
    ) -> Result<BatchItemResult, BatchItemError> {
        let call = normalize_call_sign(&candidate.call_sign);
        let item_err = |error: String| BatchItemError {
            call_sign: call.clone(),
            error,
        };

        let existing = db::find_operator_by_call(&self.pool, &call)
            .await
            .map_err(|err| item_err(format!("{err:#}")))?;

        let (operator_id, operator_created, has_enrichment, notes) = match existing {
            Some(op) => (Some(op.id), false, false, "pre-check-in".to_string()),
            None => {
                // An unreachable directory degrades to a bare operator;
                // check-in is never blocked on enrichment.
                let enrichment = match self.enricher.enrich(&call).await {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(?err, call = %call, "enrichment failed; using raw candidate data");
                        None
                    }
                };
                let has_enrichment = enrichment.is_some();
                let notes = provenance_comment(has_enrichment);

                match resolve_operator(
                    &self.pool,
                    &call,
                    enrichment.as_ref(),
                    Some(&candidate.display_name),
                    Some(&candidate.location),
                )
                .await
                {
                    Ok((op, created)) => (Some(op.id), created, has_enrichment, notes),
                    Err(err) => {
                        warn!(?err, call = %call, "operator creation failed; registering bare call sign");
                        (None, false, has_enrichment, notes)
                    }
                }
            }
        };

        let participant_id = register_participant(
            &self.pool,
            session_id,
            operator_id,
            &call,
            None,
            Some(&notes),
        )
        .await
        .map_err(|err| item_err(err.to_string()))?;

        Ok(BatchItemResult {
            call_sign: call,
            participant_id,
            operator_id,
            operator_created,
            has_enrichment_data: has_enrichment,
        })
    }
}

fn join_location(city: Option<&str>, state: Option<&str>) -> Option<String> {
    match (city, state) {
        (Some(c), Some(s)) => Some(format!("{c}, {s}")),
        (Some(c), None) => Some(c.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}

fn provenance_comment(with_lookup: bool) -> String {
    let date = Local::now().format("%Y-%m-%d");
    if with_lookup {
        format!("added from pre-check-in with directory lookup on {date}")
    } else {
        format!("added from pre-check-in on {date}")
    }
}
