use super::model::{CacheRow, NewOperator, Operator};
use crate::model::EnrichmentRecord;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn session_exists(pool: &Pool, session_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn insert_session(pool: &Pool, name: &str, session_date: Option<&str>) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO sessions (name, session_date) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(session_date)
        .fetch_one(pool)
        .await?;
    Ok(rec.get::<i64, _>("id"))
}

fn row_to_operator(row: &sqlx::sqlite::SqliteRow) -> Operator {
    Operator {
        id: row.get("id"),
        call_sign: row.get("call_sign"),
        name: row.get("name"),
        street: row.get("street"),
        location: row.get("location"),
        email: row.get("email"),
        license_class: row.get("license_class"),
        grid: row.get("grid"),
        comment: row.get("comment"),
    }
}

#[instrument(skip_all)]
pub async fn find_operator_by_call(pool: &Pool, call_sign: &str) -> Result<Option<Operator>> {
    let row = sqlx::query(
        "SELECT id, call_sign, name, street, location, email, license_class, grid, comment \
         FROM operators WHERE upper(call_sign) = upper(?)",
    )
    .bind(call_sign)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_operator))
}

/// Raw insert. Returns the sqlx error untouched so callers can tell a
/// unique violation (concurrent creator won) from a real fault.
#[instrument(skip_all)]
pub async fn insert_operator(pool: &Pool, op: &NewOperator) -> Result<i64, sqlx::Error> {
    let rec = sqlx::query(
        "INSERT INTO operators (call_sign, name, street, location, email, license_class, grid, comment) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&op.call_sign)
    .bind(&op.name)
    .bind(&op.street)
    .bind(&op.location)
    .bind(&op.email)
    .bind(&op.license_class)
    .bind(&op.grid)
    .bind(&op.comment)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// True when this session already has a row for the operator, or for the
/// bare call sign when no operator resolved.
#[instrument(skip_all)]
pub async fn participant_exists(
    pool: &Pool,
    session_id: i64,
    operator_id: Option<i64>,
    call_sign: &str,
) -> Result<bool> {
    let found: Option<i64> = match operator_id {
        Some(op_id) => {
            sqlx::query_scalar(
                "SELECT id FROM session_participants WHERE session_id = ? AND operator_id = ?",
            )
            .bind(session_id)
            .bind(op_id)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT id FROM session_participants \
                 WHERE session_id = ? AND operator_id IS NULL AND upper(call_sign) = upper(?)",
            )
            .bind(session_id)
            .bind(call_sign)
            .fetch_optional(pool)
            .await?
        }
    };
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn insert_participant(
    pool: &Pool,
    session_id: i64,
    operator_id: Option<i64>,
    call_sign: &str,
    check_in_time: &str,
    notes: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let rec = sqlx::query(
        "INSERT INTO session_participants (session_id, operator_id, call_sign, check_in_time, notes) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(session_id)
    .bind(operator_id)
    .bind(call_sign)
    .bind(check_in_time)
    .bind(notes)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn cache_get(pool: &Pool, call_sign: &str) -> Result<Option<CacheRow>> {
    let row = sqlx::query(
        "SELECT call_sign, name, street, city, state, zip_code, email, license_class, grid, \
                expiration, cached_at \
         FROM lookup_cache WHERE call_sign = upper(?)",
    )
    .bind(call_sign)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let cached_at: DateTime<Utc> = row.get("cached_at");
    Ok(Some(CacheRow {
        record: EnrichmentRecord {
            call_sign: row.get("call_sign"),
            name: row.get("name"),
            street: row.get("street"),
            city: row.get("city"),
            state: row.get("state"),
            zip_code: row.get("zip_code"),
            email: row.get("email"),
            license_class: row.get("license_class"),
            grid: row.get("grid"),
            expiration: row.get("expiration"),
            fetched_at: cached_at,
        },
        cached_at,
    }))
}

/// Upsert keyed by uppercase call sign; a stale entry is overwritten, never
/// silently reused.
#[instrument(skip_all)]
pub async fn cache_upsert(
    pool: &Pool,
    record: &EnrichmentRecord,
    cached_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO lookup_cache \
            (call_sign, name, street, city, state, zip_code, email, license_class, grid, expiration, cached_at) \
         VALUES (upper(?), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(call_sign) DO UPDATE SET \
            name = excluded.name, street = excluded.street, city = excluded.city, \
            state = excluded.state, zip_code = excluded.zip_code, email = excluded.email, \
            license_class = excluded.license_class, grid = excluded.grid, \
            expiration = excluded.expiration, cached_at = excluded.cached_at",
    )
    .bind(&record.call_sign)
    .bind(&record.name)
    .bind(&record.street)
    .bind(&record.city)
    .bind(&record.state)
    .bind(&record.zip_code)
    .bind(&record.email)
    .bind(&record.license_class)
    .bind(&record.grid)
    .bind(&record.expiration)
    .bind(cached_at)
    .execute(pool)
    .await?;
    Ok(())
}
