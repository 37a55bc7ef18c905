use super::model::DueTrigger;
use crate::model::{EventRecord, UserRecord};
use anyhow::{anyhow, Context, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;
use uuid::Uuid;

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
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
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

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
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

/// Full scan of the device-token registry. No ordering clause: callers get
/// rows in whatever order the store returns them.
#[instrument(skip_all)]
pub async fn list_users(pool: &Pool) -> Result<Vec<UserRecord>> {
    let rows = sqlx::query("SELECT id, display_name, fcm_token, created_at FROM users")
        .fetch_all(pool)
        .await?;

    let users = rows
        .into_iter()
        .map(|row| UserRecord {
            id: row.get("id"),
            display_name: row.try_get("display_name").ok().flatten(),
            fcm_token: row.try_get("fcm_token").ok().flatten(),
            created_at: row.get("created_at"),
        })
        .collect();
    Ok(users)
}

#[instrument(skip_all)]
pub async fn fetch_event(pool: &Pool, event_id: &str) -> Result<EventRecord> {
    let row = sqlx::query("SELECT id, name, created_at FROM events WHERE id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(anyhow!("event {} not found", event_id));
    };

    Ok(EventRecord {
        id: row.get("id"),
        name: row.try_get("name").ok().flatten(),
        created_at: row.get("created_at"),
    })
}

/// Insert a new event and enqueue its creation trigger in one transaction.
/// This is the writer contract: every event row gets exactly one trigger row.
/// Returns the generated event id.
#[instrument(skip_all)]
pub async fn insert_event(pool: &Pool, name: Option<&str>) -> Result<String> {
    let mut tx = pool.begin().await?;
    let event_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO events (id, name) VALUES (?, ?)")
        .bind(&event_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;
    enqueue_trigger_tx(&mut tx, &event_id).await?;
    tx.commit().await?;
    Ok(event_id)
}

async fn enqueue_trigger_tx(tx: &mut Transaction<'_, Sqlite>, event_id: &str) -> Result<()> {
    sqlx::query("INSERT INTO event_triggers (event_id) VALUES (?)")
        .bind(event_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Register or refresh a user's device token. A `None` token clears the
/// registration (the app un-registered or the token expired).
#[instrument(skip_all)]
pub async fn upsert_user_token(
    pool: &Pool,
    user_id: &str,
    display_name: Option<&str>,
    fcm_token: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, display_name, fcm_token) VALUES (?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
             display_name = COALESCE(excluded.display_name, display_name), \
             fcm_token = excluded.fcm_token, \
             updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(display_name)
    .bind(fcm_token)
    .execute(pool)
    .await
    .context("failed to upsert user token")?;
    Ok(())
}

/// Atomically claim the oldest due, un-notified trigger and push its `due_at`
/// forward by `lease_secs` so concurrent workers cannot pick it up while the
/// handler runs. Returns `None` when nothing is due.
#[instrument(skip_all)]
pub async fn claim_due_trigger(pool: &Pool, lease_secs: i64) -> Result<Option<DueTrigger>> {
    let row = sqlx::query(
        "UPDATE event_triggers \
         SET due_at = datetime('now', ? || ' seconds') \
         WHERE event_id = ( \
             SELECT event_id FROM event_triggers \
             WHERE notified_at IS NULL AND datetime(due_at) <= CURRENT_TIMESTAMP \
             ORDER BY datetime(due_at) ASC LIMIT 1 \
         ) \
         RETURNING event_id, attempt",
    )
    .bind(lease_secs)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| DueTrigger {
        event_id: row.get("event_id"),
        attempt: row.get("attempt"),
    }))
}

#[instrument(skip_all)]
pub async fn mark_trigger_notified(pool: &Pool, event_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE event_triggers SET notified_at = CURRENT_TIMESTAMP WHERE event_id = ?",
    )
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Exponential backoff: 5s * 2^attempt, capped at `max_cap_secs`. The trigger
/// redelivers once `due_at` passes again.
#[instrument(skip_all)]
pub async fn backoff_trigger_with_cap(
    pool: &Pool,
    event_id: &str,
    attempt: i32,
    max_cap_secs: i64,
) -> Result<()> {
    let secs = (5_i64) * (1_i64 << attempt.min(10));
    let cap = if max_cap_secs <= 0 { secs } else { max_cap_secs };
    let secs = secs.min(cap);
    sqlx::query(
        "UPDATE event_triggers SET attempt = ?, due_at = datetime('now', ? || ' seconds') \
         WHERE event_id = ?",
    )
    .bind(attempt + 1)
    .bind(secs)
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_pending_triggers(pool: &Pool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM event_triggers WHERE notified_at IS NULL")
            .fetch_one(pool)
            .await?;
    Ok(count)
}
