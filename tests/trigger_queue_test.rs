use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;

use event_herald::db;
use event_herald::dispatch::process_next_trigger;
use event_herald::fcm::{PushDelivery, SendReport};
use event_herald::model::EventNotification;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

struct NullPush;

#[async_trait::async_trait]
impl PushDelivery for NullPush {
    async fn send_to_devices(
        &self,
        _tokens: &[String],
        _message: &EventNotification,
    ) -> Result<SendReport> {
        Ok(SendReport::from_outcomes(vec![]))
    }
}

#[tokio::test]
async fn every_created_event_gets_one_trigger() {
    let pool = setup_pool().await;

    let e1 = db::insert_event(&pool, Some("First")).await.unwrap();
    let e2 = db::insert_event(&pool, Some("Second")).await.unwrap();
    let e3 = db::insert_event(&pool, None).await.unwrap();

    assert_eq!(db::count_pending_triggers(&pool).await.unwrap(), 3);

    let mut claimed = HashSet::new();
    while let Some(trigger) = db::claim_due_trigger(&pool, 30).await.unwrap() {
        claimed.insert(trigger.event_id);
    }
    let expected: HashSet<String> = [e1, e2, e3].into_iter().collect();
    assert_eq!(claimed, expected);
}

#[tokio::test]
async fn backoff_defers_and_counts_attempts() {
    let pool = setup_pool().await;
    let event_id = db::insert_event(&pool, Some("x")).await.unwrap();

    let trigger = db::claim_due_trigger(&pool, 0).await.unwrap().unwrap();
    assert_eq!(trigger.attempt, 0);
    db::backoff_trigger_with_cap(&pool, &event_id, trigger.attempt, 60)
        .await
        .unwrap();

    // Deferred into the future: not claimable, still pending.
    assert!(db::claim_due_trigger(&pool, 0).await.unwrap().is_none());
    assert_eq!(db::count_pending_triggers(&pool).await.unwrap(), 1);

    let (attempt, delay_secs): (i32, f64) = sqlx::query_as(
        "SELECT attempt, (julianday(due_at) - julianday('now')) * 86400.0 \
         FROM event_triggers WHERE event_id = ?",
    )
    .bind(&event_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempt, 1);
    assert!(delay_secs > 0.0 && delay_secs <= 61.0);
}

#[tokio::test]
async fn backoff_respects_cap() {
    let pool = setup_pool().await;
    let event_id = db::insert_event(&pool, Some("x")).await.unwrap();

    // Attempt 10 would mean 5 * 2^10 seconds uncapped.
    db::backoff_trigger_with_cap(&pool, &event_id, 10, 60)
        .await
        .unwrap();

    let delay_secs: f64 = sqlx::query_scalar(
        "SELECT (julianday(due_at) - julianday('now')) * 86400.0 \
         FROM event_triggers WHERE event_id = ?",
    )
    .bind(&event_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(delay_secs <= 61.0);
}

#[tokio::test]
async fn expired_lease_redelivers() {
    let pool = setup_pool().await;
    db::insert_event(&pool, Some("x")).await.unwrap();

    assert!(db::claim_due_trigger(&pool, 1).await.unwrap().is_some());
    assert!(db::claim_due_trigger(&pool, 1).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(db::claim_due_trigger(&pool, 1).await.unwrap().is_some());
}

#[tokio::test]
async fn handler_failure_backs_off_instead_of_retiring() {
    let pool = setup_pool().await;
    let event_id = db::insert_event(&pool, Some("Orphan")).await.unwrap();

    // Break the writer contract so the handler's event fetch fails.
    sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(&event_id)
        .execute(&pool)
        .await
        .unwrap();

    let processed = process_next_trigger(&pool, &NullPush, 0, 60).await.unwrap();
    assert!(processed);

    // Still pending, attempt bumped, deferred for redelivery.
    assert_eq!(db::count_pending_triggers(&pool).await.unwrap(), 1);
    let attempt: i32 =
        sqlx::query_scalar("SELECT attempt FROM event_triggers WHERE event_id = ?")
            .bind(&event_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(attempt, 1);
    assert!(db::claim_due_trigger(&pool, 0).await.unwrap().is_none());
}
