//! Ledger tests against a real Postgres.
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::{DateTime, Duration, Utc};
use quota_ledger::{
    domain::{ServiceName, Subscriber},
    infrastructure::{ConsumeOutcome, PostgresSubscriberRepository, SubscriberRepository},
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn connect() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .connect(&url)
        .await
        .expect("connect database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

async fn fresh_subscriber(repo: &PostgresSubscriberRepository) -> Uuid {
    let subscriber = Subscriber::new(Uuid::new_v4());
    repo.create(&subscriber).await.expect("create subscriber");
    subscriber.user_id
}

async fn cleanup(pool: &PgPool, user_id: Uuid) {
    sqlx::query("DELETE FROM subscribers WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .expect("cleanup subscriber");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_try_consume_respects_ceiling() {
    let Some(pool) = connect().await else {
        return;
    };
    let repo = Arc::new(PostgresSubscriberRepository::new(pool.clone()));
    let user_id = fresh_subscriber(&repo).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.try_consume(user_id, None, ServiceName::OptimizeUpscale, 1, Some(3), Utc::now())
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap().expect("try_consume") {
            ConsumeOutcome::Applied { .. } => applied += 1,
            ConsumeOutcome::Rejected { count } => {
                assert_eq!(count, 3);
                rejected += 1;
            }
            ConsumeOutcome::PlanChanged => panic!("plan did not change"),
        }
    }
    assert_eq!((applied, rejected), (3, 17));

    let subscriber = repo.get_by_id(user_id).await.expect("reload");
    assert_eq!(subscriber.usage_count(ServiceName::OptimizeUpscale), 3);
    assert_eq!(subscriber.images_processed, 3);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_try_consume_stamps_last_reset() {
    let Some(pool) = connect().await else {
        return;
    };
    let repo = PostgresSubscriberRepository::new(pool.clone());
    let user_id = fresh_subscriber(&repo).await;

    repo.try_consume(user_id, None, ServiceName::ModifyCrop, 1, Some(3), Utc::now())
        .await
        .expect("first consume");

    let stale = Utc::now() - Duration::days(10);
    sqlx::query("UPDATE subscriber_usage SET last_reset = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(stale)
        .execute(&pool)
        .await
        .expect("backdate ledger");

    let now = Utc::now();
    let outcome = repo
        .try_consume(user_id, None, ServiceName::ModifyCrop, 1, Some(3), now)
        .await
        .expect("second consume");
    assert!(matches!(outcome, ConsumeOutcome::Applied { count: 2, .. }));

    let last_reset: DateTime<Utc> = sqlx::query_scalar(
        "SELECT last_reset FROM subscriber_usage WHERE user_id = $1 AND service = $2",
    )
    .bind(user_id)
    .bind(ServiceName::ModifyCrop.to_string())
    .fetch_one(&pool)
    .await
    .expect("read ledger");
    assert!(last_reset > stale + Duration::days(9));

    // A stale plan reference writes nothing.
    let outcome = repo
        .try_consume(user_id, Some(Uuid::new_v4()), ServiceName::ModifyCrop, 1, Some(3), now)
        .await
        .expect("stale consume");
    assert_eq!(outcome, ConsumeOutcome::PlanChanged);
    let subscriber = repo.get_by_id(user_id).await.expect("reload");
    assert_eq!(subscriber.usage_count(ServiceName::ModifyCrop), 2);

    cleanup(&pool, user_id).await;
}
