use crate::domain::{
    ServiceName, Subscriber, SubscriptionChange, SubscriptionStatus, SubscriptionType, UsageEntry,
};
use crate::infrastructure::{map_unique_violation, ConsumeOutcome, RepositoryError, SubscriberRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresSubscriberRepository {
    pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_usage(&self, user_id: Uuid) -> Result<Vec<UsageEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT service, count, last_reset
            FROM subscriber_usage
            WHERE user_id = $1
            ORDER BY service ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    async fn create(&self, subscriber: &Subscriber) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (user_id, current_plan_id, subscription_type, subscription_status,
                                     subscription_start_date, subscription_end_date, images_processed,
                                     created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(subscriber.user_id)
        .bind(subscriber.current_plan_id)
        .bind(subscriber.subscription_type.map(|t| t.to_string()))
        .bind(subscriber.subscription_status.map(|s| s.to_string()))
        .bind(subscriber.subscription_start_date)
        .bind(subscriber.subscription_end_date)
        .bind(subscriber.images_processed)
        .bind(subscriber.created_at)
        .bind(subscriber.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, format!("Subscriber {} already exists", subscriber.user_id))
        })?;

        Ok(())
    }

    async fn get_by_id(&self, user_id: Uuid) -> Result<Subscriber, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, current_plan_id, subscription_type, subscription_status,
                   subscription_start_date, subscription_end_date, images_processed,
                   created_at, updated_at
            FROM subscribers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Subscriber {}", user_id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        let usage = self.load_usage(user_id).await?;
        row_to_subscriber(&row, usage)
    }

    async fn replace_subscription(
        &self,
        user_id: Uuid,
        change: &SubscriptionChange,
    ) -> Result<Subscriber, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Subscriber row first, then ledger rows; try_consume takes them in the same order.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM subscribers WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound(format!("Subscriber {}", user_id)));
        }

        sqlx::query("DELETE FROM subscriber_usage WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for entry in &change.usage {
            sqlx::query(
                r#"
                INSERT INTO subscriber_usage (user_id, service, count, last_reset)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(user_id)
            .bind(entry.service.to_string())
            .bind(entry.count)
            .bind(entry.last_reset)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            r#"
            UPDATE subscribers
            SET current_plan_id = $1, subscription_type = $2, subscription_status = $3,
                subscription_start_date = $4, subscription_end_date = $5, updated_at = $6
            WHERE user_id = $7
            RETURNING user_id, current_plan_id, subscription_type, subscription_status,
                      subscription_start_date, subscription_end_date, images_processed,
                      created_at, updated_at
            "#,
        )
        .bind(change.plan_id)
        .bind(change.subscription_type.to_string())
        .bind(SubscriptionStatus::Active.to_string())
        .bind(change.start_date)
        .bind(change.end_date)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound(format!("Subscriber {}", user_id)));
        };

        let subscriber = row_to_subscriber(&row, change.usage.clone())?;
        tx.commit().await?;
        Ok(subscriber)
    }

    async fn update_status(
        &self,
        user_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET subscription_status = $1, updated_at = $2
            WHERE user_id = $3
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Subscriber {}", user_id)));
        }
        Ok(())
    }

    async fn try_consume(
        &self,
        user_id: Uuid,
        expected_plan: Option<Uuid>,
        service: ServiceName,
        units: i64,
        ceiling: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, RepositoryError> {
        let service_str = service.to_string();
        let mut tx = self.pool.begin().await?;

        // Serializes against replace_subscription for this user.
        let current_plan: Option<Option<Uuid>> = sqlx::query_scalar(
            "SELECT current_plan_id FROM subscribers WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current_plan) = current_plan else {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound(format!("Subscriber {}", user_id)));
        };
        if current_plan != expected_plan {
            tx.rollback().await?;
            return Ok(ConsumeOutcome::PlanChanged);
        }

        sqlx::query(
            r#"
            INSERT INTO subscriber_usage (user_id, service, count, last_reset)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (user_id, service) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&service_str)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let applied: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE subscriber_usage
            SET count = count + $3, last_reset = $5
            WHERE user_id = $1
              AND service = $2
              AND ($4::BIGINT IS NULL OR count + $3 <= $4)
            RETURNING count
            "#,
        )
        .bind(user_id)
        .bind(&service_str)
        .bind(units)
        .bind(ceiling)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match applied {
            Some(count) => {
                let images_processed: i64 = sqlx::query_scalar(
                    r#"
                    UPDATE subscribers
                    SET images_processed = images_processed + $2, updated_at = $3
                    WHERE user_id = $1
                    RETURNING images_processed
                    "#,
                )
                .bind(user_id)
                .bind(units)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

                ConsumeOutcome::Applied {
                    count,
                    images_processed,
                }
            }
            None => {
                let count: i64 = sqlx::query_scalar(
                    r#"
                    SELECT count
                    FROM subscriber_usage
                    WHERE user_id = $1 AND service = $2
                    "#,
                )
                .bind(user_id)
                .bind(&service_str)
                .fetch_one(&mut *tx)
                .await?;

                ConsumeOutcome::Rejected { count }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

fn row_to_usage(row: &sqlx::postgres::PgRow) -> Result<UsageEntry, RepositoryError> {
    let service_str: String = row.try_get("service")?;

    Ok(UsageEntry {
        service: ServiceName::from_str(&service_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown service: {}", service_str)))?,
        count: row.try_get("count")?,
        last_reset: row.try_get("last_reset")?,
    })
}

fn row_to_subscriber(
    row: &sqlx::postgres::PgRow,
    usage: Vec<UsageEntry>,
) -> Result<Subscriber, RepositoryError> {
    let type_str: Option<String> = row.try_get("subscription_type")?;
    let status_str: Option<String> = row.try_get("subscription_status")?;

    let subscription_type = type_str
        .map(|s| {
            SubscriptionType::from_str(&s).map_err(|_| {
                RepositoryError::InvalidData(format!("Unknown subscription type: {}", s))
            })
        })
        .transpose()?;
    let subscription_status = status_str
        .map(|s| {
            SubscriptionStatus::from_str(&s).map_err(|_| {
                RepositoryError::InvalidData(format!("Unknown subscription status: {}", s))
            })
        })
        .transpose()?;

    Ok(Subscriber {
        user_id: row.try_get("user_id")?,
        current_plan_id: row.try_get("current_plan_id")?,
        subscription_type,
        subscription_status,
        subscription_start_date: row.try_get("subscription_start_date")?,
        subscription_end_date: row.try_get("subscription_end_date")?,
        usage,
        images_processed: row.try_get("images_processed")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
