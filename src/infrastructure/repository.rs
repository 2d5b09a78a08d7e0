use crate::domain::{
    Payment, Plan, PlanName, ServiceName, ServiceQuota, Subscriber, SubscriptionChange,
    SubscriptionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Advisory lock key serializing catalog seeding across processes.
const PLAN_SEED_LOCK_KEY: i64 = 0x706c_616e_7365_6564;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result of a conditional ledger increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The increment was committed; `count` is the new ledger value.
    Applied { count: i64, images_processed: i64 },
    /// The increment would have crossed the ceiling; nothing changed.
    Rejected { count: i64 },
    /// The subscriber no longer points at the plan the ceiling came from.
    /// Nothing changed.
    PlanChanged,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: &Plan) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Plan, RepositoryError>;
    async fn get_by_name(&self, name: PlanName) -> Result<Plan, RepositoryError>;
    async fn list(&self) -> Result<Vec<Plan>, RepositoryError>;
    async fn update(&self, plan: &Plan) -> Result<(), RepositoryError>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), RepositoryError>;
    /// Inserts `plans` only if the catalog holds no plan at all.
    /// Returns whether anything was inserted.
    async fn seed_if_empty(&self, plans: &[Plan]) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn create(&self, subscriber: &Subscriber) -> Result<(), RepositoryError>;
    /// Loads the subscriber together with its usage ledger.
    async fn get_by_id(&self, user_id: Uuid) -> Result<Subscriber, RepositoryError>;
    /// Points the subscriber at a new plan and replaces the whole ledger.
    async fn replace_subscription(
        &self,
        user_id: Uuid,
        change: &SubscriptionChange,
    ) -> Result<Subscriber, RepositoryError>;
    async fn update_status(
        &self,
        user_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), RepositoryError>;
    /// Atomically adds `units` to the ledger entry for `service` unless that
    /// would push it past `ceiling` (`None` = unlimited). A missing entry is
    /// created at zero first. On success `last_reset` is stamped with `now`
    /// and `images_processed` grows by `units` in the same transaction.
    ///
    /// `expected_plan` is the `current_plan_id` the ceiling was derived from;
    /// if the subscriber has moved to another plan meanwhile nothing is written.
    async fn try_consume(
        &self,
        user_id: Uuid,
        expected_plan: Option<Uuid>,
        service: ServiceName,
        units: i64,
        ceiling: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, RepositoryError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, RepositoryError>;
}

pub(crate) fn map_unique_violation(e: sqlx::Error, what: String) -> RepositoryError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Conflict(what),
        _ => RepositoryError::DatabaseError(e),
    }
}

pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_plan<'e, E: PgExecutor<'e>>(executor: E, plan: &Plan) -> Result<(), RepositoryError> {
    let services_json = serde_json::to_value(&plan.services).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to serialize services: {}", e))
    })?;
    let features_json = serde_json::to_value(&plan.features).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to serialize features: {}", e))
    })?;

    sqlx::query(
        r#"
        INSERT INTO plans (id, name, monthly_fee, annual_fee, features, services, max_images,
                           max_file_size_mb, max_resolution, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(plan.id)
    .bind(plan.name.to_string())
    .bind(plan.monthly_fee)
    .bind(plan.annual_fee)
    .bind(features_json)
    .bind(services_json)
    .bind(plan.max_images)
    .bind(plan.max_file_size_mb)
    .bind(&plan.max_resolution)
    .bind(plan.is_active)
    .bind(plan.created_at)
    .bind(plan.updated_at)
    .execute(executor)
    .await
    .map_err(|e| map_unique_violation(e, format!("Plan {} already exists", plan.name)))?;

    Ok(())
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn create(&self, plan: &Plan) -> Result<(), RepositoryError> {
        insert_plan(&self.pool, plan).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Plan, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, monthly_fee, annual_fee, features, services, max_images,
                   max_file_size_mb, max_resolution, is_active, created_at, updated_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Plan {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_plan(&row)
    }

    async fn get_by_name(&self, name: PlanName) -> Result<Plan, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, monthly_fee, annual_fee, features, services, max_images,
                   max_file_size_mb, max_resolution, is_active, created_at, updated_at
            FROM plans
            WHERE name = $1
            "#,
        )
        .bind(name.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Plan {}", name)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_plan(&row)
    }

    async fn list(&self) -> Result<Vec<Plan>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, monthly_fee, annual_fee, features, services, max_images,
                   max_file_size_mb, max_resolution, is_active, created_at, updated_at
            FROM plans
            ORDER BY monthly_fee ASC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    async fn update(&self, plan: &Plan) -> Result<(), RepositoryError> {
        let services_json = serde_json::to_value(&plan.services).map_err(|e| {
            RepositoryError::InvalidData(format!("Failed to serialize services: {}", e))
        })?;
        let features_json = serde_json::to_value(&plan.features).map_err(|e| {
            RepositoryError::InvalidData(format!("Failed to serialize features: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE plans
            SET monthly_fee = $1, annual_fee = $2, features = $3, services = $4,
                max_images = $5, max_file_size_mb = $6, max_resolution = $7,
                is_active = $8, updated_at = $9
            WHERE id = $10
            "#,
        )
        .bind(plan.monthly_fee)
        .bind(plan.annual_fee)
        .bind(features_json)
        .bind(services_json)
        .bind(plan.max_images)
        .bind(plan.max_file_size_mb)
        .bind(&plan.max_resolution)
        .bind(plan.is_active)
        .bind(plan.updated_at)
        .bind(plan.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Plan {}", plan.id)));
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE plans
            SET is_active = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Plan {}", id)));
        }
        Ok(())
    }

    async fn seed_if_empty(&self, plans: &[Plan]) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PLAN_SEED_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plans")
            .fetch_one(&mut *tx)
            .await?;

        if existing > 0 {
            tx.commit().await?;
            return Ok(false);
        }

        for plan in plans {
            insert_plan(&mut *tx, plan).await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

fn row_to_plan(row: &sqlx::postgres::PgRow) -> Result<Plan, RepositoryError> {
    let name_str: String = row.try_get("name")?;
    let services_json: serde_json::Value = row.try_get("services")?;
    let features_json: serde_json::Value = row.try_get("features")?;

    let services: Vec<ServiceQuota> = serde_json::from_value(services_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize services: {}", e))
    })?;
    let features: Vec<String> = serde_json::from_value(features_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize features: {}", e))
    })?;

    Ok(Plan {
        id: row.try_get("id")?,
        name: PlanName::from_str(&name_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown plan name: {}", name_str)))?,
        monthly_fee: row.try_get("monthly_fee")?,
        annual_fee: row.try_get("annual_fee")?,
        features,
        services,
        max_images: row.try_get("max_images")?,
        max_file_size_mb: row.try_get("max_file_size_mb")?,
        max_resolution: row.try_get("max_resolution")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
