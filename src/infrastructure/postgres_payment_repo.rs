use crate::domain::{BillingCycle, Payment, SubscriptionType};
use crate::infrastructure::{PaymentRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Reads the payment history written by the checkout integration.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, plan_id, amount, billing_start, billing_end, billing_type,
                   created_at, updated_at
            FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_payment).collect()
    }
}

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Result<Payment, RepositoryError> {
    let billing_type_str: String = row.try_get("billing_type")?;

    Ok(Payment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        plan_id: row.try_get("plan_id")?,
        amount: row.try_get("amount")?,
        billing_cycle: BillingCycle {
            start_date: row.try_get("billing_start")?,
            end_date: row.try_get("billing_end")?,
        },
        billing_type: SubscriptionType::from_str(&billing_type_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown billing type: {}", billing_type_str))
        })?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
