use crate::domain::SubscriptionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment written by the checkout integration. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub billing_type: SubscriptionType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingCycle {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}
