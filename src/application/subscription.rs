use crate::domain::{
    Payment, Plan, Subscriber, SubscriptionChange, SubscriptionStatus, SubscriptionType,
};
use crate::infrastructure::{PaymentRepository, PlanRepository, RepositoryError, SubscriberRepository};
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No active subscription found for user {0}")]
    NoActiveSubscription(Uuid),
}

/// Subscriber record with its plan resolved.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub subscriber: Subscriber,
    pub plan: Option<Plan>,
}

pub struct SubscriptionService<S, P, Y>
where
    S: SubscriberRepository,
    P: PlanRepository,
    Y: PaymentRepository,
{
    subscriber_repo: Arc<S>,
    plan_repo: Arc<P>,
    payment_repo: Arc<Y>,
}

impl<S, P, Y> SubscriptionService<S, P, Y>
where
    S: SubscriberRepository,
    P: PlanRepository,
    Y: PaymentRepository,
{
    pub fn new(subscriber_repo: Arc<S>, plan_repo: Arc<P>, payment_repo: Arc<Y>) -> Self {
        Self {
            subscriber_repo,
            plan_repo,
            payment_repo,
        }
    }

    /// Creates an empty subscriber record; returns the existing one if the
    /// user is already known.
    pub async fn register(&self, user_id: Uuid) -> Result<Subscriber, SubscriptionError> {
        let subscriber = Subscriber::new(user_id);
        match self.subscriber_repo.create(&subscriber).await {
            Ok(()) => {
                info!(user_id = %user_id, "Registered subscriber");
                Ok(subscriber)
            }
            Err(RepositoryError::Conflict(_)) => Ok(self.subscriber_repo.get_by_id(user_id).await?),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn subscribe(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        subscription_type: &str,
    ) -> Result<SubscriptionView, SubscriptionError> {
        let subscription_type = SubscriptionType::from_str(subscription_type).map_err(|_| {
            SubscriptionError::Validation(format!("Invalid subscription type: {}", subscription_type))
        })?;

        let plan = self.plan_repo.get_by_id(plan_id).await.map_err(not_found)?;
        if !plan.is_active {
            return Err(SubscriptionError::Validation(format!(
                "Plan {} is no longer offered",
                plan.name
            )));
        }

        let change = SubscriptionChange::fresh(plan.id, &plan.services, subscription_type, Utc::now());
        let subscriber = self
            .subscriber_repo
            .replace_subscription(user_id, &change)
            .await
            .map_err(not_found)?;

        info!(
            user_id = %user_id,
            plan = %plan.name,
            subscription_type = %subscription_type,
            ends_at = %change.end_date,
            "Subscribed to plan"
        );

        Ok(SubscriptionView {
            subscriber,
            plan: Some(plan),
        })
    }

    /// Flags the subscription as cancelled. Plan, window and usage are kept.
    pub async fn cancel(&self, user_id: Uuid) -> Result<Subscriber, SubscriptionError> {
        let mut subscriber = self.subscriber_repo.get_by_id(user_id).await.map_err(not_found)?;

        match subscriber.subscription_status {
            None => return Err(SubscriptionError::NoActiveSubscription(user_id)),
            Some(SubscriptionStatus::Cancelled) => {
                warn!(user_id = %user_id, "Subscription already cancelled");
                return Ok(subscriber);
            }
            Some(SubscriptionStatus::Active) => {}
        }

        self.subscriber_repo
            .update_status(user_id, SubscriptionStatus::Cancelled)
            .await
            .map_err(not_found)?;
        subscriber.subscription_status = Some(SubscriptionStatus::Cancelled);

        info!(user_id = %user_id, "Cancelled subscription");
        Ok(subscriber)
    }

    pub async fn subscription_status(&self, user_id: Uuid) -> Result<SubscriptionView, SubscriptionError> {
        let subscriber = self.subscriber_repo.get_by_id(user_id).await.map_err(not_found)?;

        let plan = match subscriber.current_plan_id {
            Some(plan_id) => match self.plan_repo.get_by_id(plan_id).await {
                Ok(plan) => Some(plan),
                Err(RepositoryError::NotFound(_)) => {
                    warn!(user_id = %user_id, plan_id = %plan_id, "Subscriber references a missing plan");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        Ok(SubscriptionView { subscriber, plan })
    }

    pub async fn payment_history(&self, user_id: Uuid) -> Result<Vec<Payment>, SubscriptionError> {
        self.subscriber_repo.get_by_id(user_id).await.map_err(not_found)?;
        Ok(self.payment_repo.list_by_user(user_id).await?)
    }
}

fn not_found(err: RepositoryError) -> SubscriptionError {
    match err {
        RepositoryError::NotFound(what) => SubscriptionError::NotFound(what),
        other => SubscriptionError::Repository(other),
    }
}
