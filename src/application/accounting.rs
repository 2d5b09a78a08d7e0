use crate::domain::{
    Plan, PlanName, Remaining, ServiceName, Subscriber, SubscriptionStatus, SubscriptionType,
    UNLIMITED,
};
use crate::infrastructure::{ConsumeOutcome, PlanRepository, RepositoryError, SubscriberRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest number of units a single request may charge.
pub const MAX_UNITS_PER_REQUEST: i64 = 1_000_000;

/// Re-resolutions allowed when a subscription changes mid-request.
const PLAN_CHANGE_RETRIES: usize = 3;

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Subscriber not found: {0}")]
    NotFound(Uuid),
    #[error("Service {service} is not available in plan {plan}")]
    ServiceNotOffered { service: ServiceName, plan: PlanName },
    #[error("Quota exceeded for {service}: used {used} of {quota}, requested {requested}")]
    QuotaExceeded {
        service: ServiceName,
        used: i64,
        quota: i64,
        requested: i64,
    },
}

impl UsageError {
    /// Headroom left when the request was denied for quota reasons.
    pub fn remaining(&self) -> Option<Remaining> {
        match self {
            UsageError::QuotaExceeded { used, quota, .. } => Some(Remaining::compute(*quota, *used)),
            _ => None,
        }
    }
}

/// Plan that governs a subscriber's quotas.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePlan {
    pub plan: Plan,
    /// True when the subscriber has no plan of their own and falls back to Basic.
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub service: ServiceName,
    pub used: i64,
    pub quota: i64,
    pub remaining: Remaining,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageReceipt {
    pub service: ServiceName,
    pub used: i64,
    pub quota: i64,
    pub remaining: Remaining,
    pub images_processed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriberStats {
    pub images_processed: i64,
    /// `None` when the effective plan has no aggregate image cap.
    pub remaining_images: Option<Remaining>,
    pub plan_name: String,
    pub subscription_type: Option<SubscriptionType>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
}

pub struct UsageAccountingService<S, P>
where
    S: SubscriberRepository,
    P: PlanRepository,
{
    subscriber_repo: Arc<S>,
    plan_repo: Arc<P>,
}

impl<S, P> UsageAccountingService<S, P>
where
    S: SubscriberRepository,
    P: PlanRepository,
{
    pub fn new(subscriber_repo: Arc<S>, plan_repo: Arc<P>) -> Self {
        Self {
            subscriber_repo,
            plan_repo,
        }
    }

    /// The subscriber's own plan, or Basic when they have none. A missing
    /// Basic plan is provisioned here and nowhere else.
    pub async fn resolve_effective_plan(
        &self,
        subscriber: &Subscriber,
    ) -> Result<EffectivePlan, UsageError> {
        if let Some(plan_id) = subscriber.current_plan_id {
            let plan = self.plan_repo.get_by_id(plan_id).await?;
            return Ok(EffectivePlan {
                plan,
                is_default: false,
            });
        }

        let plan = match self.plan_repo.get_by_name(PlanName::Basic).await {
            Ok(plan) => plan,
            Err(RepositoryError::NotFound(_)) => self.provision_basic_plan().await?,
            Err(e) => return Err(e.into()),
        };

        Ok(EffectivePlan {
            plan,
            is_default: true,
        })
    }

    async fn provision_basic_plan(&self) -> Result<Plan, UsageError> {
        let plan = Plan::fallback_basic();
        match self.plan_repo.create(&plan).await {
            Ok(()) => {
                warn!(plan_id = %plan.id, "Basic plan missing, provisioned fallback definition");
                Ok(plan)
            }
            // Another request created it first.
            Err(RepositoryError::Conflict(_)) => Ok(self.plan_repo.get_by_name(PlanName::Basic).await?),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_subscriber(&self, user_id: Uuid) -> Result<Subscriber, UsageError> {
        self.subscriber_repo.get_by_id(user_id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => UsageError::NotFound(user_id),
            other => other.into(),
        })
    }

    /// Steps shared by reads and writes: subscriber, effective plan, quota.
    async fn resolve_quota(
        &self,
        user_id: Uuid,
        service: ServiceName,
    ) -> Result<(Subscriber, i64), UsageError> {
        let subscriber = self.load_subscriber(user_id).await?;
        let effective = self.resolve_effective_plan(&subscriber).await?;

        let entry = effective
            .plan
            .service(service)
            .ok_or(UsageError::ServiceNotOffered {
                service,
                plan: effective.plan.name,
            })?;

        let quota = subscriber.billing_type().quota_for(entry);
        Ok((subscriber, quota))
    }

    /// Read-only view of a service's consumption.
    pub async fn check_usage(
        &self,
        user_id: Uuid,
        service: ServiceName,
    ) -> Result<UsageSnapshot, UsageError> {
        let (subscriber, quota) = self.resolve_quota(user_id, service).await?;
        let used = subscriber.usage_count(service);

        Ok(UsageSnapshot {
            service,
            used,
            quota,
            remaining: Remaining::compute(quota, used),
        })
    }

    /// Charges `units` against the subscriber's quota for `service`, or
    /// rejects the whole request if it does not fit.
    pub async fn consume(
        &self,
        user_id: Uuid,
        service: ServiceName,
        units: i64,
    ) -> Result<UsageReceipt, UsageError> {
        if !(1..=MAX_UNITS_PER_REQUEST).contains(&units) {
            return Err(UsageError::Validation(format!(
                "Requested units must be between 1 and {}, got {}",
                MAX_UNITS_PER_REQUEST, units
            )));
        }

        for _ in 0..PLAN_CHANGE_RETRIES {
            let (subscriber, quota) = self.resolve_quota(user_id, service).await?;
            let ceiling = (quota != UNLIMITED).then_some(quota);

            let outcome = self
                .subscriber_repo
                .try_consume(
                    user_id,
                    subscriber.current_plan_id,
                    service,
                    units,
                    ceiling,
                    Utc::now(),
                )
                .await
                .map_err(|e| match e {
                    RepositoryError::NotFound(_) => UsageError::NotFound(user_id),
                    other => other.into(),
                })?;

            match outcome {
                ConsumeOutcome::Applied {
                    count,
                    images_processed,
                } => {
                    info!(
                        user_id = %user_id,
                        service = %service,
                        units,
                        used = count,
                        quota,
                        "Recorded usage"
                    );
                    return Ok(UsageReceipt {
                        service,
                        used: count,
                        quota,
                        remaining: Remaining::compute(quota, count),
                        images_processed,
                    });
                }
                ConsumeOutcome::Rejected { count } => {
                    warn!(
                        user_id = %user_id,
                        service = %service,
                        units,
                        used = count,
                        quota,
                        "Quota exceeded"
                    );
                    return Err(UsageError::QuotaExceeded {
                        service,
                        used: count,
                        quota,
                        requested: units,
                    });
                }
                ConsumeOutcome::PlanChanged => {
                    warn!(user_id = %user_id, service = %service, "Plan changed during consume, re-resolving");
                }
            }
        }

        Err(RepositoryError::Conflict(format!(
            "Subscription for {} kept changing while recording usage",
            user_id
        ))
        .into())
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<SubscriberStats, UsageError> {
        let subscriber = self.load_subscriber(user_id).await?;
        let effective = self.resolve_effective_plan(&subscriber).await?;

        let remaining_images = effective
            .plan
            .max_images
            .map(|cap| Remaining::compute(cap, subscriber.images_processed));

        let plan_name = if effective.is_default {
            "Free".to_string()
        } else {
            effective.plan.name.to_string()
        };

        Ok(SubscriberStats {
            images_processed: subscriber.images_processed,
            remaining_images,
            plan_name,
            subscription_type: subscriber.subscription_type,
            subscription_status: subscriber.subscription_status,
            subscription_start_date: subscriber.subscription_start_date,
            subscription_end_date: subscriber.subscription_end_date,
        })
    }
}
