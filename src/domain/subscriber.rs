use crate::domain::{ServiceName, ServiceQuota, UNLIMITED};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionType {
    Monthly,
    Annual,
}

impl SubscriptionType {
    /// End of a billing window opened at `start`. Calendar-month arithmetic,
    /// clamped to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).
    pub fn period_end(self, start: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            SubscriptionType::Monthly => Months::new(1),
            SubscriptionType::Annual => Months::new(12),
        };
        start.checked_add_months(months).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn quota_for(self, entry: &ServiceQuota) -> i64 {
        match self {
            SubscriptionType::Monthly => entry.monthly_quota,
            SubscriptionType::Annual => entry.annual_quota,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEntry {
    pub service: ServiceName,
    pub count: i64,
    pub last_reset: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscriber {
    pub user_id: Uuid,
    pub current_plan_id: Option<Uuid>,
    pub subscription_type: Option<SubscriptionType>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub usage: Vec<UsageEntry>,
    pub images_processed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            current_plan_id: None,
            subscription_type: None,
            subscription_status: None,
            subscription_start_date: None,
            subscription_end_date: None,
            usage: Vec::new(),
            images_processed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn usage_count(&self, service: ServiceName) -> i64 {
        self.usage
            .iter()
            .find(|u| u.service == service)
            .map(|u| u.count)
            .unwrap_or(0)
    }

    /// Quota period in force; subscribers that never picked a type are billed monthly.
    pub fn billing_type(&self) -> SubscriptionType {
        self.subscription_type.unwrap_or(SubscriptionType::Monthly)
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription_status.is_some()
    }
}

/// Everything `subscribe` writes in one go.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub plan_id: Uuid,
    pub subscription_type: SubscriptionType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub usage: Vec<UsageEntry>,
}

impl SubscriptionChange {
    /// Opens a fresh window at `start` with a zeroed ledger entry per plan service.
    pub fn fresh(
        plan_id: Uuid,
        services: &[ServiceQuota],
        subscription_type: SubscriptionType,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            plan_id,
            subscription_type,
            start_date: start,
            end_date: subscription_type.period_end(start),
            usage: services
                .iter()
                .map(|s| UsageEntry {
                    service: s.service,
                    count: 0,
                    last_reset: start,
                })
                .collect(),
        }
    }
}

/// Headroom left under a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(i64),
    Unlimited,
}

impl Remaining {
    pub fn compute(quota: i64, used: i64) -> Self {
        if quota == UNLIMITED {
            Remaining::Unlimited
        } else {
            Remaining::Limited((quota - used).max(0))
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Limited(n) => serializer.serialize_i64(*n),
            Remaining::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_end_adds_calendar_months() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        assert_eq!(
            SubscriptionType::Monthly.period_end(start),
            Utc.with_ymd_and_hms(2024, 4, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(
            SubscriptionType::Annual.period_end(start),
            Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn period_end_clamps_short_months() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            SubscriptionType::Monthly.period_end(start),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn subscription_type_parses_lowercase_only() {
        assert_eq!("annual".parse::<SubscriptionType>().ok(), Some(SubscriptionType::Annual));
        assert!("weekly".parse::<SubscriptionType>().is_err());
        assert_eq!(SubscriptionType::Monthly.to_string(), "monthly");
    }

    #[test]
    fn remaining_serializes_number_or_unlimited() {
        assert_eq!(serde_json::to_value(Remaining::compute(3, 1)).unwrap(), 2);
        assert_eq!(serde_json::to_value(Remaining::compute(3, 5)).unwrap(), 0);
        assert_eq!(
            serde_json::to_value(Remaining::compute(UNLIMITED, 500)).unwrap(),
            "unlimited"
        );
    }

    #[test]
    fn fresh_change_zeroes_every_plan_service() {
        let start = Utc::now();
        let services = vec![
            ServiceQuota::new(ServiceName::ModifyCrop, 3, 36),
            ServiceQuota::new(ServiceName::ConvertToJpg, 3, 36),
        ];
        let change = SubscriptionChange::fresh(Uuid::new_v4(), &services, SubscriptionType::Annual, start);

        assert_eq!(change.usage.len(), 2);
        assert!(change.usage.iter().all(|u| u.count == 0 && u.last_reset == start));
        assert_eq!(change.end_date, SubscriptionType::Annual.period_end(start));
    }
}
