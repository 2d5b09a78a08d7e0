use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use uuid::Uuid;

/// Quota value meaning "no ceiling".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum PlanName {
    Basic,
    Developer,
    Business,
}

/// Billable operations a plan can grant quota for.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ServiceName {
    OptimizeCompress,
    OptimizeUpscale,
    OptimizeRemoveBackground,
    CreateMeme,
    ModifyResize,
    ModifyCrop,
    ModifyRotate,
    ConvertToJpg,
    ConvertFromJpg,
    ConvertHtmlToImage,
    SecurityWatermark,
    SecurityBlurFace,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceQuota {
    pub service: ServiceName,
    pub monthly_quota: i64,
    pub annual_quota: i64,
}

impl ServiceQuota {
    pub fn new(service: ServiceName, monthly_quota: i64, annual_quota: i64) -> Self {
        Self {
            service,
            monthly_quota,
            annual_quota,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: Uuid,
    pub name: PlanName,
    pub monthly_fee: f64,
    pub annual_fee: f64,
    pub features: Vec<String>,
    pub services: Vec<ServiceQuota>,
    pub max_images: Option<i64>,
    pub max_file_size_mb: Option<i32>,
    pub max_resolution: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new catalog entry.
#[derive(Debug, Clone, Default)]
pub struct NewPlan {
    pub name: String,
    pub monthly_fee: f64,
    pub annual_fee: f64,
    pub features: Vec<String>,
    pub services: Vec<NewServiceQuota>,
    pub max_images: Option<i64>,
    pub max_file_size_mb: Option<i32>,
    pub max_resolution: Option<String>,
}

/// Service entry as submitted by an admin, before the name is checked
/// against [`ServiceName`].
#[derive(Debug, Clone)]
pub struct NewServiceQuota {
    pub name: String,
    pub monthly_quota: i64,
    pub annual_quota: i64,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct PlanUpdate {
    pub monthly_fee: Option<f64>,
    pub annual_fee: Option<f64>,
    pub features: Option<Vec<String>>,
    pub services: Option<Vec<NewServiceQuota>>,
    pub max_images: Option<i64>,
    pub max_file_size_mb: Option<i32>,
    pub max_resolution: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanValidationError {
    #[error("Invalid plan name: {0}")]
    UnknownPlanName(String),
    #[error("Invalid service: {0}")]
    UnknownService(String),
    #[error("Duplicate service: {0}")]
    DuplicateService(ServiceName),
    #[error("Invalid quota {quota} for service {service}")]
    InvalidQuota { service: ServiceName, quota: i64 },
    #[error("Fee must be non-negative, got {0}")]
    NegativeFee(f64),
}

pub fn parse_plan_name(name: &str) -> Result<PlanName, PlanValidationError> {
    name.parse()
        .map_err(|_| PlanValidationError::UnknownPlanName(name.to_string()))
}

/// Checks names, uniqueness and quota bounds of an admin-supplied service table.
pub fn validate_services(
    services: &[NewServiceQuota],
) -> Result<Vec<ServiceQuota>, PlanValidationError> {
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(services.len());

    for entry in services {
        let service: ServiceName = entry
            .name
            .parse()
            .map_err(|_| PlanValidationError::UnknownService(entry.name.clone()))?;

        if !seen.insert(service) {
            return Err(PlanValidationError::DuplicateService(service));
        }

        for quota in [entry.monthly_quota, entry.annual_quota] {
            if quota < UNLIMITED {
                return Err(PlanValidationError::InvalidQuota { service, quota });
            }
        }

        validated.push(ServiceQuota::new(service, entry.monthly_quota, entry.annual_quota));
    }

    Ok(validated)
}

pub fn validate_fee(fee: f64) -> Result<f64, PlanValidationError> {
    if fee.is_finite() && fee >= 0.0 {
        Ok(fee)
    } else {
        Err(PlanValidationError::NegativeFee(fee))
    }
}

impl Plan {
    pub fn new(name: PlanName, monthly_fee: f64, annual_fee: f64, services: Vec<ServiceQuota>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            monthly_fee,
            annual_fee,
            features: Vec::new(),
            services,
            max_images: None,
            max_file_size_mb: None,
            max_resolution: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_new(new_plan: NewPlan) -> Result<Self, PlanValidationError> {
        let name = parse_plan_name(&new_plan.name)?;
        let services = validate_services(&new_plan.services)?;
        let mut plan = Self::new(
            name,
            validate_fee(new_plan.monthly_fee)?,
            validate_fee(new_plan.annual_fee)?,
            services,
        );
        plan.features = new_plan.features;
        plan.max_images = new_plan.max_images;
        plan.max_file_size_mb = new_plan.max_file_size_mb;
        plan.max_resolution = new_plan.max_resolution;
        Ok(plan)
    }

    /// Merges `update` into the plan and stamps `updated_at`.
    pub fn apply(&mut self, update: PlanUpdate) -> Result<(), PlanValidationError> {
        let services = update
            .services
            .as_deref()
            .map(validate_services)
            .transpose()?;
        let monthly_fee = update.monthly_fee.map(validate_fee).transpose()?;
        let annual_fee = update.annual_fee.map(validate_fee).transpose()?;

        if let Some(services) = services {
            self.services = services;
        }
        if let Some(fee) = monthly_fee {
            self.monthly_fee = fee;
        }
        if let Some(fee) = annual_fee {
            self.annual_fee = fee;
        }
        if let Some(features) = update.features {
            self.features = features;
        }
        if update.max_images.is_some() {
            self.max_images = update.max_images;
        }
        if update.max_file_size_mb.is_some() {
            self.max_file_size_mb = update.max_file_size_mb;
        }
        if update.max_resolution.is_some() {
            self.max_resolution = update.max_resolution;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn service(&self, service: ServiceName) -> Option<&ServiceQuota> {
        self.services.iter().find(|s| s.service == service)
    }

    /// The three tiers the catalog is seeded with on an empty database.
    pub fn default_catalog() -> Vec<Plan> {
        let uniform = |monthly: i64, annual: i64| -> Vec<ServiceQuota> {
            ServiceName::iter()
                .map(|s| ServiceQuota::new(s, monthly, annual))
                .collect()
        };

        let mut basic = Plan::new(PlanName::Basic, 0.0, 0.0, uniform(3, 36));
        basic.max_images = Some(10);
        basic.max_file_size_mb = Some(5);
        basic.max_resolution = Some("1920x1080".to_string());

        let mut developer = Plan::new(PlanName::Developer, 4.99, 47.90, uniform(10, 120));
        developer.max_images = Some(100);
        developer.max_file_size_mb = Some(10);
        developer.max_resolution = Some("2560x1440".to_string());

        let mut business = Plan::new(PlanName::Business, 6.99, 67.10, uniform(UNLIMITED, UNLIMITED));
        business.max_images = Some(UNLIMITED);
        business.max_file_size_mb = Some(20);
        business.max_resolution = Some("3840x2160".to_string());

        vec![basic, developer, business]
    }

    /// Basic plan provisioned on demand when a subscriber without a plan
    /// hits the engine and no Basic entry exists yet.
    pub fn fallback_basic() -> Plan {
        Plan::new(
            PlanName::Basic,
            0.0,
            0.0,
            vec![
                ServiceQuota::new(ServiceName::ConvertToJpg, 100, 1000),
                ServiceQuota::new(ServiceName::ConvertFromJpg, 100, 1000),
                ServiceQuota::new(ServiceName::ModifyRotate, 50, 500),
                ServiceQuota::new(ServiceName::OptimizeUpscale, 50, 500),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, monthly: i64, annual: i64) -> NewServiceQuota {
        NewServiceQuota {
            name: name.to_string(),
            monthly_quota: monthly,
            annual_quota: annual,
        }
    }

    #[test]
    fn service_names_use_kebab_case() {
        assert_eq!(ServiceName::OptimizeCompress.to_string(), "optimize-compress");
        assert_eq!(
            "convert-html-to-image".parse::<ServiceName>().ok(),
            Some(ServiceName::ConvertHtmlToImage)
        );
        assert!("convert-video".parse::<ServiceName>().is_err());
    }

    #[test]
    fn default_catalog_covers_every_service() {
        let catalog = Plan::default_catalog();
        assert_eq!(catalog.len(), 3);
        for plan in &catalog {
            assert_eq!(plan.services.len(), ServiceName::iter().count());
            assert!(plan.is_active);
        }

        let business = &catalog[2];
        assert_eq!(business.name, PlanName::Business);
        assert!(business
            .services
            .iter()
            .all(|s| s.monthly_quota == UNLIMITED && s.annual_quota == UNLIMITED));
    }

    #[test]
    fn validate_services_rejects_unknown_and_duplicates() {
        assert_eq!(
            validate_services(&[entry("convert-audio", 1, 1)]),
            Err(PlanValidationError::UnknownService("convert-audio".to_string()))
        );
        assert_eq!(
            validate_services(&[entry("modify-crop", 1, 1), entry("modify-crop", 2, 2)]),
            Err(PlanValidationError::DuplicateService(ServiceName::ModifyCrop))
        );
        assert!(matches!(
            validate_services(&[entry("modify-crop", -2, 1)]),
            Err(PlanValidationError::InvalidQuota { quota: -2, .. })
        ));
    }

    #[test]
    fn from_new_rejects_unknown_tier() {
        let new_plan = NewPlan {
            name: "Enterprise".to_string(),
            ..Default::default()
        };
        assert_eq!(
            Plan::from_new(new_plan),
            Err(PlanValidationError::UnknownPlanName("Enterprise".to_string()))
        );
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut plan = Plan::default_catalog().remove(1);
        let before = plan.clone();

        plan.apply(PlanUpdate {
            monthly_fee: Some(5.99),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(plan.monthly_fee, 5.99);
        assert_eq!(plan.annual_fee, before.annual_fee);
        assert_eq!(plan.services, before.services);
        assert!(plan.updated_at >= before.updated_at);

        assert!(plan
            .apply(PlanUpdate {
                annual_fee: Some(-1.0),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn negative_fee_error_carries_the_value() {
        let err = validate_fee(-0.5).unwrap_err();
        assert_eq!(err, PlanValidationError::NegativeFee(-0.5));
        assert_eq!(err.to_string(), "Fee must be non-negative, got -0.5");
        assert!(validate_fee(f64::NAN).is_err());
    }
}
