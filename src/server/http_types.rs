use crate::domain::{NewPlan, NewServiceQuota, Plan, PlanUpdate, ServiceQuota};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Debug, Validate, ToSchema)]
pub(super) struct ServiceQuotaRequest {
    #[schema(example = "optimize-compress")]
    pub(super) name: String,
    #[validate(range(min = -1))]
    #[schema(example = 10)]
    pub(super) monthly_quota: i64,
    #[validate(range(min = -1))]
    #[schema(example = 120)]
    pub(super) annual_quota: i64,
}

impl From<ServiceQuotaRequest> for NewServiceQuota {
    fn from(req: ServiceQuotaRequest) -> Self {
        Self {
            name: req.name,
            monthly_quota: req.monthly_quota,
            annual_quota: req.annual_quota,
        }
    }
}

#[derive(Deserialize, Debug, Validate, ToSchema)]
pub(super) struct CreatePlanRequest {
    #[validate(length(min = 1))]
    #[schema(example = "Developer")]
    pub(super) name: String,
    #[validate(range(min = 0.0))]
    #[schema(example = 4.99)]
    pub(super) monthly_fee: f64,
    #[validate(range(min = 0.0))]
    #[schema(example = 47.90)]
    pub(super) annual_fee: f64,
    #[serde(default)]
    pub(super) features: Vec<String>,
    #[validate]
    pub(super) services: Vec<ServiceQuotaRequest>,
    pub(super) max_images: Option<i64>,
    pub(super) max_file_size_mb: Option<i32>,
    pub(super) max_resolution: Option<String>,
}

impl From<CreatePlanRequest> for NewPlan {
    fn from(req: CreatePlanRequest) -> Self {
        Self {
            name: req.name,
            monthly_fee: req.monthly_fee,
            annual_fee: req.annual_fee,
            features: req.features,
            services: req.services.into_iter().map(Into::into).collect(),
            max_images: req.max_images,
            max_file_size_mb: req.max_file_size_mb,
            max_resolution: req.max_resolution,
        }
    }
}

#[derive(Deserialize, Debug, Default, Validate, ToSchema)]
pub(super) struct UpdatePlanRequest {
    #[validate(range(min = 0.0))]
    pub(super) monthly_fee: Option<f64>,
    #[validate(range(min = 0.0))]
    pub(super) annual_fee: Option<f64>,
    pub(super) features: Option<Vec<String>>,
    pub(super) services: Option<Vec<ServiceQuotaRequest>>,
    pub(super) max_images: Option<i64>,
    pub(super) max_file_size_mb: Option<i32>,
    pub(super) max_resolution: Option<String>,
    pub(super) is_active: Option<bool>,
}

impl From<UpdatePlanRequest> for PlanUpdate {
    fn from(req: UpdatePlanRequest) -> Self {
        Self {
            monthly_fee: req.monthly_fee,
            annual_fee: req.annual_fee,
            features: req.features,
            services: req
                .services
                .map(|services| services.into_iter().map(Into::into).collect()),
            max_images: req.max_images,
            max_file_size_mb: req.max_file_size_mb,
            max_resolution: req.max_resolution,
            is_active: req.is_active,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct RegisterSubscriberRequest {
    pub(super) user_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct SubscribeRequest {
    pub(super) plan_id: Uuid,
    #[schema(example = "monthly")]
    pub(super) subscription_type: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub(super) struct ConsumeRequest {
    #[serde(default = "default_units")]
    #[schema(default = 1, minimum = 1)]
    pub(super) units: i64,
}

impl Default for ConsumeRequest {
    fn default() -> Self {
        Self {
            units: default_units(),
        }
    }
}

pub(super) fn default_units() -> i64 {
    1
}

#[derive(Serialize, ToSchema)]
pub(super) struct ServiceQuotaResponse {
    pub(super) name: String,
    pub(super) monthly_quota: i64,
    pub(super) annual_quota: i64,
}

impl From<ServiceQuota> for ServiceQuotaResponse {
    fn from(entry: ServiceQuota) -> Self {
        Self {
            name: entry.service.to_string(),
            monthly_quota: entry.monthly_quota,
            annual_quota: entry.annual_quota,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct PlanResponse {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) monthly_fee: f64,
    pub(super) annual_fee: f64,
    pub(super) features: Vec<String>,
    pub(super) services: Vec<ServiceQuotaResponse>,
    pub(super) max_images: Option<i64>,
    pub(super) max_file_size_mb: Option<i32>,
    pub(super) max_resolution: Option<String>,
    pub(super) is_active: bool,
    pub(super) created_at: chrono::DateTime<chrono::Utc>,
    pub(super) updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.to_string(),
            monthly_fee: plan.monthly_fee,
            annual_fee: plan.annual_fee,
            features: plan.features,
            services: plan.services.into_iter().map(Into::into).collect(),
            max_images: plan.max_images,
            max_file_size_mb: plan.max_file_size_mb,
            max_resolution: plan.max_resolution,
            is_active: plan.is_active,
            created_at: plan.created_at,
            updated_at: plan.updated_at,
        }
    }
}
