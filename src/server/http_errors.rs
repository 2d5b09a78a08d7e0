use crate::application::{CatalogError, SubscriptionError, UsageError};
use crate::infrastructure::RepositoryError;
use axum::http::StatusCode;
use tracing::error;

pub(super) fn map_catalog_error(err: &CatalogError) -> (StatusCode, serde_json::Value) {
    match err {
        CatalogError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        CatalogError::InvalidPlan(e) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": e.to_string() }))
        }
        CatalogError::NotFound(_) | CatalogError::Repository(RepositoryError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": "Plan not found" }))
        }
        CatalogError::Repository(e) => {
            error!(error = %e, "Plan catalog operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Plan catalog operation failed" }),
            )
        }
    }
}

pub(super) fn map_subscription_error(err: &SubscriptionError) -> (StatusCode, serde_json::Value) {
    match err {
        SubscriptionError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        SubscriptionError::NotFound(what) => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": format!("{} not found", what) }))
        }
        SubscriptionError::NoActiveSubscription(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "No active subscription found" }),
        ),
        SubscriptionError::Repository(e) => {
            error!(error = %e, "Subscription operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Subscription operation failed" }),
            )
        }
    }
}

pub(super) fn map_usage_error(err: &UsageError) -> (StatusCode, serde_json::Value) {
    match err {
        UsageError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        UsageError::NotFound(_) => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": "User not found" }))
        }
        UsageError::ServiceNotOffered { service, plan } => (
            StatusCode::FORBIDDEN,
            serde_json::json!({
                "error": "Service not available in current plan",
                "service": service,
                "plan": plan,
            }),
        ),
        UsageError::QuotaExceeded {
            service,
            used,
            quota,
            requested,
        } => (
            StatusCode::FORBIDDEN,
            serde_json::json!({
                "error": "Quota exceeded for this service",
                "service": service,
                "used": used,
                "quota": quota,
                "requested": requested,
                "remaining": err.remaining(),
            }),
        ),
        UsageError::Repository(RepositoryError::Conflict(msg)) => {
            (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
        }
        UsageError::Repository(e) => {
            error!(error = %e, "Usage accounting failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Failed to track usage" }),
            )
        }
    }
}
