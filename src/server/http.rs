use super::http_auth::is_admin_authorized;
use super::http_errors::{map_catalog_error, map_subscription_error, map_usage_error};
use super::http_parse::{allowed_service_names, parse_consume_body, parse_service_name};
use super::http_types::{
    ConsumeRequest, CreatePlanRequest, HealthResponse, PlanResponse, RegisterSubscriberRequest,
    ServiceQuotaRequest, ServiceQuotaResponse, SubscribeRequest, UpdatePlanRequest,
};
use super::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/plans", get(list_plans).post(create_plan))
        .route(
            "/plans/:id",
            get(get_plan).patch(update_plan).delete(deactivate_plan),
        )
        .route("/subscribers", post(register_subscriber))
        .route(
            "/subscribers/:id/subscription",
            get(get_subscription).post(subscribe),
        )
        .route("/subscribers/:id/subscription/cancel", post(cancel_subscription))
        .route(
            "/subscribers/:id/usage/:service",
            get(check_usage).post(consume_usage),
        )
        .route("/subscribers/:id/stats", get(get_stats))
        .route("/subscribers/:id/payments", get(list_payments))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({"error": "Missing or invalid admin token"})),
    )
}

fn unknown_service(service: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": format!("Invalid service: {}", service),
            "allowed": allowed_service_names(),
        })),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        list_plans,
        get_plan,
        create_plan,
        update_plan,
        deactivate_plan,
        register_subscriber,
        get_subscription,
        subscribe,
        cancel_subscription,
        check_usage,
        consume_usage,
        get_stats,
        list_payments,
    ),
    components(
        schemas(
            HealthResponse,
            CreatePlanRequest,
            UpdatePlanRequest,
            ServiceQuotaRequest,
            ServiceQuotaResponse,
            PlanResponse,
            RegisterSubscriberRequest,
            SubscribeRequest,
            ConsumeRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Plans", description = "Plan catalog endpoints"),
        (name = "Subscriptions", description = "Subscription lifecycle endpoints"),
        (name = "Usage", description = "Quota and usage accounting endpoints"),
    ),
    info(
        title = "Quota Ledger API",
        version = "0.1.0",
        description = "Plan catalog, subscriptions and per-service usage quotas",
        license(name = "MIT")
    )
)]
struct ApiDoc;

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// List every plan, active or not
#[utoipa::path(
    get,
    path = "/plans",
    tag = "Plans",
    responses(
        (status = 200, description = "All plans", body = [PlanResponse]),
        (status = 500, description = "Failed to fetch plans", body = Object)
    )
)]
async fn list_plans(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.list_plans().await {
        Ok(plans) => {
            let plans: Vec<PlanResponse> = plans.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(plans)))
        }
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/plans/{id}",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan found", body = PlanResponse),
        (status = 404, description = "Plan not found", body = Object)
    )
)]
async fn get_plan(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.catalog.get_plan(id).await {
        Ok(plan) => (StatusCode::OK, Json(serde_json::json!(PlanResponse::from(plan)))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

/// Create a plan (admin)
#[utoipa::path(
    post,
    path = "/plans",
    tag = "Plans",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, description = "Plan created", body = PlanResponse),
        (status = 400, description = "Invalid plan name, service or fee", body = Object),
        (status = 401, description = "Missing or invalid admin token", body = Object)
    )
)]
async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePlanRequest>,
) -> impl IntoResponse {
    if !is_admin_authorized(&headers, &state.admin_token) {
        return unauthorized();
    }

    if let Err(errors) = req.validate() {
        warn!(errors = ?errors, "Plan request validation failed");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid plan", "details": errors})),
        );
    }

    match state.catalog.create_plan(req.into()).await {
        Ok(plan) => (StatusCode::CREATED, Json(serde_json::json!(PlanResponse::from(plan)))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

/// Merge fields into a plan (admin)
#[utoipa::path(
    patch,
    path = "/plans/{id}",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Plan ID")),
    request_body = UpdatePlanRequest,
    responses(
        (status = 200, description = "Plan updated", body = PlanResponse),
        (status = 400, description = "Invalid field values", body = Object),
        (status = 401, description = "Missing or invalid admin token", body = Object),
        (status = 404, description = "Plan not found", body = Object)
    )
)]
async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdatePlanRequest>,
) -> impl IntoResponse {
    if !is_admin_authorized(&headers, &state.admin_token) {
        return unauthorized();
    }

    if let Err(errors) = req.validate() {
        warn!(errors = ?errors, "Plan update validation failed");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid plan update", "details": errors})),
        );
    }

    match state.catalog.update_plan(id, req.into()).await {
        Ok(plan) => (StatusCode::OK, Json(serde_json::json!(PlanResponse::from(plan)))),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

/// Deactivate a plan (admin, soft delete)
#[utoipa::path(
    delete,
    path = "/plans/{id}",
    tag = "Plans",
    params(("id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan deactivated", body = Object),
        (status = 401, description = "Missing or invalid admin token", body = Object),
        (status = 404, description = "Plan not found", body = Object)
    )
)]
async fn deactivate_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !is_admin_authorized(&headers, &state.admin_token) {
        return unauthorized();
    }

    match state.catalog.deactivate_plan(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"message": "Plan deactivated successfully"})),
        ),
        Err(e) => {
            let (status, body) = map_catalog_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/subscribers",
    tag = "Subscriptions",
    request_body = RegisterSubscriberRequest,
    responses(
        (status = 201, description = "Subscriber registered (or already known)", body = Object),
        (status = 500, description = "Failed to register subscriber", body = Object)
    )
)]
async fn register_subscriber(
    State(state): State<AppState>,
    Json(req): Json<RegisterSubscriberRequest>,
) -> impl IntoResponse {
    match state.subscriptions.register(req.user_id).await {
        Ok(subscriber) => (StatusCode::CREATED, Json(serde_json::json!(subscriber))),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/subscribers/{id}/subscription",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Subscriber and plan; plan is null when never subscribed", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn get_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions.subscription_status(id).await {
        Ok(view) => (StatusCode::OK, Json(serde_json::json!({"subscription": view}))),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

/// Subscribe to a plan, resetting the usage ledger
#[utoipa::path(
    post,
    path = "/subscribers/{id}/subscription",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = Object),
        (status = 400, description = "Invalid subscription type or inactive plan", body = Object),
        (status = 404, description = "Plan or user not found", body = Object)
    )
)]
async fn subscribe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubscribeRequest>,
) -> impl IntoResponse {
    match state
        .subscriptions
        .subscribe(id, req.plan_id, &req.subscription_type)
        .await
    {
        Ok(view) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Successfully subscribed to plan",
                "subscription": view,
            })),
        ),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/subscribers/{id}/subscription/cancel",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Subscription cancelled", body = Object),
        (status = 400, description = "No active subscription", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn cancel_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions.cancel(id).await {
        Ok(subscriber) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Subscription cancelled successfully",
                "subscriber": subscriber,
            })),
        ),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

/// Read a service's usage without consuming quota
#[utoipa::path(
    get,
    path = "/subscribers/{id}/usage/{service}",
    tag = "Usage",
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ("service" = String, Path, description = "Service name, e.g. optimize-compress")
    ),
    responses(
        (status = 200, description = "Used, quota and remaining", body = Object),
        (status = 400, description = "Unknown service name", body = Object),
        (status = 403, description = "Service not offered by the plan", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn check_usage(
    State(state): State<AppState>,
    Path((id, service)): Path<(Uuid, String)>,
) -> impl IntoResponse {
    let Some(service_name) = parse_service_name(&service) else {
        return unknown_service(&service);
    };

    match state.accounting.check_usage(id, service_name).await {
        Ok(snapshot) => (StatusCode::OK, Json(serde_json::json!(snapshot))),
        Err(e) => {
            let (status, body) = map_usage_error(&e);
            (status, Json(body))
        }
    }
}

/// Charge units against a service quota before doing the work
#[utoipa::path(
    post,
    path = "/subscribers/{id}/usage/{service}",
    tag = "Usage",
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ("service" = String, Path, description = "Service name, e.g. optimize-compress")
    ),
    request_body(content = ConsumeRequest, description = "Units to charge; defaults to 1"),
    responses(
        (status = 200, description = "Usage recorded", body = Object),
        (status = 400, description = "Unknown service, invalid units or malformed body", body = Object),
        (status = 403, description = "Quota exceeded or service not offered", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn consume_usage(
    State(state): State<AppState>,
    Path((id, service)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(service_name) = parse_service_name(&service) else {
        return unknown_service(&service);
    };
    let req = match parse_consume_body(&headers, &body) {
        Ok(req) => req,
        Err(msg) => {
            warn!(user_id = %id, service = %service_name, error = %msg, "Rejected consume body");
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": msg })));
        }
    };

    match state.accounting.consume(id, service_name, req.units).await {
        Ok(receipt) => {
            info!(user_id = %id, service = %service_name, used = receipt.used, "Usage tracked");
            (StatusCode::OK, Json(serde_json::json!(receipt)))
        }
        Err(e) => {
            let (status, body) = map_usage_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/subscribers/{id}/stats",
    tag = "Usage",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Images processed and remaining", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn get_stats(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.accounting.stats(id).await {
        Ok(stats) => (StatusCode::OK, Json(serde_json::json!(stats))),
        Err(e) => {
            let (status, body) = map_usage_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/subscribers/{id}/payments",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Payment history, newest first", body = Object),
        (status = 404, description = "User not found", body = Object)
    )
)]
async fn list_payments(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions.payment_history(id).await {
        Ok(payments) => (StatusCode::OK, Json(serde_json::json!(payments))),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}
