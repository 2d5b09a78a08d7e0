use crate::application::{PlanCatalogService, SubscriptionService, UsageAccountingService};
use crate::infrastructure::{
    AppConfig, PostgresPaymentRepository, PostgresPlanRepository, PostgresSubscriberRepository,
};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub type PlanCatalogServiceType = PlanCatalogService<PostgresPlanRepository>;

pub type SubscriptionServiceType = SubscriptionService<
    PostgresSubscriberRepository,
    PostgresPlanRepository,
    PostgresPaymentRepository,
>;

pub type UsageAccountingServiceType =
    UsageAccountingService<PostgresSubscriberRepository, PostgresPlanRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<PlanCatalogServiceType>,
    pub subscriptions: Arc<SubscriptionServiceType>,
    pub accounting: Arc<UsageAccountingServiceType>,
    pub admin_token: Arc<str>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let plan_repo = Arc::new(PostgresPlanRepository::new(pool.clone()));
    let subscriber_repo = Arc::new(PostgresSubscriberRepository::new(pool.clone()));
    let payment_repo = Arc::new(PostgresPaymentRepository::new(pool.clone()));

    let catalog = Arc::new(PlanCatalogService::new(plan_repo.clone()));
    if config.seed_default_plans {
        catalog
            .seed_default_plans()
            .await
            .context("seed default plans")?;
    }

    let subscriptions = Arc::new(SubscriptionService::new(
        subscriber_repo.clone(),
        plan_repo.clone(),
        payment_repo,
    ));
    let accounting = Arc::new(UsageAccountingService::new(subscriber_repo, plan_repo));

    Ok(AppState {
        pool,
        catalog,
        subscriptions,
        accounting,
        admin_token: Arc::from(config.admin_token),
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, seeds the catalog and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
