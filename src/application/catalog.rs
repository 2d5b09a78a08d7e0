use crate::domain::{NewPlan, Plan, PlanUpdate, PlanValidationError};
use crate::infrastructure::{PlanRepository, RepositoryError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] PlanValidationError),
    #[error("Plan not found: {0}")]
    NotFound(Uuid),
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => CatalogError::Validation(msg),
            other => CatalogError::Repository(other),
        }
    }
}

pub struct PlanCatalogService<P>
where
    P: PlanRepository,
{
    plan_repo: Arc<P>,
}

impl<P> PlanCatalogService<P>
where
    P: PlanRepository,
{
    pub fn new(plan_repo: Arc<P>) -> Self {
        Self { plan_repo }
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>, CatalogError> {
        Ok(self.plan_repo.list().await?)
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<Plan, CatalogError> {
        self.plan_repo.get_by_id(id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => CatalogError::NotFound(id),
            other => other.into(),
        })
    }

    pub async fn create_plan(&self, new_plan: NewPlan) -> Result<Plan, CatalogError> {
        let plan = Plan::from_new(new_plan)?;
        self.plan_repo.create(&plan).await?;

        info!(plan_id = %plan.id, name = %plan.name, "Created plan");
        Ok(plan)
    }

    pub async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> Result<Plan, CatalogError> {
        let mut plan = self.get_plan(id).await?;
        plan.apply(update)?;

        self.plan_repo.update(&plan).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => CatalogError::NotFound(id),
            other => other.into(),
        })?;

        info!(plan_id = %id, "Updated plan");
        Ok(plan)
    }

    /// Soft delete. Subscribers already on the plan keep using it.
    pub async fn deactivate_plan(&self, id: Uuid) -> Result<(), CatalogError> {
        self.plan_repo.set_active(id, false).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => CatalogError::NotFound(id),
            other => other.into(),
        })?;

        info!(plan_id = %id, "Deactivated plan");
        Ok(())
    }

    /// Seeds Basic, Developer and Business when the catalog is empty.
    /// Safe to call on every startup.
    pub async fn seed_default_plans(&self) -> Result<bool, CatalogError> {
        let seeded = self.plan_repo.seed_if_empty(&Plan::default_catalog()).await?;
        if seeded {
            info!("Seeded default plan catalog");
        } else {
            info!("Plan catalog already populated, skipping seed");
        }
        Ok(seeded)
    }
}
