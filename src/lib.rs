//! Quota Ledger
//!
//! Plan catalog, subscriptions and per-service usage quotas for an image-processing platform.
//!
//! Every billable request passes through [`UsageAccountingService::consume`], which charges
//! the subscriber's ledger atomically against the quota of their effective plan.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! quota-ledger-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! When the `server` feature is enabled, this crate can be embedded into a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use quota_ledger::infrastructure::AppConfig;
//! use quota_ledger::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/quota", router(state));
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// HTTP surface lives behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;

#[cfg(feature = "server")]
pub use server::*;
