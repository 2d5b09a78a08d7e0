pub mod config;
pub mod postgres_payment_repo;
pub mod postgres_subscriber_repo;
pub mod repository;

pub use config::*;
pub use postgres_payment_repo::*;
pub use postgres_subscriber_repo::*;
pub use repository::*;
