use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,

    // Bearer token for plan administration; empty disables the admin routes.
    pub admin_token: String,

    // Insert the Basic/Developer/Business tiers when the catalog is empty.
    pub seed_default_plans: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("QUOTA").separator("__"))
            .set_default("database_max_connections", 10)?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("admin_token", "")?
            .set_default("seed_default_plans", true)?
            .build()?;

        config.try_deserialize()
    }
}
