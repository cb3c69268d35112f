//! TriageX core library
//!
//! Rule-based mass-casualty triage: a pure classifier over observed patient
//! factors, plus a service that keeps persisted triage state in step with
//! it and records manual overrides.

pub mod api;
pub mod models;
pub mod service;
pub mod triage;

/// Application configuration
pub mod config {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Config {
        /// Base URL of the persistence REST API.
        pub api_base: String,
    }

    /// Load configuration from files and environment
    pub fn load_config() -> Result<Config, config::ConfigError> {
        // Environment-specific settings override the defaults
        let env = std::env::var("TRIAGEX_ENV").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .set_default("api_base", "http://127.0.0.1:8000/api")?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(config::Environment::with_prefix("TRIAGEX"))
            .build()?
            .try_deserialize()
    }
}
