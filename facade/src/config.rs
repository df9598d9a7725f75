//! Dev/test convenience config resolution, mirroring the reference server's
//! `Config::from_env` — not the "config discovery" feature the spec's
//! Non-goals exclude, just an environment-variable convenience constructor
//! on top of the pure `chronos_core::Config` value.

use chronos_core::Config as CoreConfig;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum ObjectStoreBackend {
    Local { root: String },
    S3 { bucket: String, region: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub object_store: ObjectStoreBackend,
    pub core: CoreConfig,
}

impl Config {
    /// Reads `DATABASE_URL`, `OBJECT_STORE_BACKEND` (`local` or `s3`),
    /// `OBJECT_STORE_ROOT`/`OBJECT_STORE_BUCKET`/`OBJECT_STORE_REGION`, and
    /// an optional routing table from `ROUTING_TABLE_JSON`. Logs which keys
    /// were present, never their values.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = require_env("DATABASE_URL")?;

        let backend = std::env::var("OBJECT_STORE_BACKEND").unwrap_or_else(|_| "local".to_string());
        let object_store = match backend.as_str() {
            "local" => ObjectStoreBackend::Local {
                root: std::env::var("OBJECT_STORE_ROOT").unwrap_or_else(|_| "./data/objects".to_string()),
            },
            "s3" => ObjectStoreBackend::S3 {
                bucket: require_env("OBJECT_STORE_BUCKET")?,
                region: std::env::var("OBJECT_STORE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            },
            other => return Err(Error::Config(format!("unknown OBJECT_STORE_BACKEND '{other}'"))),
        };

        let core = match std::env::var("ROUTING_TABLE_JSON") {
            Ok(raw) => {
                tracing::info!("ROUTING_TABLE_JSON present, loading routing table from environment");
                let mut core = CoreConfig::default();
                core.routes = serde_json::from_str(&raw).map_err(|e| Error::Config(format!("invalid ROUTING_TABLE_JSON: {e}")))?;
                core
            }
            Err(_) => {
                tracing::info!("ROUTING_TABLE_JSON absent, starting with an empty routing table");
                CoreConfig::default()
            }
        };

        tracing::info!(
            database_url_present = true,
            object_store_backend = %backend,
            "resolved facade configuration from environment"
        );

        Ok(Self {
            database_url,
            object_store,
            core,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::Config(format!("missing required environment variable {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_reports_the_missing_key() {
        std::env::remove_var("CHRONOS_TEST_MISSING_VAR");
        let err = require_env("CHRONOS_TEST_MISSING_VAR").unwrap_err();
        assert!(err.to_string().contains("CHRONOS_TEST_MISSING_VAR"));
    }
}
