use config::{Config, ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;
use std::path::PathBuf;

use crate::decode::BooleanPolicy;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub boolean_policy: BooleanPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Self::from_env(Environment::default())
    }

    fn from_env(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("database_url", "db.sqlite3")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 5000)?
            .set_default("model_path", "model.onnx")?
            .set_default("boolean_policy", "literal")?
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    /// SQLite file path with any `sqlite://` scheme removed.
    pub fn database_path(&self) -> &str {
        let url = self.database_url.as_str();
        url.strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
