use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct ChargesConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl ChargesConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("CHARGES_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CHARGES_SERVICE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("CHARGES_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("CHARGES_DATABASE_URL must be set"))?;
        let max_connections = env::var("CHARGES_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("CHARGES_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let log_level = env::var("CHARGES_LOG_LEVEL")
            .unwrap_or_else(|_| "info,charges_service=debug".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: db_url,
                max_connections,
                min_connections,
            },
            service_name: "charges-service".to_string(),
            log_level,
        })
    }
}
