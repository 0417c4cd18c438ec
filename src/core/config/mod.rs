use anyhow::{anyhow, Context};
use log::warn;

const DEV_JWT_SECRET: &str = "crmserver-development-secret-change-me-now";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(anyhow!("Unknown CRM_STORE backend: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub crm: CrmConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub store: StoreBackend,
    pub quote_valid_days: i64,
    pub invoice_due_days: i64,
}

fn get_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn get_parsed<T>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value for {key}: {e}")),
        _ => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let store = match std::env::var("CRM_STORE") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ if database_url.is_some() => StoreBackend::Postgres,
            _ => StoreBackend::Memory,
        };
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL is required when CRM_STORE=postgres"));
        }

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let config = AppConfig {
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: get_parsed("SERVER_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: database_url,
                pool_size: get_parsed("DATABASE_POOL_SIZE", 10)?,
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_issuer: get_str("JWT_ISSUER", "crmserver"),
            },
            crm: CrmConfig {
                store,
                quote_valid_days: get_parsed("QUOTE_VALID_DAYS", 30)?,
                invoice_due_days: get_parsed("INVOICE_DUE_DAYS", 30)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.crm.quote_valid_days < 1 {
            return Err(anyhow!("QUOTE_VALID_DAYS must be at least 1"));
        }
        if self.crm.invoice_due_days < 0 {
            return Err(anyhow!("INVOICE_DUE_DAYS must not be negative"));
        }
        if self.database.pool_size == 0 {
            return Err(anyhow!("DATABASE_POOL_SIZE must be at least 1"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<std::net::SocketAddr, anyhow::Error> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.server.host, self.server.port))
    }
}

/// In-process defaults used by tests and local runs.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                pool_size: 10,
            },
            auth: AuthConfig {
                jwt_secret: DEV_JWT_SECRET.to_string(),
                jwt_issuer: "crmserver".to_string(),
            },
            crm: CrmConfig {
                store: StoreBackend::Memory,
                quote_valid_days: 30,
                invoice_due_days: 30,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address().unwrap().port(), 8080);
    }

    #[test]
    fn test_validate_rejects_zero_quote_validity() {
        let mut config = AppConfig::default();
        config.crm.quote_valid_days = 0;
        assert!(config.validate().is_err());
    }
}
