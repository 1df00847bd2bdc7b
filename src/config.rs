use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: IpAddr,
    pub storage_backend: StorageBackend,
    /// Required when `storage_backend` is `Sqlite`.
    pub database_path: Option<String>,
    pub load_sample_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let bind_addr = env_map
            .get("BIND_ADDR")
            .map(|s| s.as_str())
            .unwrap_or("127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "BIND_ADDR".to_string(),
                    "must be an IPv4 or IPv6 address".to_string(),
                )
            })?;

        let storage_backend = match env_map
            .get("STORAGE_BACKEND")
            .map(|s| s.as_str())
            .unwrap_or("sqlite")
        {
            "sqlite" => StorageBackend::Sqlite,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("must be sqlite or memory, got {}", other),
                ))
            }
        };

        let database_path = match storage_backend {
            StorageBackend::Sqlite => Some(
                env_map
                    .get("DATABASE_PATH")
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?,
            ),
            StorageBackend::Memory => env_map.get("DATABASE_PATH").cloned(),
        };

        let load_sample_data = parse_bool(&env_map, "LOAD_SAMPLE_DATA", false)?;

        Ok(Config {
            port,
            bind_addr,
            storage_backend,
            database_path,
            load_sample_data,
        })
    }
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/ledger.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1");
        assert_eq!(config.storage_backend, StorageBackend::Sqlite);
        assert_eq!(config.database_path.as_deref(), Some("/tmp/ledger.db"));
        assert!(!config.load_sample_data);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_memory_backend_needs_no_database_path() {
        let mut env_map = HashMap::new();
        env_map.insert("STORAGE_BACKEND".to_string(), "memory".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_bind_addr() {
        let mut env_map = setup_required_env();
        env_map.insert("BIND_ADDR".to_string(), "localhost:80".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "BIND_ADDR"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_storage_backend() {
        let mut env_map = setup_required_env();
        env_map.insert("STORAGE_BACKEND".to_string(), "postgres".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "STORAGE_BACKEND"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_load_sample_data_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("LOAD_SAMPLE_DATA".to_string(), "TRUE".to_string());
        assert!(Config::from_env_map(env_map.clone()).unwrap().load_sample_data);

        env_map.insert("LOAD_SAMPLE_DATA".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "LOAD_SAMPLE_DATA"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
