//! Server configuration types.
//!
//! Listener address, port and Pingora worker thread count. Default values
//! are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_THREADS;

// Default worker thread count
fn default_threads() -> usize {
    DEFAULT_THREADS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Number of worker threads (default: 4)
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("server.address cannot be empty".to_string());
        }
        if self.threads == 0 {
            return Err("server.threads must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_deserialize_defaults() {
        let yaml = r#"
address: "127.0.0.1"
port: 8080
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_server_config_threads_custom_value() {
        let yaml = r#"
address: "0.0.0.0"
port: 9090
threads: 16
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.threads, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = ServerConfig {
            address: "0.0.0.0".to_string(),
            port: 8080,
            threads: 0,
        };
        assert!(config.validate().is_err());
    }
}
