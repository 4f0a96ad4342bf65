use crate::codec::MAX_PAYLOAD;
use crate::crypto::CipherKind;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_ENCRYPT_TYPE: &str = "aes";

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_encrypt_type() -> String {
    DEFAULT_ENCRYPT_TYPE.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation: {0}")]
    Validation(String),
}

/// ClientConfig configures the local SOCKS proxy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub server_address: String,
    pub server_port_list: Vec<u16>,
    #[serde(default)]
    pub local_dns_resolve: bool,
    pub private_key: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_encrypt_type")]
    pub encrypt_type: String,
    pub secret: String,
}

/// ServerConfig configures the relay
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub listen_address: String,
    pub listen_port_list: Vec<u16>,
    pub private_key_list: Vec<String>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_encrypt_type")]
    pub encrypt_type: String,
    pub secret: String,
}

/// ClientConfig implementation block
impl ClientConfig {
    /// load reads, parses and validates a client configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::Validation("listenAddress is empty".into()));
        }
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::Validation("serverAddress is empty".into()));
        }
        if self.server_port_list.is_empty() {
            return Err(ConfigError::Validation(
                "serverPortList must name at least one port".into(),
            ));
        }
        if self.server_port_list.contains(&0) {
            return Err(ConfigError::Validation(
                "serverPortList must not contain port 0".into(),
            ));
        }
        if self.private_key.is_empty() {
            return Err(ConfigError::Validation("privateKey is empty".into()));
        }
        validate_common(self.buffer_size, &self.encrypt_type, &self.secret)
    }
}

/// ServerConfig implementation block
impl ServerConfig {
    /// load reads, parses and validates a server configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.trim().is_empty() {
            return Err(ConfigError::Validation("listenAddress is empty".into()));
        }
        if self.listen_port_list.is_empty() {
            return Err(ConfigError::Validation(
                "listenPortList must name at least one port".into(),
            ));
        }
        if self.private_key_list.is_empty() {
            return Err(ConfigError::Validation(
                "privateKeyList must hold at least one key".into(),
            ));
        }
        if self.private_key_list.iter().any(String::is_empty) {
            return Err(ConfigError::Validation(
                "privateKeyList contains an empty key".into(),
            ));
        }
        validate_common(self.buffer_size, &self.encrypt_type, &self.secret)
    }
}

fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn validate_common(buffer_size: usize, encrypt_type: &str, secret: &str) -> Result<(), ConfigError> {
    if buffer_size == 0 || buffer_size > MAX_PAYLOAD {
        return Err(ConfigError::Validation(format!(
            "bufferSize must be 1..={}",
            MAX_PAYLOAD
        )));
    }
    if encrypt_type.parse::<CipherKind>().is_err() {
        return Err(ConfigError::Validation(format!(
            "encryptType '{}' must be one of: plain, rc4, aes",
            encrypt_type
        )));
    }
    if secret.is_empty() {
        return Err(ConfigError::Validation("secret is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: &str = r#"{
        "listenAddress": "127.0.0.1",
        "listenPort": 1080,
        "serverAddress": "relay.example.com",
        "serverPortList": [9001, 9002],
        "privateKey": "hikari",
        "secret": "shared"
    }"#;

    const SERVER: &str = r#"{
        "listenAddress": "0.0.0.0",
        "listenPortList": [9001, 9002],
        "privateKeyList": ["hikari", "other"],
        "bufferSize": 8192,
        "encryptType": "rc4",
        "secret": "shared"
    }"#;

    #[test]
    fn client_defaults() {
        let config: ClientConfig = serde_json::from_str(CLIENT).unwrap();
        config.validate().unwrap();

        assert!(!config.local_dns_resolve);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.encrypt_type, "aes");
        assert_eq!(config.server_port_list, vec![9001, 9002]);
    }

    #[test]
    fn server_parses() {
        let config: ServerConfig = serde_json::from_str(SERVER).unwrap();
        config.validate().unwrap();

        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.encrypt_type, "rc4");
        assert_eq!(config.private_key_list.len(), 2);
    }

    #[test]
    fn rejects_bad_values() {
        let base: ClientConfig = serde_json::from_str(CLIENT).unwrap();

        let mut config = base.clone();
        config.server_port_list = vec![];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = base.clone();
        config.server_port_list = vec![9001, 0];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = base.clone();
        config.buffer_size = MAX_PAYLOAD + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = base.clone();
        config.encrypt_type = "des".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = base;
        config.secret = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn server_needs_keys() {
        let mut config: ServerConfig = serde_json::from_str(SERVER).unwrap();
        config.private_key_list.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        let result = ClientConfig::load("/nonexistent/hikari-client.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!("hikari-server-{}.json", std::process::id()));
        fs::write(&path, SERVER).unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.listen_port_list, vec![9001, 9002]);

        fs::remove_file(&path).unwrap();
    }
}
