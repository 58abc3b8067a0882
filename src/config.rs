use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "obligation_transfer.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            protocol: ProtocolConfig::default(),
        }
    }
}

/// Protocol host settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Swap fresh pseudonyms before issuing or transferring
    #[serde(default = "default_anonymous")]
    pub anonymous: bool,
    /// Limit on every session receive. Never applies to the commit wait.
    #[serde(default)]
    pub session_timeout_ms: Option<u64>,
    /// Limit on a whole responder run, commit wait included
    #[serde(default)]
    pub flow_timeout_ms: Option<u64>,
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

fn default_anonymous() -> bool {
    true
}

fn default_session_buffer() -> usize {
    16
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            anonymous: default_anonymous(),
            session_timeout_ms: None,
            flow_timeout_ms: None,
            session_buffer: default_session_buffer(),
        }
    }
}

impl ProtocolConfig {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }

    pub fn flow_timeout(&self) -> Option<Duration> {
        self.flow_timeout_ms.map(Duration::from_millis)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_defaults_applied() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: node.log
use_json: true
rotation: never
protocol:
  session_timeout_ms: 2500
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.protocol.anonymous);
        assert_eq!(config.protocol.session_buffer, 16);
        assert_eq!(
            config.protocol.session_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.protocol.flow_timeout(), None);
    }

    #[test]
    fn test_missing_protocol_section() {
        let yaml = "log_level: info\nlog_dir: ./logs\nlog_file: a.log\nuse_json: false\nrotation: daily\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.protocol, ProtocolConfig::default());
    }

    #[test]
    fn test_shipped_configs_bound_responder_runs() {
        for env in ["dev", "prod"] {
            let config = AppConfig::load(env).unwrap();
            let flow = config.protocol.flow_timeout().unwrap();
            let session = config.protocol.session_timeout().unwrap();
            assert!(flow > session, "{env}: flow timeout must exceed session timeout");
        }
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
