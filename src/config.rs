//! Configuration loading (spec.md §6). A `Config` is a plain,
//! serde-deserializable value built once at startup and threaded through
//! component construction explicitly — no component reaches for ambient
//! configuration after start (Design Note "Global state").

use crate::error::{FixError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_begin_string() -> String {
    "FIX.4.4".to_string()
}

fn default_heartbeat_interval() -> u32 {
    30
}

/// One entry in `pipeline_apps`: an identifier a processor registry
/// resolves to a constructed [`crate::processor::Processor`]. The engine
/// does not interpret these strings itself; a caller-supplied registry
/// does (see `client::Engine::build`).
pub type ProcessorId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum MessageStoreConfig {
    Memory,
    File { base_dir: std::path::PathBuf },
}

impl Default for MessageStoreConfig {
    fn default() -> Self {
        MessageStoreConfig::File {
            base_dir: std::path::PathBuf::from("data/journal"),
        }
    }
}

/// Every recognized configuration key from spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u32,
    #[serde(default)]
    pub reset_on_logon: bool,
    #[serde(default = "default_begin_string")]
    pub begin_string: String,
    #[serde(default)]
    pub pipeline_apps: Vec<ProcessorId>,
    #[serde(default)]
    pub message_store: MessageStoreConfig,
    pub connection_name: String,
}

impl Config {
    /// Loads and validates a config from a TOML file. Recognized keys are
    /// listed in spec.md §6; anything missing that has no default is a
    /// configuration error (exit code 3, spec.md §6).
    pub async fn load_toml(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| FixError::InvalidConfig(format!("{}: {e}", path.as_ref().display())))?;
        Self::parse_toml(&text)
    }

    pub fn parse_toml(text: &str) -> Result<Self> {
        let cfg: Config =
            toml::from_str(text).map_err(|e| FixError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse_json(text: &str) -> Result<Self> {
        let cfg: Config =
            serde_json::from_str(text).map_err(|e| FixError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.sender_comp_id.is_empty() {
            return Err(FixError::InvalidConfig("sender_comp_id missing".into()));
        }
        if self.target_comp_id.is_empty() {
            return Err(FixError::InvalidConfig("target_comp_id missing".into()));
        }
        if self.connection_name.is_empty() {
            return Err(FixError::InvalidConfig("connection_name missing".into()));
        }
        if self.heartbeat_interval == 0 {
            return Err(FixError::InvalidConfig(
                "heartbeat_interval must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Path to the persisted session-id file (spec.md §6:
    /// `{connection_name}.sid`).
    pub fn sid_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("{}.sid", self.connection_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let toml = r#"
            host = "127.0.0.1"
            port = 9876
            sender_comp_id = "INITIATOR"
            target_comp_id = "ACCEPTOR"
            connection_name = "demo"
        "#;
        let cfg = Config::parse_toml(toml).unwrap();
        assert_eq!(cfg.heartbeat_interval, 30);
        assert_eq!(cfg.begin_string, "FIX.4.4");
        assert!(!cfg.reset_on_logon);
    }

    #[test]
    fn rejects_missing_required_key() {
        let toml = r#"
            host = "127.0.0.1"
            port = 9876
        "#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn sid_path_is_scoped_by_connection_name() {
        let toml = r#"
            host = "h"
            port = 1
            sender_comp_id = "S"
            target_comp_id = "T"
            connection_name = "demo1"
        "#;
        let cfg = Config::parse_toml(toml).unwrap();
        assert_eq!(cfg.sid_path(), std::path::PathBuf::from("demo1.sid"));
    }
}
