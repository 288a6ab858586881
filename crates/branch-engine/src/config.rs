use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BranchError, Result};
use crate::events::CONFIG;
use crate::logging::{parse_log_level, LoggingConfig};
use crate::rules::CallRuleKind;

/// Branch engine configuration
///
/// Everything here tunes the ambient behaviour of the engine (which call rule
/// is used when a branch names none, how much notification history is kept,
/// what a service point requires of its user). Branch content itself
/// (queues, service points, rules) is never configured here; it arrives
/// through configuration publishing.
///
/// # Examples
///
/// ```
/// use qflow_branch_engine::prelude::{BranchEngineConfig, CallRuleKind};
///
/// let config = BranchEngineConfig::from_toml_str(r#"
///     [rules]
///     default_call_rule = "max_life_time"
///
///     [events]
///     history_size = 50
/// "#).expect("valid configuration");
///
/// assert_eq!(config.rules.default_call_rule, CallRuleKind::MaxLifeTime);
/// assert_eq!(config.events.history_size, 50);
/// assert_eq!(config.general.application_name, "qflow-branch-engine");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchEngineConfig {
    pub general: GeneralConfig,
    pub rules: RulesConfig,
    pub events: EventsConfig,
    pub service_points: ServicePointConfig,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Stamped as `sender_service` on every notification
    pub application_name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            application_name: "qflow-branch-engine".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Call rule for branches that do not name one
    pub default_call_rule: CallRuleKind,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_call_rule: CallRuleKind::MaxWaitingTime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Notifications kept by the in-memory event bus
    pub history_size: usize,
    /// Capacity of the broadcast channel feeding subscribers
    pub broadcast_capacity: usize,
    /// Channels whose notifications are published as critical
    pub critical_channels: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            broadcast_capacity: 1024,
            critical_channels: vec![CONFIG.to_string()],
        }
    }
}

impl EventsConfig {
    pub fn is_critical(&self, channel: &str) -> bool {
        self.critical_channels.iter().any(|c| c == channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePointConfig {
    /// Role the identity provider must confirm before a user opens a point
    pub required_role: Option<String>,
    /// Reason attached to forced logouts on close
    pub logout_reason: String,
}

impl Default for ServicePointConfig {
    fn default() -> Self {
        Self {
            required_role: None,
            logout_reason: "Service point closed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl BranchEngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.general.application_name.trim().is_empty() {
            return Err("application_name cannot be empty".to_string());
        }

        if self.events.history_size == 0 {
            return Err("history_size must be greater than 0".to_string());
        }

        if self.events.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be greater than 0".to_string());
        }

        if let Some(role) = &self.service_points.required_role {
            if role.trim().is_empty() {
                return Err("required_role cannot be blank when set".to_string());
            }
        }

        parse_log_level(&self.logging.level).map_err(|e| e.message().to_string())?;

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| BranchError::configuration(format!("Invalid TOML: {}", e)))?;
        config.validate().map_err(BranchError::configuration)?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BranchError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Logging setup derived from the `[logging]` section
    pub fn logging_config(&self) -> Result<LoggingConfig> {
        let mut config = LoggingConfig::new(
            parse_log_level(&self.logging.level)?,
            self.general.application_name.clone(),
        );
        if self.logging.json {
            config = config.with_json();
        }
        if self.logging.file_info {
            config = config.with_file_info();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BranchEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rules.default_call_rule, CallRuleKind::MaxWaitingTime);
        assert!(config.events.is_critical("config"));
        assert!(!config.events.is_critical("stat"));
    }

    #[test]
    fn test_zero_history_rejected() {
        let mut config = BranchEngineConfig::default();
        config.events.history_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_level_rejected_from_toml() {
        let err = BranchEngineConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, BranchError::Configuration(_)));
    }

    #[test]
    fn test_unknown_call_rule_rejected() {
        let err = BranchEngineConfig::from_toml_str("[rules]\ndefault_call_rule = \"fastest\"\n").unwrap_err();
        assert!(matches!(err, BranchError::Configuration(_)));
    }

    #[test]
    fn test_logging_config_from_section() {
        let config = BranchEngineConfig::from_toml_str(
            "[general]\napplication_name = \"branch-a\"\n[logging]\nlevel = \"debug\"\njson = true\nfile_info = true\n",
        )
        .unwrap();
        let logging = config.logging_config().unwrap();
        assert_eq!(logging.level, tracing::Level::DEBUG);
        assert!(logging.json);
        assert!(logging.file_info);
        assert!(!logging.log_spans);
        assert_eq!(logging.app_name, "branch-a");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = BranchEngineConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, BranchError::Configuration(_)));
    }
}
