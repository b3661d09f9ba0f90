use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

use crate::domain::Location;

/// Largest accepted value for any `*_secs` setting (ten years)
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Seconds setting as a duration, clamped to [`MAX_INTERVAL_SECS`]
pub fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_INTERVAL_SECS) as i64)
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub holds: HoldsConfig,
    #[serde(default)]
    pub pathfinding: PathfindingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6322
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Accepted values of the `X-Api-Key` header
    #[serde(default)]
    pub api_keys: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    /// Seconds without a heartbeat before an agent counts as stale
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

fn default_heartbeat_timeout() -> u64 {
    30
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationsConfig {
    /// Maximum number of pending operations
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Waiting this long promotes a pending operation by one priority class
    #[serde(default = "default_aging_interval")]
    pub aging_interval_secs: u64,
    /// Completed operations remembered for late or repeated reports
    #[serde(default = "default_completed_history")]
    pub completed_history: usize,
}

fn default_max_pending() -> usize {
    10_000
}

fn default_aging_interval() -> u64 {
    60
}

fn default_completed_history() -> usize {
    1024
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            aging_interval_secs: default_aging_interval(),
            completed_history: default_completed_history(),
        }
    }
}

/// A storage inventory whose slots are seeded into the hold pool at startup
#[derive(Debug, Clone, Deserialize)]
pub struct HoldPoolEntry {
    pub location: Location,
    pub slots: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldsConfig {
    /// Seconds an agent may own a hold before it is reclaimed
    #[serde(default = "default_hold_expiration")]
    pub expiration_secs: u64,
    /// Statically configured inventories
    #[serde(default)]
    pub pool: Vec<HoldPoolEntry>,
}

fn default_hold_expiration() -> u64 {
    300
}

impl Default for HoldsConfig {
    fn default() -> Self {
        Self {
            expiration_secs: default_hold_expiration(),
            pool: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathfindingConfig {
    /// Cost of an edge joining nodes in different dimensions (a portal hop)
    #[serde(default = "default_portal_cost")]
    pub portal_cost: f64,
    /// Farthest a start/end point may be from its nearest node
    #[serde(default = "default_max_free_space_distance")]
    pub max_free_space_distance: f64,
}

fn default_portal_cost() -> f64 {
    8.0
}

fn default_max_free_space_distance() -> f64 {
    256.0
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            portal_cost: default_portal_cost(),
            max_free_space_distance: default_max_free_space_distance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Background service tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Seconds before a scanned pool inventory is scanned again
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,
    /// Queue moves that merge partial stacks of the same item
    #[serde(default = "default_true")]
    pub defrag_enabled: bool,
    /// Items that fit in one slot
    #[serde(default = "default_stack_size")]
    pub stack_size: u32,
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_rescan_interval() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_stack_size() -> u32 {
    64
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            rescan_interval_secs: default_rescan_interval(),
            defrag_enabled: true,
            stack_size: default_stack_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info` or `info,fleet_operator=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rotating log file; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info,fleet_operator=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info,fleet_operator=debug")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("OPERATOR_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // OPERATOR__SERVER__PORT, OPERATOR__AUTH__API_KEYS=<uuid>,<uuid>, ...
            .add_source(
                Environment::with_prefix("OPERATOR")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.api_keys"),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.auth.api_keys.is_empty() {
            errors.push("auth.api_keys must list at least one key".to_string());
        }

        if self.agents.heartbeat_timeout_secs == 0 {
            errors.push("agents.heartbeat_timeout_secs must be positive".to_string());
        }

        if self.operations.max_pending == 0 {
            errors.push("operations.max_pending must be positive".to_string());
        }

        if self.operations.aging_interval_secs == 0 {
            errors.push("operations.aging_interval_secs must be positive".to_string());
        }

        if self.holds.expiration_secs == 0 {
            errors.push("holds.expiration_secs must be positive".to_string());
        }

        for (idx, entry) in self.holds.pool.iter().enumerate() {
            if entry.slots == 0 {
                errors.push(format!(
                    "holds.pool[{idx}] at {} declares zero slots",
                    entry.location
                ));
            }
        }

        let portal = self.pathfinding.portal_cost;
        if !portal.is_finite() || portal < 0.0 {
            errors.push(format!(
                "pathfinding.portal_cost must be finite and non-negative, got {portal}"
            ));
        }

        let reach = self.pathfinding.max_free_space_distance;
        if !reach.is_finite() || reach <= 0.0 {
            errors.push(format!(
                "pathfinding.max_free_space_distance must be finite and positive, got {reach}"
            ));
        }

        if self.services.tick_interval_ms == 0 {
            errors.push("services.tick_interval_ms must be positive".to_string());
        }

        if self.services.stack_size == 0 {
            errors.push("services.stack_size must be positive".to_string());
        }

        for (key, value) in [
            ("agents.heartbeat_timeout_secs", self.agents.heartbeat_timeout_secs),
            ("operations.aging_interval_secs", self.operations.aging_interval_secs),
            ("holds.expiration_secs", self.holds.expiration_secs),
            ("services.rescan_interval_secs", self.services.rescan_interval_secs),
        ] {
            if value > MAX_INTERVAL_SECS {
                errors.push(format!("{key} must be at most {MAX_INTERVAL_SECS}, got {value}"));
            }
        }

        if self.services.tick_interval_ms > MAX_INTERVAL_SECS * 1000 {
            errors.push(format!(
                "services.tick_interval_ms must be at most {}",
                MAX_INTERVAL_SECS * 1000
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimension, Vec3};

    fn valid_config() -> AppConfig {
        AppConfig {
            auth: AuthConfig {
                api_keys: vec![Uuid::from_u128(42)],
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 6322);
        assert_eq!(config.agents.heartbeat_timeout_secs, 30);
        assert_eq!(config.holds.expiration_secs, 300);
        assert_eq!(config.services.tick_interval_ms, 1000);
        assert_eq!(config.services.stack_size, 64);
        assert_eq!(config.logging.level, "info,fleet_operator=debug");
    }

    #[test]
    fn test_huge_intervals_are_rejected_and_clamped() {
        let mut config = valid_config();
        config.agents.heartbeat_timeout_secs = u64::MAX;
        config.holds.expiration_secs = u64::MAX;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("heartbeat_timeout_secs")));

        assert_eq!(secs(u64::MAX), secs(MAX_INTERVAL_SECS));
        assert_eq!(secs(30), Duration::seconds(30));
    }

    #[test]
    fn test_validate_accepts_defaults_with_a_key() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AppConfig::default();
        config.pathfinding.portal_cost = f64::NAN;
        config.holds.pool.push(HoldPoolEntry {
            location: Location::new(Dimension::Overworld, Vec3::new(0, 64, 0)),
            slots: 0,
        });

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("api_keys")));
        assert!(errors.iter().any(|e| e.contains("portal_cost")));
        assert!(errors.iter().any(|e| e.contains("zero slots")));
    }

    #[test]
    fn test_pool_entry_deserializes_from_toml_shape() {
        let raw = r#"{ "location": { "vec3": { "x": 1, "y": 70, "z": 2 }, "dim": "Overworld" }, "slots": 27 }"#;
        let entry: HoldPoolEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.slots, 27);
        assert_eq!(entry.location.vec3.y, 70);
    }
}
