//! Tunables for the scheduler and the event sources.
//!
//! Every struct deserializes with `#[serde(default)]`, so a RON file only
//! needs to name the options it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Write-back policy for the persistence scheduler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Quiescence window: seconds since the last mark before a flush is due.
    pub delay_seconds: f64,
    /// Anti-starvation ceiling: seconds since the first mark.
    pub max_delay_seconds: f64,
    pub max_per_tick: usize,
    pub use_base64_encoding: bool,
    pub enable_checksum: bool,
    /// Embedded payloads larger than this many UTF-8 bytes are dropped.
    pub max_blob_bytes: usize,
    pub write_redundant_variables: bool,
    pub reapply_after_write: bool,
    pub embed_extra: bool,
    /// Ignore dirty marks raised outside an allowed scope.
    pub explicit_only: bool,
    pub owner_id: String,
}

impl PersistenceConfig {
    pub const DEFAULT_DELAY_SECONDS: f64 = 10.0;
    pub const DEFAULT_MAX_DELAY_SECONDS: f64 = 30.0;
    pub const DEFAULT_MAX_PER_TICK: usize = 8;
    pub const DEFAULT_MAX_BLOB_BYTES: usize = 64 * 1024;

    pub fn validate(&self) -> Result<()> {
        if !(self.delay_seconds >= 0.0) {
            return Err(EngineError::OutOfRange(format!(
                "delaySeconds must be non-negative, got {}",
                self.delay_seconds
            )));
        }
        if !(self.max_delay_seconds >= self.delay_seconds) {
            return Err(EngineError::OutOfRange(format!(
                "maxDelaySeconds ({}) must not be below delaySeconds ({})",
                self.max_delay_seconds, self.delay_seconds
            )));
        }
        if self.max_per_tick == 0 {
            return Err(EngineError::OutOfRange("maxPerTick must be at least 1".into()));
        }
        if self.max_blob_bytes == 0 {
            return Err(EngineError::OutOfRange("maxBlobBytes must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            delay_seconds: Self::DEFAULT_DELAY_SECONDS,
            max_delay_seconds: Self::DEFAULT_MAX_DELAY_SECONDS,
            max_per_tick: Self::DEFAULT_MAX_PER_TICK,
            use_base64_encoding: false,
            enable_checksum: false,
            max_blob_bytes: Self::DEFAULT_MAX_BLOB_BYTES,
            write_redundant_variables: false,
            reapply_after_write: false,
            embed_extra: true,
            explicit_only: true,
            owner_id: "default".into(),
        }
    }
}

/// Settings for the hybrid (publish + polling) item event source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventSourceConfig {
    pub enabled: bool,
    /// Only poll while an activity hint is live.
    pub scan_only_when_active: bool,
    pub scan_interval: f64,
    pub chunk_size: usize,
    pub budget_per_tick: usize,
    pub coalesce_window: f64,
    pub external_idle_timeout: f64,
}

impl EventSourceConfig {
    pub const MIN_SCAN_INTERVAL: f64 = 0.25;

    pub fn effective_scan_interval(&self) -> f64 {
        self.scan_interval.max(Self::MIN_SCAN_INTERVAL)
    }

    /// Hard cap on items visited per tick, whatever the chunk size says.
    pub fn step_budget(&self) -> usize {
        self.chunk_size.min(self.budget_per_tick)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_budget() == 0 {
            return Err(EngineError::OutOfRange(
                "chunkSize and budgetPerTick must be at least 1".into(),
            ));
        }
        if !(self.coalesce_window >= 0.0) || !(self.external_idle_timeout >= 0.0) {
            return Err(EngineError::OutOfRange(
                "coalesceWindow and externalIdleTimeout must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_only_when_active: true,
            scan_interval: 0.3,
            chunk_size: 64,
            budget_per_tick: 16,
            coalesce_window: 0.05,
            external_idle_timeout: 2.0,
        }
    }
}

/// Settings for the world-drop scan over items outside every container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldDropConfig {
    pub enabled: bool,
    pub scan_only_when_active: bool,
    pub scan_interval: f64,
    pub chunk_size: usize,
    pub budget_per_tick: usize,
}

impl WorldDropConfig {
    pub const MIN_SCAN_INTERVAL: f64 = 0.5;

    pub fn effective_scan_interval(&self) -> f64 {
        self.scan_interval.max(Self::MIN_SCAN_INTERVAL)
    }

    pub fn step_budget(&self) -> usize {
        self.chunk_size.min(self.budget_per_tick)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_budget() == 0 {
            return Err(EngineError::OutOfRange(
                "world drop chunkSize and budgetPerTick must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for WorldDropConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_only_when_active: true,
            scan_interval: 1.5,
            chunk_size: 96,
            budget_per_tick: 24,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub persistence: PersistenceConfig,
    pub events: EventSourceConfig,
    pub world_drops: WorldDropConfig,
}

impl EngineConfig {
    /// Loads and validates a configuration from a RON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidArgument(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_ron_str(&content)
    }

    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: Self = ron::from_str(content)
            .map_err(|e| EngineError::InvalidArgument(format!("failed to parse config RON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.persistence.validate()?;
        self.events.validate()?;
        self.world_drops.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.persistence.delay_seconds, 10.0);
        assert_eq!(config.persistence.max_delay_seconds, 30.0);
        assert_eq!(config.persistence.max_per_tick, 8);
        assert_eq!(config.persistence.max_blob_bytes, 65536);
        assert!(config.persistence.explicit_only);
        assert!(config.persistence.embed_extra);
        assert_eq!(config.events.step_budget(), 16);
        assert_eq!(config.world_drops.step_budget(), 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_interval_floor() {
        let events = EventSourceConfig {
            scan_interval: 0.01,
            ..Default::default()
        };
        assert_eq!(events.effective_scan_interval(), 0.25);

        let world = WorldDropConfig {
            scan_interval: 0.1,
            ..Default::default()
        };
        assert_eq!(world.effective_scan_interval(), 0.5);
    }

    #[test]
    fn test_load_partial_ron_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "(persistence: (maxPerTick: 4, explicitOnly: false, ownerId: \"player\"), events: (chunkSize: 8))"
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.persistence.max_per_tick, 4);
        assert!(!config.persistence.explicit_only);
        assert_eq!(config.persistence.owner_id, "player");
        assert_eq!(config.persistence.delay_seconds, 10.0);
        assert_eq!(config.events.step_budget(), 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_ron_str("(persistence: (maxPerTick: 0))").unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfRange);

        let err = EngineConfig::from_ron_str(
            "(persistence: (delaySeconds: 40.0, maxDelaySeconds: 30.0))",
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfRange);

        let err = EngineConfig::load_from_file(Path::new("/nonexistent/engine.ron")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
