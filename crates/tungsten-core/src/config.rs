//! Sync host schedule configuration
//!
//! Each periodic host is configured independently: activation sync,
//! orchestration (placement) sync, settings sync, and writer-group sync.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Schedule for one periodic host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSchedule {
    /// Seconds between passes
    pub interval_secs: u64,

    /// Delay before the first pass; immediate when absent
    #[serde(default)]
    pub initial_delay_secs: Option<u64>,
}

impl HostSchedule {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            initial_delay_secs: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Option<Duration> {
        self.initial_delay_secs.map(Duration::from_secs)
    }
}

/// Per-host sync schedules
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Endpoint activation reconciliation (default: 10s)
    #[serde(default = "default_activation_schedule")]
    pub activation: HostSchedule,

    /// Writer-group placement sweep (default: 10s)
    #[serde(default = "default_orchestration_schedule")]
    pub orchestration: HostSchedule,

    /// Agent settings / desired-state push (default: 60s)
    #[serde(default = "default_settings_schedule")]
    pub settings: HostSchedule,

    /// Writer-group state reconciliation (default: 30s)
    #[serde(default = "default_writer_group_schedule")]
    pub writer_group: HostSchedule,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            activation: default_activation_schedule(),
            orchestration: default_orchestration_schedule(),
            settings: default_settings_schedule(),
            writer_group: default_writer_group_schedule(),
        }
    }
}

impl SyncConfig {
    /// Create a sync config from application.yml
    pub fn from_yaml_config(yaml_config: &serde_yaml::Value) -> Self {
        let mut config = Self::default();

        if let Some(sync) = yaml_config.get("tungsten").and_then(|t| t.get("sync")) {
            read_schedule(sync, "activation", &mut config.activation);
            read_schedule(sync, "orchestration", &mut config.orchestration);
            read_schedule(sync, "settings", &mut config.settings);
            read_schedule(sync, "writer_group", &mut config.writer_group);
        }

        config
    }
}

fn read_schedule(sync: &serde_yaml::Value, key: &str, schedule: &mut HostSchedule) {
    if let Some(host) = sync.get(key) {
        if let Some(interval) = host.get("interval_secs").and_then(|v| v.as_u64()) {
            schedule.interval_secs = interval;
        }
        if let Some(delay) = host.get("initial_delay_secs").and_then(|v| v.as_u64()) {
            schedule.initial_delay_secs = Some(delay);
        }
    }
}

// Default functions for serde
fn default_activation_schedule() -> HostSchedule {
    HostSchedule::new(10)
}

fn default_orchestration_schedule() -> HostSchedule {
    HostSchedule::new(10)
}

fn default_settings_schedule() -> HostSchedule {
    HostSchedule::new(60)
}

fn default_writer_group_schedule() -> HostSchedule {
    HostSchedule::new(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.activation.interval(), Duration::from_secs(10));
        assert_eq!(config.orchestration.interval(), Duration::from_secs(10));
        assert_eq!(config.settings.interval(), Duration::from_secs(60));
        assert_eq!(config.writer_group.interval(), Duration::from_secs(30));
        assert!(config.activation.initial_delay().is_none());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml_value = serde_yaml::from_str(
            r#"
            tungsten:
              sync:
                orchestration:
                  interval_secs: 5
                settings:
                  interval_secs: 120
                  initial_delay_secs: 15
            "#,
        )
        .unwrap();
        let config = SyncConfig::from_yaml_config(&yaml_value);
        assert_eq!(config.orchestration.interval_secs, 5);
        assert_eq!(config.settings.interval_secs, 120);
        assert_eq!(config.settings.initial_delay(), Some(Duration::from_secs(15)));
        // Untouched hosts keep their defaults
        assert_eq!(config.activation.interval_secs, 10);
        assert_eq!(config.writer_group.interval_secs, 30);
    }
}
