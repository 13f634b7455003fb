//! voltgrid.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use voltgrid_canary::RolloutPlan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltConfig {
    pub store: StoreConfig,
    pub fleet: FleetConfig,
    /// Stage ladder, thresholds, and timing. Missing keys fall back to
    /// the default 5/25/50/100 ladder.
    #[serde(default)]
    pub rollout: RolloutPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Deployment record file (one JSON object keyed by deployment id).
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Edge inventory file (edges, baselines, rolling metric windows).
    pub inventory: PathBuf,
}

impl VoltConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VoltConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a voltgrid.toml pointing into `data_dir`, with the
    /// default rollout ladder spelled out for editing.
    pub fn scaffold(data_dir: &Path) -> Self {
        VoltConfig {
            store: StoreConfig {
                path: data_dir.join("deployments.json"),
            },
            fleet: FleetConfig {
                inventory: data_dir.join("fleet.json"),
            },
            rollout: RolloutPlan::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = VoltConfig::scaffold(Path::new("/var/lib/voltgrid"));
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("deployments.json"));
        assert!(toml_str.contains("percentage = 5"));
        assert!(toml_str.contains("min_uptime_percent = 99.9"));

        // The scaffold must parse back to itself.
        let parsed: VoltConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.rollout, config.rollout);
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config_path = dir.path().join("voltgrid.toml");

        let config = VoltConfig::scaffold(&data_dir);
        std::fs::write(&config_path, config.to_toml_string().unwrap()).unwrap();

        let loaded = VoltConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.store.path, data_dir.join("deployments.json"));
        assert_eq!(loaded.fleet.inventory, data_dir.join("fleet.json"));
        assert_eq!(loaded.rollout, config.rollout);

        // A missing file is an error, not an implicit default config.
        assert!(VoltConfig::from_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[store]
path = "/tmp/deployments.json"

[fleet]
inventory = "/tmp/fleet.json"
"#;
        let config: VoltConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/deployments.json"));
        assert_eq!(config.rollout, RolloutPlan::default());
    }

    #[test]
    fn test_rollout_overrides() {
        let toml_str = r#"
[store]
path = "/tmp/deployments.json"

[fleet]
inventory = "/tmp/fleet.json"

[rollout]
poll_interval_ms = 60000

[[rollout.stages]]
percentage = 10
monitoring_duration_ms = 3600000

[[rollout.stages]]
percentage = 100
monitoring_duration_ms = 0

[rollout.thresholds]
max_safety_violations = 0
min_uptime_percent = 99.5
"#;
        let config: VoltConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rollout.stages.len(), 2);
        assert_eq!(config.rollout.poll_interval_ms, 60_000);
        assert_eq!(config.rollout.thresholds.min_uptime_percent, 99.5);
        // Omitted threshold keys keep their defaults.
        assert_eq!(config.rollout.thresholds.max_error_rate_increase, 2.0);
        assert!(config.rollout.validate().is_ok());
    }
}
