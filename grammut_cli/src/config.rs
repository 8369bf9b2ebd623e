use grammut_core::config::MutatorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DriverSettings {
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Mutations performed by each worker.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    #[serde(default)]
    pub seed: u64,
    /// Samples generated from scratch by each worker before mutating.
    #[serde(default = "default_initial_samples")]
    pub initial_samples: usize,
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Where newly discovered outputs are written, one file per output.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

pub fn default_threads() -> usize {
    4
}
pub fn default_iterations() -> u64 {
    10_000
}
fn default_initial_samples() -> usize {
    8
}
fn default_report_interval() -> u64 {
    1_000
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            iterations: default_iterations(),
            seed: 0,
            initial_samples: default_initial_samples(),
            report_interval: default_report_interval(),
            output_dir: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub mutator: MutatorConfig,
}

impl DriverConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;
        let config: DriverConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.driver.threads == 0 {
            anyhow::bail!("driver.threads must be at least 1");
        }
        if self.driver.initial_samples == 0 {
            anyhow::bail!("driver.initial-samples must be at least 1");
        }
        self.mutator
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid [mutator] section: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config: DriverConfig = toml::from_str("").unwrap();
        assert_eq!(config, DriverConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let config: DriverConfig = toml::from_str(
            r#"
[driver]
threads = 2
seed = 99
output-dir = "out"

[mutator]
regenerate-probability = 0.25

[mutator.strategy-weights]
splice = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.driver.threads, 2);
        assert_eq!(config.driver.seed, 99);
        assert_eq!(config.driver.iterations, default_iterations());
        assert_eq!(config.driver.output_dir, Some(PathBuf::from("out")));
        assert_eq!(config.mutator.regenerate_probability, 0.25);
        assert_eq!(config.mutator.strategy_weights.splice, 0.5);
        assert_eq!(config.mutator.root_symbol, "root");
    }

    #[test]
    fn validation_covers_both_sections() {
        let mut config = DriverConfig::default();
        config.driver.threads = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::default();
        config.mutator.continue_probability = 2.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("continue-probability"), "{}", err);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(toml::from_str::<DriverConfig>("[fuzzer]\nmax-iterations = 3").is_err());
    }
}
