use crate::candidates::DEFAULT_DEPTH_DECAY;
use crate::corpus::InterestingTrees;
use crate::grammar::{DEFAULT_MAX_DEPTH, DEFAULT_REPEAT_PROBABILITY};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a probability in [0, 1], got {value}")]
    ProbabilityOutOfRange { key: &'static str, value: f64 },
    #[error("repeat-probability must be below 1 or insertions never stop, got {0}")]
    EndlessRepeat(f64),
    #[error("depth-decay must be positive, got {0}")]
    NonPositiveDecay(f64),
    #[error("{0} weights must be non-negative and not all zero")]
    InvalidWeights(&'static str),
    #[error("corpus-capacity must be at least 1")]
    ZeroCapacity,
    #[error("root-symbol must not be empty")]
    EmptyRootSymbol,
}

/// Relative weights of the four structural strategies.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields, default)]
pub struct StrategyWeights {
    pub replace_node: f64,
    pub splice: f64,
    pub repeat_mutator: f64,
    pub repeat_splice: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            replace_node: 0.3,
            splice: 0.2,
            repeat_mutator: 0.3,
            repeat_splice: 0.2,
        }
    }
}

impl StrategyWeights {
    pub fn total(&self) -> f64 {
        self.replace_node + self.splice + self.repeat_mutator + self.repeat_splice
    }

    fn is_valid(&self) -> bool {
        let weights = [
            self.replace_node,
            self.splice,
            self.repeat_mutator,
            self.repeat_splice,
        ];
        weights.iter().all(|w| w.is_finite() && *w >= 0.0) && self.total() > 0.0
    }
}

/// Relative weights of the three repeat-mutation modes.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields, default)]
pub struct RepeatModeWeights {
    pub delete: f64,
    pub delete_then_insert: f64,
    pub insert: f64,
}

impl Default for RepeatModeWeights {
    fn default() -> Self {
        Self {
            delete: 0.2,
            delete_then_insert: 0.2,
            insert: 0.6,
        }
    }
}

impl RepeatModeWeights {
    pub fn total(&self) -> f64 {
        self.delete + self.delete_then_insert + self.insert
    }

    fn is_valid(&self) -> bool {
        [self.delete, self.delete_then_insert, self.insert]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
            && self.total() > 0.0
    }
}

/// Tuning knobs of the grammar mutator. The defaults are the engine's reference behaviour.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MutatorConfig {
    #[serde(default = "default_root_symbol")]
    pub root_symbol: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_depth_decay")]
    pub depth_decay: f64,
    #[serde(default = "default_regenerate_probability")]
    pub regenerate_probability: f64,
    #[serde(default = "default_max_mutation_attempts")]
    pub max_mutation_attempts: usize,
    #[serde(default = "default_continue_probability")]
    pub continue_probability: f64,
    #[serde(default = "default_repeat_probability")]
    pub repeat_probability: f64,
    #[serde(default = "default_repeat_splice_delete_probability")]
    pub repeat_splice_delete_probability: f64,
    #[serde(default = "default_generation_warn_interval")]
    pub generation_warn_interval: u64,
    #[serde(default)]
    pub corpus_capacity: Option<usize>,
    #[serde(default)]
    pub strategy_weights: StrategyWeights,
    #[serde(default)]
    pub repeat_modes: RepeatModeWeights,
}

pub fn default_root_symbol() -> String {
    "root".to_owned()
}
pub fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_depth_decay() -> f64 {
    DEFAULT_DEPTH_DECAY
}
fn default_regenerate_probability() -> f64 {
    0.1
}
pub fn default_max_mutation_attempts() -> usize {
    100
}
fn default_continue_probability() -> f64 {
    0.5
}
fn default_repeat_probability() -> f64 {
    DEFAULT_REPEAT_PROBABILITY
}
fn default_repeat_splice_delete_probability() -> f64 {
    0.4
}
fn default_generation_warn_interval() -> u64 {
    100
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            root_symbol: default_root_symbol(),
            max_depth: default_max_depth(),
            depth_decay: default_depth_decay(),
            regenerate_probability: default_regenerate_probability(),
            max_mutation_attempts: default_max_mutation_attempts(),
            continue_probability: default_continue_probability(),
            repeat_probability: default_repeat_probability(),
            repeat_splice_delete_probability: default_repeat_splice_delete_probability(),
            generation_warn_interval: default_generation_warn_interval(),
            corpus_capacity: None,
            strategy_weights: StrategyWeights::default(),
            repeat_modes: RepeatModeWeights::default(),
        }
    }
}

impl MutatorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: MutatorConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid mutator config in {:?}: {}", path, e))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_symbol.is_empty() {
            return Err(ConfigError::EmptyRootSymbol);
        }
        let probabilities = [
            ("regenerate-probability", self.regenerate_probability),
            ("continue-probability", self.continue_probability),
            ("repeat-probability", self.repeat_probability),
            (
                "repeat-splice-delete-probability",
                self.repeat_splice_delete_probability,
            ),
        ];
        for (key, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { key, value });
            }
        }
        if self.repeat_probability >= 1.0 {
            return Err(ConfigError::EndlessRepeat(self.repeat_probability));
        }
        if self.depth_decay.is_nan() || self.depth_decay <= 0.0 {
            return Err(ConfigError::NonPositiveDecay(self.depth_decay));
        }
        if !self.strategy_weights.is_valid() {
            return Err(ConfigError::InvalidWeights("strategy"));
        }
        if !self.repeat_modes.is_valid() {
            return Err(ConfigError::InvalidWeights("repeat-mode"));
        }
        if self.corpus_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// A fresh shared corpus honouring `corpus-capacity`.
    pub fn interesting_trees(&self) -> InterestingTrees {
        match self.corpus_capacity {
            Some(limit) => InterestingTrees::with_capacity_limit(limit),
            None => InterestingTrees::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = MutatorConfig::default();
        assert_eq!(config.root_symbol, "root");
        assert_eq!(config.max_depth, 100);
        assert_eq!(config.depth_decay, 1.4);
        assert_eq!(config.regenerate_probability, 0.1);
        assert_eq!(config.max_mutation_attempts, 100);
        assert_eq!(config.continue_probability, 0.5);
        assert_eq!(config.repeat_splice_delete_probability, 0.4);
        assert!((config.strategy_weights.total() - 1.0).abs() < 1e-12);
        assert!((config.repeat_modes.total() - 1.0).abs() < 1e-12);
        assert!(config.validate().is_ok());
        assert_eq!(config.interesting_trees().capacity_limit(), None);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: MutatorConfig = toml::from_str("").unwrap();
        assert_eq!(config, MutatorConfig::default());
    }

    #[test]
    fn load_from_file_reads_partial_tables() -> Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
root-symbol = "start"
max-mutation-attempts = 10
corpus-capacity = 64

[strategy-weights]
splice = 0.0

[repeat-modes]
insert = 1.0
"#
        )?;

        let config = MutatorConfig::load_from_file(file.path())?;
        assert_eq!(config.root_symbol, "start");
        assert_eq!(config.max_mutation_attempts, 10);
        assert_eq!(config.strategy_weights.splice, 0.0);
        assert_eq!(config.strategy_weights.replace_node, 0.3);
        assert_eq!(config.repeat_modes.insert, 1.0);
        assert_eq!(config.repeat_modes.delete, 0.2);
        assert_eq!(config.interesting_trees().capacity_limit(), Some(64));
        Ok(())
    }

    #[test]
    fn load_from_file_rejects_unknown_keys_and_bad_values() -> Result<(), anyhow::Error> {
        let mut unknown = tempfile::NamedTempFile::new()?;
        writeln!(unknown, "no-such-key = 1")?;
        assert!(MutatorConfig::load_from_file(unknown.path()).is_err());

        let mut invalid = tempfile::NamedTempFile::new()?;
        writeln!(invalid, "continue-probability = 1.5")?;
        let err = MutatorConfig::load_from_file(invalid.path()).unwrap_err();
        assert!(
            err.to_string().contains("continue-probability"),
            "Error should name the offending key: {}",
            err
        );

        assert!(MutatorConfig::load_from_file(Path::new("/definitely/not/here.toml")).is_err());
        Ok(())
    }

    #[test]
    fn validate_rejects_degenerate_settings() {
        let base = MutatorConfig::default();

        let endless = MutatorConfig {
            repeat_probability: 1.0,
            ..base.clone()
        };
        assert_eq!(endless.validate(), Err(ConfigError::EndlessRepeat(1.0)));

        let flat = MutatorConfig {
            depth_decay: 0.0,
            ..base.clone()
        };
        assert_eq!(flat.validate(), Err(ConfigError::NonPositiveDecay(0.0)));

        let silent = MutatorConfig {
            strategy_weights: StrategyWeights {
                replace_node: 0.0,
                splice: 0.0,
                repeat_mutator: 0.0,
                repeat_splice: 0.0,
            },
            ..base.clone()
        };
        assert_eq!(silent.validate(), Err(ConfigError::InvalidWeights("strategy")));

        let negative_mode = MutatorConfig {
            repeat_modes: RepeatModeWeights {
                delete: -1.0,
                ..RepeatModeWeights::default()
            },
            ..base.clone()
        };
        assert_eq!(
            negative_mode.validate(),
            Err(ConfigError::InvalidWeights("repeat-mode"))
        );

        let zero_capacity = MutatorConfig {
            corpus_capacity: Some(0),
            ..base.clone()
        };
        assert_eq!(zero_capacity.validate(), Err(ConfigError::ZeroCapacity));

        let nameless = MutatorConfig {
            root_symbol: String::new(),
            ..base
        };
        assert_eq!(nameless.validate(), Err(ConfigError::EmptyRootSymbol));
    }
}
