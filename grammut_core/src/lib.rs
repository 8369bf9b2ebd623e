pub mod candidates;
pub mod config;
pub mod corpus;
pub mod grammar;
pub mod mutator;
pub mod sample;
pub mod strategies;
pub mod tree;

pub use candidates::{CandidateQuery, MutationCandidate, collect_candidates, select_weighted};
pub use config::{ConfigError, MutatorConfig, RepeatModeWeights, StrategyWeights};
pub use corpus::InterestingTrees;
pub use grammar::{Grammar, GrammarError, RuleGrammar, RuleGrammarBuilder, RulePart};
pub use mutator::{GrammarMutator, GrammarMutatorContext, MutationStats, Mutator, MutatorError};
pub use sample::Sample;
pub use strategies::{RepeatMode, Strategy};
pub use tree::{NodePath, Symbol, SymbolId, TreeNode};
