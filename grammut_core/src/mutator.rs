use crate::candidates::{CandidateQuery, MutationCandidate, collect_candidates};
use crate::config::MutatorConfig;
use crate::corpus::InterestingTrees;
use crate::grammar::{Grammar, GrammarError};
use crate::sample::Sample;
use crate::strategies::Strategy;
use crate::tree::{Symbol, TreeNode};
use log::{debug, warn};
use rand::Rng;
use rand_core::RngCore;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a mutator to the fuzzing driver.
///
/// Drivers are expected to treat these as fatal: they mean the grammar does not
/// fit the configuration or the driver broke the mutator's calling contract.
#[derive(Error, Debug)]
pub enum MutatorError {
    /// The configured root symbol does not exist in the grammar.
    #[error("Symbol <{0}> not found in grammar")]
    MissingRootSymbol(String),

    /// `mutate` was called before any `init_round`.
    #[error("No sample context bound; call init_round before mutate")]
    NoCurrentSample,

    /// The grammar failed to decode or encode a sample.
    #[error("Grammar operation failed within mutator: {0}")]
    Grammar(#[from] GrammarError),
}

/// The contract between a mutator and the fuzzing framework that schedules it.
///
/// The framework creates one context per interesting sample, binds a context
/// with `init_round` before a series of `mutate` calls on that sample, and may
/// ask for brand-new samples through `generate_sample`.
pub trait Mutator {
    /// Per-sample state produced by [`Mutator::create_sample_context`].
    type Context;

    /// Whether this mutator can produce samples from scratch.
    fn can_generate_sample(&self) -> bool {
        false
    }

    /// Overwrites `sample` with a freshly generated one.
    fn generate_sample(
        &mut self,
        sample: &mut Sample,
        rng: &mut dyn RngCore,
    ) -> Result<bool, MutatorError>;

    /// Builds the context of an interesting sample.
    fn create_sample_context(&mut self, sample: &Sample) -> Result<Self::Context, MutatorError>;

    /// Makes `context` the basis of subsequent `mutate` calls.
    fn init_round(&mut self, sample: &Sample, context: &Self::Context);

    /// Replaces `sample` with a mutated version of the current round's sample.
    fn mutate(
        &mut self,
        sample: &mut Sample,
        rng: &mut dyn RngCore,
        all_samples: &[Sample],
    ) -> Result<bool, MutatorError>;
}

/// Decoded tree of one interesting sample.
#[derive(Debug, Clone)]
pub struct GrammarMutatorContext {
    pub(crate) tree: Arc<TreeNode>,
}

impl GrammarMutatorContext {
    pub fn tree(&self) -> &TreeNode {
        &self.tree
    }
}

/// Counters describing what a mutator has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationStats {
    /// Number of `mutate` calls.
    pub requests: u64,
    /// Requests answered by generating a whole new tree.
    pub regenerations: u64,
    /// Requests in which no structural strategy succeeded.
    pub unproductive_requests: u64,
    attempts: [u64; 4],
    successes: [u64; 4],
}

impl MutationStats {
    pub fn attempts(&self, strategy: Strategy) -> u64 {
        self.attempts[strategy.index()]
    }

    pub fn successes(&self, strategy: Strategy) -> u64 {
        self.successes[strategy.index()]
    }

    pub fn merge(&mut self, other: &MutationStats) {
        self.requests += other.requests;
        self.regenerations += other.regenerations;
        self.unproductive_requests += other.unproductive_requests;
        for i in 0..self.attempts.len() {
            self.attempts[i] += other.attempts[i];
            self.successes[i] += other.successes[i];
        }
    }

    fn record(&mut self, strategy: Strategy, succeeded: bool) {
        self.attempts[strategy.index()] += 1;
        if succeeded {
            self.successes[strategy.index()] += 1;
        }
    }
}

/// Grammar-aware mutator operating on derivation trees.
///
/// Each worker owns one instance; instances share the grammar and the
/// [`InterestingTrees`] corpus used for splicing.
pub struct GrammarMutator<G: Grammar> {
    pub(crate) grammar: Arc<G>,
    pub(crate) config: MutatorConfig,
    root: Arc<Symbol>,
    pub(crate) interesting_trees: InterestingTrees,
    current_sample: Option<Arc<TreeNode>>,
    // Kept across calls to reuse their allocations.
    pub(crate) candidates: Vec<MutationCandidate>,
    pub(crate) repeat_candidates: Vec<MutationCandidate>,
    pub(crate) splice_candidates: Vec<MutationCandidate>,
    stats: MutationStats,
}

impl<G: Grammar> GrammarMutator<G> {
    /// Creates a mutator. Fails when the grammar lacks the configured root symbol.
    pub fn new(
        grammar: Arc<G>,
        interesting_trees: InterestingTrees,
        config: MutatorConfig,
    ) -> Result<Self, MutatorError> {
        let root = grammar
            .symbol(&config.root_symbol)
            .ok_or_else(|| MutatorError::MissingRootSymbol(config.root_symbol.clone()))?;
        Ok(Self {
            grammar,
            config,
            root,
            interesting_trees,
            current_sample: None,
            candidates: Vec::new(),
            repeat_candidates: Vec::new(),
            splice_candidates: Vec::new(),
            stats: MutationStats::default(),
        })
    }

    pub fn config(&self) -> &MutatorConfig {
        &self.config
    }

    pub fn stats(&self) -> &MutationStats {
        &self.stats
    }

    pub fn interesting_trees(&self) -> &InterestingTrees {
        &self.interesting_trees
    }

    /// The tree bound by the last `init_round`.
    pub fn current_sample(&self) -> Option<&TreeNode> {
        self.current_sample.as_deref()
    }

    /// Generates `symbol` until the grammar produces a tree, warning periodically.
    pub fn generate_tree_no_fail(&self, symbol: &Arc<Symbol>, rng: &mut dyn RngCore) -> TreeNode {
        let interval = self.config.generation_warn_interval.max(1);
        let mut failures: u64 = 0;
        loop {
            if let Some(tree) = self.grammar.generate_tree(symbol, rng, 0) {
                return tree;
            }
            failures += 1;
            if failures % interval == 0 {
                warn!(
                    "Repeatedly failing to generate sample from grammar ({} attempts for {})",
                    failures, symbol
                );
            }
        }
    }

    pub(crate) fn candidate_query<'a>(&self, max_depth: usize) -> CandidateQuery<'a> {
        CandidateQuery::new(max_depth).with_decay(self.config.depth_decay)
    }

    fn refresh_candidates(&mut self, tree: &TreeNode) {
        let query = self.candidate_query(self.config.max_depth);
        collect_candidates(&mut self.candidates, tree, &query);
        collect_candidates(&mut self.repeat_candidates, tree, &query.repeat_only());
    }

    fn attempt(&mut self, strategy: Strategy, tree: &mut TreeNode, rng: &mut dyn RngCore) -> bool {
        let succeeded = self.apply_strategy(strategy, tree, rng);
        if !succeeded {
            debug!("{} did not apply", strategy.name());
        }
        self.stats.record(strategy, succeeded);
        succeeded
    }
}

impl<G: Grammar> Mutator for GrammarMutator<G> {
    type Context = GrammarMutatorContext;

    fn can_generate_sample(&self) -> bool {
        true
    }

    fn generate_sample(
        &mut self,
        sample: &mut Sample,
        rng: &mut dyn RngCore,
    ) -> Result<bool, MutatorError> {
        let tree = self.generate_tree_no_fail(&self.root, rng);
        *sample = self.grammar.encode_sample(&tree)?;
        Ok(true)
    }

    /// Decodes `sample` and registers its tree in the shared corpus.
    ///
    /// Frameworks only create contexts for interesting samples, which is what
    /// makes the registration correct.
    fn create_sample_context(&mut self, sample: &Sample) -> Result<Self::Context, MutatorError> {
        let tree = Arc::new(self.grammar.decode_sample(sample)?);
        self.interesting_trees.register(Arc::clone(&tree));
        Ok(GrammarMutatorContext { tree })
    }

    fn init_round(&mut self, _sample: &Sample, context: &Self::Context) {
        self.current_sample = Some(Arc::clone(&context.tree));
    }

    /// Always succeeds once a round is bound, even if the tree came out unchanged.
    fn mutate(
        &mut self,
        sample: &mut Sample,
        rng: &mut dyn RngCore,
        _all_samples: &[Sample],
    ) -> Result<bool, MutatorError> {
        let Some(current) = self.current_sample.clone() else {
            return Err(MutatorError::NoCurrentSample);
        };
        self.stats.requests += 1;

        if rng.random::<f64>() < self.config.regenerate_probability {
            if let Some(generated) = self.grammar.generate_tree(&self.root, rng, 0) {
                debug!("Replacing sample with a freshly generated tree");
                self.stats.regenerations += 1;
                *sample = self.grammar.encode_sample(&generated)?;
                return Ok(true);
            }
        }

        let mut working = TreeNode::clone(&current);
        let mut any_success = false;
        for _ in 0..self.config.max_mutation_attempts {
            // Every structural change invalidates the collected paths.
            self.refresh_candidates(&working);
            let strategy = Strategy::pick(rng.random(), &self.config.strategy_weights);
            if self.attempt(strategy, &mut working, rng) {
                any_success = true;
                if rng.random::<f64>() > self.config.continue_probability {
                    break;
                }
            }
        }

        if !any_success {
            self.stats.unproductive_requests += 1;
            warn!("Repeatedly failing to mutate a sample. Check grammar.");
        }

        *sample = self.grammar.encode_sample(&working)?;
        Ok(true)
    }
}
