use crate::candidates::{collect_candidates, select_weighted};
use crate::config::{RepeatModeWeights, StrategyWeights};
use crate::grammar::Grammar;
use crate::mutator::GrammarMutator;
use crate::tree::TreeNode;
use rand::Rng;
use rand_core::RngCore;

/// The structural edits a single mutation attempt can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Regenerate a random subtree from the grammar.
    ReplaceNode,
    /// Overwrite a random subtree with a same-symbol subtree of an interesting tree.
    Splice,
    /// Delete and/or insert elements of a repetition.
    RepeatMutator,
    /// Move a run of elements from an interesting tree's repetition into ours.
    RepeatSplice,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::ReplaceNode,
        Strategy::Splice,
        Strategy::RepeatMutator,
        Strategy::RepeatSplice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::ReplaceNode => "ReplaceNode",
            Strategy::Splice => "Splice",
            Strategy::RepeatMutator => "RepeatMutator",
            Strategy::RepeatSplice => "RepeatSplice",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn weight(self, weights: &StrategyWeights) -> f64 {
        match self {
            Strategy::ReplaceNode => weights.replace_node,
            Strategy::Splice => weights.splice,
            Strategy::RepeatMutator => weights.repeat_mutator,
            Strategy::RepeatSplice => weights.repeat_splice,
        }
    }

    /// Maps a uniform draw in `[0, 1)` onto consecutive bands sized by `weights`.
    pub fn pick(draw: f64, weights: &StrategyWeights) -> Strategy {
        let target = draw * weights.total();
        let mut cumulative = 0.0;
        let mut fallback = Strategy::RepeatSplice;
        for strategy in Strategy::ALL {
            let weight = strategy.weight(weights);
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            fallback = strategy;
            if target < cumulative {
                return strategy;
            }
        }
        fallback
    }
}

/// What a repeat mutation does around the chosen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    Delete,
    DeleteThenInsert,
    Insert,
}

impl RepeatMode {
    pub fn pick(draw: f64, weights: &RepeatModeWeights) -> RepeatMode {
        let target = draw * weights.total();
        let bands = [
            (RepeatMode::Delete, weights.delete),
            (RepeatMode::DeleteThenInsert, weights.delete_then_insert),
            (RepeatMode::Insert, weights.insert),
        ];
        let mut cumulative = 0.0;
        let mut fallback = RepeatMode::Insert;
        for (mode, weight) in bands {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            fallback = mode;
            if target < cumulative {
                return mode;
            }
        }
        fallback
    }

    pub fn deletes(self) -> bool {
        matches!(self, RepeatMode::Delete | RepeatMode::DeleteThenInsert)
    }

    pub fn inserts(self) -> bool {
        matches!(self, RepeatMode::DeleteThenInsert | RepeatMode::Insert)
    }
}

fn random_position(len: usize, rng: &mut dyn RngCore) -> usize {
    if len == 0 { 0 } else { rng.random_range(0..len) }
}

impl<G: Grammar> GrammarMutator<G> {
    /// Runs one strategy against `tree`, whose candidate lists must be fresh.
    pub(crate) fn apply_strategy(
        &mut self,
        strategy: Strategy,
        tree: &mut TreeNode,
        rng: &mut dyn RngCore,
    ) -> bool {
        match strategy {
            // A tree without expandable nodes offers nothing to regenerate.
            Strategy::ReplaceNode if self.candidates.is_empty() => false,
            Strategy::ReplaceNode => self.replace_node(tree, rng),
            Strategy::Splice => self.splice(tree, rng),
            Strategy::RepeatMutator => self.repeat_mutator(tree, rng),
            Strategy::RepeatSplice => self.repeat_splice(tree, rng),
        }
    }

    /// Replaces a weighted-random candidate with a fresh expansion of its symbol.
    ///
    /// # Panics
    ///
    /// Panics if no candidate can be selected; callers check the candidate list first.
    pub(crate) fn replace_node(&mut self, tree: &mut TreeNode, rng: &mut dyn RngCore) -> bool {
        let Some(candidate) = select_weighted(&self.candidates, rng) else {
            panic!("Error selecting grammar node to mutate");
        };
        let Some(node) = tree.node_at_mut(&candidate.path) else {
            return false;
        };
        let Some(symbol) = node.symbol().cloned() else {
            return false;
        };
        match self.grammar.generate_tree(&symbol, rng, candidate.depth) {
            Some(replacement) => {
                node.replace(replacement);
                true
            }
            None => false,
        }
    }

    pub(crate) fn splice(&mut self, tree: &mut TreeNode, rng: &mut dyn RngCore) -> bool {
        let Some(candidate) = select_weighted(&self.candidates, rng) else {
            return false;
        };
        let Some(other_tree) = self.interesting_trees.random_tree(rng) else {
            return false;
        };
        let Some(node) = tree.node_at_mut(&candidate.path) else {
            return false;
        };
        let Some(symbol) = node.symbol().cloned() else {
            return false;
        };

        // Donors may sit no deeper than the node they replace.
        let query = self
            .candidate_query(candidate.depth)
            .with_filter(symbol.as_ref());
        collect_candidates(&mut self.splice_candidates, &other_tree, &query);
        let Some(donor) = select_weighted(&self.splice_candidates, rng)
            .and_then(|other| other_tree.node_at(&other.path))
        else {
            return false;
        };
        node.replace(donor.clone());
        true
    }

    pub(crate) fn repeat_mutator(&mut self, tree: &mut TreeNode, rng: &mut dyn RngCore) -> bool {
        let Some(candidate) = select_weighted(&self.repeat_candidates, rng) else {
            return false;
        };
        let Some(node) = tree.node_at_mut(&candidate.path) else {
            return false;
        };
        let position = random_position(node.children().len(), rng);
        let mode = RepeatMode::pick(rng.random(), &self.config.repeat_modes);
        self.edit_repeat(node, candidate.depth, position, mode, rng)
    }

    /// Deletes and/or inserts elements of the repetition `node` around `position`.
    ///
    /// Insertions are generated before anything is removed, so a repetition whose
    /// element cannot be generated is left untouched and `false` is returned.
    pub(crate) fn edit_repeat(
        &self,
        node: &mut TreeNode,
        depth: usize,
        mut position: usize,
        mode: RepeatMode,
        rng: &mut dyn RngCore,
    ) -> bool {
        let Some(element) = node.symbol().and_then(|s| s.repeat_symbol()).cloned() else {
            return false;
        };

        let mut staged = Vec::new();
        if mode.inserts() {
            loop {
                if let Some(child) = self.grammar.generate_tree(&element, rng, depth + 1) {
                    staged.push(child);
                }
                if !self.keep_repeating(rng) {
                    break;
                }
            }
            if staged.is_empty() {
                return false;
            }
        }

        let Some(children) = node.children_mut() else {
            return false;
        };
        if mode.deletes() {
            self.delete_run(children, position, rng);
        }
        if mode.inserts() {
            if position < children.len() {
                position += 1;
            }
            children.splice(position..position, staged);
        }
        true
    }

    pub(crate) fn repeat_splice(&mut self, tree: &mut TreeNode, rng: &mut dyn RngCore) -> bool {
        let Some(candidate) = select_weighted(&self.repeat_candidates, rng) else {
            return false;
        };
        let Some(other_tree) = self.interesting_trees.random_tree(rng) else {
            return false;
        };
        let Some(node) = tree.node_at_mut(&candidate.path) else {
            return false;
        };
        let Some(symbol) = node.symbol().cloned() else {
            return false;
        };

        let query = self
            .candidate_query(candidate.depth)
            .with_filter(symbol.as_ref())
            .repeat_only();
        collect_candidates(&mut self.splice_candidates, &other_tree, &query);
        let Some(donor) = select_weighted(&self.splice_candidates, rng)
            .and_then(|other| other_tree.node_at(&other.path))
        else {
            return false;
        };

        let position = random_position(node.children().len(), rng);
        let donor_position = random_position(donor.children().len(), rng);
        let delete = rng.random::<f64>() < self.config.repeat_splice_delete_probability;
        self.splice_repeat(node, donor, position, donor_position, delete, rng)
    }

    /// Optionally deletes a run of `node`'s elements at `position`, then copies a
    /// run of `donor`'s elements starting at `donor_position` in after it.
    ///
    /// Succeeds even when nothing was copied.
    pub(crate) fn splice_repeat(
        &self,
        node: &mut TreeNode,
        donor: &TreeNode,
        mut position: usize,
        donor_position: usize,
        delete: bool,
        rng: &mut dyn RngCore,
    ) -> bool {
        let Some(children) = node.children_mut() else {
            return false;
        };
        if delete {
            self.delete_run(children, position, rng);
        }
        if position < children.len() {
            position += 1;
        }

        let donor_children = donor.children();
        let mut copied = 0;
        while donor_position + copied < donor_children.len() {
            copied += 1;
            if !self.keep_repeating(rng) {
                break;
            }
        }
        let run = &donor_children[donor_position.min(donor_children.len())..][..copied];
        children.splice(position..position, run.iter().cloned());
        true
    }

    /// Removes one element at `position`, then keeps removing while the repeat draw continues.
    fn delete_run(&self, children: &mut Vec<TreeNode>, position: usize, rng: &mut dyn RngCore) {
        let mut count = 0;
        while position + count < children.len() {
            count += 1;
            if !self.keep_repeating(rng) {
                break;
            }
        }
        children.drain(position..position + count);
    }

    fn keep_repeating(&self, rng: &mut dyn RngCore) -> bool {
        rng.random::<f64>() <= self.config.repeat_probability
    }
}
