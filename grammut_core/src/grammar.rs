use crate::sample::Sample;
use crate::tree::{Symbol, SymbolId, TreeNode};
use bincode::{
    Decode, Encode,
    config::{Configuration, Fixint, LittleEndian, NoLimit},
};
use rand::Rng;
use rand_core::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Default recursion limit for tree generation.
pub const DEFAULT_MAX_DEPTH: usize = 100;
/// Default probability of generating one more element of a repetition.
pub const DEFAULT_REPEAT_PROBABILITY: f64 = 0.75;

/// Errors raised by a grammar while resolving symbols or (de)serializing samples.
#[derive(Error, Debug)]
pub enum GrammarError {
    /// A symbol name could not be found in the symbol table.
    #[error("Symbol <{0}> not found in grammar")]
    UnknownSymbol(String),

    /// The sample bytes do not describe a tree for this grammar.
    #[error("Error decoding grammar sample: {0}")]
    Decode(String),

    /// The tree could not be serialized into a sample.
    #[error("Error encoding grammar sample: {0}")]
    Encode(String),

    /// A rule definition is malformed (dangling reference, duplicate definition, ...).
    #[error("Invalid rule for <{symbol}>: {reason}")]
    InvalidRule { symbol: String, reason: String },
}

impl From<bincode::error::EncodeError> for GrammarError {
    fn from(err: bincode::error::EncodeError) -> Self {
        GrammarError::Encode(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for GrammarError {
    fn from(err: bincode::error::DecodeError) -> Self {
        GrammarError::Decode(err.to_string())
    }
}

/// The grammar collaborator the mutation engine drives.
///
/// A grammar owns the symbol table, knows how to expand a symbol into a random
/// derivation tree, and how to move trees in and out of persisted samples.
/// Implementations are shared between worker threads.
pub trait Grammar: Send + Sync {
    /// Looks a symbol up by name.
    fn symbol(&self, name: &str) -> Option<Arc<Symbol>>;

    /// Generates a random expansion of `symbol`, treating the new node as
    /// sitting at `depth`. Returns `None` when no expansion fits the depth budget.
    fn generate_tree(
        &self,
        symbol: &Arc<Symbol>,
        rng: &mut dyn RngCore,
        depth: usize,
    ) -> Option<TreeNode>;

    /// Serializes a tree into sample form.
    fn encode_sample(&self, tree: &TreeNode) -> Result<Sample, GrammarError>;

    /// Parses a persisted sample back into a tree.
    fn decode_sample(&self, sample: &Sample) -> Result<TreeNode, GrammarError>;

    /// The bytes a target program receives for `tree`.
    fn render(&self, tree: &TreeNode) -> Vec<u8> {
        tree.flatten()
    }
}

/// One element of a rule alternative, referring to symbols by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePart {
    Literal(Vec<u8>),
    Symbol(String),
}

impl RulePart {
    pub fn literal(text: impl Into<Vec<u8>>) -> Self {
        RulePart::Literal(text.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        RulePart::Symbol(name.into())
    }
}

#[derive(Debug)]
enum Definition {
    Alternatives {
        name: String,
        alternatives: Vec<Vec<RulePart>>,
    },
    Repeat {
        name: String,
        element: String,
    },
}

impl Definition {
    fn name(&self) -> &str {
        match self {
            Definition::Alternatives { name, .. } | Definition::Repeat { name, .. } => name,
        }
    }
}

#[derive(Debug)]
enum ResolvedPart {
    Literal(Vec<u8>),
    Symbol(SymbolId),
}

#[derive(Debug)]
enum Production {
    Alternatives(Vec<Vec<ResolvedPart>>),
    Repeat(SymbolId),
}

/// Collects symbol definitions and resolves them into a [`RuleGrammar`].
#[derive(Debug)]
pub struct RuleGrammarBuilder {
    definitions: Vec<Definition>,
    max_depth: usize,
    repeat_probability: f64,
}

impl RuleGrammarBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            repeat_probability: DEFAULT_REPEAT_PROBABILITY,
        }
    }

    /// Adds one alternative to `name`. Repeated calls accumulate alternatives.
    pub fn rule<P>(&mut self, name: &str, parts: P) -> &mut Self
    where
        P: IntoIterator<Item = RulePart>,
    {
        let parts: Vec<RulePart> = parts.into_iter().collect();
        let existing = self.definitions.iter_mut().find_map(|def| match def {
            Definition::Alternatives { name: n, alternatives } if *n == name => Some(alternatives),
            _ => None,
        });
        match existing {
            Some(alternatives) => alternatives.push(parts),
            None => self.definitions.push(Definition::Alternatives {
                name: name.to_owned(),
                alternatives: vec![parts],
            }),
        }
        self
    }

    /// Adds one single-literal alternative to `name` per entry of `literals`.
    pub fn literals<'a, L>(&mut self, name: &str, literals: L) -> &mut Self
    where
        L: IntoIterator<Item = &'a str>,
    {
        for literal in literals {
            self.rule(name, [RulePart::literal(literal)]);
        }
        self
    }

    /// Declares `name` as one or more repetitions of `element`.
    pub fn repeat(&mut self, name: &str, element: &str) -> &mut Self {
        self.definitions.push(Definition::Repeat {
            name: name.to_owned(),
            element: element.to_owned(),
        });
        self
    }

    pub fn max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.max_depth = max_depth;
        self
    }

    pub fn repeat_probability(&mut self, probability: f64) -> &mut Self {
        self.repeat_probability = probability;
        self
    }

    pub fn build(&self) -> Result<RuleGrammar, GrammarError> {
        if !(0.0..1.0).contains(&self.repeat_probability) {
            return Err(GrammarError::InvalidRule {
                symbol: "*".to_owned(),
                reason: format!(
                    "repeat probability {} must be in [0, 1)",
                    self.repeat_probability
                ),
            });
        }

        let mut by_name = HashMap::new();
        for (index, definition) in self.definitions.iter().enumerate() {
            if by_name
                .insert(definition.name().to_owned(), SymbolId::new(index))
                .is_some()
            {
                return Err(GrammarError::InvalidRule {
                    symbol: definition.name().to_owned(),
                    reason: "defined both as a repeat and as a rule, or repeated twice".to_owned(),
                });
            }
        }
        let resolve = |owner: &str, name: &str| {
            by_name
                .get(name)
                .copied()
                .ok_or_else(|| GrammarError::InvalidRule {
                    symbol: owner.to_owned(),
                    reason: format!("references undefined symbol <{name}>"),
                })
        };

        let mut productions = Vec::with_capacity(self.definitions.len());
        for definition in &self.definitions {
            let production = match definition {
                Definition::Alternatives { name, alternatives } => {
                    let mut resolved = Vec::with_capacity(alternatives.len());
                    for alternative in alternatives {
                        let mut parts = Vec::with_capacity(alternative.len());
                        for part in alternative {
                            parts.push(match part {
                                RulePart::Literal(text) => ResolvedPart::Literal(text.clone()),
                                RulePart::Symbol(target) => {
                                    ResolvedPart::Symbol(resolve(name, target)?)
                                }
                            });
                        }
                        resolved.push(parts);
                    }
                    Production::Alternatives(resolved)
                }
                Definition::Repeat { name, element } => {
                    Production::Repeat(resolve(name, element)?)
                }
            };
            productions.push(production);
        }

        // Repeat symbols hold their element symbol, so elements are built first.
        let mut symbols: Vec<Option<Arc<Symbol>>> = vec![None; self.definitions.len()];
        let mut pending = Vec::new();
        for (index, definition) in self.definitions.iter().enumerate() {
            match &productions[index] {
                Production::Alternatives(_) => {
                    symbols[index] = Some(Arc::new(Symbol::new(
                        SymbolId::new(index),
                        definition.name(),
                    )));
                }
                Production::Repeat(element) => pending.push((index, *element)),
            }
        }
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&(index, element)| match symbols[element.index()].clone() {
                Some(element_symbol) => {
                    symbols[index] = Some(Arc::new(Symbol::new_repeat(
                        SymbolId::new(index),
                        self.definitions[index].name(),
                        element_symbol,
                    )));
                    false
                }
                None => true,
            });
            if pending.len() == before {
                let (index, _) = pending[0];
                return Err(GrammarError::InvalidRule {
                    symbol: self.definitions[index].name().to_owned(),
                    reason: "repeat element cycle".to_owned(),
                });
            }
        }
        let symbols: Vec<Arc<Symbol>> = symbols.into_iter().flatten().collect();

        Ok(RuleGrammar {
            symbols,
            productions,
            by_name,
            max_depth: self.max_depth,
            repeat_probability: self.repeat_probability,
        })
    }
}

impl Default for RuleGrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Name-keyed tree layout persisted inside samples.
#[derive(Encode, Decode, Debug)]
enum WireNode {
    Expansion {
        symbol: String,
        children: Vec<WireNode>,
    },
    String(Vec<u8>),
}

/// A context-free grammar stored as a table of symbols and their productions.
#[derive(Debug)]
pub struct RuleGrammar {
    symbols: Vec<Arc<Symbol>>,
    productions: Vec<Production>,
    by_name: HashMap<String, SymbolId>,
    max_depth: usize,
    repeat_probability: f64,
}

impl RuleGrammar {
    pub fn builder() -> RuleGrammarBuilder {
        RuleGrammarBuilder::new()
    }

    fn current_bincode_config() -> Configuration<LittleEndian, Fixint, NoLimit> {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn generate_node(
        &self,
        symbol: &Arc<Symbol>,
        rng: &mut dyn RngCore,
        depth: usize,
    ) -> Option<TreeNode> {
        if depth > self.max_depth {
            return None;
        }
        let mut children = Vec::new();
        match self.productions.get(symbol.id().index())? {
            Production::Alternatives(alternatives) => {
                if alternatives.is_empty() {
                    return None;
                }
                let alternative = &alternatives[rng.random_range(0..alternatives.len())];
                for part in alternative {
                    match part {
                        ResolvedPart::Literal(text) => children.push(TreeNode::string(text.clone())),
                        ResolvedPart::Symbol(id) => {
                            let child_symbol = self.symbols.get(id.index())?;
                            children.push(self.generate_node(child_symbol, rng, depth + 1)?);
                        }
                    }
                }
            }
            Production::Repeat(_) => {
                let element = symbol.repeat_symbol()?;
                loop {
                    children.push(self.generate_node(element, rng, depth + 1)?);
                    if rng.random::<f64>() > self.repeat_probability {
                        break;
                    }
                }
            }
        }
        Some(TreeNode::expansion(Arc::clone(symbol), children))
    }

    fn to_wire(tree: &TreeNode) -> WireNode {
        match tree {
            TreeNode::String(text) => WireNode::String(text.clone()),
            TreeNode::Expansion { symbol, children } => WireNode::Expansion {
                symbol: symbol.name().to_owned(),
                children: children.iter().map(Self::to_wire).collect(),
            },
        }
    }

    fn from_wire(&self, wire: WireNode) -> Result<TreeNode, GrammarError> {
        match wire {
            WireNode::String(text) => Ok(TreeNode::String(text)),
            WireNode::Expansion { symbol, children } => {
                let symbol = self
                    .symbol(&symbol)
                    .ok_or(GrammarError::UnknownSymbol(symbol))?;
                let children = children
                    .into_iter()
                    .map(|child| self.from_wire(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TreeNode::expansion(symbol, children))
            }
        }
    }
}

impl Grammar for RuleGrammar {
    fn symbol(&self, name: &str) -> Option<Arc<Symbol>> {
        self.by_name
            .get(name)
            .and_then(|id| self.symbols.get(id.index()))
            .cloned()
    }

    fn generate_tree(
        &self,
        symbol: &Arc<Symbol>,
        rng: &mut dyn RngCore,
        depth: usize,
    ) -> Option<TreeNode> {
        // Symbols from another grammar share ids but not meaning.
        let own = self.symbols.get(symbol.id().index())?;
        if own.name() != symbol.name() {
            return None;
        }
        self.generate_node(own, rng, depth)
    }

    fn encode_sample(&self, tree: &TreeNode) -> Result<Sample, GrammarError> {
        let bytes = bincode::encode_to_vec(Self::to_wire(tree), Self::current_bincode_config())?;
        Ok(Sample::new(bytes))
    }

    fn decode_sample(&self, sample: &Sample) -> Result<TreeNode, GrammarError> {
        if sample.is_empty() {
            return Err(GrammarError::Decode("sample is empty".to_owned()));
        }
        let (wire, consumed): (WireNode, usize) =
            bincode::decode_from_slice(sample.as_bytes(), Self::current_bincode_config())?;
        if consumed != sample.len() {
            return Err(GrammarError::Decode(format!(
                "{} trailing bytes after tree",
                sample.len() - consumed
            )));
        }
        self.from_wire(wire)
    }
}
