use std::fmt;
use std::sync::Arc;

/// Index of a symbol inside the symbol table of the grammar that defined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(usize);

impl SymbolId {
    pub fn new(index: usize) -> Self {
        SymbolId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A grammar symbol as seen by the mutation engine.
///
/// Symbols are owned by the grammar's symbol table and shared with every tree
/// node that instantiates them. Two symbols are equal when their ids are equal.
#[derive(Debug)]
pub struct Symbol {
    id: SymbolId,
    name: String,
    repeat_symbol: Option<Arc<Symbol>>,
}

impl Symbol {
    /// Creates a plain (non-repeating) symbol.
    pub fn new(id: SymbolId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            repeat_symbol: None,
        }
    }

    /// Creates a repetition symbol whose children are expansions of `element`.
    pub fn new_repeat(id: SymbolId, name: impl Into<String>, element: Arc<Symbol>) -> Self {
        Self {
            id,
            name: name.into(),
            repeat_symbol: Some(element),
        }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat_symbol.is_some()
    }

    /// The symbol describing one element of the repetition, if this is a repeat symbol.
    pub fn repeat_symbol(&self) -> Option<&Arc<Symbol>> {
        self.repeat_symbol.as_ref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

/// Child indices leading from a root to one of its descendants.
///
/// Paths stay valid only until the tree they were taken from is structurally
/// modified.
pub type NodePath = Vec<usize>;

/// A node of a derivation tree.
///
/// Every node exclusively owns its children. String nodes are terminal text and
/// can never have children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Expansion {
        symbol: Arc<Symbol>,
        children: Vec<TreeNode>,
    },
    String(Vec<u8>),
}

impl TreeNode {
    pub fn expansion(symbol: Arc<Symbol>, children: Vec<TreeNode>) -> Self {
        TreeNode::Expansion { symbol, children }
    }

    pub fn string(text: impl Into<Vec<u8>>) -> Self {
        TreeNode::String(text.into())
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TreeNode::String(_))
    }

    /// The symbol this node instantiates; `None` for string nodes.
    pub fn symbol(&self) -> Option<&Arc<Symbol>> {
        match self {
            TreeNode::Expansion { symbol, .. } => Some(symbol),
            TreeNode::String(_) => None,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Expansion { children, .. } => children,
            TreeNode::String(_) => &[],
        }
    }

    /// Mutable access to the child sequence. String nodes have none.
    pub fn children_mut(&mut self) -> Option<&mut Vec<TreeNode>> {
        match self {
            TreeNode::Expansion { children, .. } => Some(children),
            TreeNode::String(_) => None,
        }
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&TreeNode> {
        let mut node = self;
        for &index in path {
            node = node.children().get(index)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let mut node = self;
        for &index in path {
            node = node.children_mut()?.get_mut(index)?;
        }
        Some(node)
    }

    /// Substitutes `replacement` for this node in place. The previous subtree is dropped.
    pub fn replace(&mut self, replacement: TreeNode) {
        *self = replacement;
    }

    /// Number of nodes in this subtree, string leaves included.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(TreeNode::node_count).sum::<usize>()
    }

    /// Appends the terminal text of this subtree, left to right, to `out`.
    pub fn flatten_into(&self, out: &mut Vec<u8>) {
        match self {
            TreeNode::String(text) => out.extend_from_slice(text),
            TreeNode::Expansion { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }
}
