use crate::tree::{NodePath, Symbol, TreeNode};
use rand::Rng;
use rand_core::RngCore;

/// Divisor applied to a candidate's weight for every level below the root.
pub const DEFAULT_DEPTH_DECAY: f64 = 1.4;

/// A node eligible for mutation, located by its path from the traversal root.
///
/// Candidates describe one tree at one moment: any structural change to that
/// tree invalidates them, so they are collected afresh before every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationCandidate {
    pub path: NodePath,
    pub depth: usize,
    pub weight: f64,
}

/// Parameters of one candidate collection pass.
#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
    filter: Option<&'a Symbol>,
    start_depth: usize,
    max_depth: usize,
    weight: f64,
    decay: f64,
    just_repeat: bool,
}

impl<'a> CandidateQuery<'a> {
    /// Accepts every non-string node down to `max_depth`, starting with weight 1.
    pub fn new(max_depth: usize) -> Self {
        Self {
            filter: None,
            start_depth: 0,
            max_depth,
            weight: 1.0,
            decay: DEFAULT_DEPTH_DECAY,
            just_repeat: false,
        }
    }

    /// Only accept nodes instantiating `symbol`.
    pub fn with_filter(mut self, symbol: &'a Symbol) -> Self {
        self.filter = Some(symbol);
        self
    }

    /// Only accept nodes whose symbol is a repetition.
    pub fn repeat_only(mut self) -> Self {
        self.just_repeat = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Depth assigned to the traversal root.
    pub fn starting_at(mut self, depth: usize) -> Self {
        self.start_depth = depth;
        self
    }

    fn accepts(&self, symbol: &Symbol) -> bool {
        self.filter.is_none_or(|filter| *filter == *symbol)
            && (!self.just_repeat || symbol.is_repeat())
    }
}

/// Clears `out` and fills it with every node of `root` matching `query`.
///
/// Each level below the root divides the visit weight by the query's decay, so
/// shallow nodes are favoured. String nodes are never collected nor descended
/// into, and nothing deeper than the query's `max_depth` is visited. Returns the
/// weight the root was visited with.
pub fn collect_candidates(
    out: &mut Vec<MutationCandidate>,
    root: &TreeNode,
    query: &CandidateQuery<'_>,
) -> f64 {
    out.clear();
    let mut path = NodePath::new();
    visit(out, root, &mut path, query.start_depth, query.weight, query);
    query.weight
}

fn visit(
    out: &mut Vec<MutationCandidate>,
    node: &TreeNode,
    path: &mut NodePath,
    depth: usize,
    weight: f64,
    query: &CandidateQuery<'_>,
) {
    if depth > query.max_depth {
        return;
    }
    let TreeNode::Expansion { symbol, children } = node else {
        return;
    };

    if query.accepts(symbol) {
        out.push(MutationCandidate {
            path: path.clone(),
            depth,
            weight,
        });
    }

    let child_weight = weight / query.decay;
    for (index, child) in children.iter().enumerate() {
        if child.is_string() {
            continue;
        }
        path.push(index);
        visit(out, child, path, depth + 1, child_weight, query);
        path.pop();
    }
}

/// Picks one candidate with probability proportional to its weight.
///
/// Returns `None` for an empty list or when all weights are zero. The last
/// candidate absorbs any floating-point shortfall of the cumulative sum.
pub fn select_weighted<'c>(
    candidates: &'c [MutationCandidate],
    rng: &mut dyn RngCore,
) -> Option<&'c MutationCandidate> {
    let total: f64 = candidates.iter().map(|candidate| candidate.weight).sum();
    if candidates.is_empty() || total == 0.0 {
        return None;
    }

    let draw = rng.random::<f64>() * total;
    let last = candidates.len() - 1;
    let mut cumulative = 0.0;
    for (index, candidate) in candidates.iter().enumerate() {
        cumulative += candidate.weight;
        if draw < cumulative || index == last {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SymbolId;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::sync::Arc;

    struct Fixture {
        list: Arc<Symbol>,
        item: Arc<Symbol>,
        tree: TreeNode,
    }

    // <root> -> "[" <list> "]"; <list> is a repeat of <item>; <item> -> <leaf> | "x"
    fn fixture() -> Fixture {
        let root = Arc::new(Symbol::new(SymbolId::new(0), "root"));
        let item = Arc::new(Symbol::new(SymbolId::new(2), "item"));
        let list = Arc::new(Symbol::new_repeat(SymbolId::new(1), "list", item.clone()));
        let leaf = Arc::new(Symbol::new(SymbolId::new(3), "leaf"));

        let tree = TreeNode::expansion(
            root,
            vec![
                TreeNode::string("["),
                TreeNode::expansion(
                    list.clone(),
                    vec![
                        TreeNode::expansion(
                            item.clone(),
                            vec![TreeNode::expansion(leaf, vec![TreeNode::string("1")])],
                        ),
                        TreeNode::expansion(item.clone(), vec![TreeNode::string("x")]),
                    ],
                ),
                TreeNode::string("]"),
            ],
        );
        Fixture { list, item, tree }
    }

    fn candidate(weight: f64) -> MutationCandidate {
        MutationCandidate {
            path: NodePath::new(),
            depth: 0,
            weight,
        }
    }

    #[test]
    fn weights_decay_by_level_and_depths_are_recorded() {
        let fixture = fixture();
        let mut out = Vec::new();
        let root_weight = collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(100));

        assert_eq!(root_weight, 1.0);
        let paths: Vec<NodePath> = out.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            paths,
            vec![vec![], vec![1], vec![1, 0], vec![1, 0, 0], vec![1, 1]],
            "Pre-order traversal over non-string nodes"
        );
        for candidate in &out {
            assert_eq!(candidate.depth, candidate.path.len());
            let expected = 1.0 / DEFAULT_DEPTH_DECAY.powi(candidate.depth as i32);
            assert!(
                (candidate.weight - expected).abs() < 1e-12,
                "Weight at depth {} should be {}, got {}",
                candidate.depth,
                expected,
                candidate.weight
            );
        }
    }

    #[test]
    fn max_depth_bounds_the_traversal() {
        let fixture = fixture();
        let mut out = Vec::new();
        for max_depth in 0..4 {
            collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(max_depth));
            assert!(
                out.iter().all(|c| c.depth <= max_depth),
                "No candidate may exceed max depth {}",
                max_depth
            );
        }
        collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(1));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn collection_replaces_previous_contents() {
        let fixture = fixture();
        let mut out = vec![candidate(9.0); 7];
        collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, NodePath::new());
    }

    #[test]
    fn symbol_filter_keeps_only_matching_nodes() {
        let fixture = fixture();
        let mut out = Vec::new();
        let query = CandidateQuery::new(100).with_filter(&fixture.item);
        collect_candidates(&mut out, &fixture.tree, &query);

        assert_eq!(out.len(), 2);
        for candidate in &out {
            let node = fixture.tree.node_at(&candidate.path).unwrap();
            assert_eq!(node.symbol().map(|s| s.as_ref()), Some(fixture.item.as_ref()));
        }
    }

    #[test]
    fn repeat_only_keeps_repetition_nodes() {
        let fixture = fixture();
        let mut out = Vec::new();
        collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(100).repeat_only());
        assert_eq!(out.len(), 1);
        let node = fixture.tree.node_at(&out[0].path).unwrap();
        assert_eq!(node.symbol().map(|s| s.id()), Some(fixture.list.id()));

        let none = CandidateQuery::new(100)
            .with_filter(&fixture.item)
            .repeat_only();
        collect_candidates(&mut out, &fixture.tree, &none);
        assert!(out.is_empty(), "<item> is not a repeat symbol");
    }

    #[test]
    fn string_nodes_are_never_candidates() {
        let fixture = fixture();
        let mut out = Vec::new();
        collect_candidates(&mut out, &fixture.tree, &CandidateQuery::new(100));
        for candidate in &out {
            let node = fixture.tree.node_at(&candidate.path).unwrap();
            assert!(!node.is_string());
        }

        collect_candidates(&mut out, &TreeNode::string("lonely"), &CandidateQuery::new(100));
        assert!(out.is_empty(), "A string root yields no candidates");
    }

    #[test]
    fn starting_depth_and_weight_are_respected() {
        let fixture = fixture();
        let mut out = Vec::new();
        let query = CandidateQuery::new(2).starting_at(1).with_weight(2.0).with_decay(2.0);
        collect_candidates(&mut out, &fixture.tree, &query);
        assert_eq!(out.len(), 2, "Only root (depth 1) and <list> (depth 2) fit");
        assert_eq!((out[0].depth, out[0].weight), (1, 2.0));
        assert_eq!((out[1].depth, out[1].weight), (2, 1.0));
    }

    #[test]
    fn selection_follows_weights() {
        let mut rng = ChaCha8Rng::from_seed([7u8; 32]);
        let mut candidates = vec![candidate(1.0), candidate(3.0)];
        candidates[1].depth = 1;
        let trials = 20_000;
        let mut second = 0;
        for _ in 0..trials {
            let picked = select_weighted(&candidates, &mut rng).expect("selection expected");
            if picked.depth == 1 {
                second += 1;
            }
        }
        let frequency = second as f64 / trials as f64;
        assert!(
            (frequency - 0.75).abs() < 0.02,
            "Heavier candidate should be chosen ~75% of the time, got {}",
            frequency
        );
    }

    #[test]
    fn selection_fails_on_empty_or_weightless_lists() {
        let mut rng = ChaCha8Rng::from_seed([8u8; 32]);
        assert!(select_weighted(&[], &mut rng).is_none());
        let zeros = vec![candidate(0.0), candidate(0.0)];
        for _ in 0..100 {
            assert!(select_weighted(&zeros, &mut rng).is_none());
        }
    }

    #[test]
    fn single_candidate_is_always_selected() {
        let mut rng = ChaCha8Rng::from_seed([9u8; 32]);
        let single = vec![candidate(1e-300)];
        for _ in 0..100 {
            assert!(select_weighted(&single, &mut rng).is_some());
        }
    }
}
