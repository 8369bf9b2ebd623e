use crate::tree::TreeNode;
use parking_lot::Mutex;
use rand_core::RngCore;
use std::collections::VecDeque;
use std::sync::Arc;

/// The trees of every sample the fuzzing driver has flagged as interesting.
///
/// This is the only state shared between worker threads. The handle is cheap to
/// clone; all clones see the same entries. A single lock guards both appends and
/// indexed reads, and it is held only for the duration of that access: readers
/// walk away with an `Arc` to the tree and traverse it outside the lock.
///
/// The store is unbounded unless constructed with a capacity limit, in which
/// case the oldest entry is evicted on overflow. Evicted trees stay alive for
/// as long as a reader still holds them.
#[derive(Debug, Clone, Default)]
pub struct InterestingTrees {
    entries: Arc<Mutex<VecDeque<Arc<TreeNode>>>>,
    capacity_limit: Option<usize>,
}

impl InterestingTrees {
    /// Creates a new, empty and unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that keeps at most `limit` trees (at least one).
    pub fn with_capacity_limit(limit: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity_limit: Some(limit.max(1)),
        }
    }

    pub fn capacity_limit(&self) -> Option<usize> {
        self.capacity_limit
    }

    /// Appends a tree and returns the number of stored trees afterwards.
    pub fn register(&self, tree: Arc<TreeNode>) -> usize {
        let mut entries = self.entries.lock();
        if let Some(limit) = self.capacity_limit {
            while entries.len() >= limit {
                entries.pop_front();
            }
        }
        entries.push_back(tree);
        entries.len()
    }

    /// Picks a stored tree uniformly at random, or `None` when the store is empty.
    pub fn random_tree(&self, rng: &mut dyn RngCore) -> Option<Arc<TreeNode>> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return None;
        }
        let index = rng.next_u64() as usize % entries.len();
        entries.get(index).cloned()
    }

    pub fn get(&self, index: usize) -> Option<Arc<TreeNode>> {
        self.entries.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::collections::HashSet;
    use std::thread;

    fn leaf(text: &str) -> Arc<TreeNode> {
        Arc::new(TreeNode::string(text))
    }

    #[test]
    fn empty_store_yields_nothing() {
        let trees = InterestingTrees::new();
        let mut rng = ChaCha8Rng::from_seed([0u8; 32]);
        assert!(trees.is_empty());
        assert!(trees.random_tree(&mut rng).is_none());
        assert!(trees.get(0).is_none());
        assert_eq!(trees.capacity_limit(), None);
    }

    #[test]
    fn clones_share_entries() {
        let trees = InterestingTrees::new();
        let other_handle = trees.clone();
        assert_eq!(trees.register(leaf("a")), 1);
        assert_eq!(other_handle.register(leaf("b")), 2);
        assert_eq!(trees.len(), 2);
        assert_eq!(trees.get(1).as_deref(), Some(&TreeNode::string("b")));
    }

    #[test]
    fn random_tree_reaches_every_entry() {
        let trees = InterestingTrees::new();
        for text in ["a", "b", "c"] {
            trees.register(leaf(text));
        }
        let mut rng = ChaCha8Rng::from_seed([1u8; 32]);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let tree = trees.random_tree(&mut rng).expect("store is not empty");
            seen.insert(tree.flatten());
        }
        assert_eq!(seen.len(), 3, "Every stored tree should be picked eventually");
    }

    #[test]
    fn capacity_limit_evicts_oldest_entries() {
        let trees = InterestingTrees::with_capacity_limit(2);
        let first = leaf("first");
        trees.register(Arc::clone(&first));
        trees.register(leaf("second"));
        assert_eq!(trees.register(leaf("third")), 2);

        assert_eq!(trees.get(0).as_deref(), Some(&TreeNode::string("second")));
        assert_eq!(trees.get(1).as_deref(), Some(&TreeNode::string("third")));
        assert_eq!(*first, TreeNode::string("first"), "Held trees outlive eviction");

        let minimal = InterestingTrees::with_capacity_limit(0);
        assert_eq!(minimal.capacity_limit(), Some(1));
        minimal.register(leaf("x"));
        assert_eq!(minimal.register(leaf("y")), 1);
    }

    #[test]
    fn concurrent_registration_loses_no_entries() {
        let trees = InterestingTrees::new();
        let threads = 8;
        let per_thread = 500;

        thread::scope(|scope| {
            for worker in 0..threads {
                let trees = trees.clone();
                scope.spawn(move || {
                    let mut rng = ChaCha8Rng::from_seed([worker as u8; 32]);
                    for i in 0..per_thread {
                        trees.register(leaf(&format!("{worker}-{i}")));
                        // Interleave reads with the appends.
                        assert!(trees.random_tree(&mut rng).is_some());
                    }
                });
            }
        });

        assert_eq!(trees.len(), threads * per_thread);
        let distinct: HashSet<Vec<u8>> = (0..trees.len())
            .filter_map(|index| trees.get(index))
            .map(|tree| tree.flatten())
            .collect();
        assert_eq!(distinct.len(), threads * per_thread, "No update may be lost");
    }
}
