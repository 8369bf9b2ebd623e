use std::collections::HashSet;

/// Treats an output as interesting the first time its bytes are seen.
#[derive(Default)]
pub struct UniqueOutputFeedback {
    known_hashes: HashSet<[u8; 16]>,
}

impl UniqueOutputFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `output`, returning its digest if it had not been seen before.
    pub fn observe(&mut self, output: &[u8]) -> Option<md5::Digest> {
        let hash = md5::compute(output);
        self.known_hashes.insert(hash.0).then_some(hash)
    }

    pub fn len(&self) -> usize {
        self.known_hashes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_sighting_is_interesting() {
        let mut feedback = UniqueOutputFeedback::new();
        assert!(feedback.observe(b"1 + 2").is_some());
        assert!(feedback.observe(b"1 + 2").is_none());
        assert!(feedback.observe(b"1 + 3").is_some());
        assert_eq!(feedback.len(), 2);
    }
}
