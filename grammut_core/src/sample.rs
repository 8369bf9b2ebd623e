/// A persisted fuzzing sample: the bytes a grammar encodes a tree into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Sample {
    bytes: Vec<u8>,
}

impl Sample {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Sample {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<Sample> for Vec<u8> {
    fn from(sample: Sample) -> Self {
        sample.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sample_wraps_bytes() {
        let sample = Sample::from(vec![1, 2, 3]);
        let empty = Sample::default();
        assert_eq!(sample.as_bytes(), &[1, 2, 3]);
        assert_eq!(sample.len(), 3);
        assert!(!sample.is_empty());
        assert!(empty.is_empty());
        assert_eq!(Vec::from(sample), vec![1, 2, 3]);
    }
}
