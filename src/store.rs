//! Immutable vector arena with one label per vector.

use crate::AcornError;

/// Metadata value attached to every stored vector.
pub type Label = u32;

/// Flat, row-major storage of `N` vectors of dimension `d` plus their labels.
///
/// Identifiers are dense `u32` values in `[0, N)` assigned in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore {
    dim: usize,
    data: Vec<f32>,
    labels: Vec<Label>,
}

impl VectorStore {
    /// Build a store from per-vector rows and an aligned label sequence.
    pub fn new(vectors: Vec<Vec<f32>>, labels: Vec<Label>) -> Result<Self, AcornError> {
        let first = vectors.first().ok_or(AcornError::EmptyInput)?;
        let dim = first.len();
        if dim == 0 {
            return Err(AcornError::InvalidParameters(
                "vectors must have a positive dimension",
            ));
        }
        if labels.len() != vectors.len() {
            return Err(AcornError::DimensionMismatch {
                expected: vectors.len(),
                got: labels.len(),
            });
        }
        if vectors.len() > u32::MAX as usize {
            return Err(AcornError::InvalidParameters(
                "vector count exceeds u32 identifier space",
            ));
        }

        let mut data = Vec::with_capacity(dim * vectors.len());
        for vector in &vectors {
            if vector.len() != dim {
                return Err(AcornError::DimensionMismatch {
                    expected: dim,
                    got: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dim, data, labels })
    }

    /// Build a store where every vector carries label `0`.
    pub fn with_default_labels(vectors: Vec<Vec<f32>>) -> Result<Self, AcornError> {
        let labels = vec![0; vectors.len()];
        Self::new(vectors, labels)
    }

    /// Build a store from a flat row-major buffer.
    ///
    /// Unlike [`VectorStore::new`], an empty store is allowed here because the
    /// dimension is known up front; building a graph over it still fails.
    pub fn from_flat(dim: usize, data: Vec<f32>, labels: Vec<Label>) -> Result<Self, AcornError> {
        if dim == 0 {
            return Err(AcornError::InvalidParameters(
                "vectors must have a positive dimension",
            ));
        }
        let expected = dim
            .checked_mul(labels.len())
            .ok_or(AcornError::InvalidParameters("store size overflows usize"))?;
        if data.len() != expected {
            return Err(AcornError::DimensionMismatch {
                expected,
                got: data.len(),
            });
        }
        if labels.len() > u32::MAX as usize {
            return Err(AcornError::InvalidParameters(
                "vector count exceeds u32 identifier space",
            ));
        }
        Ok(Self { dim, data, labels })
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dimension shared by every vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// All labels, indexed by identifier.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Fetch the vector and label stored under `id`.
    pub fn get(&self, id: usize) -> Result<(&[f32], Label), AcornError> {
        if id >= self.len() {
            return Err(AcornError::OutOfRange {
                id,
                len: self.len(),
            });
        }
        Ok((self.vector(id as u32), self.labels[id]))
    }

    /// Iterate over the stored vectors in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dim)
    }

    #[inline]
    pub(crate) fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    #[inline]
    pub(crate) fn label(&self, id: u32) -> Label {
        self.labels[id as usize]
    }

    pub(crate) fn raw_data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_labels_are_zero() {
        let store = VectorStore::with_default_labels(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.labels(), &[0, 0]);
        assert!(matches!(
            VectorStore::with_default_labels(Vec::new()),
            Err(AcornError::EmptyInput)
        ));
    }

    #[test]
    fn rejects_inconsistent_input() {
        let err = VectorStore::new(vec![vec![1.0, 2.0], vec![3.0]], vec![0, 1]).unwrap_err();
        assert!(matches!(
            err,
            AcornError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        ));

        let err = VectorStore::new(vec![vec![1.0], vec![2.0]], vec![0]).unwrap_err();
        assert!(matches!(
            err,
            AcornError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        ));

        assert!(matches!(
            VectorStore::new(Vec::new(), Vec::new()),
            Err(AcornError::EmptyInput)
        ));
        assert!(matches!(
            VectorStore::from_flat(0, Vec::new(), Vec::new()),
            Err(AcornError::InvalidParameters(_))
        ));
    }

    #[test]
    fn get_returns_vector_and_label() {
        let store = VectorStore::new(vec![vec![0.0, 1.0], vec![2.0, 3.0]], vec![7, 9]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.dim(), 2);
        let (vector, label) = store.get(1).unwrap();
        assert_eq!(vector, &[2.0, 3.0]);
        assert_eq!(label, 9);
        assert!(matches!(
            store.get(2),
            Err(AcornError::OutOfRange { id: 2, len: 2 })
        ));
        assert_eq!(store.iter().count(), 2);
    }

    #[test]
    fn flat_store_may_be_empty() {
        let store = VectorStore::from_flat(3, Vec::new(), Vec::new()).unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            VectorStore::from_flat(3, vec![1.0; 5], vec![0, 0]),
            Err(AcornError::DimensionMismatch {
                expected: 6,
                got: 5
            })
        ));
    }
}
