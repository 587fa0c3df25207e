//! Static sharding of work items across cooperating instances.
//!
//! Membership is `seahash(id) % total == index`. SeaHash is fixed and
//! unkeyed, so every machine and every release agrees on the assignment.

use std::fmt;

use seahash::hash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Partition index {index} must be between 0 and {}", .total.saturating_sub(1))]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("Total partitions must be at least 2, got {0}")]
    TooFewPartitions(u32),

    #[error("Partition index and total partitions must be given together")]
    Incomplete,
}

/// A validated `(index, total)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPartition")]
pub struct Partition {
    index: u32,
    total: u32,
}

#[derive(Deserialize)]
struct RawPartition {
    index: u32,
    total: u32,
}

impl TryFrom<RawPartition> for Partition {
    type Error = PartitionError;

    fn try_from(raw: RawPartition) -> Result<Self, Self::Error> {
        Partition::new(raw.index, raw.total)
    }
}

impl Partition {
    pub fn new(index: u32, total: u32) -> Result<Self, PartitionError> {
        if total < 2 {
            return Err(PartitionError::TooFewPartitions(total));
        }
        if index >= total {
            return Err(PartitionError::IndexOutOfRange { index, total });
        }
        Ok(Self { index, total })
    }

    /// Builds an optional partition from two optional halves. Both or
    /// neither must be present.
    pub fn from_parts(index: Option<u32>, total: Option<u32>) -> Result<Option<Self>, PartitionError> {
        match (index, total) {
            (None, None) => Ok(None),
            (Some(index), Some(total)) => Self::new(index, total).map(Some),
            _ => Err(PartitionError::Incomplete),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        partition_of(id, self.total) == self.index
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index + 1, self.total)
    }
}

/// Index of the partition `id` is assigned to. `total` must be non-zero.
fn partition_of(id: &str, total: u32) -> u32 {
    (hash(id.as_bytes()) % u64::from(total)) as u32
}

/// Validating membership test.
pub fn belongs(id: &str, partition_index: u32, total_partitions: u32) -> Result<bool, PartitionError> {
    Ok(Partition::new(partition_index, total_partitions)?.contains(id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("workitem-{i:05}")).collect()
    }

    #[test]
    fn test_rejects_bad_bounds() {
        assert_eq!(Partition::new(0, 1), Err(PartitionError::TooFewPartitions(1)));
        assert_eq!(Partition::new(0, 0), Err(PartitionError::TooFewPartitions(0)));
        assert_eq!(
            Partition::new(2, 2),
            Err(PartitionError::IndexOutOfRange { index: 2, total: 2 })
        );
        assert!(Partition::new(1, 2).is_ok());
        assert!(belongs("x", 3, 3).is_err());
    }

    #[test]
    fn test_from_parts_requires_both() {
        assert_eq!(Partition::from_parts(None, None), Ok(None));
        assert_eq!(Partition::from_parts(Some(0), None), Err(PartitionError::Incomplete));
        assert_eq!(Partition::from_parts(None, Some(2)), Err(PartitionError::Incomplete));
        assert_eq!(
            Partition::from_parts(Some(1), Some(3)).unwrap(),
            Some(Partition::new(1, 3).unwrap())
        );
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let all = ids(2_000);
        for total in [2u32, 3, 5, 8, 13] {
            let mut seen = HashSet::new();
            for index in 0..total {
                for id in all.iter().filter(|id| belongs(id, index, total).unwrap()) {
                    assert!(seen.insert(id.clone()), "{id} assigned twice with total={total}");
                }
            }
            assert_eq!(seen.len(), all.len(), "total={total} dropped ids");
        }
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let p = Partition::new(0, 4).unwrap();
        for id in ids(100) {
            assert_eq!(p.contains(&id), p.contains(&id));
            assert_eq!(partition_of(&id, 4), partition_of(&id, 4));
        }
    }

    #[test]
    fn test_assignment_spreads_load() {
        let all = ids(4_000);
        let total = 4;
        for index in 0..total {
            let n = all.iter().filter(|id| belongs(id, index, total).unwrap()).count();
            assert!(n > 700 && n < 1300, "partition {index} got {n}");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Partition = serde_json::from_str(r#"{"index": 1, "total": 2}"#).unwrap();
        assert_eq!(ok.to_string(), "2/2");
        assert!(serde_json::from_str::<Partition>(r#"{"index": 2, "total": 2}"#).is_err());
    }
}
