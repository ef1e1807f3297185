//! Partition planning.
//!
//! Splits the read-id space into sequential partitions whose expected
//! k-mer count (approximately the clipped length of each read) fits a
//! memory budget, so one partition's hash index fits in memory. Plans
//! are deterministic for identical inputs: the same plan is reused for
//! both probing directions and must reproduce byte-identical output.

use crate::types::ReadId;

/// Half-open id range `[start, end)` of reads indexed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: ReadId,
    pub end: ReadId,
}

impl Partition {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, id: ReadId) -> bool {
        id >= self.start && id < self.end
    }

    pub fn ids(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

/// Memory-budgeted planner over read lengths.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlanner {
    budget_kmers: usize,
}

impl PartitionPlanner {
    pub fn new(budget_kmers: usize) -> Self {
        Self { budget_kmers }
    }

    pub fn budget(&self) -> usize {
        self.budget_kmers
    }

    /// Plan partitions covering `read_lengths` exactly once, in id
    /// order. A partition closes when the running expected k-mer count
    /// would exceed the budget; a single over-budget read still gets a
    /// partition of its own (best effort, not an error). An empty pool
    /// yields one empty partition.
    pub fn plan(&self, read_lengths: &[u32]) -> Vec<Partition> {
        if read_lengths.is_empty() {
            return vec![Partition { start: 0, end: 0 }];
        }
        let mut partitions = Vec::new();
        let mut start = 0u32;
        let mut running = 0usize;
        for (i, &len) in read_lengths.iter().enumerate() {
            let expected = len as usize;
            if running > 0 && running + expected > self.budget_kmers {
                partitions.push(Partition {
                    start,
                    end: i as u32,
                });
                start = i as u32;
                running = 0;
            }
            running += expected;
        }
        partitions.push(Partition {
            start,
            end: read_lengths.len() as u32,
        });
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_yields_one_empty_partition() {
        let plan = PartitionPlanner::new(100).plan(&[]);
        assert_eq!(plan, vec![Partition { start: 0, end: 0 }]);
    }

    #[test]
    fn splits_on_budget() {
        let plan = PartitionPlanner::new(100).plan(&[60, 60, 60]);
        assert_eq!(
            plan,
            vec![
                Partition { start: 0, end: 1 },
                Partition { start: 1, end: 2 },
                Partition { start: 2, end: 3 },
            ]
        );
    }

    #[test]
    fn packs_while_under_budget() {
        let plan = PartitionPlanner::new(100).plan(&[40, 40, 40, 40]);
        assert_eq!(
            plan,
            vec![
                Partition { start: 0, end: 2 },
                Partition { start: 2, end: 4 },
            ]
        );
    }

    #[test]
    fn oversized_read_gets_its_own_partition() {
        let plan = PartitionPlanner::new(50).plan(&[400, 10, 10]);
        assert_eq!(plan[0], Partition { start: 0, end: 1 });
        assert_eq!(plan[1], Partition { start: 1, end: 3 });
    }

    #[test]
    fn coverage_is_exact_and_ordered() {
        let lengths: Vec<u32> = (0..257).map(|i| (i % 97) + 3).collect();
        let plan = PartitionPlanner::new(500).plan(&lengths);
        assert_eq!(plan.first().unwrap().start, 0);
        assert_eq!(plan.last().unwrap().end, lengths.len() as u32);
        for w in plan.windows(2) {
            assert_eq!(w[0].end, w[1].start);
            assert!(w[0].start < w[0].end);
        }
    }

    #[test]
    fn plans_are_idempotent() {
        let lengths: Vec<u32> = (0..1000).map(|i| ((i * 37) % 211) as u32 + 1).collect();
        let planner = PartitionPlanner::new(1234);
        assert_eq!(planner.plan(&lengths), planner.plan(&lengths));
    }
}
