//! Per-partition k-mer hash index.
//!
//! For one partition, every non-discarded in-scope read contributes
//! index entries for both strands. The entry array is sorted by the low
//! bits of the k-mer value (a fixed-width bucket prefix), then by full
//! k-mer, and a direct-lookup table maps every prefix to its entry
//! range. Prefixes with no entries map to an explicitly empty range, so
//! lookups never special-case a sentinel. The index is immutable once
//! built and lives only for its partition's parallel phase.

use crate::error::{SkimError, SkimResult};
use crate::kmer::{KmerCodec, KmerWord};
use crate::megahub::ReadFlags;
use crate::partition::Partition;
use crate::sequence::SequenceStore;
use crate::types::{Orientation, ReadId};
use log::debug;
use rayon::prelude::*;

/// One k-mer occurrence in the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry<W: KmerWord> {
    pub kmer: W,
    pub read_id: ReadId,
    /// K-mer start in the coordinates of the entry's strand.
    pub pos: u32,
    pub freq_class: u8,
    pub orientation: Orientation,
}

/// Immutable sorted index over one partition.
#[derive(Debug)]
pub struct KmerIndex<W: KmerWord> {
    partition: Partition,
    prefix_bits: u32,
    entries: Vec<IndexEntry<W>>,
    /// `bucket_begin[p]..bucket_begin[p + 1]` is the entry range of
    /// prefix `p`; length is `(1 << prefix_bits) + 1`.
    bucket_begin: Vec<u32>,
}

impl<W: KmerWord> KmerIndex<W> {
    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries holding exactly `kmer`: O(1) to the prefix bucket,
    /// then a range search within it.
    pub fn lookup(&self, kmer: W) -> &[IndexEntry<W>] {
        let b = kmer.low_bits(self.prefix_bits) as usize;
        let lo = self.bucket_begin[b] as usize;
        let hi = self.bucket_begin[b + 1] as usize;
        assert!(
            lo <= hi && hi <= self.entries.len(),
            "prefix bucket {b} maps outside the entry array"
        );
        let bucket = &self.entries[lo..hi];
        let start = bucket.partition_point(|e| e.kmer < kmer);
        let end = bucket.partition_point(|e| e.kmer <= kmer);
        &bucket[start..end]
    }
}

/// Builds [`KmerIndex`] values for successive partitions.
#[derive(Debug, Clone, Copy)]
pub struct HashIndexBuilder<W: KmerWord> {
    codec: KmerCodec<W>,
    prefix_bits: u32,
}

impl<W: KmerWord> HashIndexBuilder<W> {
    /// `prefix_bits` is capped at `2 * k` so tiny k values cannot ask
    /// for buckets wider than the k-mer itself.
    pub fn new(k: u32, prefix_bits: u32) -> Self {
        Self {
            codec: KmerCodec::new(k),
            prefix_bits: prefix_bits.min(2 * k).min(28),
        }
    }

    pub fn prefix_bits(&self) -> u32 {
        self.prefix_bits
    }

    /// Build the index for `partition`. Megahub-flagged and discarded
    /// reads are left out. Allocation failure surfaces as
    /// [`SkimError::ResourceExhausted`] so the engine can retry with a
    /// smaller budget.
    pub fn build(
        &self,
        store: &SequenceStore,
        partition: Partition,
        partition_no: usize,
        flags: &ReadFlags,
    ) -> SkimResult<KmerIndex<W>> {
        let k = self.codec.k();

        // Upper bound: both strands of every in-scope read.
        let mut expected = 0usize;
        for id in partition.ids() {
            let seq = store.get(id);
            if seq.is_discarded() || flags.is_megahub(id) {
                continue;
            }
            expected += 2 * (seq.len().saturating_sub(k as usize - 1));
        }

        let mut entries: Vec<IndexEntry<W>> = Vec::new();
        entries
            .try_reserve_exact(expected)
            .map_err(|_| SkimError::ResourceExhausted {
                partition: partition_no,
                needed: expected,
            })?;

        for id in partition.ids() {
            let seq = store.get(id);
            if seq.is_discarded() || flags.is_megahub(id) {
                continue;
            }
            for orientation in [Orientation::Forward, Orientation::Complement] {
                for (kmer, pos) in self.codec.encode(id, seq, orientation)? {
                    let freq_class = match orientation {
                        Orientation::Forward => seq.freq_forward(pos),
                        Orientation::Complement => seq.freq_reverse(pos),
                    };
                    entries.push(IndexEntry {
                        kmer,
                        read_id: id,
                        pos,
                        freq_class,
                        orientation,
                    });
                }
            }
        }

        if entries.len() > u32::MAX as usize {
            return Err(SkimError::Internal(
                "partition holds more entries than the bucket table can address",
            ));
        }

        let prefix_bits = self.prefix_bits;
        entries.par_sort_unstable_by_key(|e| (e.kmer.low_bits(prefix_bits), e.kmer));

        let nb = 1usize << prefix_bits;
        let mut bucket_begin: Vec<u32> = Vec::new();
        bucket_begin
            .try_reserve_exact(nb + 1)
            .map_err(|_| SkimError::ResourceExhausted {
                partition: partition_no,
                needed: nb + 1,
            })?;
        bucket_begin.resize(nb + 1, 0);
        for e in &entries {
            bucket_begin[e.kmer.low_bits(prefix_bits) as usize + 1] += 1;
        }
        for b in 1..=nb {
            bucket_begin[b] += bucket_begin[b - 1];
        }

        debug!(
            "partition {partition_no}: indexed {} entries over reads {}..{}",
            entries.len(),
            partition.start,
            partition.end
        );

        Ok(KmerIndex {
            partition,
            prefix_bits,
            entries,
            bucket_begin,
        })
    }
}
