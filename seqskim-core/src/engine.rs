//! Run orchestration.
//!
//! The engine plans memory-bounded partitions over the read pool and,
//! for each one, builds the hash index single-threaded, runs the
//! parallel probing phase, and joins all workers before moving on.
//! Index allocation failure shrinks the partition budget and replans
//! the not-yet-covered tail of the pool; completed partitions are never
//! redone. The k-mer word width is picked once from the configured k.

use crate::config::SkimConfig;
use crate::criterion::CriterionTracker;
use crate::dispatch::{run_partition, PartitionStats};
use crate::error::{SkimError, SkimResult};
use crate::index::HashIndexBuilder;
use crate::kmer::{width_for_k, KmerWidth, KmerWord, U256, U512};
use crate::megahub::ReadFlags;
use crate::partition::{Partition, PartitionPlanner};
use crate::sequence::SequenceStore;
use crate::writer::ResultWriter;
use log::{info, warn};
use std::io::Write;

/// Summary of a completed skim run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SkimStats {
    pub partitions: usize,
    pub budget_retries: usize,
    pub reads_probed: u64,
    pub raw_matches: u64,
    pub candidates: u64,
    pub hits_forward: u64,
    pub hits_complement: u64,
    pub megahubs_flagged: u64,
    /// Accepted hits per read, both roles counted.
    pub accepted_per_read: Vec<u32>,
    /// Final best-quality levels per read, for the reduction pass.
    pub criterion_levels: Vec<[u8; 4]>,
}

impl SkimStats {
    fn absorb(&mut self, p: &PartitionStats) {
        self.reads_probed += p.reads_probed;
        self.raw_matches += p.raw_matches;
        self.candidates += p.candidates;
        self.hits_forward += p.hits_forward;
        self.hits_complement += p.hits_complement;
        self.megahubs_flagged += p.megahubs_flagged;
    }
}

/// Overlap skimming engine, configured once, reusable across pools.
#[derive(Debug, Clone)]
pub struct SkimEngine {
    cfg: SkimConfig,
}

impl SkimEngine {
    pub fn new(cfg: SkimConfig) -> SkimResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &SkimConfig {
        &self.cfg
    }

    /// Skim the whole pool, appending accepted hits to the two
    /// orientation streams.
    pub fn run<Out: Write + Send>(
        &self,
        store: &SequenceStore,
        forward: Out,
        complement: Out,
    ) -> SkimResult<SkimStats> {
        match width_for_k(self.cfg.k) {
            KmerWidth::W64 => self.run_inner::<u64, Out>(store, forward, complement),
            KmerWidth::W128 => self.run_inner::<u128, Out>(store, forward, complement),
            KmerWidth::W256 => self.run_inner::<U256, Out>(store, forward, complement),
            KmerWidth::W512 => self.run_inner::<U512, Out>(store, forward, complement),
        }
    }

    fn run_inner<W: KmerWord, Out: Write + Send>(
        &self,
        store: &SequenceStore,
        forward: Out,
        complement: Out,
    ) -> SkimResult<SkimStats> {
        let cfg = &self.cfg;
        let flags = ReadFlags::new(store.len());
        let criteria = CriterionTracker::new(store.len());
        let writer = ResultWriter::new(forward, complement, store.len());
        let builder = HashIndexBuilder::<W>::new(cfg.k, cfg.prefix_bits);
        let lengths = store.read_lengths();

        let mut stats = SkimStats::default();
        let mut budget = cfg.memory_budget_kmers;
        let mut next_start = 0u32;

        'replan: loop {
            let plan = PartitionPlanner::new(budget).plan(&lengths[next_start as usize..]);
            for p in plan {
                let partition = Partition {
                    start: p.start + next_start,
                    end: p.end + next_start,
                };
                let index = match builder.build(store, partition, stats.partitions, &flags) {
                    Ok(index) => index,
                    Err(e @ SkimError::ResourceExhausted { .. }) => {
                        let halved = budget / 2;
                        if halved < cfg.min_partition_budget_kmers {
                            return Err(e);
                        }
                        warn!(
                            "partition budget {budget} k-mers exhausted, \
                             retrying the remaining reads at {halved}"
                        );
                        budget = halved;
                        stats.budget_retries += 1;
                        continue 'replan;
                    }
                    Err(e) => return Err(e),
                };
                info!(
                    "partition {}: reads {}..{}, {} index entries",
                    stats.partitions,
                    partition.start,
                    partition.end,
                    index.entry_count()
                );
                let ps = run_partition(
                    cfg,
                    store,
                    &index,
                    stats.partitions,
                    &flags,
                    &criteria,
                    &writer,
                )?;
                stats.absorb(&ps);
                stats.partitions += 1;
                next_start = partition.end;
            }
            break;
        }

        stats.accepted_per_read = writer.finish()?;
        stats.criterion_levels = criteria.snapshot();
        info!(
            "skim done: {} partitions, {} reads probed, {} forward + {} complement hits, \
             {} megahubs",
            stats.partitions,
            stats.reads_probed,
            stats.hits_forward,
            stats.hits_complement,
            stats.megahubs_flagged
        );
        Ok(stats)
    }
}
