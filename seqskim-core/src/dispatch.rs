//! Parallel probing of one partition index.
//!
//! A master thread feeds query-read id chunks through a bounded channel
//! to a fixed pool of workers. Each worker probes its queries against
//! the immutable partition index, aggregates the raw matches, screens
//! for megahubs, serializes accepted hits in bulk, and batches
//! criterion-level updates per query. Channel semantics guarantee no
//! chunk reaches two workers; the scope join guarantees every worker is
//! done before the caller moves to the next partition. The first worker
//! error aborts the whole partition.

use crate::aggregate::MatchAggregator;
use crate::config::{SkimConfig, TechnologyTable};
use crate::criterion::{
    quality_level, CriterionTracker, CriterionUpdate, ExtensionSide, RepeatClass, LEVEL_UNSET,
};
use crate::error::{SkimError, SkimResult};
use crate::index::KmerIndex;
use crate::kmer::{KmerCodec, KmerWord};
use crate::megahub::{MegahubGuard, MegahubVerdict, ReadFlags};
use crate::sequence::SequenceStore;
use crate::types::{CandidateOverlap, Orientation, RawMatch, ReadId};
use crate::writer::{ResultWriter, SkimHit};
use crossbeam::channel;
use log::{debug, warn};
use std::io::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Counters of one partition's parallel phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub reads_probed: u64,
    pub raw_matches: u64,
    pub candidates: u64,
    pub hits_forward: u64,
    pub hits_complement: u64,
    pub megahubs_flagged: u64,
}

impl PartitionStats {
    fn merge(&mut self, other: &PartitionStats) {
        self.reads_probed += other.reads_probed;
        self.raw_matches += other.raw_matches;
        self.candidates += other.candidates;
        self.hits_forward += other.hits_forward;
        self.hits_complement += other.hits_complement;
        self.megahubs_flagged += other.megahubs_flagged;
    }
}

/// Successive half-open id chunks covering `0..total` exactly once.
fn chunk_ranges(total: u32, chunk_size: u32) -> impl Iterator<Item = Range<ReadId>> {
    (0..total)
        .step_by(chunk_size as usize)
        .map(move |start| start..start.saturating_add(chunk_size).min(total))
}

/// Run the parallel probing phase for one built partition index.
///
/// Every read of the pool is a potential query; matches are only taken
/// against index entries with a strictly larger read id, so each
/// unordered pair surfaces exactly once per orientation across the
/// whole run.
pub fn run_partition<W: KmerWord, Out: Write + Send>(
    cfg: &SkimConfig,
    store: &SequenceStore,
    index: &KmerIndex<W>,
    partition_no: usize,
    flags: &ReadFlags,
    criteria: &CriterionTracker,
    writer: &ResultWriter<Out>,
) -> SkimResult<PartitionStats> {
    let threads = cfg.effective_threads();
    let (tx, rx) = channel::bounded::<Range<ReadId>>(threads * 4);
    let abort = AtomicBool::new(false);
    let first_error: Mutex<Option<SkimError>> = Mutex::new(None);
    let totals: Mutex<PartitionStats> = Mutex::new(PartitionStats::default());

    crossbeam::scope(|scope| {
        for _ in 0..threads {
            let rx = rx.clone();
            let abort = &abort;
            let first_error = &first_error;
            let totals = &totals;
            scope.spawn(move |_| {
                let mut ctx = WorkerContext::new(cfg, store, index, flags, criteria, writer);
                for chunk in rx.iter() {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(e) = ctx.process_chunk(chunk) {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        abort.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                totals.lock().unwrap().merge(&ctx.stats);
            });
        }
        drop(rx);

        for chunk in chunk_ranges(store.len() as u32, cfg.chunk_size) {
            if abort.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(chunk).is_err() {
                break;
            }
        }
        drop(tx);
    })
    .map_err(|_| SkimError::WorkerPanicked {
        partition: partition_no,
    })?;

    if let Some(e) = first_error.lock().unwrap().take() {
        return Err(e);
    }

    let stats = *totals.lock().unwrap();
    debug!(
        "partition {partition_no}: probed {} reads, {} raw matches, {} candidates",
        stats.reads_probed, stats.raw_matches, stats.candidates
    );
    Ok(stats)
}

/// Per-worker scratch state, reused across chunks.
struct WorkerContext<'a, W: KmerWord, Out: Write> {
    codec: KmerCodec<W>,
    aggregator: MatchAggregator<'a>,
    guard: MegahubGuard,
    technologies: &'a TechnologyTable,
    store: &'a SequenceStore,
    index: &'a KmerIndex<W>,
    flags: &'a ReadFlags,
    criteria: &'a CriterionTracker,
    writer: &'a ResultWriter<Out>,
    raw: Vec<RawMatch>,
    hits_fwd: Vec<SkimHit>,
    hits_cmpl: Vec<SkimHit>,
    updates: Vec<CriterionUpdate>,
    stats: PartitionStats,
}

impl<'a, W: KmerWord, Out: Write> WorkerContext<'a, W, Out> {
    fn new(
        cfg: &'a SkimConfig,
        store: &'a SequenceStore,
        index: &'a KmerIndex<W>,
        flags: &'a ReadFlags,
        criteria: &'a CriterionTracker,
        writer: &'a ResultWriter<Out>,
    ) -> Self {
        Self {
            codec: KmerCodec::new(cfg.k),
            aggregator: MatchAggregator::new(cfg.k, store, &cfg.technologies),
            guard: MegahubGuard::new(cfg.megahub_cap),
            technologies: &cfg.technologies,
            store,
            index,
            flags,
            criteria,
            writer,
            raw: Vec::new(),
            hits_fwd: Vec::new(),
            hits_cmpl: Vec::new(),
            updates: Vec::new(),
            stats: PartitionStats::default(),
        }
    }

    fn process_chunk(&mut self, chunk: Range<ReadId>) -> SkimResult<()> {
        for query_id in chunk {
            self.process_query(query_id)?;
        }
        // Bulk handover: one stream lock per orientation per chunk.
        self.stats.hits_forward += self.hits_fwd.len() as u64;
        self.stats.hits_complement += self.hits_cmpl.len() as u64;
        self.writer.write_batch(Orientation::Forward, &self.hits_fwd)?;
        self.writer
            .write_batch(Orientation::Complement, &self.hits_cmpl)?;
        self.hits_fwd.clear();
        self.hits_cmpl.clear();
        self.criteria.apply_batch(&self.updates);
        self.updates.clear();
        Ok(())
    }

    fn process_query(&mut self, query_id: ReadId) -> SkimResult<()> {
        let query = self.store.get(query_id);
        if query.is_discarded() || self.flags.skip_as_query(query_id) {
            return Ok(());
        }
        self.stats.reads_probed += 1;

        // The query probes its forward strand only; the index carries
        // both strands, so the matched entry decides the orientation.
        self.raw.clear();
        for (kmer, pos) in self.codec.encode(query_id, query, Orientation::Forward)? {
            for entry in self.index.lookup(kmer) {
                if entry.read_id <= query_id {
                    continue;
                }
                let freq = entry.freq_class.max(query.freq_forward(pos));
                self.raw
                    .push(RawMatch::new(entry.read_id, pos, entry.pos, freq, entry.orientation));
            }
        }
        self.stats.raw_matches += self.raw.len() as u64;

        match self.guard.screen(&mut self.raw) {
            MegahubVerdict::Clean => {}
            MegahubVerdict::Trimmed { removed } => {
                debug!("read {query_id}: megahub screen removed {removed} high-frequency matches");
            }
            MegahubVerdict::Flagged => {
                warn!("read {query_id}: confirmed megahub, excluded for the rest of the run");
                self.flags.flag_megahub(query_id);
                self.stats.megahubs_flagged += 1;
                return Ok(());
            }
        }

        let candidates = self.aggregator.aggregate(query_id, &mut self.raw);
        self.stats.candidates += candidates.len() as u64;
        for mut c in candidates {
            self.record_candidate(query_id, &mut c);
        }
        Ok(())
    }

    fn record_candidate(&mut self, query_id: ReadId, c: &mut CandidateOverlap) {
        let hit = SkimHit::from_candidate(query_id, c);
        match c.orientation {
            Orientation::Forward => self.hits_fwd.push(hit),
            Orientation::Complement => self.hits_cmpl.push(hit),
        }
        c.taken = true;

        let query = self.store.get(query_id);
        let partner = self.store.get(c.partner_id);
        let qlen = query.len() as i64;
        let plen = partner.len() as i64;
        let offset = c.offset as i64;

        // Partner occupies [offset, offset + plen) in query coordinates.
        if offset <= 0 && offset + plen >= qlen && c.percent_identity == 100 {
            self.flags.mark_encased(query_id);
        }

        let class = if c.flags.is_norept {
            RepeatClass::NoRept
        } else {
            RepeatClass::Other
        };

        let q_level = quality_level(
            &self.technologies.get(query.technology()),
            c.percent_identity,
            c.estimated_len,
            qlen as u32,
        );
        let p_level = quality_level(
            &self.technologies.get(partner.technology()),
            c.percent_identity,
            c.estimated_len,
            plen as u32,
        );

        // Only the direction an overlap actually extends gets a level.
        if q_level != LEVEL_UNSET {
            if offset < 0 {
                self.push_update(query_id, ExtensionSide::Left, class, q_level);
            }
            if offset + plen > qlen {
                self.push_update(query_id, ExtensionSide::Right, class, q_level);
            }
        }
        if p_level != LEVEL_UNSET {
            // Mirror geometry: the query occupies [-offset, -offset +
            // qlen) in partner coordinates. On the complement strand the
            // partner's physical ends are swapped.
            let flip = c.orientation == Orientation::Complement;
            if offset > 0 {
                let side = if flip {
                    ExtensionSide::Left.flipped()
                } else {
                    ExtensionSide::Left
                };
                self.push_update(c.partner_id, side, class, p_level);
            }
            if qlen - offset > plen {
                let side = if flip {
                    ExtensionSide::Right.flipped()
                } else {
                    ExtensionSide::Right
                };
                self.push_update(c.partner_id, side, class, p_level);
            }
        }
    }

    fn push_update(&mut self, read: ReadId, side: ExtensionSide, class: RepeatClass, level: u8) {
        self.updates.push(CriterionUpdate {
            read,
            side,
            class,
            level,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Technology;
    use crate::index::HashIndexBuilder;
    use crate::partition::Partition;
    use crate::sequence::Sequence;
    use crate::writer::read_hits;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn random_bases(rng: &mut StdRng, n: usize) -> Vec<u8> {
        (0..n).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }

    /// Two reads sharing a 100-base region with the partner hanging 100
    /// bases to the right of the query.
    fn overlapping_store(seed: u64) -> SequenceStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = random_bases(&mut rng, 200);
        let mut b = a[100..].to_vec();
        b.extend(random_bases(&mut rng, 100));
        let mut store = SequenceStore::new();
        store.push(Sequence::new(a, Technology::Sanger)).unwrap();
        store.push(Sequence::new(b, Technology::Sanger)).unwrap();
        store
    }

    fn skim(
        store: &SequenceStore,
        cfg: &SkimConfig,
    ) -> (PartitionStats, Vec<SkimHit>, Vec<SkimHit>) {
        let partition = Partition {
            start: 0,
            end: store.len() as u32,
        };
        let flags = ReadFlags::new(store.len());
        let criteria = CriterionTracker::new(store.len());
        let builder = HashIndexBuilder::<u64>::new(cfg.k, cfg.prefix_bits);
        let index = builder.build(store, partition, 0, &flags).unwrap();
        let writer = ResultWriter::new(Vec::new(), Vec::new(), store.len());
        let stats =
            run_partition(cfg, store, &index, 0, &flags, &criteria, &writer).unwrap();
        let (fwd_buf, cmpl_buf, _accepted) = writer.into_parts().unwrap();
        let fwd = read_hits(&mut Cursor::new(fwd_buf)).unwrap();
        let cmpl = read_hits(&mut Cursor::new(cmpl_buf)).unwrap();
        (stats, fwd, cmpl)
    }

    #[test]
    fn chunks_cover_ids_exactly_once() {
        let mut seen = Vec::new();
        for range in chunk_ranges(10, 3) {
            seen.extend(range);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(chunk_ranges(0, 3).count(), 0);
        assert_eq!(chunk_ranges(3, 3).count(), 1);
    }

    #[test]
    fn finds_the_planted_overlap() {
        let store = overlapping_store(11);
        let mut cfg = SkimConfig::default();
        cfg.k = 16;
        cfg.threads = 2;
        let (stats, fwd, cmpl) = skim(&store, &cfg);
        assert_eq!(stats.reads_probed, 2);
        assert_eq!(fwd.len(), 1);
        assert!(cmpl.is_empty());
        let hit = &fwd[0];
        assert_eq!((hit.rid1, hit.rid2), (0, 1));
        assert_eq!(hit.offset, 100);
        assert_eq!(hit.percent_identity, 100);
        assert!(hit.flags.is_norept);
    }

    #[test]
    fn thread_counts_do_not_change_the_result() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut store = SequenceStore::new();
        for _ in 0..40 {
            let bases = random_bases(&mut rng, 120);
            store.push(Sequence::new(bases, Technology::Sanger)).unwrap();
        }
        // Plant some real overlaps.
        for src in 0..8u32 {
            let shared = store.get(src).bases()[40..].to_vec();
            let mut bases = shared;
            bases.extend(random_bases(&mut rng, 60));
            store.push(Sequence::new(bases, Technology::Sanger)).unwrap();
        }

        let mut cfg = SkimConfig::default();
        cfg.k = 14;
        cfg.chunk_size = 4;

        cfg.threads = 1;
        let (_, mut fwd1, mut cmpl1) = skim(&store, &cfg);
        cfg.threads = 4;
        let (_, mut fwd4, mut cmpl4) = skim(&store, &cfg);

        let key = |h: &SkimHit| (h.rid1, h.rid2, h.offset);
        fwd1.sort_unstable_by_key(key);
        fwd4.sort_unstable_by_key(key);
        cmpl1.sort_unstable_by_key(key);
        cmpl4.sort_unstable_by_key(key);
        assert_eq!(fwd1, fwd4);
        assert_eq!(cmpl1, cmpl4);
        assert!(!fwd1.is_empty());
    }

    #[test]
    fn reverse_complement_pairs_land_on_the_complement_stream() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_bases(&mut rng, 200);
        let rc: Vec<u8> = a
            .iter()
            .rev()
            .map(|&b| crate::kmer::complement_base(b))
            .collect();
        let mut store = SequenceStore::new();
        store.push(Sequence::new(a, Technology::Sanger)).unwrap();
        store.push(Sequence::new(rc, Technology::Sanger)).unwrap();

        let mut cfg = SkimConfig::default();
        cfg.k = 16;
        let (_, fwd, cmpl) = skim(&store, &cfg);
        assert!(fwd.is_empty());
        assert_eq!(cmpl.len(), 1);
        assert_eq!((cmpl[0].rid1, cmpl[0].rid2), (0, 1));
        assert_eq!(cmpl[0].percent_identity, 100);
    }

    #[test]
    fn each_pair_is_reported_once() {
        // Identical reads: without the id ordering rule both directions
        // would report.
        let mut rng = StdRng::seed_from_u64(3);
        let bases = random_bases(&mut rng, 150);
        let mut store = SequenceStore::new();
        store
            .push(Sequence::new(bases.clone(), Technology::Sanger))
            .unwrap();
        store.push(Sequence::new(bases, Technology::Sanger)).unwrap();

        let mut cfg = SkimConfig::default();
        cfg.k = 16;
        let (_, fwd, _) = skim(&store, &cfg);
        let direct: Vec<_> = fwd.iter().filter(|h| h.offset == 0).collect();
        assert_eq!(direct.len(), 1);
        assert_eq!((direct[0].rid1, direct[0].rid2), (0, 1));
    }

    #[test]
    fn megahub_query_is_flagged_and_silenced() {
        // A low-complexity read matching everything: every k-mer of
        // every partner at frequency class 1, cap forced tiny.
        let mut store = SequenceStore::new();
        for _ in 0..4 {
            store
                .push(Sequence::new(vec![b'A'; 120], Technology::Sanger))
                .unwrap();
        }
        let mut cfg = SkimConfig::default();
        cfg.k = 16;
        cfg.megahub_cap = 10;
        let partition = Partition { start: 0, end: 4 };
        let flags = ReadFlags::new(4);
        let criteria = CriterionTracker::new(4);
        let builder = HashIndexBuilder::<u64>::new(cfg.k, cfg.prefix_bits);
        let index = builder.build(&store, partition, 0, &flags).unwrap();
        let writer = ResultWriter::new(Vec::new(), Vec::new(), 4);
        let stats = run_partition(&cfg, &store, &index, 0, &flags, &criteria, &writer).unwrap();
        assert!(stats.megahubs_flagged > 0);
        assert!(flags.is_megahub(0));
    }
}
