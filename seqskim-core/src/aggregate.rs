//! Raw-match aggregation.
//!
//! Groups one query read's raw matches by partner, walks them as runs
//! of offset-consistent k-mer hits, and estimates overlap geometry and
//! identity per run. Everything here is an estimate from k-mer
//! coverage; the engine never aligns.

use crate::config::TechnologyTable;
use crate::sequence::SequenceStore;
use crate::types::{CandidateOverlap, Orientation, RawMatch, ReadId, RepeatFlags};

/// Frequency class at or above which a supporting k-mer marks the run
/// repetitive. Tuned value, not derived.
const REPT_FREQ: u8 = 5;
/// Frequency class at or below which a stretch counts toward the
/// weak/strong "good" classification. Tuned value, not derived.
const GOOD_FREQ: u8 = 3;

/// Per-query aggregation over a read pool.
pub struct MatchAggregator<'a> {
    k: u32,
    store: &'a SequenceStore,
    technologies: &'a TechnologyTable,
    pool_mean_freq: f32,
}

impl<'a> MatchAggregator<'a> {
    pub fn new(k: u32, store: &'a SequenceStore, technologies: &'a TechnologyTable) -> Self {
        Self {
            k,
            store,
            technologies,
            pool_mean_freq: store.mean_freq_class(),
        }
    }

    /// Turn one query read's raw matches into accepted overlap
    /// candidates. `matches` is reordered in place.
    ///
    /// Sorting includes the offset so that a partner carrying several
    /// copies of the same query region (interleaved offsets at the same
    /// query positions) groups into one contiguous run per copy instead
    /// of shattering at every offset alternation.
    pub fn aggregate(&self, query_id: ReadId, matches: &mut [RawMatch]) -> Vec<CandidateOverlap> {
        if matches.is_empty() {
            return Vec::new();
        }
        matches.sort_unstable_by_key(|m| (m.orientation, m.partner_id, m.offset, m.query_pos));

        let mut candidates = Vec::new();
        let mut run_start = 0usize;
        for i in 1..=matches.len() {
            let split = if i == matches.len() {
                true
            } else {
                let prev = &matches[i - 1];
                let cur = &matches[i];
                cur.partner_id != prev.partner_id
                    || cur.orientation != prev.orientation
                    || (cur.offset as i64 - prev.offset as i64).unsigned_abs()
                        > self.jump_tolerance(query_id, cur.partner_id) as u64
            };
            if split {
                if let Some(c) = self.run_to_candidate(query_id, &matches[run_start..i]) {
                    candidates.push(c);
                }
                run_start = i;
            }
        }
        candidates
    }

    /// Offset jump tolerance for a read pair: the noisier of the two
    /// technologies decides.
    fn jump_tolerance(&self, query_id: ReadId, partner_id: ReadId) -> u32 {
        let q = self.technologies.get(self.store.get(query_id).technology());
        let p = self.technologies.get(self.store.get(partner_id).technology());
        q.offset_jump_tolerance.max(p.offset_jump_tolerance)
    }

    fn run_to_candidate(&self, query_id: ReadId, run: &[RawMatch]) -> Option<CandidateOverlap> {
        let k = self.k;
        let partner_id = run[0].partner_id;
        let orientation = run[0].orientation;
        let query = self.store.get(query_id);
        let partner = self.store.get(partner_id);
        let qlen = query.len() as i64;
        let plen = partner.len() as i64;

        // Runs are sorted by offset first, so query positions are not
        // monotone within one.
        let mut min_q = run[0].query_pos;
        let mut max_q = run[0].query_pos;
        for m in run {
            min_q = min_q.min(m.query_pos);
            max_q = max_q.max(m.query_pos);
        }
        let span = max_q as i64 - min_q as i64 + k as i64;

        let offset_sum: i64 = run.iter().map(|m| m.offset as i64).sum();
        let offset = (offset_sum as f64 / run.len() as f64).round() as i64;

        // Total possible overlap from the lengths and the mean offset.
        let lo = offset.max(0);
        let hi = (offset + plen).min(qlen);
        let possible = hi - lo;
        if possible <= 0 {
            return None;
        }

        let mut percent = (100 * span / possible).min(100) as u8;

        let mut offsets: Vec<i32> = run.iter().map(|m| m.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        let distinct_offsets = offsets.len();

        let mut positions: Vec<u32> = run.iter().map(|m| m.query_pos).collect();
        positions.sort_unstable();
        positions.dedup();
        let supporting = positions.len() as u32;

        // A perfect run implies a single offset; anything else only
        // looked perfect because the span covered the jump. Demote to
        // the actual supporting density.
        if percent == 100 && distinct_offsets > 1 {
            let slots = (span - k as i64 + 1).max(1) as u32;
            percent = demoted_percent(supporting, slots);
        }

        let flags = self.classify(run);

        let q_settings = self.technologies.get(query.technology());
        let p_settings = self.technologies.get(partner.technology());
        let min_len = q_settings.min_overlap_len.min(p_settings.min_overlap_len) as i64;
        let min_percent = q_settings
            .min_percent_identity
            .min(p_settings.min_percent_identity);

        let acceptable = possible >= min_len && percent >= min_percent;
        let pinned = query.never_discard() && partner.never_discard();
        if !acceptable && !pinned {
            return None;
        }

        Some(CandidateOverlap {
            partner_id,
            orientation,
            offset: offset as i32,
            percent_identity: percent,
            supporting_kmers: supporting,
            estimated_len: possible as u32,
            flags,
            taken: false,
        })
    }

    fn classify(&self, run: &[RawMatch]) -> RepeatFlags {
        let k = self.k as i64;
        let mut max_freq = 0u8;
        let mut freq_sum = 0u64;
        let mut best_stretch = 0i64;
        let mut stretch_start: Option<i64> = None;
        let mut stretch_last = 0i64;

        // Stretch detection walks query positions in order.
        let mut by_pos: Vec<(u32, u8)> = run.iter().map(|m| (m.query_pos, m.freq_class)).collect();
        by_pos.sort_unstable();

        for &(query_pos, freq_class) in &by_pos {
            max_freq = max_freq.max(freq_class);
            freq_sum += freq_class as u64;
            if freq_class <= GOOD_FREQ {
                let pos = query_pos as i64;
                if stretch_start.is_none() {
                    stretch_start = Some(pos);
                }
                stretch_last = pos;
            } else if let Some(start) = stretch_start.take() {
                best_stretch = best_stretch.max(stretch_last - start + k);
            }
        }
        if let Some(start) = stretch_start {
            best_stretch = best_stretch.max(stretch_last - start + k);
        }

        let mean_freq = freq_sum as f32 / run.len() as f32;
        RepeatFlags {
            is_norept: max_freq < REPT_FREQ,
            is_rept: max_freq >= REPT_FREQ,
            is_weak_good: best_stretch >= k,
            is_strong_good: best_stretch >= 2 * k,
            is_below_avg_freq: mean_freq < self.pool_mean_freq,
        }
    }
}

/// Demoted identity for a nominally perfect run with mixed offsets:
/// the supporting density over the covered span, capped below 100.
/// Widened arithmetic; `supporting` can reach the tens of millions on
/// the longest representable sequences.
fn demoted_percent(supporting: u32, slots: u32) -> u8 {
    let pct = 100u64 * supporting as u64 / slots.max(1) as u64;
    (pct.min(99)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Technology, TechnologySettings, TechnologyTable};
    use crate::sequence::Sequence;

    const K: u32 = 10;

    fn table(min_len: u32, min_percent: u8, tol: u32) -> TechnologyTable {
        let mut t = TechnologyTable::default();
        t.set(
            Technology::Sanger,
            TechnologySettings {
                min_overlap_len: min_len,
                min_percent_identity: min_percent,
                offset_jump_tolerance: tol,
                long_read: false,
            },
        );
        t
    }

    fn store_of_lengths(lengths: &[usize]) -> SequenceStore {
        let mut store = SequenceStore::new();
        for &n in lengths {
            let bases: Vec<u8> = (0..n).map(|i| b"ACGT"[i % 4]).collect();
            store
                .push(Sequence::new(bases, Technology::Sanger))
                .unwrap();
        }
        store
    }

    fn run_at(partner: ReadId, q_start: u32, offset: i32, count: u32, freq: u8) -> Vec<RawMatch> {
        (0..count)
            .map(|i| {
                let q = q_start + i;
                RawMatch::new(partner, q, (q as i32 - offset) as u32, freq, Orientation::Forward)
            })
            .collect()
    }

    #[test]
    fn perfect_overlap_scores_one_hundred() {
        // Query 200, partner 200, partner hangs 100 to the right.
        let store = store_of_lengths(&[200, 200]);
        let table = table(40, 50, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        // Matches across the full shared region [100, 200) of the query.
        let mut matches = run_at(1, 100, 100, 100 - K + 1, 1);
        let candidates = agg.aggregate(0, &mut matches);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.offset, 100);
        assert_eq!(c.percent_identity, 100);
        assert_eq!(c.estimated_len, 100);
        assert_eq!(c.supporting_kmers, 100 - K + 1);
        assert!(c.flags.is_norept);
        assert!(!c.flags.is_rept);
    }

    #[test]
    fn offset_jump_splits_into_two_candidates() {
        // A repeat: the same partner matches at two distant offsets.
        let store = store_of_lengths(&[400, 400]);
        let table = table(20, 10, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        let mut matches = run_at(1, 0, 0, 40, 1);
        matches.extend(run_at(1, 200, 150, 40, 1));
        let candidates = agg.aggregate(0, &mut matches);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].offset, 0);
        assert_eq!(candidates[1].offset, 150);
    }

    #[test]
    fn interleaved_repeat_copies_split_by_offset() {
        // The partner carries two copies of the same query region, so
        // every query position matches twice at offsets 200 apart. Both
        // copies must survive as separate candidates.
        let store = store_of_lengths(&[200, 400]);
        let table = table(40, 30, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        let mut matches = Vec::new();
        for q in 50..=140u32 {
            matches.push(RawMatch::new(1, q, q, 1, Orientation::Forward));
            matches.push(RawMatch::new(1, q, q + 200, 1, Orientation::Forward));
        }
        let candidates = agg.aggregate(0, &mut matches);
        assert_eq!(candidates.len(), 2);
        let mut offsets: Vec<i32> = candidates.iter().map(|c| c.offset).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![-200, 0]);
        for c in &candidates {
            assert_eq!(c.supporting_kmers, 91);
            assert!(c.percent_identity >= 50);
        }
    }

    #[test]
    fn demotion_density_handles_huge_runs() {
        assert_eq!(demoted_percent(50_000_000, 60_000_000), 83);
        assert_eq!(demoted_percent(60_000_000, 60_000_000), 99);
        assert_eq!(demoted_percent(0, 10), 0);
    }

    #[test]
    fn hundred_percent_with_mixed_offsets_is_demoted() {
        let store = store_of_lengths(&[50, 40]);
        let table = table(10, 5, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        // Two sparse matches, offsets 10 and 11: within tolerance, but a
        // nominally full span cannot claim perfection.
        let mut matches = vec![
            RawMatch::new(1, 10, 0, 1, Orientation::Forward),
            RawMatch::new(1, 39, 28, 1, Orientation::Forward),
        ];
        let candidates = agg.aggregate(0, &mut matches);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].percent_identity < 100);
    }

    #[test]
    fn repeat_frequency_classification() {
        let store = store_of_lengths(&[200, 200]);
        let table = table(20, 10, 2);
        let agg = MatchAggregator::new(K, &store, &table);

        let mut high = run_at(1, 0, 0, 50, 6);
        let reptish = agg.aggregate(0, &mut high);
        assert!(reptish[0].flags.is_rept);
        assert!(!reptish[0].flags.is_norept);
        assert!(!reptish[0].flags.is_weak_good);

        let mut low = run_at(1, 0, 0, 50, 2);
        let clean = agg.aggregate(0, &mut low);
        assert!(clean[0].flags.is_norept);
        assert!(clean[0].flags.is_weak_good);
        assert!(clean[0].flags.is_strong_good);
    }

    #[test]
    fn short_low_freq_stretch_is_weak_not_strong() {
        let store = store_of_lengths(&[200, 200]);
        let table = table(20, 10, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        // One low-frequency k-mer inside an otherwise class-4 run: its
        // stretch spans exactly one k-mer length.
        let mut matches = run_at(1, 0, 0, 30, 4);
        matches[15].freq_class = 2;
        let candidates = agg.aggregate(0, &mut matches);
        let flags = candidates[0].flags;
        assert!(flags.is_norept);
        assert!(flags.is_weak_good);
        assert!(!flags.is_strong_good);
    }

    #[test]
    fn runs_below_thresholds_are_dropped() {
        let store = store_of_lengths(&[200, 200]);
        let table = table(150, 90, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        // 30-base overlap estimate, far under the 150 minimum.
        let mut matches = run_at(1, 170, 170, 30 - K + 1, 1);
        assert!(agg.aggregate(0, &mut matches).is_empty());
    }

    #[test]
    fn never_discard_pairs_survive_the_thresholds() {
        let mut store = SequenceStore::new();
        for _ in 0..2 {
            let bases: Vec<u8> = (0..200).map(|i| b"ACGT"[i % 4]).collect();
            let mut seq = Sequence::new(bases, Technology::Sanger);
            seq.set_never_discard(true);
            store.push(seq).unwrap();
        }
        let table = table(150, 90, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        let mut matches = run_at(1, 170, 170, 30 - K + 1, 1);
        assert_eq!(agg.aggregate(0, &mut matches).len(), 1);
    }

    #[test]
    fn orientations_never_share_a_run() {
        let store = store_of_lengths(&[200, 200]);
        let table = table(20, 5, 2);
        let agg = MatchAggregator::new(K, &store, &table);
        let mut matches = run_at(1, 0, 0, 40, 1);
        for m in matches.iter_mut().skip(20) {
            m.orientation = Orientation::Complement;
        }
        let candidates = agg.aggregate(0, &mut matches);
        assert_eq!(candidates.len(), 2);
        assert_ne!(candidates[0].orientation, candidates[1].orientation);
    }
}
