//! Read pool access.
//!
//! The engine never parses file formats; an external loader fills a
//! [`SequenceStore`] with clipped sequences, per-base k-mer frequency
//! classes for both strands, and mask bits for regions excluded from
//! hashing (poly-A tails being the usual customer). The engine only
//! borrows the store, read-only, for the whole run.

use crate::config::Technology;
use crate::error::{SkimError, SkimResult};
use crate::types::ReadId;
use bitvec::prelude::*;

/// Longest representable sequence. Positions and offsets are 32-bit
/// fields in the index entries and on-disk records.
pub const MAX_SEQUENCE_LEN: usize = i32::MAX as usize;

/// One clipped read with its hashing annotations.
///
/// Frequency classes are small per-base integers maintained by the
/// loader's k-mer statistics pass: `freq_fwd[i]` classifies the k-mer
/// starting at forward position `i`, `freq_rev[i]` the k-mer starting at
/// position `i` of the reverse complement. Positions without a k-mer
/// (the last k-1 bases) just repeat the last class; the engine never
/// reads past `len - k`.
#[derive(Debug, Clone)]
pub struct Sequence {
    bases: Vec<u8>,
    freq_fwd: Vec<u8>,
    freq_rev: Vec<u8>,
    mask: BitVec,
    technology: Technology,
    discarded: bool,
    never_discard: bool,
}

impl Sequence {
    /// A sequence with neutral annotations: frequency class 1
    /// everywhere, nothing masked.
    pub fn new(bases: Vec<u8>, technology: Technology) -> Self {
        let n = bases.len();
        Self {
            bases,
            freq_fwd: vec![1; n],
            freq_rev: vec![1; n],
            mask: bitvec![0; n],
            technology,
            discarded: false,
            never_discard: false,
        }
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn set_discarded(&mut self, discarded: bool) {
        self.discarded = discarded;
    }

    /// Reads tagged never-discard keep their mutual overlaps even below
    /// the acceptance thresholds.
    pub fn never_discard(&self) -> bool {
        self.never_discard
    }

    pub fn set_never_discard(&mut self, keep: bool) {
        self.never_discard = keep;
    }

    /// Frequency class of the forward-strand k-mer starting at `pos`.
    #[inline]
    pub fn freq_forward(&self, pos: u32) -> u8 {
        self.freq_fwd[pos as usize]
    }

    /// Frequency class of the reverse-complement k-mer starting at
    /// `pos` (reverse-complement coordinates).
    #[inline]
    pub fn freq_reverse(&self, pos: u32) -> u8 {
        self.freq_rev[pos as usize]
    }

    /// Replace both per-base frequency tracks. Lengths must match the
    /// sequence.
    pub fn set_frequencies(&mut self, fwd: Vec<u8>, rev: Vec<u8>) -> SkimResult<()> {
        if fwd.len() != self.bases.len() || rev.len() != self.bases.len() {
            return Err(SkimError::Internal(
                "frequency annotation length does not match sequence",
            ));
        }
        self.freq_fwd = fwd;
        self.freq_rev = rev;
        Ok(())
    }

    #[inline]
    pub fn is_masked(&self, pos: usize) -> bool {
        self.mask[pos]
    }

    /// Exclude `[start, end)` from k-mer formation.
    pub fn mask_region(&mut self, start: usize, end: usize) {
        let end = end.min(self.bases.len());
        for i in start..end {
            self.mask.set(i, true);
        }
    }

    /// Mask a trailing poly-A and a leading poly-T run of at least
    /// `min_run` bases, the usual mRNA tail artifacts.
    pub fn mask_poly_tails(&mut self, min_run: usize) {
        let n = self.bases.len();
        let tail = self
            .bases
            .iter()
            .rev()
            .take_while(|&&b| b.to_ascii_uppercase() == b'A')
            .count();
        if tail >= min_run {
            self.mask_region(n - tail, n);
        }
        let head = self
            .bases
            .iter()
            .take_while(|&&b| b.to_ascii_uppercase() == b'T')
            .count();
        if head >= min_run {
            self.mask_region(0, head);
        }
    }
}

/// Read-only accessor over the whole pool. Reads are identified by
/// their dense insertion order.
#[derive(Debug, Default)]
pub struct SequenceStore {
    seqs: Vec<Sequence>,
    freq_sum: u64,
    freq_bases: u64,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sequence and return its read id. Fails with
    /// [`SkimError::SequenceTooLong`] above the position-field cap.
    pub fn push(&mut self, seq: Sequence) -> SkimResult<ReadId> {
        let id = self.seqs.len() as ReadId;
        if seq.len() > MAX_SEQUENCE_LEN {
            return Err(SkimError::SequenceTooLong {
                read: id,
                len: seq.len(),
                max: MAX_SEQUENCE_LEN,
            });
        }
        self.freq_sum += seq.freq_fwd.iter().map(|&f| f as u64).sum::<u64>();
        self.freq_bases += seq.len() as u64;
        self.seqs.push(seq);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    #[inline]
    pub fn get(&self, id: ReadId) -> &Sequence {
        &self.seqs[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReadId, &Sequence)> {
        self.seqs
            .iter()
            .enumerate()
            .map(|(i, s)| (i as ReadId, s))
    }

    /// Clipped lengths in id order, the planner's input.
    pub fn read_lengths(&self) -> Vec<u32> {
        self.seqs.iter().map(|s| s.len() as u32).collect()
    }

    /// Pool-wide mean frequency class, the `is_below_avg_freq`
    /// reference point.
    pub fn mean_freq_class(&self) -> f32 {
        if self.freq_bases == 0 {
            0.0
        } else {
            self.freq_sum as f32 / self.freq_bases as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_assigns_dense_ids() {
        let mut store = SequenceStore::new();
        let a = store.push(Sequence::new(b"ACGT".to_vec(), Technology::Sanger)).unwrap();
        let b = store.push(Sequence::new(b"TTTT".to_vec(), Technology::Sanger)).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.get(b).bases(), b"TTTT");
        assert_eq!(store.read_lengths(), vec![4, 4]);
    }

    #[test]
    fn masking_regions() {
        let mut seq = Sequence::new(b"ACGTACGT".to_vec(), Technology::Sanger);
        assert!(!seq.is_masked(3));
        seq.mask_region(2, 5);
        assert!(!seq.is_masked(1));
        assert!(seq.is_masked(2));
        assert!(seq.is_masked(4));
        assert!(!seq.is_masked(5));
    }

    #[test]
    fn poly_tail_masking() {
        let mut seq = Sequence::new(b"TTTTTGCGCGCAAAAAA".to_vec(), Technology::Sanger);
        seq.mask_poly_tails(5);
        assert!(seq.is_masked(0));
        assert!(seq.is_masked(4));
        assert!(!seq.is_masked(5));
        assert!(!seq.is_masked(10));
        assert!(seq.is_masked(11));
        assert!(seq.is_masked(16));
    }

    #[test]
    fn short_runs_stay_unmasked() {
        let mut seq = Sequence::new(b"TTGCGCGCAA".to_vec(), Technology::Sanger);
        seq.mask_poly_tails(5);
        assert!(!seq.is_masked(0));
        assert!(!seq.is_masked(9));
    }

    #[test]
    fn mean_freq_tracks_annotations() {
        let mut store = SequenceStore::new();
        let mut seq = Sequence::new(b"ACGT".to_vec(), Technology::Sanger);
        seq.set_frequencies(vec![3; 4], vec![3; 4]).unwrap();
        store.push(seq).unwrap();
        assert!((store.mean_freq_class() - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn frequency_length_mismatch_is_rejected() {
        let mut seq = Sequence::new(b"ACGT".to_vec(), Technology::Sanger);
        assert!(seq.set_frequencies(vec![1; 3], vec![1; 4]).is_err());
    }
}
