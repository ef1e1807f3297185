//! Unified types shared across the skimming pipeline.

use serde::{Deserialize, Serialize};

/// Numeric read identifier, dense from 0 within a [`crate::SequenceStore`].
pub type ReadId = u32;

/// Relative orientation of a candidate overlap: `Forward` means the two
/// reads overlap as stored, `Complement` means one of them matches the
/// reverse complement of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Forward,
    Complement,
}

impl From<Orientation> for char {
    fn from(o: Orientation) -> Self {
        match o {
            Orientation::Forward => '+',
            Orientation::Complement => '-',
        }
    }
}

/// Repeat classification of a candidate overlap, derived from the
/// per-base k-mer frequency classes of its supporting k-mers.
///
/// The thresholds behind these flags (frequency 5 and up is repetitive,
/// 4 and below is not, stretches of frequency 3 or less make an overlap
/// "good") are empirically tuned and deliberately not derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatFlags {
    /// Every supporting k-mer has frequency class <= 4.
    pub is_norept: bool,
    /// At least one supporting k-mer has frequency class >= 5.
    pub is_rept: bool,
    /// A contiguous stretch of frequency <= 3 k-mers spans at least one
    /// k-mer length.
    pub is_weak_good: bool,
    /// Such a stretch spans at least two k-mer lengths.
    pub is_strong_good: bool,
    /// The mean frequency class of the run is below the pool average.
    pub is_below_avg_freq: bool,
}

/// A single k-mer hit between a query read and an indexed partner.
///
/// Transient: produced while probing the partition index, consumed by
/// the aggregator within the same query pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMatch {
    pub partner_id: ReadId,
    /// K-mer start on the query's forward strand.
    pub query_pos: u32,
    /// K-mer start on the partner, in the coordinates of the strand the
    /// index entry was built from.
    pub partner_pos: u32,
    /// `query_pos - partner_pos`; constant along a true overlap.
    pub offset: i32,
    pub freq_class: u8,
    pub orientation: Orientation,
}

impl RawMatch {
    pub fn new(
        partner_id: ReadId,
        query_pos: u32,
        partner_pos: u32,
        freq_class: u8,
        orientation: Orientation,
    ) -> Self {
        Self {
            partner_id,
            query_pos,
            partner_pos,
            offset: query_pos as i32 - partner_pos as i32,
            freq_class,
            orientation,
        }
    }
}

/// An overlap candidate between one query read and one partner,
/// estimated from a run of offset-consistent k-mer matches.
///
/// All geometry is an estimate from k-mer coverage; no alignment is
/// ever computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOverlap {
    pub partner_id: ReadId,
    pub orientation: Orientation,
    /// Mean offset of the supporting run.
    pub offset: i32,
    /// Approximate identity over the estimated overlap, 0..=100.
    pub percent_identity: u8,
    /// Distinct query positions supporting the run.
    pub supporting_kmers: u32,
    /// Estimated total overlap length from the sequence lengths and the
    /// mean offset.
    pub estimated_len: u32,
    pub flags: RepeatFlags,
    /// Set once the candidate has been serialized as a skim hit.
    pub taken: bool,
}
