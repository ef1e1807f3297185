//! Megahub detection and process-wide read exclusion.
//!
//! A read sitting in a high-copy genomic repeat can match a
//! pathological number of partners. Once a query's raw-match count
//! exceeds the cap, matches are discarded by descending frequency-class
//! threshold (6 down to 4). If that still does not bring the count
//! under the cap, the read is flagged as a megahub for the rest of the
//! run and excluded from probing in both roles, as querier and as
//! indexed target.

use crate::types::{RawMatch, ReadId};
use bitvec::prelude::*;
use std::sync::Mutex;

/// Outcome of screening one query read's raw matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MegahubVerdict {
    /// Under the cap, nothing removed.
    Clean,
    /// High-frequency matches were discarded; processing continues.
    Trimmed { removed: usize },
    /// Still over the cap after trimming; caller must flag the read.
    Flagged,
}

/// Stateless screen, parameterized only by the cap.
#[derive(Debug, Clone, Copy)]
pub struct MegahubGuard {
    cap: usize,
}

impl MegahubGuard {
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Screen `matches` in place. Frequency thresholds shrink from 6 to
    /// 4; the first threshold that brings the count under the cap stops
    /// the loop.
    pub fn screen(&self, matches: &mut Vec<RawMatch>) -> MegahubVerdict {
        if matches.len() <= self.cap {
            return MegahubVerdict::Clean;
        }
        let before = matches.len();
        for threshold in (4..=6).rev() {
            matches.retain(|m| m.freq_class <= threshold);
            if matches.len() <= self.cap {
                return MegahubVerdict::Trimmed {
                    removed: before - matches.len(),
                };
            }
        }
        MegahubVerdict::Flagged
    }
}

#[derive(Debug)]
struct FlagsInner {
    megahub: BitVec,
    encased: BitVec,
}

/// Pool-scoped read exclusion flags, shared by all workers.
///
/// Read-mostly: probing checks flags once per query read; writes happen
/// only when a megahub is confirmed or a read becomes fully encased by
/// an accepted overlap. Constructed fresh per engine run so repeated
/// runs do not leak state.
#[derive(Debug)]
pub struct ReadFlags {
    inner: Mutex<FlagsInner>,
}

impl ReadFlags {
    pub fn new(num_reads: usize) -> Self {
        Self {
            inner: Mutex::new(FlagsInner {
                megahub: bitvec![0; num_reads],
                encased: bitvec![0; num_reads],
            }),
        }
    }

    pub fn flag_megahub(&self, read: ReadId) {
        self.inner.lock().unwrap().megahub.set(read as usize, true);
    }

    pub fn is_megahub(&self, read: ReadId) -> bool {
        self.inner.lock().unwrap().megahub[read as usize]
    }

    pub fn mark_encased(&self, read: ReadId) {
        self.inner.lock().unwrap().encased.set(read as usize, true);
    }

    pub fn is_encased(&self, read: ReadId) -> bool {
        self.inner.lock().unwrap().encased[read as usize]
    }

    /// Cheap pre-probe check: megahub or fully encased reads are
    /// skipped without touching the index.
    pub fn skip_as_query(&self, read: ReadId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.megahub[read as usize] || inner.encased[read as usize]
    }

    pub fn megahub_count(&self) -> usize {
        self.inner.lock().unwrap().megahub.count_ones()
    }
}
