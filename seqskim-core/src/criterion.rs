//! Best-overlap quality tracking.
//!
//! For every read the tracker remembers the best quality level seen so
//! far per extension direction and repeat class. Levels only ever
//! decrease (lower is better, 255 means none yet), which makes the
//! update a `min` and keeps concurrent workers safe under one dedicated
//! lock with per-query batching. The engine itself never prunes on
//! these levels; they are persisted for the external reduction pass.

use crate::config::TechnologySettings;
use crate::types::ReadId;
use std::sync::Mutex;

/// "No overlap seen yet" level.
pub const LEVEL_UNSET: u8 = 255;

/// Which end of the read the overlap extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionSide {
    Left,
    Right,
}

impl ExtensionSide {
    /// The complement strand swaps which physical end is extended.
    pub fn flipped(self) -> Self {
        match self {
            ExtensionSide::Left => ExtensionSide::Right,
            ExtensionSide::Right => ExtensionSide::Left,
        }
    }
}

/// Repeat class of the candidate backing a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatClass {
    NoRept,
    Other,
}

fn slot(side: ExtensionSide, class: RepeatClass) -> usize {
    let s = match side {
        ExtensionSide::Left => 0,
        ExtensionSide::Right => 1,
    };
    let c = match class {
        RepeatClass::NoRept => 0,
        RepeatClass::Other => 1,
    };
    s * 2 + c
}

/// One pending level improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriterionUpdate {
    pub read: ReadId,
    pub side: ExtensionSide,
    pub class: RepeatClass,
    pub level: u8,
}

/// Process-wide level table, constructed fresh per engine run.
#[derive(Debug)]
pub struct CriterionTracker {
    levels: Mutex<Vec<[u8; 4]>>,
}

impl CriterionTracker {
    pub fn new(num_reads: usize) -> Self {
        Self {
            levels: Mutex::new(vec![[LEVEL_UNSET; 4]; num_reads]),
        }
    }

    /// Apply a batch of improvements under one lock acquisition.
    /// Each cell moves to `min(existing, new)`; no partial updates are
    /// ever visible.
    pub fn apply_batch(&self, updates: &[CriterionUpdate]) {
        if updates.is_empty() {
            return;
        }
        let mut levels = self.levels.lock().unwrap();
        for u in updates {
            let cell = &mut levels[u.read as usize][slot(u.side, u.class)];
            *cell = (*cell).min(u.level);
        }
    }

    pub fn level(&self, read: ReadId, side: ExtensionSide, class: RepeatClass) -> u8 {
        self.levels.lock().unwrap()[read as usize][slot(side, class)]
    }

    /// Copy of the full table, for persistence to the reduction pass.
    pub fn snapshot(&self) -> Vec<[u8; 4]> {
        self.levels.lock().unwrap().clone()
    }
}

/// Quality level of an accepted overlap for one read, lower is better.
///
/// Long-read technologies use a coarse table over the overlap's share
/// of the read length; short reads use a finer 0..=179 scale combining
/// identity and absolute overlap length. Returns [`LEVEL_UNSET`] when
/// the overlap is too poor to rank at all.
pub fn quality_level(
    settings: &TechnologySettings,
    percent_identity: u8,
    overlap_len: u32,
    read_len: u32,
) -> u8 {
    if settings.long_read {
        let share = overlap_len as u64 * 100 / read_len.max(1) as u64;
        return match share {
            80.. => 0,
            70..=79 => 1,
            60..=69 => 2,
            50..=59 => 3,
            _ => LEVEL_UNSET,
        };
    }
    let base = 100u32.saturating_sub(percent_identity as u32);
    let min_len = settings.min_overlap_len.max(1);
    let length_penalty = if overlap_len >= 4 * min_len {
        0
    } else if overlap_len >= 2 * min_len {
        20
    } else if overlap_len >= min_len {
        50
    } else {
        79
    };
    (base + length_penalty).min(179) as u8
}
