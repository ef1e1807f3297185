//! Engine configuration.
//!
//! All knobs are caller-supplied; nothing here is parsed from files.
//! Defaults preserve the empirically tuned production values, in
//! particular the per-technology acceptance thresholds and the repeat
//! frequency cutoffs referenced throughout the pipeline.

use crate::error::{SkimError, SkimResult};
use crate::kmer::MAX_SUPPORTED_K;
use serde::{Deserialize, Serialize};

/// Sequencing technology of a read. Drives the acceptance thresholds,
/// the offset jump tolerance, and which criterion-level table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    Sanger,
    Illumina,
    PacBio,
    Nanopore,
}

impl Technology {
    pub const ALL: [Technology; 4] = [
        Technology::Sanger,
        Technology::Illumina,
        Technology::PacBio,
        Technology::Nanopore,
    ];

    fn table_index(self) -> usize {
        match self {
            Technology::Sanger => 0,
            Technology::Illumina => 1,
            Technology::PacBio => 2,
            Technology::Nanopore => 3,
        }
    }
}

/// Per-technology skimming thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnologySettings {
    /// Minimum estimated overlap length for a run to be kept.
    pub min_overlap_len: u32,
    /// Minimum estimated percent identity for a run to be kept.
    pub min_percent_identity: u8,
    /// Maximum offset jump between consecutive matches of one run.
    pub offset_jump_tolerance: u32,
    /// Long-read technologies use the coarse criterion-level table.
    pub long_read: bool,
}

impl Technology {
    /// Production default thresholds for this technology.
    pub fn default_settings(self) -> TechnologySettings {
        match self {
            Technology::Sanger => TechnologySettings {
                min_overlap_len: 40,
                min_percent_identity: 65,
                offset_jump_tolerance: 2,
                long_read: false,
            },
            Technology::Illumina => TechnologySettings {
                min_overlap_len: 30,
                min_percent_identity: 80,
                offset_jump_tolerance: 2,
                long_read: false,
            },
            Technology::PacBio => TechnologySettings {
                min_overlap_len: 240,
                min_percent_identity: 50,
                offset_jump_tolerance: 100,
                long_read: true,
            },
            Technology::Nanopore => TechnologySettings {
                min_overlap_len: 240,
                min_percent_identity: 50,
                offset_jump_tolerance: 100,
                long_read: true,
            },
        }
    }
}

/// Threshold table indexed by [`Technology`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyTable {
    settings: [TechnologySettings; 4],
}

impl TechnologyTable {
    pub fn get(&self, tech: Technology) -> TechnologySettings {
        self.settings[tech.table_index()]
    }

    pub fn set(&mut self, tech: Technology, settings: TechnologySettings) {
        self.settings[tech.table_index()] = settings;
    }
}

impl Default for TechnologyTable {
    fn default() -> Self {
        let mut settings = [Technology::Sanger.default_settings(); 4];
        for tech in Technology::ALL {
            settings[tech.table_index()] = tech.default_settings();
        }
        Self { settings }
    }
}

/// Configuration for a skim run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimConfig {
    /// K-mer length, 1..=256.
    pub k: u32,
    /// Per-partition memory budget, expressed as an expected k-mer count.
    pub memory_budget_kmers: usize,
    /// Budget below which a `ResourceExhausted` retry becomes fatal.
    pub min_partition_budget_kmers: usize,
    /// Worker threads; 0 selects the available parallelism.
    pub threads: usize,
    /// Query reads handed to a worker per dispatch chunk.
    pub chunk_size: u32,
    /// Low-bit bucket prefix width of the hash index, capped at `2k`.
    pub prefix_bits: u32,
    /// Raw-match count above which megahub screening kicks in.
    pub megahub_cap: usize,
    pub technologies: TechnologyTable,
}

impl Default for SkimConfig {
    fn default() -> Self {
        Self {
            k: 17,
            memory_budget_kmers: 48 * 1024 * 1024,
            min_partition_budget_kmers: 1024 * 1024,
            threads: 0,
            chunk_size: 4096,
            prefix_bits: 24,
            megahub_cap: 150_000,
            technologies: TechnologyTable::default(),
        }
    }
}

impl SkimConfig {
    pub fn validate(&self) -> SkimResult<()> {
        if self.k == 0 || self.k > MAX_SUPPORTED_K {
            return Err(SkimError::Internal("k-mer length out of supported range"));
        }
        if self.chunk_size == 0 {
            return Err(SkimError::Internal("chunk size must be nonzero"));
        }
        if self.memory_budget_kmers == 0 {
            return Err(SkimError::Internal("memory budget must be nonzero"));
        }
        if self.prefix_bits == 0 || self.prefix_bits > 28 {
            return Err(SkimError::Internal("prefix bits must be in 1..=28"));
        }
        Ok(())
    }

    /// Worker-thread count after resolving the `0 = auto` convention.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }
}
