//! SeqSkim Core Library
//!
//! K-mer overlap skimming for sequence assembly: partitioned hash
//! indexing, parallel match finding, run aggregation, and binary skim
//! hit output.

pub mod aggregate;
pub mod config;
pub mod criterion;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod index;
pub mod kmer;
pub mod megahub;
pub mod partition;
pub mod sequence;
pub mod types;
pub mod writer;

// Re-export commonly used types and functions
pub use config::{SkimConfig, Technology, TechnologySettings, TechnologyTable};
pub use engine::{SkimEngine, SkimStats};
pub use error::{SkimError, SkimResult};
pub use sequence::{Sequence, SequenceStore};
pub use types::{CandidateOverlap, Orientation, RawMatch, ReadId, RepeatFlags};
pub use writer::{read_hits, SkimHit, SKIM_HIT_BYTES};

/// Version information for the skimming library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
