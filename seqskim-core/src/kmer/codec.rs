//! Rolling k-mer encoder.
//!
//! Encodes a sequence into its stream of packed k-mer values, lazily and
//! restartably. A non-ACGT base or an entry into a masked region resets
//! the rolling word; emission resumes only after `k` consecutive valid
//! unmasked bases. The reverse-complement strand is produced without
//! re-scanning by walking the sequence backward and substituting
//! complementary bases; emitted positions are in reverse-complement
//! coordinates.

use super::{complement_base, encode_base, KmerWord};
use crate::error::{SkimError, SkimResult};
use crate::sequence::{Sequence, MAX_SEQUENCE_LEN};
use crate::types::{Orientation, ReadId};
use std::marker::PhantomData;

/// Encoder for one configured k. `encode` hands out independent,
/// restartable streams.
#[derive(Debug, Clone, Copy)]
pub struct KmerCodec<W: KmerWord> {
    k: u32,
    _marker: PhantomData<W>,
}

impl<W: KmerWord> KmerCodec<W> {
    pub fn new(k: u32) -> Self {
        debug_assert!(k >= 1 && k <= W::MAX_K);
        Self {
            k,
            _marker: PhantomData,
        }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// Stream of `(kmer, start_position)` for one strand of `seq`.
    /// Positions are on the walked strand: forward coordinates for
    /// `Orientation::Forward`, reverse-complement coordinates otherwise.
    pub fn encode<'a>(
        &self,
        read: ReadId,
        seq: &'a Sequence,
        orientation: Orientation,
    ) -> SkimResult<KmerStream<'a, W>> {
        if seq.len() > MAX_SEQUENCE_LEN {
            return Err(SkimError::SequenceTooLong {
                read,
                len: seq.len(),
                max: MAX_SEQUENCE_LEN,
            });
        }
        Ok(KmerStream {
            seq,
            k: self.k,
            orientation,
            next_idx: 0,
            valid: 0,
            word: W::zero(),
        })
    }
}

/// Lazy, finite k-mer stream over one strand of one sequence.
pub struct KmerStream<'a, W: KmerWord> {
    seq: &'a Sequence,
    k: u32,
    orientation: Orientation,
    /// Steps taken along the walked strand.
    next_idx: usize,
    /// Valid unmasked bases accumulated since the last reset.
    valid: u32,
    word: W,
}

impl<W: KmerWord> Iterator for KmerStream<'_, W> {
    type Item = (W, u32);

    fn next(&mut self) -> Option<(W, u32)> {
        let len = self.seq.len();
        while self.next_idx < len {
            let step = self.next_idx;
            self.next_idx += 1;

            let orig = match self.orientation {
                Orientation::Forward => step,
                Orientation::Complement => len - 1 - step,
            };
            if self.seq.is_masked(orig) {
                self.valid = 0;
                self.word = W::zero();
                continue;
            }
            let raw = self.seq.bases()[orig];
            let base = match self.orientation {
                Orientation::Forward => raw,
                Orientation::Complement => complement_base(raw),
            };
            let Some(code) = encode_base(base) else {
                self.valid = 0;
                self.word = W::zero();
                continue;
            };
            self.word = self.word.push_base(code, self.k);
            self.valid += 1;
            if self.valid >= self.k {
                return Some((self.word, (step + 1 - self.k as usize) as u32));
            }
        }
        None
    }
}
