//! Packed k-mer values.
//!
//! A k-mer is packed 2 bits per base (A=0, C=1, G=2, T=3) into one of a
//! small closed set of fixed-width words, selected once per run from the
//! configured k: `u64` up to k=32, `u128` up to 64, and two limb-array
//! words up to 128 and 256. Ambiguous bases have no encoding and break
//! k-mer formation in the codec instead.

use std::fmt;

pub mod codec;

pub use codec::{KmerCodec, KmerStream};

/// Widest k any supported word can hold.
pub const MAX_SUPPORTED_K: u32 = 256;

/// 2-bit base code, or `None` for anything outside ACGT.
#[inline]
pub fn encode_base(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Watson-Crick complement; non-ACGT bases pass through unchanged.
#[inline]
pub fn complement_base(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

/// Fixed-width packed k-mer word.
///
/// The trait exposes exactly what the pipeline needs: rolling extension
/// by one base, the low-bit bucket prefix, and total ordering for the
/// sorted index. It is deliberately a closed set of concrete widths
/// rather than an open generic integer.
pub trait KmerWord:
    Copy + Clone + Ord + Eq + Default + fmt::Debug + Send + Sync + 'static
{
    /// Width of the word in bits.
    const BITS: u32;

    /// Largest k this word can represent.
    const MAX_K: u32 = Self::BITS / 2;

    fn zero() -> Self;

    /// Shift left two bits, OR in `base`, mask to `2 * k` bits.
    fn push_base(self, base: u8, k: u32) -> Self;

    /// The lowest `bits` bits as a bucket prefix; `bits` <= 28.
    fn low_bits(self, bits: u32) -> u32;
}

impl KmerWord for u64 {
    const BITS: u32 = 64;

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn push_base(self, base: u8, k: u32) -> Self {
        let shifted = (self << 2) | (base & 3) as u64;
        if 2 * k >= 64 {
            shifted
        } else {
            shifted & ((1u64 << (2 * k)) - 1)
        }
    }

    #[inline]
    fn low_bits(self, bits: u32) -> u32 {
        (self & ((1u64 << bits) - 1)) as u32
    }
}

impl KmerWord for u128 {
    const BITS: u32 = 128;

    #[inline]
    fn zero() -> Self {
        0
    }

    #[inline]
    fn push_base(self, base: u8, k: u32) -> Self {
        let shifted = (self << 2) | (base & 3) as u128;
        if 2 * k >= 128 {
            shifted
        } else {
            shifted & ((1u128 << (2 * k)) - 1)
        }
    }

    #[inline]
    fn low_bits(self, bits: u32) -> u32 {
        (self & ((1u128 << bits) - 1)) as u32
    }
}

macro_rules! impl_limb_word {
    ($name:ident, $limbs:expr, $bits:expr) => {
        /// Little-endian limb array; limb 0 holds the lowest bits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
        pub struct $name(pub [u64; $limbs]);

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                // Numeric order: compare from the most significant limb.
                for i in (0..$limbs).rev() {
                    match self.0[i].cmp(&other.0[i]) {
                        std::cmp::Ordering::Equal => continue,
                        non_eq => return non_eq,
                    }
                }
                std::cmp::Ordering::Equal
            }
        }

        impl KmerWord for $name {
            const BITS: u32 = $bits;

            #[inline]
            fn zero() -> Self {
                Self([0; $limbs])
            }

            fn push_base(self, base: u8, k: u32) -> Self {
                let mut limbs = self.0;
                let mut carry = (base & 3) as u64;
                for limb in limbs.iter_mut() {
                    let next = *limb >> 62;
                    *limb = (*limb << 2) | carry;
                    carry = next;
                }
                // Mask to 2k bits.
                let top = 2 * k as usize;
                for (i, limb) in limbs.iter_mut().enumerate() {
                    let lo = 64 * i;
                    if lo >= top {
                        *limb = 0;
                    } else if top - lo < 64 {
                        *limb &= (1u64 << (top - lo)) - 1;
                    }
                }
                Self(limbs)
            }

            #[inline]
            fn low_bits(self, bits: u32) -> u32 {
                (self.0[0] & ((1u64 << bits) - 1)) as u32
            }
        }
    };
}

impl_limb_word!(U256, 4, 256);
impl_limb_word!(U512, 8, 512);

/// Word width selected for a configured k.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmerWidth {
    W64,
    W128,
    W256,
    W512,
}

/// Pick the narrowest word that holds `k` bases. `k` must already be
/// validated against [`MAX_SUPPORTED_K`].
pub fn width_for_k(k: u32) -> KmerWidth {
    match k {
        0..=32 => KmerWidth::W64,
        33..=64 => KmerWidth::W128,
        65..=128 => KmerWidth::W256,
        _ => KmerWidth::W512,
    }
}
