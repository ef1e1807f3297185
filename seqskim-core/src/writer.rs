//! Skim hit serialization.
//!
//! Accepted candidates become fixed-width binary records on two output
//! streams, one per relative orientation. Records are native-endian;
//! the files are scratch data consumed by the reduction pass on the
//! same machine, never interchange formats. Workers hand over whole
//! batches, so each stream lock is taken once per query read.

use crate::types::{CandidateOverlap, Orientation, ReadId, RepeatFlags};
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::sync::Mutex;

/// On-disk size of one [`SkimHit`] record.
pub const SKIM_HIT_BYTES: usize = 22;

/// One accepted overlap candidate, in file layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkimHit {
    /// Query read; always the larger id of the pair.
    pub rid1: ReadId,
    /// Partner read.
    pub rid2: ReadId,
    pub offset: i32,
    pub percent_identity: u8,
    pub supporting_kmers: u32,
    pub flags: RepeatFlags,
}

impl SkimHit {
    pub fn from_candidate(query_id: ReadId, c: &CandidateOverlap) -> Self {
        Self {
            rid1: query_id,
            rid2: c.partner_id,
            offset: c.offset,
            percent_identity: c.percent_identity,
            supporting_kmers: c.supporting_kmers,
            flags: c.flags,
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<NativeEndian>(self.rid1)?;
        w.write_u32::<NativeEndian>(self.rid2)?;
        w.write_i32::<NativeEndian>(self.offset)?;
        w.write_u8(self.percent_identity)?;
        w.write_u32::<NativeEndian>(self.supporting_kmers)?;
        w.write_u8(self.flags.is_norept as u8)?;
        w.write_u8(self.flags.is_rept as u8)?;
        w.write_u8(self.flags.is_weak_good as u8)?;
        w.write_u8(self.flags.is_strong_good as u8)?;
        w.write_u8(self.flags.is_below_avg_freq as u8)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            rid1: r.read_u32::<NativeEndian>()?,
            rid2: r.read_u32::<NativeEndian>()?,
            offset: r.read_i32::<NativeEndian>()?,
            percent_identity: r.read_u8()?,
            supporting_kmers: r.read_u32::<NativeEndian>()?,
            flags: RepeatFlags {
                is_norept: r.read_u8()? != 0,
                is_rept: r.read_u8()? != 0,
                is_weak_good: r.read_u8()? != 0,
                is_strong_good: r.read_u8()? != 0,
                is_below_avg_freq: r.read_u8()? != 0,
            },
        })
    }
}

/// Read every record from `r` until EOF. A trailing partial record is
/// an error.
pub fn read_hits<R: Read>(r: &mut R) -> io::Result<Vec<SkimHit>> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    if buf.len() % SKIM_HIT_BYTES != 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated skim hit record",
        ));
    }
    let mut cursor = io::Cursor::new(buf);
    let mut hits = Vec::new();
    while (cursor.position() as usize) < cursor.get_ref().len() {
        hits.push(SkimHit::read_from(&mut cursor)?);
    }
    Ok(hits)
}

/// Shared sink for accepted hits, one stream per orientation, plus the
/// per-read accepted-overlap tally handed back at the end of the run.
#[derive(Debug)]
pub struct ResultWriter<W: Write> {
    forward: Mutex<W>,
    complement: Mutex<W>,
    accepted: Mutex<Vec<u32>>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(forward: W, complement: W, num_reads: usize) -> Self {
        Self {
            forward: Mutex::new(forward),
            complement: Mutex::new(complement),
            accepted: Mutex::new(vec![0; num_reads]),
        }
    }

    /// Append `hits` to the stream for `orientation` and credit both
    /// reads of every pair.
    pub fn write_batch(&self, orientation: Orientation, hits: &[SkimHit]) -> io::Result<()> {
        if hits.is_empty() {
            return Ok(());
        }
        {
            let mut stream = match orientation {
                Orientation::Forward => self.forward.lock().unwrap(),
                Orientation::Complement => self.complement.lock().unwrap(),
            };
            for hit in hits {
                hit.write_to(&mut *stream)?;
            }
        }
        let mut accepted = self.accepted.lock().unwrap();
        for hit in hits {
            accepted[hit.rid1 as usize] += 1;
            accepted[hit.rid2 as usize] += 1;
        }
        Ok(())
    }

    /// Flush both streams and return the per-read accepted counts.
    pub fn finish(self) -> io::Result<Vec<u32>> {
        let (_, _, accepted) = self.into_parts()?;
        Ok(accepted)
    }

    /// Flush and dismantle, handing back both streams and the per-read
    /// accepted counts.
    pub fn into_parts(self) -> io::Result<(W, W, Vec<u32>)> {
        let mut forward = self.forward.into_inner().unwrap();
        forward.flush()?;
        let mut complement = self.complement.into_inner().unwrap();
        complement.flush()?;
        Ok((forward, complement, self.accepted.into_inner().unwrap()))
    }
}
