//! Selective decoding of dense element arrays.
//!
//! Every dense block array is read through [`ElementSource`], whatever its
//! element encoding: bit-packed words, raw bytes, or 32-bit integers. The
//! decode helpers walk the logical index space in increasing order and skip
//! unrequested stretches in bulk, so the cost is bounded by the largest
//! requested index rather than by the size of the array.

use std::io::Read;
use std::marker::PhantomData;
use std::ops::Range;

use byteorder::{ByteOrder, ReadBytesExt};

use crate::bit_packed::{PackError, discard, eof_to_exhausted};

/// A forward-only sequence of array elements.
pub trait ElementSource {
    /// Decodes the next element.
    fn next_value(&mut self) -> Result<u32, PackError>;

    /// Drops `count` elements.
    fn skip_values(&mut self, count: usize) -> Result<(), PackError>;

    /// Elements not yet consumed.
    fn remaining(&self) -> usize;

    /// Drops every element that has not been consumed yet.
    fn skip_rest(&mut self) -> Result<(), PackError> {
        let rest = self.remaining();
        self.skip_values(rest)
    }
}

/// One unsigned byte per element.
pub struct ByteElements<R> {
    inner: R,
    remaining: usize,
}

impl<R: Read> ByteElements<R> {
    pub fn new(inner: R, len: usize) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ElementSource for ByteElements<R> {
    fn next_value(&mut self) -> Result<u32, PackError> {
        if self.remaining == 0 {
            return Err(PackError::Exhausted);
        }
        let value = self.inner.read_u8().map_err(eof_to_exhausted)?;
        self.remaining -= 1;
        Ok(u32::from(value))
    }

    fn skip_values(&mut self, count: usize) -> Result<(), PackError> {
        if count > self.remaining {
            return Err(PackError::Exhausted);
        }
        discard(&mut self.inner, count as u64)?;
        self.remaining -= count;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

/// One 32-bit integer per element, returned as its raw bit pattern.
pub struct Int32Elements<R, B> {
    inner: R,
    remaining: usize,
    _order: PhantomData<B>,
}

impl<R: Read, B: ByteOrder> Int32Elements<R, B> {
    pub fn new(inner: R, len: usize) -> Self {
        Self {
            inner,
            remaining: len,
            _order: PhantomData,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read, B: ByteOrder> ElementSource for Int32Elements<R, B> {
    fn next_value(&mut self) -> Result<u32, PackError> {
        if self.remaining == 0 {
            return Err(PackError::Exhausted);
        }
        let value = self.inner.read_u32::<B>().map_err(eof_to_exhausted)?;
        self.remaining -= 1;
        Ok(value)
    }

    fn skip_values(&mut self, count: usize) -> Result<(), PackError> {
        if count > self.remaining {
            return Err(PackError::Exhausted);
        }
        discard(&mut self.inner, count as u64 * 4)?;
        self.remaining -= count;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes every remaining element.
pub fn decode_all<S, F>(source: &mut S, mut visit: F) -> Result<(), PackError>
where
    S: ElementSource + ?Sized,
    F: FnMut(usize, u32),
{
    let mut index = 0;
    while source.remaining() > 0 {
        visit(index, source.next_value()?);
        index += 1;
    }
    Ok(())
}

/// Decodes only the elements covered by `runs`.
///
/// Runs must be sorted and must not overlap. Gaps between runs are skipped
/// without decoding individual elements wherever the source allows it.
pub fn decode_runs<S, F>(source: &mut S, runs: &[Range<usize>], mut visit: F) -> Result<(), PackError>
where
    S: ElementSource + ?Sized,
    F: FnMut(usize, u32),
{
    let mut cursor = 0;
    for run in runs {
        if run.start < cursor {
            return Err(PackError::UnsortedIndices);
        }
        source.skip_values(run.start - cursor)?;
        for index in run.clone() {
            visit(index, source.next_value()?);
        }
        cursor = run.end.max(cursor);
    }
    Ok(())
}

/// Decodes the elements at strictly increasing `indices`.
pub fn decode_selected<S, F>(source: &mut S, indices: &[usize], mut visit: F) -> Result<(), PackError>
where
    S: ElementSource + ?Sized,
    F: FnMut(usize, u32),
{
    let mut cursor = 0;
    for &index in indices {
        if index < cursor {
            return Err(PackError::UnsortedIndices);
        }
        source.skip_values(index - cursor)?;
        visit(index, source.next_value()?);
        cursor = index + 1;
    }
    Ok(())
}

/// Sorts runs by start and merges touching or overlapping ones.
pub fn normalize_runs(mut runs: Vec<Range<usize>>) -> Vec<Range<usize>> {
    runs.retain(|r| !r.is_empty());
    runs.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(runs.len());
    for run in runs {
        match merged.last_mut() {
            Some(last) if run.start <= last.end => last.end = last.end.max(run.end),
            _ => merged.push(run),
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use std::io::Cursor;

    #[test]
    fn test_byte_runs() {
        let data: Vec<u8> = (0..50).collect();
        let mut source = ByteElements::new(Cursor::new(data), 50);
        let mut got = Vec::new();
        decode_runs(&mut source, &[2..4, 10..12, 49..50], |i, v| got.push((i, v))).unwrap();
        assert_eq!(got, vec![(2, 2), (3, 3), (10, 10), (11, 11), (49, 49)]);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_int32_little_endian_negative() {
        let mut bytes = Vec::new();
        for v in [3i32, -1, 7] {
            bytes.write_i32::<LittleEndian>(v).unwrap();
        }
        let mut source = Int32Elements::<_, LittleEndian>::new(Cursor::new(bytes), 3);
        let mut got = Vec::new();
        decode_all(&mut source, |_, v| got.push(v as i32)).unwrap();
        assert_eq!(got, vec![3, -1, 7]);
    }

    #[test]
    fn test_int32_skip_rest_then_continue_stream() {
        let mut bytes = Vec::new();
        for v in 0..6i32 {
            bytes.write_i32::<BigEndian>(v).unwrap();
        }
        bytes.push(0xAB);
        let mut source = Int32Elements::<_, BigEndian>::new(Cursor::new(bytes), 6);
        assert_eq!(source.next_value().unwrap(), 0);
        source.skip_rest().unwrap();
        let mut inner = source.into_inner();
        assert_eq!(inner.read_u8().unwrap(), 0xAB);
    }

    #[test]
    fn test_unsorted_indices_rejected() {
        let mut source = ByteElements::new(Cursor::new(vec![0u8; 8]), 8);
        let result = decode_selected(&mut source, &[4, 2], |_, _| {});
        assert!(matches!(result, Err(PackError::UnsortedIndices)));
    }

    #[test]
    fn test_truncated_source_reports_exhausted() {
        let mut source = ByteElements::new(Cursor::new(vec![1u8, 2]), 5);
        let result = decode_selected(&mut source, &[0, 3], |_, _| {});
        assert!(matches!(result, Err(PackError::Exhausted)));
    }

    #[test]
    fn test_normalize_runs_merges() {
        let runs = normalize_runs(vec![10..12, 0..3, 2..5, 12..14, 20..20]);
        assert_eq!(runs, vec![0..5, 10..14]);
    }
}
