//! Fixed-width palette-index packing across 64-bit words.
//!
//! Entry `i` occupies bits `i * bits .. (i + 1) * bits` of the conceptual bit
//! stream, least significant bit first. An entry that straddles a word boundary
//! keeps its low bits in the current word and carries its high bits into the
//! next one. Words travel big-endian when they are streamed.
//!
//! Three forms share that layout:
//! - [`BitPackedArray`] holds every word in memory.
//! - [`PackedWriter`] appends entries and emits each word as soon as it fills.
//! - [`PackedReader`] pulls words on demand from a [`WordSource`] and can skip
//!   whole words without decoding them.

use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::select::ElementSource;

/// Errors raised while packing or unpacking index arrays.
#[derive(Debug, Error)]
pub enum PackError {
    /// The encoder emitted a different number of words than the array requires.
    #[error("packed word count mismatch: expected {expected}, wrote {actual}")]
    WordCountMismatch {
        /// Words required for the declared entry count.
        expected: usize,
        /// Words actually emitted.
        actual: usize,
    },
    /// Entry width outside `1..=32`.
    #[error("invalid bits per entry: {0}")]
    InvalidBitWidth(u8),
    /// A value does not fit in the configured width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange {
        /// Offending value.
        value: u32,
        /// Configured width.
        bits: u8,
    },
    /// The source ran out of words or elements.
    #[error("index array exhausted")]
    Exhausted,
    /// Requested indices were not strictly increasing.
    #[error("requested indices must be sorted and non-overlapping")]
    UnsortedIndices,
    /// The underlying stream failed.
    #[error("index stream I/O: {0}")]
    Io(#[from] io::Error),
}

/// Bits per entry for a palette of `palette_len` entries: `max(2, ceil(log2 P))`.
pub fn bits_for_palette(palette_len: usize) -> u8 {
    let needed = if palette_len <= 1 {
        0
    } else {
        usize::BITS - (palette_len - 1).leading_zeros()
    };
    needed.max(2) as u8
}

/// Number of 64-bit words holding `len` entries of `bits` bits.
pub fn packed_word_count(len: usize, bits: u8) -> usize {
    (len * bits as usize).div_ceil(64)
}

#[inline]
fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

fn check_width(bits: u8) -> Result<(), PackError> {
    if (1..=32).contains(&bits) {
        Ok(())
    } else {
        Err(PackError::InvalidBitWidth(bits))
    }
}

// ---------------------------------------------------------------------------
// In-memory array
// ---------------------------------------------------------------------------

/// A compact array where each element is stored using a fixed number of bits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitPackedArray {
    /// Raw storage. Elements are packed into 64-bit words.
    data: Vec<u64>,
    /// Bits per element, `0` for a uniform array or `1..=32`.
    bits: u8,
    /// Total number of logical elements.
    len: usize,
}

impl BitPackedArray {
    /// Creates a new array with `len` elements, all initialized to zero.
    pub fn new(bits: u8, len: usize) -> Self {
        debug_assert!(bits <= 32, "bits must be at most 32");
        let word_count = if bits == 0 {
            0
        } else {
            packed_word_count(len, bits)
        };
        Self {
            data: vec![0u64; word_count],
            bits,
            len,
        }
    }

    /// Wraps existing words, checking that their count matches `len * bits`.
    pub fn from_raw(bits: u8, len: usize, data: Vec<u64>) -> Result<Self, PackError> {
        check_width(bits)?;
        let expected = packed_word_count(len, bits);
        if data.len() != expected {
            return Err(PackError::WordCountMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, bits, len })
    }

    /// Packs `values` with the given width.
    pub fn pack(bits: u8, values: &[u32]) -> Result<Self, PackError> {
        check_width(bits)?;
        let mut data = Vec::with_capacity(packed_word_count(values.len(), bits));
        let mut writer = PackedWriter::new(bits, |word| {
            data.push(word);
            Ok(())
        })?;
        for &value in values {
            writer.push(value)?;
        }
        writer.finish(packed_word_count(values.len(), bits))?;
        Ok(Self {
            data,
            bits,
            len: values.len(),
        })
    }

    /// Returns the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` in debug builds.
    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(index < self.len, "index out of bounds");
        if self.bits == 0 {
            return 0;
        }
        let bits = u32::from(self.bits);
        let bit_index = index * self.bits as usize;
        let word = bit_index / 64;
        let offset = (bit_index % 64) as u32;
        let mut value = self.data[word] >> offset;
        if offset + bits > 64 {
            value |= self.data[word + 1] << (64 - offset);
        }
        (value & mask(bits)) as u32
    }

    /// Sets the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` in debug builds, or if `value` exceeds
    /// the maximum for the current bit width.
    pub fn set(&mut self, index: usize, value: u32) {
        debug_assert!(index < self.len, "index out of bounds");
        if self.bits == 0 {
            return;
        }
        let bits = u32::from(self.bits);
        debug_assert!(
            u64::from(value) <= mask(bits),
            "value {value} exceeds {bits}-bit capacity"
        );
        let bit_index = index * self.bits as usize;
        let word = bit_index / 64;
        let offset = (bit_index % 64) as u32;
        let value = u64::from(value) & mask(bits);
        self.data[word] &= !(mask(bits) << offset);
        self.data[word] |= value << offset;
        if offset + bits > 64 {
            let carried = offset + bits - 64;
            self.data[word + 1] &= !mask(carried);
            self.data[word + 1] |= value >> (64 - offset);
        }
    }

    /// Returns the number of bits per element.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns the number of logical elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the size of the backing storage in bytes.
    pub fn storage_bytes(&self) -> usize {
        self.data.len() * 8
    }

    /// Returns a reference to the raw `u64` storage words.
    pub fn raw_data(&self) -> &[u64] {
        &self.data
    }

    /// Iterates over every element in index order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Re-packs every element with a wider width.
    pub fn widened(&self, bits: u8) -> Self {
        debug_assert!(bits >= self.bits);
        let mut wider = Self::new(bits, self.len);
        for i in 0..self.len {
            wider.set(i, self.get(i));
        }
        wider
    }
}

// ---------------------------------------------------------------------------
// Streaming encoder
// ---------------------------------------------------------------------------

/// Append-only encoder that hands each completed word to a sink.
///
/// Entries accumulate in a 64-bit register. The register is emitted when it
/// fills exactly, or when the next entry overflows it, in which case the
/// entry's high bits start the following word.
pub struct PackedWriter<F> {
    sink: F,
    bits: u8,
    register: u64,
    filled: u32,
    words: usize,
}

impl<F> PackedWriter<F>
where
    F: FnMut(u64) -> io::Result<()>,
{
    /// Creates an encoder for entries of `bits` bits.
    pub fn new(bits: u8, sink: F) -> Result<Self, PackError> {
        check_width(bits)?;
        Ok(Self {
            sink,
            bits,
            register: 0,
            filled: 0,
            words: 0,
        })
    }

    /// Appends one entry.
    pub fn push(&mut self, value: u32) -> Result<(), PackError> {
        let bits = u32::from(self.bits);
        if u64::from(value) > mask(bits) {
            return Err(PackError::ValueOutOfRange {
                value,
                bits: self.bits,
            });
        }
        let value = u64::from(value);
        let space = 64 - self.filled;
        self.register |= value << self.filled;
        if bits < space {
            self.filled += bits;
        } else if bits == space {
            self.flush()?;
        } else {
            self.flush()?;
            self.register = value >> space;
            self.filled = bits - space;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PackError> {
        (self.sink)(self.register)?;
        self.words += 1;
        self.register = 0;
        self.filled = 0;
        Ok(())
    }

    /// Words emitted so far.
    pub fn words_written(&self) -> usize {
        self.words
    }

    /// Emits any partial word and checks the total against `expected_words`.
    pub fn finish(mut self, expected_words: usize) -> Result<usize, PackError> {
        if self.filled > 0 {
            self.flush()?;
        }
        if self.words != expected_words {
            return Err(PackError::WordCountMismatch {
                expected: expected_words,
                actual: self.words,
            });
        }
        Ok(self.words)
    }
}

// ---------------------------------------------------------------------------
// Word sources
// ---------------------------------------------------------------------------

/// Supplies 64-bit words to a [`PackedReader`].
pub trait WordSource {
    /// Returns the next word.
    fn next_word(&mut self) -> Result<u64, PackError>;

    /// Discards `count` words without interpreting them.
    fn skip_words(&mut self, count: usize) -> Result<(), PackError>;
}

/// Words already held in memory.
pub struct SliceWords<'a> {
    words: &'a [u64],
    position: usize,
}

impl<'a> SliceWords<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self { words, position: 0 }
    }
}

impl WordSource for SliceWords<'_> {
    fn next_word(&mut self) -> Result<u64, PackError> {
        let word = *self.words.get(self.position).ok_or(PackError::Exhausted)?;
        self.position += 1;
        Ok(word)
    }

    fn skip_words(&mut self, count: usize) -> Result<(), PackError> {
        if self.position + count > self.words.len() {
            return Err(PackError::Exhausted);
        }
        self.position += count;
        Ok(())
    }
}

/// Big-endian words read from a forward-only stream.
///
/// Skips are discard-reads, so the stream never needs to seek.
pub struct StreamWords<R> {
    inner: R,
    remaining: usize,
}

impl<R: Read> StreamWords<R> {
    /// Reads at most `word_count` words from `inner`.
    pub fn new(inner: R, word_count: usize) -> Self {
        Self {
            inner,
            remaining: word_count,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> WordSource for StreamWords<R> {
    fn next_word(&mut self) -> Result<u64, PackError> {
        if self.remaining == 0 {
            return Err(PackError::Exhausted);
        }
        let word = self.inner.read_u64::<BigEndian>().map_err(eof_to_exhausted)?;
        self.remaining -= 1;
        Ok(word)
    }

    fn skip_words(&mut self, count: usize) -> Result<(), PackError> {
        if count > self.remaining {
            return Err(PackError::Exhausted);
        }
        discard(&mut self.inner, count as u64 * 8)?;
        self.remaining -= count;
        Ok(())
    }
}

pub(crate) fn eof_to_exhausted(err: io::Error) -> PackError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        PackError::Exhausted
    } else {
        PackError::Io(err)
    }
}

/// Reads and drops exactly `bytes` bytes.
pub(crate) fn discard<R: Read>(inner: &mut R, bytes: u64) -> Result<(), PackError> {
    let copied = io::copy(&mut inner.take(bytes), &mut io::sink())?;
    if copied != bytes {
        return Err(PackError::Exhausted);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Streaming decoder
// ---------------------------------------------------------------------------

/// Register decoder over a [`WordSource`].
pub struct PackedReader<S> {
    source: S,
    bits: u8,
    register: u64,
    available: u32,
    remaining: usize,
}

impl<S: WordSource> PackedReader<S> {
    /// Decodes `len` entries of `bits` bits from `source`.
    pub fn new(source: S, bits: u8, len: usize) -> Result<Self, PackError> {
        check_width(bits)?;
        Ok(Self {
            source,
            bits,
            register: 0,
            available: 0,
            remaining: len,
        })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: WordSource> ElementSource for PackedReader<S> {
    fn next_value(&mut self) -> Result<u32, PackError> {
        if self.remaining == 0 {
            return Err(PackError::Exhausted);
        }
        let bits = u32::from(self.bits);
        let value = if self.available >= bits {
            let value = self.register & mask(bits);
            self.register >>= bits;
            self.available -= bits;
            value
        } else {
            let low = self.register & mask(self.available);
            let word = self.source.next_word()?;
            let need = bits - self.available;
            let value = low | ((word & mask(need)) << self.available);
            self.register = word >> need;
            self.available = 64 - need;
            value
        };
        self.remaining -= 1;
        Ok(value as u32)
    }

    fn skip_values(&mut self, count: usize) -> Result<(), PackError> {
        if count > self.remaining {
            return Err(PackError::Exhausted);
        }
        let total_bits = count as u64 * u64::from(self.bits);
        if total_bits <= u64::from(self.available) {
            let used = total_bits as u32;
            self.register = if used >= 64 { 0 } else { self.register >> used };
            self.available -= used;
        } else {
            let past_register = total_bits - u64::from(self.available);
            self.source.skip_words((past_register / 64) as usize)?;
            let within = (past_register % 64) as u32;
            if within > 0 {
                let word = self.source.next_word()?;
                self.register = word >> within;
                self.available = 64 - within;
            } else {
                self.register = 0;
                self.available = 0;
            }
        }
        self.remaining -= count;
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.remaining
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
