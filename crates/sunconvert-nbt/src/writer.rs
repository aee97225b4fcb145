//! Offset-tracking streaming writer, the mirror of [`NbtReader`](crate::NbtReader).
//!
//! Documents can be emitted piecewise: open a compound with
//! [`begin_compound`](NbtWriter::begin_compound), stream large payloads
//! through typed writers or the raw [`Write`] impl, and close it with
//! [`end_compound`](NbtWriter::end_compound).

use std::io::{self, Write};
use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::NbtError;
use crate::tag::{CompoundExt, NbtCompound, NbtTag, TagType, list_element_type};

struct Counting<W> {
    inner: W,
    offset: u64,
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming tag writer generic over byte order.
pub struct NbtWriter<W, B> {
    inner: Counting<W>,
    _order: PhantomData<B>,
}

/// Big-endian writer (Java edition documents).
pub type JavaWriter<W> = NbtWriter<W, BigEndian>;

/// Little-endian writer (Bedrock edition documents).
pub type BedrockWriter<W> = NbtWriter<W, LittleEndian>;

impl<W: Write, B: ByteOrder> NbtWriter<W, B> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Counting { inner, offset: 0 },
            _order: PhantomData,
        }
    }

    /// Bytes written since construction.
    pub fn offset(&self) -> u64 {
        self.inner.offset
    }

    pub fn into_inner(self) -> W {
        self.inner.inner
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), NbtError> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), NbtError> {
        Ok(self.inner.write_i8(value)?)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), NbtError> {
        Ok(self.inner.write_i16::<B>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), NbtError> {
        Ok(self.inner.write_i32::<B>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), NbtError> {
        Ok(self.inner.write_i64::<B>(value)?)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), NbtError> {
        Ok(self.inner.write_f32::<B>(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), NbtError> {
        Ok(self.inner.write_f64::<B>(value)?)
    }

    /// Writes a tag type and, unless it is `End`, the tag name.
    pub fn write_tag_header(&mut self, ty: TagType, name: &str) -> Result<(), NbtError> {
        self.write_u8(ty.id())?;
        if ty != TagType::End {
            self.write_string(name)?;
        }
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), NbtError> {
        let len = u16::try_from(value.len()).map_err(|_| NbtError::StringTooLong(value.len()))?;
        self.inner.write_u16::<B>(len)?;
        self.inner.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Writes an `i32` length prefix.
    pub fn write_length(&mut self, len: usize) -> Result<(), NbtError> {
        let len = i32::try_from(len).map_err(|_| NbtError::SequenceTooLong(len))?;
        self.write_i32(len)
    }

    pub fn write_list_header(&mut self, elem: TagType, len: usize) -> Result<(), NbtError> {
        self.write_u8(elem.id())?;
        self.write_length(len)
    }

    pub fn write_byte_array(&mut self, values: &[i8]) -> Result<(), NbtError> {
        self.write_length(values.len())?;
        let bytes: Vec<u8> = values.iter().map(|&b| b as u8).collect();
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    /// Writes a value without a header. Compound entries are written in key
    /// order so equal trees produce equal bytes.
    pub fn write_value(&mut self, tag: &NbtTag) -> Result<(), NbtError> {
        match tag {
            NbtTag::Byte(v) => self.write_i8(*v),
            NbtTag::Short(v) => self.write_i16(*v),
            NbtTag::Int(v) => self.write_i32(*v),
            NbtTag::Long(v) => self.write_i64(*v),
            NbtTag::Float(v) => self.write_f32(*v),
            NbtTag::Double(v) => self.write_f64(*v),
            NbtTag::ByteArray(v) => self.write_byte_array(v),
            NbtTag::String(v) => self.write_string(v),
            NbtTag::List(items) => {
                self.write_list_header(list_element_type(items)?, items.len())?;
                items.iter().try_for_each(|item| self.write_value(item))
            }
            NbtTag::Compound(c) => {
                self.write_entries(c)?;
                self.end_compound()
            }
            NbtTag::IntArray(v) => {
                self.write_length(v.len())?;
                v.iter().try_for_each(|&x| self.write_i32(x))
            }
            NbtTag::LongArray(v) => {
                self.write_length(v.len())?;
                v.iter().try_for_each(|&x| self.write_i64(x))
            }
        }
    }

    /// Writes a header followed by its value.
    pub fn write_named(&mut self, name: &str, tag: &NbtTag) -> Result<(), NbtError> {
        self.write_tag_header(TagType::of(tag), name)?;
        self.write_value(tag)
    }

    fn write_entries(&mut self, compound: &NbtCompound) -> Result<(), NbtError> {
        for (key, value) in compound.sorted_entries() {
            self.write_named(key, value)?;
        }
        Ok(())
    }

    /// Opens a named compound; close it with [`end_compound`](Self::end_compound).
    pub fn begin_compound(&mut self, name: &str) -> Result<(), NbtError> {
        self.write_tag_header(TagType::Compound, name)
    }

    pub fn end_compound(&mut self) -> Result<(), NbtError> {
        self.write_u8(TagType::End.id())
    }

    /// Writes a whole document.
    pub fn write_root(&mut self, name: &str, root: &NbtCompound) -> Result<(), NbtError> {
        self.begin_compound(name)?;
        self.write_entries(root)?;
        self.end_compound()
    }
}

impl<W: Write, B> Write for NbtWriter<W, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
