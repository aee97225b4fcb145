//! Offset-tracking streaming reader.
//!
//! [`NbtReader`] reads one tag at a time and counts every byte it consumes.
//! A first pass can note the offset at which a bulky value starts and skip
//! it; a later pass over a fresh stream can [`advance_to`](NbtReader::advance_to)
//! that offset by discarding bytes and decode only that value. Nothing here
//! seeks, so the transport may be a forward-only decompressor.

use std::io::{self, Read};
use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::error::NbtError;
use crate::tag::{NbtCompound, NbtList, NbtTag, TagType};

/// Deepest list/compound nesting accepted while reading or skipping.
pub const MAX_DEPTH: usize = 512;

/// Counts bytes pulled through it.
struct Counting<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> Read for Counting<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// Streaming tag reader generic over byte order.
pub struct NbtReader<R, B> {
    inner: Counting<R>,
    _order: PhantomData<B>,
}

/// Big-endian reader (Java edition documents).
pub type JavaReader<R> = NbtReader<R, BigEndian>;

/// Little-endian reader (Bedrock edition documents).
pub type BedrockReader<R> = NbtReader<R, LittleEndian>;

impl<R: Read, B: ByteOrder> NbtReader<R, B> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Counting { inner, offset: 0 },
            _order: PhantomData,
        }
    }

    /// Bytes consumed since construction.
    pub fn offset(&self) -> u64 {
        self.inner.offset
    }

    pub fn into_inner(self) -> R {
        self.inner.inner
    }

    pub fn read_u8(&mut self) -> Result<u8, NbtError> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8, NbtError> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_i16(&mut self) -> Result<i16, NbtError> {
        Ok(self.inner.read_i16::<B>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, NbtError> {
        Ok(self.inner.read_i32::<B>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64, NbtError> {
        Ok(self.inner.read_i64::<B>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32, NbtError> {
        Ok(self.inner.read_f32::<B>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64, NbtError> {
        Ok(self.inner.read_f64::<B>()?)
    }

    pub fn read_tag_type(&mut self) -> Result<TagType, NbtError> {
        TagType::from_id(self.read_u8()?)
    }

    /// Reads a tag type and, unless it is `End`, the tag name.
    pub fn read_tag_header(&mut self) -> Result<(TagType, String), NbtError> {
        let ty = self.read_tag_type()?;
        if ty == TagType::End {
            return Ok((ty, String::new()));
        }
        let name = self.read_string()?;
        Ok((ty, name))
    }

    /// Reads a `u16`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, NbtError> {
        let len = self.inner.read_u16::<B>()? as usize;
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| NbtError::InvalidUtf8)
    }

    /// Reads an `i32` length prefix, rejecting negative values.
    pub fn read_length(&mut self) -> Result<usize, NbtError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| NbtError::NegativeLength(len))
    }

    /// Reads a list's element type and element count.
    pub fn read_list_header(&mut self) -> Result<(TagType, usize), NbtError> {
        let ty = self.read_tag_type()?;
        let len = self.read_length()?;
        Ok((ty, len))
    }

    /// Reads a byte array. Memory grows with the bytes actually present, not
    /// with the declared length.
    pub fn read_byte_array(&mut self) -> Result<Vec<i8>, NbtError> {
        let len = self.read_length()?;
        let mut bytes = Vec::with_capacity(len.min(4096));
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(NbtError::UnexpectedEof);
        }
        Ok(bytes.into_iter().map(|b| b as i8).collect())
    }

    /// Reads a value of a known type.
    pub fn read_value(&mut self, ty: TagType) -> Result<NbtTag, NbtError> {
        self.read_nested(ty, 0)
    }

    fn read_nested(&mut self, ty: TagType, depth: usize) -> Result<NbtTag, NbtError> {
        Ok(match ty {
            TagType::End => return Err(NbtError::UnknownTagType(0)),
            TagType::Byte => NbtTag::Byte(self.read_i8()?),
            TagType::Short => NbtTag::Short(self.read_i16()?),
            TagType::Int => NbtTag::Int(self.read_i32()?),
            TagType::Long => NbtTag::Long(self.read_i64()?),
            TagType::Float => NbtTag::Float(self.read_f32()?),
            TagType::Double => NbtTag::Double(self.read_f64()?),
            TagType::ByteArray => NbtTag::ByteArray(self.read_byte_array()?),
            TagType::String => NbtTag::String(self.read_string()?),
            TagType::List => {
                let depth = descend(depth)?;
                let (elem, len) = self.read_list_header()?;
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.read_nested(elem, depth)?);
                }
                NbtTag::List(NbtList::from(items))
            }
            TagType::Compound => NbtTag::Compound(self.read_compound_at(descend(depth)?)?),
            TagType::IntArray => {
                let len = self.read_length()?;
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.read_i32()?);
                }
                NbtTag::IntArray(items)
            }
            TagType::LongArray => {
                let len = self.read_length()?;
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.read_i64()?);
                }
                NbtTag::LongArray(items)
            }
        })
    }

    /// Reads named tags up to and including the closing `End`.
    pub fn read_compound(&mut self) -> Result<NbtCompound, NbtError> {
        self.read_compound_at(0)
    }

    fn read_compound_at(&mut self, depth: usize) -> Result<NbtCompound, NbtError> {
        let mut compound = NbtCompound::new();
        loop {
            let (ty, name) = self.read_tag_header()?;
            if ty == TagType::End {
                return Ok(compound);
            }
            let value = self.read_nested(ty, depth)?;
            compound.insert(name, value);
        }
    }

    /// Reads a whole document: a named root compound.
    pub fn read_root(&mut self) -> Result<(String, NbtCompound), NbtError> {
        let (ty, name) = self.read_tag_header()?;
        if ty != TagType::Compound {
            return Err(NbtError::NotACompound(ty));
        }
        Ok((name, self.read_compound()?))
    }

    /// Consumes a value of a known type without building it.
    pub fn skip_value(&mut self, ty: TagType) -> Result<(), NbtError> {
        self.skip_nested(ty, 0)
    }

    fn skip_nested(&mut self, ty: TagType, depth: usize) -> Result<(), NbtError> {
        if let Some(size) = ty.fixed_size() {
            return self.skip_bytes(size);
        }
        match ty {
            TagType::ByteArray => {
                let len = self.read_length()? as u64;
                self.skip_bytes(len)
            }
            TagType::IntArray => {
                let len = self.read_length()? as u64;
                self.skip_bytes(len * 4)
            }
            TagType::LongArray => {
                let len = self.read_length()? as u64;
                self.skip_bytes(len * 8)
            }
            TagType::String => {
                let len = u64::from(self.inner.read_u16::<B>()?);
                self.skip_bytes(len)
            }
            TagType::List => {
                let depth = descend(depth)?;
                let (elem, len) = self.read_list_header()?;
                match elem.fixed_size() {
                    Some(size) => self.skip_bytes(size * len as u64),
                    None => {
                        for _ in 0..len {
                            self.skip_nested(elem, depth)?;
                        }
                        Ok(())
                    }
                }
            }
            TagType::Compound => {
                let depth = descend(depth)?;
                loop {
                    let ty = self.read_tag_type()?;
                    if ty == TagType::End {
                        return Ok(());
                    }
                    self.skip_nested(TagType::String, depth)?;
                    self.skip_nested(ty, depth)?;
                }
            }
            _ => Ok(()),
        }
    }

    /// Discards exactly `count` bytes.
    pub fn skip_bytes(&mut self, count: u64) -> Result<(), NbtError> {
        let copied = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        if copied != count {
            return Err(NbtError::UnexpectedEof);
        }
        Ok(())
    }

    /// Discards bytes until [`offset`](Self::offset) equals `target`.
    pub fn advance_to(&mut self, target: u64) -> Result<(), NbtError> {
        let current = self.offset();
        if target < current {
            return Err(NbtError::SeekBackwards { current, target });
        }
        self.skip_bytes(target - current)
    }
}

fn descend(depth: usize) -> Result<usize, NbtError> {
    if depth >= MAX_DEPTH {
        return Err(NbtError::TooDeep(MAX_DEPTH));
    }
    Ok(depth + 1)
}

/// Raw access for payloads decoded outside the tag model, such as packed
/// long arrays. Bytes read this way still advance the offset.
impl<R: Read, B> Read for NbtReader<R, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{BedrockWriter, JavaWriter};
    use std::io::Cursor;

    fn sample() -> NbtCompound {
        let mut inner = NbtCompound::new();
        inner.insert("Name", NbtTag::String("minecraft:stone".into()));
        let mut root = NbtCompound::new();
        root.insert("Width", NbtTag::Short(3));
        root.insert("Blocks", NbtTag::ByteArray(vec![1, 2, 3, -1]));
        root.insert("Palette", NbtTag::List(NbtList::from(vec![NbtTag::Compound(inner)])));
        root.insert("States", NbtTag::LongArray(vec![4005, -1]));
        root.insert("Pos", NbtTag::List(NbtList::from(vec![NbtTag::Int(-5), NbtTag::Int(7)])));
        root.insert("Empty", NbtTag::List(NbtList::new()));
        root.insert("Scale", NbtTag::Float(0.5));
        root
    }

    #[test]
    fn test_java_document_roundtrip() {
        let mut writer = JavaWriter::new(Vec::new());
        writer.write_root("Schematic", &sample()).unwrap();
        let bytes = writer.into_inner();

        let mut reader = JavaReader::new(Cursor::new(&bytes));
        let (name, root) = reader.read_root().unwrap();
        assert_eq!(name, "Schematic");
        assert_eq!(root, sample());
        assert_eq!(reader.offset(), bytes.len() as u64);
    }

    #[test]
    fn test_skip_matches_read_length() {
        let mut writer = BedrockWriter::new(Vec::new());
        writer.write_root("", &sample()).unwrap();
        let bytes = writer.into_inner();

        let mut reader = BedrockReader::new(Cursor::new(&bytes));
        let (ty, _) = reader.read_tag_header().unwrap();
        reader.skip_value(ty).unwrap();
        assert_eq!(reader.offset(), bytes.len() as u64);
    }

    #[test]
    fn test_recorded_offset_second_pass() {
        let mut writer = JavaWriter::new(Vec::new());
        writer.write_root("", &sample()).unwrap();
        let bytes = writer.into_inner();

        // First pass: note where the Blocks value starts and skip it.
        let mut first = JavaReader::new(Cursor::new(&bytes));
        first.read_tag_header().unwrap();
        let mut blocks_at = None;
        loop {
            let (ty, name) = first.read_tag_header().unwrap();
            if ty == TagType::End {
                break;
            }
            if name == "Blocks" {
                blocks_at = Some(first.offset());
            }
            first.skip_value(ty).unwrap();
        }

        // Second pass: discard up to the recorded offset and read only that value.
        let mut second = JavaReader::new(Cursor::new(&bytes));
        second.advance_to(blocks_at.unwrap()).unwrap();
        assert_eq!(second.read_byte_array().unwrap(), vec![1, 2, 3, -1]);
        assert!(matches!(
            second.advance_to(0),
            Err(NbtError::SeekBackwards { target: 0, .. })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let mut writer = JavaWriter::new(Vec::new());
        writer.write_root("", &sample()).unwrap();
        let mut bytes = writer.into_inner();
        bytes.truncate(bytes.len() / 2);
        let mut reader = JavaReader::new(Cursor::new(&bytes));
        assert!(matches!(reader.read_root(), Err(NbtError::UnexpectedEof)));
    }

    #[test]
    fn test_negative_length_rejected() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFE];
        let mut reader = JavaReader::new(Cursor::new(&bytes[..]));
        assert!(matches!(reader.read_byte_array(), Err(NbtError::NegativeLength(-2))));
    }

    #[test]
    fn test_root_must_be_compound() {
        let bytes = [3u8, 0, 0, 0, 0, 0, 1];
        let mut reader = JavaReader::new(Cursor::new(&bytes[..]));
        assert!(matches!(reader.read_root(), Err(NbtError::NotACompound(TagType::Int))));
    }

    #[test]
    fn test_unknown_tag_type() {
        let bytes = [42u8];
        let mut reader = BedrockReader::new(Cursor::new(&bytes[..]));
        assert!(matches!(reader.read_tag_header(), Err(NbtError::UnknownTagType(42))));
    }

    #[test]
    fn test_oversized_byte_array_fails_without_preallocating() {
        // Declares i32::MAX bytes but carries three.
        let bytes = [0x7Fu8, 0xFF, 0xFF, 0xFF, 1, 2, 3];
        let mut reader = JavaReader::new(Cursor::new(&bytes[..]));
        assert!(matches!(reader.read_byte_array(), Err(NbtError::UnexpectedEof)));
    }

    /// `depth` nested single-element lists of lists, ending in an empty list.
    fn nested_lists(depth: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..depth {
            bytes.extend_from_slice(&[TagType::List.id(), 0, 0, 0, 1]);
        }
        bytes.extend_from_slice(&[TagType::End.id(), 0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let shallow = nested_lists(8);
        let mut reader = JavaReader::new(Cursor::new(&shallow));
        reader.read_value(TagType::List).unwrap();
        assert_eq!(reader.offset(), shallow.len() as u64);

        let deep = nested_lists(MAX_DEPTH + 10);
        let mut reader = JavaReader::new(Cursor::new(&deep));
        assert!(matches!(reader.read_value(TagType::List), Err(NbtError::TooDeep(MAX_DEPTH))));
        let mut reader = JavaReader::new(Cursor::new(&deep));
        assert!(matches!(reader.skip_value(TagType::List), Err(NbtError::TooDeep(MAX_DEPTH))));
    }
}
