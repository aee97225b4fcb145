use std::io;

use thiserror::Error;

use crate::tag::TagType;

/// Errors produced while reading or writing tagged documents.
#[derive(Debug, Error)]
pub enum NbtError {
    /// A tag type byte outside `0..=12`.
    #[error("unknown tag type {0}")]
    UnknownTagType(u8),
    /// The stream ended in the middle of a value.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// A list or array declared a negative length.
    #[error("negative length {0}")]
    NegativeLength(i32),
    /// String payload is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// The root tag of a document is not a compound.
    #[error("root tag is {0:?}, expected Compound")]
    NotACompound(TagType),
    /// Asked to advance to an offset that has already been passed.
    #[error("cannot advance from offset {current} back to {target}")]
    SeekBackwards {
        /// Offset of the reader.
        current: u64,
        /// Requested offset.
        target: u64,
    },
    /// String longer than a `u16` length prefix can express.
    #[error("string of {0} bytes is too long")]
    StringTooLong(usize),
    /// A list or array longer than an `i32` length prefix can express.
    #[error("sequence of {0} elements is too long")]
    SequenceTooLong(usize),
    /// A list whose elements do not share one type.
    #[error("list mixes {expected:?} and {found:?} elements")]
    MixedList {
        /// Type of the first element.
        expected: TagType,
        /// First element of a different type.
        found: TagType,
    },
    /// Lists and compounds nested deeper than [`MAX_DEPTH`](crate::reader::MAX_DEPTH).
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for NbtError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            NbtError::UnexpectedEof
        } else {
            NbtError::Io(err)
        }
    }
}

impl From<NbtError> for io::Error {
    fn from(err: NbtError) -> Self {
        match err {
            NbtError::Io(inner) => inner,
            NbtError::UnexpectedEof => io::Error::from(io::ErrorKind::UnexpectedEof),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
