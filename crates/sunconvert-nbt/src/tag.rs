//! Wire tag types and typed access over the `quartz_nbt` value tree.
//!
//! Materialised values are plain [`NbtCompound`]/[`NbtTag`]/[`NbtList`]. The
//! streaming reader and writer only need the wire id of each payload, which
//! lives in [`TagType`].

pub use quartz_nbt::{NbtCompound, NbtList, NbtTag};

use crate::error::NbtError;

/// Tag type identifiers as they appear on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagType {
    pub fn from_id(id: u8) -> Result<Self, NbtError> {
        Ok(match id {
            0 => Self::End,
            1 => Self::Byte,
            2 => Self::Short,
            3 => Self::Int,
            4 => Self::Long,
            5 => Self::Float,
            6 => Self::Double,
            7 => Self::ByteArray,
            8 => Self::String,
            9 => Self::List,
            10 => Self::Compound,
            11 => Self::IntArray,
            12 => Self::LongArray,
            other => return Err(NbtError::UnknownTagType(other)),
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Wire type of a materialised value.
    pub fn of(tag: &NbtTag) -> Self {
        match tag {
            NbtTag::Byte(_) => Self::Byte,
            NbtTag::Short(_) => Self::Short,
            NbtTag::Int(_) => Self::Int,
            NbtTag::Long(_) => Self::Long,
            NbtTag::Float(_) => Self::Float,
            NbtTag::Double(_) => Self::Double,
            NbtTag::ByteArray(_) => Self::ByteArray,
            NbtTag::String(_) => Self::String,
            NbtTag::List(_) => Self::List,
            NbtTag::Compound(_) => Self::Compound,
            NbtTag::IntArray(_) => Self::IntArray,
            NbtTag::LongArray(_) => Self::LongArray,
        }
    }

    /// Payload size of fixed-width types.
    pub fn fixed_size(self) -> Option<u64> {
        match self {
            Self::End => Some(0),
            Self::Byte => Some(1),
            Self::Short => Some(2),
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            _ => None,
        }
    }
}

/// Element type of a list: the type of its first element, or `End` when
/// empty. Mixed lists cannot be written.
pub fn list_element_type(list: &NbtList) -> Result<TagType, NbtError> {
    let mut items = list.iter();
    let Some(first) = items.next() else {
        return Ok(TagType::End);
    };
    let elem = TagType::of(first);
    match items.map(TagType::of).find(|&ty| ty != elem) {
        Some(other) => Err(NbtError::MixedList { expected: elem, found: other }),
        None => Ok(elem),
    }
}

/// Lenient reads of a single value.
pub trait TagExt {
    /// Integer payloads of any width, widened.
    fn to_i64(&self) -> Option<i64>;
    /// Integer payloads that fit an `i32`.
    fn to_i32(&self) -> Option<i32>;
    /// A non-zero integer is `true`.
    fn to_bool(&self) -> Option<bool>;
    fn as_text(&self) -> Option<&str>;
    fn as_compound(&self) -> Option<&NbtCompound>;
    fn as_list(&self) -> Option<&NbtList>;
}

impl TagExt for NbtTag {
    fn to_i64(&self) -> Option<i64> {
        match *self {
            NbtTag::Byte(v) => Some(i64::from(v)),
            NbtTag::Short(v) => Some(i64::from(v)),
            NbtTag::Int(v) => Some(i64::from(v)),
            NbtTag::Long(v) => Some(v),
            _ => None,
        }
    }

    fn to_i32(&self) -> Option<i32> {
        self.to_i64().and_then(|v| i32::try_from(v).ok())
    }

    fn to_bool(&self) -> Option<bool> {
        self.to_i64().map(|v| v != 0)
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            NbtTag::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(c) => Some(c),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&NbtList> {
        match self {
            NbtTag::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Optional, width-tolerant field access. `NbtCompound::get` is strict about
/// the stored width; block entity data from different tools is not.
pub trait CompoundExt {
    fn get_tag(&self, key: &str) -> Option<&NbtTag>;

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_tag(key).and_then(TagExt::to_i32)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_tag(key).and_then(TagExt::to_i64)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_tag(key).and_then(TagExt::to_bool)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get_tag(key).and_then(TagExt::as_text)
    }

    fn get_compound(&self, key: &str) -> Option<&NbtCompound> {
        self.get_tag(key).and_then(TagExt::as_compound)
    }

    fn get_list(&self, key: &str) -> Option<&NbtList> {
        self.get_tag(key).and_then(TagExt::as_list)
    }

    /// Entries ordered by key, for byte-stable output.
    fn sorted_entries(&self) -> Vec<(&str, &NbtTag)>;
}

impl CompoundExt for NbtCompound {
    fn get_tag(&self, key: &str) -> Option<&NbtTag> {
        self.inner().get(key)
    }

    fn sorted_entries(&self) -> Vec<(&str, &NbtTag)> {
        let mut entries: Vec<(&str, &NbtTag)> = self.inner().iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_type_ids() {
        for id in 0..=12u8 {
            assert_eq!(TagType::from_id(id).unwrap().id(), id);
        }
        assert!(matches!(TagType::from_id(13), Err(NbtError::UnknownTagType(13))));
        assert_eq!(TagType::of(&NbtTag::LongArray(vec![1])), TagType::LongArray);
        assert_eq!(TagType::of(&NbtTag::List(NbtList::new())), TagType::List);
    }

    #[test]
    fn test_typed_getters_widen_integers() {
        let mut compound = NbtCompound::new();
        compound.insert("b", NbtTag::Byte(3));
        compound.insert("s", NbtTag::Short(-2));
        compound.insert("l", NbtTag::Long(i64::MAX));
        compound.insert("name", NbtTag::String("chest".into()));
        assert_eq!(compound.get_i32("b"), Some(3));
        assert_eq!(compound.get_i32("s"), Some(-2));
        assert_eq!(compound.get_i32("l"), None);
        assert_eq!(compound.get_i64("l"), Some(i64::MAX));
        assert_eq!(compound.get_str("name"), Some("chest"));
        assert_eq!(compound.get_bool("b"), Some(true));
        assert_eq!(compound.get_str("missing"), None);
    }

    #[test]
    fn test_list_element_type() {
        assert_eq!(list_element_type(&NbtList::new()).unwrap(), TagType::End);
        let ints = NbtList::from(vec![NbtTag::Int(1), NbtTag::Int(2)]);
        assert_eq!(list_element_type(&ints).unwrap(), TagType::Int);
        let mixed = NbtList::from(vec![NbtTag::Int(1), NbtTag::String("x".into())]);
        assert!(matches!(
            list_element_type(&mixed),
            Err(NbtError::MixedList { expected: TagType::Int, found: TagType::String })
        ));
    }

    #[test]
    fn test_sorted_entries() {
        let mut compound = NbtCompound::new();
        for key in ["z", "a", "m"] {
            compound.insert(key, NbtTag::Int(0));
        }
        let keys: Vec<&str> = compound.sorted_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "m", "z"]);
    }
}
