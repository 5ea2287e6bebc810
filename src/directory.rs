use crate::common::SectorType;
use binrw::{binrw, BinRead, BinWrite};
use std::fmt::{Display, Formatter};

/// A single 128-byte directory entry.
///
/// https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/a94d7445-c4be-49cd-b6b9-2f4abc663817
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub struct Entry {
    /// UTF-16LE name, NUL-terminated; only the first `name_len` bytes are meaningful.
    pub name: [u8; 64],
    /// Length of the name in bytes, including the terminating NUL.
    pub name_len: u16,
    pub object_type: ObjectType,
    pub color: Color,
    /// Stream ID of the left sibling, or NOSTREAM.
    pub left_sibling_id: SectorType,
    /// Stream ID of the right sibling, or NOSTREAM.
    pub right_sibling_id: SectorType,
    /// Stream ID of the first child, or NOSTREAM.
    pub child_id: SectorType,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    pub creation_time: u64,
    pub modified_time: u64,
    /// First sector of the stream (regular or mini, depending on size), or
    /// the mini-stream's first sector for the root entry.
    pub start_sector: SectorType,
    pub size: u64,
}

impl Display for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "name: {}, type: {}, color: {}, size: {}, left: {}, right: {}, child: {}",
            self.name(),
            self.object_type,
            self.color,
            self.size,
            self.left_sibling_id,
            self.right_sibling_id,
            self.child_id
        )
    }
}

impl Entry {
    /// Lossily decodes the name for display purposes only; hashing and
    /// comparisons operate on the raw UTF-16LE bytes directly.
    pub fn name(&self) -> String {
        let len = self.name_len.saturating_sub(2) as usize;
        let len = len.min(64);
        self.name[..len]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .map(|code| char::from_u32(code as u32).unwrap_or('\u{FFFD}'))
            .collect()
    }

    /// The on-disk name bytes actually in use (excludes the trailing NUL and
    /// any unused tail of the fixed 64-byte field).
    pub fn name_bytes(&self) -> &[u8] {
        let len = (self.name_len as usize).saturating_sub(2).min(64);
        &self.name[..len]
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.object_type, ObjectType::Stream)
    }

    pub fn is_storage_like(&self) -> bool {
        !self.is_stream()
    }

    /// True iff `self`'s on-disk name and `other` (another on-disk,
    /// NUL-terminated UTF-16LE name) share a common prefix over
    /// `min(name_len, other.len())` bytes. This is a prefix compare, not an
    /// exact-length one — see DESIGN.md for why that's preserved rather than
    /// tightened to `==`.
    pub fn name_prefix_matches(&self, other: &[u8]) -> bool {
        let n = (self.name_len as usize).min(other.len());
        self.name[..n] == other[..n]
    }

    /// Builds a fresh, empty stream entry with the given name: black,
    /// unlinked, with no sector allocated yet.
    pub fn new_stream(name: &[u8]) -> Entry {
        assert!(name.len() <= 64, "directory entry name exceeds 64 bytes");
        let mut buf = [0u8; 64];
        buf[..name.len()].copy_from_slice(name);
        Entry {
            name: buf,
            name_len: name.len() as u16,
            object_type: ObjectType::Stream,
            color: Color::Black,
            left_sibling_id: SectorType::FreeSect,
            right_sibling_id: SectorType::FreeSect,
            child_id: SectorType::FreeSect,
            clsid: [0u8; 16],
            state_bits: 0,
            creation_time: 0,
            modified_time: 0,
            start_sector: SectorType::FreeSect,
            size: 0,
        }
    }

    /// An all-zero, unused slot for padding the last directory sector, with
    /// sibling/child IDs set to NOSTREAM as required by MS-CFB.
    pub fn unused() -> Entry {
        Entry {
            name: [0u8; 64],
            name_len: 0,
            object_type: ObjectType::Unknown,
            color: Color::Black,
            left_sibling_id: SectorType::FreeSect,
            right_sibling_id: SectorType::FreeSect,
            child_id: SectorType::FreeSect,
            clsid: [0u8; 16],
            state_bits: 0,
            creation_time: 0,
            modified_time: 0,
            start_sector: SectorType::FreeSect,
            size: 0,
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    #[brw(magic(0x00u8))]
    Unknown,
    #[brw(magic(0x01u8))]
    Storage,
    #[brw(magic(0x02u8))]
    Stream,
    #[brw(magic(0x05u8))]
    RootStorage,
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectType::Unknown => write!(f, "unknown"),
            ObjectType::Storage => write!(f, "storage"),
            ObjectType::Stream => write!(f, "stream"),
            ObjectType::RootStorage => write!(f, "root storage"),
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    #[brw(magic(0x00u8))]
    Red,
    #[brw(magic(0x01u8))]
    Black,
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Black => write!(f, "black"),
        }
    }
}
