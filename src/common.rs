use binrw::binrw;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// REGSECT 0x00000000 - 0xFFFFFFF9 Regular sector number.
///
/// MAXREGSECT 0xFFFFFFFA Maximum regular sector number.
///
/// Not applicable 0xFFFFFFFB Reserved for future use.
///
/// DIFSECT 0xFFFFFFFC Specifies a DIFAT sector in the FAT.
///
/// FATSECT 0xFFFFFFFD Specifies a FAT sector in the FAT.
///
/// ENDOFCHAIN 0xFFFFFFFE End of a linked chain of sectors.
///
/// FREESECT 0xFFFFFFFF Specifies an unallocated sector in the FAT, Mini FAT, or DIFAT.
/// Directory entries reuse this exact bit pattern as the NOSTREAM terminator.
pub const MAX_REG_SECT: u32 = 0xFFFF_FFFA;
pub const NOT_APPLICABLE: u32 = 0xFFFF_FFFB;
pub const DIF_SECT: u32 = 0xFFFF_FFFC;
pub const FAT_SECT: u32 = 0xFFFF_FFFD;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FREE_SECT: u32 = 0xFFFF_FFFF;
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

pub const MINI_SECTOR_SIZE: usize = 64;
pub const MINI_STREAM_CUTOFF_SIZE: u32 = 0x0000_1000;
pub const DIFAT_IN_HEADER: usize = 109;
pub const DIRENT_SIZE: usize = 128;
pub const HEADER_SIZE: usize = 512;

/// Above this, the rewriter would need an extended DIFAT; it refuses instead (`Error::UnsupportedLayout`).
pub const MAX_WRITABLE_SIZE: u64 = 457_183_232;
/// Above this, the rewriter upgrades from 512- to 4096-byte sectors (major version 4).
pub const SECTOR_UPGRADE_THRESHOLD: u64 = 7_143_936;

/// `\x05DigitalSignature`, UTF-16LE, NUL-terminated (36 bytes).
pub const DIGITAL_SIGNATURE: &[u8] = &[
    0x05, 0x00, 0x44, 0x00, 0x69, 0x00, 0x67, 0x00, 0x69, 0x00, 0x74, 0x00, 0x61, 0x00, 0x6C, 0x00,
    0x53, 0x00, 0x69, 0x00, 0x67, 0x00, 0x6E, 0x00, 0x61, 0x00, 0x74, 0x00, 0x75, 0x00, 0x72, 0x00,
    0x65, 0x00, 0x00, 0x00,
];
/// `\x05MsiDigitalSignatureEx`, UTF-16LE, NUL-terminated (46 bytes).
pub const DIGITAL_SIGNATURE_EX: &[u8] = &[
    0x05, 0x00, 0x4D, 0x00, 0x73, 0x00, 0x69, 0x00, 0x44, 0x00, 0x69, 0x00, 0x67, 0x00, 0x69, 0x00,
    0x74, 0x00, 0x61, 0x00, 0x6C, 0x00, 0x53, 0x00, 0x69, 0x00, 0x67, 0x00, 0x6E, 0x00, 0x61, 0x00,
    0x74, 0x00, 0x75, 0x00, 0x72, 0x00, 0x65, 0x00, 0x45, 0x00, 0x78, 0x00, 0x00, 0x00,
];

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SectorType {
    #[brw(magic(0xFFFFFFFAu32))]
    MaxRegSect,
    #[brw(magic(0xFFFFFFFBu32))]
    NotApplicable,
    #[brw(magic(0xFFFFFFFCu32))]
    DifSect,
    #[brw(magic(0xFFFFFFFDu32))]
    FatSect,
    #[default]
    #[brw(magic(0xFFFFFFFEu32))]
    EndOfChain,
    #[brw(magic(0xFFFFFFFFu32))]
    FreeSect,
    RegularSect(u32),
}

impl Display for SectorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SectorType::MaxRegSect => write!(f, "MaxRegSect"),
            SectorType::NotApplicable => write!(f, "NotApplicable"),
            SectorType::DifSect => write!(f, "DifatSect"),
            SectorType::FatSect => write!(f, "FatSect"),
            SectorType::EndOfChain => write!(f, "EndOfChain"),
            SectorType::FreeSect => write!(f, "FreeSect"),
            SectorType::RegularSect(v) => write!(f, "{}", v),
        }
    }
}

impl SectorType {
    /// The raw 32-bit on-disk value, whichever sentinel (or regular sector) it is.
    pub fn raw(&self) -> u32 {
        match self {
            SectorType::MaxRegSect => MAX_REG_SECT,
            SectorType::NotApplicable => NOT_APPLICABLE,
            SectorType::DifSect => DIF_SECT,
            SectorType::FatSect => FAT_SECT,
            SectorType::EndOfChain => END_OF_CHAIN,
            SectorType::FreeSect => FREE_SECT,
            SectorType::RegularSect(v) => *v,
        }
    }

    /// `Some(sector)` iff this is a regular, addressable sector number.
    pub fn as_regular(&self) -> Option<u32> {
        match self {
            SectorType::RegularSect(v) if *v < MAX_REG_SECT => Some(*v),
            _ => None,
        }
    }

    pub fn is_end_of_chain(&self) -> bool {
        matches!(self, SectorType::EndOfChain)
    }

    /// Sibling/child ID fields use this same bit pattern to mean NOSTREAM.
    pub fn is_nostream(&self) -> bool {
        matches!(self, SectorType::FreeSect)
    }

    pub fn from_raw(v: u32) -> SectorType {
        match v {
            MAX_REG_SECT => SectorType::MaxRegSect,
            NOT_APPLICABLE => SectorType::NotApplicable,
            DIF_SECT => SectorType::DifSect,
            FAT_SECT => SectorType::FatSect,
            END_OF_CHAIN => SectorType::EndOfChain,
            FREE_SECT => SectorType::FreeSect,
            v => SectorType::RegularSect(v),
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MinorVersion {
    #[brw(magic(0x003Eu16))]
    MainVersion,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
pub enum MajorVersion {
    #[brw(magic(0x0003u16))]
    #[default]
    Version3,
    #[brw(magic(0x0004u16))]
    Version4,
}

/// The sector shift is redundant with the major version in a well-formed file;
/// the major version is authoritative.
pub fn get_sector_size(version: &MajorVersion) -> usize {
    if *version == MajorVersion::Version3 {
        512
    } else {
        4096
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad CFBF signature")]
    BadSignature,
    #[error("buffer too small for a CFBF header and its minimum 3 sectors")]
    TooSmall,
    #[error("address translation fell outside the input buffer")]
    OutOfBounds,
    #[error("corrupt directory or FAT/MiniFAT chain")]
    Corrupt,
    #[error("output would require an extended DIFAT (>109 FAT sectors), which is unsupported")]
    UnsupportedLayout,
    #[error("storages cannot be deleted or replaced, only streams")]
    CannotMutateStorage,
    #[error("output sink rejected a write")]
    ShortWrite(#[from] std::io::Error),
    #[error("malformed fixed-layout record")]
    Parse(#[from] binrw::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
