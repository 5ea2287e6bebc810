use crate::common::{get_sector_size, DIFAT_IN_HEADER, END_OF_CHAIN, MajorVersion, MinorVersion, SectorType};
use binrw::binrw;
use std::fmt::{Display, Formatter};

/// The 512-byte CFBF header (major version 3) or the first 512 bytes of it
/// (major version 4, where the remaining 3584 bytes of the first sector are zero).
///
/// Field layout follows MS-CFB's header byte offsets. A handful of fields
/// that are always a fixed
/// constant in a well-formed file (the header CLSID, the byte-order mark,
/// the 6 reserved bytes) are consumed via `#[brw(magic(..))]` on the
/// following field rather than stored, matching how this container format
/// is conventionally parsed with `binrw`.
#[binrw]
#[brw(little)]
#[brw(magic(0xE11AB1A1E011CFD0u64))]
#[derive(Debug, Clone)]
pub struct Header {
    /// Header CLSID (16 bytes, always zero) consumed as a magic on minor_version.
    #[brw(magic(0x0000u128))]
    pub minor_version: MinorVersion,

    pub major_version: MajorVersion,

    /// Byte order mark (2 bytes, always 0xFFFE) consumed as a magic on sector_shift.
    #[brw(magic(0xFFFEu16))]
    pub sector_shift: u16,

    pub mini_sector_shift: u16,

    /// Reserved (6 bytes, always zero) consumed as a magic on the directory-sector count.
    #[brw(magic(b"\0\0\0\0\0\0"))]
    pub number_of_directory_sectors: u32,

    pub number_of_fat_sectors: u32,
    pub first_directory_sector_location: SectorType,
    pub transaction_signature_number: u32,
    pub mini_stream_cutoff_size: u32,
    pub first_mini_fat_sector_location: SectorType,
    pub number_of_mini_fat_sectors: u32,
    pub first_difat_sector_location: SectorType,
    pub number_of_difat_sectors: u32,
    /// The first 109 FAT sector locations; unused entries are `FreeSect`.
    pub header_difat: [SectorType; DIFAT_IN_HEADER],
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version: {:?}, sector_size: {}",
            &self.major_version,
            get_sector_size(&self.major_version)
        )
    }
}

impl Header {
    /// A header for freshly rewritten output, carrying forward the source
    /// file's minor version/transaction number but recomputed for the
    /// chosen output sector size. Stream/sector locations and counts are
    /// filled in by the rewriter's later save stages.
    pub fn new_for_output(source: &Header, sector_size: usize) -> Header {
        let major_version = if sector_size == 4096 {
            MajorVersion::Version4
        } else {
            MajorVersion::Version3
        };
        Header {
            minor_version: source.minor_version,
            major_version,
            sector_shift: if sector_size == 4096 { 0x000C } else { 0x0009 },
            mini_sector_shift: 0x0006,
            number_of_directory_sectors: 0,
            number_of_fat_sectors: 0,
            first_directory_sector_location: SectorType::EndOfChain,
            transaction_signature_number: 0,
            mini_stream_cutoff_size: crate::common::MINI_STREAM_CUTOFF_SIZE,
            first_mini_fat_sector_location: SectorType::from_raw(END_OF_CHAIN),
            number_of_mini_fat_sectors: 0,
            first_difat_sector_location: SectorType::EndOfChain,
            number_of_difat_sectors: 0,
            header_difat: [SectorType::FreeSect; DIFAT_IN_HEADER],
        }
    }
}
