use crate::common::SectorType;
use binrw::{BinRead, BinWrite};

/// A DIFAT continuation sector: `entry_count` regular FAT-sector locations
/// followed by a pointer to the next DIFAT sector (or `EndOfChain`).
///
/// https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/0afa4e43-b18f-432a-9917-4f276eca7a73
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
#[brw(import(entry_count: u16))]
pub struct Difat {
    #[br(count = entry_count)]
    pub entries: Vec<SectorType>,
    pub next: SectorType,
}
