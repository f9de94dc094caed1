pub mod cdtime;
pub mod iso;

use std::io;
use thiserror::Error;

/// User data bytes in a Mode 1 / Mode 2 Form 1 sector, and in a DVD sector.
pub const DATA_BYTES_PER_SECTOR: usize = 2048;

#[derive(Debug, Error)]
pub enum CdRomError {
    #[error("Error opening disc image '{path}': {source}")]
    ImageOpen {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error reading from disc: {0}")]
    DiscReadIo(#[source] io::Error),
    #[error("Sector {sector} is past the end of the disc ({sector_count} sectors)")]
    SectorOutOfRange { sector: u32, sector_count: u32 },
    #[error("Disc image does not contain an ISO 9660 primary volume descriptor")]
    MissingVolumeDescriptor,
    #[error("Invalid ISO 9660 directory record at sector {sector}")]
    InvalidDirectoryRecord { sector: u32 },
}

pub type CdRomResult<T> = Result<T, CdRomError>;
