//! Code for reading flat ISO 9660 images with 2048-byte sectors


use crate::{CdRomError, CdRomResult, DATA_BYTES_PER_SECTOR};
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;

const PRIMARY_VOLUME_DESCRIPTOR_SECTOR: u32 = 16;
const ROOT_DIRECTORY_RECORD_OFFSET: usize = 156;
const SYSTEM_CNF_NAME: &str = "SYSTEM.CNF;1";

// Matches both `BOOT2 = cdrom0:\SLUS_200.62;1` (PS2) and `BOOT = cdrom:\SCUS_944.26;1` (PS1)
static BOOT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*BOOT2?\s*=\s*cdrom0?:\\?([A-Za-z]{4}_[0-9]{3}\.[0-9]{2})")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootExecutable {
    /// Title identifier, e.g. `SLUS_200.62`
    pub title_id: String,
    /// Whether SYSTEM.CNF used the PS2 `BOOT2` key rather than the PS1 `BOOT` key
    pub ps2: bool,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryRecord {
    extent: u32,
    data_len: u32,
}

#[derive(Debug)]
pub struct IsoImage<F: Read + Seek> {
    file: BufReader<F>,
    sector_count: u32,
}

impl IsoImage<File> {
    /// Open an ISO image from the filesystem.
    ///
    /// # Errors
    ///
    /// Propagates any I/O errors encountered while opening the file or reading its metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> CdRomResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CdRomError::ImageOpen {
            path: path.display().to_string(),
            source,
        })?;

        Self::new(file)
    }
}

impl<F: Read + Seek> IsoImage<F> {
    /// Wrap an already-open image.
    ///
    /// # Errors
    ///
    /// Propagates any I/O errors encountered while determining the image length.
    pub fn new(mut file: F) -> CdRomResult<Self> {
        let len = file.seek(SeekFrom::End(0)).map_err(CdRomError::DiscReadIo)?;
        let sector_count = (len / DATA_BYTES_PER_SECTOR as u64) as u32;

        log::debug!("Opened ISO image with {sector_count} sectors");

        Ok(Self { file: BufReader::new(file), sector_count })
    }

    #[must_use]
    pub fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Read the 2048 user data bytes of the given logical sector.
    ///
    /// # Errors
    ///
    /// Returns an error if the sector is past the end of the image or if the read fails.
    pub fn read_sector(
        &mut self,
        sector: u32,
        out: &mut [u8; DATA_BYTES_PER_SECTOR],
    ) -> CdRomResult<()> {
        if sector >= self.sector_count {
            return Err(CdRomError::SectorOutOfRange { sector, sector_count: self.sector_count });
        }

        let position = u64::from(sector) * DATA_BYTES_PER_SECTOR as u64;
        self.file.seek(SeekFrom::Start(position)).map_err(CdRomError::DiscReadIo)?;
        self.file.read_exact(out).map_err(CdRomError::DiscReadIo)?;

        Ok(())
    }

    /// Locate SYSTEM.CNF in the root directory and parse the boot executable's title identifier.
    ///
    /// Returns `Ok(None)` if the image is a valid ISO 9660 filesystem without a recognizable
    /// boot line.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem structures are missing or malformed.
    pub fn boot_executable(&mut self) -> CdRomResult<Option<BootExecutable>> {
        let mut sector = [0; DATA_BYTES_PER_SECTOR];
        self.read_sector(PRIMARY_VOLUME_DESCRIPTOR_SECTOR, &mut sector)?;

        if sector[0] != 1 || &sector[1..6] != b"CD001" {
            return Err(CdRomError::MissingVolumeDescriptor);
        }

        let root = parse_directory_record(&sector[ROOT_DIRECTORY_RECORD_OFFSET..])
            .ok_or(CdRomError::InvalidDirectoryRecord { sector: PRIMARY_VOLUME_DESCRIPTOR_SECTOR })?;

        let Some(system_cnf) = self.find_in_directory(root, SYSTEM_CNF_NAME)? else {
            log::debug!("No {SYSTEM_CNF_NAME} in root directory");
            return Ok(None);
        };

        let contents = self.read_file(system_cnf)?;
        let contents = String::from_utf8_lossy(&contents);

        Ok(parse_boot_line(&contents))
    }

    fn find_in_directory(
        &mut self,
        directory: DirectoryRecord,
        name: &str,
    ) -> CdRomResult<Option<DirectoryRecord>> {
        let sector_len = directory.data_len.div_ceil(DATA_BYTES_PER_SECTOR as u32);

        let mut sector = [0; DATA_BYTES_PER_SECTOR];
        for i in 0..sector_len {
            let sector_number = directory.extent + i;
            self.read_sector(sector_number, &mut sector)?;

            let mut offset = 0;
            while offset < DATA_BYTES_PER_SECTOR {
                let record_len = usize::from(sector[offset]);
                if record_len == 0 {
                    // Records never cross sector boundaries; the rest of this sector is padding
                    break;
                }

                let record = &sector[offset..];
                if record_len < 34 || offset + record_len > DATA_BYTES_PER_SECTOR {
                    return Err(CdRomError::InvalidDirectoryRecord { sector: sector_number });
                }

                let name_len = usize::from(record[32]);
                let Some(record_name) = record.get(33..33 + name_len) else {
                    return Err(CdRomError::InvalidDirectoryRecord { sector: sector_number });
                };

                if record_name.eq_ignore_ascii_case(name.as_bytes()) {
                    return Ok(parse_directory_record(record));
                }

                offset += record_len;
            }
        }

        Ok(None)
    }

    fn read_file(&mut self, record: DirectoryRecord) -> CdRomResult<Vec<u8>> {
        let mut contents = Vec::with_capacity(record.data_len as usize);

        let mut sector = [0; DATA_BYTES_PER_SECTOR];
        let mut remaining = record.data_len as usize;
        let mut sector_number = record.extent;
        while remaining != 0 {
            self.read_sector(sector_number, &mut sector)?;

            let len = remaining.min(DATA_BYTES_PER_SECTOR);
            contents.extend_from_slice(&sector[..len]);

            remaining -= len;
            sector_number += 1;
        }

        Ok(contents)
    }
}

fn parse_directory_record(record: &[u8]) -> Option<DirectoryRecord> {
    let extent = u32::from_le_bytes(record.get(2..6)?.try_into().ok()?);
    let data_len = u32::from_le_bytes(record.get(10..14)?.try_into().ok()?);
    Some(DirectoryRecord { extent, data_len })
}

fn parse_boot_line(system_cnf: &str) -> Option<BootExecutable> {
    let captures = BOOT_LINE_RE.captures(system_cnf)?;
    let ps2 = captures.get(0).is_some_and(|line| line.as_str().contains("BOOT2"));
    let title_id = captures.get(1)?.as_str().to_ascii_uppercase();

    Some(BootExecutable { title_id, ps2 })
}
