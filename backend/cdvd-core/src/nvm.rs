//! Versioned layout over the console's persistent NVM blob, plus the indexed config block session


use bincode::{Decode, Encode};
use cdvd_common::frontend::SaveWriter;
use thiserror::Error;

pub const NVM_LEN: usize = 1024;
pub const NVM_EXTENSION: &str = "nvm";

pub const MECHA_VERSION_LEN: usize = 4;
pub const MECHA_VERSION_EXTENSION: &str = "mec";
pub const DEFAULT_MECHA_VERSION: [u8; MECHA_VERSION_LEN] = [0x03, 0x06, 0x02, 0x00];

/// Length of the console ID, i.Link ID, model number, region parameter, and MAC fields
pub const NVM_FIELD_LEN: usize = 8;

pub const CONFIG_BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct NvmLayout {
    pub min_bios_version: u32,
    pub config0: u16,
    pub config1: u16,
    pub config2: u16,
    pub console_id: u16,
    pub ilink_id: u16,
    pub model_number: u16,
    pub region_params: u16,
    pub mac: u16,
}

pub const NVM_LAYOUTS: [NvmLayout; 2] = [
    NvmLayout {
        min_bios_version: 0x000,
        config0: 0x280,
        config1: 0x300,
        config2: 0x200,
        console_id: 0x1C8,
        ilink_id: 0x1C0,
        model_number: 0x1A0,
        region_params: 0x180,
        mac: 0x198,
    },
    NvmLayout {
        min_bios_version: 0x146,
        config0: 0x270,
        config1: 0x2B0,
        config2: 0x200,
        console_id: 0x1C8,
        ilink_id: 0x1E0,
        model_number: 0x1B0,
        region_params: 0x180,
        mac: 0x198,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvmField {
    Config0,
    Config1,
    Config2,
    ConsoleId,
    ILinkId,
    ModelNumber,
    RegionParams,
    Mac,
}

impl NvmLayout {
    #[must_use]
    pub fn offset(&self, field: NvmField) -> usize {
        let offset = match field {
            NvmField::Config0 => self.config0,
            NvmField::Config1 => self.config1,
            NvmField::Config2 => self.config2,
            NvmField::ConsoleId => self.console_id,
            NvmField::ILinkId => self.ilink_id,
            NvmField::ModelNumber => self.model_number,
            NvmField::RegionParams => self.region_params,
            NvmField::Mac => self.mac,
        };
        offset.into()
    }
}

/// Pick the last layout in `layouts` whose minimum BIOS version does not exceed `bios_version`.
#[must_use]
pub fn select_layout_from(layouts: &[NvmLayout], bios_version: u32) -> Option<&NvmLayout> {
    layouts.iter().rev().find(|layout| layout.min_bios_version <= bios_version)
}

#[must_use]
pub fn select_layout(bios_version: u32) -> Option<&'static NvmLayout> {
    select_layout_from(&NVM_LAYOUTS, bios_version)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NvmError {
    #[error("No NVM layout for BIOS version {bios_version:04X}")]
    NoLayout { bios_version: u32 },
    #[error("NVM access at offset {offset:03X} with length {len} is past the end of the blob")]
    OutOfRange { offset: usize, len: usize },
}

pub type NvmResult<T> = Result<T, NvmError>;

#[derive(Debug, Error)]
pub enum NvmLoadError<SErr> {
    #[error("Unable to create NVM file: {0}")]
    NvmCreate(SErr),
    #[error("Unable to create mecha version file: {0}")]
    MechaVersionCreate(SErr),
}

/// In-memory copy of the NVM and mecha version blobs. Writes mark the store dirty; the controller
/// persists dirty contents through the save writer.
#[derive(Debug, Clone, Encode, Decode)]
pub struct NvmStore {
    blob: Vec<u8>,
    mecha_version: [u8; MECHA_VERSION_LEN],
    bios_version: u32,
    layout: Option<NvmLayout>,
    dirty: bool,
}

impl NvmStore {
    #[must_use]
    pub fn new(
        mut blob: Vec<u8>,
        mecha_version: [u8; MECHA_VERSION_LEN],
        bios_version: u32,
        layout: Option<NvmLayout>,
    ) -> Self {
        if blob.len() < NVM_LEN {
            log::warn!("NVM blob is only {} bytes, padding to {NVM_LEN}", blob.len());
            blob.resize(NVM_LEN, 0);
        }

        Self { blob, mecha_version, bios_version, layout, dirty: false }
    }

    /// Load both blobs through the save writer, creating them if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a missing blob could not be created.
    pub fn load<S: SaveWriter>(
        bios_version: u32,
        save_writer: &mut S,
    ) -> Result<Self, NvmLoadError<S::Err>> {
        let blob = match save_writer.load_bytes(NVM_EXTENSION) {
            Ok(blob) => blob,
            Err(_) => {
                log::info!("NVM file not found, creating blank file");
                let blob = vec![0; NVM_LEN];
                save_writer
                    .persist_bytes(NVM_EXTENSION, &blob)
                    .map_err(NvmLoadError::NvmCreate)?;
                blob
            }
        };

        let mecha_version = match save_writer.load_bytes(MECHA_VERSION_EXTENSION) {
            Ok(bytes) if bytes.len() >= MECHA_VERSION_LEN => {
                std::array::from_fn(|i| bytes[i])
            }
            Ok(bytes) => {
                log::warn!("Mecha version file is only {} bytes, using default", bytes.len());
                DEFAULT_MECHA_VERSION
            }
            Err(_) => {
                log::info!("Mecha version file not found, creating default file");
                save_writer
                    .persist_bytes(MECHA_VERSION_EXTENSION, &DEFAULT_MECHA_VERSION)
                    .map_err(NvmLoadError::MechaVersionCreate)?;
                DEFAULT_MECHA_VERSION
            }
        };

        let layout = select_layout(bios_version).copied();
        if layout.is_none() {
            log::error!("No NVM layout matches BIOS version {bios_version:04X}");
        }

        Ok(Self::new(blob, mecha_version, bios_version, layout))
    }

    #[must_use]
    pub fn mecha_version(&self) -> [u8; MECHA_VERSION_LEN] {
        self.mecha_version
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the NVM blob if it has changed since the last persist.
    ///
    /// # Errors
    ///
    /// Propagates any error from the save writer. The store stays dirty on failure.
    pub fn persist_if_dirty<S: SaveWriter>(&mut self, save_writer: &mut S) -> Result<(), S::Err> {
        if !self.dirty {
            return Ok(());
        }

        save_writer.persist_bytes(NVM_EXTENSION, &self.blob)?;
        self.dirty = false;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the range extends past the end of the blob.
    pub fn read_raw(&self, offset: usize, out: &mut [u8]) -> NvmResult<()> {
        let range = self.checked_range(offset, out.len())?;
        out.copy_from_slice(&self.blob[range]);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the range extends past the end of the blob.
    pub fn write_raw(&mut self, offset: usize, data: &[u8]) -> NvmResult<()> {
        let range = self.checked_range(offset, data.len())?;
        self.blob[range].copy_from_slice(data);
        self.dirty = true;
        Ok(())
    }

    /// Read `out.len()` bytes starting `offset` bytes into `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if no layout matches the BIOS version or the range is out of bounds.
    pub fn read_field(&self, field: NvmField, offset: usize, out: &mut [u8]) -> NvmResult<()> {
        let base = self.field_offset(field)?;
        self.read_raw(base + offset, out)
    }

    /// Write `data` starting `offset` bytes into `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if no layout matches the BIOS version or the range is out of bounds.
    pub fn write_field(&mut self, field: NvmField, offset: usize, data: &[u8]) -> NvmResult<()> {
        let base = self.field_offset(field)?;
        log::trace!("NVM write to {field:?}+{offset:X}: {data:02X?}");
        self.write_raw(base + offset, data)
    }

    fn field_offset(&self, field: NvmField) -> NvmResult<usize> {
        self.layout
            .map(|layout| layout.offset(field))
            .ok_or(NvmError::NoLayout { bios_version: self.bios_version })
    }

    fn checked_range(&self, offset: usize, len: usize) -> NvmResult<std::ops::Range<usize>> {
        let end = offset + len;
        if end > self.blob.len() {
            return Err(NvmError::OutOfRange { offset, len });
        }
        Ok(offset..end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum ConfigMode {
    #[default]
    Read,
    Write,
    /// Any mode byte other than 0 or 1; neither reads nor writes are allowed
    Invalid(u8),
}

impl ConfigMode {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Read,
            1 => Self::Write,
            _ => Self::Invalid(byte),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigSessionError {
    #[error("Config session is open in mode {0:?}")]
    WrongMode(ConfigMode),
    #[error("Block {index} is past the session's block count {count}")]
    PastBlockCount { index: u8, count: u8 },
    #[error("Block {index} is past the maximum of {max} blocks for selector {selector}")]
    PastSelectorBound { selector: u8, index: u8, max: u8 },
    #[error(transparent)]
    Nvm(#[from] NvmError),
}

/// Indexed access window over one of the three config block regions.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ConfigSession {
    mode: ConfigMode,
    selector: u8,
    block_index: u8,
    block_count: u8,
}

impl ConfigSession {
    pub fn open(&mut self, mode: u8, selector: u8, block_count: u8) {
        log::debug!(
            "Opening config session: mode={mode}, selector={selector}, blocks={block_count}"
        );

        *self = Self { mode: ConfigMode::from_byte(mode), selector, block_index: 0, block_count };
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn block_index(&self) -> u8 {
        self.block_index
    }

    fn region(&self) -> (NvmField, u8) {
        match self.selector {
            0 => (NvmField::Config0, 4),
            2 => (NvmField::Config2, 7),
            _ => (NvmField::Config1, 2),
        }
    }

    fn check_access(&self, expected_mode: ConfigMode) -> Result<NvmField, ConfigSessionError> {
        if self.mode != expected_mode {
            return Err(ConfigSessionError::WrongMode(self.mode));
        }

        if self.block_index >= self.block_count {
            return Err(ConfigSessionError::PastBlockCount {
                index: self.block_index,
                count: self.block_count,
            });
        }

        let (field, max) = self.region();
        if self.block_index >= max {
            return Err(ConfigSessionError::PastSelectorBound {
                selector: self.selector,
                index: self.block_index,
                max,
            });
        }

        Ok(field)
    }

    /// Read the next 16-byte block and advance the block index.
    ///
    /// # Errors
    ///
    /// Returns an error without advancing if the session is not in read mode, the index has
    /// reached the block count or the selector's maximum, or the NVM read fails.
    pub fn read_block(
        &mut self,
        nvm: &NvmStore,
        out: &mut [u8; CONFIG_BLOCK_LEN],
    ) -> Result<(), ConfigSessionError> {
        let field = self.check_access(ConfigMode::Read)?;

        let offset = usize::from(self.block_index) * CONFIG_BLOCK_LEN;
        nvm.read_field(field, offset, out)?;
        self.block_index += 1;

        Ok(())
    }

    /// Write the next 16-byte block and advance the block index.
    ///
    /// # Errors
    ///
    /// Returns an error without advancing if the session is not in write mode, the index has
    /// reached the block count or the selector's maximum, or the NVM write fails.
    pub fn write_block(
        &mut self,
        nvm: &mut NvmStore,
        data: &[u8; CONFIG_BLOCK_LEN],
    ) -> Result<(), ConfigSessionError> {
        let field = self.check_access(ConfigMode::Write)?;

        let offset = usize::from(self.block_index) * CONFIG_BLOCK_LEN;
        nvm.write_field(field, offset, data)?;
        self.block_index += 1;

        Ok(())
    }
}
