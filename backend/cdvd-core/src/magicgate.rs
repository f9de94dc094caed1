//! MagicGate accumulation buffer: encrypted ELF headers are streamed in through sub-commands, and
//! the BIT (block information table) and content keys are pulled back out of the header

#[cfg(test)]
mod tests;

use bincode::{Decode, Encode};
use thiserror::Error;

pub const MG_BUFFER_LEN: usize = 64 * 1024;
pub const MG_KEY_LEN: usize = 16;
pub const MG_CHUNK_LEN: usize = 16;

const HEADER_MIN_LEN: usize = 0x20;

pub const ZONE_NAMES: [&str; 8] =
    ["Japan", "USA", "Europe", "Oceania", "Asia", "Russia", "China", "Mexico"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum MgDataKind {
    #[default]
    Data,
    Header,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MagicGateError {
    #[error("Appending {len} bytes to a buffer of {size} bytes exceeds capacity {capacity}")]
    Capacity { size: usize, len: usize, capacity: usize },
    #[error("Malformed MagicGate header; make sure the file is already decrypted")]
    NotDecrypted,
    #[error("Operation requires header data but the buffer holds {0:?} data")]
    WrongKind(MgDataKind),
    #[error("Declared data out length {declared} does not match buffered size {size}")]
    LengthMismatch { declared: usize, size: usize },
}

pub type MagicGateResult<T> = Result<T, MagicGateError>;

#[derive(Debug, Clone, Encode, Decode)]
pub struct MagicGate {
    buffer: Vec<u8>,
    size: usize,
    capacity: usize,
    kind: MgDataKind,
    bit_key: [u8; MG_KEY_LEN],
    content_key: [u8; MG_KEY_LEN],
}

impl Default for MagicGate {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
}

// Walks past the per-zone section entries and the optional padding to locate the BIT
fn bit_offset(buffer: &[u8]) -> Option<usize> {
    let section_count: usize = read_u16_le(buffer, 0x1A).into();
    let flags = read_u16_le(buffer, 0x18);

    let mut offset = 0x20 + 0x10 * section_count;
    if flags & 1 != 0 {
        offset += usize::from(*buffer.get(offset)?);
    }
    if flags & 0xF000 == 0 {
        offset += 8;
    }

    Some(offset + 0x20)
}

impl MagicGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: vec![0; MG_BUFFER_LEN],
            size: 0,
            capacity: 0,
            kind: MgDataKind::default(),
            bit_key: [0; MG_KEY_LEN],
            content_key: [0; MG_KEY_LEN],
        }
    }

    #[cfg(test)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn kind(&self) -> MgDataKind {
        self.kind
    }

    #[must_use]
    pub fn bit_key(&self) -> &[u8; MG_KEY_LEN] {
        &self.bit_key
    }

    #[must_use]
    pub fn content_key(&self) -> &[u8; MG_KEY_LEN] {
        &self.content_key
    }

    pub fn select_data(&mut self) {
        self.kind = MgDataKind::Data;
    }

    pub fn begin_header(&mut self, capacity: u16) {
        self.size = 0;
        self.capacity = capacity.into();
        self.kind = MgDataKind::Header;
    }

    pub fn begin_data(&mut self, capacity: u16) {
        self.size = 0;
        self.capacity = capacity.into();
        self.kind = MgDataKind::Data;
    }

    /// # Errors
    ///
    /// Returns a capacity error and leaves the buffer untouched if the bytes do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> MagicGateResult<()> {
        let end = self.size + bytes.len();
        if end > self.capacity || end > MG_BUFFER_LEN {
            return Err(MagicGateError::Capacity {
                size: self.size,
                len: bytes.len(),
                capacity: self.capacity,
            });
        }

        self.buffer[self.size..end].copy_from_slice(bytes);
        self.size = end;

        Ok(())
    }

    /// Pop up to 16 bytes off the front of the buffer, returning how many were written to `out`.
    pub fn read_data(&mut self, out: &mut [u8; MG_CHUNK_LEN]) -> usize {
        let len = self.size.min(MG_CHUNK_LEN);
        out[..len].copy_from_slice(&self.buffer[..len]);

        self.buffer.copy_within(len..self.size, 0);
        self.size -= len;

        len
    }

    /// Validate a fully-written header and extract the BIT and content keys. Data buffers are
    /// accepted without any checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the header's size fields are inconsistent. Keys are left unchanged.
    pub fn finalize_header(&mut self) -> MagicGateResult<()> {
        if self.kind != MgDataKind::Header {
            return Ok(());
        }

        let header_size: usize = read_u16_le(&self.buffer, 0x14).into();
        if self.size != self.capacity || self.size < HEADER_MIN_LEN || self.size != header_size {
            return Err(MagicGateError::NotDecrypted);
        }

        self.log_header();

        let bit_offset = bit_offset(&self.buffer).ok_or(MagicGateError::NotDecrypted)?;
        let bit_header =
            self.buffer.get(bit_offset..bit_offset + 8).ok_or(MagicGateError::NotDecrypted)?;
        let block_count: usize = bit_header[4].into();
        if bit_header[5..8] != [0, 0, 0] || block_count * 16 + bit_offset + 8 + 16 != header_size {
            return Err(MagicGateError::NotDecrypted);
        }

        let keys = &self.buffer[bit_offset - 0x20..bit_offset];
        self.bit_key.copy_from_slice(&keys[..MG_KEY_LEN]);
        self.content_key.copy_from_slice(&keys[MG_KEY_LEN..]);

        Ok(())
    }

    fn log_header(&self) {
        let zones = self.buffer[0x1C];
        let zone_names: Vec<_> = ZONE_NAMES
            .iter()
            .enumerate()
            .filter_map(|(i, &name)| (zones & (1 << i) != 0).then_some(name))
            .collect();

        let elf_size = u32::from_le_bytes(std::array::from_fn(|i| self.buffer[0x10 + i]));
        log::debug!(
            "MagicGate header: ELF size={elf_size:X}, header size={:X}, flags={:04X}, sections={}, zones={zone_names:?}",
            read_u16_le(&self.buffer, 0x14),
            read_u16_le(&self.buffer, 0x18),
            read_u16_le(&self.buffer, 0x1A)
        );
    }

    /// Move the BIT to the front of the buffer so it can be drained with [`Self::read_data`], and
    /// return its length. Further appends are rejected until the next begin.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer does not hold header data or the BIT lies outside it.
    pub fn read_bit_length(&mut self) -> MagicGateResult<u16> {
        if self.kind != MgDataKind::Header {
            return Err(MagicGateError::WrongKind(self.kind));
        }

        let bit_offset = bit_offset(&self.buffer).ok_or(MagicGateError::NotDecrypted)?;
        let block_count: usize =
            (*self.buffer.get(bit_offset + 4).ok_or(MagicGateError::NotDecrypted)?).into();
        let bit_len = 8 + 16 * block_count;
        if bit_offset + bit_len > MG_BUFFER_LEN {
            return Err(MagicGateError::NotDecrypted);
        }

        self.buffer.copy_within(bit_offset..bit_offset + bit_len, 0);
        self.capacity = 0;
        self.size = bit_len;

        log::debug!("MagicGate BIT count={block_count}");

        // At most 8 + 16 * 255
        Ok(bit_len as u16)
    }

    /// # Errors
    ///
    /// Returns an error if the buffer holds header data or the length does not match its size.
    pub fn set_data_out_length(&mut self, length: u16) -> MagicGateResult<()> {
        if self.kind != MgDataKind::Data {
            return Err(MagicGateError::WrongKind(self.kind));
        }

        let declared = length.into();
        if declared != self.size {
            return Err(MagicGateError::LengthMismatch { declared, size: self.size });
        }

        self.capacity = 0;
        Ok(())
    }
}
