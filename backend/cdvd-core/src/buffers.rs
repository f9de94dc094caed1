//! Parameter and result byte buffers shared by both command sets

use bincode::{Decode, Encode};
use std::ops::{Index, IndexMut};

pub const BUFFER_LEN: usize = 32;

/// Parameter bytes written by the guest ahead of a command.
///
/// Clearing only resets the length; stale bytes past the length remain readable through
/// [`ParamBuffer::get`] since handlers index the buffer without checking the count.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ParamBuffer {
    values: [u8; BUFFER_LEN],
    len: usize,
}

impl ParamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte. Returns `false` and drops the byte if the buffer is full.
    pub fn push(&mut self, value: u8) -> bool {
        if self.len == BUFFER_LEN {
            log::debug!("Parameter buffer full, dropping byte {value:02X}");
            return false;
        }

        self.values[self.len] = value;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn get(&self, i: usize) -> u8 {
        self.values.get(i).copied().unwrap_or(0)
    }

    /// `N` raw bytes starting at `start`, regardless of how many were written.
    pub fn array<const N: usize>(&self, start: usize) -> [u8; N] {
        std::array::from_fn(|i| self.get(start + i))
    }

    pub fn u16_le(&self, start: usize) -> u16 {
        u16::from_le_bytes(self.array(start))
    }

    pub fn u32_le(&self, start: usize) -> u32 {
        u32::from_le_bytes(self.array(start))
    }

    /// The bytes written since the last clear.
    pub fn as_slice(&self) -> &[u8] {
        &self.values[..self.len]
    }
}

/// Result bytes drained by the guest one at a time through the sub-command data-out register.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ResultBuffer {
    values: [u8; BUFFER_LEN],
    len: usize,
    read_pos: usize,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result length and rewind the read position. Existing contents are left in place.
    pub fn set_size(&mut self, len: usize) {
        if len > BUFFER_LEN {
            log::error!("Result size {len} exceeds buffer length, truncating");
        }

        self.len = len.min(BUFFER_LEN);
        self.read_pos = 0;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.read_pos >= self.len {
            return None;
        }

        let value = self.values[self.read_pos];
        self.read_pos += 1;
        Some(value)
    }

    pub fn fully_consumed(&self) -> bool {
        self.read_pos >= self.len
    }

    /// Copy `bytes` into the buffer starting at `start`. Bytes past the end of the buffer are
    /// dropped.
    pub fn write(&mut self, start: usize, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            if let Some(value) = self.values.get_mut(start + i) {
                *value = byte;
            }
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.values[..self.len]
    }
}

impl Index<usize> for ResultBuffer {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl IndexMut<usize> for ResultBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.values[index]
    }
}
