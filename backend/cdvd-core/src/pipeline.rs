//! Sector read pipeline: seek simulation, per-sector backend reads with retries, and the hand-off
//! of each block to host memory

#[cfg(test)]
mod tests;

use crate::api::HostBus;
use crate::buffers::ParamBuffer;
use crate::disc::{DiscBackend, ReadMode, TOC_LEN};
use crate::scheduler::{
    self, AVERAGE_SEEK_CYCLES, CONTIGUOUS_SEEK_THRESHOLD, MediaKind, SPIN_UP_CYCLES,
};
use bincode::{Decode, Encode};
use cdrom::DATA_BYTES_PER_SECTOR;
use cdvd_common::num::{GetBit, U24Ext};

pub const RAW_DVD_BLOCK_SIZE: u32 = 2064;
pub const DVD_HEADER_LEN: usize = 12;
pub const DVD_EDC_LEN: usize = 4;

// Physical sector numbers on DVDs start at 0x30000
const DVD_PSN_OFFSET: u32 = 0x30000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum ReadKind {
    Data,
    Cdda,
    RawDvd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ReadProfile {
    pub block_size: u32,
    pub read_mode: ReadMode,
    pub speed: u32,
    pub media: MediaKind,
}

impl Default for ReadProfile {
    fn default() -> Self {
        Self {
            block_size: RAW_DVD_BLOCK_SIZE,
            read_mode: ReadMode::Data2048,
            speed: 4,
            media: MediaKind::Dvd,
        }
    }
}

fn speed_from_param(param: u8) -> u32 {
    match param {
        0x01 => 1,
        0x02 => 2,
        0x03 => 4,
        0x04 => 12,
        _ => 24,
    }
}

impl ReadProfile {
    #[must_use]
    pub fn for_read(kind: ReadKind, speed_param: u8, mode_param: u8) -> Self {
        match kind {
            ReadKind::Data => {
                let (block_size, read_mode) = match mode_param {
                    2 => (2340, ReadMode::Mode2340),
                    1 => (2328, ReadMode::Mode2328),
                    _ => (2048, ReadMode::Data2048),
                };
                Self {
                    block_size,
                    read_mode,
                    speed: speed_from_param(speed_param),
                    media: MediaKind::Cd,
                }
            }
            ReadKind::Cdda => {
                let (block_size, read_mode) = match mode_param {
                    1 => (2368, ReadMode::Cdda2368),
                    _ => (2352, ReadMode::Raw2352),
                };
                Self {
                    block_size,
                    read_mode,
                    speed: speed_from_param(speed_param),
                    media: MediaKind::Cd,
                }
            }
            ReadKind::RawDvd => Self::default(),
        }
    }

    #[must_use]
    pub fn read_time(&self) -> u64 {
        scheduler::read_time(self.block_size, self.speed, self.media)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub kind: ReadKind,
    pub sector: u32,
    pub count: u32,
    pub retry_limit: u16,
    pub spindle_control: u8,
    pub profile: ReadProfile,
}

impl ReadRequest {
    /// Decode the 11 read parameter bytes: start sector, sector count, retry count, spindle
    /// control (which also selects the speed), and read mode.
    #[must_use]
    pub fn from_params(kind: ReadKind, params: &ParamBuffer) -> Self {
        let retry_limit = match params.get(8) {
            0 => 0x100,
            retries => retries.into(),
        };
        let spindle_control = params.get(9);

        Self {
            kind,
            sector: params.u32_le(0),
            count: params.u32_le(4),
            retry_limit,
            spindle_control,
            profile: ReadProfile::for_read(kind, spindle_control, params.get(10)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum DualLayerKind {
    #[default]
    Single,
    Ptp,
    Otp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DualLayerInfo {
    pub kind: DualLayerKind,
    pub layer1_start: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemappedSector {
    pub layer: u8,
    pub lsn: u32,
}

fn toc_layer_start(toc: &[u8; TOC_LEN], offset: usize) -> u32 {
    u32::from_be_bytes_24([toc[offset], toc[offset + 1], toc[offset + 2]])
        .wrapping_sub(DVD_PSN_OFFSET)
        .wrapping_add(1)
}

impl DualLayerInfo {
    #[must_use]
    pub fn from_toc(toc: &[u8; TOC_LEN]) -> Self {
        let flags = toc[14];
        if flags & 0x60 == 0 {
            return Self { kind: DualLayerKind::Single, layer1_start: toc_layer_start(toc, 21) };
        }

        if flags.bit(4) {
            Self { kind: DualLayerKind::Otp, layer1_start: toc_layer_start(toc, 25) }
        } else {
            Self { kind: DualLayerKind::Ptp, layer1_start: toc_layer_start(toc, 21) }
        }
    }

    /// Read layer information from the disc's TOC. A disc without a readable TOC is treated as
    /// single layer.
    pub fn query<D: DiscBackend>(disc: &mut D) -> Self {
        let mut toc = [0; TOC_LEN];
        match disc.table_of_contents(&mut toc) {
            Ok(()) => Self::from_toc(&toc),
            Err(err) => {
                log::debug!("Unable to read TOC for layer info, assuming single layer: {err}");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn remap(&self, sector: u32) -> RemappedSector {
        match self.kind {
            DualLayerKind::Ptp if sector >= self.layer1_start => RemappedSector {
                layer: 1,
                lsn: sector.wrapping_sub(self.layer1_start).wrapping_add(DVD_PSN_OFFSET),
            },
            // Every layer 1 sector on an OTP disc reports the same address
            DualLayerKind::Otp if sector >= self.layer1_start => RemappedSector {
                layer: 1,
                lsn: !(self.layer1_start.wrapping_add(DVD_PSN_OFFSET).wrapping_sub(1)),
            },
            _ => RemappedSector { layer: 0, lsn: sector.wrapping_add(DVD_PSN_OFFSET) },
        }
    }
}

/// Decrypt setting register: bit 0 enables XOR with key byte 4, bit 1 enables rotation, and
/// bits 4-6 hold the rotate amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct DecryptSettings(pub u8);

impl DecryptSettings {
    #[must_use]
    pub fn is_active(self) -> bool {
        self.0 != 0
    }

    pub fn apply(self, key_byte: u8, bytes: &mut [u8]) {
        let xor = self.0.bit(0);
        let rotate = self.0.bit(1);
        let shift = u32::from(self.0.bits(4..=6));

        for byte in bytes {
            if xor {
                *byte ^= key_byte;
            }
            if rotate {
                *byte = byte.rotate_right(shift);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum ReadState {
    #[default]
    Idle,
    Seeking,
    ReadPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// Seek finished and the first sector read was issued; next event after the given delay
    SeekComplete(u64),
    Continue(u64),
    Complete,
    Failed,
    Idle,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct SectorReader {
    state: ReadState,
    kind: Option<ReadKind>,
    sector: u32,
    seek_target: u32,
    spinning: bool,
    sectors_remaining: u32,
    retry_count: u16,
    retry_limit: u16,
    profile: ReadProfile,
    read_failed: bool,
    dual_layer: DualLayerInfo,
}

impl SectorReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    #[must_use]
    pub fn state(&self) -> ReadState {
        self.state
    }

    #[must_use]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    #[cfg(test)]
    #[must_use]
    pub fn sectors_remaining(&self) -> u32 {
        self.sectors_remaining
    }

    #[cfg(test)]
    #[must_use]
    pub fn retry_count(&self) -> u16 {
        self.retry_count
    }

    #[cfg(test)]
    #[must_use]
    pub fn profile(&self) -> ReadProfile {
        self.profile
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_spinning(&self) -> bool {
        self.spinning
    }

    // Returns the seek cost in cycles
    fn start_seek(&mut self, target: u32) -> u64 {
        self.seek_target = target;
        let delta = self.sector.abs_diff(target);

        if !self.spinning {
            log::trace!("Spinning up and seeking to sector {target}");
            self.spinning = true;
            SPIN_UP_CYCLES
        } else if delta >= CONTIGUOUS_SEEK_THRESHOLD {
            log::trace!("Seeking from sector {} to {target} (delta={delta})", self.sector);
            AVERAGE_SEEK_CYCLES
        } else if delta == 0 {
            self.profile.read_time()
        } else {
            log::trace!("Contiguous seek from sector {} to {target}", self.sector);
            u64::from(delta) * self.profile.read_time()
        }
    }

    /// Seek without reading, using DVD timing with the current block size and speed. Returns the
    /// number of cycles until the seek completes.
    pub fn begin_positioning(&mut self, target: u32) -> u64 {
        self.state = ReadState::Idle;
        self.profile.media = MediaKind::Dvd;
        self.start_seek(target)
    }

    pub fn complete_positioning(&mut self) {
        self.spinning = true;
        self.sector = self.seek_target;
    }

    /// Start a multi-sector read. Returns the number of cycles until the first event.
    pub fn start_read<D: DiscBackend>(&mut self, request: ReadRequest, disc: &mut D) -> u64 {
        log::debug!(
            "{:?} read: sector={}, count={}, retries={}, spindle={:02X}, block size={}, speed={}x",
            request.kind,
            request.sector,
            request.count,
            request.retry_limit,
            request.spindle_control,
            request.profile.block_size,
            request.profile.speed
        );

        self.kind = Some(request.kind);
        self.sectors_remaining = request.count;
        self.retry_count = 0;
        self.retry_limit = request.retry_limit;
        self.profile = request.profile;
        self.dual_layer = match request.kind {
            ReadKind::RawDvd => DualLayerInfo::query(disc),
            ReadKind::Data | ReadKind::Cdda => DualLayerInfo::default(),
        };

        let contiguous = self.spinning && self.sector == request.sector;
        let delay = self.start_seek(request.sector);

        if contiguous {
            self.state = ReadState::ReadPending;
            self.issue_read(disc);
        } else {
            self.state = ReadState::Seeking;
        }

        delay
    }

    fn issue_read<D: DiscBackend>(&mut self, disc: &mut D) {
        self.read_failed = match disc.read_track(self.sector, self.profile.read_mode) {
            Ok(()) => false,
            Err(err) => {
                log::debug!("Backend read of sector {} failed: {err}", self.sector);
                true
            }
        };
    }

    /// Handle a fired read event.
    pub fn on_event<D: DiscBackend, H: HostBus>(
        &mut self,
        disc: &mut D,
        host: &mut H,
        decrypt: DecryptSettings,
        key_byte: u8,
    ) -> ReadProgress {
        match self.state {
            ReadState::Idle => {
                log::warn!("Read event fired with no active read");
                ReadProgress::Idle
            }
            ReadState::Seeking => {
                self.spinning = true;
                self.sector = self.seek_target;
                self.retry_count = 0;
                self.state = ReadState::ReadPending;
                self.issue_read(disc);

                ReadProgress::SeekComplete(self.profile.read_time())
            }
            ReadState::ReadPending => self.finish_sector(disc, host, decrypt, key_byte),
        }
    }

    fn finish_sector<D: DiscBackend, H: HostBus>(
        &mut self,
        disc: &mut D,
        host: &mut H,
        decrypt: DecryptSettings,
        key_byte: u8,
    ) -> ReadProgress {
        if self.read_failed {
            if self.retry_count < self.retry_limit {
                self.retry_count += 1;
                log::debug!(
                    "Retrying read of sector {} (attempt {} of {})",
                    self.sector,
                    self.retry_count,
                    self.retry_limit
                );
                self.issue_read(disc);
                return ReadProgress::Continue(self.profile.read_time());
            }

            log::error!(
                "Read error at sector {:08X} after {} retries",
                self.sector,
                self.retry_count
            );
            self.state = ReadState::Idle;
            self.sectors_remaining = 0;
            return ReadProgress::Failed;
        }

        let target = host.dma_target();
        if target.remaining_bytes < self.profile.block_size {
            log::trace!(
                "DMA target has {} bytes remaining, less than block size {}; delaying transfer",
                target.remaining_bytes,
                self.profile.block_size
            );
            return ReadProgress::Continue((self.profile.read_time() / 4).max(1));
        }

        let Some(mut block) = self.build_block(disc) else {
            log::error!("Backend returned no data for sector {}", self.sector);
            self.state = ReadState::Idle;
            self.sectors_remaining = 0;
            return ReadProgress::Failed;
        };

        if decrypt.is_active() {
            decrypt.apply(key_byte, &mut block);
        }
        host.dma_write(target.address, &block);

        self.sector = self.sector.wrapping_add(1);
        self.sectors_remaining = self.sectors_remaining.saturating_sub(1);

        if self.sectors_remaining == 0 {
            self.state = ReadState::Idle;
            return ReadProgress::Complete;
        }

        self.retry_count = 0;
        self.issue_read(disc);
        ReadProgress::Continue(self.profile.read_time())
    }

    fn build_block<D: DiscBackend>(&self, disc: &mut D) -> Option<Vec<u8>> {
        let buffer = disc.last_buffer()?;
        let block_size = self.profile.block_size as usize;

        if self.kind == Some(ReadKind::RawDvd) {
            let remapped = self.dual_layer.remap(self.sector);

            let mut block = vec![0; block_size];
            block[0] = 0x20 | remapped.layer;
            block[1] = remapped.lsn.high_byte();
            block[2] = remapped.lsn.mid_byte();
            block[3] = remapped.lsn.low_byte();

            let payload_len = buffer.len().min(DATA_BYTES_PER_SECTOR);
            block[DVD_HEADER_LEN..DVD_HEADER_LEN + payload_len]
                .copy_from_slice(&buffer[..payload_len]);
            return Some(block);
        }

        let mut block = buffer[..buffer.len().min(block_size)].to_vec();
        if block.len() < block_size {
            log::warn!(
                "Backend sector buffer is {} bytes, expected {block_size}; padding with zeros",
                block.len()
            );
            block.resize(block_size, 0);
        }
        Some(block)
    }

    /// Drop any in-progress read, leaving the head where it is.
    pub fn abort(&mut self) {
        if self.state != ReadState::Idle {
            log::debug!(
                "Aborting read at sector {} with {} sectors remaining",
                self.sector,
                self.sectors_remaining
            );
        }

        self.state = ReadState::Idle;
        self.sectors_remaining = 0;
    }

    pub fn stop(&mut self) {
        self.abort();
        self.spinning = false;
        self.sector = 0;
    }
}
