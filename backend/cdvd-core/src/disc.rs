//! Interface to the disc image backend

use bincode::{Decode, Encode};
use cdrom::cdtime::CdTime;
use thiserror::Error;

/// Length of the table of contents buffer returned by the backend
pub const TOC_LEN: usize = 2064;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[repr(u8)]
pub enum DiscType {
    #[default]
    NoDisc = 0x00,
    Detecting = 0x01,
    DetectingCd = 0x02,
    DetectingDvdSingle = 0x03,
    DetectingDvdDual = 0x04,
    Unknown = 0x05,
    Ps1Cd = 0x10,
    Ps1CdWithAudio = 0x11,
    Ps2Cd = 0x12,
    Ps2CdWithAudio = 0x13,
    Ps2Dvd = 0x14,
    AudioCd = 0xFD,
    DvdVideo = 0xFE,
    Illegal = 0xFF,
}

impl DiscType {
    #[must_use]
    pub fn is_cd(self) -> bool {
        matches!(
            self,
            Self::Ps1Cd | Self::Ps1CdWithAudio | Self::Ps2Cd | Self::Ps2CdWithAudio | Self::AudioCd
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[repr(u8)]
pub enum TrayStatus {
    Closed = 0,
    Open = 1,
}

/// Sector format requested from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[repr(u8)]
pub enum ReadMode {
    Raw2352 = 0,
    Mode2340 = 1,
    Mode2328 = 2,
    #[default]
    Data2048 = 3,
    Cdda2368 = 4,
}

impl ReadMode {
    /// Number of bytes the backend places in its buffer for one sector read in this mode.
    #[must_use]
    pub fn sector_len(self) -> usize {
        match self {
            Self::Raw2352 => 2352,
            Self::Mode2340 => 2340,
            Self::Mode2328 => 2328,
            Self::Data2048 => 2048,
            Self::Cdda2368 => 2368,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRange {
    pub first: u8,
    pub last: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Audio,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub track_type: TrackType,
    pub start_lsn: u32,
}

/// Sub-channel Q data for the current head position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubChannelQ {
    pub control_adr: u8,
    pub track_number: u8,
    pub index_number: u8,
    pub relative_time: CdTime,
    pub absolute_time: CdTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootTitle {
    /// Title identifier from SYSTEM.CNF, e.g. `SLUS_200.62`
    pub title_id: String,
    /// `false` if SYSTEM.CNF only has a PS1-style `BOOT` line
    pub ps2: bool,
}

#[derive(Debug, Error)]
pub enum DiscError {
    #[error("No disc in drive")]
    NoDisc,
    #[error("Error reading sector {lsn}")]
    ReadFailed { lsn: u32 },
    #[error("Track {track} does not exist")]
    InvalidTrack { track: u8 },
    #[error("Tray mechanism failure")]
    Tray,
    #[error("{0}")]
    Other(String),
}

pub type DiscResult<T> = Result<T, DiscError>;

/// A disc image source. Each call is independent; the controller keeps no backend state between
/// calls except for the buffer filled by the most recent [`DiscBackend::read_track`].
pub trait DiscBackend {
    fn disc_type(&mut self) -> DiscType;

    /// # Errors
    ///
    /// Returns an error if the disc has no track list.
    fn track_count(&mut self) -> DiscResult<TrackRange>;

    /// Track 0 describes the lead-out.
    ///
    /// # Errors
    ///
    /// Returns an error if the track does not exist.
    fn track_descriptor(&mut self, track: u8) -> DiscResult<TrackDescriptor>;

    /// # Errors
    ///
    /// Returns an error if sub-channel data is unavailable.
    fn sub_channel(&mut self, lsn: u32) -> DiscResult<SubChannelQ>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot produce a table of contents for this disc.
    fn table_of_contents(&mut self, buffer: &mut [u8; TOC_LEN]) -> DiscResult<()>;

    /// # Errors
    ///
    /// Returns an error if the tray could not be opened.
    fn tray_open(&mut self) -> DiscResult<()>;

    /// # Errors
    ///
    /// Returns an error if the tray could not be closed.
    fn tray_close(&mut self) -> DiscResult<()>;

    fn tray_status(&mut self) -> TrayStatus;

    /// Read one sector into the backend's internal buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the sector could not be read.
    fn read_track(&mut self, lsn: u32, mode: ReadMode) -> DiscResult<()>;

    /// Contents of the most recent successful [`DiscBackend::read_track`].
    fn last_buffer(&mut self) -> Option<&[u8]>;

    /// Boot executable named by the disc's SYSTEM.CNF, if any.
    fn boot_title(&mut self) -> Option<BootTitle> {
        None
    }
}
