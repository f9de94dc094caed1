//! Minute/second/frame disc addressing

use bincode::{Decode, Encode};
use cdvd_common::num::binary_to_bcd;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Encode, Decode)]
pub struct CdTime {
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl CdTime {
    pub const ZERO: Self = Self { minutes: 0, seconds: 0, frames: 0 };

    pub const SECONDS_PER_MINUTE: u8 = 60;
    pub const FRAMES_PER_SECOND: u8 = 75;

    /// Logical sector 0 sits after a 2-second lead-in
    pub const LEAD_IN_FRAMES: u32 = 2 * Self::FRAMES_PER_SECOND as u32;

    #[must_use]
    pub fn new_checked(minutes: u8, seconds: u8, frames: u8) -> Option<Self> {
        (seconds < Self::SECONDS_PER_MINUTE && frames < Self::FRAMES_PER_SECOND)
            .then_some(Self { minutes, seconds, frames })
    }

    #[must_use]
    pub fn to_frames(self) -> u32 {
        let frames_per_second: u32 = Self::FRAMES_PER_SECOND.into();
        let seconds_per_minute: u32 = Self::SECONDS_PER_MINUTE.into();

        u32::from(self.frames)
            + frames_per_second
                * (u32::from(self.seconds) + seconds_per_minute * u32::from(self.minutes))
    }

    /// Minutes saturate at 255 for frame counts beyond the addressable range.
    #[must_use]
    pub fn from_frames(frames: u32) -> Self {
        let frames_per_second: u32 = Self::FRAMES_PER_SECOND.into();
        let seconds_per_minute: u32 = Self::SECONDS_PER_MINUTE.into();

        let minutes = frames / (frames_per_second * seconds_per_minute);
        let seconds = (frames / frames_per_second) % seconds_per_minute;
        let frames = frames % frames_per_second;

        Self {
            minutes: minutes.min(u8::MAX.into()) as u8,
            seconds: seconds as u8,
            frames: frames as u8,
        }
    }

    /// Absolute disc time of a logical sector number.
    #[must_use]
    pub fn from_lsn(lsn: u32) -> Self {
        Self::from_frames(lsn.saturating_add(Self::LEAD_IN_FRAMES))
    }

    /// Logical sector number of an absolute disc time, or `None` if the time is inside the lead-in.
    #[must_use]
    pub fn to_lsn(self) -> Option<u32> {
        self.to_frames().checked_sub(Self::LEAD_IN_FRAMES)
    }

    /// Each component as one binary-coded decimal byte.
    #[must_use]
    pub fn to_bcd(self) -> [u8; 3] {
        [binary_to_bcd(self.minutes), binary_to_bcd(self.seconds), binary_to_bcd(self.frames)]
    }
}

impl Display for CdTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minutes, self.seconds, self.frames)
    }
}
