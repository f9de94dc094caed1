use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub use cdvd_common::frontend::TimingMode;

/// BIOS version reported by most retail v7+ consoles
pub const DEFAULT_BIOS_VERSION: u32 = 0x0200;

/// How the controller's real-time clock is seeded at power-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RtcInitMode {
    /// Host local time
    #[default]
    HostClock,
    /// 2007-05-25 01:00:00, useful for reproducible runs
    FixedDate,
}

impl RtcInitMode {
    pub const ALL: [Self; 2] = [Self::HostClock, Self::FixedDate];
}

impl Display for RtcInitMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HostClock => write!(f, "HostClock"),
            Self::FixedDate => write!(f, "FixedDate"),
        }
    }
}

impl FromStr for RtcInitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid RTC init mode string: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_init_mode_round_trips_display() {
        for mode in RtcInitMode::ALL {
            assert_eq!(mode.to_string().parse::<RtcInitMode>(), Ok(mode));
        }
        assert!("tomorrow".parse::<RtcInitMode>().is_err());
    }
}
