//! Real-time clock maintained by the drive controller, advanced once per video frame

use bincode::{Decode, Encode};
use cdvd_common::frontend::TimingMode;
use cdvd_common::num::{bcd_to_binary, binary_to_bcd};
use cdvd_common::timeutils;
use cdvd_config::RtcInitMode;
use time::OffsetDateTime;

/// Result bytes of the read-clock sub-command
pub const RTC_READ_LEN: usize = 8;

/// Parameter bytes of the write-clock sub-command: second, minute, hour, padding, day, month,
/// year
pub const RTC_WRITE_LEN: usize = 7;

// The firmware's clock is kept 8 hours behind the value it reports
const HOUR_READ_OFFSET: u8 = 8;
const HOUR_WRITE_OFFSET: u8 = 24 - HOUR_READ_OFFSET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RealTimeClock {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
    frame_counter: u8,
}

impl RealTimeClock {
    /// 2007-05-25 01:00:00
    pub const FIXED_DATE: Self =
        Self { second: 0, minute: 0, hour: 1, day: 25, month: 5, year: 7, frame_counter: 0 };

    #[must_use]
    pub fn new(init_mode: RtcInitMode) -> Self {
        match init_mode {
            RtcInitMode::HostClock => Self::from_date_time(timeutils::host_local_time()),
            RtcInitMode::FixedDate => Self::FIXED_DATE,
        }
    }

    #[must_use]
    pub fn from_date_time(date_time: OffsetDateTime) -> Self {
        Self {
            second: date_time.second(),
            minute: date_time.minute(),
            hour: date_time.hour(),
            day: date_time.day(),
            month: date_time.month().into(),
            year: date_time.year().rem_euclid(100) as u8,
            frame_counter: 0,
        }
    }

    /// Advance by one video frame, ticking the seconds field once per second of frames. Returns
    /// whether a second elapsed.
    pub fn vsync(&mut self, timing_mode: TimingMode) -> bool {
        self.frame_counter += 1;
        if self.frame_counter < timing_mode.frames_per_second() {
            return false;
        }
        self.frame_counter = 0;

        self.tick_second();
        true
    }

    fn tick_second(&mut self) {
        self.second += 1;
        if self.second < 60 {
            return;
        }
        self.second = 0;

        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute = 0;

        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;

        // Guest-written dates can hold any byte; these fields wrap like the firmware's counters
        self.day = self.day.wrapping_add(1);
        if self.day <= timeutils::days_in_month_no_leap(self.month) {
            return;
        }
        self.day = 1;

        self.month = self.month.wrapping_add(1);
        if self.month <= 12 {
            return;
        }
        self.month = 1;

        self.year = self.year.wrapping_add(1);
        if self.year < 100 {
            return;
        }
        self.year = 0;
    }

    /// Encode the clock the way the read-clock sub-command reports it.
    #[must_use]
    pub fn to_bcd_result(&self) -> [u8; RTC_READ_LEN] {
        let hour = binary_to_bcd((self.hour + HOUR_READ_OFFSET) % 24);

        // Reported hours 0-7 belong to the next day; the day byte is incremented after BCD
        // conversion, so day 9 reports as 0x0A
        let mut day = binary_to_bcd(self.day);
        if hour <= 7 {
            day = day.wrapping_add(1);
        }

        [
            0,
            binary_to_bcd(self.second),
            binary_to_bcd(self.minute),
            hour,
            0,
            day,
            binary_to_bcd(self.month).wrapping_add(0x80),
            binary_to_bcd(self.year),
        ]
    }

    /// Set the clock from the write-clock sub-command's parameter bytes.
    pub fn write_bcd(&mut self, fields: [u8; RTC_WRITE_LEN]) {
        let [second, minute, hour, _, day, month, year] = fields;

        self.second = bcd_to_binary(second);
        self.minute = bcd_to_binary(minute) % 60;
        self.hour = (bcd_to_binary(hour) + HOUR_WRITE_OFFSET) % 24;

        self.day = bcd_to_binary(day);
        if hour <= 7 {
            self.day = self.day.wrapping_sub(1);
        }

        self.month = bcd_to_binary(month.wrapping_sub(0x80));
        self.year = bcd_to_binary(year);

        log::debug!(
            "Clock set to {:02}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn clock(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> RealTimeClock {
        RealTimeClock { second, minute, hour, day, month, year, frame_counter: 0 }
    }

    fn tick_frames(clock: &mut RealTimeClock, timing_mode: TimingMode, frames: u32) {
        for _ in 0..frames {
            clock.vsync(timing_mode);
        }
    }

    #[test]
    fn frames_per_second() {
        let mut ntsc = clock(7, 5, 25, 1, 0, 0);
        tick_frames(&mut ntsc, TimingMode::Ntsc, 59);
        assert_eq!(ntsc.second, 0);
        tick_frames(&mut ntsc, TimingMode::Ntsc, 1);
        assert_eq!(ntsc.second, 1);

        let mut pal = clock(7, 5, 25, 1, 0, 0);
        tick_frames(&mut pal, TimingMode::Pal, 50);
        assert_eq!(pal.second, 1);
    }

    #[test]
    fn rollover() {
        let mut rtc = clock(7, 5, 25, 1, 0, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(7, 5, 25, 1, 1, 0));

        let mut rtc = clock(7, 5, 25, 23, 59, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(7, 5, 26, 0, 0, 0));

        let mut rtc = clock(7, 4, 30, 23, 59, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(7, 5, 1, 0, 0, 0));

        let mut rtc = clock(7, 12, 31, 23, 59, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(8, 1, 1, 0, 0, 0));

        let mut rtc = clock(99, 12, 31, 23, 59, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(0, 1, 1, 0, 0, 0));
    }

    #[test]
    fn february_never_has_29_days() {
        // 2008 was a leap year but the firmware clock does not model it
        let mut rtc = clock(8, 2, 28, 23, 59, 59);
        rtc.tick_second();
        assert_eq!(rtc, clock(8, 3, 1, 0, 0, 0));
    }

    #[test]
    fn read_applies_hour_offset() {
        let rtc = clock(7, 5, 25, 1, 30, 45);
        assert_eq!(rtc.to_bcd_result(), [0, 0x45, 0x30, 0x09, 0, 0x25, 0x85, 0x07]);

        // 20:00 reads back as 04:00 on the following day
        let rtc = clock(7, 5, 25, 20, 0, 0);
        assert_eq!(rtc.to_bcd_result(), [0, 0x00, 0x00, 0x04, 0, 0x26, 0x85, 0x07]);
    }

    #[test]
    fn write_applies_hour_offset() {
        let mut rtc = clock(0, 1, 1, 0, 0, 0);
        rtc.write_bcd([0x59, 0x59, 0x15, 0, 0x24, 0x86, 0x09]);
        assert_eq!(rtc, clock(9, 6, 24, 7, 59, 59));

        // Early-morning hours belong to the previous day internally
        rtc.write_bcd([0x00, 0x10, 0x03, 0, 0x15, 0x81, 0x10]);
        assert_eq!(rtc, clock(10, 1, 14, 19, 10, 0));
    }

    #[test]
    fn write_then_read_round_trips() {
        for fields in [
            [0x59, 0x59, 0x15, 0, 0x24, 0x86, 0x09],
            [0x00, 0x10, 0x03, 0, 0x15, 0x81, 0x10],
            [0x30, 0x00, 0x23, 0, 0x31, 0x92, 0x99],
        ] {
            let mut rtc = clock(0, 1, 1, 0, 0, 0);
            rtc.write_bcd(fields);

            let [_, second, minute, hour, _, day, month, year] = rtc.to_bcd_result();
            assert_eq!([second, minute, hour, day, month, year], [
                fields[0], fields[1], fields[2], fields[4], fields[5], fields[6]
            ]);
        }
    }

    #[test]
    fn month_written_without_flag_reads_back() {
        let mut rtc = clock(0, 1, 1, 0, 0, 0);
        rtc.write_bcd([0x00, 0x00, 0x12, 0, 0x14, 0x06, 0x24]);
        assert_eq!(rtc.month, 86);

        // 86 encodes as 0x86 and the flag bit wraps it around to 0x06
        let [_, _, _, hour, _, day, month, year] = rtc.to_bcd_result();
        assert_eq!([hour, day, month, year], [0x12, 0x14, 0x06, 0x24]);
    }

    #[test]
    fn day_zero_with_early_hour_survives_midnight() {
        let mut rtc = clock(0, 1, 1, 0, 0, 0);
        rtc.write_bcd([0x59, 0x59, 0x07, 0, 0x00, 0x86, 0x24]);
        assert_eq!(rtc, clock(24, 6, 255, 23, 59, 59));

        tick_frames(&mut rtc, TimingMode::Ntsc, 60);
        assert_eq!(rtc, clock(24, 6, 0, 0, 0, 0));

        let [_, second, minute, hour, _, day, _, _] = rtc.to_bcd_result();
        assert_eq!([second, minute, hour, day], [0x00, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn fixed_date_init() {
        assert_eq!(RealTimeClock::new(RtcInitMode::FixedDate), clock(7, 5, 25, 1, 0, 0));
    }
}
