use time::{OffsetDateTime, UtcOffset};

/// Month lengths used by the controller's clock. February is always 28 days; leap years are not
/// modeled by the firmware.
const DAYS_IN_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Determine the number of days in the given month, with months starting at 1.
#[must_use]
pub fn days_in_month_no_leap(month: u8) -> u8 {
    match month {
        1..=12 => DAYS_IN_MONTH[usize::from(month - 1)],
        _ => {
            log::error!("Invalid month: {month}, defaulting to 31 days in month");
            31
        }
    }
}

/// Read the host's current local time. Falls back to UTC if the local offset cannot be
/// determined, which can happen on some platforms when multiple threads are running.
#[must_use]
pub fn host_local_time() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match UtcOffset::current_local_offset() {
        Ok(offset) => now.to_offset(offset),
        Err(err) => {
            log::warn!("Unable to determine local UTC offset, using UTC: {err}");
            now
        }
    }
}
