//! Read timing and the controller's single deferred event slot

use bincode::{Decode, Encode};

/// I/O processor clock speed in cycles per second
pub const IOP_CLOCK_HZ: u64 = 36_864_000;

/// Bytes per second at 1x CD speed (150 KiB/s)
pub const CD_BYTES_PER_SECOND: u64 = 153_600;

/// Bytes per second at 1x DVD speed (1350 KiB/s + 250 KiB/s)
pub const DVD_BYTES_PER_SECOND: u64 = 1_382_400 + 256_000;

/// Seeks shorter than this many sectors read through to the target instead of seeking
pub const CONTIGUOUS_SEEK_THRESHOLD: u32 = 9;

// 40ms
pub const AVERAGE_SEEK_CYCLES: u64 = IOP_CLOCK_HZ * 40 / 1000;

// 333ms
pub const SPIN_UP_CYCLES: u64 = IOP_CLOCK_HZ / 3;

// 166ms
pub const STOP_CYCLES: u64 = IOP_CLOCK_HZ / 6;

pub const BREAK_CYCLES: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum MediaKind {
    Cd,
    Dvd,
}

impl MediaKind {
    fn bytes_per_second(self) -> u64 {
        match self {
            Self::Cd => CD_BYTES_PER_SECOND,
            Self::Dvd => DVD_BYTES_PER_SECOND,
        }
    }
}

/// Number of I/O processor cycles needed to read one block of `block_size` bytes at the given
/// speed multiplier.
#[must_use]
pub fn read_time(block_size: u32, speed_multiplier: u32, media: MediaKind) -> u64 {
    let speed_multiplier = u64::from(speed_multiplier.max(1));
    IOP_CLOCK_HZ * u64::from(block_size) / (media.bytes_per_second() * speed_multiplier)
}

#[must_use]
pub fn cycles_to_micros(cycles: u64) -> u64 {
    cycles * 1_000_000 / IOP_CLOCK_HZ
}

/// Drive mechanism operations that complete after a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum DriveAction {
    Seek,
    Standby,
    Stop,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum CdvdEvent {
    Action(DriveAction),
    SectorRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ScheduledEvent {
    pub event: CdvdEvent,
    pub cycle: u64,
}

/// Tracks elapsed I/O processor cycles and holds at most one pending event.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct EventScheduler {
    cycles: u64,
    pending: Option<ScheduledEvent>,
}

impl EventScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[must_use]
    pub fn pending(&self) -> Option<ScheduledEvent> {
        self.pending
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Arm `event` to fire after `delay` cycles. Replaces any event that is already pending.
    pub fn schedule(&mut self, event: CdvdEvent, delay: u64) {
        if let Some(replaced) = self.pending {
            log::warn!("Replacing pending event {replaced:?} with {event:?}");
        }

        let cycle = self.cycles + delay.max(1);
        log::trace!(
            "Scheduling {event:?} at cycle {cycle} ({delay} cycles, {}us)",
            cycles_to_micros(delay)
        );

        self.pending = Some(ScheduledEvent { event, cycle });
    }

    pub fn cancel(&mut self) -> Option<ScheduledEvent> {
        let cancelled = self.pending.take();
        if let Some(cancelled) = cancelled {
            log::trace!("Cancelled pending event {cancelled:?}");
        }
        cancelled
    }

    #[must_use]
    pub fn cycles_until_event(&self) -> Option<u64> {
        self.pending.map(|pending| pending.cycle.saturating_sub(self.cycles))
    }

    pub fn advance(&mut self, cycles: u64) {
        self.cycles += cycles;
    }

    /// Take the pending event if its target cycle has been reached.
    pub fn pop_ready(&mut self) -> Option<CdvdEvent> {
        let pending = self.pending?;
        if self.cycles < pending.cycle {
            return None;
        }

        self.pending = None;
        log::trace!("Popped event {:?} at cycle {}", pending.event, self.cycles);

        Some(pending.event)
    }
}
