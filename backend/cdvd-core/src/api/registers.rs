//! Byte-addressed register window exposed to the I/O processor

use super::{CdvdController, HostBus};
use crate::disc::{DiscBackend, DiscType, TrackType, TrayStatus};
use crate::pipeline::DecryptSettings;
use crate::scheduler::{BREAK_CYCLES, CdvdEvent, DriveAction};
use cdvd_common::num::binary_to_bcd;
use cdrom::cdtime::CdTime;

pub struct InterruptCause;

impl InterruptCause {
    pub const COMMAND_COMPLETE: u8 = 1 << 1;
    pub const ACKNOWLEDGE: u8 = 1 << 2;
    pub const END_OF_DATA: u8 = 1 << 3;
    pub const ERROR: u8 = 1 << 4;
    pub const NOT_READY: u8 = 1 << 5;
}

pub struct ReadyFlags;

impl ReadyFlags {
    pub const NOT_READY: u8 = 0x00;
    pub const READY: u8 = 0x40;
    pub const READY_AFTER_READ: u8 = 0x4E;
}

pub struct Status;

impl Status {
    pub const STOP: u8 = 0x00;
    pub const TRAY_OPEN: u8 = 0x01;
    pub const PAUSE: u8 = 0x0A;
}

// Sub-command ready register bit set while the result buffer has nothing left to read
const RESULT_EMPTY_BIT: u8 = 0x40;

impl CdvdController {
    /// Read a register. Addresses are the low byte of the controller's register window.
    pub fn read_register<D: DiscBackend>(&mut self, address: u8, disc: &mut D) -> u8 {
        let value = match address {
            0x04 => self.last_ncmd,
            0x05 => self.ready,
            0x06 => self.error,
            0x07 => 0,
            0x08 => self.interrupt_cause,
            0x0A => self.status,
            0x0B => self.tray_state(disc),
            0x0C..=0x0E => self.crt_position()[usize::from(address - 0x0C)],
            0x0F => self.detect_disc_type(disc) as u8,
            0x13 => 0x04,
            0x15 => 0x01,
            0x16 => self.last_scmd,
            0x17 => self.sub_ready(),
            0x18 => self.results.pop().unwrap_or(0),
            // Key bytes 0-14 are spread across three banks of 5 registers
            0x20..=0x24 => self.key.bytes[usize::from(address - 0x20)],
            0x28..=0x2C => self.key.bytes[usize::from(address - 0x28) + 5],
            0x30..=0x34 => self.key.bytes[usize::from(address - 0x30) + 10],
            0x38 => self.key.bytes[15],
            0x39 => self.key.xor,
            0x3A => self.decrypt.0,
            _ => {
                log::warn!("Unknown CDVD register read at {address:02X}");
                0
            }
        };

        log::trace!("CDVD register read {address:02X}: {value:02X}");

        value
    }

    /// Write a register. Command register writes dispatch immediately.
    pub fn write_register<D: DiscBackend, H: HostBus>(
        &mut self,
        address: u8,
        value: u8,
        disc: &mut D,
        host: &mut H,
    ) {
        log::trace!("CDVD register write {address:02X}: {value:02X}");

        match address {
            0x04 => self.execute_drive_command(value, disc, host),
            0x05 | 0x17 => {
                self.params.push(value);
            }
            0x06 => {
                log::debug!("HOWTO write: {value:02X}");
            }
            0x07 => self.write_break(),
            0x08 => {
                self.interrupt_cause &= !value;
            }
            0x0A | 0x0B | 0x0C..=0x0F | 0x13 | 0x15 | 0x18 | 0x20..=0x39 => {
                log::debug!("Ignoring write to read-only CDVD register {address:02X}: {value:02X}");
            }
            0x14 => {
                log::warn!("PS1 mode switch requested (speed {value:02X}); not supported");
            }
            0x16 => self.execute_sub_command(value, disc),
            0x3A => {
                log::debug!("Decrypt settings set to {value:02X}");
                self.decrypt = DecryptSettings(value);
            }
            _ => {
                log::warn!("Unknown CDVD register write at {address:02X}: {value:02X}");
            }
        }
    }

    fn write_break(&mut self) {
        if self.ready != ReadyFlags::NOT_READY || self.break_pending {
            log::trace!("Ignoring break; ready={:02X}, pending={}", self.ready, self.break_pending);
            return;
        }

        log::debug!("Breaking current drive command {:02X}", self.last_ncmd);

        self.scheduler.cancel();
        self.reader.abort();
        self.break_pending = true;
        self.scheduler.schedule(CdvdEvent::Action(DriveAction::Break), BREAK_CYCLES);
        self.status = Status::STOP;
    }

    fn tray_state<D: DiscBackend>(&mut self, disc: &mut D) -> u8 {
        if self.tray_open {
            return TrayStatus::Open as u8;
        }
        disc.tray_status() as u8
    }

    fn sub_ready(&self) -> u8 {
        if self.results.fully_consumed() { RESULT_EMPTY_BIT } else { 0 }
    }

    // Minute, second, and frame of the current sector in BCD. The 2-second lead-in is added to
    // the BCD second, matching the drive firmware.
    fn crt_position(&self) -> [u8; 3] {
        let sector = self.reader.sector();
        let frames_per_second = u32::from(CdTime::FRAMES_PER_SECOND);
        let frames_per_minute = frames_per_second * u32::from(CdTime::SECONDS_PER_MINUTE);

        let minute = (sector / frames_per_minute) as u8;
        let second = ((sector / frames_per_second) % 60) as u8;
        let frame = (sector % frames_per_second) as u8;

        [binary_to_bcd(minute), binary_to_bcd(second) + 2, binary_to_bcd(frame)]
    }

    pub(super) fn detect_disc_type<D: DiscBackend>(&mut self, disc: &mut D) -> DiscType {
        if self.tray_open {
            return DiscType::NoDisc;
        }

        if self.disc_type != DiscType::NoDisc {
            return self.disc_type;
        }

        let detected = refine_disc_type(disc.disc_type(), disc);
        if detected != DiscType::NoDisc {
            log::info!("Detected disc type {detected:?}");
        }

        self.disc_type = detected;
        detected
    }
}

fn has_audio_tracks<D: DiscBackend>(disc: &mut D) -> bool {
    let Ok(range) = disc.track_count() else { return false };

    (range.first..=range.last).any(|track| {
        disc.track_descriptor(track)
            .is_ok_and(|descriptor| descriptor.track_type == TrackType::Audio)
    })
}

// Distinguish PS1 discs and discs with audio tracks when the backend only reports a generic CD
fn refine_disc_type<D: DiscBackend>(disc_type: DiscType, disc: &mut D) -> DiscType {
    match disc_type {
        DiscType::Ps2Cd | DiscType::Ps1Cd => {
            let ps1 = match disc.boot_title() {
                Some(title) => !title.ps2,
                None => disc_type == DiscType::Ps1Cd,
            };

            match (ps1, has_audio_tracks(disc)) {
                (true, false) => DiscType::Ps1Cd,
                (true, true) => DiscType::Ps1CdWithAudio,
                (false, false) => DiscType::Ps2Cd,
                (false, true) => DiscType::Ps2CdWithAudio,
            }
        }
        _ => disc_type,
    }
}
