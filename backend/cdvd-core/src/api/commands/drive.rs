//! Asynchronous drive command (NCMD) handlers

use super::DriveCommand;
use crate::api::{CdvdController, HostBus, InterruptCause, ReadyFlags, Status};
use crate::disc::{DiscBackend, DiscResult, TOC_LEN, TrackType};
use crate::keys;
use crate::pipeline::{ReadKind, ReadRequest};
use crate::scheduler::{CdvdEvent, DriveAction, STOP_CYCLES};
use cdrom::cdtime::CdTime;
use cdvd_common::num::binary_to_bcd;

const CD_TRACK_TYPE_AUDIO: u8 = 0x01;
const CD_TRACK_TYPE_DATA: u8 = 0x41;

impl CdvdController {
    pub(crate) fn execute_drive_command<D: DiscBackend, H: HostBus>(
        &mut self,
        code: u8,
        disc: &mut D,
        host: &mut H,
    ) {
        let command = DriveCommand::from_byte(code);

        log::trace!("NCMD {code:02X} ({command:?}) with params {:02X?}", self.params.as_slice());

        if command.is_some_and(DriveCommand::requires_idle_drive) && self.scheduler.is_pending() {
            log::warn!(
                "Rejecting NCMD {code:02X} while event {:?} is pending",
                self.scheduler.pending()
            );
            self.error = 0x80;
            self.raise_interrupt(InterruptCause::COMMAND_COMPLETE | InterruptCause::ERROR, host);
            self.params.clear();
            return;
        }

        self.last_ncmd = code;
        self.status = Status::STOP;
        self.interrupt_cause = 0;
        self.error = 0;

        match command {
            Some(DriveCommand::Sync | DriveCommand::Nop) => self.complete_immediately(host),
            Some(DriveCommand::Standby) => {
                let delay = self.reader.begin_positioning(0);
                self.arm_action(DriveAction::Standby, delay);
            }
            Some(DriveCommand::Stop) => {
                self.cancel_read();
                self.arm_action(DriveAction::Stop, STOP_CYCLES);
            }
            Some(DriveCommand::Pause) => {
                self.cancel_read();
                self.ready = ReadyFlags::READY;
                self.status = Status::PAUSE;
                self.complete_immediately(host);
            }
            Some(DriveCommand::Seek) => {
                let target = self.params.u32_le(0);
                log::debug!("Seeking to sector {target}");

                let delay = self.reader.begin_positioning(target);
                self.arm_action(DriveAction::Seek, delay);
            }
            Some(DriveCommand::Read) => self.start_read(ReadKind::Data, disc),
            Some(DriveCommand::ReadCdda | DriveCommand::ReadXCdda) => {
                self.start_read(ReadKind::Cdda, disc);
            }
            Some(DriveCommand::ReadDvd) => self.start_read(ReadKind::RawDvd, disc),
            Some(DriveCommand::GetToc) => self.get_toc(disc, host),
            Some(DriveCommand::ReadKey) => self.read_key(disc, host),
            Some(DriveCommand::ChangeSpindleControl) => {
                log::debug!("Spindle control change: {:02X}", self.params.get(0));
                self.complete_immediately(host);
            }
            None => {
                log::warn!("Unknown NCMD {code:02X}; completing with no effect");
                self.complete_immediately(host);
            }
        }

        self.params.clear();
    }

    fn complete_immediately<H: HostBus>(&mut self, host: &mut H) {
        self.raise_interrupt(InterruptCause::COMMAND_COMPLETE, host);
    }

    fn arm_action(&mut self, action: DriveAction, delay: u64) {
        log::trace!("Scheduling drive action {action:?} in {delay} cycles");

        self.scheduler.schedule(CdvdEvent::Action(action), delay);
        self.ready = ReadyFlags::NOT_READY;
    }

    fn cancel_read(&mut self) {
        if let Some(cancelled) = self.scheduler.cancel() {
            log::debug!("Cancelled pending event {:?}", cancelled.event);
        }
        self.reader.abort();
    }

    fn start_read<D: DiscBackend>(&mut self, kind: ReadKind, disc: &mut D) {
        let request = ReadRequest::from_params(kind, &self.params);
        let delay = self.reader.start_read(request, disc);

        self.scheduler.schedule(CdvdEvent::SectorRead, delay);
        self.ready = ReadyFlags::NOT_READY;
        self.status = Status::STOP;
    }

    fn get_toc<D: DiscBackend, H: HostBus>(&mut self, disc: &mut D, host: &mut H) {
        let mut toc = [0; TOC_LEN];

        let result = match disc.table_of_contents(&mut toc) {
            Ok(()) => Ok(()),
            Err(err) if self.detect_disc_type(disc).is_cd() => {
                log::debug!("Backend has no TOC for CD ({err}); building one from the track list");
                synthesize_cd_toc(disc, &mut toc)
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            log::error!("Unable to read table of contents: {err}");
            self.error = 0x80;
            self.raise_interrupt(InterruptCause::COMMAND_COMPLETE | InterruptCause::ERROR, host);
            return;
        }

        let target = host.dma_target();
        host.dma_write(target.address, &toc);

        self.complete_immediately(host);
        host.dma_complete();
    }

    fn read_key<D: DiscBackend, H: HostBus>(&mut self, disc: &mut D, host: &mut H) {
        let arg0 = self.params.get(0);
        let arg1 = u16::from(self.params.get(1)) | (u16::from(self.params.get(2)) << 8);
        let arg2 = self.params.u32_le(3);

        log::debug!("Read key: arg0={arg0:02X}, arg1={arg1:04X}, arg2={arg2}");

        self.key.clear();

        match disc.boot_title() {
            Some(title) => match keys::derive_title_key(&title.title_id, arg2) {
                Ok(bytes) => {
                    log::debug!("Derived key for {}: {bytes:02X?}", title.title_id);
                    self.key.bytes = bytes;
                }
                Err(err) => log::error!("Unable to derive disc key: {err}"),
            },
            None => log::warn!("Read key requested but the disc has no boot title"),
        }

        self.complete_immediately(host);
    }
}

// Build a CD table of contents: first/last track points, the lead-out position, and one
// 10-byte entry per track with its type, number, and start time
fn synthesize_cd_toc<D: DiscBackend>(disc: &mut D, toc: &mut [u8; TOC_LEN]) -> DiscResult<()> {
    let tracks = disc.track_count()?;
    let lead_out = disc.track_descriptor(0)?;

    toc.fill(0);
    toc[2] = 0xA0;
    toc[7] = binary_to_bcd(tracks.first);
    toc[12] = 0xA1;
    toc[17] = binary_to_bcd(tracks.last);

    toc[22] = 0xA2;
    let lead_out_time = CdTime::from_lsn(lead_out.start_lsn);
    toc[27] = binary_to_bcd(lead_out_time.minutes);
    toc[28] = binary_to_bcd(lead_out_time.seconds);

    for track in tracks.first..=tracks.last {
        let base = usize::from(track) * 10 + 30;
        if base + 10 > TOC_LEN {
            log::warn!("Track {track} does not fit in the table of contents");
            break;
        }

        let Ok(descriptor) = disc.track_descriptor(track) else {
            log::debug!("No descriptor for track {track}");
            continue;
        };

        toc[base] = match descriptor.track_type {
            TrackType::Audio => CD_TRACK_TYPE_AUDIO,
            TrackType::Data => CD_TRACK_TYPE_DATA,
        };
        toc[base + 2] = binary_to_bcd(track);
        toc[base + 7..base + 10].copy_from_slice(&CdTime::from_lsn(descriptor.start_lsn).to_bcd());
    }

    Ok(())
}
