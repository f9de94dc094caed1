//! CDVD controller public interface: creation, register access, and the event loop

mod commands;
mod registers;


use crate::buffers::{ParamBuffer, ResultBuffer};
use crate::clock::RealTimeClock;
use crate::disc::{DiscBackend, DiscType};
use crate::keys::TitleKey;
use crate::magicgate::MagicGate;
use crate::nvm::{ConfigSession, NvmLoadError, NvmStore};
use crate::pipeline::{DecryptSettings, ReadProgress, SectorReader};
use crate::scheduler::{CdvdEvent, DriveAction, EventScheduler};
use bincode::{Decode, Encode};
use cdvd_common::frontend::{SaveWriter, TimingMode};
use cdvd_config::{DEFAULT_BIOS_VERSION, RtcInitMode};
use thiserror::Error;

pub use registers::{InterruptCause, ReadyFlags, Status};

#[derive(Debug, Error)]
pub enum CdvdError<SErr> {
    #[error("Unable to create NVM file: {0}")]
    NvmCreate(SErr),
    #[error("Unable to create mecha version file: {0}")]
    MechaVersionCreate(SErr),
    #[error("Error writing NVM contents: {0}")]
    SaveWrite(SErr),
}

impl<SErr> From<NvmLoadError<SErr>> for CdvdError<SErr> {
    fn from(value: NvmLoadError<SErr>) -> Self {
        match value {
            NvmLoadError::NvmCreate(err) => Self::NvmCreate(err),
            NvmLoadError::MechaVersionCreate(err) => Self::MechaVersionCreate(err),
        }
    }
}

pub type CdvdResult<T, SErr> = Result<T, CdvdError<SErr>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct CdvdEmulatorConfig {
    /// BIOS version as major << 8 | minor, e.g. 0x0200 for 2.00
    pub bios_version: u32,
    pub timing_mode: TimingMode,
    pub rtc_init: RtcInitMode,
}

impl Default for CdvdEmulatorConfig {
    fn default() -> Self {
        Self {
            bios_version: DEFAULT_BIOS_VERSION,
            timing_mode: TimingMode::default(),
            rtc_init: RtcInitMode::default(),
        }
    }
}

/// Destination of the next DMA transfer into I/O processor memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTarget {
    pub address: u32,
    pub remaining_bytes: u32,
}

/// The controller's view of the rest of the system.
pub trait HostBus {
    /// Signal the CDVD interrupt line. The cause is readable from the interrupt cause register.
    fn raise_interrupt(&mut self);

    fn dma_target(&mut self) -> DmaTarget;

    /// Copy a block into memory at `address`. The host is responsible for advancing its own DMA
    /// address and remaining length.
    fn dma_write(&mut self, address: u32, bytes: &[u8]);

    /// The current transfer is finished.
    fn dma_complete(&mut self);
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CdvdController {
    config: CdvdEmulatorConfig,
    last_ncmd: u8,
    last_scmd: u8,
    params: ParamBuffer,
    results: ResultBuffer,
    ready: u8,
    status: u8,
    error: u8,
    interrupt_cause: u8,
    disc_type: DiscType,
    tray_open: bool,
    tray_open_second: u8,
    break_pending: bool,
    scheduler: EventScheduler,
    reader: SectorReader,
    key: TitleKey,
    decrypt: DecryptSettings,
    config_session: ConfigSession,
    magic_gate: MagicGate,
    nvm: NvmStore,
    rtc: RealTimeClock,
}

impl CdvdController {
    /// Create a controller, loading the NVM and mecha version blobs through the save writer.
    ///
    /// # Errors
    ///
    /// Returns an error if either blob is missing and cannot be created.
    pub fn create<S: SaveWriter>(
        config: CdvdEmulatorConfig,
        save_writer: &mut S,
    ) -> CdvdResult<Self, S::Err> {
        let nvm = NvmStore::load(config.bios_version, save_writer)?;
        let rtc = RealTimeClock::new(config.rtc_init);

        log::info!(
            "Created CDVD controller for BIOS version {:X}.{:02X} with mecha version {:02X?}",
            config.bios_version >> 8,
            config.bios_version & 0xFF,
            nvm.mecha_version()
        );

        Ok(Self::from_parts(config, nvm, rtc))
    }

    fn from_parts(config: CdvdEmulatorConfig, nvm: NvmStore, rtc: RealTimeClock) -> Self {
        Self {
            config,
            last_ncmd: 0,
            last_scmd: 0,
            params: ParamBuffer::new(),
            results: ResultBuffer::new(),
            ready: ReadyFlags::READY_AFTER_READ,
            status: Status::STOP,
            error: 0,
            interrupt_cause: 0,
            disc_type: DiscType::NoDisc,
            tray_open: false,
            tray_open_second: 0,
            break_pending: false,
            scheduler: EventScheduler::new(),
            reader: SectorReader::new(),
            key: TitleKey::default(),
            decrypt: DecryptSettings::default(),
            config_session: ConfigSession::default(),
            magic_gate: MagicGate::new(),
            nvm,
            rtc,
        }
    }

    /// Subsystem reset. Drops any pending event along with the command buffers, keys, and
    /// sessions; NVM contents and the clock are retained.
    pub fn reset(&mut self) {
        log::debug!("CDVD controller reset");

        let nvm = self.nvm.clone();
        *self = Self::from_parts(self.config, nvm, self.rtc);
    }

    /// Advance the controller by the given number of I/O processor cycles, firing any event
    /// that comes due.
    pub fn tick<D: DiscBackend, H: HostBus>(&mut self, cycles: u64, disc: &mut D, host: &mut H) {
        let mut remaining = cycles;
        while let Some(until_event) = self.scheduler.cycles_until_event() {
            if until_event > remaining {
                break;
            }

            self.scheduler.advance(until_event);
            remaining -= until_event;

            if let Some(event) = self.scheduler.pop_ready() {
                self.handle_event(event, disc, host);
            }
        }

        self.scheduler.advance(remaining);
    }

    /// Advance the clock by one video frame and persist NVM contents if they have changed.
    ///
    /// # Errors
    ///
    /// Propagates any error from the save writer.
    pub fn vsync<D: DiscBackend, S: SaveWriter>(
        &mut self,
        disc: &mut D,
        save_writer: &mut S,
    ) -> CdvdResult<(), S::Err> {
        if self.rtc.vsync(self.config.timing_mode)
            && self.tray_open
            && self.rtc.second != self.tray_open_second
        {
            self.close_tray(disc);
        }

        self.flush(save_writer)
    }

    /// # Errors
    ///
    /// Propagates any error from the save writer.
    pub fn flush<S: SaveWriter>(&mut self, save_writer: &mut S) -> CdvdResult<(), S::Err> {
        self.nvm.persist_if_dirty(save_writer).map_err(CdvdError::SaveWrite)
    }

    #[must_use]
    pub fn cycles_until_event(&self) -> Option<u64> {
        self.scheduler.cycles_until_event()
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.scheduler.cycles()
    }

    #[must_use]
    pub fn config(&self) -> CdvdEmulatorConfig {
        self.config
    }

    #[must_use]
    pub fn rtc(&self) -> &RealTimeClock {
        &self.rtc
    }

    #[must_use]
    pub fn key(&self) -> &TitleKey {
        &self.key
    }

    #[must_use]
    pub fn sector(&self) -> u32 {
        self.reader.sector()
    }

    #[must_use]
    pub fn nvm_bytes(&self) -> &[u8] {
        self.nvm.as_bytes()
    }

    /// Notify the controller that the disc was changed; the disc type is re-detected on the
    /// next read of the disc type register.
    pub fn disc_changed(&mut self) {
        log::info!("Disc changed");
        self.disc_type = DiscType::NoDisc;
    }

    fn raise_interrupt<H: HostBus>(&mut self, cause: u8, host: &mut H) {
        self.interrupt_cause |= cause;
        host.raise_interrupt();
    }

    fn handle_event<D: DiscBackend, H: HostBus>(
        &mut self,
        event: CdvdEvent,
        disc: &mut D,
        host: &mut H,
    ) {
        match event {
            CdvdEvent::Action(action) => self.complete_action(action, host),
            CdvdEvent::SectorRead => self.advance_read(disc, host),
        }
    }

    fn complete_action<H: HostBus>(&mut self, action: DriveAction, host: &mut H) {
        log::trace!("Drive action {action:?} complete");

        match action {
            DriveAction::Seek | DriveAction::Standby => {
                self.reader.complete_positioning();
                self.ready = ReadyFlags::READY;
                self.status = Status::PAUSE;
            }
            DriveAction::Stop => {
                self.reader.stop();
                self.ready = ReadyFlags::READY;
                self.status = Status::STOP;
            }
            DriveAction::Break => {
                self.reader.abort();
                self.break_pending = false;
                self.ready = ReadyFlags::READY_AFTER_READ;
                self.status = Status::STOP;
                self.last_ncmd = 0;
            }
        }

        self.raise_interrupt(InterruptCause::COMMAND_COMPLETE, host);
    }

    fn advance_read<D: DiscBackend, H: HostBus>(&mut self, disc: &mut D, host: &mut H) {
        self.ready = ReadyFlags::NOT_READY;

        match self.reader.on_event(disc, host, self.decrypt, self.key.bytes[4]) {
            ReadProgress::SeekComplete(delay) => {
                self.status = Status::PAUSE;
                self.scheduler.schedule(CdvdEvent::SectorRead, delay);
            }
            ReadProgress::Continue(delay) => {
                self.scheduler.schedule(CdvdEvent::SectorRead, delay);
            }
            ReadProgress::Complete => {
                self.ready = ReadyFlags::READY_AFTER_READ;
                self.raise_interrupt(InterruptCause::COMMAND_COMPLETE, host);
                host.dma_complete();
            }
            ReadProgress::Failed => {
                self.error = 0x80;
                self.ready = ReadyFlags::READY_AFTER_READ;
                self.raise_interrupt(
                    InterruptCause::COMMAND_COMPLETE | InterruptCause::ERROR,
                    host,
                );
            }
            ReadProgress::Idle => {}
        }
    }

    fn open_tray<D: DiscBackend>(&mut self, disc: &mut D) -> u8 {
        if let Err(err) = disc.tray_open() {
            log::error!("Unable to open disc tray: {err}");
            return 0x80;
        }

        log::info!("Opened virtual disc tray");
        self.tray_open = true;
        self.tray_open_second = self.rtc.second;
        self.status = Status::TRAY_OPEN;
        self.ready = ReadyFlags::NOT_READY;
        self.disc_type = DiscType::NoDisc;
        0
    }

    fn close_tray<D: DiscBackend>(&mut self, disc: &mut D) -> u8 {
        if let Err(err) = disc.tray_close() {
            log::error!("Unable to close disc tray: {err}");
            return 0x80;
        }

        log::info!("Closed virtual disc tray");
        self.tray_open = false;
        self.status = Status::PAUSE;
        self.ready = ReadyFlags::READY;
        0
    }
}
