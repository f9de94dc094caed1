use crate::api::{DmaTarget, HostBus};
use crate::disc::{
    BootTitle, DiscBackend, DiscError, DiscResult, DiscType, ReadMode, SubChannelQ, TOC_LEN,
    TrackDescriptor, TrackRange, TrackType, TrayStatus,
};
use cdrom::cdtime::CdTime;
use cdvd_common::frontend::SaveWriter;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemorySaveWriter {
    pub files: HashMap<String, Vec<u8>>,
    pub persist_count: usize,
}

impl SaveWriter for MemorySaveWriter {
    type Err = String;

    fn load_bytes(&mut self, extension: &str) -> Result<Vec<u8>, Self::Err> {
        self.files
            .get(extension)
            .cloned()
            .ok_or_else(|| format!("no file with extension {extension}"))
    }

    fn persist_bytes(&mut self, extension: &str, bytes: &[u8]) -> Result<(), Self::Err> {
        self.files.insert(extension.into(), bytes.to_vec());
        self.persist_count += 1;
        Ok(())
    }
}

/// Reads and writes always fail
#[derive(Debug, Default)]
pub struct ReadOnlySaveWriter;

impl SaveWriter for ReadOnlySaveWriter {
    type Err = String;

    fn load_bytes(&mut self, extension: &str) -> Result<Vec<u8>, Self::Err> {
        Err(format!("cannot open {extension}"))
    }

    fn persist_bytes(&mut self, extension: &str, _bytes: &[u8]) -> Result<(), Self::Err> {
        Err(format!("cannot create {extension}"))
    }
}

/// Disc whose sector `lsn` contains bytes `lsn + i` (truncated to u8)
#[derive(Debug)]
pub struct MockDisc {
    pub disc_type: DiscType,
    pub sector_count: u32,
    pub fail_reads: bool,
    pub read_attempts: Vec<u32>,
    pub toc: Option<Vec<u8>>,
    pub tracks: Vec<TrackDescriptor>,
    pub tray: TrayStatus,
    pub tray_fails: bool,
    pub boot_title: Option<BootTitle>,
    buffer: Option<Vec<u8>>,
}

impl MockDisc {
    pub fn new(disc_type: DiscType) -> Self {
        Self {
            disc_type,
            sector_count: 1000,
            fail_reads: false,
            read_attempts: Vec::new(),
            toc: None,
            tracks: vec![TrackDescriptor { track_type: TrackType::Data, start_lsn: 0 }],
            tray: TrayStatus::Closed,
            tray_fails: false,
            boot_title: None,
            buffer: None,
        }
    }

    pub fn sector_byte(lsn: u32, i: usize) -> u8 {
        (lsn as u8).wrapping_add(i as u8)
    }
}

impl DiscBackend for MockDisc {
    fn disc_type(&mut self) -> DiscType {
        self.disc_type
    }

    fn track_count(&mut self) -> DiscResult<TrackRange> {
        if self.tracks.is_empty() {
            return Err(DiscError::NoDisc);
        }
        Ok(TrackRange { first: 1, last: self.tracks.len() as u8 })
    }

    fn track_descriptor(&mut self, track: u8) -> DiscResult<TrackDescriptor> {
        if track == 0 {
            return Ok(TrackDescriptor { track_type: TrackType::Data, start_lsn: self.sector_count });
        }

        let index = usize::from(track).checked_sub(1).ok_or(DiscError::InvalidTrack { track })?;
        self.tracks.get(index).copied().ok_or(DiscError::InvalidTrack { track })
    }

    fn sub_channel(&mut self, lsn: u32) -> DiscResult<SubChannelQ> {
        if lsn >= self.sector_count {
            return Err(DiscError::ReadFailed { lsn });
        }
        Ok(SubChannelQ {
            control_adr: 0x41,
            track_number: 1,
            index_number: 1,
            relative_time: CdTime::from_frames(lsn),
            absolute_time: CdTime::from_lsn(lsn),
        })
    }

    fn table_of_contents(&mut self, buffer: &mut [u8; TOC_LEN]) -> DiscResult<()> {
        let toc = self.toc.as_ref().ok_or(DiscError::Other("no TOC".into()))?;
        buffer.copy_from_slice(&toc[..TOC_LEN]);
        Ok(())
    }

    fn tray_open(&mut self) -> DiscResult<()> {
        if self.tray_fails {
            return Err(DiscError::Tray);
        }
        self.tray = TrayStatus::Open;
        Ok(())
    }

    fn tray_close(&mut self) -> DiscResult<()> {
        if self.tray_fails {
            return Err(DiscError::Tray);
        }
        self.tray = TrayStatus::Closed;
        Ok(())
    }

    fn tray_status(&mut self) -> TrayStatus {
        self.tray
    }

    fn read_track(&mut self, lsn: u32, mode: ReadMode) -> DiscResult<()> {
        self.read_attempts.push(lsn);
        if self.fail_reads || lsn >= self.sector_count {
            self.buffer = None;
            return Err(DiscError::ReadFailed { lsn });
        }

        self.buffer = Some((0..mode.sector_len()).map(|i| Self::sector_byte(lsn, i)).collect());
        Ok(())
    }

    fn last_buffer(&mut self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    fn boot_title(&mut self) -> Option<BootTitle> {
        self.boot_title.clone()
    }
}

#[derive(Debug)]
pub struct MockHost {
    pub interrupts: usize,
    pub dma_address: u32,
    pub dma_remaining: u32,
    pub writes: Vec<(u32, Vec<u8>)>,
    pub dma_completions: usize,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            interrupts: 0,
            dma_address: 0x1000,
            dma_remaining: 0x10_0000,
            writes: Vec::new(),
            dma_completions: 0,
        }
    }
}

impl MockHost {
    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|(_, bytes)| bytes.iter().copied()).collect()
    }
}

impl HostBus for MockHost {
    fn raise_interrupt(&mut self) {
        self.interrupts += 1;
    }

    fn dma_target(&mut self) -> DmaTarget {
        DmaTarget { address: self.dma_address, remaining_bytes: self.dma_remaining }
    }

    fn dma_write(&mut self, address: u32, bytes: &[u8]) {
        self.writes.push((address, bytes.to_vec()));
        self.dma_address = address + bytes.len() as u32;
        self.dma_remaining = self.dma_remaining.saturating_sub(bytes.len() as u32);
    }

    fn dma_complete(&mut self) {
        self.dma_completions += 1;
    }
}
