//! Disc backends for the command-line driver

use cdrom::DATA_BYTES_PER_SECTOR;
use cdrom::cdtime::CdTime;
use cdrom::iso::IsoImage;
use cdvd_common::num::{U24Ext, binary_to_bcd};
use cdvd_core::disc::{
    BootTitle, DiscBackend, DiscError, DiscResult, DiscType, ReadMode, SubChannelQ, TOC_LEN,
    TrackDescriptor, TrackRange, TrackType, TrayStatus,
};
use std::fs::File;
use std::path::Path;

// 80 minutes of 75 frames per second
const MAX_CD_SECTORS: u32 = 80 * 60 * 75;

// DVD sectors start at physical sector number 0x30000
const DVD_PSN_OFFSET: u32 = 0x30000;

const CD_SYNC: [u8; 12] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

const CONTROL_ADR_DATA: u8 = 0x41;

/// Single-track ISO 9660 image. Raw sector formats are synthesized around the 2048 data bytes.
pub struct IsoDisc {
    image: IsoImage<File>,
    boot_title: Option<BootTitle>,
    disc_type: DiscType,
    tray: TrayStatus,
    buffer: Option<Vec<u8>>,
}

impl IsoDisc {
    /// # Errors
    ///
    /// Propagates any error from opening the image file.
    pub fn open<P: AsRef<Path>>(path: P) -> cdrom::CdRomResult<Self> {
        let mut image = IsoImage::open(path)?;

        let boot_title = match image.boot_executable() {
            Ok(boot) => boot.map(|boot| BootTitle { title_id: boot.title_id, ps2: boot.ps2 }),
            Err(err) => {
                log::warn!("Unable to read SYSTEM.CNF from image: {err}");
                None
            }
        };

        let disc_type = if image.sector_count() > MAX_CD_SECTORS {
            DiscType::Ps2Dvd
        } else {
            match &boot_title {
                Some(BootTitle { ps2: false, .. }) => DiscType::Ps1Cd,
                Some(BootTitle { ps2: true, .. }) => DiscType::Ps2Cd,
                None => DiscType::Unknown,
            }
        };

        log::info!(
            "Loaded {disc_type:?} image with {} sectors, boot title {:?}",
            image.sector_count(),
            boot_title.as_ref().map(|title| title.title_id.as_str())
        );

        Ok(Self { image, boot_title, disc_type, tray: TrayStatus::Closed, buffer: None })
    }

    #[must_use]
    pub fn is_dvd(&self) -> bool {
        self.disc_type == DiscType::Ps2Dvd
    }

    fn check_tray(&self) -> DiscResult<()> {
        match self.tray {
            TrayStatus::Closed => Ok(()),
            TrayStatus::Open => Err(DiscError::NoDisc),
        }
    }
}

fn data_offset(mode: ReadMode) -> usize {
    match mode {
        ReadMode::Raw2352 | ReadMode::Cdda2368 => 16,
        ReadMode::Mode2340 => 4,
        ReadMode::Mode2328 => 8,
        ReadMode::Data2048 => 0,
    }
}

impl DiscBackend for IsoDisc {
    fn disc_type(&mut self) -> DiscType {
        match self.tray {
            TrayStatus::Closed => self.disc_type,
            TrayStatus::Open => DiscType::NoDisc,
        }
    }

    fn track_count(&mut self) -> DiscResult<TrackRange> {
        self.check_tray()?;
        Ok(TrackRange { first: 1, last: 1 })
    }

    fn track_descriptor(&mut self, track: u8) -> DiscResult<TrackDescriptor> {
        self.check_tray()?;
        match track {
            0 => Ok(TrackDescriptor {
                track_type: TrackType::Data,
                start_lsn: self.image.sector_count(),
            }),
            1 => Ok(TrackDescriptor { track_type: TrackType::Data, start_lsn: 0 }),
            _ => Err(DiscError::InvalidTrack { track }),
        }
    }

    fn sub_channel(&mut self, lsn: u32) -> DiscResult<SubChannelQ> {
        self.check_tray()?;
        Ok(SubChannelQ {
            control_adr: CONTROL_ADR_DATA,
            track_number: 1,
            index_number: 1,
            relative_time: CdTime::from_frames(lsn),
            absolute_time: CdTime::from_lsn(lsn),
        })
    }

    fn table_of_contents(&mut self, buffer: &mut [u8; TOC_LEN]) -> DiscResult<()> {
        self.check_tray()?;
        if !self.is_dvd() {
            return Err(DiscError::Other("CD images carry no prebuilt table of contents".into()));
        }

        // Single-layer DVD physical format information
        buffer.fill(0);
        buffer[0] = 0x04;
        buffer[1] = 0x02;
        buffer[2] = 0xF2;
        buffer[4] = 0x86;
        buffer[5] = 0x72;
        buffer[17] = 0x03;

        let last_psn = self.image.sector_count() + DVD_PSN_OFFSET - 1;
        buffer[21] = last_psn.high_byte();
        buffer[22] = last_psn.mid_byte();
        buffer[23] = last_psn.low_byte();

        Ok(())
    }

    fn tray_open(&mut self) -> DiscResult<()> {
        self.tray = TrayStatus::Open;
        self.buffer = None;
        Ok(())
    }

    fn tray_close(&mut self) -> DiscResult<()> {
        self.tray = TrayStatus::Closed;
        Ok(())
    }

    fn tray_status(&mut self) -> TrayStatus {
        self.tray
    }

    fn read_track(&mut self, lsn: u32, mode: ReadMode) -> DiscResult<()> {
        self.check_tray()?;

        let mut data = [0; DATA_BYTES_PER_SECTOR];
        if let Err(err) = self.image.read_sector(lsn, &mut data) {
            log::debug!("Image read failed: {err}");
            self.buffer = None;
            return Err(DiscError::ReadFailed { lsn });
        }

        let mut sector = vec![0; mode.sector_len()];
        let offset = data_offset(mode);

        if offset == 16 {
            sector[..12].copy_from_slice(&CD_SYNC);
            sector[12..15].copy_from_slice(&CdTime::from_lsn(lsn).to_bcd());
            sector[15] = 0x01;
        } else if offset == 4 {
            sector[..3].copy_from_slice(&CdTime::from_lsn(lsn).to_bcd());
            sector[3] = 0x01;
        }

        sector[offset..offset + DATA_BYTES_PER_SECTOR].copy_from_slice(&data);
        self.buffer = Some(sector);

        Ok(())
    }

    fn last_buffer(&mut self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    fn boot_title(&mut self) -> Option<BootTitle> {
        self.boot_title.clone()
    }
}

/// Empty drive with the tray closed
#[derive(Debug, Default)]
pub struct NoDisc;

impl DiscBackend for NoDisc {
    fn disc_type(&mut self) -> DiscType {
        DiscType::NoDisc
    }

    fn track_count(&mut self) -> DiscResult<TrackRange> {
        Err(DiscError::NoDisc)
    }

    fn track_descriptor(&mut self, _track: u8) -> DiscResult<TrackDescriptor> {
        Err(DiscError::NoDisc)
    }

    fn sub_channel(&mut self, _lsn: u32) -> DiscResult<SubChannelQ> {
        Err(DiscError::NoDisc)
    }

    fn table_of_contents(&mut self, _buffer: &mut [u8; TOC_LEN]) -> DiscResult<()> {
        Err(DiscError::NoDisc)
    }

    fn tray_open(&mut self) -> DiscResult<()> {
        Err(DiscError::Tray)
    }

    fn tray_close(&mut self) -> DiscResult<()> {
        Ok(())
    }

    fn tray_status(&mut self) -> TrayStatus {
        TrayStatus::Closed
    }

    fn read_track(&mut self, _lsn: u32, _mode: ReadMode) -> DiscResult<()> {
        Err(DiscError::NoDisc)
    }

    fn last_buffer(&mut self) -> Option<&[u8]> {
        None
    }
}

#[must_use]
pub fn bcd_time(time: CdTime) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}",
        binary_to_bcd(time.minutes),
        binary_to_bcd(time.seconds),
        binary_to_bcd(time.frames)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn raw_mode_offsets() {
        assert_eq!(data_offset(ReadMode::Data2048), 0);
        assert_eq!(data_offset(ReadMode::Mode2340), 4);
        assert_eq!(data_offset(ReadMode::Mode2328), 8);
        assert_eq!(data_offset(ReadMode::Raw2352), 16);

        for mode in [ReadMode::Raw2352, ReadMode::Mode2340, ReadMode::Mode2328, ReadMode::Cdda2368]
        {
            assert!(data_offset(mode) + DATA_BYTES_PER_SECTOR <= mode.sector_len());
        }
    }

    #[test]
    fn empty_drive_reports_no_disc() {
        let mut disc = NoDisc;
        assert_eq!(disc.disc_type(), DiscType::NoDisc);
        assert!(disc.read_track(0, ReadMode::Data2048).is_err());
        assert!(disc.last_buffer().is_none());
    }

    #[test]
    fn bcd_time_format() {
        assert_eq!(bcd_time(CdTime::from_lsn(0)), "00:02:00");
    }
}
