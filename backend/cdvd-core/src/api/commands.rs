//! Drive command (NCMD) and sub-command (SCMD) decoding

mod drive;
mod sub;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveCommand {
    Sync,
    Nop,
    Standby,
    Stop,
    Pause,
    Seek,
    Read,
    ReadCdda,
    ReadDvd,
    GetToc,
    ReadKey,
    ReadXCdda,
    ChangeSpindleControl,
}

impl DriveCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Sync),
            0x01 => Some(Self::Nop),
            0x02 => Some(Self::Standby),
            0x03 => Some(Self::Stop),
            0x04 => Some(Self::Pause),
            0x05 => Some(Self::Seek),
            0x06 => Some(Self::Read),
            0x07 => Some(Self::ReadCdda),
            0x08 => Some(Self::ReadDvd),
            0x09 => Some(Self::GetToc),
            0x0C => Some(Self::ReadKey),
            0x0E => Some(Self::ReadXCdda),
            0x0F => Some(Self::ChangeSpindleControl),
            _ => None,
        }
    }

    /// Commands that arm a new drive event and so cannot start while one is pending. Stop and
    /// pause are excluded since they cancel the pending event.
    pub fn requires_idle_drive(self) -> bool {
        matches!(
            self,
            Self::Standby
                | Self::Seek
                | Self::Read
                | Self::ReadCdda
                | Self::ReadDvd
                | Self::ReadXCdda
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    ReadSubQ,
    Mechacon,
    TrayRequestState,
    TrayControl,
    ReadClock,
    WriteClock,
    ReadNvm,
    WriteNvm,
    PowerOff,
    ReadILinkId,
    WriteILinkId,
    AudioDigitalOut,
    ForbidDvdPlayer,
    AutoAdjustControl,
    ReadModelNumber,
    WriteModelNumber,
    BootCertify,
    CancelPowerOff,
    BlueLedControl,
    Remote2Read,
    Remote2_6,
    ReadWakeUpTime,
    RcBypassControl,
    NoticeGameStart,
    SetMediumRemoval,
    GetMediumRemoval,
    ReadRegionParams,
    ReadMac,
    WriteMac,
    WriteRegionParams,
    OpenConfig,
    ReadConfig,
    WriteConfig,
    CloseConfig,
    AuthSelectData(u8),
    AuthAcknowledge(u8),
    AuthChallenge0,
    AuthChallenge1,
    FinalizeHeader(u8),
    MgWriteData,
    MgReadData,
    MgWriteHeaderStart,
    MgReadBitLength,
    MgWriteDataInLength,
    MgWriteDataOutLength,
    MgReadBitKey0,
    MgReadBitKey1,
    MgReadContentKey0,
    MgReadContentKey1,
}

impl SubCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let command = match byte {
            0x02 => Self::ReadSubQ,
            0x03 => Self::Mechacon,
            0x05 => Self::TrayRequestState,
            0x06 => Self::TrayControl,
            0x08 => Self::ReadClock,
            0x09 => Self::WriteClock,
            0x0A => Self::ReadNvm,
            0x0B => Self::WriteNvm,
            0x0F => Self::PowerOff,
            0x12 => Self::ReadILinkId,
            0x13 => Self::WriteILinkId,
            0x14 => Self::AudioDigitalOut,
            0x15 => Self::ForbidDvdPlayer,
            0x16 => Self::AutoAdjustControl,
            0x17 => Self::ReadModelNumber,
            0x18 => Self::WriteModelNumber,
            0x1A => Self::BootCertify,
            0x1B => Self::CancelPowerOff,
            0x1C => Self::BlueLedControl,
            0x1E => Self::Remote2Read,
            0x20 => Self::Remote2_6,
            0x22 => Self::ReadWakeUpTime,
            0x24 => Self::RcBypassControl,
            0x29 => Self::NoticeGameStart,
            0x31 => Self::SetMediumRemoval,
            0x32 => Self::GetMediumRemoval,
            0x36 => Self::ReadRegionParams,
            0x37 => Self::ReadMac,
            0x38 => Self::WriteMac,
            0x3E => Self::WriteRegionParams,
            0x40 => Self::OpenConfig,
            0x41 => Self::ReadConfig,
            0x42 => Self::WriteConfig,
            0x43 => Self::CloseConfig,
            0x80 | 0x81 => Self::AuthSelectData(byte),
            0x82 | 0x83 | 0x86 | 0x87 => Self::AuthAcknowledge(byte),
            0x84 => Self::AuthChallenge0,
            0x85 => Self::AuthChallenge1,
            0x88 | 0x8F => Self::FinalizeHeader(byte),
            0x8D => Self::MgWriteData,
            0x8E => Self::MgReadData,
            0x90 => Self::MgWriteHeaderStart,
            0x91 => Self::MgReadBitLength,
            0x92 => Self::MgWriteDataInLength,
            0x93 => Self::MgWriteDataOutLength,
            0x94 => Self::MgReadBitKey0,
            0x95 => Self::MgReadBitKey1,
            0x96 => Self::MgReadContentKey0,
            0x97 => Self::MgReadContentKey1,
            _ => return None,
        };

        Some(command)
    }
}
