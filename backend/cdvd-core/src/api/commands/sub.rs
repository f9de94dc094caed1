//! Synchronous sub-command (SCMD) handlers. Every handler sets the result size exactly once and
//! places its status in the first result byte.

use super::SubCommand;
use crate::api::CdvdController;
use crate::disc::DiscBackend;
use crate::magicgate::{MG_CHUNK_LEN, MG_KEY_LEN, MagicGateError, ZONE_NAMES};
use crate::nvm::{
    CONFIG_BLOCK_LEN, ConfigSessionError, NVM_FIELD_LEN, NvmError, NvmField, NvmResult,
};

// Highest addressable 16-bit word in the NVM blob
const NVM_WORD_COUNT: u16 = 512;

const RENEWAL_DATE: [u8; 6] = [0x00, 0x04, 0x12, 0x10, 0x01, 0x30];

const REMOTE2_READ: [u8; 5] = [0x00, 0x14, 0x00, 0x00, 0x00];
const REMOTE2_6: [u8; 3] = [0x00, 0x01, 0x00];

const AUTH_CHALLENGE_0: [u8; 13] =
    [0x00, 0x21, 0xDC, 0x31, 0x96, 0xCE, 0x72, 0xE0, 0xC8, 0x69, 0xDA, 0x34, 0x9B];
const AUTH_CHALLENGE_1: [u8; 13] =
    [0x00, 0xEB, 0x01, 0xC7, 0xA9, 0x3F, 0x9C, 0x5B, 0x19, 0x31, 0xA0, 0xB3, 0xA3];

const FORBID_DVD_PLAYER_RESULT: u8 = 5;
const BOOT_CERTIFY_RESULT: u8 = 1;

fn nvm_status(result: NvmResult<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err @ NvmError::NoLayout { .. }) => {
            log::error!("NVM access failed: {err}");
            1
        }
        Err(err) => {
            log::error!("NVM access failed: {err}");
            0x80
        }
    }
}

fn config_status(result: Result<(), ConfigSessionError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(
            err @ (ConfigSessionError::WrongMode(_)
            | ConfigSessionError::PastBlockCount { .. }
            | ConfigSessionError::Nvm(NvmError::NoLayout { .. })),
        ) => {
            log::error!("Config access failed: {err}");
            1
        }
        Err(err) => {
            log::error!("Config access failed: {err}");
            0x80
        }
    }
}

fn magic_gate_status(result: Result<(), MagicGateError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("MagicGate: {err}");
            0x80
        }
    }
}

impl CdvdController {
    pub(crate) fn execute_sub_command<D: DiscBackend>(&mut self, code: u8, disc: &mut D) {
        let command = SubCommand::from_byte(code);

        log::trace!("SCMD {code:02X} ({command:?}) with params {:02X?}", self.params.as_slice());

        self.last_scmd = code;

        match command {
            Some(command) => self.dispatch_sub_command(command, disc),
            None => {
                log::warn!("Unknown SCMD {code:02X}; returning success");
                self.set_status_result(0);
            }
        }

        log::trace!("SCMD {code:02X} result: {:02X?}", self.results.as_slice());

        self.params.clear();
    }

    fn set_status_result(&mut self, status: u8) {
        self.results.set_size(1);
        self.results[0] = status;
    }

    fn set_fixed_result(&mut self, bytes: &[u8]) {
        self.results.set_size(bytes.len());
        self.results.write(0, bytes);
    }

    // Status byte followed by the 8 bytes of an NVM field
    fn read_field_result(&mut self, field: NvmField, offset: usize) {
        let mut bytes = [0; NVM_FIELD_LEN];
        let status = nvm_status(self.nvm.read_field(field, offset, &mut bytes));

        self.results.set_size(1 + NVM_FIELD_LEN);
        self.results[0] = status;
        self.results.write(1, &bytes);
    }

    fn write_field_from_params(&mut self, field: NvmField, offset: usize, param_start: usize) {
        let data: [u8; NVM_FIELD_LEN] = self.params.array(param_start);
        let status = nvm_status(self.nvm.write_field(field, offset, &data));
        self.set_status_result(status);
    }

    fn key_half_result(&mut self, key: [u8; MG_KEY_LEN], upper: bool) {
        let half = if upper { &key[MG_KEY_LEN / 2..] } else { &key[..MG_KEY_LEN / 2] };

        self.results.set_size(1 + MG_KEY_LEN / 2);
        self.results[0] = 0;
        self.results.write(1, half);
    }

    fn dispatch_sub_command<D: DiscBackend>(&mut self, command: SubCommand, disc: &mut D) {
        match command {
            SubCommand::ReadSubQ => self.read_sub_q(disc),
            SubCommand::Mechacon => self.mechacon(),
            SubCommand::TrayRequestState => self.set_status_result(0),
            SubCommand::TrayControl => {
                let status = if self.params.get(0) == 0 {
                    self.open_tray(disc)
                } else {
                    self.close_tray(disc)
                };
                self.set_status_result(status);
            }
            SubCommand::ReadClock => {
                let bcd = self.rtc.to_bcd_result();
                self.set_fixed_result(&bcd);
            }
            SubCommand::WriteClock => {
                // Clock fields are the last 7 parameters written
                let start = self.params.len().saturating_sub(7);
                self.rtc.write_bcd(self.params.array(start));
                self.set_status_result(0);
            }
            SubCommand::ReadNvm => self.read_nvm_word(),
            SubCommand::WriteNvm => self.write_nvm_word(),
            SubCommand::PowerOff
            | SubCommand::AudioDigitalOut
            | SubCommand::AutoAdjustControl
            | SubCommand::CancelPowerOff
            | SubCommand::BlueLedControl
            | SubCommand::RcBypassControl
            | SubCommand::NoticeGameStart
            | SubCommand::SetMediumRemoval => {
                log::debug!("{command:?} with params {:02X?}", self.params.as_slice());
                self.set_status_result(0);
            }
            SubCommand::ReadILinkId => self.read_field_result(NvmField::ILinkId, 0),
            SubCommand::WriteILinkId => self.write_field_from_params(NvmField::ILinkId, 0, 0),
            SubCommand::ForbidDvdPlayer => self.set_status_result(FORBID_DVD_PLAYER_RESULT),
            SubCommand::ReadModelNumber => {
                let part = self.params.get(0).into();
                self.read_field_result(NvmField::ModelNumber, part);
            }
            SubCommand::WriteModelNumber => {
                let part = self.params.get(0).into();
                self.write_field_from_params(NvmField::ModelNumber, part, 1);
            }
            SubCommand::BootCertify => {
                log::debug!("Boot certify: {:02X?}", self.params.array::<4>(0));
                self.set_status_result(BOOT_CERTIFY_RESULT);
            }
            SubCommand::Remote2Read => self.set_fixed_result(&REMOTE2_READ),
            SubCommand::Remote2_6 => self.set_fixed_result(&REMOTE2_6),
            SubCommand::ReadWakeUpTime => self.set_fixed_result(&[0; 10]),
            SubCommand::GetMediumRemoval => self.set_fixed_result(&[0; 2]),
            SubCommand::ReadRegionParams => self.read_region_params(),
            SubCommand::ReadMac => self.read_field_result(NvmField::Mac, 0),
            SubCommand::WriteMac => self.write_field_from_params(NvmField::Mac, 0, 0),
            SubCommand::WriteRegionParams => {
                self.write_field_from_params(NvmField::RegionParams, 0, 2);
            }
            SubCommand::OpenConfig => {
                self.config_session.open(
                    self.params.get(0),
                    self.params.get(1),
                    self.params.get(2),
                );
                self.set_status_result(0);
            }
            SubCommand::ReadConfig => {
                let mut block = [0; CONFIG_BLOCK_LEN];
                let result = self.config_session.read_block(&self.nvm, &mut block);

                self.results.set_size(CONFIG_BLOCK_LEN);
                if let Err(err) = result {
                    log::error!("Config read failed: {err}");
                    block = [0; CONFIG_BLOCK_LEN];
                    block[0] = 0x80;
                }
                self.results.write(0, &block);
            }
            SubCommand::WriteConfig => {
                let block: [u8; CONFIG_BLOCK_LEN] = self.params.array(0);
                let status = config_status(self.config_session.write_block(&mut self.nvm, &block));
                self.set_status_result(status);
            }
            SubCommand::CloseConfig => {
                self.config_session.close();
                self.set_status_result(0);
            }
            SubCommand::AuthSelectData(code) => {
                log::debug!("Auth data type select {code:02X}");
                self.magic_gate.select_data();
                self.set_status_result(0);
            }
            SubCommand::AuthAcknowledge(code) => {
                log::debug!("Auth acknowledge {code:02X}");
                self.set_status_result(0);
            }
            SubCommand::AuthChallenge0 => self.set_fixed_result(&AUTH_CHALLENGE_0),
            SubCommand::AuthChallenge1 => self.set_fixed_result(&AUTH_CHALLENGE_1),
            _ => self.magic_gate_command(command),
        }
    }

    fn read_sub_q<D: DiscBackend>(&mut self, disc: &mut D) {
        self.results.set_size(11);

        match disc.sub_channel(self.reader.sector()) {
            Ok(q) => {
                self.results[0] = 0;
                self.results[1] = q.control_adr;
                self.results[2] = q.track_number;
                self.results[3] = q.index_number;
                self.results.write(4, &q.relative_time.to_bcd());
                self.results[7] = 0;
                self.results.write(8, &q.absolute_time.to_bcd());
            }
            Err(err) => {
                log::error!("Unable to read sub-channel Q: {err}");
                self.results.write(0, &[0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
            }
        }
    }

    fn mechacon(&mut self) {
        let sub_op = self.params.get(0);

        match sub_op {
            0x00 => {
                let version = self.nvm.mecha_version();
                self.set_fixed_result(&version);
            }
            0x44 => self.write_field_from_params(NvmField::ConsoleId, 0, 1),
            0x45 => self.read_field_result(NvmField::ConsoleId, 0),
            0xFD => self.set_fixed_result(&RENEWAL_DATE),
            _ => {
                log::warn!("Unknown mechacon sub-operation {sub_op:02X}");
                self.set_status_result(0x80);
            }
        }
    }

    fn nvm_word_address(&self) -> u16 {
        (u16::from(self.params.get(0)) << 8) | u16::from(self.params.get(1))
    }

    fn read_nvm_word(&mut self) {
        let address = self.nvm_word_address();
        if address >= NVM_WORD_COUNT {
            log::error!("NVM word read past end: {address:03X}");
            self.set_status_result(0xFF);
            return;
        }

        let mut word = [0; 2];
        let status = nvm_status(self.nvm.read_raw(usize::from(address) * 2, &mut word));

        self.results.set_size(3);
        self.results[0] = status;
        self.results[1] = word[1];
        self.results[2] = word[0];
    }

    fn write_nvm_word(&mut self) {
        let address = self.nvm_word_address();
        if address >= NVM_WORD_COUNT {
            log::error!("NVM word write past end: {address:03X}");
            self.set_status_result(0xFF);
            return;
        }

        let word = [self.params.get(3), self.params.get(2)];
        let status = nvm_status(self.nvm.write_raw(usize::from(address) * 2, &word));
        self.set_status_result(status);
    }

    fn read_region_params(&mut self) {
        let mecha_version = self.nvm.mecha_version();
        let mut region_params = [0; NVM_FIELD_LEN];
        let status =
            nvm_status(self.nvm.read_field(NvmField::RegionParams, 0, &mut region_params));

        self.results.set_size(15);
        self.results.write(1, &mecha_version);
        self.results.write(3, &region_params);

        let zone = mecha_version[0];
        log::info!(
            "Region params: zone={}, params={:02X?}",
            ZONE_NAMES.get(usize::from(zone)).copied().unwrap_or("unknown"),
            region_params
        );

        self.results[0] = status;
        self.results[1] = 1_u8.checked_shl(zone.into()).unwrap_or(0);
        self.results[2] = 0;
        self.results.write(11, &[0; 4]);
    }

    fn magic_gate_command(&mut self, command: SubCommand) {
        match command {
            SubCommand::FinalizeHeader(code) => {
                log::debug!("MagicGate finalize header ({code:02X})");
                let status = magic_gate_status(self.magic_gate.finalize_header());
                self.set_status_result(status);
            }
            SubCommand::MgWriteData => {
                let status = magic_gate_status(self.magic_gate.append(self.params.as_slice()));
                self.set_status_result(status);
            }
            SubCommand::MgReadData => {
                let mut chunk = [0; MG_CHUNK_LEN];
                let len = self.magic_gate.read_data(&mut chunk);
                self.set_fixed_result(&chunk[..len]);
            }
            SubCommand::MgWriteHeaderStart => {
                let capacity = self.params.u16_le(1);
                log::debug!(
                    "MagicGate header start: hcode={:02X}, size={capacity:X}, cnum={:02X}, a2={:02X}",
                    self.params.get(0),
                    self.params.get(3),
                    self.params.get(4)
                );
                self.magic_gate.begin_header(capacity);
                self.set_status_result(0);
            }
            SubCommand::MgReadBitLength => {
                let (status, length) = match self.magic_gate.read_bit_length() {
                    Ok(length) => (0, length),
                    Err(err) => {
                        log::error!("MagicGate: {err}");
                        (0x80, 0)
                    }
                };
                let [lo, hi] = length.to_le_bytes();
                self.set_fixed_result(&[status, lo, hi]);
            }
            SubCommand::MgWriteDataInLength => {
                let capacity = self.params.u16_le(0);
                log::debug!("MagicGate data in: size={capacity:X}");
                self.magic_gate.begin_data(capacity);
                self.set_status_result(0);
            }
            SubCommand::MgWriteDataOutLength => {
                let length = self.params.u16_le(0);
                let status = magic_gate_status(self.magic_gate.set_data_out_length(length));
                self.set_status_result(status);
            }
            SubCommand::MgReadBitKey0 => self.key_half_result(*self.magic_gate.bit_key(), false),
            SubCommand::MgReadBitKey1 => self.key_half_result(*self.magic_gate.bit_key(), true),
            SubCommand::MgReadContentKey0 => {
                self.key_half_result(*self.magic_gate.content_key(), false);
            }
            SubCommand::MgReadContentKey1 => {
                self.key_half_result(*self.magic_gate.content_key(), true);
            }
            _ => {
                log::warn!("{command:?} is not a MagicGate command");
                self.set_status_result(0);
            }
        }
    }
}
