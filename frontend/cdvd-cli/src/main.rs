mod disc;
mod save;

use crate::disc::{IsoDisc, NoDisc, bcd_time};
use crate::save::FsSaveWriter;
use anyhow::{Context, anyhow};
use cdrom::cdtime::CdTime;
use cdvd_common::frontend::TimingMode;
use cdvd_config::{DEFAULT_BIOS_VERSION, RtcInitMode};
use cdvd_core::api::InterruptCause;
use cdvd_core::disc::DiscBackend;
use cdvd_core::scheduler::{self, IOP_CLOCK_HZ};
use cdvd_core::{CdvdController, CdvdEmulatorConfig, DmaTarget, HostBus};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::{Path, PathBuf};

const REG_NCMD: u8 = 0x04;
const REG_NCMD_PARAM: u8 = 0x05;
const REG_ERROR: u8 = 0x06;
const REG_INTERRUPT: u8 = 0x08;
const REG_SCMD: u8 = 0x16;
const REG_SCMD_PARAM: u8 = 0x17;
const REG_SCMD_STATUS: u8 = 0x17;
const REG_SCMD_RESULT: u8 = 0x18;

const SCMD_RESULT_EMPTY: u8 = 0x40;

const NCMD_READ: u8 = 0x06;
const NCMD_READ_DVD: u8 = 0x08;

const SCMD_MECHACON: u8 = 0x03;
const SCMD_READ_CLOCK: u8 = 0x08;
const SCMD_READ_ILINK_ID: u8 = 0x12;
const SCMD_READ_MODEL_NUMBER: u8 = 0x17;
const SCMD_READ_MAC: u8 = 0x37;

const MECHACON_READ_CONSOLE_ID: u8 = 0x45;

// Largest block any read mode transfers
const MAX_BLOCK_SIZE: usize = 2368;

// Give up if a read has not finished within a minute of emulated time
const READ_CYCLE_LIMIT: u64 = 60 * IOP_CLOCK_HZ;

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|err| format!("Invalid hex value '{s}': {err}"))
}

#[derive(Parser)]
struct Args {
    /// BIOS version in hex as major/minor bytes, e.g. 0x0200 for 2.00
    #[arg(long, value_parser = parse_hex, default_value_t = DEFAULT_BIOS_VERSION)]
    bios_version: u32,

    /// Video timing mode, determines how many frames make up one clock second
    #[arg(long, value_enum, default_value_t)]
    timing_mode: TimingMode,

    /// How to seed the real-time clock
    #[arg(long, value_enum, default_value_t)]
    rtc_init: RtcInitMode,

    /// Base path for the NVM and mecha version files; extensions are replaced
    #[arg(long, default_value = "cdvd")]
    save_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read sectors from an ISO image through the drive command interface
    Read {
        /// ISO image path
        #[arg(long)]
        image: PathBuf,

        /// First sector to read
        #[arg(long, default_value_t = 0)]
        sector: u32,

        /// Number of sectors to read
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Spindle control byte (1 = 1x, 2 = 2x, 3 = 4x, 4 = 12x, anything else = 24x)
        #[arg(long, default_value_t = 0x05)]
        speed: u8,

        /// Number of transferred bytes to print
        #[arg(long, default_value_t = 64)]
        preview_len: usize,
    },
    /// Dump the console identifiers stored in NVM
    Nvm,
    /// Print the virtual real-time clock
    Rtc,
    /// Derive the disc key for a boot title
    TitleKey {
        /// Title identifier, e.g. SLUS_200.62
        #[arg(long)]
        title: String,

        /// Context code passed with the read-key command
        #[arg(long, default_value_t = 0)]
        context: u32,
    },
}

/// Flat I/O processor memory receiving DMA transfers from address 0
struct MemoryHost {
    memory: Vec<u8>,
    next_address: u32,
    interrupt_count: u32,
    transfers_complete: u32,
}

impl MemoryHost {
    fn new(len: usize) -> Self {
        Self { memory: vec![0; len], next_address: 0, interrupt_count: 0, transfers_complete: 0 }
    }

    fn transferred(&self) -> &[u8] {
        &self.memory[..self.next_address as usize]
    }
}

impl HostBus for MemoryHost {
    fn raise_interrupt(&mut self) {
        self.interrupt_count += 1;
    }

    fn dma_target(&mut self) -> DmaTarget {
        DmaTarget {
            address: self.next_address,
            remaining_bytes: (self.memory.len() as u32).saturating_sub(self.next_address),
        }
    }

    fn dma_write(&mut self, address: u32, bytes: &[u8]) {
        let start = address as usize;
        let Some(dest) = self.memory.get_mut(start..start + bytes.len()) else {
            log::error!("DMA write of {} bytes at {address:08X} is out of bounds", bytes.len());
            return;
        };

        dest.copy_from_slice(bytes);
        self.next_address = address + bytes.len() as u32;
    }

    fn dma_complete(&mut self) {
        self.transfers_complete += 1;
    }
}

fn send_ncmd<D: DiscBackend, H: HostBus>(
    cdvd: &mut CdvdController,
    code: u8,
    params: &[u8],
    disc: &mut D,
    host: &mut H,
) {
    for &param in params {
        cdvd.write_register(REG_NCMD_PARAM, param, disc, host);
    }
    cdvd.write_register(REG_NCMD, code, disc, host);
}

fn send_scmd<D: DiscBackend, H: HostBus>(
    cdvd: &mut CdvdController,
    code: u8,
    params: &[u8],
    disc: &mut D,
    host: &mut H,
) -> Vec<u8> {
    for &param in params {
        cdvd.write_register(REG_SCMD_PARAM, param, disc, host);
    }
    cdvd.write_register(REG_SCMD, code, disc, host);

    let mut results = Vec::new();
    while cdvd.read_register(REG_SCMD_STATUS, disc) & SCMD_RESULT_EMPTY == 0 {
        results.push(cdvd.read_register(REG_SCMD_RESULT, disc));
    }
    results
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect::<Vec<_>>().join(" ")
}

fn create_controller(args: &Args) -> anyhow::Result<(CdvdController, FsSaveWriter)> {
    let config = CdvdEmulatorConfig {
        bios_version: args.bios_version,
        timing_mode: args.timing_mode,
        rtc_init: args.rtc_init,
    };

    let mut save_writer = FsSaveWriter::new(args.save_path.clone());
    let cdvd = CdvdController::create(config, &mut save_writer)
        .with_context(|| format!("Unable to create controller with config {config:?}"))?;

    Ok((cdvd, save_writer))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let (mut cdvd, mut save_writer) = create_controller(&args)?;

    match &args.command {
        Command::Read { image, sector, count, speed, preview_len } => {
            run_read(&mut cdvd, image, *sector, *count, *speed, *preview_len)?;
        }
        Command::Nvm => run_nvm(&mut cdvd),
        Command::Rtc => run_rtc(&mut cdvd),
        Command::TitleKey { title, context } => {
            let key = cdvd_core::derive_title_key(title, *context)
                .with_context(|| format!("Unable to derive key for '{title}'"))?;
            println!("{}", hex_string(&key));
        }
    }

    cdvd.flush(&mut save_writer).context("Unable to write NVM contents")?;

    Ok(())
}

fn run_read(
    cdvd: &mut CdvdController,
    image: &Path,
    sector: u32,
    count: u32,
    speed: u8,
    preview_len: usize,
) -> anyhow::Result<()> {
    let mut disc = IsoDisc::open(image)
        .with_context(|| format!("Unable to open image '{}'", image.display()))?;
    let mut host = MemoryHost::new(count as usize * MAX_BLOCK_SIZE);

    let code = if disc.is_dvd() { NCMD_READ_DVD } else { NCMD_READ };

    let mut params = Vec::with_capacity(11);
    params.extend(sector.to_le_bytes());
    params.extend(count.to_le_bytes());
    params.extend([1, speed, 0]);

    let start_cycles = cdvd.cycles();
    send_ncmd(cdvd, code, &params, &mut disc, &mut host);

    while let Some(cycles) = cdvd.cycles_until_event() {
        if cdvd.cycles() - start_cycles > READ_CYCLE_LIMIT {
            return Err(anyhow!("Read did not complete within {READ_CYCLE_LIMIT} cycles"));
        }
        cdvd.tick(cycles, &mut disc, &mut host);
    }

    let elapsed = cdvd.cycles() - start_cycles;
    let error = cdvd.read_register(REG_ERROR, &mut disc);
    let interrupt_cause = cdvd.read_register(REG_INTERRUPT, &mut disc);

    println!(
        "Read {count} sector(s) from {sector} in {elapsed} cycles ({} us)",
        scheduler::cycles_to_micros(elapsed)
    );
    println!(
        "Error {error:02X}, interrupt cause {interrupt_cause:02X}, {} interrupt(s), head at {}",
        host.interrupt_count,
        bcd_time(CdTime::from_lsn(cdvd.sector()))
    );

    if interrupt_cause & InterruptCause::ERROR != 0 || host.transfers_complete == 0 {
        return Err(anyhow!("Read failed with error {error:02X}"));
    }

    let transferred = host.transferred();
    println!("Transferred {} bytes", transferred.len());
    for line in transferred[..transferred.len().min(preview_len)].chunks(16) {
        println!("  {}", hex_string(line));
    }

    Ok(())
}

fn run_nvm(cdvd: &mut CdvdController) {
    let mut disc = NoDisc;
    let mut host = MemoryHost::new(0);

    let console_id =
        send_scmd(cdvd, SCMD_MECHACON, &[MECHACON_READ_CONSOLE_ID], &mut disc, &mut host);
    let ilink_id = send_scmd(cdvd, SCMD_READ_ILINK_ID, &[], &mut disc, &mut host);
    let model_low = send_scmd(cdvd, SCMD_READ_MODEL_NUMBER, &[0], &mut disc, &mut host);
    let model_high = send_scmd(cdvd, SCMD_READ_MODEL_NUMBER, &[8], &mut disc, &mut host);
    let mac = send_scmd(cdvd, SCMD_READ_MAC, &[], &mut disc, &mut host);

    println!("Console ID:   {}", hex_string(&console_id));
    println!("iLink ID:     {}", hex_string(&ilink_id));
    println!("Model number: {} / {}", hex_string(&model_low), hex_string(&model_high));
    println!("MAC:          {}", hex_string(&mac));
}

fn run_rtc(cdvd: &mut CdvdController) {
    let mut disc = NoDisc;
    let mut host = MemoryHost::new(0);

    let result = send_scmd(cdvd, SCMD_READ_CLOCK, &[], &mut disc, &mut host);
    let [status, second, minute, hour, _, day, month, year] = result[..] else {
        log::error!("Unexpected read-clock result {result:02X?}");
        return;
    };

    println!(
        "20{year:02X}-{:02X}-{day:02X} {hour:02X}:{minute:02X}:{second:02X} (status {status:02X})",
        month & 0x7F
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn parses_hex_bios_versions() {
        assert_eq!(parse_hex("0x0200"), Ok(0x0200));
        assert_eq!(parse_hex("170"), Ok(0x170));
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn memory_host_tracks_transfers() {
        let mut host = MemoryHost::new(8);
        let target = host.dma_target();
        assert_eq!(target, DmaTarget { address: 0, remaining_bytes: 8 });

        host.dma_write(target.address, &[1, 2, 3]);
        assert_eq!(host.dma_target(), DmaTarget { address: 3, remaining_bytes: 5 });
        assert_eq!(host.transferred(), &[1, 2, 3]);

        host.dma_write(6, &[0; 4]);
        assert_eq!(host.transferred(), &[1, 2, 3]);
    }

    #[test]
    fn clock_read_through_sub_command_interface() {
        let config = CdvdEmulatorConfig { rtc_init: RtcInitMode::FixedDate, ..Default::default() };
        let dir = std::env::temp_dir().join(format!("cdvd-cli-main-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut save_writer = FsSaveWriter::new(dir.join("console"));
        let mut cdvd = CdvdController::create(config, &mut save_writer).unwrap();

        let mut host = MemoryHost::new(0);
        let result = send_scmd(&mut cdvd, SCMD_READ_CLOCK, &[], &mut NoDisc, &mut host);
        assert_eq!(result, cdvd.rtc().to_bcd_result());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn args_parse_subcommands() {
        let args = Args::try_parse_from([
            "cdvd-cli",
            "--bios-version",
            "0x0170",
            "--timing-mode",
            "pal",
            "read",
            "--image",
            "game.iso",
            "--count",
            "4",
        ])
        .unwrap();

        assert_eq!(args.bios_version, 0x0170);
        assert_eq!(args.timing_mode, TimingMode::Pal);
        assert!(matches!(args.command, Command::Read { count: 4, sector: 0, .. }));
    }
}
