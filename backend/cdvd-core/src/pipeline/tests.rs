use super::*;
use crate::disc::DiscType;
use crate::testutil::{MockDisc, MockHost};
use test_log::test;

fn params(bytes: &[u8]) -> ParamBuffer {
    let mut params = ParamBuffer::new();
    for &byte in bytes {
        params.push(byte);
    }
    params
}

fn read_request(kind: ReadKind, sector: u32, count: u32, retry: u8) -> ReadRequest {
    let mut bytes = Vec::new();
    bytes.extend(sector.to_le_bytes());
    bytes.extend(count.to_le_bytes());
    bytes.extend([retry, 0x03, 0x00]);
    ReadRequest::from_params(kind, &params(&bytes))
}

fn run_event(reader: &mut SectorReader, disc: &mut MockDisc, host: &mut MockHost) -> ReadProgress {
    reader.on_event(disc, host, DecryptSettings::default(), 0)
}

#[test]
fn request_decoding() {
    let request = ReadRequest::from_params(
        ReadKind::Data,
        &params(&[0x10, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01]),
    );
    assert_eq!(request.sector, 0x10);
    assert_eq!(request.count, 2);
    assert_eq!(request.retry_limit, 256);
    assert_eq!(request.spindle_control, 0x04);
    assert_eq!(
        request.profile,
        ReadProfile { block_size: 2328, read_mode: ReadMode::Mode2328, speed: 12, media: MediaKind::Cd }
    );

    let profile = ReadProfile::for_read(ReadKind::Data, 0x00, 0x02);
    assert_eq!((profile.block_size, profile.read_mode, profile.speed), (2340, ReadMode::Mode2340, 24));

    let profile = ReadProfile::for_read(ReadKind::Data, 0x01, 0x07);
    assert_eq!((profile.block_size, profile.read_mode, profile.speed), (2048, ReadMode::Data2048, 1));

    let profile = ReadProfile::for_read(ReadKind::Cdda, 0x02, 0x01);
    assert_eq!((profile.block_size, profile.read_mode, profile.speed), (2368, ReadMode::Cdda2368, 2));

    let profile = ReadProfile::for_read(ReadKind::Cdda, 0x02, 0x00);
    assert_eq!((profile.block_size, profile.read_mode), (2352, ReadMode::Raw2352));

    assert_eq!(ReadProfile::for_read(ReadKind::RawDvd, 0x01, 0x02), ReadProfile::default());
}

#[test]
fn single_sector_read() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Cd);
    let mut host = MockHost::default();

    let delay = reader.start_read(read_request(ReadKind::Data, 0, 1, 1), &mut disc);
    assert_eq!(delay, SPIN_UP_CYCLES);
    assert_eq!(reader.state(), ReadState::Seeking);
    assert!(disc.read_attempts.is_empty());

    let read_time = scheduler::read_time(2048, 4, MediaKind::Cd);
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::SeekComplete(read_time));
    assert_eq!(disc.read_attempts, vec![0]);

    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Complete);
    assert_eq!(reader.state(), ReadState::Idle);
    assert_eq!(reader.sector(), 1);

    assert_eq!(host.writes.len(), 1);
    let (address, bytes) = &host.writes[0];
    assert_eq!(*address, 0x1000);
    assert_eq!(bytes.len(), 2048);
    assert!(bytes.iter().enumerate().all(|(i, &b)| b == MockDisc::sector_byte(0, i)));
}

#[test]
fn multi_sector_read() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Cd);
    let mut host = MockHost::default();

    reader.start_read(read_request(ReadKind::Data, 20, 3, 1), &mut disc);
    assert!(matches!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::SeekComplete(_)));
    assert!(matches!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Continue(_)));
    assert_eq!(reader.sectors_remaining(), 2);
    assert!(matches!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Continue(_)));
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Complete);

    assert_eq!(disc.read_attempts, vec![20, 21, 22]);
    assert_eq!(
        host.writes.iter().map(|(address, _)| *address).collect::<Vec<_>>(),
        vec![0x1000, 0x1800, 0x2000]
    );
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Idle);
}

#[test]
fn retries_exhausted() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Cd);
    disc.fail_reads = true;
    let mut host = MockHost::default();

    reader.start_read(read_request(ReadKind::Data, 7, 1, 3), &mut disc);

    let mut events = 0;
    let result = loop {
        events += 1;
        match run_event(&mut reader, &mut disc, &mut host) {
            ReadProgress::SeekComplete(_) | ReadProgress::Continue(_) => {}
            progress => break progress,
        }
    };

    assert_eq!(result, ReadProgress::Failed);
    assert_eq!(disc.read_attempts, vec![7; 4]);
    assert_eq!(reader.retry_count(), 3);
    assert_eq!(events, 5);
    assert!(host.writes.is_empty());
    assert_eq!(reader.state(), ReadState::Idle);
}

#[test]
fn retry_recovers() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Cd);
    disc.fail_reads = true;
    let mut host = MockHost::default();

    reader.start_read(read_request(ReadKind::Data, 7, 1, 3), &mut disc);
    run_event(&mut reader, &mut disc, &mut host);

    disc.fail_reads = false;
    assert!(matches!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Continue(_)));
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Complete);
    assert_eq!(disc.read_attempts, vec![7, 7]);
    assert_eq!(host.writes.len(), 1);
}

#[test]
fn seek_costs() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Dvd);

    assert_eq!(reader.begin_positioning(100), SPIN_UP_CYCLES);
    reader.complete_positioning();
    assert_eq!(reader.sector(), 100);
    assert!(reader.is_spinning());

    let read_time = reader.profile().read_time();
    assert_eq!(reader.begin_positioning(103), 3 * read_time);
    reader.complete_positioning();
    assert_eq!(reader.begin_positioning(103 + CONTIGUOUS_SEEK_THRESHOLD), AVERAGE_SEEK_CYCLES);
    reader.complete_positioning();

    // Reading from the current sector skips the seek phase entirely
    let delay = reader.start_read(read_request(ReadKind::Data, 112, 1, 1), &mut disc);
    assert_eq!(delay, scheduler::read_time(2048, 4, MediaKind::Cd));
    assert_eq!(reader.state(), ReadState::ReadPending);
    assert_eq!(disc.read_attempts, vec![112]);

    reader.stop();
    assert!(!reader.is_spinning());
    assert_eq!(reader.sector(), 0);
    assert_eq!(reader.state(), ReadState::Idle);
}

#[test]
fn dma_stall_delays_transfer() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Cd);
    let mut host = MockHost { dma_remaining: 1024, ..MockHost::default() };

    reader.start_read(read_request(ReadKind::Data, 0, 1, 1), &mut disc);
    run_event(&mut reader, &mut disc, &mut host);

    let read_time = reader.profile().read_time();
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Continue(read_time / 4));
    assert!(host.writes.is_empty());

    host.dma_remaining = 4096;
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Complete);
    assert_eq!(host.writes.len(), 1);
}

#[test]
fn raw_dvd_sector_header() {
    let mut reader = SectorReader::new();
    let mut disc = MockDisc::new(DiscType::Ps2Dvd);
    let mut host = MockHost::default();

    reader.start_read(read_request(ReadKind::RawDvd, 5, 1, 1), &mut disc);
    run_event(&mut reader, &mut disc, &mut host);
    assert_eq!(run_event(&mut reader, &mut disc, &mut host), ReadProgress::Complete);

    let block = &host.writes[0].1;
    assert_eq!(block.len(), 2064);
    assert_eq!(&block[..DVD_HEADER_LEN], &[0x20, 0x03, 0x00, 0x05, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert!(
        block[DVD_HEADER_LEN..DVD_HEADER_LEN + 2048]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == MockDisc::sector_byte(5, i))
    );
    assert_eq!(&block[2060..], &[0; DVD_EDC_LEN]);
}

fn toc_with_layers(flags: u8, ptp_start: u32, otp_start: u32) -> [u8; TOC_LEN] {
    let mut toc = [0; TOC_LEN];
    toc[14] = flags;
    toc[21..24].copy_from_slice(&ptp_start.to_be_bytes()[1..]);
    toc[25..28].copy_from_slice(&otp_start.to_be_bytes()[1..]);
    toc
}

#[test]
fn dual_layer_detection() {
    let single = DualLayerInfo::from_toc(&toc_with_layers(0x00, 0x030000, 0));
    assert_eq!(single.kind, DualLayerKind::Single);

    let ptp = DualLayerInfo::from_toc(&toc_with_layers(0x20, 0x03_1000, 0));
    assert_eq!(ptp, DualLayerInfo { kind: DualLayerKind::Ptp, layer1_start: 0x1001 });

    let otp = DualLayerInfo::from_toc(&toc_with_layers(0x30, 0, 0x04_0000));
    assert_eq!(otp, DualLayerInfo { kind: DualLayerKind::Otp, layer1_start: 0x1_0001 });

    let mut disc = MockDisc::new(DiscType::Ps2Dvd);
    assert_eq!(DualLayerInfo::query(&mut disc), DualLayerInfo::default());
    disc.toc = Some(toc_with_layers(0x20, 0x03_1000, 0).to_vec());
    assert_eq!(DualLayerInfo::query(&mut disc).kind, DualLayerKind::Ptp);
}

#[test]
fn single_layer_remap() {
    let info = DualLayerInfo::default();
    for sector in [0, 1, 0x1000, 0x22_0000] {
        assert_eq!(info.remap(sector), RemappedSector { layer: 0, lsn: sector + 0x30000 });
    }
}

#[test]
fn dual_layer_remap() {
    let ptp = DualLayerInfo { kind: DualLayerKind::Ptp, layer1_start: 0x1000 };
    assert_eq!(ptp.remap(0xFFF), RemappedSector { layer: 0, lsn: 0x30FFF });
    assert_eq!(ptp.remap(0x1005), RemappedSector { layer: 1, lsn: 0x30005 });

    let otp = DualLayerInfo { kind: DualLayerKind::Otp, layer1_start: 0x1000 };
    assert_eq!(otp.remap(0xFFF), RemappedSector { layer: 0, lsn: 0x30FFF });
    assert_eq!(otp.remap(0x1000), RemappedSector { layer: 1, lsn: !0x30FFF });
    assert_eq!(otp.remap(0x2000), RemappedSector { layer: 1, lsn: !0x30FFF });
}

#[test]
fn decrypt_xor_then_rotate() {
    let mut bytes = [0x0F, 0xF0];
    DecryptSettings(0x01).apply(0xFF, &mut bytes);
    assert_eq!(bytes, [0xF0, 0x0F]);

    let mut bytes = [0b0000_0011];
    DecryptSettings(0x12).apply(0xFF, &mut bytes);
    assert_eq!(bytes, [0b1000_0001]);

    let mut bytes = [0b0000_0001];
    DecryptSettings(0x23).apply(0b0000_0011, &mut bytes);
    assert_eq!(bytes, [0b1000_0000]);

    assert!(!DecryptSettings(0).is_active());
}
