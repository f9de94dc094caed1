use super::*;
use test_log::test;

const HEADER_LEN: u16 = 0x68;

// One-block BIT at 0x40 with no section entries and no padding
fn valid_header() -> Vec<u8> {
    let mut header = vec![0; HEADER_LEN.into()];
    header[0x10..0x14].copy_from_slice(&0x1234_u32.to_le_bytes());
    header[0x14..0x16].copy_from_slice(&HEADER_LEN.to_le_bytes());
    header[0x18..0x1A].copy_from_slice(&0x1000_u16.to_le_bytes());
    header[0x1C] = 0b0000_0010;
    for (i, byte) in header[0x20..0x40].iter_mut().enumerate() {
        *byte = i as u8 + 1;
    }
    header[0x44] = 1;
    header[0x48..0x58].fill(0xAA);
    header
}

fn write_header(mg: &mut MagicGate, header: &[u8]) {
    mg.begin_header(header.len() as u16);
    for chunk in header.chunks(MG_CHUNK_LEN) {
        mg.append(chunk).unwrap();
    }
}

#[test]
fn append_respects_capacity() {
    let mut mg = MagicGate::new();
    mg.begin_data(20);

    mg.append(&[1; 16]).unwrap();
    assert_eq!(mg.size(), 16);

    assert_eq!(
        mg.append(&[2; 8]),
        Err(MagicGateError::Capacity { size: 16, len: 8, capacity: 20 })
    );
    assert_eq!(mg.size(), 16);

    mg.append(&[3; 4]).unwrap();
    assert_eq!(mg.size(), 20);
}

#[test]
fn read_data_drains_front() {
    let mut mg = MagicGate::new();
    mg.begin_data(20);
    let bytes: Vec<u8> = (0..20).collect();
    mg.append(&bytes).unwrap();

    let mut out = [0; MG_CHUNK_LEN];
    assert_eq!(mg.read_data(&mut out), 16);
    assert_eq!(out.as_slice(), &bytes[..16]);

    out.fill(0);
    assert_eq!(mg.read_data(&mut out), 4);
    assert_eq!(&out[..4], &bytes[16..]);

    assert_eq!(mg.read_data(&mut out), 0);
    assert_eq!(mg.size(), 0);
}

#[test]
fn finalize_valid_header() {
    let mut mg = MagicGate::new();
    let header = valid_header();
    write_header(&mut mg, &header);

    mg.finalize_header().unwrap();
    assert_eq!(mg.bit_key().as_slice(), &header[0x20..0x30]);
    assert_eq!(mg.content_key().as_slice(), &header[0x30..0x40]);
}

#[test]
fn finalize_with_padding_flag() {
    let mut header = valid_header();
    // Clearing the high flag bits moves the BIT 8 bytes further in
    header[0x18..0x1A].copy_from_slice(&0_u16.to_le_bytes());
    header.splice(0x20..0x20, [0xEE; 8]);
    let len = header.len() as u16;
    header[0x14..0x16].copy_from_slice(&len.to_le_bytes());

    let mut mg = MagicGate::new();
    write_header(&mut mg, &header);

    mg.finalize_header().unwrap();
    assert_eq!(mg.bit_key().as_slice(), &header[0x28..0x38]);
    assert_eq!(mg.content_key().as_slice(), &header[0x38..0x48]);
}

#[test]
fn finalize_rejects_inconsistent_header() {
    let mut header = valid_header();
    header[0x45] = 1;

    let mut mg = MagicGate::new();
    write_header(&mut mg, &header);
    assert_eq!(mg.finalize_header(), Err(MagicGateError::NotDecrypted));
    assert_eq!(mg.bit_key(), &[0; MG_KEY_LEN]);

    // Incomplete header
    let header = valid_header();
    mg.begin_header(HEADER_LEN);
    mg.append(&header[..0x40]).unwrap();
    assert_eq!(mg.finalize_header(), Err(MagicGateError::NotDecrypted));
}

#[test]
fn finalize_data_is_a_no_op() {
    let mut mg = MagicGate::new();
    mg.begin_data(4);
    mg.append(&[1, 2, 3]).unwrap();

    assert_eq!(mg.finalize_header(), Ok(()));
    assert_eq!(mg.bit_key(), &[0; MG_KEY_LEN]);
}

#[test]
fn read_bit_length_moves_bit() {
    let mut mg = MagicGate::new();
    let header = valid_header();
    write_header(&mut mg, &header);

    assert_eq!(mg.read_bit_length(), Ok(24));
    assert_eq!(mg.size(), 24);
    assert_eq!(mg.capacity(), 0);
    assert_eq!(mg.append(&[0]), Err(MagicGateError::Capacity { size: 24, len: 1, capacity: 0 }));

    let mut out = [0; MG_CHUNK_LEN];
    assert_eq!(mg.read_data(&mut out), 16);
    assert_eq!(out.as_slice(), &header[0x40..0x50]);
}

#[test]
fn read_bit_length_requires_header() {
    let mut mg = MagicGate::new();
    mg.begin_data(16);
    assert_eq!(mg.read_bit_length(), Err(MagicGateError::WrongKind(MgDataKind::Data)));
}

#[test]
fn data_out_length() {
    let mut mg = MagicGate::new();
    mg.begin_data(32);
    mg.append(&[0; 32]).unwrap();

    assert_eq!(
        mg.set_data_out_length(16),
        Err(MagicGateError::LengthMismatch { declared: 16, size: 32 })
    );
    assert_eq!(mg.set_data_out_length(32), Ok(()));
    assert_eq!(mg.capacity(), 0);

    mg.begin_header(16);
    assert_eq!(mg.set_data_out_length(0), Err(MagicGateError::WrongKind(MgDataKind::Header)));
}
