//! Codec-level round-trip and corruption-detection tests.

use gpt::disk::LogicalBlockSize;
use gpt::header::{parse_uuid, read_header_from_arbitrary_device, HeaderBuilder};
use gpt::GptError;
use simple_bytes::{BytesArray, BytesWrite};
use std::io::Cursor;
use std::str::FromStr;
use uuid::Uuid;

#[test]
fn guid_field_round_trip() {
    let original = Uuid::from_str("1B6A2BFA-E92B-184C-A8A7-ED0610D54821").unwrap();
    let fields = original.as_fields();

    let mut bytes = BytesArray::from([0u8; 16]);
    bytes.write_le_u32(fields.0);
    bytes.write_le_u16(fields.1);
    bytes.write_le_u16(fields.2);
    BytesWrite::write(&mut bytes, fields.3);

    let mut reader = BytesArray::from(bytes.into_array());
    let parsed = parse_uuid(&mut reader).unwrap();
    assert_eq!(parsed, original);
}

fn build_header(lb_size: LogicalBlockSize, backup_lba: u64) -> gpt::header::Header {
    HeaderBuilder::new()
        .disk_guid(Uuid::from_str("1B6A2BFA-E92B-184C-A8A7-ED0610D54821").unwrap())
        .backup_lba(backup_lba)
        .build(lb_size)
        .unwrap()
}

#[test]
fn header_round_trips_and_crc_verifies() {
    let lb_size = LogicalBlockSize::Lb512;
    let header = build_header(lb_size, 199);

    let mut mem = Cursor::new(vec![0u8; 200 * 512]);
    header.write_primary(&mut mem, lb_size).unwrap();

    let read_back = read_header_from_arbitrary_device(&mut mem, lb_size).unwrap();
    assert_eq!(read_back.disk_guid, header.disk_guid);
    assert_eq!(read_back.current_lba, 1);
    assert_eq!(read_back.num_parts, header.num_parts);
}

// Flipping the signature's first byte is detected.
#[test]
fn flipped_signature_byte_is_invalid_signature() {
    let lb_size = LogicalBlockSize::Lb512;
    let header = build_header(lb_size, 199);

    let mut mem = Cursor::new(vec![0u8; 200 * 512]);
    header.write_primary(&mut mem, lb_size).unwrap();
    mem.get_mut()[512] ^= 0xFF;

    let err = read_header_from_arbitrary_device(&mut mem, lb_size).unwrap_err();
    assert!(matches!(err, GptError::InvalidSignature));
}

// Flipping a body byte invalidates the header CRC.
#[test]
fn flipped_body_byte_is_invalid_crc32() {
    let lb_size = LogicalBlockSize::Lb512;
    let header = build_header(lb_size, 199);

    let mut mem = Cursor::new(vec![0u8; 200 * 512]);
    header.write_primary(&mut mem, lb_size).unwrap();
    // Offset 512 + 24 lands inside current_lba, well past the signature
    // and CRC field, and within header_size_le (92) bytes.
    mem.get_mut()[512 + 24] ^= 0xFF;

    let err = read_header_from_arbitrary_device(&mut mem, lb_size).unwrap_err();
    assert!(matches!(err, GptError::InvalidCrc32));
}

#[test]
fn header_size_below_minimum_is_rejected() {
    let lb_size = LogicalBlockSize::Lb512;
    let mut header = build_header(lb_size, 199);
    header.header_size_le = 91;

    let mut mem = Cursor::new(vec![0u8; 200 * 512]);
    header.write_primary(&mut mem, lb_size).unwrap();

    let err = read_header_from_arbitrary_device(&mut mem, lb_size).unwrap_err();
    assert!(matches!(err, GptError::InvalidHeaderSize));
}
