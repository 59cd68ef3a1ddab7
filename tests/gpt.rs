use gpt::disk::LogicalBlockSize;
use gpt::{GptConfig, GptError};
use std::io::Cursor;

#[test]
fn default_config_matches_new() {
    let c1 = GptConfig::new();
    let c2 = GptConfig::default();
    assert_eq!(c1, c2);
}

#[test]
fn opening_a_blank_device_fails() {
    let device = Cursor::new(vec![0u8; 200 * 512]);
    let err = GptConfig::new()
        .logical_block_size(LogicalBlockSize::Lb512)
        .open_from_device(device)
        .unwrap_err();
    assert!(matches!(
        err,
        GptError::InvalidSignature | GptError::InvalidLbaRange
    ));
}

// Open question — sector size: this core refuses 4Kn devices rather than
// silently misbehaving.
#[test]
fn opening_a_4096_byte_sector_device_is_rejected() {
    let device = Cursor::new(vec![0u8; 4096 * 100]);
    let err = GptConfig::new()
        .logical_block_size(LogicalBlockSize::Lb4096)
        .open_from_device(device)
        .unwrap_err();
    assert!(matches!(err, GptError::UnsupportedSectorSize));
}

#[test]
fn creating_from_device_yields_a_blank_partition_table() {
    let device = Cursor::new(vec![0u8; 200 * 512]);
    let gdisk = GptConfig::new()
        .writable(true)
        .logical_block_size(LogicalBlockSize::Lb512)
        .create_from_device(device, None)
        .unwrap();

    assert_eq!(*gdisk.logical_block_size(), LogicalBlockSize::Lb512);
    assert!(gdisk.primary_header().is_ok());
    assert!(gdisk.backup_header().is_ok());
    assert!(gdisk.partitions().is_empty());
}
