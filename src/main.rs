//! Command-line front-end for inspecting and resizing a GPT partition table.
//!
//! Four subcommands, each taking a device path: `list`, `info`, `resize`,
//! `resize-max`. See each subcommand's help text for its exact arguments.
//! Any parse or validation error prints a one-line diagnostic to stderr and
//! exits with code 1.

use clap::{Parser, Subcommand};
use gpt::resize::{self, ResizeConstraints, ResizeOperation};
use gpt::{GptConfig, GptDisk, GptError};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "gpt-cli", about = "Inspect and resize GUID Partition Tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one row per non-empty partition entry.
    List {
        /// Path to the device or disk image.
        device: PathBuf,
    },
    /// Print a multi-line record for a single partition slot.
    Info {
        /// Path to the device or disk image.
        device: PathBuf,
        /// Raw partition slot index.
        index: u32,
    },
    /// Resize a partition to exactly `mb` mebibytes.
    Resize {
        /// Path to the device or disk image.
        device: PathBuf,
        /// Raw partition slot index.
        index: u32,
        /// New size, in mebibytes.
        mb: u64,
    },
    /// Resize a partition to the maximum contiguous size available.
    ResizeMax {
        /// Path to the device or disk image.
        device: PathBuf,
        /// Raw partition slot index.
        index: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::List { device } => list(&device),
        Command::Info { device, index } => info(&device, index),
        Command::Resize { device, index, mb } => resize_by_mb(&device, index, mb),
        Command::ResizeMax { device, index } => resize_max(&device, index),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gpt-cli: {e}");
            ExitCode::FAILURE
        }
    }
}

fn open_writable(device: &Path) -> Result<GptDisk<File>, GptError> {
    GptConfig::new().writable(true).open(device)
}

fn list(device: &Path) -> Result<(), GptError> {
    let disk = open_writable(device)?;
    println!(
        "{:<5} {:>12} {:>12} {:>12}  {}",
        "Num", "Start", "End", "Sectors", "Name"
    );
    for info in resize::list_partitions(&disk) {
        println!(
            "{:<5} {:>12} {:>12} {:>12}  {}",
            info.index, info.first_lba, info.last_lba, info.size_sectors, info.name
        );
    }
    Ok(())
}

fn info(device: &Path, index: u32) -> Result<(), GptError> {
    let disk = open_writable(device)?;
    let info = resize::get_partition_info(&disk, index).ok_or(GptError::PartitionNotFound)?;
    println!("Number:    {}", info.index);
    println!("Start LBA: {}", info.first_lba);
    println!("End LBA:   {}", info.last_lba);
    println!("Sectors:   {}", info.size_sectors);
    println!("Size:      {} bytes", info.size_bytes);
    match gpt::partition_types::Type::lookup(info.type_guid) {
        Some(ty) => println!("Type GUID: {} ({})", info.type_guid, ty.os),
        None => println!("Type GUID: {}", info.type_guid),
    }
    println!("Name:      {}", info.name);
    Ok(())
}

fn resize_by_mb(device: &Path, index: u32, mb: u64) -> Result<(), GptError> {
    let mut disk = open_writable(device)?;
    resize::resize_partition(
        &mut disk,
        index,
        ResizeOperation::from_megabytes(mb),
        ResizeConstraints::default(),
    )
}

fn resize_max(device: &Path, index: u32) -> Result<(), GptError> {
    let mut disk = open_writable(device)?;
    resize::resize_to_max(&mut disk, index)
}
