use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use ntfsutil::config::{Config, LOGFILE_NAME, RestartBlockChoice};
use ntfsutil::layout::{ClientLogHeader, RecordPageHeader};
use ntfsutil::logfile::{LogFile, MmapLogfile};
use ntfsutil::restart::{RestartBlock, read_restart_blocks};
use ntfsutil::volume::MmapVolumeReader;

enum Backing {
    Mapped(MmapLogfile),
    Owned(Vec<u8>),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();

    let logfile_path = match (&config.volume_path, &config.logfile_path) {
        (Some(volume_path), _) => extract_logfile(&config, volume_path)?,
        (None, Some(logfile_path)) => logfile_path.clone(),
        (None, None) => anyhow::bail!("either --volume-path or --logfile-path is required"),
    };

    let mut backing = if config.write {
        Backing::Mapped(MmapLogfile::open(&logfile_path)?)
    } else {
        Backing::Owned(
            fs::read(&logfile_path)
                .with_context(|| format!("read logfile at {}", logfile_path.display()))?,
        )
    };

    {
        let buf: &mut [u8] = match &mut backing {
            Backing::Mapped(mapped) => mapped.as_mut_slice(),
            Backing::Owned(owned) => owned.as_mut_slice(),
        };

        inspect(&config, &logfile_path, buf)?;
    }

    if let Backing::Mapped(mapped) = &backing {
        mapped.flush_all()?;
    }

    Ok(())
}

/// Dump $LogFile out of a raw volume, next to the reports.
fn extract_logfile(config: &Config, volume_path: &Path) -> anyhow::Result<PathBuf> {
    let volume = MmapVolumeReader::open(volume_path)?;
    let reader = volume.reader()?;

    let out_dir = config.output_dir(volume_path);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;

    let out_path = out_dir.join(LOGFILE_NAME);
    let mut out = BufWriter::new(
        fs::File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?,
    );

    let written = reader.extract_logfile(&mut out)?;
    out.flush()?;

    println!("Extracted {written} bytes of $LogFile to {}", out_path.display());

    Ok(out_path)
}

fn inspect(config: &Config, logfile_path: &Path, buf: &mut [u8]) -> anyhow::Result<()> {
    let (valid, backup) = read_restart_blocks(buf)?;

    println!(
        "Journal version: {}.{}",
        valid.header.major_ver, valid.header.minor_ver
    );
    println!("System page size: {:#x}", valid.header.system_page_size);
    println!("Log page size: {:#x}", valid.header.log_page_size);

    print_snapshot("-- SNAPSHOT INFO --", &valid);
    match &backup {
        Some(backup) => print_snapshot("-- SNAPSHOT INFO BACKUP --", backup),
        None => println!("-- NO BACKUP SNAPSHOT --"),
    }

    let block = match config.restart_block {
        RestartBlockChoice::Valid => &valid,
        RestartBlockChoice::Backup => backup.as_ref().unwrap_or_else(|| {
            warn!("no backup restart block, using the valid one");
            &valid
        }),
    };

    let current_lsn = block.area.current_lsn;
    let journal = LogFile::new(buf, block)?;

    let out_dir = config.output_dir(logfile_path);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;

    write_page_report(&journal, &out_dir.join("pages.txt"))?;

    match journal.client_restart_area(&config.client)? {
        Some(area) => {
            println!("-- CLIENT RESTART INFO --");
            println!("Version: {}.{}", area.major_version, area.minor_version);
            println!("Checkpoint LSN: {:#x}", area.start_of_checkpoint);
            println!("Open attributes LSN: {:#x}", area.open_attr_table_lsn);
            println!("Attribute names LSN: {:#x}", area.attr_names_lsn);
            println!("Dirty pages LSN: {:#x}", area.dirty_pages_table_lsn);
            println!("Transaction table LSN: {:#x}", area.transaction_table_lsn);

            let context = journal.client_restart_context(&area)?;
            println!("Dirty pages: {}", context.dirty_pages.len());
            println!("Open attributes: {}", context.open_attributes.len());
            println!("Attribute names: {}", context.attribute_names.len());
            println!("Transactions: {}", context.transactions.len());
        }
        None => println!("-- CLIENT {} HAS NO RESTART CONTEXT --", config.client),
    }

    write_record_report(&journal, current_lsn, &out_dir.join("working_set_records.txt"))?;

    Ok(())
}

fn print_snapshot(title: &str, block: &RestartBlock) {
    println!("{title}");
    println!("Current LSN: {:#x}", block.area.current_lsn);
    println!("Clients: {}", block.area.log_clients);

    for client in &block.clients {
        println!("\tClient name: {}", client.name());
        println!("\tClient's restart LSN: {:#x}", client.client_restart_lsn);
        println!("\tClient's sequence number: {}", client.seq_number);
    }

    println!("Sequence: {}", block.area.seq_number_bits);
    println!("File size: {:#x}", block.area.file_size);
}

/// One row per log page of the logging area, read raw (the header fields
/// in the first sector are not subject to fixup).
fn write_page_report(journal: &LogFile<'_>, path: &Path) -> anyhow::Result<()> {
    let mut out = BufWriter::new(
        fs::File::create(path).with_context(|| format!("create {}", path.display()))?,
    );

    writeln!(out, "Page offset;Last LSN;Last end LSN;Flags")?;

    let lcb = journal.lcb();
    let buf = journal.buf();
    let mut pos = lcb.system_page_size * 2;

    while pos + lcb.log_page_size <= lcb.file_size {
        let header = RecordPageHeader::decode(&buf[pos as usize..])?;

        writeln!(
            out,
            "{:>10};{:>18};{:>18};{:#x}",
            format!("{pos:#x}"),
            format!("{:#x}", header.copy.last_lsn()),
            format!("{:#x}", header.last_end_lsn),
            header.flags
        )?;

        pos += lcb.log_page_size;
    }

    out.flush()?;
    Ok(())
}

/// One row per record reachable from `start_lsn`.
fn write_record_report(journal: &LogFile<'_>, start_lsn: u64, path: &Path) -> anyhow::Result<()> {
    let mut out = BufWriter::new(
        fs::File::create(path).with_context(|| format!("create {}", path.display()))?,
    );

    writeln!(
        out,
        "LSN;Previous LSN;Undo next LSN;Redo operation;Undo operation;Transaction"
    )?;

    for item in journal.records(start_lsn) {
        let (record, data) = match item {
            Ok(item) => item,
            Err(err) => {
                warn!(%err, "record enumeration stopped");
                break;
            }
        };

        let (redo, undo) = match ClientLogHeader::decode(&data) {
            Ok(header) => (
                header.redo_operation().to_string(),
                header.undo_operation().to_string(),
            ),
            Err(_) => ("-".to_owned(), "-".to_owned()),
        };

        writeln!(
            out,
            "{:>18};{:>18};{:>18};{};{};{}",
            format!("{:#x}", record.this_lsn),
            format!("{:#x}", record.client_previous_lsn),
            format!("{:#x}", record.client_undo_next_lsn),
            redo,
            undo,
            record.transaction_id
        )?;
    }

    out.flush()?;
    Ok(())
}
