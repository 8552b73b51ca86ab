//! $LogFile proper: the control block, the tail-page flusher and the
//! record cursor.
//!
//! Log file organization:
//!
//! ```text
//! +-----------------+
//! | Restart block   |< Page sizes and the logging clients.
//! +-----------------+
//! | Restart block   |< Copy of the above; used when the first
//! |      copy       |  page is invalid.
//! +-----------------+
//! |   Buffer zone   |< Tail pages. Each new record lands here first
//! |  (tail pages)   |  and is copied to the logging area when its
//! +-----------------+  page fills up.
//! |  Logging area   |< Split into log pages full of records,
//! ~~~~~~~~~~~~~~~~~~~  written round-robin.
//! ```
//!
//! Every page carries multi-sector protection. The first pages may use a
//! different (system) page size than the log pages.

use std::path::Path;

use anyhow::Context;
use mmap_rs::{MmapFlags, MmapMut, MmapOptions};
use tracing::debug;

use crate::Lsn;
use crate::error::{Error, Result};
use crate::layout::{
    ClientLogHeader, ClientRecord, LogRecord, RecordPageHeader, RestartArea, RestartTable,
};
use crate::restart::{self, ClientRestartContext, RestartBlock};
use crate::{endian, mst};

/// Number of post-fixup log pages a record cursor keeps around. Spanning
/// records revisit their pages, anything beyond a handful is waste.
pub const LOG_PAGE_CACHE_SIZE: usize = 4;

/// The logging client all NTFS volumes register.
pub const NTFS_CLIENT_NAME: &str = "NTFS";

/// Align up to the 8-byte grid all record arithmetic runs on.
pub const fn qalign(n: u64) -> u64 {
    (n + 7) & !7
}

/// Logfile control block: the page geometry and the derived LSN ⇄ offset
/// transforms. An LSN packs a sequence number (high bits) and a file
/// offset in 8-byte units (low `file_size_bits` bits).
#[derive(Debug, Clone, Copy)]
pub struct Lcb {
    pub system_page_size: u64,
    pub log_page_size: u64,
    pub file_size: u64,
    pub seq_number_bits: u32,
    pub log_page_data_offset: u64,
    pub system_page_mask: u64,
    pub log_page_mask: u64,
    pub file_size_bits: u32,
}

impl Lcb {
    pub fn new(block: &RestartBlock) -> Result<Lcb> {
        let system_page_size = block.header.system_page_size as u64;
        let log_page_size = block.header.log_page_size as u64;
        let file_size = block.area.file_size as u64;
        let seq_number_bits = block.area.seq_number_bits;

        for page_size in [system_page_size, log_page_size] {
            if !(mst::SECTOR_SIZE as u64..=restart::MAX_SYSTEM_PAGE_SIZE).contains(&page_size)
                || !page_size.is_power_of_two()
            {
                return Err(Error::InvalidPageSize(page_size));
            }
        }

        if file_size < system_page_size * 2 || !(4..64).contains(&seq_number_bits) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "implausible restart area geometry",
            )));
        }

        Ok(Lcb {
            system_page_size,
            log_page_size,
            file_size,
            seq_number_bits,
            log_page_data_offset: block.area.log_page_data_offset as u64,
            system_page_mask: system_page_size - 1,
            log_page_mask: log_page_size - 1,
            file_size_bits: 64 - file_size.leading_zeros() - 3,
        })
    }

    pub fn lsn_to_seqno(&self, lsn: Lsn) -> u64 {
        lsn >> self.file_size_bits
    }

    pub fn lsn_to_file_offset(&self, lsn: Lsn) -> u64 {
        (lsn << self.seq_number_bits) >> (self.seq_number_bits - 3)
    }

    /// Offset of the record inside its log page.
    pub fn lsn_to_page_offset(&self, lsn: Lsn) -> u64 {
        ((lsn & 0xFFFF_FFFF) << 3) & self.log_page_mask
    }

    pub fn lsn_to_page(&self, lsn: Lsn) -> u64 {
        self.file_offset_to_page(self.lsn_to_file_offset(lsn))
    }

    pub fn file_offset_to_page(&self, offset: u64) -> u64 {
        offset & !self.system_page_mask
    }

    pub fn file_offset_to_lsn(&self, offset: u64, seqno: u64) -> Lsn {
        (offset >> 3).wrapping_add(seqno.wrapping_shl(self.file_size_bits))
    }
}

/// Mutable mapping of an extracted $LogFile, for running the tail-page
/// flusher against the file itself.
pub struct MmapLogfile {
    m: MmapMut,
}

impl MmapLogfile {
    pub fn open(file_path: &Path) -> anyhow::Result<MmapLogfile> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(file_path)
            .with_context(|| format!("open logfile at {}", file_path.display()))?;

        let meta = file.metadata().context("get metadata for logfile")?;
        let size = meta.len();

        if size == 0 {
            return Err(anyhow::anyhow!("logfile is empty"));
        }

        let mmap = unsafe {
            MmapOptions::new(size as usize)
                .context("mmap option")?
                .with_file(&file, 0u64)
                .with_flags(MmapFlags::SHARED)
                .map_mut()
                .context("mmap logfile")?
        };

        Ok(MmapLogfile { m: mmap })
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.m.as_mut_slice()
    }

    pub fn flush_all(&self) -> anyhow::Result<()> {
        self.m.flush(0..self.len())?;
        Ok(())
    }
}

/// Represents the $LogFile::$DATA stream.
///
/// Construction runs the tail-page flusher, so the buffer must be
/// writable; callers with a read-only source hand in an in-memory copy.
/// After construction the log area is only ever read.
pub struct LogFile<'a> {
    buf: &'a mut [u8],
    lcb: Lcb,
    clients: Vec<ClientRecord>,
    first_log_page: u64,
}

impl<'a> LogFile<'a> {
    pub fn new(buf: &'a mut [u8], block: &RestartBlock) -> Result<LogFile<'a>> {
        let lcb = Lcb::new(block)?;

        if (buf.len() as u64) < lcb.file_size {
            return Err(Error::UnexpectedEof);
        }

        let first_log_page = flush_tail_pages(buf, &lcb)?;

        Ok(LogFile {
            buf,
            lcb,
            clients: block.clients.clone(),
            first_log_page,
        })
    }

    pub fn lcb(&self) -> &Lcb {
        &self.lcb
    }

    /// Offset of the first page of the logging area, past the buffer zone.
    pub fn first_log_page(&self) -> u64 {
        self.first_log_page
    }

    pub fn clients(&self) -> &[ClientRecord] {
        &self.clients
    }

    pub fn buf(&self) -> &[u8] {
        self.buf
    }

    fn block(&self, pos: u64, len: u64) -> Result<&[u8]> {
        let pos = usize::try_from(pos).map_err(|_| Error::UnexpectedEof)?;
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;

        Error::ensure(self.buf, pos, len)?;
        Ok(&self.buf[pos..pos + len])
    }

    /// Read one log page and undo its fixup.
    fn read_log_page(&self, page_offset: u64) -> Result<Vec<u8>> {
        let mut page = self.block(page_offset, self.lcb.log_page_size)?.to_vec();
        mst::post_read_fixup(&mut page, mst::SECTOR_SIZE)?;
        Ok(page)
    }

    /// Offset of the log page after `current_page`, wrapping the circular
    /// log back to the first log page.
    pub fn next_log_page(&self, current_page: u64) -> u64 {
        let next_page = current_page + self.lcb.log_page_size;

        if next_page >= self.lcb.file_size {
            self.first_log_page
        } else {
            next_page
        }
    }

    /// Enumerate log records starting from `lsn`.
    ///
    /// The cursor yields `(record header, client data)` pairs in strictly
    /// increasing LSN order and ends cleanly when it runs into a page the
    /// journal has already reclaimed. Structural damage (torn page, LSN
    /// mismatch) surfaces as an `Err` item and also ends the sequence.
    pub fn records(&self, lsn: Lsn) -> RecordCursor<'_, 'a> {
        RecordCursor {
            logfile: self,
            cache: Vec::with_capacity(LOG_PAGE_CACHE_SIZE),
            seqno: self.lcb.lsn_to_seqno(lsn),
            lsn,
            done: false,
        }
    }

    fn first_record(&self, lsn: Lsn) -> Result<(LogRecord, Vec<u8>)> {
        match self.records(lsn).next() {
            Some(record) => record,
            None => Err(Error::UnexpectedEof),
        }
    }

    pub fn client(&self, client_name: &str) -> Result<&ClientRecord> {
        self.clients
            .iter()
            .find(|c| c.name() == client_name)
            .ok_or_else(|| Error::UnknownClient(client_name.to_owned()))
    }

    /// Fetch the restart area of a named client, or `None` when the
    /// client has not checkpointed yet.
    pub fn client_restart_area(&self, client_name: &str) -> Result<Option<RestartArea>> {
        let client = self.client(client_name)?;

        if client.client_restart_lsn == 0 {
            return Ok(None);
        }

        let (_, data) = self.first_record(client.client_restart_lsn)?;
        Ok(Some(RestartArea::decode(&data)?))
    }

    /// Fetch the restart table stored in the record at `lsn`. Returns the
    /// table header and the raw slot bytes that follow it.
    pub fn restart_table(&self, lsn: Lsn) -> Result<(RestartTable, Vec<u8>)> {
        let (_, data) = self.first_record(lsn)?;

        let header = ClientLogHeader::decode(&data)?;
        let table_offset = header.redo_offset as usize;

        Error::ensure(&data, table_offset, RestartTable::SIZE)?;
        let table = RestartTable::decode(&data[table_offset..])?;

        Ok((table, data[table_offset + RestartTable::SIZE..].to_vec()))
    }

    /// Reconstruct the client restart context the checkpoint record links
    /// to: each of the four tables is fetched only when the restart area
    /// declares a non-zero length for it.
    pub fn client_restart_context(&self, area: &RestartArea) -> Result<ClientRestartContext> {
        let mut context = ClientRestartContext {
            checkpoint: area.start_of_checkpoint,
            ..ClientRestartContext::default()
        };

        if area.attr_names_len > 0 {
            let (_, data) = self.first_record(area.attr_names_lsn)?;
            context.attribute_names = restart::parse_attribute_names(&data)?;
        }

        if area.dirty_pages_table_len > 0 {
            let (table, slots) = self.restart_table(area.dirty_pages_table_lsn)?;
            context.dirty_pages = restart::parse_dirty_pages(&table, &slots)?;
        }

        if area.open_attr_table_len > 0 {
            let (table, slots) = self.restart_table(area.open_attr_table_lsn)?;
            context.open_attributes = restart::parse_open_attributes(&table, &slots)?;
        }

        if area.transaction_table_len > 0 {
            let (table, slots) = self.restart_table(area.transaction_table_lsn)?;
            context.transactions = restart::parse_transactions(&table, &slots)?;
        }

        Ok(context)
    }
}

/// Copy buffer-zone pages over their destination log pages where the
/// buffered copy is newer, and return the offset of the first real log
/// page.
///
/// Up to journal 1.1 the page header's `copy` field holds the
/// destination file offset and the buffer zone is two pages; from 2.0 on
/// `copy` holds the page's last LSN and the zone grows to 32 pages. The
/// discrimination rule: a value with bits inside the log page mask is an
/// LSN, a page-aligned value is a file offset.
fn flush_tail_pages(buf: &mut [u8], lcb: &Lcb) -> Result<u64> {
    let mut tail_pages = Vec::new();
    let mut pos = lcb.system_page_size << 1;

    loop {
        if pos + lcb.system_page_size > buf.len() as u64 {
            // Ran off the file without finding the logging area.
            return Err(Error::UnexpectedEof);
        }

        // The header fields sit in the first sector, ahead of any fixup
        // position, so the raw page can be decoded as-is.
        let header = RecordPageHeader::decode(&buf[pos as usize..])?;

        if lcb.log_page_mask & header.copy.last_lsn() != 0 {
            // `copy` is an LSN. Once the last LSN lands on the page we
            // are standing on, the buffer zone has ended.
            if lcb.lsn_to_page(header.copy.last_lsn()) == pos {
                break;
            }
        }

        tail_pages.push(pos);
        pos += lcb.system_page_size;
    }

    for &tail_pos in &tail_pages {
        let tail = RecordPageHeader::decode(&buf[tail_pos as usize..])?;
        let holds_lsn = lcb.log_page_mask & tail.copy.file_offset() != 0;

        let dest = if holds_lsn {
            lcb.lsn_to_page(tail.copy.last_lsn())
        } else {
            tail.copy.file_offset()
        };
        let tail_last_lsn = if holds_lsn {
            tail.copy.last_lsn()
        } else {
            tail.last_end_lsn
        };

        if dest + lcb.system_page_size > buf.len() as u64 {
            return Err(Error::UnexpectedEof);
        }

        let dest_header = RecordPageHeader::decode(&buf[dest as usize..])?;

        if tail_last_lsn as i64 > dest_header.copy.last_lsn() as i64 {
            debug!(
                "tail page {tail_pos:#x} is newer (lsn {tail_last_lsn:#x}), writing back to {dest:#x}"
            );

            buf.copy_within(
                tail_pos as usize..(tail_pos + lcb.system_page_size) as usize,
                dest as usize,
            );

            // Pre-2.0 tail pages carry the destination offset where the
            // log area expects the last LSN; normalize the written image.
            if !holds_lsn {
                endian::write_u64(
                    buf,
                    dest as usize + RecordPageHeader::COPY_OFFSET,
                    tail.last_end_lsn,
                );
            }
        }
    }

    Ok((lcb.system_page_size << 1) + tail_pages.len() as u64 * lcb.log_page_size)
}

/// Lazy record enumeration over the circular log area.
pub struct RecordCursor<'c, 'a> {
    logfile: &'c LogFile<'a>,
    /// Most recently used first.
    cache: Vec<(u64, Vec<u8>)>,
    lsn: Lsn,
    seqno: u64,
    done: bool,
}

impl RecordCursor<'_, '_> {
    fn advance(&mut self) -> Result<Option<(LogRecord, Vec<u8>)>> {
        let lcb = *self.logfile.lcb();

        if lcb.lsn_to_seqno(self.lsn) != self.seqno {
            return Ok(None);
        }

        let mut page_offset = lcb.lsn_to_page(self.lsn);
        let page = cached_page(&mut self.cache, self.logfile, page_offset)?;

        let mut page_header = RecordPageHeader::decode(page)?;

        if page_header.multi_sector_header.magic != mst::MAGIC_RCRD {
            // Not a record page; an empty journal points its current LSN
            // at the restart pages.
            return Ok(None);
        }

        if lcb.lsn_to_seqno(page_header.copy.last_lsn()) < self.seqno {
            // Page with older records was hit, the log wrapped past the
            // requested position.
            return Ok(None);
        }

        let record_offset = lcb.lsn_to_page_offset(self.lsn);
        let record = LogRecord::decode(&page[record_offset as usize..])?;

        if record.this_lsn != self.lsn {
            return Err(Error::LsnMismatch {
                expected: self.lsn,
                found: record.this_lsn,
            });
        }

        // Collect the client data, page by page. Remember the file offset
        // of its last byte: it decides where the next LSN lives and
        // whether the sequence number ticks.
        let mut client_data = Vec::with_capacity(record.client_data_length as usize);
        let mut data_offset = qalign(record_offset + LogRecord::SIZE as u64);
        let mut last_byte = page_offset + data_offset;

        if record.client_data_length > 0 {
            loop {
                let page = cached_page(&mut self.cache, self.logfile, page_offset)?;
                page_header = RecordPageHeader::decode(page)?;

                if lcb.lsn_to_seqno(page_header.copy.last_lsn()) != self.seqno {
                    // Incomplete record: the continuation page was already
                    // reused by a later epoch (or never written).
                    return Ok(None);
                }

                if data_offset < lcb.log_page_size {
                    let wanted = record.client_data_length as u64 - client_data.len() as u64;
                    let to_copy = (lcb.log_page_size - data_offset).min(wanted);

                    client_data.extend_from_slice(
                        &page[data_offset as usize..(data_offset + to_copy) as usize],
                    );
                    last_byte = page_offset + data_offset + to_copy - 1;
                }

                if client_data.len() as u64 == record.client_data_length as u64 {
                    break;
                }

                page_offset = self.logfile.next_log_page(page_offset);
                if page_offset < last_byte {
                    // Wrapped around the log end.
                    self.seqno += 1;
                }

                // Continuation pages hold client data right after their
                // page header.
                data_offset = lcb.log_page_data_offset;
            }
        }

        // The next LSN. When the current record is the last on the page
        // its client data ends on, the next one starts on the next page;
        // otherwise it follows on the same page, 8-aligned.
        if page_header.copy.last_lsn() == self.lsn {
            let next_page = self
                .logfile
                .next_log_page(lcb.file_offset_to_page(last_byte));

            if next_page < last_byte {
                self.seqno += 1;
            }

            self.lsn = lcb.file_offset_to_lsn(next_page + lcb.log_page_data_offset, self.seqno);
        } else {
            self.lsn = lcb.file_offset_to_lsn(qalign(last_byte + 1), self.seqno);
        }

        Ok(Some((record, client_data)))
    }
}

impl Iterator for RecordCursor<'_, '_> {
    type Item = Result<(LogRecord, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Fetch a post-fixup log page through the cursor's small LRU cache.
fn cached_page<'p>(
    cache: &'p mut Vec<(u64, Vec<u8>)>,
    logfile: &LogFile<'_>,
    page_offset: u64,
) -> Result<&'p [u8]> {
    if let Some(i) = cache.iter().position(|(pos, _)| *pos == page_offset) {
        let entry = cache.remove(i);
        cache.insert(0, entry);
    } else {
        let page = logfile.read_log_page(page_offset)?;
        cache.truncate(LOG_PAGE_CACHE_SIZE - 1);
        cache.insert(0, (page_offset, page));
    }

    Ok(&cache[0].1)
}
