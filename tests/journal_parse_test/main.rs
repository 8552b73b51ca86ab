//! End-to-end tests over synthetic $LogFile images.

use ntfsutil::error::Error;
use ntfsutil::layout::{ClientLogHeader, LogOperation, LogRecord, RECORD_TYPE_CLIENT};
use ntfsutil::logfile::{LogFile, qalign};
use ntfsutil::mst;
use ntfsutil::restart::read_restart_blocks;

const SYSTEM_PAGE: usize = 0x1000;
const LOG_PAGE: usize = 0x1000;
const DATA_OFF: usize = 0x40;
const RECORD_HEADER: usize = 44;

fn put_u16(buf: &mut [u8], pos: usize, val: u16) {
    buf[pos..pos + 2].copy_from_slice(&val.to_le_bytes());
}

fn put_u32(buf: &mut [u8], pos: usize, val: u32) {
    buf[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
}

fn put_u64(buf: &mut [u8], pos: usize, val: u64) {
    buf[pos..pos + 8].copy_from_slice(&val.to_le_bytes());
}

/// Builds a journal image page by page. LSNs are composed with the same
/// split the restart area advertises: the low `file_size_bits` bits are
/// the file offset in 8-byte units, the high bits the sequence number.
struct JournalBuilder {
    buf: Vec<u8>,
    file_size: u64,
    file_size_bits: u32,
}

impl JournalBuilder {
    fn new(file_size: u64) -> JournalBuilder {
        JournalBuilder {
            buf: vec![0u8; file_size as usize],
            file_size,
            file_size_bits: 64 - file_size.leading_zeros() - 3,
        }
    }

    fn lsn(&self, offset: u64, seqno: u64) -> u64 {
        (offset >> 3) | (seqno << self.file_size_bits)
    }

    fn restart_page(&mut self, page_index: usize, current_lsn: u64, client_restart_lsn: u64) {
        let p = page_index * SYSTEM_PAGE;
        let b = &mut self.buf;

        put_u32(b, p, mst::MAGIC_RSTR);
        put_u16(b, p + 4, 0x1E); // usa_ofs
        put_u16(b, p + 6, (SYSTEM_PAGE / 512 + 1) as u16);
        put_u32(b, p + 16, SYSTEM_PAGE as u32);
        put_u32(b, p + 20, LOG_PAGE as u32);
        put_u16(b, p + 24, 0x30); // restart_offset
        put_u16(b, p + 26, 1); // minor_ver
        put_u16(b, p + 28, 1); // major_ver
        put_u16(b, p + 0x1E, 0x0001); // update sequence number

        // LSN restart area.
        let a = p + 0x30;
        put_u64(b, a, current_lsn);
        put_u16(b, a + 8, 1); // log_clients
        put_u16(b, a + 10, 0xFFFF);
        put_u16(b, a + 12, 0);
        put_u32(b, a + 16, 64 - self.file_size_bits); // seq_number_bits
        put_u16(b, a + 20, 0x90);
        put_u16(b, a + 22, 0x30); // client_array_offset
        put_u64(b, a + 24, self.file_size);
        put_u16(b, a + 36, 0x30);
        put_u16(b, a + 38, DATA_OFF as u16);
        put_u32(b, a + 40, 1);

        // Single NTFS client.
        let c = a + 0x30;
        put_u64(b, c + 8, client_restart_lsn);
        put_u16(b, c + 16, 0xFFFF);
        put_u16(b, c + 18, 0xFFFF);
        put_u16(b, c + 20, 1); // seq_number
        put_u32(b, c + 28, 8); // name_length
        for (i, ch) in "NTFS".bytes().enumerate() {
            b[c + 32 + i * 2] = ch;
        }
    }

    /// Record page header; `copy` is the last LSN (2.0+) or the tail
    /// page's destination offset (1.x).
    fn record_page(&mut self, page_offset: usize, copy: u64, last_end_lsn: u64) {
        let p = page_offset;
        let b = &mut self.buf;

        put_u32(b, p, mst::MAGIC_RCRD);
        put_u16(b, p + 4, 0x28); // usa_ofs
        put_u16(b, p + 6, (LOG_PAGE / 512 + 1) as u16);
        put_u64(b, p + 8, copy);
        put_u32(b, p + 16, 0x1); // flags
        put_u16(b, p + 20, 1);
        put_u16(b, p + 22, 1);
        put_u64(b, p + 32, last_end_lsn);
        put_u16(b, p + 0x28, 0x0001); // update sequence number
    }

    fn log_record(
        &mut self,
        page_offset: usize,
        record_offset: usize,
        this_lsn: u64,
        data_length: u32,
        transaction_id: u32,
    ) {
        let p = page_offset + record_offset;
        let b = &mut self.buf;

        put_u64(b, p, this_lsn);
        put_u32(b, p + 24, data_length);
        put_u16(b, p + 28, 1); // client seq_number
        put_u32(b, p + 32, RECORD_TYPE_CLIENT);
        put_u32(b, p + 36, transaction_id);
    }

    /// Apply multi-sector protection to every initialized page.
    fn seal(mut self) -> Vec<u8> {
        for page in 0..(self.file_size as usize / SYSTEM_PAGE) {
            let p = page * SYSTEM_PAGE;
            if u32::from_le_bytes([self.buf[p], self.buf[p + 1], self.buf[p + 2], self.buf[p + 3]])
                != 0
            {
                mst::pre_write_fixup(&mut self.buf[p..p + SYSTEM_PAGE], 512).unwrap();
            }
        }

        self.buf
    }
}

/// Client data pattern, stable across pages.
fn pattern(i: usize) -> u8 {
    (i * 7 + 3) as u8
}

/// A 0x28-byte client log header: redo CreateAttribute, undo
/// DeleteAttribute, one LCN.
fn write_client_log_header(builder: &mut JournalBuilder, pos: usize) {
    let b = &mut builder.buf;
    put_u16(b, pos, 0x05); // redo_op
    put_u16(b, pos + 2, 0x06); // undo_op
    put_u16(b, pos + 4, 0x28); // redo_offset
    put_u16(b, pos + 14, 1); // lcns_to_follow
    put_u64(b, pos + 24, 0x42); // target_vcn
    put_u64(b, pos + 32, 0x1234); // lcns_for_page[0]
}

#[test]
fn test_empty_journal_yields_no_records() {
    let mut builder = JournalBuilder::new(0x10000);
    let probe_lsn = builder.lsn(0x4040, 1);

    builder.restart_page(0, 0, 0);
    builder.restart_page(1, 0, 0);
    // v1.x tail pages pointing at untouched destinations.
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);
    // First log page ends the buffer zone.
    builder.record_page(0x4000, probe_lsn, probe_lsn);

    let mut image = builder.seal();
    let (valid, backup) = read_restart_blocks(&image).unwrap();
    assert_eq!(valid.area.current_lsn, 0);
    assert!(backup.is_some());

    let journal = LogFile::new(&mut image, &valid).unwrap();
    assert_eq!(journal.first_log_page(), 0x4000);

    let records: Vec<_> = journal.records(0).collect();
    assert!(records.is_empty(), "{records:?}");
}

#[test]
fn test_single_record_on_one_page() {
    let mut builder = JournalBuilder::new(0x10000);
    let lsn = builder.lsn(0x4040, 1);
    let data_start = 0x4000 + qalign((0x40 + RECORD_HEADER) as u64) as usize;

    builder.restart_page(0, lsn, 0);
    builder.restart_page(1, lsn, 0);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);

    builder.record_page(0x4000, lsn, lsn);
    builder.log_record(0x4000, 0x40, lsn, 0x28, 0x18);
    write_client_log_header(&mut builder, data_start);

    // The next page holds only older records.
    builder.record_page(0x5000, builder.lsn(0x5040, 0), 0);

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();

    let records: Vec<_> = journal
        .records(lsn)
        .collect::<Result<Vec<(LogRecord, Vec<u8>)>, Error>>()
        .unwrap();

    assert_eq!(records.len(), 1);
    let (record, data) = &records[0];
    assert_eq!(record.this_lsn, lsn);
    assert_eq!(record.transaction_id, 0x18);
    assert_eq!(data.len(), 0x28);

    let header = ClientLogHeader::decode(data).unwrap();
    assert_eq!(header.redo_operation(), LogOperation::CreateAttribute);
    assert_eq!(header.undo_operation(), LogOperation::DeleteAttribute);
    assert_eq!(header.lcns_for_page, vec![0x1234]);
}

#[test]
fn test_record_spanning_two_pages() {
    let mut builder = JournalBuilder::new(0x10000);
    let lsn = builder.lsn(0x4040, 1);
    let data_length = 0x1000usize;

    builder.restart_page(0, lsn, 0);
    builder.restart_page(1, lsn, 0);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);

    builder.record_page(0x4000, lsn, lsn);
    builder.log_record(0x4000, 0x40, lsn, data_length as u32, 1);

    // The record spans into page 0x5000, whose last LSN stays in the
    // same sequence epoch.
    builder.record_page(0x5000, lsn, lsn);
    builder.record_page(0x6000, builder.lsn(0x6040, 0), 0);

    let first_chunk = LOG_PAGE - 0x70;
    for i in 0..first_chunk {
        builder.buf[0x4070 + i] = pattern(i);
    }
    for i in first_chunk..data_length {
        builder.buf[0x5000 + DATA_OFF + (i - first_chunk)] = pattern(i);
    }

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();

    let records: Vec<_> = journal
        .records(lsn)
        .collect::<Result<Vec<_>, Error>>()
        .unwrap();

    assert_eq!(records.len(), 1);
    let (record, data) = &records[0];
    assert_eq!(record.this_lsn, lsn);
    assert_eq!(data.len(), data_length);

    for (i, b) in data.iter().enumerate() {
        assert_eq!(*b, pattern(i), "client data byte {i}");
    }
}

#[test]
fn test_log_wrap_increments_sequence() {
    let mut builder = JournalBuilder::new(0x8000);
    let lsn_a = builder.lsn(0x7040, 1);
    let lsn_b = builder.lsn(0x4040, 2);

    builder.restart_page(0, lsn_a, 0);
    builder.restart_page(1, lsn_a, 0);
    builder.record_page(0x2000, 0x6000, 0);
    builder.record_page(0x3000, 0x7000, 0);

    // Wrapped head of the log: page 0x4000 already belongs to epoch 2.
    builder.record_page(0x4000, lsn_b, lsn_b);
    builder.log_record(0x4000, 0x40, lsn_b, 0x28, 2);

    builder.record_page(0x5000, builder.lsn(0x5040, 0), 0);
    builder.record_page(0x6000, builder.lsn(0x6040, 0), 0);

    // Last record of epoch 1 sits on the final page of the file.
    builder.record_page(0x7000, lsn_a, lsn_a);
    builder.log_record(0x7000, 0x40, lsn_a, 0x28, 1);

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();
    assert_eq!(journal.first_log_page(), 0x4000);

    let records: Vec<_> = journal
        .records(lsn_a)
        .collect::<Result<Vec<_>, Error>>()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].0.this_lsn, lsn_a);
    assert_eq!(records[1].0.this_lsn, lsn_b);

    // The wrapped record lands on the first log page, one epoch up.
    let lcb = journal.lcb();
    assert_eq!(lcb.lsn_to_page(lsn_b), journal.first_log_page());
    assert_eq!(lcb.lsn_to_seqno(lsn_b), lcb.lsn_to_seqno(lsn_a) + 1);

    // Strictly increasing LSNs across the wrap.
    assert!(records[0].0.this_lsn < records[1].0.this_lsn);
}

#[test]
fn test_tail_page_newer_than_log_is_written_back() {
    let mut builder = JournalBuilder::new(0x10000);
    let probe_lsn = builder.lsn(0x4040, 1);

    builder.restart_page(0, 0x100, 0);
    builder.restart_page(1, 0x100, 0);

    // Tail page for destination 0x5000, newer than what the log holds.
    builder.record_page(0x2000, 0x5000, 0x100);
    for i in 0x40..0x200 {
        builder.buf[0x2000 + i] = pattern(i);
    }
    // Second tail page, older than its destination.
    builder.record_page(0x3000, 0x6000, 0);

    builder.record_page(0x4000, probe_lsn, probe_lsn);
    builder.record_page(0x5000, 0x080, 0x080);
    builder.record_page(0x6000, 0x200, 0x200);

    let mut image = builder.seal();

    // Expected destination image: the raw tail page with its copy field
    // normalized from the destination offset to the last end LSN.
    let mut expected = image[0x2000..0x3000].to_vec();
    put_u64(&mut expected, 8, 0x100);

    let untouched = image[0x6000..0x7000].to_vec();

    let (valid, _) = read_restart_blocks(&image).unwrap();

    {
        let journal = LogFile::new(&mut image, &valid).unwrap();
        assert_eq!(journal.first_log_page(), 0x4000);
    }

    assert_eq!(&image[0x5000..0x6000], expected.as_slice());
    assert_eq!(&image[0x6000..0x7000], untouched.as_slice(), "older tail page must not overwrite");
}

#[test]
fn test_restart_selection_prefers_higher_lsn() {
    let mut builder = JournalBuilder::new(0x10000);
    let probe_lsn = builder.lsn(0x4040, 1);

    builder.restart_page(0, 0x100, 0);
    builder.restart_page(1, 0x200, 0);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);
    builder.record_page(0x4000, probe_lsn, probe_lsn);

    let image = builder.seal();
    let (valid, backup) = read_restart_blocks(&image).unwrap();

    assert_eq!(valid.area.current_lsn, 0x200);
    assert_eq!(backup.map(|b| b.area.current_lsn), Some(0x100));
}

#[test]
fn test_torn_primary_selects_backup_block() {
    let mut builder = JournalBuilder::new(0x10000);

    builder.restart_page(0, 0x200, 0);
    builder.restart_page(1, 0x100, 0);

    let mut image = builder.seal();

    // Tear the first restart page: its second sector never hit the disk.
    image[0x3FE] = 0xDE;
    image[0x3FF] = 0xAD;

    let (valid, backup) = read_restart_blocks(&image).unwrap();
    assert_eq!(valid.area.current_lsn, 0x100);
    assert!(backup.is_none());
}

#[test]
fn test_both_restart_pages_torn() {
    let mut builder = JournalBuilder::new(0x10000);

    builder.restart_page(0, 0x200, 0);
    builder.restart_page(1, 0x100, 0);

    let mut image = builder.seal();
    image[0x3FE] = 0xDE;
    image[0x13FE] = 0xDE;

    assert!(matches!(
        read_restart_blocks(&image),
        Err(Error::NoValidRestart)
    ));
}

#[test]
fn test_lsn_mismatch_is_surfaced() {
    let mut builder = JournalBuilder::new(0x10000);
    let lsn = builder.lsn(0x4040, 1);

    builder.restart_page(0, lsn, 0);
    builder.restart_page(1, lsn, 0);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);
    builder.record_page(0x4000, lsn, lsn);
    builder.log_record(0x4000, 0x40, lsn, 0, 0);

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();

    // Address a record slot that holds no record.
    let bogus = builder_lsn_at(&journal, 0x4080, 1);
    let mut cursor = journal.records(bogus);

    assert!(matches!(
        cursor.next(),
        Some(Err(Error::LsnMismatch { .. }))
    ));
    assert!(cursor.next().is_none());
}

fn builder_lsn_at(journal: &LogFile<'_>, offset: u64, seqno: u64) -> u64 {
    journal.lcb().file_offset_to_lsn(offset, seqno)
}

#[test]
fn test_client_restart_context_round_trip() {
    let mut builder = JournalBuilder::new(0x10000);
    let restart_lsn = builder.lsn(0x4040, 1);
    let data_start = 0x4000 + qalign((0x40 + RECORD_HEADER) as u64) as usize;

    builder.restart_page(0, restart_lsn, restart_lsn);
    builder.restart_page(1, restart_lsn, restart_lsn);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);

    // The checkpoint record: a client restart area with no tables.
    builder.record_page(0x4000, restart_lsn, restart_lsn);
    builder.log_record(0x4000, 0x40, restart_lsn, 64, 0);
    put_u32(&mut builder.buf, data_start, 1); // major_version
    put_u64(&mut builder.buf, data_start + 8, 0x1234); // start_of_checkpoint

    builder.record_page(0x5000, builder.lsn(0x5040, 0), 0);

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();

    assert!(matches!(
        journal.client_restart_area("FOO"),
        Err(Error::UnknownClient(_))
    ));

    let area = journal.client_restart_area("NTFS").unwrap().unwrap();
    assert_eq!(area.major_version, 1);
    assert_eq!(area.start_of_checkpoint, 0x1234);

    let context = journal.client_restart_context(&area).unwrap();
    assert_eq!(context.checkpoint, 0x1234);
    assert!(context.dirty_pages.is_empty());
    assert!(context.open_attributes.is_empty());
    assert!(context.attribute_names.is_empty());
    assert!(context.transactions.is_empty());
}

#[test]
fn test_client_without_checkpoint_has_no_context() {
    let mut builder = JournalBuilder::new(0x10000);
    let probe_lsn = builder.lsn(0x4040, 1);

    builder.restart_page(0, 0x100, 0);
    builder.restart_page(1, 0x100, 0);
    builder.record_page(0x2000, 0x4000, 0);
    builder.record_page(0x3000, 0x5000, 0);
    builder.record_page(0x4000, probe_lsn, probe_lsn);

    let mut image = builder.seal();
    let (valid, _) = read_restart_blocks(&image).unwrap();
    let journal = LogFile::new(&mut image, &valid).unwrap();

    assert!(journal.client_restart_area("NTFS").unwrap().is_none());
}
