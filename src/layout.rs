//! On-disk NTFS structures.
//!
//! Everything here is little-endian and packed; the codecs copy fields out
//! of raw byte slices with explicit byte-order reads instead of trusting
//! host endianness or natural alignment. Field offsets follow the layouts
//! published for the NTFS log file service (ntfs-3g `layout.h`/`logfile.h`).

use std::fmt::Display;

use crate::Lsn;
use crate::endian;
use crate::error::{Error, Result};

/// Decode a length-prefixed UTF-16LE name.
pub(crate) fn utf16le_name(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    String::from_utf16_lossy(&units)
}

/// Prelude of every multi-sector protected block.
#[derive(Debug, Clone, Copy)]
pub struct MultiSectorHeader {
    pub magic: u32,
    pub usa_ofs: u16,
    pub usa_count: u16,
}

impl MultiSectorHeader {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> Result<MultiSectorHeader> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(MultiSectorHeader {
            magic: endian::read_u32(buf, 0),
            usa_ofs: endian::read_u16(buf, 4),
            usa_count: endian::read_u16(buf, 6),
        })
    }
}

/// NTFS boot sector, reduced to the fields the journal locator consumes.
#[derive(Debug, Clone, Copy)]
pub struct NtfsBootSector {
    pub oem_id: u64,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub number_of_sectors: i64,
    pub mft_lcn: i64,
    pub mftmirr_lcn: i64,
    pub clusters_per_mft_record: i8,
    pub clusters_per_index_record: i8,
    pub volume_serial_number: u64,
}

/// "NTFS    " as a little-endian u64 at offset 3.
pub const NTFS_OEM_ID: u64 = 0x2020_2020_5346_544E;

impl NtfsBootSector {
    pub const SIZE: usize = 512;

    pub fn decode(buf: &[u8]) -> Result<NtfsBootSector> {
        Error::ensure(buf, 0, Self::SIZE)?;

        let boot = NtfsBootSector {
            oem_id: endian::read_u64(buf, 0x03),
            bytes_per_sector: endian::read_u16(buf, 0x0B),
            sectors_per_cluster: buf[0x0D],
            number_of_sectors: endian::read_i64(buf, 0x28),
            mft_lcn: endian::read_i64(buf, 0x30),
            mftmirr_lcn: endian::read_i64(buf, 0x38),
            clusters_per_mft_record: endian::read_i8(buf, 0x40),
            clusters_per_index_record: endian::read_i8(buf, 0x44),
            volume_serial_number: endian::read_u64(buf, 0x48),
        };

        if boot.oem_id != NTFS_OEM_ID || endian::read_u16(buf, 0x1FE) != 0xAA55 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "not an NTFS boot sector",
            )));
        }

        Ok(boot)
    }
}

/// Entry in $Mft.
#[derive(Debug, Clone, Copy)]
pub struct FileRecordSegmentHeader {
    pub multi_sector_header: MultiSectorHeader,
    pub lsn: i64,
    pub sequence_number: u16,
    pub reference_count: u16,
    pub attr_offset: u16,
    pub flags: u16,
    pub first_free_byte: u32,
    pub bytes_available: u32,
    pub base_record: u64,
    pub next_attr_instance: u16,
    pub mft_record_number: u32,
}

impl FileRecordSegmentHeader {
    pub const SIZE: usize = 48;

    pub fn decode(buf: &[u8]) -> Result<FileRecordSegmentHeader> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(FileRecordSegmentHeader {
            multi_sector_header: MultiSectorHeader::decode(buf)?,
            lsn: endian::read_i64(buf, 8),
            sequence_number: endian::read_u16(buf, 16),
            reference_count: endian::read_u16(buf, 18),
            attr_offset: endian::read_u16(buf, 20),
            flags: endian::read_u16(buf, 22),
            first_free_byte: endian::read_u32(buf, 24),
            bytes_available: endian::read_u32(buf, 28),
            base_record: endian::read_u64(buf, 32),
            next_attr_instance: endian::read_u16(buf, 40),
            mft_record_number: endian::read_u32(buf, 44),
        })
    }
}

/// Non-resident attribute record, up to the mapping-pairs tail.
#[derive(Debug, Clone, Copy)]
pub struct NonResidentAttributeRecord {
    pub type_code: u32,
    pub length: u32,
    pub form_code: u8,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub instance: u16,
    pub lowest_vcn: i64,
    pub highest_vcn: i64,
    pub mapping_pairs_offset: u16,
    pub compression_unit: u8,
    pub allocated_size: i64,
    pub data_size: i64,
    pub initialized_size: i64,
}

/// Attribute form codes.
pub const ATTRIBUTE_FORM_RESIDENT: u8 = 0x00;
pub const ATTRIBUTE_FORM_NONRESIDENT: u8 = 0x01;

impl NonResidentAttributeRecord {
    pub const SIZE: usize = 64;

    pub fn decode(buf: &[u8]) -> Result<NonResidentAttributeRecord> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(NonResidentAttributeRecord {
            type_code: endian::read_u32(buf, 0),
            length: endian::read_u32(buf, 4),
            form_code: buf[8],
            name_length: buf[9],
            name_offset: endian::read_u16(buf, 10),
            flags: endian::read_u16(buf, 12),
            instance: endian::read_u16(buf, 14),
            lowest_vcn: endian::read_i64(buf, 16),
            highest_vcn: endian::read_i64(buf, 24),
            mapping_pairs_offset: endian::read_u16(buf, 32),
            compression_unit: buf[34],
            allocated_size: endian::read_i64(buf, 40),
            data_size: endian::read_i64(buf, 48),
            initialized_size: endian::read_i64(buf, 56),
        })
    }
}

/// Each page carrying a restart area starts with this structure.
#[derive(Debug, Clone, Copy)]
pub struct RestartPageHeader {
    pub multi_sector_header: MultiSectorHeader,
    pub chkdsk_lsn: u64,
    pub system_page_size: u32,
    pub log_page_size: u32,
    pub restart_offset: u16,
    pub minor_ver: i16,
    pub major_ver: i16,
}

impl RestartPageHeader {
    pub const SIZE: usize = 30;

    pub fn decode(buf: &[u8]) -> Result<RestartPageHeader> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(RestartPageHeader {
            multi_sector_header: MultiSectorHeader::decode(buf)?,
            chkdsk_lsn: endian::read_u64(buf, 8),
            system_page_size: endian::read_u32(buf, 16),
            log_page_size: endian::read_u32(buf, 20),
            restart_offset: endian::read_u16(buf, 24),
            minor_ver: endian::read_i16(buf, 26),
            major_ver: endian::read_i16(buf, 28),
        })
    }
}

/// Restart area proper. Two copies exist, one on each of the first two
/// system pages of $LogFile.
#[derive(Debug, Clone, Copy)]
pub struct LsnRestartArea {
    pub current_lsn: Lsn,
    pub log_clients: u16,
    pub client_free_list: u16,
    pub client_in_use_list: u16,
    pub flags: u16,
    pub seq_number_bits: u32,
    pub restart_area_length: u16,
    pub client_array_offset: u16,
    pub file_size: i64,
    pub last_lsn_data_length: u32,
    pub log_record_header_length: u16,
    pub log_page_data_offset: u16,
    pub restart_log_open_count: u32,
}

/// Client list terminator in `client_free_list`/`client_in_use_list`.
pub const LOGFILE_NO_CLIENT: u16 = 0xFFFF;

impl LsnRestartArea {
    pub const SIZE: usize = 48;

    pub fn decode(buf: &[u8]) -> Result<LsnRestartArea> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(LsnRestartArea {
            current_lsn: endian::read_u64(buf, 0),
            log_clients: endian::read_u16(buf, 8),
            client_free_list: endian::read_u16(buf, 10),
            client_in_use_list: endian::read_u16(buf, 12),
            flags: endian::read_u16(buf, 14),
            seq_number_bits: endian::read_u32(buf, 16),
            restart_area_length: endian::read_u16(buf, 20),
            client_array_offset: endian::read_u16(buf, 22),
            file_size: endian::read_i64(buf, 24),
            last_lsn_data_length: endian::read_u32(buf, 32),
            log_record_header_length: endian::read_u16(buf, 36),
            log_page_data_offset: endian::read_u16(buf, 38),
            restart_log_open_count: endian::read_u32(buf, 40),
        })
    }
}

/// One slot of the client array following the restart area.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub oldest_lsn: Lsn,
    pub client_restart_lsn: Lsn,
    pub prev_client: u16,
    pub next_client: u16,
    pub seq_number: u16,
    pub name_length: u32,
    pub name: [u8; 64],
}

impl ClientRecord {
    pub const SIZE: usize = 96;

    pub fn decode(buf: &[u8]) -> Result<ClientRecord> {
        Error::ensure(buf, 0, Self::SIZE)?;

        let mut name = [0u8; 64];
        name.copy_from_slice(&buf[32..96]);

        Ok(ClientRecord {
            oldest_lsn: endian::read_u64(buf, 0),
            client_restart_lsn: endian::read_u64(buf, 8),
            prev_client: endian::read_u16(buf, 16),
            next_client: endian::read_u16(buf, 18),
            seq_number: endian::read_u16(buf, 20),
            name_length: endian::read_u32(buf, 28),
            name,
        })
    }

    /// The client's name, stored length-prefixed UTF-16LE in a 64-byte
    /// padded field.
    pub fn name(&self) -> String {
        let len = (self.name_length as usize).min(self.name.len());
        utf16le_name(&self.name[..len])
    }
}

/// The record page's `copy` field: 8 bytes read either as the last LSN on
/// the page (2.0+) or as the destination file offset of a tail page (1.x).
/// Which view applies is decided by the caller, see the tail-page flusher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPageCopy(pub u64);

impl RecordPageCopy {
    pub fn last_lsn(self) -> Lsn {
        self.0
    }

    pub fn file_offset(self) -> u64 {
        self.0
    }
}

/// Page flag: the page holds the end of a log record.
pub const LOG_PAGE_LOG_RECORD_END: u32 = 0x1;

/// Header located at the beginning of every log page.
#[derive(Debug, Clone, Copy)]
pub struct RecordPageHeader {
    pub multi_sector_header: MultiSectorHeader,
    pub copy: RecordPageCopy,
    pub flags: u32,
    pub page_count: u16,
    pub page_position: u16,
    pub next_record_offset: u16,
    pub last_end_lsn: Lsn,
}

impl RecordPageHeader {
    pub const SIZE: usize = 40;
    /// Byte offset of the `copy` union inside the page.
    pub const COPY_OFFSET: usize = 8;
    /// Byte offset of `last_end_lsn` inside the page.
    pub const LAST_END_LSN_OFFSET: usize = 32;

    pub fn decode(buf: &[u8]) -> Result<RecordPageHeader> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(RecordPageHeader {
            multi_sector_header: MultiSectorHeader::decode(buf)?,
            copy: RecordPageCopy(endian::read_u64(buf, 8)),
            flags: endian::read_u32(buf, 16),
            page_count: endian::read_u16(buf, 20),
            page_position: endian::read_u16(buf, 22),
            next_record_offset: endian::read_u16(buf, 24),
            last_end_lsn: endian::read_u64(buf, 32),
        })
    }
}

/// Owner of a log record: the client's sequence number and its index in
/// the restart block's client array.
#[derive(Debug, Clone, Copy)]
pub struct LogClientId {
    pub seq_number: u16,
    pub client_index: u16,
}

pub const RECORD_TYPE_CLIENT: u32 = 0x1;
pub const RECORD_TYPE_RESTART: u32 = 0x2;

/// Header preceding every log record.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord {
    pub this_lsn: Lsn,
    pub client_previous_lsn: Lsn,
    pub client_undo_next_lsn: Lsn,
    pub client_data_length: u32,
    pub client: LogClientId,
    pub record_type: u32,
    pub transaction_id: u32,
    pub flags: u16,
}

impl LogRecord {
    /// On-disk size including the trailing 2-byte alignment field.
    pub const SIZE: usize = 44;

    pub fn decode(buf: &[u8]) -> Result<LogRecord> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(LogRecord {
            this_lsn: endian::read_u64(buf, 0),
            client_previous_lsn: endian::read_u64(buf, 8),
            client_undo_next_lsn: endian::read_u64(buf, 16),
            client_data_length: endian::read_u32(buf, 24),
            client: LogClientId {
                seq_number: endian::read_u16(buf, 28),
                client_index: endian::read_u16(buf, 30),
            },
            record_type: endian::read_u32(buf, 32),
            transaction_id: endian::read_u32(buf, 36),
            flags: endian::read_u16(buf, 40),
        })
    }
}

/// First bytes of the client data of an NTFS log record.
#[derive(Debug, Clone)]
pub struct ClientLogHeader {
    pub redo_op: u16,
    pub undo_op: u16,
    pub redo_offset: u16,
    pub redo_length: u16,
    pub undo_offset: u16,
    pub undo_length: u16,
    pub target_attr: u16,
    pub lcns_to_follow: u16,
    pub record_offset: u16,
    pub attribute_offset: u16,
    pub cluster_block_offset: u16,
    pub target_vcn: u64,
    pub lcns_for_page: Vec<u64>,
}

impl ClientLogHeader {
    /// Size of the fixed head; `lcns_to_follow` u64 values trail it.
    pub const SIZE: usize = 32;

    pub fn decode(buf: &[u8]) -> Result<ClientLogHeader> {
        Error::ensure(buf, 0, Self::SIZE)?;

        let lcns_to_follow = endian::read_u16(buf, 14);
        // A truncated record keeps its decodable prefix of the LCN array.
        let lcns = (lcns_to_follow as usize).min((buf.len() - Self::SIZE) / 8);

        let lcns_for_page = (0..lcns)
            .map(|i| endian::read_u64(buf, Self::SIZE + i * 8))
            .collect();

        Ok(ClientLogHeader {
            redo_op: endian::read_u16(buf, 0),
            undo_op: endian::read_u16(buf, 2),
            redo_offset: endian::read_u16(buf, 4),
            redo_length: endian::read_u16(buf, 6),
            undo_offset: endian::read_u16(buf, 8),
            undo_length: endian::read_u16(buf, 10),
            target_attr: endian::read_u16(buf, 12),
            lcns_to_follow,
            record_offset: endian::read_u16(buf, 16),
            attribute_offset: endian::read_u16(buf, 18),
            cluster_block_offset: endian::read_u16(buf, 20),
            target_vcn: endian::read_u64(buf, 24),
            lcns_for_page,
        })
    }

    pub fn redo_operation(&self) -> LogOperation {
        LogOperation::from(self.redo_op)
    }

    pub fn undo_operation(&self) -> LogOperation {
        LogOperation::from(self.undo_op)
    }
}

/// Client restart area: the NTFS checkpoint record the client restart LSN
/// points at. Links out to the four restart tables.
#[derive(Debug, Clone, Copy)]
pub struct RestartArea {
    pub major_version: u32,
    pub minor_version: u32,
    pub start_of_checkpoint: Lsn,
    pub open_attr_table_lsn: Lsn,
    pub attr_names_lsn: Lsn,
    pub dirty_pages_table_lsn: Lsn,
    pub transaction_table_lsn: Lsn,
    pub open_attr_table_len: u32,
    pub attr_names_len: u32,
    pub dirty_pages_table_len: u32,
    pub transaction_table_len: u32,
}

impl RestartArea {
    pub const SIZE: usize = 64;

    pub fn decode(buf: &[u8]) -> Result<RestartArea> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(RestartArea {
            major_version: endian::read_u32(buf, 0x00),
            minor_version: endian::read_u32(buf, 0x04),
            start_of_checkpoint: endian::read_u64(buf, 0x08),
            open_attr_table_lsn: endian::read_u64(buf, 0x10),
            attr_names_lsn: endian::read_u64(buf, 0x18),
            dirty_pages_table_lsn: endian::read_u64(buf, 0x20),
            transaction_table_lsn: endian::read_u64(buf, 0x28),
            open_attr_table_len: endian::read_u32(buf, 0x30),
            attr_names_len: endian::read_u32(buf, 0x34),
            dirty_pages_table_len: endian::read_u32(buf, 0x38),
            transaction_table_len: endian::read_u32(buf, 0x3C),
        })
    }
}

/// Header of every restart table; `number_of_entries` fixed-size slots of
/// `entry_size` bytes follow.
#[derive(Debug, Clone, Copy)]
pub struct RestartTable {
    pub entry_size: u16,
    pub number_of_entries: u16,
    pub number_allocated: u16,
    pub free_goal: u32,
    pub first_free: u32,
    pub last_free: u32,
}

/// `allocated_or_next_free` value marking a slot as allocated.
pub const RESTART_ENTRY_ALLOCATED: u32 = 0xFFFF_FFFF;

impl RestartTable {
    pub const SIZE: usize = 24;

    pub fn decode(buf: &[u8]) -> Result<RestartTable> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(RestartTable {
            entry_size: endian::read_u16(buf, 0),
            number_of_entries: endian::read_u16(buf, 2),
            number_allocated: endian::read_u16(buf, 4),
            free_goal: endian::read_u32(buf, 12),
            first_free: endian::read_u32(buf, 16),
            last_free: endian::read_u32(buf, 20),
        })
    }
}

/// Dirty page table slot: a run of clusters with unflushed metadata
/// changes. The LCN tail length is derived from the table's `entry_size`.
#[derive(Debug, Clone)]
pub struct DirtyPageEntry {
    pub allocated_or_next_free: u32,
    pub target_attribute: u32,
    pub length_of_transfer: u32,
    pub lcns_to_follow: u32,
    pub vcn: u64,
    pub oldest_lsn: Lsn,
    pub lcns_for_page: Vec<u64>,
}

impl DirtyPageEntry {
    /// Size of an entry with a single-element LCN array.
    pub const BASE_SIZE: usize = 44;

    pub fn decode(buf: &[u8], lcns: usize) -> Result<DirtyPageEntry> {
        Error::ensure(buf, 0, Self::BASE_SIZE - 8 + lcns * 8)?;

        let lcns_for_page = (0..lcns)
            .map(|i| endian::read_u64(buf, 36 + i * 8))
            .collect();

        Ok(DirtyPageEntry {
            allocated_or_next_free: endian::read_u32(buf, 0),
            target_attribute: endian::read_u32(buf, 4),
            length_of_transfer: endian::read_u32(buf, 8),
            lcns_to_follow: endian::read_u32(buf, 12),
            vcn: endian::read_u64(buf, 20),
            oldest_lsn: endian::read_u64(buf, 28),
            lcns_for_page,
        })
    }
}

/// Open attribute table slot as written by 32-bit Windows.
#[derive(Debug, Clone, Copy)]
pub struct OpenAttributeEntry32 {
    pub allocated_or_next_free: u32,
    pub overlay: u32,
    pub file_reference: u64,
    pub lsn_of_open_record: Lsn,
    pub dirty_pages_seen: u8,
    pub attribute_name_present: u8,
    pub attribute_type_code: u32,
    pub attribute_name: u64,
    pub bytes_per_index_buffer: u32,
}

impl OpenAttributeEntry32 {
    pub const SIZE: usize = 44;

    pub fn decode(buf: &[u8]) -> Result<OpenAttributeEntry32> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(OpenAttributeEntry32 {
            allocated_or_next_free: endian::read_u32(buf, 0),
            overlay: endian::read_u32(buf, 4),
            file_reference: endian::read_u64(buf, 8),
            lsn_of_open_record: endian::read_u64(buf, 16),
            dirty_pages_seen: buf[24],
            attribute_name_present: buf[25],
            attribute_type_code: endian::read_u32(buf, 28),
            attribute_name: endian::read_u64(buf, 32),
            bytes_per_index_buffer: endian::read_u32(buf, 40),
        })
    }
}

/// Open attribute table slot as written by 64-bit Windows.
#[derive(Debug, Clone, Copy)]
pub struct OpenAttributeEntry64 {
    pub allocated_or_next_free: u32,
    pub attribute_type_code: u32,
    pub file_reference: u64,
    pub lsn_of_open_record: Lsn,
}

impl OpenAttributeEntry64 {
    pub const SIZE: usize = 40;

    pub fn decode(buf: &[u8]) -> Result<OpenAttributeEntry64> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(OpenAttributeEntry64 {
            allocated_or_next_free: endian::read_u32(buf, 0),
            attribute_type_code: endian::read_u32(buf, 8),
            file_reference: endian::read_u64(buf, 16),
            lsn_of_open_record: endian::read_u64(buf, 24),
        })
    }
}

/// The two open-attribute slot shapes, selected by the table's slot width
/// rather than by any flag inside the entry.
#[derive(Debug, Clone, Copy)]
pub enum OpenAttributeEntry {
    Win32(OpenAttributeEntry32),
    Win64(OpenAttributeEntry64),
}

impl OpenAttributeEntry {
    pub fn attribute_type_code(&self) -> u32 {
        match self {
            OpenAttributeEntry::Win32(e) => e.attribute_type_code,
            OpenAttributeEntry::Win64(e) => e.attribute_type_code,
        }
    }

    pub fn file_reference(&self) -> u64 {
        match self {
            OpenAttributeEntry::Win32(e) => e.file_reference,
            OpenAttributeEntry::Win64(e) => e.file_reference,
        }
    }

    pub fn lsn_of_open_record(&self) -> Lsn {
        match self {
            OpenAttributeEntry::Win32(e) => e.lsn_of_open_record,
            OpenAttributeEntry::Win64(e) => e.lsn_of_open_record,
        }
    }
}

/// State of a transaction table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Uninitialized,
    Active,
    Prepared,
    Committed,
    Unknown(u8),
}

impl From<u8> for TransactionState {
    fn from(state: u8) -> TransactionState {
        match state {
            0x0 => TransactionState::Uninitialized,
            0x1 => TransactionState::Active,
            0x2 => TransactionState::Prepared,
            0x3 => TransactionState::Committed,
            other => TransactionState::Unknown(other),
        }
    }
}

/// Transaction table slot. Other log records reference these slots by
/// their byte offset inside the table.
#[derive(Debug, Clone, Copy)]
pub struct TransactionEntry {
    pub allocated_or_next_free: u32,
    pub transaction_state: TransactionState,
    pub first_lsn: Lsn,
    pub previous_lsn: Lsn,
    pub undo_next_lsn: Lsn,
    pub undo_records: u32,
    pub undo_bytes: u32,
}

impl TransactionEntry {
    pub const SIZE: usize = 40;

    pub fn decode(buf: &[u8]) -> Result<TransactionEntry> {
        Error::ensure(buf, 0, Self::SIZE)?;

        Ok(TransactionEntry {
            allocated_or_next_free: endian::read_u32(buf, 0),
            transaction_state: TransactionState::from(buf[4]),
            first_lsn: endian::read_u64(buf, 8),
            previous_lsn: endian::read_u64(buf, 16),
            undo_next_lsn: endian::read_u64(buf, 24),
            undo_records: endian::read_u32(buf, 32),
            undo_bytes: endian::read_u32(buf, 36),
        })
    }
}

/// One entry of the attribute names dump: an open-attribute table index
/// and the attribute's UTF-16LE name.
#[derive(Debug, Clone)]
pub struct AttributeNameEntry {
    pub index: u16,
    pub name_length: u16,
    pub name: Vec<u8>,
}

impl AttributeNameEntry {
    pub fn name(&self) -> String {
        utf16le_name(&self.name)
    }
}

/// NTFS log operation codes, as carried in the redo/undo fields of the
/// client log header. The names are the ones Microsoft publishes; codes
/// outside 0x00..=0x22 decode to [`LogOperation::Unknown`] rather than
/// failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOperation {
    Noop,
    CompensationLogRecord,
    InitializeFileRecordSegment,
    DeallocateFileRecordSegment,
    WriteEndOfFileRecordSegment,
    CreateAttribute,
    DeleteAttribute,
    UpdateResidentValue,
    UpdateNonResidentValue,
    UpdateMappingPairs,
    DeleteDirtyClusters,
    SetNewAttributeSizes,
    AddIndexEntryRoot,
    DeleteIndexEntryRoot,
    AddIndexEntryAllocation,
    DeleteIndexEntryAllocation,
    WriteEndOfIndexBuffer,
    SetIndexEntryVcnRoot,
    SetIndexEntryVcnAllocation,
    UpdateFileNameRoot,
    UpdateFileNameAllocation,
    SetBitsInNonresidentBitMap,
    ClearBitsInNonresidentBitMap,
    HotFix,
    EndTopLevelAction,
    PrepareTransaction,
    CommitTransaction,
    ForgetTransaction,
    OpenNonresidentAttribute,
    OpenAttributeTableDump,
    AttributeNamesDump,
    DirtyPageTableDump,
    TransactionTableDump,
    UpdateRecordDataRoot,
    UpdateRecordDataAllocation,
    Unknown(u16),
}

impl From<u16> for LogOperation {
    fn from(op: u16) -> LogOperation {
        match op {
            0x00 => LogOperation::Noop,
            0x01 => LogOperation::CompensationLogRecord,
            0x02 => LogOperation::InitializeFileRecordSegment,
            0x03 => LogOperation::DeallocateFileRecordSegment,
            0x04 => LogOperation::WriteEndOfFileRecordSegment,
            0x05 => LogOperation::CreateAttribute,
            0x06 => LogOperation::DeleteAttribute,
            0x07 => LogOperation::UpdateResidentValue,
            0x08 => LogOperation::UpdateNonResidentValue,
            0x09 => LogOperation::UpdateMappingPairs,
            0x0A => LogOperation::DeleteDirtyClusters,
            0x0B => LogOperation::SetNewAttributeSizes,
            0x0C => LogOperation::AddIndexEntryRoot,
            0x0D => LogOperation::DeleteIndexEntryRoot,
            0x0E => LogOperation::AddIndexEntryAllocation,
            0x0F => LogOperation::DeleteIndexEntryAllocation,
            0x10 => LogOperation::WriteEndOfIndexBuffer,
            0x11 => LogOperation::SetIndexEntryVcnRoot,
            0x12 => LogOperation::SetIndexEntryVcnAllocation,
            0x13 => LogOperation::UpdateFileNameRoot,
            0x14 => LogOperation::UpdateFileNameAllocation,
            0x15 => LogOperation::SetBitsInNonresidentBitMap,
            0x16 => LogOperation::ClearBitsInNonresidentBitMap,
            0x17 => LogOperation::HotFix,
            0x18 => LogOperation::EndTopLevelAction,
            0x19 => LogOperation::PrepareTransaction,
            0x1A => LogOperation::CommitTransaction,
            0x1B => LogOperation::ForgetTransaction,
            0x1C => LogOperation::OpenNonresidentAttribute,
            0x1D => LogOperation::OpenAttributeTableDump,
            0x1E => LogOperation::AttributeNamesDump,
            0x1F => LogOperation::DirtyPageTableDump,
            0x20 => LogOperation::TransactionTableDump,
            0x21 => LogOperation::UpdateRecordDataRoot,
            0x22 => LogOperation::UpdateRecordDataAllocation,
            other => LogOperation::Unknown(other),
        }
    }
}

impl Display for LogOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogOperation::Noop => "Noop",
            LogOperation::CompensationLogRecord => "CompensationLogRecord",
            LogOperation::InitializeFileRecordSegment => "InitializeFileRecordSegment",
            LogOperation::DeallocateFileRecordSegment => "DeallocateFileRecordSegment",
            LogOperation::WriteEndOfFileRecordSegment => "WriteEndofFileRecordSegment",
            LogOperation::CreateAttribute => "CreateAttribute",
            LogOperation::DeleteAttribute => "DeleteAttribute",
            LogOperation::UpdateResidentValue => "UpdateResidentValue",
            LogOperation::UpdateNonResidentValue => "UpdateNonResidentValue",
            LogOperation::UpdateMappingPairs => "UpdateMappingPairs",
            LogOperation::DeleteDirtyClusters => "DeleteDirtyClusters",
            LogOperation::SetNewAttributeSizes => "SetNewAttributeSizes",
            LogOperation::AddIndexEntryRoot => "AddindexEntryRoot",
            LogOperation::DeleteIndexEntryRoot => "DeleteIndexEntryRoot",
            LogOperation::AddIndexEntryAllocation => "AddIndexEntryAllocation",
            LogOperation::DeleteIndexEntryAllocation => "DeleteIndexEntryAllocation",
            LogOperation::WriteEndOfIndexBuffer => "WriteEndOfIndexBuffer",
            LogOperation::SetIndexEntryVcnRoot => "SetIndexEntryVcnRoot",
            LogOperation::SetIndexEntryVcnAllocation => "SetIndexEntryVcnAllocation",
            LogOperation::UpdateFileNameRoot => "UpdateFileNameRoot",
            LogOperation::UpdateFileNameAllocation => "UpdateFileNameAllocation",
            LogOperation::SetBitsInNonresidentBitMap => "SetBitsInNonresidentBitMap",
            LogOperation::ClearBitsInNonresidentBitMap => "ClearBitsInNonresidentBitMap",
            LogOperation::HotFix => "HotFix",
            LogOperation::EndTopLevelAction => "EndTopLevelAction",
            LogOperation::PrepareTransaction => "PrepareTransaction",
            LogOperation::CommitTransaction => "CommitTransaction",
            LogOperation::ForgetTransaction => "ForgetTransaction",
            LogOperation::OpenNonresidentAttribute => "OpenNonresidentAttribute",
            LogOperation::OpenAttributeTableDump => "OpenAttributeTableDump",
            LogOperation::AttributeNamesDump => "AttributeNamesDump",
            LogOperation::DirtyPageTableDump => "DirtyPageTableDump",
            LogOperation::TransactionTableDump => "TransactionTableDump",
            LogOperation::UpdateRecordDataRoot => "UpdateRecordDataRoot",
            LogOperation::UpdateRecordDataAllocation => "UpdateRecordDataAllocation",
            LogOperation::Unknown(op) => return write!(f, "Unknown({op:#04x})"),
        };

        f.write_str(name)
    }
}
