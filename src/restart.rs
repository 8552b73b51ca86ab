//! Restart blocks and the client restart context.
//!
//! $LogFile opens with two system pages that each carry a restart block:
//! the restart page header, the LSN restart area and the client array.
//! The block with the higher `current_lsn` is the valid one, the other is
//! kept as a backup. The client restart context is reconstructed from the
//! four restart tables the client's checkpoint record links to.

use std::collections::BTreeMap;

use tracing::warn;

use crate::Lsn;
use crate::error::{Error, Result};
use crate::layout::{
    AttributeNameEntry, ClientLogHeader, ClientRecord, DirtyPageEntry, LsnRestartArea,
    OpenAttributeEntry, OpenAttributeEntry32, OpenAttributeEntry64, RestartPageHeader,
    RestartTable, TransactionEntry,
};
use crate::{endian, mst};

/// Max cluster (and therefore journal page) size is 64 KiB.
pub const MAX_SYSTEM_PAGE_SIZE: u64 = 64 * 1024;

/// One decoded restart block.
#[derive(Debug, Clone)]
pub struct RestartBlock {
    pub header: RestartPageHeader,
    pub area: LsnRestartArea,
    pub clients: Vec<ClientRecord>,
}

impl RestartBlock {
    /// Decode a restart block from a fixed-up system page.
    ///
    /// Layout:
    ///
    /// ```text
    /// +-------------------+ 0x0
    /// | RestartPageHeader |---+
    /// +-------------------+   | restart_offset
    /// ~                   ~   |
    /// +-------------------+<--+
    /// |  LsnRestartArea   |---+
    /// +-------------------+   | restart_offset +
    /// ~                   ~   | client_array_offset
    /// +-------------------+<--+
    /// | ClientRecordArray |
    /// ~                   ~
    /// +-------------------+ system page size
    /// ```
    pub fn decode(page: &[u8]) -> Result<RestartBlock> {
        let header = RestartPageHeader::decode(page)?;

        let area_offset = header.restart_offset as usize;
        Error::ensure(page, area_offset, LsnRestartArea::SIZE)?;
        let area = LsnRestartArea::decode(&page[area_offset..])?;

        let mut clients = Vec::with_capacity(area.log_clients as usize);
        let mut pos = area_offset + area.client_array_offset as usize;

        for _ in 0..area.log_clients {
            Error::ensure(page, pos, ClientRecord::SIZE)?;
            clients.push(ClientRecord::decode(&page[pos..])?);
            pos += ClientRecord::SIZE;
        }

        Ok(RestartBlock {
            header,
            area,
            clients,
        })
    }
}

/// Read both restart blocks from the start of a $LogFile image.
///
/// Returns `(valid, backup)`: the block with the higher `current_lsn`
/// first. A block whose page fails the fixup is dropped; when both fail
/// the journal is unusable and [`Error::NoValidRestart`] is returned.
pub fn read_restart_blocks(logfile: &[u8]) -> Result<(RestartBlock, Option<RestartBlock>)> {
    // Probe the first sector for the system page size before committing
    // to full page reads.
    Error::ensure(logfile, 0, mst::SECTOR_SIZE)?;
    let probe = RestartPageHeader::decode(logfile)?;

    let page_size = probe.system_page_size as u64;
    if page_size > MAX_SYSTEM_PAGE_SIZE || !page_size.is_power_of_two() {
        return Err(Error::InvalidPageSize(page_size));
    }
    let page_size = page_size as usize;

    let mut blocks: [Option<RestartBlock>; 2] = [None, None];

    for (i, slot) in blocks.iter_mut().enumerate() {
        let pos = i * page_size;
        Error::ensure(logfile, pos, page_size)?;

        let mut page = logfile[pos..pos + page_size].to_vec();

        match mst::post_read_fixup(&mut page, mst::SECTOR_SIZE) {
            Ok(()) => *slot = Some(RestartBlock::decode(&page)?),
            Err(err) => warn!(page = i, %err, "restart page dropped"),
        }
    }

    let [first, second] = blocks;

    match (first, second) {
        (Some(a), Some(b)) => {
            if a.area.current_lsn < b.area.current_lsn {
                Ok((b, Some(a)))
            } else {
                Ok((a, Some(b)))
            }
        }
        (Some(a), None) => Ok((a, None)),
        (None, Some(b)) => Ok((b, None)),
        (None, None) => Err(Error::NoValidRestart),
    }
}

/// Everything a client needs to restart the volume: the checkpoint LSN
/// and the four tables describing unflushed state.
#[derive(Debug, Clone, Default)]
pub struct ClientRestartContext {
    pub checkpoint: Lsn,
    pub attribute_names: Vec<AttributeNameEntry>,
    pub dirty_pages: Vec<DirtyPageEntry>,
    /// Keyed by the slot's byte offset inside the on-disk table; log
    /// records reference open attributes by that offset.
    pub open_attributes: BTreeMap<u32, OpenAttributeEntry>,
    /// Keyed like `open_attributes`.
    pub transactions: BTreeMap<u32, TransactionEntry>,
}

/// Parse dirty page entries. Every slot carries a variable LCN tail whose
/// length falls out of the table's `entry_size`.
pub fn parse_dirty_pages(table: &RestartTable, data: &[u8]) -> Result<Vec<DirtyPageEntry>> {
    let entry_size = table.entry_size as usize;

    if entry_size < DirtyPageEntry::BASE_SIZE {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("dirty page entry size {entry_size} is too small"),
        )));
    }

    let lcns_per_page = 1 + (entry_size - DirtyPageEntry::BASE_SIZE) / 8;
    let mut entries = Vec::with_capacity(table.number_of_entries as usize);

    for i in 0..table.number_of_entries as usize {
        Error::ensure(data, i * entry_size, entry_size)?;
        entries.push(DirtyPageEntry::decode(
            &data[i * entry_size..(i + 1) * entry_size],
            lcns_per_page,
        )?);
    }

    Ok(entries)
}

/// Parse transaction entries, keyed by their table offset.
pub fn parse_transactions(
    table: &RestartTable,
    data: &[u8],
) -> Result<BTreeMap<u32, TransactionEntry>> {
    let entry_size = table.entry_size as usize;
    let mut entries = BTreeMap::new();

    for i in 0..table.number_of_entries as usize {
        Error::ensure(data, i * entry_size, entry_size)?;

        let entry = TransactionEntry::decode(&data[i * entry_size..(i + 1) * entry_size])?;
        entries.insert((RestartTable::SIZE + i * entry_size) as u32, entry);
    }

    Ok(entries)
}

/// Parse open attribute entries, keyed by their table offset. The slot
/// width picks between the 32-bit and 64-bit Windows layouts.
pub fn parse_open_attributes(
    table: &RestartTable,
    data: &[u8],
) -> Result<BTreeMap<u32, OpenAttributeEntry>> {
    let entry_size = table.entry_size as usize;
    let mut entries = BTreeMap::new();

    for i in 0..table.number_of_entries as usize {
        Error::ensure(data, i * entry_size, entry_size)?;
        let slot = &data[i * entry_size..(i + 1) * entry_size];

        let entry = if entry_size < OpenAttributeEntry32::SIZE {
            OpenAttributeEntry::Win64(OpenAttributeEntry64::decode(slot)?)
        } else {
            OpenAttributeEntry::Win32(OpenAttributeEntry32::decode(slot)?)
        };

        entries.insert((RestartTable::SIZE + i * entry_size) as u32, entry);
    }

    Ok(entries)
}

/// Parse the attribute names dump out of a record's client data. Entries
/// repeat until a zero index with a zero length.
pub fn parse_attribute_names(data: &[u8]) -> Result<Vec<AttributeNameEntry>> {
    let header = ClientLogHeader::decode(data)?;

    let start = header.redo_offset as usize;
    Error::ensure(data, start, 0)?;
    let names = &data[start..];

    let mut entries = Vec::new();
    let mut pos = 0usize;

    loop {
        Error::ensure(names, pos, 4)?;

        let index = endian::read_u16(names, pos);
        let length = endian::read_u16(names, pos + 2) as usize;

        if index == 0 && length == 0 {
            break;
        }

        Error::ensure(names, pos + 4, length)?;
        entries.push(AttributeNameEntry {
            index,
            name_length: length as u16,
            name: names[pos + 4..pos + 4 + length].to_vec(),
        });

        // On-disk stride: index, length, name, 2 bytes of padding.
        pos += 6 + length;
    }

    Ok(entries)
}
