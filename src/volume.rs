//! Locating and extracting $LogFile from a raw NTFS volume.
//!
//! The journal is an ordinary (non-resident) $DATA stream of MFT record
//! number 2; finding it only needs the boot sector, the one file record
//! and its runlist. Nothing else of the MFT is touched.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use mmap_rs::{Mmap, MmapFlags, MmapOptions};

use crate::error::{Error, Result};
use crate::layout::{
    ATTRIBUTE_FORM_NONRESIDENT, FileRecordSegmentHeader, NonResidentAttributeRecord,
    NtfsBootSector,
};
use crate::mst;
use crate::runlist::{self, DataRun};

/// $LogFile is MFT record number 2, between $MFTMirr and $Volume.
pub const LOGFILE_MFT_RECORD_NUMBER: u64 = 2;

/// $DATA attribute type code.
pub const ATTR_TYPE_DATA: u32 = 0x80;

/// Attribute list terminator.
pub const ATTR_END_MARKER: u32 = 0xFFFF_FFFF;

/// Runs longer than this many clusters are copied out in chunks.
const EXTRACT_CHUNK_CLUSTERS: u64 = 64;

#[derive(Debug, Clone)]
pub struct VolumeReader<'a> {
    buf: &'a [u8],
    boot: NtfsBootSector,
    cluster_size: u64,
    file_record_size: u64,
}

impl<'a> VolumeReader<'a> {
    pub fn new(buf: &'a [u8]) -> Result<VolumeReader<'a>> {
        let boot = NtfsBootSector::decode(buf)?;

        let cluster_size = boot.bytes_per_sector as u64 * boot.sectors_per_cluster as u64;

        // A negative value encodes the record size as a power of two,
        // independent of the cluster size.
        let file_record_size = if boot.clusters_per_mft_record < 0 {
            1u64 << -(boot.clusters_per_mft_record as i32)
        } else {
            boot.clusters_per_mft_record as u64 * cluster_size
        };

        Ok(VolumeReader {
            buf,
            boot,
            cluster_size,
            file_record_size,
        })
    }

    pub fn boot(&self) -> &NtfsBootSector {
        &self.boot
    }

    pub fn cluster_size(&self) -> u64 {
        self.cluster_size
    }

    pub fn file_record_size(&self) -> u64 {
        self.file_record_size
    }

    fn block(&self, pos: u64, len: u64) -> Result<&'a [u8]> {
        let pos = usize::try_from(pos).map_err(|_| Error::UnexpectedEof)?;
        let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;

        Error::ensure(self.buf, pos, len)?;
        Ok(&self.buf[pos..pos + len])
    }

    /// Read MFT record 2, undo its fixup, and return the runlist of the
    /// first non-resident $DATA attribute.
    pub fn logfile_runlist(&self) -> Result<Vec<DataRun>> {
        let record_offset = self.boot.mft_lcn as u64 * self.cluster_size
            + LOGFILE_MFT_RECORD_NUMBER * self.file_record_size;

        let mut record = self.block(record_offset, self.file_record_size)?.to_vec();
        mst::post_read_fixup(&mut record, self.boot.bytes_per_sector as usize)?;

        let header = FileRecordSegmentHeader::decode(&record)?;
        if header.multi_sector_header.magic != mst::MAGIC_FILE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "MFT record 2 is not a file record",
            )));
        }

        let mut pos = header.attr_offset as usize;

        loop {
            Error::ensure(&record, pos, 8)?;

            let type_code = crate::endian::read_u32(&record, pos);
            if type_code == ATTR_END_MARKER {
                break;
            }

            let length = crate::endian::read_u32(&record, pos + 4) as usize;
            if length == 0 {
                return Err(Error::UnexpectedEof);
            }
            Error::ensure(&record, pos, length)?;

            let attr = &record[pos..pos + length];
            if type_code == ATTR_TYPE_DATA && attr[8] == ATTRIBUTE_FORM_NONRESIDENT {
                let data = NonResidentAttributeRecord::decode(attr)?;

                return runlist::decode_mapping_pairs(
                    attr,
                    data.lowest_vcn,
                    data.mapping_pairs_offset as usize,
                );
            }

            pos += length;
        }

        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "$LogFile has no non-resident $DATA attribute",
        )))
    }

    /// Stream the $LogFile contents into `out`, one extent at a time.
    /// Returns the number of bytes written.
    pub fn extract_logfile(&self, mut out: impl Write) -> Result<u64> {
        let runlist = self.logfile_runlist()?;
        let mut written = 0u64;

        for run in runlist {
            match run.lcn {
                Some(lcn) => {
                    let mut pos = lcn as u64 * self.cluster_size;
                    let mut remaining = run.length;

                    while remaining > 0 {
                        let clusters = remaining.min(EXTRACT_CHUNK_CLUSTERS);
                        let chunk = self.block(pos, clusters * self.cluster_size)?;

                        out.write_all(chunk)?;

                        pos += clusters * self.cluster_size;
                        remaining -= clusters;
                        written += clusters * self.cluster_size;
                    }
                }
                None => {
                    // Sparse run; materialize as zero clusters so extent
                    // boundaries stay in place.
                    let zeros = vec![0u8; self.cluster_size as usize];
                    for _ in 0..run.length {
                        out.write_all(&zeros)?;
                        written += self.cluster_size;
                    }
                }
            }
        }

        Ok(written)
    }
}

pub struct MmapVolumeReader {
    m: Mmap,
}

impl MmapVolumeReader {
    pub fn open(file_path: &Path) -> anyhow::Result<MmapVolumeReader> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("open volume at {}", file_path.display()))?;
        let meta = file.metadata().context("get metadata for volume file")?;
        let size = meta.len();

        if size == 0 {
            return Err(anyhow::anyhow!("volume file is empty"));
        }

        let mmap = unsafe {
            MmapOptions::new(size as usize)
                .context("mmap option")?
                .with_file(&file, 0u64)
                .with_flags(MmapFlags::SHARED)
                .map()
                .context("mmap volume file")?
        };

        Ok(MmapVolumeReader { m: mmap })
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reader(&self) -> Result<VolumeReader<'_>> {
        VolumeReader::new(self.m.as_slice())
    }
}
