//! Extraction of $LogFile from a synthetic NTFS volume image.

use std::io::Write;

use ntfsutil::mst;
use ntfsutil::volume::{MmapVolumeReader, VolumeReader};

const CLUSTER: usize = 4096;
const FILE_RECORD: usize = 1024;

fn put_u16(buf: &mut [u8], pos: usize, val: u16) {
    buf[pos..pos + 2].copy_from_slice(&val.to_le_bytes());
}

fn put_u32(buf: &mut [u8], pos: usize, val: u32) {
    buf[pos..pos + 4].copy_from_slice(&val.to_le_bytes());
}

fn put_u64(buf: &mut [u8], pos: usize, val: u64) {
    buf[pos..pos + 8].copy_from_slice(&val.to_le_bytes());
}

/// 16-cluster volume: MFT at cluster 4, $LogFile occupying clusters
/// 8..=10 and 13..=14.
fn build_volume() -> Vec<u8> {
    let mut vol = vec![0u8; 16 * CLUSTER];

    // Boot sector.
    vol[3..11].copy_from_slice(b"NTFS    ");
    put_u16(&mut vol, 0x0B, 512); // bytes per sector
    vol[0x0D] = 8; // sectors per cluster
    put_u64(&mut vol, 0x28, 128); // number of sectors
    put_u64(&mut vol, 0x30, 4); // mft_lcn
    put_u64(&mut vol, 0x38, 5); // mftmirr_lcn
    vol[0x40] = (-10i8) as u8; // 1 KiB file records
    vol[0x44] = 1;
    put_u16(&mut vol, 0x1FE, 0xAA55);

    // MFT record 2.
    let rec = 4 * CLUSTER + 2 * FILE_RECORD;
    put_u32(&mut vol, rec, mst::MAGIC_FILE);
    put_u16(&mut vol, rec + 4, 0x30); // usa_ofs
    put_u16(&mut vol, rec + 6, (FILE_RECORD / 512 + 1) as u16);
    put_u16(&mut vol, rec + 20, 0x38); // attr_offset
    put_u16(&mut vol, rec + 0x30, 0x0001); // update sequence number

    // Non-resident $DATA attribute.
    let attr = rec + 0x38;
    put_u32(&mut vol, attr, 0x80);
    put_u32(&mut vol, attr + 4, 0x50); // record length
    vol[attr + 8] = 1; // non-resident
    put_u16(&mut vol, attr + 10, 0x40); // name_offset
    put_u64(&mut vol, attr + 24, 4); // highest_vcn
    put_u16(&mut vol, attr + 32, 0x40); // mapping_pairs_offset
    put_u64(&mut vol, attr + 40, (5 * CLUSTER) as u64);
    put_u64(&mut vol, attr + 48, (5 * CLUSTER) as u64);
    put_u64(&mut vol, attr + 56, (5 * CLUSTER) as u64);

    // Runlist: 3 clusters at LCN 8, 2 clusters at LCN 8 + 5 = 13.
    vol[attr + 0x40..attr + 0x47].copy_from_slice(&[0x11, 0x03, 0x08, 0x11, 0x02, 0x05, 0x00]);

    // Attribute list terminator.
    put_u32(&mut vol, attr + 0x50, 0xFFFF_FFFF);

    mst::pre_write_fixup(&mut vol[rec..rec + FILE_RECORD], 512).unwrap();

    // $LogFile content, in extraction order.
    for (i, &lcn) in [8usize, 9, 10, 13, 14].iter().enumerate() {
        for j in 0..CLUSTER {
            vol[lcn * CLUSTER + j] = ((i * 31 + j * 7) % 251) as u8;
        }
    }

    vol
}

fn expected_logfile() -> Vec<u8> {
    let mut expected = vec![0u8; 5 * CLUSTER];
    for i in 0..5 {
        for j in 0..CLUSTER {
            expected[i * CLUSTER + j] = ((i * 31 + j * 7) % 251) as u8;
        }
    }
    expected
}

#[test]
fn test_logfile_runlist() {
    let vol = build_volume();
    let reader = VolumeReader::new(&vol).unwrap();

    assert_eq!(reader.cluster_size(), CLUSTER as u64);
    assert_eq!(reader.file_record_size(), FILE_RECORD as u64);

    let runs = reader.logfile_runlist().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!((runs[0].vcn, runs[0].lcn, runs[0].length), (0, Some(8), 3));
    assert_eq!((runs[1].vcn, runs[1].lcn, runs[1].length), (3, Some(13), 2));

    // The runs cover the attribute's whole VCN range.
    let total: u64 = runs.iter().map(|r| r.length).sum();
    assert_eq!(total, 5);
}

#[test]
fn test_extract_logfile() {
    let vol = build_volume();
    let reader = VolumeReader::new(&vol).unwrap();

    let mut out = Vec::new();
    let written = reader.extract_logfile(&mut out).unwrap();

    assert_eq!(written, (5 * CLUSTER) as u64);
    assert_eq!(out, expected_logfile());
}

#[test]
fn test_extract_logfile_from_mapped_volume() {
    let vol = build_volume();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vol).unwrap();
    file.flush().unwrap();

    let mapped = MmapVolumeReader::open(file.path()).unwrap();
    let reader = mapped.reader().unwrap();

    let mut out = Vec::new();
    reader.extract_logfile(&mut out).unwrap();

    assert_eq!(out, expected_logfile());
}
