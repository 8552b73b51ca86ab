// Functions related to encoding.
use byteorder::{ByteOrder, LittleEndian};

// NTFS stores every on-disk integer little-endian, regardless of the
// host. The least significant byte is at the lowest address.
type E = LittleEndian;

pub fn read_u16(buf: &[u8], pos: usize) -> u16 {
    E::read_u16(&buf[pos..])
}

pub fn read_u32(buf: &[u8], pos: usize) -> u32 {
    E::read_u32(&buf[pos..])
}

pub fn read_u64(buf: &[u8], pos: usize) -> u64 {
    E::read_u64(&buf[pos..])
}

pub fn read_i8(buf: &[u8], pos: usize) -> i8 {
    buf[pos] as i8
}

pub fn read_i16(buf: &[u8], pos: usize) -> i16 {
    E::read_i16(&buf[pos..])
}

pub fn read_i64(buf: &[u8], pos: usize) -> i64 {
    E::read_i64(&buf[pos..])
}

pub fn write_u64(buf: &mut [u8], pos: usize, val: u64) {
    E::write_u64(&mut buf[pos..], val);
}
