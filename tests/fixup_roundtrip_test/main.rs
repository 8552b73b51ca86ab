//! Property: multi-sector protection round-trips at every supported
//! sector size, whatever the page contents.

use bolero::check;

use ntfsutil::mst;

const PAGE_SIZE: usize = 4096;

fn main() {
    check!().with_type().for_each(|seed: &Vec<u8>| {
        for &sector_size in &[512usize, 1024, 2048, 4096] {
            let mut page = vec![0u8; PAGE_SIZE];

            for (i, b) in page.iter_mut().enumerate() {
                *b = seed
                    .get(i % seed.len().max(1))
                    .copied()
                    .unwrap_or(0x5A)
                    .wrapping_add(i as u8);
            }

            let usa_count = (PAGE_SIZE / sector_size + 1) as u16;
            page[..4].copy_from_slice(&mst::MAGIC_RCRD.to_le_bytes());
            page[4..6].copy_from_slice(&8u16.to_le_bytes());
            page[6..8].copy_from_slice(&usa_count.to_le_bytes());

            // A decoded page carries the update sequence number in every
            // USA slot; start from that form so the round trip closes.
            for i in 0..usa_count as usize {
                page[8 + i * 2] = 0xC3;
                page[9 + i * 2] = 0x07;
            }

            let original = page.clone();

            mst::pre_write_fixup(&mut page, sector_size).expect("pre-write fixup");

            // Every sector tail now carries the update sequence number.
            let usn = [page[8], page[9]];
            for i in 1..usa_count as usize {
                assert_eq!(page[sector_size * i - 2..sector_size * i], usn);
            }

            mst::post_read_fixup(&mut page, sector_size).expect("post-read fixup");

            assert_eq!(page, original, "sector size {sector_size}");
        }
    });
}
