use thiserror::Error;

use crate::Lsn;

#[derive(Debug, Error)]
pub enum Error {
    /// The restart page header claims a system page larger than the 64 KiB
    /// NTFS cluster maximum, or a page size that is not a power of two.
    #[error("invalid system page size {0:#x}")]
    InvalidPageSize(u64),

    /// A multi-sector (USA) fixup failed: the value stored at a sector tail
    /// does not match the update sequence number of the page.
    #[error("torn page, fixup mismatch at byte {offset:#x}")]
    TornPage { offset: usize },

    /// The requested logging client is not present in the restart block.
    #[error("no log client named {0:?}")]
    UnknownClient(String),

    /// A log record header does not carry the LSN it was addressed by.
    #[error("invalid LSN {found:#x}, expected {expected:#x}")]
    LsnMismatch { expected: Lsn, found: Lsn },

    /// Neither restart page survived the multi-sector fixup.
    #[error("no valid restart page")]
    NoValidRestart,

    /// A structure extends past the end of its buffer.
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Bounds check used by every codec before it touches `buf`.
    pub fn ensure(buf: &[u8], pos: usize, len: usize) -> Result<()> {
        match pos.checked_add(len) {
            Some(end) if end <= buf.len() => Ok(()),
            _ => Err(Error::UnexpectedEof),
        }
    }
}
