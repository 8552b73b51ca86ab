pub mod config;
pub mod endian;
pub mod error;
pub mod layout;
pub mod logfile;
pub mod mst;
pub mod restart;
pub mod runlist;
pub mod volume;

// Type (lsn_t) used for all log sequence number storage and arithmetics.
pub type Lsn = u64;

pub const LSN_MAX: Lsn = u64::MAX;
