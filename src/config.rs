use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser, ValueEnum};

use crate::logfile::NTFS_CLIENT_NAME;

/// Name $LogFile is extracted under when reading from a raw volume.
pub const LOGFILE_NAME: &str = "$LogFile";

#[derive(Parser)]
#[command(
    name = "ntfsutil",
    about = "Inspects the NTFS transactional journal ($LogFile)",
    group(ArgGroup::new("journal_source").required(true))
)]
pub struct Config {
    // arg group
    #[clap(
        long = "volume-path",
        help = "Path to a raw NTFS volume (for example \\\\.\\C: or an image file)",
        group = "journal_source"
    )]
    pub volume_path: Option<PathBuf>,

    #[clap(
        long = "logfile-path",
        help = "Path to an already extracted $LogFile",
        group = "journal_source"
    )]
    pub logfile_path: Option<PathBuf>,

    #[clap(
        default_value = "false",
        long,
        help = "Flush tail pages into the logfile in place instead of on an in-memory copy"
    )]
    pub write: bool,

    #[clap(long, default_value = NTFS_CLIENT_NAME, help = "Logging client to inspect")]
    pub client: String,

    #[clap(
        long,
        value_enum,
        default_value_t = RestartBlockChoice::Backup,
        help = "Restart block the journal is seeded from"
    )]
    pub restart_block: RestartBlockChoice,

    #[clap(
        long,
        help = "Directory for the CSV reports (defaults to the logfile's directory)"
    )]
    pub output_dir: Option<PathBuf>,
}

/// Which of the two restart blocks seeds the journal. The backup block
/// reflects the last fully flushed state, which is the safer default for
/// offline inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RestartBlockChoice {
    Valid,
    Backup,
}

impl Config {
    pub fn output_dir(&self, logfile_path: &Path) -> PathBuf {
        if let Some(ref dir) = self.output_dir {
            return dir.clone();
        }

        match logfile_path.parent() {
            Some(parent) if parent != Path::new("") => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
