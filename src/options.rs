use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReaderKind {
    /// Seek and read through the target's mem file.
    Seek,
    /// Copy with process_vm_readv, one chunk at a time.
    VmRead,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Action {
    /// Snapshot the readable private memory of a running process.
    Dump {
        // PID of the target process
        #[arg(short = 'p', long = "pid")]
        pid: i32,
        // Directory receiving one file per captured region
        #[arg(long = "path")]
        path: Option<PathBuf>,
        // Write the snapshot to stdout as a framed byte stream instead
        #[arg(long = "stream", default_value_t = false)]
        stream: bool,
        // Memory access strategy
        #[arg(long = "reader", value_enum, default_value_t = ReaderKind::Seek)]
        reader: ReaderKind,
    },
    /// Split a streamed snapshot back into a directory of region files.
    Split {
        // Stream file produced by `dump --stream`
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        // Directory receiving the region files
        #[arg(long = "path")]
        path: PathBuf,
    },
}

#[derive(Clone, Debug, Parser)]
#[command(version, about = "memsnap (process memory snapshot tool)")]
pub struct Options {
    #[command(subcommand)]
    pub action: Action,
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        match &self.action {
            Action::Dump {
                pid, path, stream, ..
            } => {
                if *pid <= 0 {
                    return Err(anyhow!("--pid must be a positive process id"));
                }
                match (path, stream) {
                    (Some(_), true) => {
                        Err(anyhow!("--path and --stream are mutually exclusive"))
                    }
                    (None, false) => Err(anyhow!("either --path or --stream is required")),
                    _ => Ok(()),
                }
            }
            Action::Split { .. } => Ok(()),
        }
    }
}
