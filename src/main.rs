use std::fs::File;
use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;
use memsnap::{
    capture::capture,
    options::{Action, Options, ReaderKind},
    reader::{ProcMemReader, RegionReader, VmReadReader},
    sink::{DirSink, SnapshotSink, StreamSink, split_stream},
};
use nix::unistd::Pid;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let options = Options::parse();
    options.validate()?;

    // Diagnostics go to stderr; stdout may be carrying the snapshot stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match options.action {
        Action::Dump {
            pid,
            path,
            stream: _,
            reader,
        } => {
            let pid = Pid::from_raw(pid);
            let mut reader: Box<dyn RegionReader> = match reader {
                ReaderKind::Seek => Box::new(ProcMemReader::open(pid)?),
                ReaderKind::VmRead => Box::new(VmReadReader::new(pid)),
            };
            let mut sink: Box<dyn SnapshotSink> = match path {
                Some(dir) => Box::new(DirSink::create(dir)?),
                None => Box::new(StreamSink::new(BufWriter::new(io::stdout().lock()))),
            };
            capture(pid, reader.as_mut(), sink.as_mut())?;
        }
        Action::Split { input, path } => {
            let mut file =
                File::open(&input).with_context(|| format!("cannot open {}", input.display()))?;
            let count = split_stream(&mut file, &path)?;
            info!("{} ranges restored to {}", count, path.display());
        }
    }

    Ok(())
}
