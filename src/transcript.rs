//! Settled session transcript and the log files mirroring it.
//!
//! The transcript is `committed rows + current screen`. Committed rows only
//! ever grow; the screen tail is replaced on every update. Log files are kept
//! byte-identical to the transcript from the moment they are opened by
//! truncating back to the committed boundary before each write.

use crate::screen::ScrollbackObserver;
use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Default)]
pub struct Transcript {
    log: Vec<u8>,
    flushed: usize,
    sinks: BTreeMap<String, File>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full transcript: committed rows followed by the current tail.
    pub fn contents(&self) -> &[u8] {
        &self.log
    }

    /// Length of the committed part of [`contents`](Self::contents).
    pub fn flushed_len(&self) -> usize {
        self.flushed
    }

    pub fn has_sink(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    /// Open a log file seeded with the transcript so far.
    ///
    /// Opening a name that is already open is a no-op.
    pub fn add_sink(&mut self, name: &str) -> Result<()> {
        tracing::info!("Add log {}", name);
        if self.has_sink(name) {
            tracing::info!("Log {} already added", name);
            return Ok(());
        }
        let mut file = File::create(Path::new(name))
            .with_context(|| format!("Failed to create log file: {}", name))?;
        file.write_all(&self.log)
            .and_then(|()| file.flush())
            .with_context(|| format!("Failed to write log file: {}", name))?;
        self.sinks.insert(name.to_string(), file);
        Ok(())
    }

    /// Close every log file and forget the transcript.
    pub fn reset(&mut self) {
        tracing::info!("Reset logs");
        self.sinks.clear();
        self.log.clear();
        self.flushed = 0;
    }

    /// Commit a settled row.
    pub fn push_row(&mut self, row: &[u8]) -> io::Result<()> {
        self.rewrite_tail(row)?;
        self.log.truncate(self.flushed);
        self.log.extend_from_slice(row);
        self.flushed += row.len();
        Ok(())
    }

    /// Replace the unsettled tail with `snapshot`.
    pub fn update_tail(&mut self, snapshot: &[u8]) -> io::Result<()> {
        self.rewrite_tail(snapshot)?;
        self.log.truncate(self.flushed);
        self.log.extend_from_slice(snapshot);
        Ok(())
    }

    fn rewrite_tail(&mut self, tail: &[u8]) -> io::Result<()> {
        let flushed = self.flushed as u64;
        for file in self.sinks.values_mut() {
            file.seek(SeekFrom::Start(flushed))?;
            file.set_len(flushed)?;
            file.write_all(tail)?;
            file.flush()?;
        }
        Ok(())
    }
}

impl ScrollbackObserver for Transcript {
    fn row_evicted(&mut self, row: &[u8]) -> io::Result<()> {
        self.push_row(row)
    }
}
