//! Local-file implementation of [`DataSink`].
//!
//! The file must already exist; [`LocalFileSink::open_for_write`] opens it
//! write-only without truncating and hands it to a dedicated [`IoWorker`].
//! Closing the sink stops the worker, which flushes (and optionally syncs)
//! the file before the handle is released.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::TransferBuffer;
use crate::traits::{Completion, DataSink, Operation, SubmitError, Tag, not_open};
use crate::worker::{Backend, IoWorker};

/// Write-only endpoint backed by a local file.
#[derive(Debug)]
pub struct LocalFileSink {
    path: PathBuf,
    fsync: bool,
    worker: Option<IoWorker>,
}

impl LocalFileSink {
    /// Creates a closed sink for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync: false,
            worker: None,
        }
    }

    /// Requests `fsync` of the file when the sink is closed.
    #[must_use]
    pub const fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// Returns the destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSink for LocalFileSink {
    fn open_for_write(&mut self) -> io::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        let backend = FileBackend {
            file,
            fsync: self.fsync,
        };
        self.worker = Some(IoWorker::spawn("fetchpipe-sink", backend)?);
        debug!(target: "fetchpipe::io", path = %self.path.display(), "sink opened");
        Ok(())
    }

    fn write_async(
        &mut self,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        match self.worker.as_mut() {
            Some(worker) => worker.submit(Operation::Write, buffer, offset, len, tag),
            None => Err(SubmitError::new(
                Operation::Write,
                not_open(Operation::Write),
                buffer,
            )),
        }
    }

    fn task(&mut self) -> Option<Completion> {
        self.worker.as_mut()?.try_complete()
    }

    fn close_for_write(&mut self) -> io::Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.shutdown()?;
        debug!(target: "fetchpipe::io", path = %self.path.display(), "sink closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for LocalFileSink {
    fn drop(&mut self) {
        if let Err(error) = self.close_for_write() {
            warn!(
                target: "fetchpipe::io",
                path = %self.path.display(),
                %error,
                "closing sink failed"
            );
        }
    }
}

struct FileBackend {
    file: File,
    fsync: bool,
}

impl Backend for FileBackend {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write(buf)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.fsync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}
