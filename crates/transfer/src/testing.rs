//! In-memory endpoints for exercising the pipeline without real I/O.
//!
//! Requests complete on the next `task()` call, never during submission.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use fast_io::{Completion, DataSink, DataSource, Operation, SubmitError, Tag, TransferBuffer};

/// Everything the endpoints observed, shared with the test body.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub(crate) reads: Vec<(u64, usize)>,
    pub(crate) writes: Vec<(u64, usize)>,
    pub(crate) output: Vec<u8>,
    pub(crate) source_closes: usize,
    pub(crate) sink_closes: usize,
    pub(crate) sink_opened: bool,
}

pub(crate) type SharedJournal = Rc<RefCell<Journal>>;

pub(crate) fn journal() -> SharedJournal {
    Rc::new(RefCell::new(Journal::default()))
}

fn injected(kind: io::ErrorKind) -> io::Error {
    io::Error::new(kind, "injected failure")
}

#[derive(Debug)]
pub(crate) struct MemorySource {
    data: Vec<u8>,
    journal: SharedJournal,
    pending: Option<Completion>,
    stalled: Option<TransferBuffer>,
    open: bool,
    pub(crate) reported_size: Option<u64>,
    pub(crate) fail_open: bool,
    pub(crate) fail_size: bool,
    pub(crate) fail_read_at: Option<u64>,
    pub(crate) reject_reads: bool,
    pub(crate) stall_read_at: Option<u64>,
}

impl MemorySource {
    pub(crate) fn new(data: Vec<u8>, journal: &SharedJournal) -> Self {
        Self {
            data,
            journal: Rc::clone(journal),
            pending: None,
            stalled: None,
            open: false,
            reported_size: None,
            fail_open: false,
            fail_size: false,
            fail_read_at: None,
            reject_reads: false,
            stall_read_at: None,
        }
    }
}

impl DataSource for MemorySource {
    fn open_for_read(&mut self) -> io::Result<()> {
        if self.fail_open {
            return Err(injected(io::ErrorKind::ConnectionRefused));
        }
        self.open = true;
        Ok(())
    }

    fn remote_size(&mut self) -> io::Result<u64> {
        if self.fail_size {
            return Err(injected(io::ErrorKind::Unsupported));
        }
        Ok(self.reported_size.unwrap_or(self.data.len() as u64))
    }

    fn read_async(
        &mut self,
        mut buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        if !self.open || self.reject_reads {
            return Err(SubmitError::new(
                Operation::Read,
                injected(io::ErrorKind::NotConnected),
                buffer,
            ));
        }
        self.journal.borrow_mut().reads.push((offset, len));
        if self.stall_read_at == Some(offset) {
            // Accepted but never completed.
            self.stalled = Some(buffer);
            return Ok(());
        }

        let result = if self.fail_read_at == Some(offset) {
            Err(injected(io::ErrorKind::ConnectionReset))
        } else {
            let start = (offset as usize).min(self.data.len());
            let end = (start + len).min(self.data.len());
            let count = end - start;
            match buffer.region_mut(count) {
                Some(region) => {
                    region.copy_from_slice(&self.data[start..end]);
                    Ok(count)
                }
                None => Err(injected(io::ErrorKind::InvalidInput)),
            }
        };
        self.pending = Some(Completion::new(Operation::Read, buffer, tag, result));
        Ok(())
    }

    fn task(&mut self) -> Option<Completion> {
        if !self.open {
            return None;
        }
        self.pending.take()
    }

    fn close_for_read(&mut self) {
        if self.open {
            self.open = false;
            self.pending = None;
            self.stalled = None;
            self.journal.borrow_mut().source_closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug)]
pub(crate) struct MemorySink {
    journal: SharedJournal,
    pending: Option<Completion>,
    open: bool,
    pub(crate) fail_open: bool,
    pub(crate) fail_write_at: Option<u64>,
    pub(crate) short_write_at: Option<u64>,
    pub(crate) fail_close: bool,
}

impl MemorySink {
    pub(crate) fn new(journal: &SharedJournal) -> Self {
        Self {
            journal: Rc::clone(journal),
            pending: None,
            open: false,
            fail_open: false,
            fail_write_at: None,
            short_write_at: None,
            fail_close: false,
        }
    }
}

impl DataSink for MemorySink {
    fn open_for_write(&mut self) -> io::Result<()> {
        if self.fail_open {
            return Err(injected(io::ErrorKind::PermissionDenied));
        }
        self.open = true;
        self.journal.borrow_mut().sink_opened = true;
        Ok(())
    }

    fn write_async(
        &mut self,
        buffer: TransferBuffer,
        offset: u64,
        len: usize,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        if !self.open {
            return Err(SubmitError::new(
                Operation::Write,
                injected(io::ErrorKind::NotConnected),
                buffer,
            ));
        }
        let mut journal = self.journal.borrow_mut();
        journal.writes.push((offset, len));

        let result = if self.fail_write_at == Some(offset) {
            Err(injected(io::ErrorKind::StorageFull))
        } else {
            let count = if self.short_write_at == Some(offset) {
                len / 2
            } else {
                len
            };
            match buffer.filled(count) {
                Some(bytes) => {
                    let start = offset as usize;
                    if journal.output.len() < start + count {
                        journal.output.resize(start + count, 0);
                    }
                    journal.output[start..start + count].copy_from_slice(bytes);
                    Ok(count)
                }
                None => Err(injected(io::ErrorKind::InvalidInput)),
            }
        };
        drop(journal);
        self.pending = Some(Completion::new(Operation::Write, buffer, tag, result));
        Ok(())
    }

    fn task(&mut self) -> Option<Completion> {
        if !self.open {
            return None;
        }
        self.pending.take()
    }

    fn close_for_write(&mut self) -> io::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.pending = None;
        self.journal.borrow_mut().sink_closes += 1;
        if self.fail_close {
            return Err(injected(io::ErrorKind::StorageFull));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
