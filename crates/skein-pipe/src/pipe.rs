use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use skein_core::{Handle, IoError, NodeError};
use skein_notify::NotificationQueue;

use crate::config::PipeConfig;

struct PipeBuffer {
    data: Vec<u8>,
    closed: bool,
    poisoned: Option<NodeError>,
}

/// A single-writer, many-reader broadcast byte stream (component C2).
///
/// The buffer lives behind one short-held lock; readers each track their own
/// offset so that N concurrent readers never contend with each other, only
/// with the writer (and only while copying out, or while the writer itself
/// is appending).
pub struct Pipe {
    progress: Handle,
    reader_progress: Handle,
    queue: NotificationQueue,
    config: PipeConfig,
    buffer: Mutex<PipeBuffer>,
    reader_positions: Mutex<Vec<Arc<AtomicUsize>>>,
}

impl Pipe {
    /// Creates a pipe and returns its sole writer handle alongside the
    /// shared pipe. `progress` (see [`Pipe::progress_handle`]) doubles as
    /// the source node's progress signal observed by the scheduler.
    pub fn new(queue: NotificationQueue, debug_hint: impl Into<Arc<str>>, config: PipeConfig) -> (Arc<Pipe>, PipeWriter) {
        let hint: Arc<str> = debug_hint.into();
        let progress = queue.register(format!("{hint}.progress"));
        let reader_progress = queue.register(format!("{hint}.reader-progress"));
        let pipe = Arc::new(Pipe {
            progress,
            reader_progress,
            queue,
            config,
            buffer: Mutex::new(PipeBuffer {
                data: Vec::new(),
                closed: false,
                poisoned: None,
            }),
            reader_positions: Mutex::new(Vec::new()),
        });
        let writer = PipeWriter { pipe: pipe.clone() };
        (pipe, writer)
    }

    /// The handle notified on every write and on close; this is the node's
    /// progress signal the scheduler subscribes to.
    pub fn progress_handle(&self) -> Handle {
        self.progress
    }

    /// Opens a new reader. Per the late-join contract, it always starts at
    /// offset 0 regardless of how much the writer has already produced.
    pub fn open_reader(self: &Arc<Self>) -> PipeReader {
        let position = Arc::new(AtomicUsize::new(0));
        self.reader_positions.lock().push(position.clone());
        PipeReader {
            pipe: self.clone(),
            position,
        }
    }

    fn min_reader_position(&self, default_if_empty: usize) -> usize {
        let positions = self.reader_positions.lock();
        positions
            .iter()
            .map(|p| p.load(Ordering::Acquire))
            .min()
            .unwrap_or(default_if_empty)
    }

    fn notify_reader_progress(&self) {
        self.queue.notify(self.reader_progress, 0).ok();
    }

    /// Marks the pipe closed with a failure attached. Readers still drain
    /// any bytes already buffered; once drained, `read` returns 0 and
    /// `PipeReader::poison` reports `error`. Poisoning an already-closed
    /// pipe still takes effect (the writer's ordinary `close` on drop and a
    /// late-discovered failure are not mutually exclusive: a node can write
    /// output, close its stdout in the usual way, and only then have the
    /// scheduler learn its actor body returned an error); only a second
    /// poison is a no-op, so the first failure wins.
    pub fn poison(&self, error: NodeError) {
        let mut buf = self.buffer.lock();
        if buf.poisoned.is_some() {
            return;
        }
        buf.poisoned = Some(error);
        buf.closed = true;
        drop(buf);
        self.queue.notify(self.progress, 0).ok();
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.queue.unregister(self.progress);
        self.queue.unregister(self.reader_progress);
    }
}

/// The pipe's single writer end.
pub struct PipeWriter {
    pipe: Arc<Pipe>,
}

impl PipeWriter {
    /// Appends `bytes` and notifies the pipe's progress handle, even for a
    /// zero-length write. Suspends if a soft cap is in force and the writer
    /// has outrun the slowest reader; fails with `Epipe` once the pipe is
    /// closed.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, IoError> {
        loop {
            let mut buf = self.pipe.buffer.lock();
            if buf.closed {
                return Err(IoError::Epipe);
            }
            if let Some(cap) = self.pipe.config.soft_cap_bytes {
                let min_pos = self.pipe.min_reader_position(buf.data.len());
                let outstanding = buf.data.len().saturating_sub(min_pos);
                if outstanding + bytes.len() > cap {
                    // Register interest while still holding `buf` so a
                    // concurrent reader (which must take the same lock to
                    // read and only notifies after releasing it) cannot
                    // advance and notify in the gap between our check and
                    // our registration.
                    let waiter = self
                        .pipe
                        .queue
                        .register_interest(self.pipe.reader_progress)
                        .map_err(|_| IoError::Eio)?;
                    drop(buf);
                    waiter.block().map_err(|_| IoError::Eio)?;
                    continue;
                }
            }
            buf.data.extend_from_slice(bytes);
            drop(buf);
            self.pipe.queue.notify(self.pipe.progress, bytes.len() as i32).ok();
            return Ok(bytes.len());
        }
    }

    /// Closes the pipe. Idempotent: closing an already-closed pipe is a
    /// no-op rather than an error.
    pub fn close(&self) {
        let mut buf = self.pipe.buffer.lock();
        if buf.closed {
            return;
        }
        buf.closed = true;
        drop(buf);
        self.pipe.queue.notify(self.pipe.progress, 0).ok();
    }

    pub fn progress_handle(&self) -> Handle {
        self.pipe.progress
    }
}

/// One reader attached to a [`Pipe`].
pub struct PipeReader {
    pipe: Arc<Pipe>,
    position: Arc<AtomicUsize>,
}

impl PipeReader {
    /// Copies up to `out.len()` bytes starting at this reader's offset.
    /// Returns 0 at end-of-stream (writer closed and fully drained);
    /// suspends on an empty, still-open pipe.
    pub fn read(&self, out: &mut [u8]) -> Result<usize, IoError> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            let waiter = {
                let buf = self.pipe.buffer.lock();
                let pos = self.position.load(Ordering::Acquire);
                if pos < buf.data.len() {
                    let n = (buf.data.len() - pos).min(out.len());
                    out[..n].copy_from_slice(&buf.data[pos..pos + n]);
                    drop(buf);
                    self.position.fetch_add(n, Ordering::AcqRel);
                    self.pipe.notify_reader_progress();
                    return Ok(n);
                }
                if buf.closed {
                    return Ok(0);
                }
                self.pipe
                    .queue
                    .register_interest(self.pipe.progress)
                    .map_err(|_| IoError::Eio)?
            };
            waiter.block().map_err(|_| IoError::Eio)?;
        }
    }

    /// This reader's current offset into the pipe's buffer.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Whether the writer side failed. Downstream actors decide for
    /// themselves whether a poisoned, fully-drained input is fatal.
    pub fn poison(&self) -> Option<NodeError> {
        self.pipe.buffer.lock().poisoned.clone()
    }

    pub fn progress_handle(&self) -> Handle {
        self.pipe.progress
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut positions = self.pipe.reader_positions.lock();
        positions.retain(|p| !Arc::ptr_eq(p, &self.position));
    }
}
