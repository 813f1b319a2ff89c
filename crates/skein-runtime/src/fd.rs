use std::sync::Arc;

use skein_core::{Handle, IoError, NodeError, NodeState};
use skein_dag::DagStore;
use skein_kv::KvReader;
use skein_pipe::PipeWriter;

/// Which DAG node (if any) a write-side fd should keep in sync as bytes
/// flow through it. A node's stdout fd only ever needs to announce
/// `progressed`; the scheduler itself closes it out to `finished`/`failed`
/// once the actor body returns. A fd created by `open_write_pipe` has no
/// actor body for the scheduler to wait on, so it also drives its own
/// `finished` transition when the caller closes it.
pub enum DagTrack {
    Stdout { dag: Arc<DagStore>, node: Handle },
    OpenPipe { dag: Arc<DagStore>, node: Handle },
}

impl DagTrack {
    fn on_write(&self) {
        let (dag, node) = match self {
            DagTrack::Stdout { dag, node } => (dag, node),
            DagTrack::OpenPipe { dag, node } => (dag, node),
        };
        let _ = dag.transition(*node, NodeState::Progressed);
    }

    fn on_close(&self) {
        if let DagTrack::OpenPipe { dag, node } = self {
            let _ = dag.transition(*node, NodeState::Finished);
        }
    }
}

/// Standard fd numbers every node is born with, mirroring the POSIX
/// descriptors actor bodies expect (`spec.md` §3, §4.5).
pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const LOG: i32 = 2;
pub const ENV: i32 = 3;
pub const METRICS: i32 = 4;
pub const TRACE: i32 = 5;

/// Concatenates several readers in order, advancing to the next once the
/// current one reports end-of-stream. This is how `open_read(param, idx)`
/// reads a parameter that resolved to more than one dependency node (the
/// concatenation policy settled in `SPEC_FULL.md` §4.4).
pub struct ConcatReader {
    readers: Vec<KvReader>,
    current: usize,
}

impl ConcatReader {
    pub fn new(readers: Vec<KvReader>) -> Self {
        Self { readers, current: 0 }
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, IoError> {
        while self.current < self.readers.len() {
            let n = self.readers[self.current].read(out)?;
            if n > 0 {
                return Ok(n);
            }
            if self.readers[self.current].poisoned().is_some() {
                return Err(IoError::Eio);
            }
            self.current += 1;
        }
        Ok(0)
    }

    /// The failure attached to whichever dependency most recently drained,
    /// if any (concatenation stops at the first poisoned, fully-read
    /// stream, so at most one can ever be reported here).
    pub fn poisoned(&self) -> Option<NodeError> {
        self.readers.get(self.current).and_then(KvReader::poisoned)
    }
}

/// One open read-side descriptor: either a single stream or a concatenation
/// of several (see [`ConcatReader`]).
pub enum FdReader {
    Single(KvReader),
    Concat(ConcatReader),
}

impl FdReader {
    /// Mirrors `ConcatReader::read`'s poison translation for the single-
    /// dependency case: a drained, poisoned stream reports `Eio` instead of
    /// a plain end-of-stream, so an actor body reading a failed upstream
    /// node sees the same error a real file descriptor would.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, IoError> {
        match self {
            FdReader::Single(r) => {
                let n = r.read(out)?;
                if n == 0 && r.poisoned().is_some() {
                    return Err(IoError::Eio);
                }
                Ok(n)
            }
            FdReader::Concat(r) => r.read(out),
        }
    }
}

/// One open write-side descriptor. Every writer an actor can see is
/// ultimately a [`PipeWriter`]; `node_id` is set when this fd's pipe is
/// backed by a DAG node (stdout, or a pipe created via `open_write_pipe`)
/// so `alias_fd` can find something to alias.
pub struct FdWriter {
    pub writer: PipeWriter,
    pub node_id: Option<Handle>,
    pub track: Option<DagTrack>,
}

impl FdWriter {
    pub fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
        let n = self.writer.write(buf)?;
        if n > 0 {
            if let Some(track) = &self.track {
                track.on_write();
            }
        }
        Ok(n)
    }
}

/// Closing a write fd always closes the underlying pipe and fires its DAG
/// hook, whether that happens through an explicit `close()` call or because
/// the whole [`FdTable`] (and the `NodeRuntime` that owns it) is dropped at
/// the end of an actor body's `run`. Both `Pipe::close` and a node's forward
/// transition are idempotent, so a slot closed explicitly and then dropped
/// costs nothing beyond the redundant call.
impl Drop for FdWriter {
    fn drop(&mut self) {
        self.writer.close();
        if let Some(track) = &self.track {
            track.on_close();
        }
    }
}

pub enum FdSlot {
    Reader(FdReader),
    Writer(FdWriter),
    Closed,
}

/// The per-actor table of open file descriptors. Slot indices below
/// [`STDIN`]..=[`TRACE`] are reserved for the standard handles; anything
/// opened later via `open_read`/`open_write`/`open_write_pipe` is appended.
#[derive(Default)]
pub struct FdTable {
    slots: Vec<FdSlot>,
}

impl FdTable {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Installs `slot` at a specific fd number, growing the table with
    /// `Closed` placeholders as needed. Used once at construction to plant
    /// the standard descriptors at their fixed numbers.
    pub fn install(&mut self, fd: i32, slot: FdSlot) {
        let idx = fd as usize;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || FdSlot::Closed);
        }
        self.slots[idx] = slot;
    }

    /// Appends `slot` at the next free fd number and returns it.
    pub fn push(&mut self, slot: FdSlot) -> i32 {
        self.slots.push(slot);
        (self.slots.len() - 1) as i32
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut FdSlot> {
        self.slots.get_mut(usize::try_from(fd).ok()?)
    }

    pub fn close(&mut self, fd: i32) -> Result<(), IoError> {
        let slot = self.get_mut(fd).ok_or(IoError::Ebadf)?;
        match std::mem::replace(slot, FdSlot::Closed) {
            FdSlot::Writer(w) => {
                drop(w);
                Ok(())
            }
            FdSlot::Reader(_) => Ok(()),
            FdSlot::Closed => Err(IoError::Ebadf),
        }
    }
}
