//! In-memory capture of guest stdio, for embedders and tests that want to
//! inspect what the guest wrote instead of inheriting the process's own
//! descriptors.

use std::io::{self, Write};
use std::sync::{Arc, RwLock};

/// A clonable in-memory sink for guest stdout/stderr.
///
/// Clones share one buffer: hand one clone to
/// [`GoCtxBuilder::stdout`](crate::GoCtxBuilder::stdout) and keep another
/// to read back what the guest wrote.
///
/// ```
/// use wasmtime_gojs::{pipe::WritePipe, GoCtx};
/// let stdout = WritePipe::new_in_memory();
/// let ctx = GoCtx::builder().stdout(stdout.clone()).build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct WritePipe {
    buf: Arc<RwLock<Vec<u8>>>,
}

impl WritePipe {
    /// Create a new writable virtual pipe backed by a `Vec<u8>` buffer.
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.read().unwrap().clone()
    }
}

impl Write for WritePipe {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
