//! Errors raised while bridging guest and host values.

use thiserror::Error;

/// Everything that can go wrong inside the `go` import namespace short of
/// an engine-level failure. Raised from an import, these become traps that
/// unwind the current `run`/`resume` entry.
#[derive(Debug, Error)]
pub enum Error {
    /// A pointer or (ptr, len) pair handed over by the guest fell outside
    /// linear memory.
    #[error("out-of-bounds linear memory access of {len} bytes at {addr:#x}")]
    OutOfBounds { addr: u64, len: u64 },

    #[error("guest string is not valid utf-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("{kind} value does not support named properties")]
    NotAnObject { kind: &'static str },

    #[error("{kind} value does not support indexing")]
    NotAnArray { kind: &'static str },

    #[error("{kind} value is not callable")]
    NotAFunction { kind: &'static str },

    #[error("no method `{name}` on the value")]
    MissingMethod { name: String },

    #[error("module does not export `{0}`")]
    MissingExport(&'static str),

    #[error("value table id {0} is reserved")]
    ReservedId(u32),

    #[error("value table id {0} is not assigned")]
    UnknownId(u32),
}

/// The guest requested termination through `runtime.wasmExit`.
///
/// The import raises this as a trap so the engine can unwind the guest
/// cleanly; what happens next is decided by the instance's
/// [`ExitBehavior`](crate::ExitBehavior).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("module exited with status {0}")]
pub struct Exit(pub i32);

/// Terminate the process if `e` carries a guest [`Exit`] request, otherwise
/// hand the error back for ordinary reporting.
pub fn maybe_exit_on_error(e: anyhow::Error) -> anyhow::Error {
    match e.downcast_ref::<Exit>() {
        Some(exit) => std::process::exit(exit.0),
        None => e,
    }
}
