//! Run Go `js/wasm` modules from native code.
//!
//! A module built with `GOOS=js GOARCH=wasm` assumes it is loaded by a
//! JavaScript host providing the `go` import namespace: memory I/O,
//! timekeeping, exit/write syscalls, and the reflective `syscall/js`
//! bridge through which guest code manipulates host values by small
//! integer ids. This crate impersonates that host on top of [`wasmtime`],
//! so such a module can run in an ordinary process, print to stdio,
//! register functions into the global object, and be called back by the
//! embedder after `run` has parked.
//!
//! # Examples
//!
//! A guest whose `main` registers an exported function and blocks:
//!
//! ```go
//! js.Global().Set("Add", js.FuncOf(wrap(Add)))
//! select {}
//! ```
//!
//! is driven from the host side like this:
//!
//! ```no_run
//! use wasmtime_gojs::{GoInstance, Value};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("app.wasm")?;
//!     let mut instance = GoInstance::new(&bytes)?;
//!     let sum = instance.call("Add", &[Value::from(1), Value::from(3)])?;
//!     println!("{sum}");
//!     Ok(())
//! }
//! ```
//!
//! Numbers cross the bridge as `f64`; strings, arrays, objects and
//! functions travel by id through the instance's value table and keep
//! their identity across the boundary.

mod ctx;
mod error;
mod instance;
mod link;
mod memory;
pub mod pipe;
mod reflect;
mod table;
mod value;

pub use ctx::{ExitBehavior, GoCtx, GoCtxBuilder};
pub use error::{maybe_exit_on_error, Error, Exit};
pub use instance::GoInstance;
pub use link::add_to_linker;
pub use value::{GuestFunc, HostFunc, NativeFn, Value};
