//! Instance lifecycle: instantiation, argv layout, the initial `run`, and
//! embedder calls back into a parked guest.

use anyhow::Result;
use wasmtime::{Engine, Linker, Module, Store};

use crate::ctx::{ExitBehavior, GoCtx};
use crate::error::{maybe_exit_on_error, Error};
use crate::link::{add_to_linker, invoke_func};
use crate::memory;
use crate::value::Value;

/// Where the `"js"` argv string is written.
const ARGV_STRINGS: u64 = 4096;
/// Base of the (ptr, 0) argv pairs: the string above, padded to 8 bytes.
const ARGV_VECTOR: i32 = 4104;
const ARGC: i32 = 1;

/// A running Go `js/wasm` module.
///
/// Construction drives the module's exported `run`; by the time `new`
/// returns, the guest has (by convention) registered its exports into the
/// global object and parked its scheduler. [`GoInstance::get`] fetches
/// those exports and [`GoInstance::invoke`] calls them, re-entering the
/// guest through the exported `resume`.
pub struct GoInstance {
    store: Store<GoCtx>,
}

impl GoInstance {
    /// Compile and run `module_bytes` with a default context: stdio
    /// inherited from the process, `runtime.wasmExit` terminating it.
    pub fn new(module_bytes: impl AsRef<[u8]>) -> Result<Self> {
        Self::with_ctx(&Engine::default(), module_bytes.as_ref(), GoCtx::default())
    }

    /// Instantiate with a caller-provided engine and context.
    pub fn with_ctx(engine: &Engine, module_bytes: &[u8], ctx: GoCtx) -> Result<Self> {
        let module = Module::new(engine, module_bytes)?;
        let mut linker = Linker::new(engine);
        add_to_linker(&mut linker)?;
        let mut store = Store::new(engine, ctx);
        let instance = linker.instantiate(&mut store, &module)?;

        let mem = instance
            .get_memory(&mut store, "mem")
            .ok_or(Error::MissingExport("mem"))?;
        let getsp = instance.get_typed_func::<(), i32>(&mut store, "getsp")?;
        let resume = instance.get_typed_func::<(), ()>(&mut store, "resume")?;
        let run = instance.get_typed_func::<(i32, i32), ()>(&mut store, "run")?;

        {
            let ctx = store.data_mut();
            ctx.mem = Some(mem);
            ctx.getsp = Some(getsp);
            ctx.resume = Some(resume);
        }

        write_argv(mem.data_mut(&mut store))?;

        let exit = store.data().exit;
        if let Err(e) = run.call(&mut store, (ARGC, ARGV_VECTOR)) {
            return Err(apply_exit_behavior(exit, e));
        }

        Ok(GoInstance { store })
    }

    /// Fetch `global.<name>`, as registered by the guest during `run`.
    /// `Undefined` when the guest registered nothing under that name.
    pub fn get(&self, name: &str) -> Value {
        self.store.data().values.global().get(name)
    }

    /// The runtime pendant object (value id 6), carrying `_pendingEvent`.
    pub fn runtime(&self) -> Value {
        self.store.data().values.runtime().clone()
    }

    /// Invoke a callable value. For guest-registered callbacks this writes
    /// a pending event and re-enters the module scheduler; the result is
    /// whatever the guest wrote into the event.
    pub fn invoke(&mut self, func: &Value, args: &[Value]) -> Result<Value> {
        let callable = func
            .as_func()
            .cloned()
            .ok_or(Error::NotAFunction { kind: func.kind() })?;
        let exit = self.store.data().exit;
        invoke_func(&mut self.store, &callable, args).map_err(|e| apply_exit_behavior(exit, e))
    }

    /// [`get`](Self::get) followed by [`invoke`](Self::invoke).
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        let func = self.get(name);
        self.invoke(&func, args)
    }
}

fn apply_exit_behavior(exit: ExitBehavior, e: anyhow::Error) -> anyhow::Error {
    match exit {
        ExitBehavior::Process => maybe_exit_on_error(e),
        ExitBehavior::Trap => e,
    }
}

/// Lay out guest argv: the NUL-terminated `"js"` string, then three
/// 8-byte-aligned (ptr, 0) pairs for argv[0] and the two terminators.
fn write_argv(mem: &mut [u8]) -> Result<(), Error> {
    let arg0 = b"js\0";
    memory::set_bytes(mem, ARGV_STRINGS, arg0)?;
    let mut offset = ARGV_STRINGS + arg0.len() as u64;
    if offset % 8 != 0 {
        offset += 8 - offset % 8;
    }
    for ptr in [ARGV_STRINGS as u32, 0, 0] {
        memory::set_u32(mem, offset, ptr)?;
        memory::set_u32(mem, offset + 4, 0)?;
        offset += 8;
    }
    Ok(())
}
