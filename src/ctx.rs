//! Host context: the value table, stdio plumbing, and the preloaded
//! object graph the guest sees before `run`.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use wasmtime::{Memory, TypedFunc};

use crate::table::ValueTable;
use crate::value::{GuestFunc, HostFunc, Value};

/// What to do when the guest calls `runtime.wasmExit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitBehavior {
    /// Terminate the host process with the guest's exit code, the way
    /// `wasm_exec.js` does under node.
    Process,
    /// Surface the exit as an [`Exit`](crate::Exit) error from the
    /// `run`/`resume` entry that triggered it.
    Trap,
}

type SharedWrite = Rc<RefCell<Box<dyn Write>>>;

/// Per-instance host state, stored as the data of the instance's
/// [`Store`](wasmtime::Store).
pub struct GoCtx {
    pub(crate) values: ValueTable,
    pub(crate) stdout: SharedWrite,
    pub(crate) stderr: SharedWrite,
    pub(crate) exit: ExitBehavior,
    pub(crate) started: Instant,
    // Attached after instantiation, before `run`.
    pub(crate) mem: Option<Memory>,
    pub(crate) getsp: Option<TypedFunc<(), i32>>,
    pub(crate) resume: Option<TypedFunc<(), ()>>,
}

impl GoCtx {
    pub fn builder() -> GoCtxBuilder {
        GoCtxBuilder::new()
    }
}

impl Default for GoCtx {
    fn default() -> Self {
        GoCtxBuilder::new().build()
    }
}

/// Builder for [`GoCtx`], in the spirit of `WasiCtxBuilder`.
pub struct GoCtxBuilder {
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
    exit: ExitBehavior,
    globals: Vec<(String, Value)>,
}

impl GoCtxBuilder {
    pub fn new() -> Self {
        GoCtxBuilder {
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            exit: ExitBehavior::Process,
            globals: Vec::new(),
        }
    }

    /// Redirect the guest's stdout (`console.log` and fd 1).
    pub fn stdout(mut self, w: impl Write + 'static) -> Self {
        self.stdout = Box::new(w);
        self
    }

    /// Redirect the guest's stderr (`console.error` and fd 2).
    pub fn stderr(mut self, w: impl Write + 'static) -> Self {
        self.stderr = Box::new(w);
        self
    }

    pub fn exit_behavior(mut self, exit: ExitBehavior) -> Self {
        self.exit = exit;
        self
    }

    /// Expose `value` to the guest as `global.<name>`, next to the
    /// preinstalled `console`, `Object` and `Array`.
    pub fn global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.push((name.into(), value));
        self
    }

    pub fn build(self) -> GoCtx {
        let stdout: SharedWrite = Rc::new(RefCell::new(self.stdout));
        let stderr: SharedWrite = Rc::new(RefCell::new(self.stderr));

        let console = Value::from_entries([
            ("log", console_writer(stdout.clone())),
            ("error", console_writer(stderr.clone())),
        ]);
        let mut entries = vec![
            ("console".to_string(), console),
            (
                "Object".to_string(),
                Value::Function(HostFunc::native(|_args| Ok(Value::object()))),
            ),
            (
                "Array".to_string(),
                Value::Function(HostFunc::native(|_args| Ok(Value::array()))),
            ),
        ];
        entries.extend(self.globals);
        let global = Value::from_entries(entries);

        let runtime = Value::from_entries([
            (
                "_pendingEvent",
                Value::from_entries([("id", Value::Number(0.0)), ("this", Value::Null)]),
            ),
            (
                "_makeFuncWrapper",
                Value::Function(HostFunc::native(|args| {
                    let id = args.first().cloned().unwrap_or(Value::Undefined);
                    Ok(Value::Function(HostFunc::Guest(Rc::new(GuestFunc { id }))))
                })),
            ),
        ]);

        GoCtx {
            values: ValueTable::new(global, runtime),
            stdout,
            stderr,
            exit: self.exit,
            started: Instant::now(),
            mem: None,
            getsp: None,
            resume: None,
        }
    }
}

impl Default for GoCtxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `console.log`-shaped function: arguments space-separated, newline
/// terminated.
fn console_writer(sink: SharedWrite) -> Value {
    Value::Function(HostFunc::native(move |args| {
        let mut w = sink.borrow_mut();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            write!(w, "{arg}")?;
        }
        writeln!(w)?;
        w.flush()?;
        Ok(Value::Undefined)
    }))
}
