//! The `go` import namespace: every host function a `GOOS=js GOARCH=wasm`
//! module expects, bound by name onto a [`Linker`].
//!
//! Each import takes the guest stack pointer as its sole argument and
//! reads/writes its frame at fixed offsets. Results that are written after
//! a possible guest re-entry address memory through a fresh stack pointer
//! from the exported `getsp`, never through the one the import received.

use std::io::Write as _;

use anyhow::{anyhow, Result};
use rand::Rng;
use wasmtime::{AsContextMut, Caller, Linker};

use crate::ctx::GoCtx;
use crate::error::{Error, Exit};
use crate::memory;
use crate::reflect::{self, Key};
use crate::value::{HostFunc, Value};

/// Imports this host leaves unimplemented; the guest observes no effect
/// from calling them.
const STUBS: &[&str] = &[
    "runtime.scheduleTimeoutEvent",
    "runtime.clearTimeoutEvent",
    "syscall/js.finalizeRef",
    "syscall/js.valueNew",
    "syscall/js.valuePrepareString",
    "syscall/js.valueLoadString",
    "syscall/js.valueInstanceOf",
];

fn sp_addr(sp: i32) -> u64 {
    sp as u32 as u64
}

/// Split the caller into the guest memory view and the host context. The
/// view is re-acquired on every call so memory growth during a re-entry
/// can never leave a stale slice behind.
fn memory_and_ctx<'a>(caller: &'a mut Caller<'_, GoCtx>) -> Result<(&'a mut [u8], &'a mut GoCtx)> {
    let mem = caller
        .data()
        .mem
        .ok_or_else(|| anyhow!("linear memory is not attached yet"))?;
    Ok(mem.data_and_store_mut(caller))
}

/// Re-read the stack pointer after the guest may have moved its stack.
fn fresh_sp(caller: &mut Caller<'_, GoCtx>) -> Result<u64> {
    let getsp = caller
        .data()
        .getsp
        .clone()
        .ok_or_else(|| anyhow!("`getsp` export is not attached yet"))?;
    let sp = getsp.call(&mut *caller, ())?;
    Ok(sp_addr(sp))
}

/// Invoke a function value: native functions directly, guest wrappers via
/// the pending-event protocol (`_pendingEvent` + `resume`).
pub(crate) fn invoke_func(
    mut store: impl AsContextMut<Data = GoCtx>,
    func: &HostFunc,
    args: &[Value],
) -> Result<Value> {
    match func {
        HostFunc::Native(f) => f(args),
        HostFunc::Guest(wrapper) => {
            let mut cx = store.as_context_mut();
            let event = Value::from_entries([
                ("id", wrapper.id.clone()),
                ("this", Value::Null),
                ("args", Value::from(args.to_vec())),
            ]);
            let resume = {
                let ctx = cx.data_mut();
                let runtime = ctx
                    .values
                    .runtime()
                    .as_object()
                    .cloned()
                    .ok_or_else(|| anyhow!("runtime pendant is not an object"))?;
                runtime
                    .borrow_mut()
                    .insert("_pendingEvent".to_string(), event.clone());
                ctx.resume
                    .clone()
                    .ok_or_else(|| anyhow!("`resume` export is not attached yet"))?
            };
            // The scheduler wakes, dispatches to the registered function,
            // and writes `result` into the event before parking again.
            resume.call(&mut cx, ())?;
            Ok(event.get("result"))
        }
    }
}

/// Add the `go` import namespace to `linker`.
pub fn add_to_linker(linker: &mut Linker<GoCtx>) -> Result<()> {
    linker.func_wrap("go", "debug", |mut caller: Caller<'_, GoCtx>, sp: i32| {
        let sp = sp_addr(sp);
        match memory_and_ctx(&mut caller) {
            Ok((mem, ctx)) => match memory::load_value(mem, &ctx.values, sp) {
                Ok(v) => log::debug!("debug: {v}"),
                Err(_) => log::debug!("debug: sp={sp:#x}"),
            },
            Err(_) => log::debug!("debug: sp={sp:#x}"),
        }
    })?;

    linker.func_wrap(
        "go",
        "runtime.wasmExit",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            let sp = sp_addr(sp);
            let (mem, _ctx) = memory_and_ctx(&mut caller)?;
            let code = memory::get_u32(mem, sp + 8)? as i32;
            log::trace!("runtime.wasmExit: status {code}");
            Err(Exit(code).into())
        },
    )?;

    linker.func_wrap(
        "go",
        "runtime.wasmWrite",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("runtime.wasmWrite");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let fd = memory::get_i64(mem, sp + 8)?;
            let ptr = memory::get_i64(mem, sp + 16)?;
            let n = memory::get_u32(mem, sp + 24)?;
            let data = memory::load_raw(mem, ptr, n as i64)?;
            match fd {
                1 => {
                    let mut w = ctx.stdout.borrow_mut();
                    w.write_all(data)?;
                    w.flush()?;
                }
                2 => {
                    let mut w = ctx.stderr.borrow_mut();
                    w.write_all(data)?;
                    w.flush()?;
                }
                _ => log::warn!("runtime.wasmWrite: unsupported fd {fd}"),
            }
            Ok(())
        },
    )?;

    // The data view is re-acquired per import, so growth invalidates
    // nothing on our side.
    linker.func_wrap(
        "go",
        "runtime.resetMemoryDataView",
        |_: Caller<'_, GoCtx>, _sp: i32| {
            log::trace!("runtime.resetMemoryDataView");
        },
    )?;

    linker.func_wrap(
        "go",
        "runtime.nanotime1",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let nanos = ctx.started.elapsed().as_nanos() as i64;
            memory::set_i64(mem, sp + 8, nanos)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "runtime.walltime",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            let sp = sp_addr(sp);
            let msec = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_err(|_| anyhow!("system time before the unix epoch"))?
                .as_millis() as i64;
            let (mem, _ctx) = memory_and_ctx(&mut caller)?;
            memory::set_i64(mem, sp + 8, msec / 1000)?;
            memory::set_u32(mem, sp + 16, ((msec % 1000) * 1_000_000) as u32)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "runtime.getRandomData",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("runtime.getRandomData");
            let sp = sp_addr(sp);
            let (mem, _ctx) = memory_and_ctx(&mut caller)?;
            let r = memory::load_slice_range(mem, sp + 8)?;
            rand::thread_rng().fill(&mut mem[r]);
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.stringVal",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.stringVal");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let s = memory::load_string(mem, sp + 8)?;
            memory::store_value(mem, &mut ctx.values, sp + 24, &Value::from(s))?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueGet",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueGet");
            let sp = sp_addr(sp);
            let result = {
                let (mem, ctx) = memory_and_ctx(&mut caller)?;
                let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
                let name = memory::load_string(mem, sp + 16)?;
                reflect::get(&ctx.values, &owner, Key::Name(&name))?
            };
            let sp = fresh_sp(&mut caller)?;
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            memory::store_value(mem, &mut ctx.values, sp + 32, &result)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueSet",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueSet");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
            let name = memory::load_string(mem, sp + 16)?;
            let value = memory::load_value(mem, &ctx.values, sp + 32)?;
            reflect::set(&ctx.values, &owner, Key::Name(&name), value)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueDelete",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueDelete");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
            let name = memory::load_string(mem, sp + 16)?;
            reflect::delete(&ctx.values, &owner, Key::Name(&name))?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueIndex",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueIndex");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
            let index = memory::get_i64(mem, sp + 16)?;
            let result = reflect::get(&ctx.values, &owner, Key::Index(index))?;
            memory::store_value(mem, &mut ctx.values, sp + 24, &result)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueSetIndex",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueSetIndex");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
            let index = memory::get_i64(mem, sp + 16)?;
            let value = memory::load_value(mem, &ctx.values, sp + 24)?;
            reflect::set(&ctx.values, &owner, Key::Index(index), value)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueInvoke",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueInvoke");
            let sp = sp_addr(sp);
            let (func, args) = {
                let (mem, ctx) = memory_and_ctx(&mut caller)?;
                let v = memory::load_value(mem, &ctx.values, sp + 8)?;
                let func = v
                    .as_func()
                    .cloned()
                    .ok_or(Error::NotAFunction { kind: v.kind() })?;
                let args = memory::load_slice_of_values(mem, &ctx.values, sp + 16)?;
                (func, args)
            };
            let result = invoke_func(&mut caller, &func, &args)?;
            let sp = fresh_sp(&mut caller)?;
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            memory::store_value(mem, &mut ctx.values, sp + 40, &result)?;
            memory::set_u8(mem, sp + 48, 1)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueCall",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueCall");
            let sp = sp_addr(sp);
            let (func, args) = {
                let (mem, ctx) = memory_and_ctx(&mut caller)?;
                let owner = memory::load_value(mem, &ctx.values, sp + 8)?;
                let name = memory::load_string(mem, sp + 16)?;
                let method = reflect::get(&ctx.values, &owner, Key::Name(&name))?;
                let func = match &method {
                    Value::Undefined | Value::Null => {
                        return Err(Error::MissingMethod { name }.into());
                    }
                    other => other.as_func().cloned().ok_or(Error::NotAFunction {
                        kind: other.kind(),
                    })?,
                };
                let args = memory::load_slice_of_values(mem, &ctx.values, sp + 32)?;
                (func, args)
            };
            let result = invoke_func(&mut caller, &func, &args)?;
            let sp = fresh_sp(&mut caller)?;
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            memory::store_value(mem, &mut ctx.values, sp + 56, &result)?;
            memory::set_u8(mem, sp + 64, 1)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "go",
        "syscall/js.valueLength",
        |mut caller: Caller<'_, GoCtx>, sp: i32| -> Result<()> {
            log::trace!("syscall/js.valueLength");
            let sp = sp_addr(sp);
            let (mem, ctx) = memory_and_ctx(&mut caller)?;
            let v = memory::load_value(mem, &ctx.values, sp + 8)?;
            if let Some(len) = reflect::length(&v) {
                memory::set_i64(mem, sp + 16, len)?;
            }
            Ok(())
        },
    )?;

    linker.func_wrap("go", "syscall/js.copyBytesToGo", copy_bytes)?;
    linker.func_wrap("go", "syscall/js.copyBytesToJS", copy_bytes)?;

    for name in STUBS.iter().copied() {
        linker.func_wrap("go", name, move |_: Caller<'_, GoCtx>, _sp: i32| {
            log::trace!("{name}: not implemented, ignored");
        })?;
    }

    Ok(())
}

/// Both copy directions share one frame shape: dst slice at +8, src slice
/// at +32, count written over the src length, success byte at +48.
fn copy_bytes(mut caller: Caller<'_, GoCtx>, sp: i32) -> Result<()> {
    log::trace!("syscall/js.copyBytes");
    let sp = sp_addr(sp);
    let (mem, _ctx) = memory_and_ctx(&mut caller)?;
    let dst = memory::load_slice_range(mem, sp + 8)?;
    let src = memory::load_slice_range(mem, sp + 32)?;
    if dst.is_empty() || src.is_empty() {
        memory::set_u8(mem, sp + 48, 0)?;
        return Ok(());
    }
    let n = dst.len().min(src.len());
    mem.copy_within(src.start..src.start + n, dst.start);
    memory::set_i64(mem, sp + 40, n as i64)?;
    memory::set_u8(mem, sp + 48, 1)?;
    Ok(())
}
