//! End-to-end tests driving small hand-written guests through the full
//! `go` import namespace.

use wasmtime::Engine;
use wasmtime_gojs::pipe::WritePipe;
use wasmtime_gojs::{Exit, ExitBehavior, GoCtx, GoInstance, Value};

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn instantiate(wat: &str, ctx: GoCtx) -> anyhow::Result<GoInstance> {
    let engine = Engine::default();
    let wasm = wat::parse_str(wat)?;
    GoInstance::with_ctx(&engine, &wasm, ctx)
}

/// Calls `console.log("hello", 7)` the way a real guest does: intern the
/// string with `stringVal`, fetch `console` off the global object, then
/// `valueCall` its `log` method.
#[test]
fn console_log_writes_to_stdout() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "syscall/js.stringVal" (func $stringVal (param i32)))
      (import "go" "syscall/js.valueGet" (func $valueGet (param i32)))
      (import "go" "syscall/js.valueCall" (func $valueCall (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1024) "hello")
      (data (i32.const 1040) "console")
      (data (i32.const 1056) "log")
      (func (export "run") (param i32 i32)
        ;; cell for "hello" -> sp+24, stashed at 2048
        (i64.store offset=8 (global.get $sp) (i64.const 1024))
        (i64.store offset=16 (global.get $sp) (i64.const 5))
        (call $stringVal (global.get $sp))
        (i64.store (i32.const 2048) (i64.load offset=24 (global.get $sp)))
        ;; console = global.console (undefined owner resolves to global)
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (i64.store offset=16 (global.get $sp) (i64.const 1040))
        (i64.store offset=24 (global.get $sp) (i64.const 7))
        (call $valueGet (global.get $sp))
        ;; args = ["hello", 7]
        (i64.store (i32.const 2056) (i64.load (i32.const 2048)))
        (f64.store (i32.const 2064) (f64.const 7))
        ;; console.log(args...)
        (i64.store offset=8 (global.get $sp) (i64.load offset=32 (global.get $sp)))
        (i64.store offset=16 (global.get $sp) (i64.const 1056))
        (i64.store offset=24 (global.get $sp) (i64.const 3))
        (i64.store offset=32 (global.get $sp) (i64.const 2056))
        (i64.store offset=40 (global.get $sp) (i64.const 2))
        (call $valueCall (global.get $sp))
      )
    )
    "#;

    let stdout = WritePipe::new_in_memory();
    let ctx = GoCtx::builder().stdout(stdout.clone()).build();
    instantiate(WAT, ctx)?;
    assert_eq!(stdout.contents(), b"hello 7\n");
    Ok(())
}

#[test]
fn wasm_write_targets_both_fds() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "runtime.wasmWrite" (func $wasmWrite (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1024) "out")
      (data (i32.const 1032) "err")
      (func (export "run") (param i32 i32)
        (i64.store offset=8 (global.get $sp) (i64.const 1))
        (i64.store offset=16 (global.get $sp) (i64.const 1024))
        (i32.store offset=24 (global.get $sp) (i32.const 3))
        (call $wasmWrite (global.get $sp))
        (i64.store offset=8 (global.get $sp) (i64.const 2))
        (i64.store offset=16 (global.get $sp) (i64.const 1032))
        (i32.store offset=24 (global.get $sp) (i32.const 3))
        (call $wasmWrite (global.get $sp))
      )
    )
    "#;

    let stdout = WritePipe::new_in_memory();
    let stderr = WritePipe::new_in_memory();
    let ctx = GoCtx::builder()
        .stdout(stdout.clone())
        .stderr(stderr.clone())
        .build();
    instantiate(WAT, ctx)?;
    assert_eq!(stdout.contents(), b"out");
    assert_eq!(stderr.contents(), b"err");
    Ok(())
}

#[test]
fn wasm_exit_surfaces_the_status_code() {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "runtime.wasmExit" (func $wasmExit (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (func (export "run") (param i32 i32)
        (i32.store offset=8 (global.get $sp) (i32.const 42))
        (call $wasmExit (global.get $sp))
      )
    )
    "#;

    let ctx = GoCtx::builder().exit_behavior(ExitBehavior::Trap).build();
    let err = match instantiate(WAT, ctx) {
        Ok(_) => panic!("run must trap on wasmExit"),
        Err(e) => e,
    };
    assert_eq!(err.downcast_ref::<Exit>(), Some(&Exit(42)));
}

/// The guest measures the length of a host-provided array and reports it
/// back through the global object.
#[test]
fn value_length_reads_array_size() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "syscall/js.valueGet" (func $valueGet (param i32)))
      (import "go" "syscall/js.valueLength" (func $valueLength (param i32)))
      (import "go" "syscall/js.valueSet" (func $valueSet (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1024) "A")
      (data (i32.const 1032) "len")
      (func (export "run") (param i32 i32)
        ;; a = global.A
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (i64.store offset=16 (global.get $sp) (i64.const 1024))
        (i64.store offset=24 (global.get $sp) (i64.const 1))
        (call $valueGet (global.get $sp))
        ;; n = len(a), written at sp+16
        (i64.store offset=8 (global.get $sp) (i64.load offset=32 (global.get $sp)))
        (call $valueLength (global.get $sp))
        ;; global.len = n
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (f64.store offset=32 (global.get $sp) (f64.convert_i64_s (i64.load offset=16 (global.get $sp))))
        (i64.store offset=16 (global.get $sp) (i64.const 1032))
        (i64.store offset=24 (global.get $sp) (i64.const 3))
        (call $valueSet (global.get $sp))
      )
    )
    "#;

    let arr = Value::from(vec![Value::from(1), Value::from(2), Value::from(3)]);
    let ctx = GoCtx::builder().global("A", arr).build();
    let instance = instantiate(WAT, ctx)?;
    assert_eq!(instance.get("len"), Value::from(3));
    Ok(())
}

/// The guest checks the copy, the count slot and the success byte itself
/// and reports a single boolean back.
#[test]
fn copy_bytes_to_go_clamps_to_destination() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "syscall/js.copyBytesToGo" (func $copyBytesToGo (param i32)))
      (import "go" "syscall/js.valueSet" (func $valueSet (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1040) "ok")
      (data (i32.const 1152) "\01\02\03\04\05\06\07\08")
      (func (export "run") (param i32 i32)
        (local $ok i32)
        ;; dst = (1216, 4), src = (1152, 8)
        (i64.store offset=8 (global.get $sp) (i64.const 1216))
        (i64.store offset=16 (global.get $sp) (i64.const 4))
        (i64.store offset=32 (global.get $sp) (i64.const 1152))
        (i64.store offset=40 (global.get $sp) (i64.const 8))
        (call $copyBytesToGo (global.get $sp))
        (local.set $ok (i32.and
          (i32.and
            (i32.eq (i32.load (i32.const 1216)) (i32.load (i32.const 1152)))
            (i64.eq (i64.load offset=40 (global.get $sp)) (i64.const 4)))
          (i32.eq (i32.load8_u offset=48 (global.get $sp)) (i32.const 1))))
        ;; global.ok = ok
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (i64.store offset=16 (global.get $sp) (i64.const 1040))
        (i64.store offset=24 (global.get $sp) (i64.const 2))
        (f64.store offset=32 (global.get $sp) (f64.convert_i32_s (local.get $ok)))
        (call $valueSet (global.get $sp))
      )
    )
    "#;

    let instance = instantiate(WAT, GoCtx::builder().build())?;
    assert_eq!(instance.get("ok"), Value::from(1));
    Ok(())
}

/// Results must be addressed through a fresh `getsp()`, not the stack
/// pointer the import received: the guest moves its stack between laying
/// out the arguments and the host's result write.
#[test]
fn results_follow_the_moved_stack_pointer() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "syscall/js.valueGet" (func $valueGet (param i32)))
      (import "go" "syscall/js.valueSet" (func $valueSet (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1024) "console")
      (data (i32.const 1040) "moved")
      (func (export "run") (param i32 i32)
        ;; arguments in the old frame
        (i64.store offset=8 (i32.const 28672) (i64.const 0))
        (i64.store offset=16 (i32.const 28672) (i64.const 1024))
        (i64.store offset=24 (i32.const 28672) (i64.const 7))
        ;; the stack moves before the host writes the result
        (global.set $sp (i32.const 24576))
        (call $valueGet (i32.const 28672))
        ;; the result must have landed in the new frame
        (i64.store offset=8 (i32.const 24576) (i64.const 0))
        (i64.store offset=16 (i32.const 24576) (i64.const 1040))
        (i64.store offset=24 (i32.const 24576) (i64.const 5))
        (call $valueSet (i32.const 24576))
      )
    )
    "#;

    let instance = instantiate(WAT, GoCtx::builder().build())?;
    assert_eq!(instance.get("moved"), instance.get("console"));
    assert!(matches!(instance.get("moved"), Value::Object(_)));
    Ok(())
}

/// `global.Object` is a constructor function the guest can `valueInvoke`.
#[test]
fn value_invoke_calls_the_object_constructor() -> anyhow::Result<()> {
    setup();
    const WAT: &str = r#"
    (module
      (import "go" "syscall/js.valueGet" (func $valueGet (param i32)))
      (import "go" "syscall/js.valueInvoke" (func $valueInvoke (param i32)))
      (import "go" "syscall/js.valueSet" (func $valueSet (param i32)))
      (memory (export "mem") 1)
      (global $sp (mut i32) (i32.const 28672))
      (func (export "getsp") (result i32) (global.get $sp))
      (func (export "resume"))
      (data (i32.const 1024) "Object")
      (data (i32.const 1040) "o")
      (func (export "run") (param i32 i32)
        ;; ctor = global.Object
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (i64.store offset=16 (global.get $sp) (i64.const 1024))
        (i64.store offset=24 (global.get $sp) (i64.const 6))
        (call $valueGet (global.get $sp))
        ;; o = ctor()
        (i64.store offset=8 (global.get $sp) (i64.load offset=32 (global.get $sp)))
        (i64.store offset=16 (global.get $sp) (i64.const 2048))
        (i64.store offset=24 (global.get $sp) (i64.const 0))
        (call $valueInvoke (global.get $sp))
        ;; global.o = o (result at sp+40, success byte at sp+48)
        (i64.store offset=32 (global.get $sp) (i64.load offset=40 (global.get $sp)))
        (i64.store offset=8 (global.get $sp) (i64.const 0))
        (i64.store offset=16 (global.get $sp) (i64.const 1040))
        (i64.store offset=24 (global.get $sp) (i64.const 1))
        (call $valueSet (global.get $sp))
      )
    )
    "#;

    let instance = instantiate(WAT, GoCtx::builder().build())?;
    assert!(matches!(instance.get("o"), Value::Object(_)));
    Ok(())
}

#[test]
fn missing_exports_fail_instantiation() {
    setup();
    const WAT: &str = r#"
    (module
      (memory (export "mem") 1)
      (func (export "run") (param i32 i32))
    )
    "#;
    assert!(instantiate(WAT, GoCtx::builder().build()).is_err());
}
