use std::panic::{self, AssertUnwindSafe};
use usertype::{bind_owned, bind_ref, new_simple_usertype, new_usertype, usertype, Callable};
use vm::{RuntimeError, Value, VmConfig, VM};

struct Barker;

impl Callable for Barker {
    type Args = (i64, String);
    type Output = i64;

    fn call(&mut self, (n, text): (i64, String)) -> i64 {
        n + text.len() as i64
    }
}

struct Fragile;

impl Callable for Fragile {
    type Args = ();
    type Output = ();

    fn call(&mut self, (): ()) {
        panic!("fragile native broke");
    }
}

struct Checked;

impl Callable for Checked {
    type Args = (i64,);
    type Output = Result<i64, String>;

    fn call(&mut self, (n,): (i64,)) -> Result<i64, String> {
        if n < 0 {
            Err(format!("negative input {}", n))
        } else {
            Ok(n * 2)
        }
    }
}

struct Plain {
    _tag: u8,
}

fn barker_vm(simple: bool) -> (VM, Value) {
    let mut vm = VM::new();
    if simple {
        new_simple_usertype!(&mut vm, Barker, "Barker").unwrap();
    } else {
        new_usertype!(&mut vm, Barker, "Barker").unwrap();
    }
    let barker = bind_owned(&mut vm, Barker);
    vm.set_global("barker", barker).unwrap();
    (vm, barker.value())
}

#[test]
fn wrong_argument_count_is_an_arity_mismatch() {
    for simple in [false, true] {
        let (mut vm, barker) = barker_vm(simple);
        let err = vm.call(barker, &[Value::int(2)]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::ArityMismatch("expected 2 arguments, got 1".into())
        );
    }
}

#[test]
fn wrong_argument_type_is_a_type_mismatch() {
    for simple in [false, true] {
        let (mut vm, barker) = barker_vm(simple);
        let err = vm.call(barker, &[Value::int(2), Value::int(3)]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::TypeMismatch("bad argument #2 (expected string, got number)".into())
        );
        assert_eq!(
            err.to_string(),
            "type mismatch: bad argument #2 (expected string, got number)"
        );
    }
}

#[test]
fn absent_capabilities_raise_attempt_errors() {
    let mut vm = VM::new();
    new_usertype!(&mut vm, Plain, "Plain").unwrap();
    let plain = bind_owned(&mut vm, Plain { _tag: 0 }).value();

    assert_eq!(
        vm.call(plain, &[]).unwrap_err().to_string(),
        "attempt to call a Plain value"
    );
    assert_eq!(
        vm.length(plain).unwrap_err().to_string(),
        "attempt to get length of a Plain value"
    );
    assert_eq!(
        vm.pairs(plain).unwrap_err().to_string(),
        "attempt to iterate a Plain value"
    );
    // Equality never errors.
    assert!(!vm.equals(plain, Value::nil()).unwrap());
}

#[test]
fn calling_a_missing_method_names_it() {
    let mut vm = VM::new();
    new_usertype!(&mut vm, Plain, "Plain").unwrap();
    let plain = bind_owned(&mut vm, Plain { _tag: 0 }).value();
    let err = vm.call_method(plain, "bark", &[]).unwrap_err();
    assert_eq!(err.to_string(), "attempt to call a nil (method 'bark') value");
}

#[test]
fn read_only_bindings_cannot_be_called() {
    let mut vm = VM::new();
    new_usertype!(&mut vm, Barker, "Barker").unwrap();
    let host = Barker;
    let barker = unsafe { bind_ref(&mut vm, &host) }.unwrap().value();
    let text = vm.alloc_str("x");
    let err = vm.call(barker, &[Value::int(1), text]).unwrap_err();
    assert_eq!(err, RuntimeError::BorrowMutability("Barker".into()));
}

#[test]
fn methods_reject_foreign_receivers() {
    let mut vm = VM::new();
    new_usertype!(&mut vm, Plain, "Plain").unwrap();
    usertype!(Barker, "Barker")
        .method("volume", |_: &Barker, (): ()| 11i64)
        .register(&mut vm)
        .unwrap();

    let barker = bind_owned(&mut vm, Barker).value();
    let plain = bind_owned(&mut vm, Plain { _tag: 0 }).value();
    let volume = vm.index(barker, "volume").unwrap();

    assert_eq!(vm.call_first(volume, &[barker]).unwrap(), Value::int(11));
    let err = vm.call(volume, &[plain]).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::TypeMismatch("bad self (expected Barker.volume, got Plain)".into())
    );
}

#[test]
fn native_panics_become_runtime_errors() {
    for simple in [false, true] {
        let mut vm = VM::new();
        if simple {
            new_simple_usertype!(&mut vm, Fragile, "Fragile").unwrap();
        } else {
            new_usertype!(&mut vm, Fragile, "Fragile").unwrap();
        }
        let fragile = bind_owned(&mut vm, Fragile).value();

        let err = vm.call(fragile, &[]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::NativeException("fragile native broke".into())
        );
        // The VM stays usable.
        assert!(!vm.in_native());
        assert!(vm.equals(fragile, fragile).unwrap());
    }
}

#[test]
fn panics_propagate_when_catching_is_disabled() {
    let mut vm = VM::with_config(VmConfig {
        catch_native_panics: false,
        ..VmConfig::default()
    });
    new_usertype!(&mut vm, Fragile, "Fragile").unwrap();
    let fragile = bind_owned(&mut vm, Fragile).value();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| vm.call(fragile, &[])));
    assert!(outcome.is_err());
}

#[test]
fn native_errors_surface_as_exceptions() {
    let mut vm = VM::new();
    new_usertype!(&mut vm, Checked, "Checked").unwrap();
    let checked = bind_owned(&mut vm, Checked).value();

    assert_eq!(vm.call_first(checked, &[Value::int(4)]).unwrap(), Value::int(8));
    let err = vm.call(checked, &[Value::int(-1)]).unwrap_err();
    assert_eq!(err, RuntimeError::NativeException("negative input -1".into()));
}
