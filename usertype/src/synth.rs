//! Dispatch thunks synthesized from a [`CapabilitySet`].
//!
//! Every thunk is a `NativeFn` receiving the bound instance as its first
//! argument. Thunks resolve the instance to a raw pointer, never hold a
//! reference into the VM across the native call, and mutate nothing but the
//! native object they target.

use crate::binder::bind_owned;
use crate::detect::{
    CallFn, CapabilitySet, ConstructFn, Equality, IterStepFn, LengthFn, ToStringFn,
};
use smallvec::smallvec;
use std::ptr::NonNull;
use std::rc::Rc;
use tracing::trace;
use vm::{
    native_fn, ret, FromArgs, FromValue, IntoValue, MetaOp, NativeFn, NativeRegistry,
    RuntimeError, Value, VM,
};

#[inline]
fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).copied().unwrap_or_default()
}

/// Resolves `value` to the `T` it wraps.
pub(crate) fn instance<T: 'static>(
    vm: &VM,
    value: Value,
    name: &str,
) -> Result<NonNull<T>, RuntimeError> {
    instance_of::<T>(vm, value, name).map(|(ptr, _)| ptr)
}

/// Like [`instance`], but also requires a mutable binding.
pub(crate) fn instance_mut<T: 'static>(
    vm: &VM,
    value: Value,
    name: &str,
) -> Result<NonNull<T>, RuntimeError> {
    match instance_of::<T>(vm, value, name)? {
        (ptr, true) => Ok(ptr),
        (_, false) => Err(RuntimeError::BorrowMutability(name.to_string())),
    }
}

fn instance_of<T: 'static>(
    vm: &VM,
    value: Value,
    name: &str,
) -> Result<(NonNull<T>, bool), RuntimeError> {
    let mismatch = || {
        RuntimeError::TypeMismatch(format!(
            "bad self (expected {}, got {})",
            name,
            vm.type_name_of(value)
        ))
    };
    if !value.is_userdata() {
        return Err(mismatch());
    }
    let ud = vm
        .userdata(value)
        .ok_or_else(|| RuntimeError::DanglingHandle(format!("{:?}", value)))?;
    let ptr = ud.downcast_ptr::<T>().ok_or_else(mismatch)?;
    Ok((ptr, ud.mutable))
}

/// `__eq`. Identity first: the native comparison never runs for the same
/// instance, and runs only for two instances of `T`.
pub fn eq_thunk<T: 'static>(equality: Equality<T>) -> NativeFn {
    native_fn(move |vm, args| {
        let (Some(a), Some(b)) = (vm.userdata(arg(args, 0)), vm.userdata(arg(args, 1))) else {
            return Ok(ret(Value::false_val()));
        };
        if a.same_instance(b) {
            return Ok(ret(Value::true_val()));
        }
        let (Some(pa), Some(pb)) = (a.downcast_ptr::<T>(), b.downcast_ptr::<T>()) else {
            return Ok(ret(Value::false_val()));
        };

        // Payloads are separate allocations from the VM and no other
        // reference to them is live while the comparison runs.
        let equal = match equality {
            Equality::Identity => false,
            Equality::Value(eq) => unsafe { eq(pa.as_ref(), pb.as_ref()) },
            Equality::Mutable(eq) if a.mutable && b.mutable => unsafe {
                eq(&mut *pa.as_ptr(), &mut *pb.as_ptr())
            },
            Equality::Mutable(_) => false,
        };
        Ok(ret(Value::bool(equal)))
    })
}

/// `__call`. Receives the instance followed by the script arguments.
pub fn call_thunk<T: 'static>(name: Rc<str>, call: CallFn<T>) -> NativeFn {
    native_fn(move |vm, args| {
        let mut ptr = instance_mut::<T>(vm, arg(args, 0), &name)?;
        let rest = args.get(1..).unwrap_or_default();
        let out = call(unsafe { ptr.as_mut() }, vm, rest)?;
        Ok(ret(out))
    })
}

/// `__tostring`. Formats exactly once per invocation.
pub fn tostring_thunk<T: 'static>(name: Rc<str>, tostring: ToStringFn<T>) -> NativeFn {
    native_fn(move |vm, args| {
        let ptr = instance::<T>(vm, arg(args, 0), &name)?;
        let text = tostring(unsafe { ptr.as_ref() });
        text.into_value(vm).map(ret)
    })
}

/// `__pairs`: `(step, instance, nil)`.
pub fn pairs_thunk(step: Value) -> NativeFn {
    native_fn(move |_, args| Ok(smallvec![step, arg(args, 0), Value::nil()]))
}

/// Stateless step function for generic `for`. The cursor is the 1-based
/// position of the previous element (nil before the first), so keys run
/// 1, 2, 3... in element order.
pub fn next_thunk<T: 'static>(name: Rc<str>, step: IterStepFn<T>) -> NativeFn {
    native_fn(move |vm, args| {
        let ptr = instance::<T>(vm, arg(args, 0), &name)?;
        let cursor = arg(args, 1);
        let pos = if cursor.is_nil() {
            0
        } else {
            usize::from_value(cursor, vm)?
        };
        match step(unsafe { ptr.as_ref() }, vm, pos)? {
            Some(item) => {
                let key = (pos + 1).into_value(vm)?;
                Ok(smallvec![key, item])
            }
            None => Ok(ret(Value::nil())),
        }
    })
}

/// `__len`.
pub fn len_thunk<T: 'static>(name: Rc<str>, length: LengthFn<T>) -> NativeFn {
    native_fn(move |vm, args| {
        let ptr = instance::<T>(vm, arg(args, 0), &name)?;
        length(unsafe { ptr.as_ref() }).into_value(vm).map(ret)
    })
}

/// The `new` factory backed by `Default`.
pub fn default_ctor<T: 'static>(construct: ConstructFn<T>) -> NativeFn {
    native_fn(move |vm, _| Ok(ret(bind_owned(vm, construct()).value())))
}

/// A `new` factory from a host closure over decoded arguments.
pub fn ctor<T, A, F>(f: F) -> NativeFn
where
    T: 'static,
    A: FromArgs,
    F: Fn(A) -> T + 'static,
{
    native_fn(move |vm, args| {
        let decoded = A::from_args(args, vm)?;
        Ok(ret(bind_owned(vm, f(decoded)).value()))
    })
}

/// `obj:name(...)` with shared access to the instance.
pub fn method<T, A, R, F>(name: Rc<str>, f: F) -> NativeFn
where
    T: 'static,
    A: FromArgs,
    R: IntoValue,
    F: Fn(&T, A) -> R + 'static,
{
    native_fn(move |vm, args| {
        let ptr = instance::<T>(vm, arg(args, 0), &name)?;
        let decoded = A::from_args(args.get(1..).unwrap_or_default(), vm)?;
        f(unsafe { ptr.as_ref() }, decoded).into_value(vm).map(ret)
    })
}

/// `obj:name(...)` with exclusive access; read-only bindings are rejected.
pub fn method_mut<T, A, R, F>(name: Rc<str>, f: F) -> NativeFn
where
    T: 'static,
    A: FromArgs,
    R: IntoValue,
    F: Fn(&mut T, A) -> R + 'static,
{
    native_fn(move |vm, args| {
        let mut ptr = instance_mut::<T>(vm, arg(args, 0), &name)?;
        let decoded = A::from_args(args.get(1..).unwrap_or_default(), vm)?;
        f(unsafe { ptr.as_mut() }, decoded).into_value(vm).map(ret)
    })
}

/// A free function stored on the type's table.
pub fn function<A, R, F>(f: F) -> NativeFn
where
    A: FromArgs,
    R: IntoValue,
    F: Fn(A) -> R + 'static,
{
    native_fn(move |vm, args| {
        let decoded = A::from_args(args, vm)?;
        f(decoded).into_value(vm).map(ret)
    })
}

/// `__index` fallback consulted after members and the parent table miss.
pub fn index_hook<T, R, F>(name: Rc<str>, f: F) -> NativeFn
where
    T: 'static,
    R: IntoValue,
    F: Fn(&T, &str) -> R + 'static,
{
    native_fn(move |vm, args| {
        let ptr = instance::<T>(vm, arg(args, 0), &name)?;
        let key = String::from_value(arg(args, 1), vm)?;
        f(unsafe { ptr.as_ref() }, &key).into_value(vm).map(ret)
    })
}

/// Emits one thunk per detected capability. Iteration also allocates the
/// per-type step native that `__pairs` hands out.
pub fn synthesize<T: 'static>(
    vm: &mut VM,
    name: &str,
    caps: &CapabilitySet<T>,
) -> Vec<(MetaOp, NativeFn)> {
    let name: Rc<str> = Rc::from(name);
    let mut ops = Vec::with_capacity(MetaOp::COUNT);

    if caps.equality.is_native() {
        ops.push((MetaOp::Eq, eq_thunk(caps.equality)));
    }
    if let Some(call) = caps.call {
        ops.push((MetaOp::Call, call_thunk(name.clone(), call)));
    }
    if let Some(tostring) = caps.tostring {
        ops.push((MetaOp::ToString, tostring_thunk(name.clone(), tostring)));
    }
    if let Some(step) = caps.iteration {
        let next = vm.alloc_native(&format!("{}.next", name), next_thunk(name.clone(), step), 2);
        ops.push((MetaOp::Pairs, pairs_thunk(next)));
    }
    if let Some(length) = caps.length {
        ops.push((MetaOp::Len, len_thunk(name.clone(), length)));
    }

    trace!(%name, count = ops.len(), "thunks synthesized");
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{bind_mut, bind_owned};
    use crate::detect::{Callable, MutEq};

    #[derive(PartialEq)]
    struct Pt(i64);

    struct Counter(i64);

    impl MutEq for Counter {
        fn eq_mut(&mut self, other: &mut Self) -> bool {
            self.0 == other.0
        }
    }

    struct Adder;

    impl Callable for Adder {
        type Args = (i64, String);
        type Output = i64;

        fn call(&mut self, (n, s): (i64, String)) -> i64 {
            n + s.len() as i64
        }
    }

    fn truthy(out: vm::Returns) -> bool {
        !out[0].is_falsey()
    }

    #[test]
    fn value_equality_compares_contents() {
        let mut vm = VM::new();
        let eq = eq_thunk(crate::capabilities!(Pt).equality);
        let a = bind_owned(&mut vm, Pt(1)).value();
        let b = bind_owned(&mut vm, Pt(1)).value();
        let c = bind_owned(&mut vm, Pt(2)).value();
        assert!(truthy(eq(&mut vm, &[a, b]).unwrap()));
        assert!(!truthy(eq(&mut vm, &[a, c]).unwrap()));
    }

    #[test]
    fn mutable_equality_needs_two_mutable_bindings() {
        let mut vm = VM::new();
        let eq = eq_thunk(crate::capabilities!(Counter).equality);
        let mut x = Counter(3);
        let y = Counter(3);
        let a = bind_owned(&mut vm, Counter(3)).value();
        let b = unsafe { bind_mut(&mut vm, &mut x) }.unwrap().value();
        let c = unsafe { crate::binder::bind_ref(&mut vm, &y) }.unwrap().value();
        assert!(truthy(eq(&mut vm, &[a, b]).unwrap()));
        assert!(!truthy(eq(&mut vm, &[a, c]).unwrap()));
    }

    #[test]
    fn call_decodes_arguments() {
        let mut vm = VM::new();
        let call = call_thunk::<Adder>("Adder".into(), crate::capabilities!(Adder).call.unwrap());
        let obj = bind_owned(&mut vm, Adder).value();
        let s = vm.alloc_str("bark woof");
        let out = call(&mut vm, &[obj, Value::int(2), s]).unwrap();
        assert_eq!(out[0], Value::int(11));

        let err = call(&mut vm, &[obj, Value::int(2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::ArityMismatch(_)));
    }

    #[test]
    fn thunks_reject_foreign_instances() {
        let mut vm = VM::new();
        let len = len_thunk::<Vec<i64>>("List".into(), |v| v.len());
        let other = bind_owned(&mut vm, Pt(0)).value();
        let err = len(&mut vm, &[other]).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch(_)));
    }
}
