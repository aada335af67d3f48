//! Conversions between runtime values and native Rust values.
//!
//! Strings and numbers cross by value. Userdata never converts through these
//! traits; host code reaches bound instances with
//! [`VM::borrow_userdata`](crate::VM::borrow_userdata).

use crate::error::RuntimeError;
use crate::machine::VM;
use memory::value::{I60_MAX, I60_MIN};
use memory::Value;
use std::fmt::Display;

pub trait IntoValue {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError>;
}

pub trait FromValue: Sized {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError>;
}

/// Decodes a whole argument list for a native signature.
pub trait FromArgs: Sized {
    const ARITY: usize;

    fn from_args(args: &[Value], vm: &VM) -> Result<Self, RuntimeError>;
}

fn mismatch(expected: &str, value: Value, vm: &VM) -> RuntimeError {
    RuntimeError::TypeMismatch(format!(
        "expected {}, got {}",
        expected,
        vm.type_name_of(value)
    ))
}

impl IntoValue for Value {
    #[inline]
    fn into_value(self, _vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(self)
    }
}

impl FromValue for Value {
    #[inline]
    fn from_value(value: Value, _vm: &VM) -> Result<Self, RuntimeError> {
        Ok(value)
    }
}

impl IntoValue for () {
    #[inline]
    fn into_value(self, _vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(Value::nil())
    }
}

impl IntoValue for bool {
    #[inline]
    fn into_value(self, _vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(Value::bool(self))
    }
}

impl FromValue for bool {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value, vm))
    }
}

macro_rules! impl_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
                    // Out-of-range integers degrade to floats rather than wrap.
                    match i64::try_from(self) {
                        Ok(i) if (I60_MIN..=I60_MAX).contains(&i) => Ok(Value::int(i)),
                        _ => Ok(Value::number(vm.heap.alloc_number(self as f64))),
                    }
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
                    let wide = if let Some(i) = value.as_int() {
                        i
                    } else if let Some(f) = vm.number_of(value) {
                        if f.fract() != 0.0 || !f.is_finite() {
                            return Err(RuntimeError::TypeMismatch(format!(
                                "number {} has no integer representation",
                                f
                            )));
                        }
                        f as i64
                    } else {
                        return Err(mismatch(stringify!($ty), value, vm));
                    };
                    <$ty>::try_from(wide).map_err(|_| {
                        RuntimeError::TypeMismatch(format!(
                            "number {} out of range for {}",
                            wide,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl IntoValue for f64 {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(Value::number(vm.heap.alloc_number(self)))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        if let Some(i) = value.as_int() {
            return Ok(i as f64);
        }
        vm.number_of(value).ok_or_else(|| mismatch("number", value, vm))
    }
}

impl IntoValue for f32 {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        (self as f64).into_value(vm)
    }
}

impl FromValue for f32 {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        f64::from_value(value, vm).map(|f| f as f32)
    }
}

impl IntoValue for String {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(Value::string(vm.heap.alloc_string(self)))
    }
}

impl FromValue for String {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        vm.str_of(value)
            .map(str::to_owned)
            .ok_or_else(|| mismatch("string", value, vm))
    }
}

// Iterators over host containers yield references.
impl<X: IntoValue + Clone> IntoValue for &X {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        self.clone().into_value(vm)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        match self {
            Some(v) => v.into_value(vm),
            None => Ok(Value::nil()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        if value.is_nil() {
            Ok(None)
        } else {
            T::from_value(value, vm).map(Some)
        }
    }
}

/// A native returning `Err` surfaces as a script-level runtime error.
impl<T: IntoValue, E: Display> IntoValue for Result<T, E> {
    fn into_value(self, vm: &mut VM) -> Result<Value, RuntimeError> {
        match self {
            Ok(v) => v.into_value(vm),
            Err(e) => Err(RuntimeError::NativeException(e.to_string())),
        }
    }
}

fn check_arity(args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::ArityMismatch(format!(
            "expected {} argument{}, got {}",
            expected,
            if expected == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn convert_arg<A: FromValue>(args: &[Value], idx: usize, vm: &VM) -> Result<A, RuntimeError> {
    A::from_value(args[idx], vm).map_err(|e| match e {
        RuntimeError::TypeMismatch(msg) => {
            RuntimeError::TypeMismatch(format!("bad argument #{} ({})", idx + 1, msg))
        }
        other => other,
    })
}

macro_rules! impl_from_args {
    ($count:expr; $($name:ident => $idx:tt),*) => {
        impl<$($name: FromValue),*> FromArgs for ($($name,)*) {
            const ARITY: usize = $count;

            #[allow(unused_variables)]
            fn from_args(args: &[Value], vm: &VM) -> Result<Self, RuntimeError> {
                check_arity(args, $count)?;
                Ok(($(convert_arg::<$name>(args, $idx, vm)?,)*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A => 0);
impl_from_args!(2; A => 0, B => 1);
impl_from_args!(3; A => 0, B => 1, C => 2);
impl_from_args!(4; A => 0, B => 1, C => 2, D => 3);
impl_from_args!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_from_args!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
