//! Builtin globals bootstrapped into every VM.

use crate::error::RuntimeError;
use crate::machine::VM;
use crate::native::{ret, Returns};
use memory::Value;
use smallvec::smallvec;
use std::io::Write;

fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).copied().unwrap_or_default()
}

/// Writes every argument through `tostring`, tab separated.
pub fn native_print(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    let mut line = String::new();
    for (i, &arg) in args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        line.push_str(&vm.tostring(arg)?);
    }
    writeln!(vm.output, "{}", line).map_err(|e| RuntimeError::Unknown(e.to_string()))?;
    Ok(Returns::new())
}

pub fn native_tostring(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    let s = vm.tostring(arg(args, 0))?;
    Ok(ret(vm.alloc_str(&s)))
}

pub fn native_type(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    let name = arg(args, 0).type_name();
    Ok(ret(vm.alloc_str(name)))
}

/// `assert(v [, message])`: returns its arguments when `v` is truthy.
pub fn native_assert(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    let cond = arg(args, 0);
    if args.is_empty() || cond.is_falsey() {
        let message = match args.get(1) {
            Some(&m) => vm.tostring(m)?,
            None => "assertion failed!".to_string(),
        };
        return Err(RuntimeError::AssertionFailed(message));
    }
    Ok(args.iter().copied().collect())
}

pub fn native_len(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    vm.length(arg(args, 0)).map(ret)
}

pub fn native_pairs(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    let (step, state, control) = vm.pairs(arg(args, 0))?;
    Ok(smallvec![step, state, control])
}

/// `next(table [, key])`
pub fn native_next(vm: &mut VM, args: &[Value]) -> Result<Returns, RuntimeError> {
    if args.is_empty() {
        return Err(RuntimeError::ArityMismatch(
            "next() takes 1 or 2 arguments, got 0".into(),
        ));
    }
    match vm.next(args[0], arg(args, 1))? {
        Some((k, v)) => Ok(smallvec![k, v]),
        None => Ok(ret(Value::nil())),
    }
}
