use crate::native::{NativeFn, NativeObj};
use crate::stdlib::core;
use memory::Value;
use std::rc::Rc;

/// Trait for native function registration
pub trait NativeRegistry {
    /// Allocates a native function object without binding it to a name.
    fn alloc_native(&mut self, name: &str, func: NativeFn, arity: isize) -> Value;
    fn define_native(&mut self, name: &str, func: NativeFn, arity: isize);
    fn bootstrap_natives(&mut self);
}

impl NativeRegistry for super::vm::VM {
    fn alloc_native(&mut self, name: &str, func: NativeFn, arity: isize) -> Value {
        self.natives.push(NativeObj {
            name: name.to_string(),
            func,
            arity,
        });
        Value::native((self.natives.len() - 1) as u32)
    }

    fn define_native(&mut self, name: &str, func: NativeFn, arity: isize) {
        let val = self.alloc_native(name, func, arity);
        // Natives are constant
        self.define_global(name, val);
    }

    fn bootstrap_natives(&mut self) {
        // Preamble: Core Intrinsics
        self.define_native("print", Rc::new(core::native_print), -1);
        self.define_native("tostring", Rc::new(core::native_tostring), 1);
        self.define_native("type", Rc::new(core::native_type), 1);
        self.define_native("assert", Rc::new(core::native_assert), -1);
        self.define_native("len", Rc::new(core::native_len), 1);
        self.define_native("pairs", Rc::new(core::native_pairs), 1);
        self.define_native("next", Rc::new(core::native_next), -1);
        self.next_native = self.global("next").unwrap_or_default();
    }
}
