use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::globals::GlobalEntry;
use crate::metatable::RegisteredType;
use crate::native::{NativeFn, NativeObj, Returns};
use memory::heap::Map;
use memory::Heap;
use memory::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

use super::gc::GarbageCollector;
use super::native::NativeRegistry;

/// The embedded runtime state.
///
/// Single-threaded: capability tables hold `Rc` thunks, so a `VM` never
/// leaves the thread that created it. Thunks receive `&mut VM` and may
/// re-enter any entry point.
pub struct VM {
    pub heap: Heap,
    pub globals: HashMap<u32, GlobalEntry>,
    pub interner: HashMap<String, u32>,
    pub natives: Vec<NativeObj>,

    /// Host type registry, indexed by `UserData::type_index`.
    pub types: Vec<RegisteredType>,
    pub type_lookup: HashMap<TypeId, u32>,

    pub config: VmConfig,

    /// If true, GC will run at the start of every top-level dispatch (for testing)
    pub stress_mode: bool,

    /// Sink for `print`.
    pub output: Box<dyn Write>,

    /// The `next` native, returned by `pairs` on tables.
    pub(crate) next_native: Value,

    /// Number of natives currently on the Rust stack. The GC never runs
    /// while this is non-zero: thunks hold raw pointers into userdata.
    native_depth: usize,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    /// Create a new VM instance with bootstrapped native functions
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::new();
        heap.next_gc_threshold = config.gc_threshold;

        let mut vm = Self {
            heap,
            globals: HashMap::with_capacity(64),
            interner: HashMap::new(),
            natives: Vec::new(),
            types: Vec::new(),
            type_lookup: HashMap::new(),
            stress_mode: config.stress_gc,
            config,
            output: Box::new(io::stdout()),
            next_native: Value::nil(),
            native_depth: 0,
        };

        // Bootstrap native functions
        vm.bootstrap_natives();

        vm
    }

    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    /// Interns `name` and returns its string handle. Interned strings are GC
    /// roots for the lifetime of the VM.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&h) = self.interner.get(name) {
            return h;
        }
        let h = self.heap.alloc_string(name.to_string());
        self.interner.insert(name.to_string(), h);
        h
    }

    pub fn alloc_str(&mut self, s: &str) -> Value {
        Value::string(self.heap.alloc_string(s.to_string()))
    }

    pub fn alloc_map(&mut self, map: Map) -> Value {
        Value::map(self.heap.alloc_map(map))
    }

    pub fn str_of(&self, value: Value) -> Option<&str> {
        if !value.is_string() {
            return None;
        }
        self.heap
            .get_string(value.as_handle()?)
            .map(String::as_str)
    }

    pub fn number_of(&self, value: Value) -> Option<f64> {
        if !value.is_number() {
            return None;
        }
        self.heap.get_number(value.as_handle()?)
    }

    /// Like `Value::type_name`, but userdata reports its registered type name.
    pub fn type_name_of(&self, value: Value) -> String {
        if value.is_userdata() {
            if let Some(ty) = self.userdata_type(value) {
                return ty.name.clone();
            }
        }
        value.type_name().to_string()
    }

    /// Helper to format non-userdata values for display
    pub fn val_to_string(&self, val: &Value) -> String {
        match val {
            v if v.is_string() => self.str_of(*v).unwrap_or("<bad string>").to_string(),
            v if v.is_int() => format!("{}", v.as_int().unwrap_or_default()),
            v if v.is_number() => match self.number_of(*v) {
                Some(f) if f.fract() == 0.0 && f.is_finite() => format!("{:.1}", f),
                Some(f) => format!("{}", f),
                None => "<bad number>".into(),
            },
            v if v.is_bool() => format!("{}", v.as_bool().unwrap_or_default()),
            v if v.is_nil() => "nil".to_string(),
            v if v.is_map() => match v.as_handle() {
                Some(handle) => format!("table: {:#x}", handle),
                None => "<bad table>".into(),
            },
            v if v.is_native() => {
                let name = v
                    .as_handle()
                    .and_then(|h| self.natives.get(h as usize))
                    .map(|n| n.name.as_str())
                    .unwrap_or("?");
                format!("function: builtin: {}", name)
            }
            _ => format!("{:?}", val), // Fallback
        }
    }

    /// Raw equality for values without metamethods.
    pub fn values_equal(&self, v1: Value, v2: Value) -> bool {
        if v1 == v2 {
            return true; // Same identity (or immediate value)
        }

        if v1.is_string() && v2.is_string() {
            return match (self.str_of(v1), self.str_of(v2)) {
                (Some(s1), Some(s2)) => s1 == s2,
                _ => false,
            };
        }

        let as_f64 = |v: Value| v.as_int().map(|i| i as f64).or_else(|| self.number_of(v));
        if (v1.is_int() || v1.is_number()) && (v2.is_int() || v2.is_number()) {
            return matches!((as_f64(v1), as_f64(v2)), (Some(a), Some(b)) if a == b);
        }

        if v1.is_userdata() && v2.is_userdata() {
            return match (self.userdata(v1), self.userdata(v2)) {
                (Some(a), Some(b)) => a.same_instance(b),
                _ => false,
            };
        }

        false
    }

    /// Runs a native with the GC fenced off. Panics are converted into
    /// `RuntimeError::NativeException` unless disabled in the config.
    pub fn invoke_native(&mut self, func: NativeFn, args: &[Value]) -> Result<Returns, RuntimeError> {
        self.native_depth += 1;
        let result = if self.config.catch_native_panics {
            match panic::catch_unwind(AssertUnwindSafe(|| func(self, args))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(%message, "native operation panicked");
                    Err(RuntimeError::NativeException(message))
                }
            }
        } else {
            func(self, args)
        };
        self.native_depth -= 1;
        result
    }

    pub fn in_native(&self) -> bool {
        self.native_depth > 0
    }

    /// GC safe point at the start of a top-level dispatch. `head` and `rest`
    /// are the operands in flight, rooted for this collection.
    pub(crate) fn enter(&mut self, head: &[Value], rest: &[Value]) {
        if self.native_depth > 0 || !(self.stress_mode || self.heap.should_collect()) {
            return;
        }
        let mut extra = Vec::with_capacity(head.len() + rest.len());
        extra.extend_from_slice(head);
        extra.extend_from_slice(rest);
        self.collect_garbage_with(&extra);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "native operation panicked".to_string()
    }
}
