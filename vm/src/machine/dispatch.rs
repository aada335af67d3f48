//! Operator entry points: the operations a script performs on values.
//!
//! Every entry point resolves userdata capabilities through the type's
//! capability table and falls back to the builtin behavior (or an
//! `AttemptTo` error) when the table has no entry.

use crate::error::RuntimeError;
use crate::metatable::MetaOp;
use crate::native::Returns;
use memory::Value;
use tracing::trace;

fn first(out: &Returns) -> Value {
    out.first().copied().unwrap_or_default()
}

impl super::vm::VM {
    /// Script `==`.
    pub fn equals(&mut self, a: Value, b: Value) -> Result<bool, RuntimeError> {
        self.enter(&[a, b], &[]);
        if a == b {
            return Ok(true);
        }
        if a.is_userdata() && b.is_userdata() {
            let eq = self
                .metamethod_of(a, MetaOp::Eq)
                .or_else(|| self.metamethod_of(b, MetaOp::Eq));
            if let Some(eq) = eq {
                trace!(op = %MetaOp::Eq, "dispatch");
                let out = self.invoke_native(eq, &[a, b])?;
                return Ok(!first(&out).is_falsey());
            }
        }
        Ok(self.values_equal(a, b))
    }

    /// Script call expression. Returns every value the callee produced.
    pub fn call(&mut self, callee: Value, args: &[Value]) -> Result<Returns, RuntimeError> {
        self.enter(&[callee], args);

        if callee.is_native() {
            let native = callee
                .as_handle()
                .and_then(|h| self.natives.get(h as usize))
                .ok_or_else(|| RuntimeError::DanglingHandle(format!("{:?}", callee)))?;
            if native.arity >= 0 && args.len() != native.arity as usize {
                return Err(RuntimeError::ArityMismatch(format!(
                    "{}() takes exactly {} argument(s), got {}",
                    native.name,
                    native.arity,
                    args.len()
                )));
            }
            trace!(name = %native.name, argc = args.len(), "native call");
            let func = native.func.clone();
            return self.invoke_native(func, args);
        }

        if let Some(thunk) = self.metamethod_of(callee, MetaOp::Call) {
            trace!(op = %MetaOp::Call, "dispatch");
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(callee);
            full.extend_from_slice(args);
            return self.invoke_native(thunk, &full);
        }

        Err(RuntimeError::attempt("call", self.type_name_of(callee)))
    }

    /// `call`, keeping only the first result.
    pub fn call_first(&mut self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        self.call(callee, args).map(|out| first(&out))
    }

    /// `obj:name(args...)`
    pub fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: &[Value],
    ) -> Result<Returns, RuntimeError> {
        let method = self.index(receiver, name)?;
        if method.is_nil() {
            return Err(RuntimeError::attempt(
                "call",
                format!("nil (method '{}')", name),
            ));
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver);
        full.extend_from_slice(args);
        self.call(method, &full)
    }

    /// Script `tostring`.
    pub fn tostring(&mut self, value: Value) -> Result<String, RuntimeError> {
        self.enter(&[value], &[]);
        if !value.is_userdata() {
            return Ok(self.val_to_string(&value));
        }

        if let Some(thunk) = self.metamethod_of(value, MetaOp::ToString) {
            trace!(op = %MetaOp::ToString, "dispatch");
            let out = first(&self.invoke_native(thunk, &[value])?);
            return self.str_of(out).map(str::to_owned).ok_or_else(|| {
                RuntimeError::TypeMismatch("'__tostring' must return a string".into())
            });
        }

        let address = self
            .userdata(value)
            .ok_or_else(|| RuntimeError::DanglingHandle(format!("{:?}", value)))?
            .address();
        Ok(format!("{}: {:#x}", self.type_name_of(value), address))
    }

    /// Script `#`.
    pub fn length(&mut self, value: Value) -> Result<Value, RuntimeError> {
        self.enter(&[value], &[]);
        if let Some(s) = self.str_of(value) {
            return Ok(Value::int(s.len() as i64));
        }
        if value.is_map() {
            if let Some(m) = value.as_handle().and_then(|h| self.heap.get_map(h)) {
                return Ok(Value::int(m.len() as i64));
            }
        }
        if let Some(thunk) = self.metamethod_of(value, MetaOp::Len) {
            trace!(op = %MetaOp::Len, "dispatch");
            return self.invoke_native(thunk, &[value]).map(|out| first(&out));
        }
        Err(RuntimeError::attempt("get length of", self.type_name_of(value)))
    }

    /// Script `pairs`: the (step, state, control) triple of a generic `for`.
    pub fn pairs(&mut self, value: Value) -> Result<(Value, Value, Value), RuntimeError> {
        self.enter(&[value], &[]);
        if value.is_map() {
            return Ok((self.next_native, value, Value::nil()));
        }
        if let Some(thunk) = self.metamethod_of(value, MetaOp::Pairs) {
            trace!(op = %MetaOp::Pairs, "dispatch");
            let out = self.invoke_native(thunk, &[value])?;
            let at = |i: usize| out.get(i).copied().unwrap_or_default();
            return Ok((at(0), at(1), at(2)));
        }
        Err(RuntimeError::attempt("iterate", self.type_name_of(value)))
    }

    /// Table traversal: the entry after `key` (nil starts), or None at the end.
    pub fn next(&mut self, table: Value, key: Value) -> Result<Option<(Value, Value)>, RuntimeError> {
        let map = table
            .as_handle()
            .filter(|_| table.is_map())
            .and_then(|h| self.heap.get_map(h))
            .ok_or_else(|| RuntimeError::attempt("iterate", self.type_name_of(table)))?;

        let entry = if key.is_nil() {
            map.iter().next()
        } else {
            let after = self.str_of(key).ok_or_else(|| {
                RuntimeError::TypeMismatch(format!(
                    "invalid key to 'next': {}",
                    self.type_name_of(key)
                ))
            })?;
            map.range::<str, _>((
                std::ops::Bound::Excluded(after),
                std::ops::Bound::Unbounded,
            ))
            .next()
        };

        match entry.map(|(k, v)| (k.clone(), *v)) {
            Some((k, v)) => Ok(Some((self.alloc_str(&k), v))),
            None => Ok(None),
        }
    }

    /// Drives a generic `for k, v in pairs(value)` loop from Rust.
    /// Returns the number of iterations.
    pub fn for_each_pair<F>(&mut self, value: Value, mut body: F) -> Result<usize, RuntimeError>
    where
        F: FnMut(&mut Self, Value, Value) -> Result<(), RuntimeError>,
    {
        let (step, state, mut control) = self.pairs(value)?;
        let mut count = 0;
        loop {
            let out = self.call(step, &[state, control])?;
            let key = first(&out);
            if key.is_nil() {
                break;
            }
            let item = out.get(1).copied().unwrap_or_default();
            body(self, key, item)?;
            control = key;
            count += 1;
        }
        Ok(count)
    }

    /// Script `obj.key`.
    pub fn index(&mut self, value: Value, key: &str) -> Result<Value, RuntimeError> {
        self.enter(&[value], &[]);
        if value.is_map() {
            return Ok(value
                .as_handle()
                .and_then(|h| self.heap.get_map(h))
                .and_then(|m| m.get(key).copied())
                .unwrap_or_default());
        }

        let type_index = self
            .userdata(value)
            .ok_or_else(|| RuntimeError::attempt("index", self.type_name_of(value)))?
            .type_index;
        if let Some(member) = self.resolve_member(type_index, key) {
            return Ok(member);
        }
        if let Some(hook) = self.metamethod_of(value, MetaOp::Index) {
            trace!(op = %MetaOp::Index, key, "dispatch");
            let key = self.alloc_str(key);
            return self.invoke_native(hook, &[value, key]).map(|out| first(&out));
        }
        Ok(Value::nil())
    }

    /// Raw table store; nil removes the key.
    pub fn set_field(&mut self, table: Value, key: &str, value: Value) -> Result<(), RuntimeError> {
        let map = table
            .as_handle()
            .filter(|_| table.is_map())
            .and_then(|h| self.heap.get_map_mut(h))
            .ok_or_else(|| RuntimeError::attempt("index", table.type_name()))?;
        if value.is_nil() {
            map.remove(key);
        } else {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }
}
