//! The two capability table layouts.

use std::collections::HashMap;
use tracing::debug;
use vm::{CapabilityTable, MetaOp, NativeFn, RuntimeError, Strategy, Value};

/// Flat, finalized table: metamethods live in an array indexed by
/// [`MetaOp::slot`], members in a map frozen at construction.
pub struct SimpleTable {
    name: String,
    ops: [Option<NativeFn>; MetaOp::COUNT],
    members: HashMap<String, Value>,
}

impl SimpleTable {
    pub fn build(
        name: &str,
        ops: impl IntoIterator<Item = (MetaOp, NativeFn)>,
        members: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut slots: [Option<NativeFn>; MetaOp::COUNT] = Default::default();
        for (op, thunk) in ops {
            slots[op.slot()] = Some(thunk);
        }
        let members: HashMap<_, _> = members.into_iter().collect();
        debug!(name, members = members.len(), "simple table finalized");
        Self {
            name: name.to_string(),
            ops: slots,
            members,
        }
    }
}

impl CapabilityTable for SimpleTable {
    fn strategy(&self) -> Strategy {
        Strategy::Simple
    }

    #[inline]
    fn metamethod(&self, op: MetaOp) -> Option<NativeFn> {
        self.ops[op.slot()].clone()
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.members.get(name).copied()
    }

    fn set_metamethod(&mut self, _op: MetaOp, _thunk: NativeFn) -> Result<(), RuntimeError> {
        Err(RuntimeError::TableFinalized(self.name.clone()))
    }

    fn set_member(&mut self, _name: &str, _value: Value) -> Result<(), RuntimeError> {
        Err(RuntimeError::TableFinalized(self.name.clone()))
    }

    fn set_parent(&mut self, _parent: Value) -> Result<(), RuntimeError> {
        Err(RuntimeError::TableFinalized(self.name.clone()))
    }

    fn roots(&self) -> Vec<Value> {
        self.members.values().copied().collect()
    }
}

/// Open table: grows after registration, falls back to a parent script
/// table, then to the `Index` hook.
#[derive(Default)]
pub struct RegularTable {
    name: String,
    ops: HashMap<MetaOp, NativeFn>,
    members: HashMap<String, Value>,
    parent: Option<Value>,
}

impl RegularTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl CapabilityTable for RegularTable {
    fn strategy(&self) -> Strategy {
        Strategy::Regular
    }

    fn metamethod(&self, op: MetaOp) -> Option<NativeFn> {
        self.ops.get(&op).cloned()
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.members.get(name).copied()
    }

    fn set_metamethod(&mut self, op: MetaOp, thunk: NativeFn) -> Result<(), RuntimeError> {
        if self.ops.insert(op, thunk).is_some() {
            debug!(name = %self.name, %op, "metamethod replaced");
        }
        Ok(())
    }

    fn set_member(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.members.insert(name.to_string(), value);
        Ok(())
    }

    fn parent(&self) -> Option<Value> {
        self.parent
    }

    fn set_parent(&mut self, parent: Value) -> Result<(), RuntimeError> {
        if !parent.is_map() {
            return Err(RuntimeError::RegistrationFailed(format!(
                "parent of '{}' must be a table, got {}",
                self.name,
                parent.type_name()
            )));
        }
        self.parent = Some(parent);
        Ok(())
    }

    fn roots(&self) -> Vec<Value> {
        self.members
            .values()
            .copied()
            .chain(self.parent)
            .collect()
    }
}
