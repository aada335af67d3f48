use crate::metatable::{MetaOp, RegisteredType};
use crate::native::NativeFn;
use memory::Value;
use std::any::TypeId;
use tracing::debug;

impl super::vm::VM {
    pub fn type_index_of<T: 'static>(&self) -> Option<u32> {
        self.type_lookup.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the registry index for `T`, creating an unregistered entry
    /// named `name` on first use.
    pub fn ensure_type<T: 'static>(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.type_index_of::<T>() {
            return idx;
        }
        let idx = self.types.len() as u32;
        self.types
            .push(RegisteredType::unregistered(name, TypeId::of::<T>()));
        self.type_lookup.insert(TypeId::of::<T>(), idx);
        debug!(name, index = idx, "type entry created");
        idx
    }

    pub fn registered_type(&self, index: u32) -> Option<&RegisteredType> {
        self.types.get(index as usize)
    }

    pub fn registered_type_mut(&mut self, index: u32) -> Option<&mut RegisteredType> {
        self.types.get_mut(index as usize)
    }

    pub fn resolve_metamethod(&self, index: u32, op: MetaOp) -> Option<NativeFn> {
        self.registered_type(index)?.table.as_ref()?.metamethod(op)
    }

    /// Own members first, then the parent table.
    pub fn resolve_member(&self, index: u32, name: &str) -> Option<Value> {
        let table = self.registered_type(index)?.table.as_ref()?;
        if let Some(v) = table.member(name) {
            return Some(v);
        }
        let parent = table.parent()?;
        self.heap
            .get_map(parent.as_handle()?)?
            .get(name)
            .copied()
            .filter(|v| !v.is_nil())
    }

    /// Metamethod lookup keyed by a value; only userdata carries any.
    pub fn metamethod_of(&self, value: Value, op: MetaOp) -> Option<NativeFn> {
        let ud = self.userdata(value)?;
        self.resolve_metamethod(ud.type_index, op)
    }
}
