use crate::error::RuntimeError;
use crate::globals::GlobalEntry;
use crate::marshal::{FromValue, IntoValue};
use memory::Value;

impl super::vm::VM {
    /// Raw lookup of a global by name.
    pub fn global(&self, name: &str) -> Result<Value, RuntimeError> {
        self.interner
            .get(name)
            .and_then(|h| self.globals.get(h))
            .map(|entry| entry.value)
            .ok_or_else(|| RuntimeError::UndefinedGlobal(name.to_string()))
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.global(name).is_ok()
    }

    /// Reads a global and converts it to a native value.
    pub fn get_global<T: FromValue>(&self, name: &str) -> Result<T, RuntimeError> {
        let value = self.global(name)?;
        T::from_value(value, self)
    }

    /// Defines or assigns a mutable global. Assigning to an immutable one
    /// (a builtin, a registered type table) fails.
    pub fn set_global<T: IntoValue>(&mut self, name: &str, value: T) -> Result<(), RuntimeError> {
        let value = value.into_value(self)?;
        let name_handle = self.intern(name);

        if let Some(entry) = self.globals.get_mut(&name_handle) {
            if !entry.mutable {
                return Err(RuntimeError::Unknown(format!(
                    "Cannot assign to immutable global '{}'",
                    name
                )));
            }
            entry.value = value;
        } else {
            self.globals.insert(name_handle, GlobalEntry::new(value, true));
        }
        Ok(())
    }

    /// Binds a constant global, replacing any previous entry.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let name_handle = self.intern(name);
        self.globals
            .insert(name_handle, GlobalEntry::new(value, false));
    }
}
