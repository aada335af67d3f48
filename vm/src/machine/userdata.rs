use crate::error::RuntimeError;
use crate::metatable::RegisteredType;
use memory::{UserData, Value};
use tracing::trace;

impl super::vm::VM {
    pub fn alloc_userdata(&mut self, slot: UserData) -> Value {
        let handle = self.heap.alloc_userdata(slot);
        trace!(handle, "userdata allocated");
        Value::userdata(handle)
    }

    pub fn userdata(&self, value: Value) -> Option<&UserData> {
        if !value.is_userdata() {
            return None;
        }
        self.heap.get_userdata(value.as_handle()?)
    }

    pub fn userdata_type(&self, value: Value) -> Option<&RegisteredType> {
        let ud = self.userdata(value)?;
        self.registered_type(ud.type_index)
    }

    fn userdata_checked(&self, value: Value) -> Result<&UserData, RuntimeError> {
        if !value.is_userdata() {
            return Err(RuntimeError::TypeMismatch(format!(
                "expected userdata, got {}",
                self.type_name_of(value)
            )));
        }
        self.userdata(value)
            .ok_or_else(|| RuntimeError::DanglingHandle(format!("{:?}", value)))
    }

    fn foreign_type<T: 'static>(&self, value: Value) -> RuntimeError {
        RuntimeError::TypeMismatch(format!(
            "expected {}, got {}",
            std::any::type_name::<T>(),
            self.type_name_of(value)
        ))
    }

    /// Shared access to the host instance behind `value`.
    pub fn borrow_userdata<T: 'static>(&self, value: Value) -> Result<&T, RuntimeError> {
        let ud = self.userdata_checked(value)?;
        let ptr = ud
            .downcast_ptr::<T>()
            .ok_or_else(|| self.foreign_type::<T>(value))?;
        // Owned payloads live until swept; borrowed referents are kept valid
        // by whoever bound them.
        Ok(unsafe { ptr.as_ref() })
    }

    /// Exclusive access; fails for instances bound through a shared reference.
    pub fn borrow_userdata_mut<T: 'static>(&mut self, value: Value) -> Result<&mut T, RuntimeError> {
        let ud = self.userdata_checked(value)?;
        let mut ptr = ud
            .downcast_ptr::<T>()
            .ok_or_else(|| self.foreign_type::<T>(value))?;
        if !ud.mutable {
            return Err(RuntimeError::BorrowMutability(self.type_name_of(value)));
        }
        Ok(unsafe { ptr.as_mut() })
    }
}
