//! Instance binding: wrapping host values and references as userdata.
//!
//! Binding never requires the type to be registered. An unknown type gets an
//! unregistered registry entry and behaves identity-only until a
//! registration attaches its capability table.

use memory::UserData;
use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::debug;
use vm::{FromValue, IntoValue, RuntimeError, Value, VM};

/// A userdata value known to wrap a `T`.
pub struct Bound<T> {
    value: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Bound<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Bound<T> {}

impl<T> fmt::Debug for Bound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bound").field(&self.value).finish()
    }
}

impl<T: 'static> Bound<T> {
    fn new(value: Value) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn value(self) -> Value {
        self.value
    }

    pub fn get(self, vm: &VM) -> Result<&T, RuntimeError> {
        vm.borrow_userdata::<T>(self.value)
    }

    pub fn get_mut(self, vm: &mut VM) -> Result<&mut T, RuntimeError> {
        vm.borrow_userdata_mut::<T>(self.value)
    }

    pub fn is_owned(self, vm: &VM) -> bool {
        vm.userdata(self.value).map_or(false, UserData::is_owned)
    }
}

impl<T> IntoValue for Bound<T> {
    fn into_value(self, _vm: &mut VM) -> Result<Value, RuntimeError> {
        Ok(self.value)
    }
}

impl<T: 'static> FromValue for Bound<T> {
    fn from_value(value: Value, vm: &VM) -> Result<Self, RuntimeError> {
        resolve::<T>(vm, value)
    }
}

/// Checks that `value` wraps a `T`.
pub fn resolve<T: 'static>(vm: &VM, value: Value) -> Result<Bound<T>, RuntimeError> {
    match vm.userdata(value) {
        Some(ud) if ud.type_id == TypeId::of::<T>() => Ok(Bound::new(value)),
        _ => Err(RuntimeError::TypeMismatch(format!(
            "expected {}, got {}",
            default_name::<T>(),
            vm.type_name_of(value)
        ))),
    }
}

/// Name for placeholder entries: the last path segment of the Rust type.
fn default_name<T: 'static>() -> &'static str {
    let full = type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(i) if !head.ends_with("::") => &full[i + 2..],
        _ => full,
    }
}

fn type_slot<T: 'static>(vm: &mut VM) -> u32 {
    vm.ensure_type::<T>(default_name::<T>())
}

/// Moves `value` into the VM. The instance is destroyed exactly once, when
/// the collector reclaims it (or when the VM is dropped).
pub fn bind_owned<T: 'static>(vm: &mut VM, value: T) -> Bound<T> {
    let index = type_slot::<T>(vm);
    let handle = vm.alloc_userdata(UserData::owned(index, value));
    debug!(ty = default_name::<T>(), "owned instance bound");
    Bound::new(handle)
}

/// Binds a host object through a shared reference. Mutating thunks and
/// [`Bound::get_mut`] reject the instance.
///
/// # Safety
///
/// `ptr` must point to a live `T` for as long as the returned value (or any
/// copy of it) is reachable from the VM, and no `&mut T` to the referent may
/// be live while the VM dispatches on it.
pub unsafe fn bind_ref<T: 'static>(vm: &mut VM, ptr: *const T) -> Result<Bound<T>, RuntimeError> {
    bind_borrowed(vm, ptr as *mut T, false)
}

/// Binds a host object through an exclusive reference.
///
/// # Safety
///
/// As for [`bind_ref`], and additionally no other reference to the referent
/// may be live while the VM dispatches on it.
pub unsafe fn bind_mut<T: 'static>(vm: &mut VM, ptr: *mut T) -> Result<Bound<T>, RuntimeError> {
    bind_borrowed(vm, ptr, true)
}

unsafe fn bind_borrowed<T: 'static>(
    vm: &mut VM,
    ptr: *mut T,
    mutable: bool,
) -> Result<Bound<T>, RuntimeError> {
    let ptr = NonNull::new(ptr).ok_or_else(|| {
        RuntimeError::DanglingHandle(format!("null {} reference", default_name::<T>()))
    })?;
    let index = type_slot::<T>(vm);
    let handle = vm.alloc_userdata(UserData::borrowed(index, ptr, mutable));
    debug!(ty = default_name::<T>(), mutable, "borrowed instance bound");
    Ok(Bound::new(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm::{GarbageCollector, TypeState};

    mod zoo {
        #[derive(Debug)]
        pub struct Dog {
            pub age: u32,
        }
    }
    use zoo::Dog;

    #[test]
    fn placeholder_names_drop_the_module_path() {
        assert_eq!(default_name::<Dog>(), "Dog");
        assert_eq!(default_name::<Vec<Dog>>(), "Vec<usertype::binder::tests::zoo::Dog>");
        assert_eq!(default_name::<i32>(), "i32");
    }

    #[test]
    fn binding_an_unknown_type_creates_an_unregistered_entry() {
        let mut vm = VM::new();
        let dog = bind_owned(&mut vm, Dog { age: 3 });
        let idx = vm.type_index_of::<Dog>().unwrap();
        assert_eq!(vm.registered_type(idx).unwrap().state, TypeState::Unregistered);
        assert_eq!(vm.type_name_of(dog.value()), "Dog");
        assert_eq!(dog.get(&vm).unwrap().age, 3);
    }

    #[test]
    fn shared_bindings_refuse_mutation() {
        let mut vm = VM::new();
        let host = Dog { age: 1 };
        let dog = unsafe { bind_ref(&mut vm, &host) }.unwrap();
        assert!(!dog.is_owned(&vm));
        assert_eq!(
            dog.get_mut(&mut vm).unwrap_err(),
            RuntimeError::BorrowMutability("Dog".into())
        );
    }

    #[test]
    fn null_references_are_rejected() {
        let mut vm = VM::new();
        let err = unsafe { bind_mut::<Dog>(&mut vm, std::ptr::null_mut()) }.unwrap_err();
        assert!(matches!(err, RuntimeError::DanglingHandle(_)));
    }

    #[test]
    fn resolve_checks_the_wrapped_type() {
        let mut vm = VM::new();
        let dog = bind_owned(&mut vm, Dog { age: 2 }).value();
        assert!(resolve::<Dog>(&vm, dog).is_ok());
        assert!(resolve::<String>(&vm, dog).is_err());
        assert!(resolve::<Dog>(&vm, Value::int(1)).is_err());
    }

    #[test]
    fn mutable_binding_writes_through_to_host() {
        let mut vm = VM::new();
        let mut host = Dog { age: 1 };
        let dog = unsafe { bind_mut(&mut vm, &mut host) }.unwrap();
        dog.get_mut(&mut vm).unwrap().age = 9;
        vm.collect_garbage();
        assert_eq!(host.age, 9);
    }
}
