//! Userdata slots: the heap-side half of a bound host instance.
//!
//! A slot records where the native object lives, which host type it is, and
//! whether the VM owns it. Only [`Ownership::Owned`] slots ever run the
//! native destructor, and they run it from `Drop`, so a slot that is swept
//! (or a heap that is dropped) destroys its payload exactly once.

use std::any::TypeId;
use std::fmt;
use std::mem;
use std::ptr::NonNull;

/// Ownership discriminant, fixed at bind time.
pub enum Ownership {
    /// The VM constructed the object on behalf of a script and frees it on
    /// reclamation.
    Owned { drop_fn: unsafe fn(NonNull<()>) },
    /// Host code owns the object; the slot is an address only.
    Borrowed,
}

impl fmt::Debug for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ownership::Owned { .. } => f.write_str("Owned"),
            Ownership::Borrowed => f.write_str("Borrowed"),
        }
    }
}

unsafe fn drop_boxed<T>(ptr: NonNull<()>) {
    drop(Box::from_raw(ptr.cast::<T>().as_ptr()));
}

pub struct UserData {
    /// Index into the VM's type registry.
    pub type_index: u32,
    pub type_id: TypeId,
    pub address: NonNull<()>,
    /// `false` for instances bound through a shared reference.
    pub mutable: bool,
    pub zero_sized: bool,
    ownership: Ownership,
}

impl UserData {
    /// Moves `value` to its own allocation and takes ownership of it.
    pub fn owned<T: 'static>(type_index: u32, value: T) -> Self {
        let raw = Box::into_raw(Box::new(value));
        // Box::into_raw never returns null.
        let address = unsafe { NonNull::new_unchecked(raw) }.cast::<()>();
        Self {
            type_index,
            type_id: TypeId::of::<T>(),
            address,
            mutable: true,
            zero_sized: mem::size_of::<T>() == 0,
            ownership: Ownership::Owned {
                drop_fn: drop_boxed::<T>,
            },
        }
    }

    /// Wraps a host-owned object without taking ownership.
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for as long as any value referring to this slot
    /// is reachable from the VM, and must not be aliased by a live `&mut`
    /// while the VM dereferences it. When `mutable` is true the VM may hand
    /// out exclusive references to the referent.
    pub unsafe fn borrowed<T: 'static>(type_index: u32, ptr: NonNull<T>, mutable: bool) -> Self {
        Self {
            type_index,
            type_id: TypeId::of::<T>(),
            address: ptr.cast(),
            mutable,
            zero_sized: mem::size_of::<T>() == 0,
            ownership: Ownership::Borrowed,
        }
    }

    pub fn ownership(&self) -> &Ownership {
        &self.ownership
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.ownership, Ownership::Owned { .. })
    }

    /// Identity test: same host type at the same native address.
    ///
    /// A borrowed slot's address comes from the host reference, so it is the
    /// identity even for zero-sized types. An owned zero-sized payload sits
    /// at a dangling address shared by every such box; those slots are only
    /// the same instance through the same heap handle, which callers compare.
    pub fn same_instance(&self, other: &UserData) -> bool {
        if self.type_id != other.type_id || self.address != other.address {
            return false;
        }
        !self.zero_sized || (!self.is_owned() && !other.is_owned())
    }

    /// Typed view of the native address, if this slot holds a `T`.
    pub fn downcast_ptr<T: 'static>(&self) -> Option<NonNull<T>> {
        if self.type_id == TypeId::of::<T>() {
            Some(self.address.cast())
        } else {
            None
        }
    }

    pub fn address(&self) -> usize {
        self.address.as_ptr() as usize
    }
}

impl Drop for UserData {
    fn drop(&mut self) {
        if let Ownership::Owned { drop_fn } = self.ownership {
            // Only Owned slots were produced by Box::into_raw.
            unsafe { drop_fn(self.address) };
        }
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("type_index", &self.type_index)
            .field("address", &format_args!("{:#x}", self.address()))
            .field("mutable", &self.mutable)
            .field("ownership", &self.ownership)
            .finish()
    }
}
