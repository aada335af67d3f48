use crate::error::RuntimeError;
use crate::machine::VM;
use memory::Value;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// Return values of a native call. Most natives return one value; generic
/// `for` iterators return three, which still fits inline.
pub type Returns = SmallVec<[Value; 3]>;

// The unified signature for ALL extensions: stdlib natives, generated
// usertype thunks and host closures.
// args: the call arguments, receiver first for method-style calls.
pub type NativeFn = Rc<dyn Fn(&mut VM, &[Value]) -> Result<Returns, RuntimeError>>;

#[derive(Clone)]
pub struct NativeObj {
    pub name: String,
    pub func: NativeFn,
    pub arity: isize, // -1 for variadic
}

impl fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObj")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Wraps a single value as a native return list.
#[inline]
pub fn ret(value: Value) -> Returns {
    let mut out = Returns::new();
    out.push(value);
    out
}

/// Erases a closure into a `NativeFn`.
pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&mut VM, &[Value]) -> Result<Returns, RuntimeError> + 'static,
{
    Rc::new(f)
}
