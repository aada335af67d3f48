//! Compile-time capability detection.
//!
//! A host type advertises script-visible capabilities through ordinary
//! traits: `PartialEq` (or [`MutEq`]) for `==`, [`Callable`] for calls,
//! `Display` for `tostring`, `&T: IntoIterator` for generic `for`, [`Length`]
//! for `#` and `Default` for the `new` factory.
//!
//! Detection uses autoref-based specialization: every capability has one
//! probe trait per priority level, all exposing the same method name, and
//! each implemented for a differently-referenced [`Probe<T>`]. Method
//! resolution picks the implementation with the fewest auto-derefs whose
//! bounds hold, so the outcome is a compile-time choice and absent
//! capabilities cost nothing at runtime. The choice only happens where `T` is
//! concrete, which is why detection is driven by the [`capabilities!`]
//! macro rather than a generic function.
//!
//! [`capabilities!`]: crate::capabilities

use std::fmt;
use std::marker::PhantomData;
use vm::{CapabilityFlags, FromArgs, IntoValue, RuntimeError, Value, VM};

/// A host type invocable from scripts.
///
/// Argument decoding happens per call through [`FromArgs`], so a single
/// signature serves every call site; mismatched counts or types surface as
/// `ArityMismatch`/`TypeMismatch`.
pub trait Callable {
    type Args: FromArgs;
    type Output: IntoValue;

    fn call(&mut self, args: Self::Args) -> Self::Output;
}

/// Equality that needs exclusive access to both operands.
///
/// Only invoked when both instances are mutable bindings; an instance bound
/// through a shared reference compares by identity instead.
pub trait MutEq {
    fn eq_mut(&mut self, other: &mut Self) -> bool;
}

/// Size query backing the `#` operator.
pub trait Length {
    fn length(&self) -> usize;
}

pub type EqFn<T> = fn(&T, &T) -> bool;
pub type EqMutFn<T> = fn(&mut T, &mut T) -> bool;
pub type CallFn<T> = fn(&mut T, &mut VM, &[Value]) -> Result<Value, RuntimeError>;
pub type ToStringFn<T> = fn(&T) -> String;
/// Produces the element at a 0-based position, or `None` past the end.
pub type IterStepFn<T> = fn(&T, &mut VM, usize) -> Result<Option<Value>, RuntimeError>;
pub type LengthFn<T> = fn(&T) -> usize;
pub type ConstructFn<T> = fn() -> T;

/// How two distinct instances of a type compare.
pub enum Equality<T> {
    /// No native comparison: only the same instance is equal.
    Identity,
    Value(EqFn<T>),
    Mutable(EqMutFn<T>),
}

impl<T> Equality<T> {
    pub fn is_native(&self) -> bool {
        !matches!(self, Equality::Identity)
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Equality<T> {}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Equality::Identity => "Identity",
            Equality::Value(_) => "Value",
            Equality::Mutable(_) => "Mutable",
        })
    }
}

/// Everything detection found for `T`, as compile-time-resolved function
/// pointers.
pub struct CapabilitySet<T> {
    pub equality: Equality<T>,
    pub call: Option<CallFn<T>>,
    pub tostring: Option<ToStringFn<T>>,
    pub iteration: Option<IterStepFn<T>>,
    pub length: Option<LengthFn<T>>,
    pub construct: Option<ConstructFn<T>>,
}

impl<T> CapabilitySet<T> {
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags {
            has_equality: self.equality.is_native(),
            has_call: self.call.is_some(),
            has_stream_output: self.tostring.is_some(),
            has_begin_end: self.iteration.is_some(),
            has_size: self.length.is_some(),
            has_default: self.construct.is_some(),
        }
    }
}

impl<T> Clone for CapabilitySet<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CapabilitySet<T> {}

impl<T> fmt::Debug for CapabilitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("equality", &self.equality)
            .field("flags", &self.flags())
            .finish()
    }
}

/// Zero-sized detection witness. See the module docs.
pub struct Probe<T>(PhantomData<fn() -> T>);

impl<T> Probe<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Probe(PhantomData)
    }
}

fn call_native<T: Callable>(obj: &mut T, vm: &mut VM, args: &[Value]) -> Result<Value, RuntimeError> {
    let args = T::Args::from_args(args, vm)?;
    obj.call(args).into_value(vm)
}

fn iter_step<T>(obj: &T, vm: &mut VM, pos: usize) -> Result<Option<Value>, RuntimeError>
where
    for<'a> &'a T: IntoIterator,
    for<'a> <&'a T as IntoIterator>::Item: IntoValue,
{
    match obj.into_iter().nth(pos) {
        Some(item) => item.into_value(vm).map(Some),
        None => Ok(None),
    }
}

/// Probe traits. Brought into scope wholesale by [`capabilities!`].
///
/// [`capabilities!`]: crate::capabilities
pub mod probes {
    use super::*;

    // Equality: three levels, probed through `&&&Probe<T>`.

    pub trait ValueEqProbe {
        type Host;
        fn equality(&self) -> Equality<Self::Host>;
    }

    impl<T: PartialEq> ValueEqProbe for &&Probe<T> {
        type Host = T;
        fn equality(&self) -> Equality<T> {
            Equality::Value(<T as PartialEq>::eq)
        }
    }

    pub trait MutEqProbe {
        type Host;
        fn equality(&self) -> Equality<Self::Host>;
    }

    impl<T: MutEq> MutEqProbe for &Probe<T> {
        type Host = T;
        fn equality(&self) -> Equality<T> {
            Equality::Mutable(<T as MutEq>::eq_mut)
        }
    }

    pub trait IdentityEqProbe {
        type Host;
        fn equality(&self) -> Equality<Self::Host>;
    }

    impl<T> IdentityEqProbe for Probe<T> {
        type Host = T;
        fn equality(&self) -> Equality<T> {
            Equality::Identity
        }
    }

    // The rest: two levels, probed through `&&Probe<T>`.

    pub trait CallProbe {
        type Host;
        fn call_op(&self) -> Option<CallFn<Self::Host>>;
    }

    impl<T: Callable> CallProbe for &Probe<T> {
        type Host = T;
        fn call_op(&self) -> Option<CallFn<T>> {
            Some(call_native::<T>)
        }
    }

    pub trait NoCallProbe {
        type Host;
        fn call_op(&self) -> Option<CallFn<Self::Host>>;
    }

    impl<T> NoCallProbe for Probe<T> {
        type Host = T;
        fn call_op(&self) -> Option<CallFn<T>> {
            None
        }
    }

    pub trait DisplayProbe {
        type Host;
        fn tostring_op(&self) -> Option<ToStringFn<Self::Host>>;
    }

    impl<T: fmt::Display> DisplayProbe for &Probe<T> {
        type Host = T;
        fn tostring_op(&self) -> Option<ToStringFn<T>> {
            Some(<T as ToString>::to_string)
        }
    }

    pub trait NoDisplayProbe {
        type Host;
        fn tostring_op(&self) -> Option<ToStringFn<Self::Host>>;
    }

    impl<T> NoDisplayProbe for Probe<T> {
        type Host = T;
        fn tostring_op(&self) -> Option<ToStringFn<T>> {
            None
        }
    }

    pub trait IterProbe {
        type Host;
        fn iteration_op(&self) -> Option<IterStepFn<Self::Host>>;
    }

    impl<T> IterProbe for &Probe<T>
    where
        for<'a> &'a T: IntoIterator,
        for<'a> <&'a T as IntoIterator>::Item: IntoValue,
    {
        type Host = T;
        fn iteration_op(&self) -> Option<IterStepFn<T>> {
            Some(iter_step::<T>)
        }
    }

    pub trait NoIterProbe {
        type Host;
        fn iteration_op(&self) -> Option<IterStepFn<Self::Host>>;
    }

    impl<T> NoIterProbe for Probe<T> {
        type Host = T;
        fn iteration_op(&self) -> Option<IterStepFn<T>> {
            None
        }
    }

    pub trait LengthProbe {
        type Host;
        fn length_op(&self) -> Option<LengthFn<Self::Host>>;
    }

    impl<T: Length> LengthProbe for &Probe<T> {
        type Host = T;
        fn length_op(&self) -> Option<LengthFn<T>> {
            Some(<T as Length>::length)
        }
    }

    pub trait NoLengthProbe {
        type Host;
        fn length_op(&self) -> Option<LengthFn<Self::Host>>;
    }

    impl<T> NoLengthProbe for Probe<T> {
        type Host = T;
        fn length_op(&self) -> Option<LengthFn<T>> {
            None
        }
    }

    pub trait DefaultProbe {
        type Host;
        fn construct_op(&self) -> Option<ConstructFn<Self::Host>>;
    }

    impl<T: Default> DefaultProbe for &Probe<T> {
        type Host = T;
        fn construct_op(&self) -> Option<ConstructFn<T>> {
            Some(<T as Default>::default)
        }
    }

    pub trait NoDefaultProbe {
        type Host;
        fn construct_op(&self) -> Option<ConstructFn<Self::Host>>;
    }

    impl<T> NoDefaultProbe for Probe<T> {
        type Host = T;
        fn construct_op(&self) -> Option<ConstructFn<T>> {
            None
        }
    }
}

/// Detects the [`CapabilitySet`] of a concrete type.
///
/// ```ignore
/// let caps = usertype::capabilities!(Vec<i64>);
/// assert!(caps.flags().has_begin_end);
/// ```
#[macro_export]
macro_rules! capabilities {
    ($ty:ty) => {{
        #[allow(unused_imports)]
        use $crate::detect::probes::*;
        $crate::detect::CapabilitySet::<$ty> {
            equality: (&&&$crate::detect::Probe::<$ty>::new()).equality(),
            call: (&&$crate::detect::Probe::<$ty>::new()).call_op(),
            tostring: (&&$crate::detect::Probe::<$ty>::new()).tostring_op(),
            iteration: (&&$crate::detect::Probe::<$ty>::new()).iteration_op(),
            length: (&&$crate::detect::Probe::<$ty>::new()).length_op(),
            construct: (&&$crate::detect::Probe::<$ty>::new()).construct_op(),
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque {
        _tag: u8,
    }

    #[derive(PartialEq, Default)]
    struct Point {
        x: i64,
        y: i64,
    }

    struct Sticky(i64);

    impl MutEq for Sticky {
        fn eq_mut(&mut self, other: &mut Self) -> bool {
            self.0 == other.0
        }
    }

    struct Adder;

    impl Callable for Adder {
        type Args = (i64, String);
        type Output = i64;

        fn call(&mut self, (n, s): (i64, String)) -> i64 {
            n + s.len() as i64
        }
    }

    struct Six;

    impl Length for Six {
        fn length(&self) -> usize {
            6
        }
    }

    impl fmt::Display for Six {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "six")
        }
    }

    #[test]
    fn opaque_types_detect_nothing() {
        let caps = capabilities!(Opaque);
        assert_eq!(caps.flags(), CapabilityFlags::default());
        assert!(matches!(caps.equality, Equality::Identity));
    }

    #[test]
    fn partial_eq_wins_value_equality() {
        let caps = capabilities!(Point);
        let Equality::Value(eq) = caps.equality else {
            panic!("expected value equality, got {:?}", caps.equality);
        };
        assert!(eq(&Point { x: 1, y: 2 }, &Point { x: 1, y: 2 }));
        assert!(!eq(&Point { x: 1, y: 2 }, &Point::default()));
        assert!(caps.flags().has_default);
    }

    #[test]
    fn mut_eq_is_detected_below_partial_eq() {
        let caps = capabilities!(Sticky);
        assert!(matches!(caps.equality, Equality::Mutable(_)));
        assert!(caps.flags().has_equality);
    }

    #[test]
    fn callable_and_length_and_display() {
        let flags = capabilities!(Adder).flags();
        assert!(flags.has_call);
        assert!(!flags.has_size);

        let caps = capabilities!(Six);
        assert_eq!(caps.length.map(|f| f(&Six)), Some(6));
        assert_eq!(caps.tostring.map(|f| f(&Six)).as_deref(), Some("six"));
        assert!(!caps.flags().has_call);
    }

    #[test]
    fn containers_of_convertible_items_iterate() {
        assert!(capabilities!(Vec<i64>).flags().has_begin_end);
        assert!(capabilities!([u8; 4]).flags().has_begin_end);
        assert!(!capabilities!(Opaque).flags().has_begin_end);
    }

    #[test]
    fn iteration_steps_by_position() {
        let caps = capabilities!(Vec<i64>);
        let step = caps.iteration.unwrap();
        let mut vm = VM::new();
        let data = vec![10, 20];
        assert_eq!(step(&data, &mut vm, 1).unwrap(), Some(Value::int(20)));
        assert_eq!(step(&data, &mut vm, 2).unwrap(), None);
    }
}
