//! Binding native Rust types into the VM as first-class userdata.
//!
//! A registration detects what a host type can do (equality, call,
//! `tostring`, iteration, length, default construction), synthesizes a
//! dispatch thunk per capability and stores them in a capability table
//! attached to the type. Instances are then bound as owned values or as
//! borrowed references to host storage.
//!
//! ```ignore
//! use usertype::{bind_owned, new_usertype};
//! use vm::VM;
//!
//! #[derive(Default, PartialEq)]
//! struct Dog { age: u32 }
//!
//! let mut vm = VM::new();
//! new_usertype!(&mut vm, Dog, "Dog")?;
//! let dog = bind_owned(&mut vm, Dog { age: 3 });
//! vm.set_global("dog", dog)?;
//! ```

pub mod binder;
pub mod detect;
pub mod registry;
pub mod synth;
pub mod table;

pub use binder::{bind_mut, bind_owned, bind_ref, resolve, Bound};
pub use detect::{Callable, CapabilitySet, Equality, Length, MutEq, Probe};
pub use registry::{add_member, UsertypeBuilder};
pub use table::{RegularTable, SimpleTable};
pub use vm::{CapabilityFlags, MetaOp, Strategy, TypeState};
