pub mod config;
pub mod error;
pub mod globals;
pub mod machine;
pub mod marshal;
pub mod metatable;
pub mod native;
pub mod stdlib;

pub use config::{ConfigError, VmConfig};
pub use error::RuntimeError;
pub use globals::GlobalEntry;
pub use machine::{GarbageCollector, NativeRegistry, VM};
pub use marshal::{FromArgs, FromValue, IntoValue};
pub use memory::Value;
pub use metatable::{
    CapabilityFlags, CapabilityTable, MetaOp, RegisteredType, Strategy, TypeState,
};
pub use native::{native_fn, ret, NativeFn, NativeObj, Returns};
