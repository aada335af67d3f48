//! Machine module - VM implementation
//!
//! The runtime surface is segmented into focused submodules: value helpers
//! live in `vm`, operator resolution in `dispatch`, host type bookkeeping in
//! `registry` and `userdata`.

mod dispatch;
mod gc;
mod globals;
mod native;
mod registry;
mod userdata;
mod vm;

// Public API
pub use gc::GarbageCollector;
pub use native::NativeRegistry;
pub use vm::VM;
