//! The abstract capability table every registered host type carries.
//!
//! The VM only ever talks to `dyn CapabilityTable`; how a table is laid out
//! (flat and frozen, or open and chained) is decided by whoever registers the
//! type.

use crate::error::RuntimeError;
use crate::native::NativeFn;
use memory::Value;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;

/// How a type's capability table is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Open table: extensible after registration, parent chain and an
    /// `Index` fallback hook.
    #[default]
    Regular,
    /// Flat array dispatch, finalized at registration.
    Simple,
}

/// Script-visible operators a host type may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaOp {
    Eq,
    Call,
    ToString,
    Pairs,
    Len,
    Index,
}

impl MetaOp {
    pub const COUNT: usize = 6;

    pub const ALL: [MetaOp; MetaOp::COUNT] = [
        MetaOp::Eq,
        MetaOp::Call,
        MetaOp::ToString,
        MetaOp::Pairs,
        MetaOp::Len,
        MetaOp::Index,
    ];

    #[inline]
    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MetaOp::Eq => "__eq",
            MetaOp::Call => "__call",
            MetaOp::ToString => "__tostring",
            MetaOp::Pairs => "__pairs",
            MetaOp::Len => "__len",
            MetaOp::Index => "__index",
        }
    }
}

impl fmt::Display for MetaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registration lifecycle of a host type.
///
/// `Unregistered` entries exist for types whose instances were bound before
/// the type itself was registered; they behave identity-only until a table
/// is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState {
    Unregistered,
    Registering,
    /// Regular strategy: the table may still grow.
    Open,
    /// Simple strategy: the table is frozen.
    Finalized,
}

/// Which capabilities detection found for a host type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    pub has_equality: bool,
    pub has_call: bool,
    pub has_stream_output: bool,
    pub has_begin_end: bool,
    pub has_size: bool,
    pub has_default: bool,
}

pub trait CapabilityTable {
    fn strategy(&self) -> Strategy;

    fn metamethod(&self, op: MetaOp) -> Option<NativeFn>;

    fn member(&self, name: &str) -> Option<Value>;

    fn set_metamethod(&mut self, op: MetaOp, thunk: NativeFn) -> Result<(), RuntimeError>;

    fn set_member(&mut self, name: &str, value: Value) -> Result<(), RuntimeError>;

    /// Script table consulted when a member lookup misses this table.
    fn parent(&self) -> Option<Value> {
        None
    }

    fn set_parent(&mut self, _parent: Value) -> Result<(), RuntimeError> {
        Err(RuntimeError::RegistrationFailed(
            "this capability table has no parent chain".into(),
        ))
    }

    /// Values the GC must keep alive for as long as the table exists.
    fn roots(&self) -> Vec<Value>;
}

pub struct RegisteredType {
    pub name: String,
    pub type_id: TypeId,
    pub state: TypeState,
    pub flags: CapabilityFlags,
    pub table: Option<Box<dyn CapabilityTable>>,
    /// The script-visible table holding `new` and static functions.
    pub global: Option<Value>,
}

impl RegisteredType {
    pub fn unregistered(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
            state: TypeState::Unregistered,
            flags: CapabilityFlags::default(),
            table: None,
            global: None,
        }
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.table.as_ref().map(|t| t.strategy())
    }
}

impl fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredType")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("strategy", &self.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_op_slots_are_dense() {
        for (i, op) in MetaOp::ALL.iter().enumerate() {
            assert_eq!(op.slot(), i);
        }
    }

    #[test]
    fn strategy_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrap {
            strategy: Strategy,
        }
        let w: Wrap = toml::from_str("strategy = \"simple\"").unwrap();
        assert_eq!(w.strategy, Strategy::Simple);
        assert_eq!(Strategy::default(), Strategy::Regular);
    }
}
