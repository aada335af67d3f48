use thiserror::Error;

/// Every failure a script-visible operation can raise.
///
/// Errors produced inside thunks travel back to the caller of the VM entry
/// point unchanged; nothing is swallowed and nothing aborts the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A script value cannot convert to the required native parameter type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Wrong argument count for the matched native signature.
    #[error("arity mismatch: {0}")]
    ArityMismatch(String),

    /// Operation applied to a value that lacks the capability, e.g.
    /// "attempt to call a table value".
    #[error("attempt to {action} a {type_name} value")]
    AttemptTo {
        action: &'static str,
        type_name: String,
    },

    /// A native operation panicked while running under a thunk.
    #[error("native exception: {0}")]
    NativeException(String),

    /// The capability table was finalized (simple strategy) and cannot change.
    #[error("capability table for '{0}' is finalized")]
    TableFinalized(String),

    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// Exclusive access requested on an instance bound through a shared reference.
    #[error("'{0}' instance is bound read-only")]
    BorrowMutability(String),

    #[error("dangling handle: {0}")]
    DanglingHandle(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("undefined global variable: {0}")]
    UndefinedGlobal(String),

    #[error("{0}")]
    Unknown(String),
}

impl RuntimeError {
    pub fn attempt(action: &'static str, type_name: impl Into<String>) -> Self {
        RuntimeError::AttemptTo {
            action,
            type_name: type_name.into(),
        }
    }
}

impl From<String> for RuntimeError {
    fn from(s: String) -> Self {
        RuntimeError::Unknown(s)
    }
}

impl From<&str> for RuntimeError {
    fn from(s: &str) -> Self {
        RuntimeError::Unknown(s.to_string())
    }
}
