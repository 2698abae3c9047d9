//! # Scripting Error Types
//!
//! All errors that can occur on the native side of the bridge.

use thiserror::Error;

use crate::context::ContextState;
use crate::runtime::{ProxyId, ScriptException};

/// Errors that can occur in the scripting bridge.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptingError {
    /// A registry or context was used before it was initialized.
    #[error("precondition violated for {class}: {reason}")]
    PreconditionViolation {
        /// Script class (or subsystem) that was misused.
        class: &'static str,
        /// What was missing.
        reason: &'static str,
    },

    /// A wrapper was inserted under a key that already has a live wrapper.
    #[error("duplicate key {key} in {class} registry")]
    DuplicateKey {
        /// Script class of the registry.
        class: &'static str,
        /// Debug rendering of the key.
        key: String,
    },

    /// A holder called into a wrapper after it was deleted, or released a
    /// reference it never held.
    #[error("dangling reference: {operation} on {class} object {id}")]
    DanglingReference {
        /// Script class of the wrapper.
        class: &'static str,
        /// Proxy identity of the wrapper.
        id: ProxyId,
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// A script raised an exception during a tick.
    #[error("script {script} raised {exception}")]
    ScriptRuntime {
        /// Name of the script.
        script: String,
        /// The exception it raised.
        exception: ScriptException,
    },

    /// A script failed during context initialization.
    #[error("script {script} failed to initialize: {exception}")]
    EntryScript {
        /// Name of the script.
        script: String,
        /// The exception it raised.
        exception: ScriptException,
    },

    /// The context was driven out of order.
    #[error("invalid context state: expected {expected:?}, found {found:?}")]
    InvalidState {
        /// State the operation requires.
        expected: ContextState,
        /// State the context was in.
        found: ContextState,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for scripting operations.
pub type ScriptingResult<T> = Result<T, ScriptingError>;
