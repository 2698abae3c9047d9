//! Runtime side of the bridge: the proxy heap and script values.

mod heap;
mod value;

pub use heap::{ClassId, ClassTemplate, ProxyHeap, ProxyId, ProxyMode};
pub(crate) use heap::Reclaimable;
pub use value::{ExceptionKind, ObjectRef, ScriptException, ScriptValue};
