//! # NEKO Scripting
//!
//! The bridge between script code and native engine objects.
//!
//! ## Model
//!
//! - Every script-visible object is a [`Wrapped<T>`]: one native payload and
//!   one proxy in the runtime's [`ProxyHeap`].
//! - Script code pins an object with `retain` and lets go with `release`;
//!   unpinned objects are reclaimed by the next collection pass.
//! - Registries own the native view of every wrapper. Keyed registries hand
//!   out at most one live wrapper per entity.
//! - Meshes and texts are announced to the render thread through
//!   [`RenderSync`], flushed once at the end of every tick.
//!
//! ## Example
//!
//! ```rust,ignore
//! use neko_scripting::{FnScript, ScriptingConfig, ScriptingContext};
//!
//! let mut ctx = ScriptingContext::builder()
//!     .config(ScriptingConfig::default())
//!     .script(FnScript::new("spinner", |scope, _time| {
//!         let v = scope.construct("vec3", &[1.0.into(), 2.0.into(), 3.0.into()])?;
//!         scope.retain(&v)?;
//!         Ok(())
//!     }))
//!     .start()?;
//!
//! let render_sync = ctx.render_sync().clone(); // hand to the render thread
//! ctx.tick(0.0, neko_shared::TICK_DELTA)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bindings;
pub mod config;
pub mod context;
pub mod error;
pub mod objects;
pub mod registry;
pub mod runtime;
pub mod script;
pub mod wrapped;

pub use bindings::ScriptScope;
pub use config::{ReclaimPolicy, ScriptingConfig};
pub use context::{
    ContextState, MeshHandle, RenderSync, ScriptRegistries, ScriptingContext, ScriptingContextBuilder, TextHandle,
    TickReport, TransformSink,
};
pub use error::{ScriptingError, ScriptingResult};
pub use registry::{KeyedObjectRegistry, ObjectRegistry, Registry};
pub use runtime::{
    ClassId, ClassTemplate, ExceptionKind, ObjectRef, ProxyHeap, ProxyId, ProxyMode, ScriptException, ScriptValue,
};
pub use script::{FnScript, Script, TickTime};
pub use wrapped::{Handle, Payload, Wrapped, WrappedKind};
