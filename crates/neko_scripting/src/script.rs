//! Script scenes driven by the context.

use neko_shared::GameTime;

use crate::bindings::ScriptScope;
use crate::runtime::ScriptException;

/// Timing handed to every update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickTime {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Game time at this tick
    pub time: GameTime,
    /// Time since the previous tick
    pub delta: GameTime,
}

/// A script scene.
///
/// `initialize` runs once while the context starts (or when the script is
/// added to a running context). `update` runs once per tick.
pub trait Script: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// One-time setup.
    ///
    /// # Errors
    ///
    /// An exception here aborts context startup.
    fn initialize(&mut self, scope: &mut ScriptScope<'_>) -> Result<(), ScriptException> {
        let _ = scope;
        Ok(())
    }

    /// Per-tick update.
    ///
    /// # Errors
    ///
    /// Exceptions are logged and reported, never propagated.
    fn update(&mut self, scope: &mut ScriptScope<'_>, time: TickTime) -> Result<(), ScriptException>;
}

/// A script made from a closure.
pub struct FnScript<F> {
    name: String,
    update: F,
}

impl<F> FnScript<F> {
    /// Wraps an update closure.
    pub fn new(name: impl Into<String>, update: F) -> Self
    where
        F: FnMut(&mut ScriptScope<'_>, TickTime) -> Result<(), ScriptException> + Send,
    {
        Self {
            name: name.into(),
            update,
        }
    }
}

impl<F> Script for FnScript<F>
where
    F: FnMut(&mut ScriptScope<'_>, TickTime) -> Result<(), ScriptException> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, scope: &mut ScriptScope<'_>, time: TickTime) -> Result<(), ScriptException> {
        (self.update)(scope, time)
    }
}
