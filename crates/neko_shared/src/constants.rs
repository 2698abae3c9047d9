//! # Engine Timing Constants
//!
//! Defaults for the simulation loop the scripting bridge is driven by.

/// Simulation time in seconds.
pub type GameTime = f64;

/// Tick rate (script updates per second)
pub const TICK_RATE: u32 = 60;

/// Duration of one tick in seconds
pub const TICK_DELTA: GameTime = 1.0 / TICK_RATE as GameTime;
