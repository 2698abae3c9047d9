//! # Scripting Context
//!
//! Owns the proxy heap handle, every registry, the render sync channels and
//! the loaded scripts, and drives them through their lifecycle:
//!
//! ```text
//! Uninitialized ──initialize──► Initializing ──► Running ──teardown──► ShuttingDown ──► Disposed
//!                                    │                                                    ▲
//!                                    └──────────── entry script failed ───────────────────┘
//! ```
//!
//! One tick = every script's update, an optional collection pass, then
//! exactly one render sync flush.

mod builder;
mod registries;

use std::collections::BTreeMap;
use std::sync::Arc;

use neko_core::EntityId;
use neko_shared::{GameTime, Transform};

pub use builder::ScriptingContextBuilder;
pub use registries::{MeshHandle, RenderSync, ScriptRegistries, TextHandle};

use crate::bindings::ScriptScope;
use crate::config::ScriptingConfig;
use crate::error::{ScriptingError, ScriptingResult};
use crate::runtime::{ProxyHeap, ScriptValue};
use crate::script::{Script, TickTime};

/// Lifecycle state of a [`ScriptingContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// Built, registries not yet initialized
    Uninitialized,
    /// Registering classes and running script setup
    Initializing,
    /// Accepting ticks
    Running,
    /// Tearing down registries
    ShuttingDown,
    /// Done; every wrapper is invalid
    Disposed,
}

/// Receives resolved transforms during [`ScriptingContext::sync_transforms`].
pub trait TransformSink {
    /// Applies one entity's transform.
    fn apply_transform(&mut self, entity: EntityId, transform: Transform);
}

impl<F: FnMut(EntityId, Transform)> TransformSink for F {
    fn apply_transform(&mut self, entity: EntityId, transform: Transform) {
        self(entity, transform);
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Scripts whose update ran
    pub scripts_run: usize,
    /// Exceptions raised this tick, one per failing script
    pub errors: Vec<ScriptingError>,
    /// Proxies reclaimed by this tick's collection pass
    pub reclaimed: usize,
    /// Render sync events flushed at the end of the tick
    pub events_flushed: usize,
}

struct ScriptSlot {
    name: String,
    script: Box<dyn Script>,
    consecutive_failures: u32,
    suspended: bool,
}

impl ScriptSlot {
    fn new(script: Box<dyn Script>) -> Self {
        Self {
            name: script.name().to_owned(),
            script,
            consecutive_failures: 0,
            suspended: false,
        }
    }
}

/// The scripting runtime of one game instance.
pub struct ScriptingContext {
    state: ContextState,
    config: ScriptingConfig,
    heap: Arc<ProxyHeap>,
    owns_heap: bool,
    registries: ScriptRegistries,
    render_sync: RenderSync,
    scripts: Vec<ScriptSlot>,
    globals: BTreeMap<String, ScriptValue>,
    tick_count: u64,
    /// `reclaimed_total` of the heap when the registries last purged
    purged_generation: u64,
}

impl ScriptingContext {
    /// Starts building a context.
    #[must_use]
    pub fn builder() -> ScriptingContextBuilder {
        ScriptingContextBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ScriptingConfig,
        heap: Arc<ProxyHeap>,
        owns_heap: bool,
        scripts: Vec<Box<dyn Script>>,
        globals: BTreeMap<String, ScriptValue>,
    ) -> Self {
        let render_sync = RenderSync::new(config.event_capacity);
        let registries = ScriptRegistries::new(heap.clone(), &render_sync);
        Self {
            state: ContextState::Uninitialized,
            config,
            heap,
            owns_heap,
            registries,
            render_sync,
            scripts: scripts.into_iter().map(ScriptSlot::new).collect(),
            globals,
            tick_count: 0,
            purged_generation: 0,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Registers every class and runs each script's `initialize`.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::InvalidState`] unless uninitialized.
    /// [`ScriptingError::EntryScript`] if a script throws; the context is
    /// torn down and left `Disposed`.
    pub fn initialize(&mut self) -> ScriptingResult<()> {
        self.expect_state(ContextState::Uninitialized)?;
        self.state = ContextState::Initializing;

        let classes = self.registries.initialize_all();
        tracing::info!(classes, scripts = self.scripts.len(), "scripting context initializing");

        for index in 0..self.scripts.len() {
            if let Err(err) = self.initialize_script(index) {
                tracing::error!(%err, "entry script failed, tearing down");
                self.teardown();
                return Err(err);
            }
        }

        self.state = ContextState::Running;
        tracing::info!("scripting context running");
        Ok(())
    }

    fn initialize_script(&mut self, index: usize) -> ScriptingResult<()> {
        let slot = &mut self.scripts[index];
        let mut scope = ScriptScope::new(&mut self.registries, &self.globals, &slot.name);
        slot.script
            .initialize(&mut scope)
            .map_err(|exception| ScriptingError::EntryScript {
                script: slot.name.clone(),
                exception,
            })
    }

    /// Adds a script. On a running context its `initialize` runs right away.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::InvalidState`] once shutting down,
    /// [`ScriptingError::EntryScript`] if `initialize` throws (the script is
    /// not kept).
    pub fn add_script(&mut self, script: Box<dyn Script>) -> ScriptingResult<()> {
        match self.state {
            ContextState::Uninitialized => {
                self.scripts.push(ScriptSlot::new(script));
                Ok(())
            }
            ContextState::Running => {
                self.scripts.push(ScriptSlot::new(script));
                let index = self.scripts.len() - 1;
                self.initialize_script(index).map_err(|err| {
                    self.scripts.pop();
                    err
                })
            }
            found => Err(ScriptingError::InvalidState {
                expected: ContextState::Running,
                found,
            }),
        }
    }

    /// Runs one tick.
    ///
    /// Script exceptions are logged and collected in the report; they never
    /// abort the tick.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::InvalidState`] unless running.
    pub fn tick(&mut self, time: GameTime, delta: GameTime) -> ScriptingResult<TickReport> {
        self.expect_state(ContextState::Running)?;
        self.tick_count += 1;
        let tick_time = TickTime {
            tick: self.tick_count,
            time,
            delta,
        };
        let mut report = TickReport {
            tick: self.tick_count,
            ..TickReport::default()
        };

        // Step 1: Script updates, in load order
        let max_failures = self.config.max_consecutive_failures;
        for slot in self.scripts.iter_mut().filter(|slot| !slot.suspended) {
            let mut scope = ScriptScope::new(&mut self.registries, &self.globals, &slot.name);
            report.scripts_run += 1;
            match slot.script.update(&mut scope, tick_time) {
                Ok(()) => slot.consecutive_failures = 0,
                Err(exception) => {
                    slot.consecutive_failures += 1;
                    tracing::warn!(
                        script = %slot.name,
                        tick = self.tick_count,
                        %exception,
                        "script update threw"
                    );
                    if max_failures > 0 && slot.consecutive_failures >= max_failures {
                        slot.suspended = true;
                        tracing::error!(
                            script = %slot.name,
                            failures = slot.consecutive_failures,
                            "script suspended after repeated failures"
                        );
                    }
                    report.errors.push(ScriptingError::ScriptRuntime {
                        script: slot.name.clone(),
                        exception,
                    });
                }
            }
        }

        // Step 2: Collection pass, or purge what the runtime already reclaimed
        let interval = u64::from(self.config.gc_interval_ticks);
        if interval > 0 && self.tick_count % interval == 0 {
            report.reclaimed = self.collect_garbage();
        } else if self.heap.reclaimed_total() != self.purged_generation {
            self.purge_registries();
        }

        // Step 3: Hand this tick's lifecycle events to the renderer
        report.events_flushed = self.render_sync.sync_from_scripting();

        tracing::trace!(
            tick = report.tick,
            errors = report.errors.len(),
            reclaimed = report.reclaimed,
            events = report.events_flushed,
            "tick complete"
        );
        Ok(report)
    }

    /// Runs a collection pass now and purges the registries. Returns the
    /// number of proxies reclaimed.
    pub fn collect_garbage(&mut self) -> usize {
        let reclaimed = self.heap.collect();
        let purged = self.purge_registries();
        tracing::debug!(reclaimed, purged, "garbage collected");
        reclaimed
    }

    /// Drops finalized wrappers from every registry. Other contexts on a
    /// shared heap may have reclaimed them, so this runs whenever the heap's
    /// reclaim total moved since our last purge.
    fn purge_registries(&mut self) -> usize {
        // read before purging so reclaims racing the purge trigger another one
        let generation = self.heap.reclaimed_total();
        let purged = self.registries.purge_all();
        self.purged_generation = generation;
        purged
    }

    /// Pushes every changed transform component to `sink` and clears its
    /// change flags. Returns the number pushed.
    ///
    /// A component whose member was destroyed natively cannot be resolved;
    /// it is logged and skipped, and the remaining entities still sync.
    pub fn sync_transforms<S: TransformSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut pushed = 0;
        for (entity, component) in self.registries.transforms.items() {
            if component.is_deleted() {
                continue;
            }
            let own_dirty = component.is_dirty();
            let resolved = component.read(|c| {
                if own_dirty || c.members_dirty() {
                    c.resolve().map(Some)
                } else {
                    Ok(None)
                }
            });
            let transform = match resolved.and_then(|inner| inner) {
                Ok(Some(transform)) => transform,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(%entity, %err, "transform component skipped during sync");
                    continue;
                }
            };
            sink.apply_transform(*entity, transform);
            if component.read(|c| c.mark_members_clean()).is_ok() {
                component.mark_clean();
            }
            pushed += 1;
        }
        pushed
    }

    /// Runs `f` with a script scope, for native code exposing data to
    /// script outside a tick.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::InvalidState`] unless running.
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut ScriptScope<'_>) -> R) -> ScriptingResult<R> {
        self.expect_state(ContextState::Running)?;
        let mut scope = ScriptScope::new(&mut self.registries, &self.globals, "<native>");
        Ok(f(&mut scope))
    }

    /// Invalidates every wrapper, drops scripts and in-flight render events.
    /// Idempotent.
    pub fn teardown(&mut self) {
        if matches!(self.state, ContextState::Disposed | ContextState::ShuttingDown) {
            return;
        }
        self.state = ContextState::ShuttingDown;

        // Step 1: Registries, most dependent class first
        let cleared = self.registries.clear_all();

        // Step 2: Proxies. A shared heap keeps its slots; ours are all demoted.
        let reclaimed = if self.owns_heap { self.heap.clear() } else { self.heap.collect() };

        // Step 3: Anything the renderer has not drained yet refers to dead objects
        self.render_sync.reset_from_renderer();
        self.scripts.clear();

        self.state = ContextState::Disposed;
        tracing::info!(cleared, reclaimed, "scripting context disposed");
    }

    fn expect_state(&self, expected: ContextState) -> ScriptingResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ScriptingError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// The proxy heap.
    #[must_use]
    pub fn heap(&self) -> &Arc<ProxyHeap> {
        &self.heap
    }

    /// Read access to the registries.
    #[must_use]
    pub fn registries(&self) -> &ScriptRegistries {
        &self.registries
    }

    /// Native write access to the registries.
    pub fn registries_mut(&mut self) -> &mut ScriptRegistries {
        &mut self.registries
    }

    /// Render sync channels; clone and hand to the render thread.
    #[must_use]
    pub fn render_sync(&self) -> &RenderSync {
        &self.render_sync
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Scripts loaded.
    #[must_use]
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Whether a script was suspended for failing repeatedly.
    #[must_use]
    pub fn is_suspended(&self, name: &str) -> bool {
        self.scripts.iter().any(|slot| slot.name == name && slot.suspended)
    }
}

impl Drop for ScriptingContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ScriptingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptingContext")
            .field("state", &self.state)
            .field("tick_count", &self.tick_count)
            .field("scripts", &self.scripts.len())
            .field("wrappers", &self.registries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::runtime::{ScriptException, ScriptValue};
    use crate::script::FnScript;
    use neko_shared::{Vec3, TICK_DELTA};

    fn running(config: ScriptingConfig) -> ScriptingContext {
        ScriptingContext::builder().config(config).start().unwrap()
    }

    #[test]
    fn test_tick_before_initialize_is_invalid_state() {
        let mut ctx = ScriptingContext::builder().build().unwrap();
        let err = ctx.tick(0.0, TICK_DELTA).unwrap_err();
        assert_eq!(
            err,
            ScriptingError::InvalidState {
                expected: ContextState::Running,
                found: ContextState::Uninitialized,
            }
        );
        ctx.initialize().unwrap();
        assert!(ctx.initialize().is_err());
    }

    #[test]
    fn test_exception_does_not_stop_other_scripts() {
        let mut ctx = running(ScriptingConfig::default());
        ctx.add_script(Box::new(FnScript::new("thrower", |_, _| {
            Err(ScriptException::error("boom"))
        })))
        .unwrap();
        ctx.add_script(Box::new(FnScript::new("maker", |scope, _| {
            scope.construct("vec3", &[])?;
            Ok(())
        })))
        .unwrap();

        let report = ctx.tick(0.0, TICK_DELTA).unwrap();
        assert_eq!(report.scripts_run, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(&report.errors[0], ScriptingError::ScriptRuntime { script, .. } if script == "thrower"));
        assert_eq!(ctx.registries().vec3.len(), 1);
    }

    #[test]
    fn test_repeated_failure_suspends_script() {
        let config = ScriptingConfig {
            max_consecutive_failures: 2,
            ..ScriptingConfig::default()
        };
        let mut ctx = running(config);
        ctx.add_script(Box::new(FnScript::new("flaky", |_, _| Err(ScriptException::error("again")))))
            .unwrap();

        ctx.tick(0.0, TICK_DELTA).unwrap();
        assert!(!ctx.is_suspended("flaky"));
        ctx.tick(TICK_DELTA, TICK_DELTA).unwrap();
        assert!(ctx.is_suspended("flaky"));
        assert_eq!(ctx.tick(2.0 * TICK_DELTA, TICK_DELTA).unwrap().scripts_run, 0);
    }

    #[test]
    fn test_gc_runs_on_interval() {
        let config = ScriptingConfig {
            gc_interval_ticks: 2,
            ..ScriptingConfig::default()
        };
        let mut ctx = running(config);
        ctx.with_scope(|scope| scope.construct("vec3", &[]).unwrap()).unwrap();

        assert_eq!(ctx.tick(0.0, TICK_DELTA).unwrap().reclaimed, 0);
        assert_eq!(ctx.registries().vec3.len(), 1);
        assert_eq!(ctx.tick(TICK_DELTA, TICK_DELTA).unwrap().reclaimed, 1);
        assert_eq!(ctx.registries().vec3.len(), 0);
    }

    #[test]
    fn test_sync_transforms_pushes_only_changes() {
        let mut ctx = running(ScriptingConfig::deterministic());
        let entity = EntityId::new(3, 0);
        let component = ctx
            .registries_mut()
            .transform_component(entity, Transform::IDENTITY)
            .unwrap();
        component.add_ref().unwrap();

        let mut seen = Vec::new();
        let mut sink = |e: EntityId, t: Transform| seen.push((e, t));
        assert_eq!(ctx.sync_transforms(&mut sink), 1);
        assert_eq!(ctx.sync_transforms(&mut sink), 0);

        let translate = component.read(|c| c.translate().clone()).unwrap();
        translate.write(|v| v.value = Vec3::new(0.0, 2.0, 0.0)).unwrap();
        assert_eq!(ctx.sync_transforms(&mut sink), 1);

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, entity);
        assert_eq!(seen[1].1.translate, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_sync_transforms_skips_component_with_destroyed_member() {
        let mut ctx = running(ScriptingConfig::deterministic());
        let broken = EntityId::new(1, 0);
        let healthy = EntityId::new(2, 0);
        let regs = ctx.registries_mut();
        let broken_component = regs.transform_component(broken, Transform::IDENTITY).unwrap();
        regs.transform_component(healthy, Transform::IDENTITY).unwrap();
        let translate = broken_component.read(|c| c.translate().clone()).unwrap();
        assert!(regs.vec3.destroy(&translate));

        let mut seen = Vec::new();
        let pushed = ctx.sync_transforms(&mut |e: EntityId, _: Transform| seen.push(e));

        assert_eq!(pushed, 1);
        assert_eq!(seen, vec![healthy]);
        assert!(!broken_component.is_deleted());
    }

    #[test]
    fn test_tick_purges_wrappers_reclaimed_by_another_context() {
        let heap = ProxyHeap::new(crate::config::ReclaimPolicy::Collector);
        let config = ScriptingConfig {
            gc_interval_ticks: 0,
            ..ScriptingConfig::default()
        };
        let mut collector = ScriptingContext::builder()
            .config(config.clone())
            .heap(heap.clone())
            .start()
            .unwrap();
        let mut owner = ScriptingContext::builder().config(config).heap(heap).start().unwrap();
        let mut drain = neko_core::FrameDrain::new(owner.render_sync().texts().clone());

        owner
            .with_scope(|scope| scope.construct("text", &["orphan".into()]).unwrap())
            .unwrap();
        owner.tick(0.0, TICK_DELTA).unwrap();
        assert_eq!(drain.drain().created.len(), 1);

        assert_eq!(collector.collect_garbage(), 1);
        assert_eq!(owner.registries().text.len(), 1);

        owner.tick(TICK_DELTA, TICK_DELTA).unwrap();
        assert_eq!(owner.registries().text.len(), 0);
        assert_eq!(drain.drain().destroyed.len(), 1);
    }

    #[test]
    fn test_teardown_invalidates_everything() {
        let mut ctx = running(ScriptingConfig::default());
        let value = ctx
            .with_scope(|scope| {
                let v = scope.construct("text", &["bye".into()]).unwrap();
                scope.retain(&v).unwrap();
                v
            })
            .unwrap();
        let ScriptValue::Object(obj) = value else { panic!("expected object") };
        let handle = ctx.heap().resolve::<crate::objects::Text>(obj.id).unwrap();

        ctx.teardown();
        ctx.teardown();
        assert_eq!(ctx.state(), ContextState::Disposed);
        assert!(handle.is_deleted());
        assert!(ctx.heap().is_empty());
        assert_eq!(ctx.render_sync().texts().stats().pending, 0);
        assert!(ctx.tick(0.0, TICK_DELTA).is_err());
    }
}
