//! Builder for [`ScriptingContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use super::ScriptingContext;
use crate::config::ScriptingConfig;
use crate::error::ScriptingResult;
use crate::runtime::{ProxyHeap, ScriptValue};
use crate::script::Script;

/// Collects configuration, scripts and globals before a context exists.
#[derive(Default)]
pub struct ScriptingContextBuilder {
    config: ScriptingConfig,
    scripts: Vec<Box<dyn Script>>,
    globals: BTreeMap<String, ScriptValue>,
    heap: Option<Arc<ProxyHeap>>,
}

impl ScriptingContextBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: ScriptingConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a script; scripts run in the order added.
    #[must_use]
    pub fn script(mut self, script: impl Script + 'static) -> Self {
        self.scripts.push(Box::new(script));
        self
    }

    /// Adds an already boxed script.
    #[must_use]
    pub fn boxed_script(mut self, script: Box<dyn Script>) -> Self {
        self.scripts.push(script);
        self
    }

    /// Installs a global visible to every script.
    #[must_use]
    pub fn global(mut self, name: impl Into<String>, value: impl Into<ScriptValue>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Uses a heap shared with other contexts instead of creating one.
    /// Teardown then demotes this context's proxies instead of clearing the
    /// whole heap.
    #[must_use]
    pub fn heap(mut self, heap: Arc<ProxyHeap>) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Validates the configuration and builds an uninitialized context.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if validation fails.
    pub fn build(self) -> ScriptingResult<ScriptingContext> {
        let config = self.config.validate()?;
        let (heap, owns_heap) = match self.heap {
            Some(heap) => {
                if heap.policy() != config.reclaim_policy {
                    tracing::warn!(
                        heap = ?heap.policy(),
                        config = ?config.reclaim_policy,
                        "shared heap policy overrides configured reclaim policy"
                    );
                }
                (heap, false)
            }
            None => (ProxyHeap::new(config.reclaim_policy), true),
        };
        tracing::debug!(?config, scripts = self.scripts.len(), "building scripting context");
        Ok(ScriptingContext::from_parts(
            config,
            heap,
            owns_heap,
            self.scripts,
            self.globals,
        ))
    }

    /// Builds and initializes in one go.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` from [`Self::build`], `EntryScript` from
    /// [`ScriptingContext::initialize`].
    pub fn start(self) -> ScriptingResult<ScriptingContext> {
        let mut context = self.build()?;
        context.initialize()?;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReclaimPolicy;
    use crate::context::ContextState;
    use crate::error::ScriptingError;
    use crate::runtime::ScriptException;
    use crate::script::FnScript;

    struct FailingSetup;

    impl Script for FailingSetup {
        fn name(&self) -> &str {
            "failing_setup"
        }

        fn initialize(&mut self, scope: &mut crate::bindings::ScriptScope<'_>) -> Result<(), ScriptException> {
            scope.construct("vec3", &[])?;
            Err(ScriptException::type_error("missing asset"))
        }

        fn update(
            &mut self,
            _scope: &mut crate::bindings::ScriptScope<'_>,
            _time: crate::script::TickTime,
        ) -> Result<(), ScriptException> {
            Ok(())
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = ScriptingConfig {
            event_capacity: 0,
            ..ScriptingConfig::default()
        };
        let err = ScriptingContextBuilder::new().config(config).build().unwrap_err();
        assert!(matches!(err, ScriptingError::InvalidConfig(_)));
    }

    #[test]
    fn test_entry_script_failure_disposes() {
        let mut ctx = ScriptingContextBuilder::new().script(FailingSetup).build().unwrap();
        let err = ctx.initialize().unwrap_err();
        assert!(matches!(err, ScriptingError::EntryScript { ref script, .. } if script == "failing_setup"));
        assert_eq!(ctx.state(), ContextState::Disposed);
        assert!(ctx.registries().is_empty());

        let err = ScriptingContextBuilder::new().script(FailingSetup).start().unwrap_err();
        assert!(matches!(err, ScriptingError::EntryScript { .. }));
    }

    #[test]
    fn test_shared_heap_outlives_context() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut ctx = ScriptingContextBuilder::new().heap(heap.clone()).start().unwrap();
        ctx.with_scope(|scope| scope.construct("vec2", &[]).unwrap()).unwrap();
        assert_eq!(heap.len(), 1);

        ctx.teardown();
        assert_eq!(ctx.state(), ContextState::Disposed);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_globals_reach_scripts() {
        let ctx = ScriptingContextBuilder::new()
            .global("level", "forest")
            .script(FnScript::new("reader", |scope, _| {
                match scope.global("level") {
                    Some(ScriptValue::String(level)) if level == "forest" => Ok(()),
                    _ => Err(ScriptException::reference_error("level is not defined")),
                }
            }))
            .start();
        let mut ctx = ctx.unwrap();
        assert!(ctx.tick(0.0, 1.0 / 60.0).unwrap().errors.is_empty());
    }
}
