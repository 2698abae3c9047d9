//! Registry with at most one live wrapper per native key.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use neko_core::RenderSyncChannel;

use super::{manufacture, require_class, Registry};
use crate::error::{ScriptingError, ScriptingResult};
use crate::runtime::{ClassId, ClassTemplate, ProxyHeap};
use crate::wrapped::{Handle, Payload};

/// Keyed registry: creating under an existing key hands back the wrapper
/// that is already there.
pub struct KeyedObjectRegistry<K, T: Payload> {
    heap: Arc<ProxyHeap>,
    class: Option<ClassId>,
    items: BTreeMap<K, Handle<T>>,
    render_sync: Option<Arc<RenderSyncChannel<Handle<T>>>>,
}

impl<K, T> KeyedObjectRegistry<K, T>
where
    K: Ord + Copy + Debug + Send,
    T: Payload,
{
    /// Registry without render announcements.
    #[must_use]
    pub fn new(heap: Arc<ProxyHeap>) -> Self {
        Self {
            heap,
            class: None,
            items: BTreeMap::new(),
            render_sync: None,
        }
    }

    /// Registry that announces creation and destruction to the renderer.
    #[must_use]
    pub fn with_render_sync(heap: Arc<ProxyHeap>, channel: Arc<RenderSyncChannel<Handle<T>>>) -> Self {
        Self {
            render_sync: Some(channel),
            ..Self::new(heap)
        }
    }

    /// Returns the live wrapper for `key`, or builds one with `make`.
    ///
    /// `make` only runs when no live wrapper exists, so payloads that pull
    /// in other wrappers are not built twice. A finalized wrapper still
    /// sitting under the key is purged and replaced.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` before `initialize`, or whatever `make` returns.
    pub fn get_or_create_with(
        &mut self,
        key: K,
        make: impl FnOnce() -> ScriptingResult<T>,
    ) -> ScriptingResult<Handle<T>> {
        let class = require_class::<T>(self.class)?;
        if let Some(existing) = self.items.get(&key) {
            if !existing.is_deleted() {
                tracing::trace!(class = %T::KIND, key = ?key, "keyed create returned existing wrapper");
                return Ok(existing.clone());
            }
        }
        if let Some(dead) = self.items.remove(&key) {
            self.announce_destroyed(dead);
        }

        let handle = manufacture(&self.heap, class, make()?);
        self.items.insert(key, handle.clone());
        if let Some(channel) = &self.render_sync {
            channel.constructed(handle.clone());
        }
        Ok(handle)
    }

    /// Wraps a payload built on the script side under `key`. If `key` is
    /// taken, `payload` is dropped and the existing wrapper returned.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` before `initialize`.
    pub fn create_from_script(&mut self, key: K, payload: T) -> ScriptingResult<Handle<T>> {
        self.get_or_create_with(key, || Ok(payload))
    }

    /// Wraps native data under `key`. If `key` is taken, `native` is dropped
    /// and the existing wrapper returned.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` before `initialize`.
    pub fn create_from<N>(&mut self, key: K, native: N) -> ScriptingResult<Handle<T>>
    where
        T: From<N>,
    {
        self.get_or_create_with(key, || Ok(T::from(native)))
    }

    /// Places an existing wrapper under `key` without announcing it again.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::DuplicateKey`] if a live wrapper holds the key,
    /// [`ScriptingError::DanglingReference`] if `handle` is deleted.
    pub fn insert(&mut self, key: K, handle: Handle<T>) -> ScriptingResult<()> {
        if self.items.get(&key).is_some_and(|h| !h.is_deleted()) {
            return Err(ScriptingError::DuplicateKey {
                class: T::KIND.script_name(),
                key: format!("{key:?}"),
            });
        }
        if handle.is_deleted() {
            return Err(ScriptingError::DanglingReference {
                class: T::KIND.script_name(),
                id: handle.id(),
                operation: "insert",
            });
        }
        if let Some(dead) = self.items.insert(key, handle) {
            self.announce_destroyed(dead);
        }
        Ok(())
    }

    /// Live wrapper under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&Handle<T>> {
        self.items.get(key).filter(|h| !h.is_deleted())
    }

    /// Whether a live wrapper holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Destroys the wrapper under `key` and announces it.
    pub fn destroy(&mut self, key: &K) -> Option<Handle<T>> {
        let handle = self.items.remove(key)?;
        handle.destroy();
        if let Some(channel) = &self.render_sync {
            channel.destructed(handle.clone());
        }
        Some(handle)
    }

    /// Destroys a wrapper by identity. False if it is not registered.
    pub fn destroy_handle(&mut self, handle: &Handle<T>) -> bool {
        let key = self
            .items
            .iter()
            .find(|(_, h)| Arc::ptr_eq(h, handle))
            .map(|(key, _)| *key);
        match key {
            Some(key) => self.destroy(&key).is_some(),
            None => false,
        }
    }

    /// Key of a registered wrapper.
    #[must_use]
    pub fn key_of(&self, handle: &Handle<T>) -> Option<K> {
        self.items
            .iter()
            .find(|(_, h)| Arc::ptr_eq(h, handle))
            .map(|(key, _)| *key)
    }

    /// Every entry in key order, including finalized ones not yet purged.
    #[must_use]
    pub fn items(&self) -> &BTreeMap<K, Handle<T>> {
        &self.items
    }

    fn announce_destroyed(&self, handle: Handle<T>) {
        if let Some(channel) = &self.render_sync {
            channel.destructed(handle);
        }
    }
}

impl<K, T> Registry for KeyedObjectRegistry<K, T>
where
    K: Ord + Copy + Debug + Send,
    T: Payload,
{
    fn class_name(&self) -> &'static str {
        T::KIND.script_name()
    }

    fn initialize(&mut self) -> ClassId {
        if let Some(class) = self.class {
            return class;
        }
        let class = self.heap.register_template(ClassTemplate::of::<T>());
        self.class = Some(class);
        class
    }

    fn is_initialized(&self) -> bool {
        self.class.is_some()
    }

    fn purge(&mut self) -> usize {
        let dead: Vec<K> = self
            .items
            .iter()
            .filter(|(_, h)| h.is_deleted())
            .map(|(key, _)| *key)
            .collect();
        for key in &dead {
            if let Some(handle) = self.items.remove(key) {
                self.announce_destroyed(handle);
            }
        }
        if !dead.is_empty() {
            tracing::debug!(class = T::KIND.script_name(), purged = dead.len(), "registry purged");
        }
        dead.len()
    }

    fn clear(&mut self) -> usize {
        let count = self.items.len();
        for handle in std::mem::take(&mut self.items).into_values() {
            handle.destroy();
        }
        count
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
