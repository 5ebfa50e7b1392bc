//! Hook registry: handlers stored per event, ordered by priority.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use loom_core::AppResult;

use super::definitions::HookPayload;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles one dispatch of an event. Returning an error marks this
    /// handler as failed; whether dispatch continues depends on the event.
    async fn handle(&self, payload: &mut HookPayload) -> AppResult<()>;
}

/// Identifier of a single handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

/// Entry in the hook registry.
#[derive(Debug)]
pub struct HookEntry {
    id: HookId,
    event: String,
    plugin: String,
    priority: i32,
    handler: Arc<dyn HookHandler>,
    /// Flipped off on removal so in-flight snapshots skip the handler.
    live: AtomicBool,
}

impl HookEntry {
    /// Registration id.
    pub fn id(&self) -> HookId {
        self.id
    }

    /// Event this handler listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Plugin that registered the handler.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Priority (lower runs first).
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The handler itself.
    pub fn handler(&self) -> &Arc<dyn HookHandler> {
        &self.handler
    }

    /// Whether the registration is still present.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Registry of hook handlers organized by event name.
#[derive(Debug)]
pub struct HookRegistry {
    /// Event → handlers sorted by (priority, registration order).
    handlers: RwLock<HashMap<String, Vec<Arc<HookEntry>>>>,
    next_id: AtomicU64,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler for an event.
    pub async fn register(
        &self,
        event: &str,
        plugin: &str,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) -> HookId {
        let mut handlers = self.handlers.write().await;
        let id = self.insert(&mut handlers, event, plugin, priority, handler);

        info!(
            event = %event,
            plugin = %plugin,
            priority = priority,
            "Hook handler registered"
        );

        id
    }

    /// Registers a batch of handlers for one plugin under a single write lock,
    /// so no `emit` observes half of a plugin's subscriptions.
    pub async fn register_plugin<I>(&self, plugin: &str, registrations: I) -> Vec<HookId>
    where
        I: IntoIterator<Item = (String, i32, Arc<dyn HookHandler>)>,
    {
        let mut handlers = self.handlers.write().await;
        let ids: Vec<HookId> = registrations
            .into_iter()
            .map(|(event, priority, handler)| {
                self.insert(&mut handlers, &event, plugin, priority, handler)
            })
            .collect();

        if !ids.is_empty() {
            info!(plugin = %plugin, count = ids.len(), "Plugin hook handlers registered");
        }

        ids
    }

    fn insert(
        &self,
        handlers: &mut HashMap<String, Vec<Arc<HookEntry>>>,
        event: &str,
        plugin: &str,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entries = handlers.entry(event.to_string()).or_default();

        entries.push(Arc::new(HookEntry {
            id,
            event: event.to_string(),
            plugin: plugin.to_string(),
            priority,
            handler,
            live: AtomicBool::new(true),
        }));

        // Ids grow monotonically, so ties keep registration order.
        entries.sort_by_key(|e| (e.priority, e.id));
        id
    }

    /// Removes a single registration. Returns whether it existed.
    pub async fn unregister(&self, id: HookId) -> bool {
        let mut handlers = self.handlers.write().await;
        let mut removed = false;

        for entries in handlers.values_mut() {
            entries.retain(|e| {
                if e.id == id {
                    e.live.store(false, Ordering::Release);
                    removed = true;
                    false
                } else {
                    true
                }
            });
        }
        handlers.retain(|_, entries| !entries.is_empty());

        removed
    }

    /// Unregisters all handlers of a plugin. Returns how many were removed.
    pub async fn unregister_plugin(&self, plugin: &str) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;

        for entries in handlers.values_mut() {
            entries.retain(|e| {
                if e.plugin == plugin {
                    e.live.store(false, Ordering::Release);
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }

        // Remove empty event entries
        handlers.retain(|_, entries| !entries.is_empty());

        debug!(plugin = %plugin, removed = removed, "Hook handlers unregistered for plugin");
        removed
    }

    /// Returns a snapshot of the handlers for an event, in dispatch order.
    pub async fn snapshot(&self, event: &str) -> Vec<Arc<HookEntry>> {
        let handlers = self.handlers.read().await;
        handlers.get(event).cloned().unwrap_or_default()
    }

    /// Returns the number of handlers registered for an event.
    pub async fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(event).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns the total number of registered handlers.
    pub async fn total_count(&self) -> usize {
        let handlers = self.handlers.read().await;
        handlers.values().map(|entries| entries.len()).sum()
    }

    /// Returns all events with at least one handler, sorted.
    pub async fn registered_events(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut events: Vec<String> = handlers.keys().cloned().collect();
        events.sort();
        events
    }

    /// Returns `(event, priority)` for every handler a plugin owns.
    pub async fn plugin_hooks(&self, plugin: &str) -> Vec<(String, i32)> {
        let handlers = self.handlers.read().await;
        let mut owned: Vec<(String, i32)> = handlers
            .values()
            .flatten()
            .filter(|e| e.plugin == plugin)
            .map(|e| (e.event.clone(), e.priority))
            .collect();
        owned.sort();
        owned
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
