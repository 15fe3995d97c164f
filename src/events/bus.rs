use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, Handler<T>)>>,
}

impl<T> Registry<T> {
    fn remove(&mut self, topic: &str, id: u64) {
        if let Some(handlers) = self.topics.get_mut(topic) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            if handlers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Topic-keyed publish/subscribe registry
///
/// Delivery is synchronous and follows registration order. `publish` works on a
/// snapshot of the handlers registered when it is called, so handlers may
/// subscribe or unsubscribe (themselves or others) while being dispatched.
/// Events published to a topic with no subscribers are dropped.
pub struct EventBus<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                topics: HashMap::new(),
            })),
        }
    }

    /// Register `handler` for `topic`
    ///
    /// The handler stays registered until `Subscription::unsubscribe` is called;
    /// dropping the handle does not unsubscribe.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .topics
                .entry(topic.clone())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        let remove_topic = topic.clone();
        Subscription {
            topic,
            cancel: Mutex::new(Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).remove(&remove_topic, id);
                }
            }))),
        }
    }

    /// Deliver `event` to every handler registered for `topic`
    ///
    /// Returns the number of handlers the event was delivered to.
    pub fn publish(&self, topic: &str, event: &T) -> usize {
        let snapshot: Vec<Handler<T>> = lock(&self.registry)
            .topics
            .get(topic)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &snapshot {
            handler(event);
        }

        snapshot.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.registry)
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the registry
impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Handle to a registered handler
pub struct Subscription {
    topic: String,
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the handler from the bus. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}
