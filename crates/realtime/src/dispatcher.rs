//! Inbound event routing
//!
//! Each envelope goes to at most one type handler for its tag, then to every
//! ad-hoc listener registered for that tag, in registration order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use helpdesk_shared::EventTag;
use parking_lot::RwLock;

use crate::error::{RealtimeError, RealtimeResult};
use crate::handlers::TypeHandlers;
use crate::message::{normalize_inbound, Envelope};

/// Callback invoked with a dispatched envelope
///
/// Keep the returned `Arc` from [`EventDispatcher::register_handler`] to
/// unregister it later.
pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Default)]
struct Registry {
    type_handlers: HashMap<EventTag, Listener>,
    listeners: HashMap<EventTag, Vec<Listener>>,
    type_handlers_registered: bool,
}

/// Routes inbound envelopes to type handlers and listeners
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<RwLock<Registry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an envelope received from the wire and route it
    pub fn dispatch(&self, mut envelope: Envelope) {
        envelope.payload = normalize_inbound(envelope.payload);
        self.dispatch_local(&envelope);
    }

    /// Route an envelope whose payload is already in application casing
    ///
    /// Handlers see a snapshot of the registry taken before the first call, so
    /// (un)registering during dispatch only affects later envelopes.
    pub fn dispatch_local(&self, envelope: &Envelope) {
        let (type_handler, listeners) = {
            let registry = self.registry.read();
            (
                registry.type_handlers.get(&envelope.event).cloned(),
                registry
                    .listeners
                    .get(&envelope.event)
                    .cloned()
                    .unwrap_or_default(),
            )
        };

        if type_handler.is_none() && listeners.is_empty() {
            if envelope.event.is_known() {
                tracing::trace!(event = %envelope.event, "No consumers for event");
            } else {
                tracing::debug!(event = %envelope.event, "Ignoring unknown event");
            }
            return;
        }

        if let Some(handler) = type_handler {
            invoke(&handler, envelope, "type handler");
        }
        for listener in &listeners {
            invoke(listener, envelope, "listener");
        }
    }

    /// Add a listener for `event`; returns the handle to unregister it with
    pub fn register_handler(
        &self,
        event: EventTag,
        listener: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Listener {
        let listener: Listener = Arc::new(listener);
        self.add_listener(event, Arc::clone(&listener));
        listener
    }

    /// Add an existing listener handle for `event`
    pub fn add_listener(&self, event: EventTag, listener: Listener) {
        let mut registry = self.registry.write();
        let listeners = registry.listeners.entry(event.clone()).or_default();
        listeners.push(listener);
        tracing::debug!(event = %event, listeners = listeners.len(), "Registered listener");
    }

    /// Remove a listener; returns false if it was not registered for `event`
    pub fn unregister_handler(&self, event: &EventTag, listener: &Listener) -> bool {
        let mut registry = self.registry.write();
        let Some(listeners) = registry.listeners.get_mut(event) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        let removed = listeners.len() < before;
        if listeners.is_empty() {
            registry.listeners.remove(event);
        }

        if removed {
            tracing::debug!(event = %event, "Unregistered listener");
        }
        removed
    }

    /// Install the fixed type-handler table; only once until [`Self::clear_handlers`]
    pub fn register_type_handlers(&self, handlers: TypeHandlers) -> RealtimeResult<()> {
        let mut registry = self.registry.write();
        if registry.type_handlers_registered {
            return Err(RealtimeError::HandlersAlreadyRegistered);
        }

        registry.type_handlers = handlers.into_map();
        registry.type_handlers_registered = true;
        tracing::debug!(count = registry.type_handlers.len(), "Registered type handlers");
        Ok(())
    }

    /// Remove every type handler and listener
    pub fn clear_handlers(&self) {
        let mut registry = self.registry.write();
        registry.type_handlers.clear();
        registry.listeners.clear();
        registry.type_handlers_registered = false;
    }

    pub fn listener_count(&self, event: &EventTag) -> usize {
        self.registry
            .read()
            .listeners
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn invoke(callback: &Listener, envelope: &Envelope, kind: &'static str) {
    if catch_unwind(AssertUnwindSafe(|| callback(envelope))).is_err() {
        tracing::error!(event = %envelope.event, kind, "Event consumer panicked");
    }
}
