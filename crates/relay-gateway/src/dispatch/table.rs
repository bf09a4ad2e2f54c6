//! Dispatch table
//!
//! An immutable event-name → handler map, declared once through
//! [`DispatchTableBuilder`] before any client starts.

use super::{HandlerError, HandlerResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A decoded DISPATCH event handed to a handler
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Client that received the event
    pub client_id: Arc<str>,
    /// Event name (`t`)
    pub name: String,
    /// Sequence number (`s`)
    pub sequence: Option<u64>,
    /// Event payload (`d`)
    pub data: Value,
}

impl DispatchEvent {
    /// Deserialize the payload into a typed value
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.data)?)
    }
}

/// Boxed future returned by a handler
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Type-erased event handler
pub type EventHandler = Arc<dyn Fn(DispatchEvent) -> HandlerFuture + Send + Sync>;

/// Builder collecting handler registrations
#[derive(Default)]
pub struct DispatchTableBuilder {
    handlers: HashMap<String, EventHandler>,
}

impl DispatchTableBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for an event name
    ///
    /// Registering the same name twice keeps the later handler.
    #[must_use]
    pub fn on<F, Fut>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(DispatchEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let event = event.into();
        let handler: EventHandler = Arc::new(move |ev| handler(ev).boxed());
        if self.handlers.insert(event.clone(), handler).is_some() {
            tracing::warn!(event = %event, "Handler registered twice, keeping the later one");
        }
        self
    }

    /// Freeze the registrations
    #[must_use]
    pub fn build(self) -> DispatchTable {
        DispatchTable {
            handlers: self.handlers,
        }
    }
}

/// Immutable event-name → handler map
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<String, EventHandler>,
}

impl DispatchTable {
    /// Start declaring handlers
    #[must_use]
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::new()
    }

    /// A table with no handlers; every event is dropped
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up the handler for an event name
    #[must_use]
    pub fn get(&self, event: &str) -> Option<&EventHandler> {
        self.handlers.get(event)
    }

    /// Check whether an event name has a handler
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Number of registered events
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check whether no handler is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered event names, sorted
    #[must_use]
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler for `event` on its own task
    ///
    /// Returns `None` when nothing is registered for the event name. Errors and
    /// panics raised by the handler are logged inside the task and go no further.
    pub fn dispatch(&self, event: DispatchEvent) -> Option<JoinHandle<()>> {
        let handler = self.handlers.get(&event.name)?.clone();

        Some(tokio::spawn(async move {
            let client_id = event.client_id.clone();
            let name = event.name.clone();
            let sequence = event.sequence;

            match AssertUnwindSafe(async move { handler(event).await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        client_id = %client_id,
                        event = %name,
                        sequence = ?sequence,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        client_id = %client_id,
                        event = %name,
                        sequence = ?sequence,
                        "Event handler panicked"
                    );
                }
            }
        }))
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("events", &self.event_names())
            .finish()
    }
}
