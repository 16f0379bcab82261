//! Named lifecycle events fired by the setup pipeline.

use std::rc::Rc;

use indexmap::IndexMap;

pub const PRE_SETUP: &str = "pre.setup";
pub const POST_SETUP: &str = "post.setup";
pub const PRE_CONFIG: &str = "pre.config";
pub const POST_CONFIG: &str = "post.config";
pub const PRE_CHECK: &str = "pre.check";
pub const POST_CHECK: &str = "post.check";

/// Receives the name of the event that fired.
pub type EventHandler = Rc<dyn Fn(&str)>;

/// Event name -> handlers, in subscription order.
#[derive(Default, Clone)]
pub struct EventBus {
    handlers: IndexMap<String, Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, event: &str, handler: EventHandler) {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Handlers subscribed to an event. Callers run them after releasing
    /// any borrow of the bus, so handlers may subscribe in turn.
    pub fn handlers(&self, event: &str) -> Vec<EventHandler> {
        self.handlers.get(event).cloned().unwrap_or_default()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }
}
