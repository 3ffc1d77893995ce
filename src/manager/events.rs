//! The Context Manager's named event bus. Handlers run synchronously, in
//! registration order, on the thread that triggered the emission.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::compression::PipelineOutcome;
use crate::context::Checkpoint;

#[derive(Debug, Clone)]
pub enum Event {
    MemoryWarning { usage: f64 },
    ContextWarningLow { usage: f64 },
    Summarizing,
    Compressed { checkpoint: Checkpoint },
    AutoSummaryCreated { checkpoint: Checkpoint },
    AutoSummaryFailed { error: String },
    SessionSaved,
    ActiveToolsUpdated { tool_names: Vec<String> },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::MemoryWarning { .. } => "memory-warning",
            Event::ContextWarningLow { .. } => "context-warning-low",
            Event::Summarizing => "summarizing",
            Event::Compressed { .. } => "compressed",
            Event::AutoSummaryCreated { .. } => "auto-summary-created",
            Event::AutoSummaryFailed { .. } => "auto-summary-failed",
            Event::SessionSaved => "session_saved",
            Event::ActiveToolsUpdated { .. } => "active-tools-updated",
        }
    }

    pub(super) fn from_pipeline_outcome(outcome: &PipelineOutcome) -> Event {
        match (&outcome.checkpoint, &outcome.error) {
            (Some(checkpoint), _) => Event::AutoSummaryCreated {
                checkpoint: checkpoint.clone(),
            },
            (None, Some(error)) => Event::AutoSummaryFailed { error: error.clone() },
            (None, None) => Event::AutoSummaryFailed {
                error: outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unknown compression failure".to_string()),
            },
        }
    }
}

pub type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// Per-name listener registry. `on`/`off` are keyed by name (not type) to
/// mirror the idiom of the external event bus this facade replaces.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicUsize,
    handlers: RwLock<Vec<(usize, String, Handler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`. Returns a subscription id usable
    /// with [`EventBus::off`], stable across any number of intervening
    /// `off` calls on other handlers.
    pub fn on(&self, name: &str, handler: Handler) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.handlers.write().expect("event bus lock poisoned");
        handlers.push((id, name.to_string(), handler));
        id
    }

    pub fn off(&self, id: usize) {
        let mut handlers = self.handlers.write().expect("event bus lock poisoned");
        handlers.retain(|(handler_id, _, _)| *handler_id != id);
    }

    pub fn emit(&self, event: Event) {
        let handlers = self.handlers.read().expect("event bus lock poisoned");
        for (_, name, handler) in handlers.iter() {
            if name == event.name() {
                handler(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn handlers_fire_in_registration_order_for_matching_name_only() {
        let bus = EventBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.on("memory-warning", Box::new(move |_| o1.lock().unwrap().push(1)));
        let o2 = order.clone();
        bus.on("memory-warning", Box::new(move |_| o2.lock().unwrap().push(2)));
        let o3 = order.clone();
        bus.on("summarizing", Box::new(move |_| o3.lock().unwrap().push(3)));

        bus.emit(Event::MemoryWarning { usage: 0.9 });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn off_removes_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = bus.on("summarizing", Box::new(move |_| { c.fetch_add(1, Ordering::SeqCst); }));
        bus.emit(Event::Summarizing);
        bus.off(id);
        bus.emit(Event::Summarizing);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_by_id_unaffected_by_other_unsubscriptions() {
        let bus = EventBus::new();
        let fired = Arc::new(std::sync::Mutex::new(Vec::new()));

        let f1 = fired.clone();
        let id1 = bus.on("summarizing", Box::new(move |_| f1.lock().unwrap().push(1)));
        let f2 = fired.clone();
        let id2 = bus.on("summarizing", Box::new(move |_| f2.lock().unwrap().push(2)));
        let f3 = fired.clone();
        let id3 = bus.on("summarizing", Box::new(move |_| f3.lock().unwrap().push(3)));

        // Remove the first subscription; id2 and id3 must still refer to
        // their own handlers, not to whatever now sits at their old index.
        bus.off(id1);
        bus.emit(Event::Summarizing);
        assert_eq!(*fired.lock().unwrap(), vec![2, 3]);

        fired.lock().unwrap().clear();
        bus.off(id3);
        bus.emit(Event::Summarizing);
        assert_eq!(*fired.lock().unwrap(), vec![2]);

        let _ = id2;
    }
}
