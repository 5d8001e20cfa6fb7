use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An observability event emitted by one of the infrastructure components.
pub trait InfraEvent: Send + Sync + fmt::Debug {
    /// Short kind tag, e.g. `"state_transition"` or `"key_rotated"`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// Name of the component instance that emitted it.
    fn source(&self) -> &str;
}

/// Receives events from one component.
pub trait EventListener<E: InfraEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A set of listeners attached to one component instance.
///
/// `emit` isolates panics: a misbehaving listener never prevents the
/// remaining listeners from running, and never unwinds into the component.
#[derive(Clone)]
pub struct EventListeners<E: InfraEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: InfraEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    source = event.source(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E: InfraEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter turning a closure into an [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: InfraEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
