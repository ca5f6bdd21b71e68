//! Capture `tracing` events for assertions.
//!
//! Installs a thread-local recording subscriber, so it suits the
//! current-thread runtime `#[tokio::test]` uses by default.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{
    Event,
    Level,
    Metadata,
    Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::DefaultGuard,
};

/// One captured event.
#[derive(Clone, Debug)]
pub struct RecordedEvent {
    level: Level,
    target: String,
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl RecordedEvent {
    /// Event level.
    #[must_use]
    pub const fn level(&self) -> Level { self.level }

    /// Event target.
    #[must_use]
    pub fn target(&self) -> &str { &self.target }

    /// A captured field rendered as text.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> { self.fields.get(name).map(String::as_str) }

    /// The event message, if present.
    #[must_use]
    pub fn message(&self) -> Option<&str> { self.message.as_deref() }
}

#[derive(Default)]
struct FieldRecorder {
    fields: HashMap<String, String>,
    message: Option<String>,
}

impl FieldRecorder {
    fn record_value(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldRecorder {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_owned());
    }
}

type EventLog = Arc<Mutex<Vec<RecordedEvent>>>;

fn lock(events: &EventLog) -> MutexGuard<'_, Vec<RecordedEvent>> {
    match events.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
struct RecordingSubscriber {
    events: EventLog,
}

impl Subscriber for RecordingSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool { true }

    fn new_span(&self, _attrs: &Attributes<'_>) -> Id { Id::from_u64(1) }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut recorder = FieldRecorder::default();
        event.record(&mut recorder);
        lock(&self.events).push(RecordedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_owned(),
            fields: recorder.fields,
            message: recorder.message,
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Events recorded while the capture is alive.
pub struct CapturedEvents {
    events: EventLog,
    _guard: DefaultGuard,
}

impl CapturedEvents {
    /// Snapshot of every event recorded so far.
    #[must_use]
    pub fn all(&self) -> Vec<RecordedEvent> { lock(&self.events).clone() }

    /// Events recorded at `target`.
    #[must_use]
    pub fn with_target(&self, target: &str) -> Vec<RecordedEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| event.target() == target)
            .cloned()
            .collect()
    }
}

/// Record events on the current thread until the result is dropped.
#[must_use]
pub fn capture_events() -> CapturedEvents {
    let subscriber = RecordingSubscriber::default();
    let events = Arc::clone(&subscriber.events);
    let guard = tracing::subscriber::set_default(subscriber);
    CapturedEvents {
        events,
        _guard: guard,
    }
}
