//! The notification surface of the host runtime and the GC listener on it.
//!
//! The host exposes one [`NotificationEmitter`] per collector through a
//! [`ManagementRuntime`]. [`HostRuntime`] is the in-process implementation:
//! whatever reclaims memory (an arena, an embedded interpreter, an allocator
//! hook) reports each cycle through its [`CollectorEmitter`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde_json::Value;

use crate::decode::decode_gc_notification;
use crate::event::GcEvent;

/// Notification type of a completed garbage collection.
pub const GARBAGE_COLLECTION_NOTIFICATION: &str = "com.sun.management.gc.notification";

/// A notification emitted by the management surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Identifies what kind of notification this is.
    pub notification_type: String,
    /// Name of the emitter.
    pub source: String,
    /// Per-emitter sequence number.
    pub sequence: u64,
    /// Milliseconds since the emitter was created.
    pub timestamp_ms: i64,
    /// Untyped payload.
    pub user_data: Option<Value>,
}

impl Notification {
    /// Creates a notification without payload.
    pub fn new(notification_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            notification_type: notification_type.into(),
            source: source.into(),
            sequence: 0,
            timestamp_ms: 0,
            user_data: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_user_data(mut self, user_data: Value) -> Self {
        self.user_data = Some(user_data);
        self
    }
}

/// Receives notifications from a [`NotificationEmitter`].
///
/// Listeners are invoked on the emitting thread and must return promptly.
pub trait NotificationListener: Send + Sync {
    /// Handles one notification.
    fn handle_notification(&self, notification: &Notification);
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn handle_notification(&self, notification: &Notification) {
        self(notification)
    }
}

/// Something notifications can be subscribed to.
pub trait NotificationEmitter: Send + Sync {
    /// Name of the emitter, e.g. the collector name.
    fn name(&self) -> &str;

    /// Subscribes `listener` for the lifetime of the emitter.
    fn add_notification_listener(&self, listener: Arc<dyn NotificationListener>);
}

/// The management surface of the host runtime.
pub trait ManagementRuntime {
    /// One emitter per garbage collector.
    fn garbage_collectors(&self) -> Vec<Arc<dyn NotificationEmitter>>;
}

/// The emitter of a single collector.
pub struct CollectorEmitter {
    name: String,
    created: Instant,
    sequence: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn NotificationListener>>>,
}

impl CollectorEmitter {
    /// Creates an emitter for the collector `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: Instant::now(),
            sequence: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Delivers `notification` to every listener on the calling thread.
    pub fn emit(&self, notification: &Notification) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.handle_notification(notification);
        }
    }

    /// Reports a completed collection cycle.
    pub fn emit_gc(&self, event: &GcEvent) {
        let notification = Notification {
            notification_type: GARBAGE_COLLECTION_NOTIFICATION.to_owned(),
            source: self.name.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp_ms: i64::try_from(self.created.elapsed().as_millis()).unwrap_or(i64::MAX),
            user_data: Some(event.to_payload()),
        };
        self.emit(&notification);
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl NotificationEmitter for CollectorEmitter {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_notification_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

impl fmt::Debug for CollectorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorEmitter")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// An in-process [`ManagementRuntime`] with a fixed set of collectors.
///
/// ```
/// use runtime_telemetry_gc::{GcEvent, HostRuntime, ManagementRuntime};
///
/// let runtime = HostRuntime::new();
/// let young = runtime.add_collector("Arena Young");
/// assert_eq!(runtime.garbage_collectors().len(), 1);
/// young.emit_gc(&GcEvent::new("Arena Young", 3, 1_000));
/// ```
#[derive(Debug, Default)]
pub struct HostRuntime {
    collectors: RwLock<Vec<Arc<CollectorEmitter>>>,
}

impl HostRuntime {
    /// Creates a runtime without collectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a collector, or returns the existing one with the same name.
    pub fn add_collector(&self, name: &str) -> Arc<CollectorEmitter> {
        let mut collectors = self.collectors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = collectors.iter().find(|c| c.name == name) {
            return existing.clone();
        }
        let emitter = Arc::new(CollectorEmitter::new(name));
        collectors.push(emitter.clone());
        emitter
    }

    /// Looks up a collector by name.
    pub fn collector(&self, name: &str) -> Option<Arc<CollectorEmitter>> {
        self.collectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }
}

impl ManagementRuntime for HostRuntime {
    fn garbage_collectors(&self) -> Vec<Arc<dyn NotificationEmitter>> {
        self.collectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.clone() as Arc<dyn NotificationEmitter>)
            .collect()
    }
}

/// Consumes decoded GC events.
pub trait GcEventHandler: Send + Sync {
    /// Handles one event.
    fn handle_gc_event(&self, event: &GcEvent);
}

/// Filters GC notifications, decodes them and passes them to a handler.
///
/// Nothing raised while handling a notification reaches the emitter: other
/// notification types are ignored, undecodable payloads are logged and
/// dropped, and panics of the handler are caught and logged.
pub struct GcNotificationListener {
    handler: Arc<dyn GcEventHandler>,
}

impl GcNotificationListener {
    /// Creates a listener forwarding to `handler`.
    pub fn new(handler: Arc<dyn GcEventHandler>) -> Self {
        Self { handler }
    }
}

impl NotificationListener for GcNotificationListener {
    fn handle_notification(&self, notification: &Notification) {
        if notification.notification_type != GARBAGE_COLLECTION_NOTIFICATION {
            return;
        }
        let event = match decode_gc_notification(notification) {
            Ok(event) => event,
            Err(err) => {
                log::debug!(
                    "[GcNotificationListener] Dropping notification {} from `{}`: {}",
                    notification.sequence,
                    notification.source,
                    err
                );
                return;
            }
        };
        let rv = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle_gc_event(&event)));
        if let Err(payload) = rv {
            log::error!(
                "[GcNotificationListener] Handler panicked on `{}`: {}",
                event.collector_name,
                panic_message(&*payload)
            );
        }
    }
}

impl fmt::Debug for GcNotificationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcNotificationListener").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}
