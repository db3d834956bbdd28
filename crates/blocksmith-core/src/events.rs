//! Event bus for editor notifications.
//!
//! A synchronous publish/subscribe channel. Handlers subscribe with
//! NATS-style subject patterns and are invoked in registration order, on the
//! emitting thread, with a shared reference to the payload.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `block.*` matches `block.added` but not `block.text.edited`
//! - `>` matches one or more tokens (only at end): `block.>` matches
//!   `block.added` and `block.text.edited`
//! - Exact match: `block.added` only matches `block.added`
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::<EditorEvent>::new();
//! let id = bus.on("block.*", |event| println!("{}", event.subject()));
//! bus.emit(EditorEvent::ReadOnlyToggled(true));
//! bus.off("block.*", id);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use blocksmith_types::{BlockId, MutationKind};
use parking_lot::Mutex;

use crate::surface::RawRecord;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// Patterns use NATS-style wildcards:
/// - `*` matches exactly one token
/// - `>` matches one or more tokens (only at end)
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            ">" => {
                // `>` must be at the end and matches one or more remaining tokens
                return pi == pattern_tokens.len() - 1;
            }
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

// ============================================================================
// Bus
// ============================================================================

/// Trait for payloads that know their subject.
pub trait HasSubject {
    /// Get the subject string for this payload.
    fn subject(&self) -> &str;
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registration<T> {
    id: HandlerId,
    pattern: String,
    once: bool,
    handler: Handler<T>,
}

struct BusState<T> {
    next_id: u64,
    registrations: Vec<Registration<T>>,
}

/// Outcome of one [`EventBus::emit`] call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmitReport {
    /// Handlers invoked.
    pub delivered: usize,
    /// Panic messages from handlers that failed. Later handlers still ran.
    pub failures: Vec<String>,
}

/// Synchronous, pattern-filtered event bus.
pub struct EventBus<T> {
    state: Mutex<BusState<T>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                next_id: 0,
                registrations: Vec::new(),
            }),
        }
    }

    fn register(&self, pattern: &str, once: bool, handler: Handler<T>) -> HandlerId {
        let mut state = self.state.lock();
        let id = HandlerId(state.next_id);
        state.next_id += 1;
        state.registrations.push(Registration {
            id,
            pattern: pattern.to_string(),
            once,
            handler,
        });
        id
    }

    /// Subscribe a handler to subjects matching `pattern`.
    pub fn on(&self, pattern: &str, handler: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        self.register(pattern, false, Arc::new(handler))
    }

    /// Subscribe a handler that is removed after its first invocation.
    pub fn once(&self, pattern: &str, handler: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        self.register(pattern, true, Arc::new(handler))
    }

    /// Remove a handler. Returns false if it was not registered under `pattern`.
    pub fn off(&self, pattern: &str, id: HandlerId) -> bool {
        let mut state = self.state.lock();
        let before = state.registrations.len();
        state
            .registrations
            .retain(|r| !(r.id == id && r.pattern == pattern));
        state.registrations.len() != before
    }

    /// Drop every registration.
    pub fn destroy(&self) {
        self.state.lock().registrations.clear();
    }

    /// Number of live registrations.
    pub fn handler_count(&self) -> usize {
        self.state.lock().registrations.len()
    }
}

impl<T: HasSubject> EventBus<T> {
    /// Deliver `payload` to every handler whose pattern matches its subject.
    ///
    /// Handlers run synchronously in registration order. The handler list is
    /// snapshotted first, so handlers may subscribe or unsubscribe freely;
    /// changes apply to the next emit. A panicking handler is logged and
    /// reported, and the remaining handlers still run.
    pub fn emit(&self, payload: T) -> EmitReport {
        let subject = payload.subject().to_string();
        let handlers: Vec<Handler<T>> = {
            let mut state = self.state.lock();
            let mut matched = Vec::new();
            state.registrations.retain(|r| {
                if !matches_pattern(&r.pattern, &subject) {
                    return true;
                }
                matched.push(r.handler.clone());
                !r.once
            });
            matched
        };

        let mut report = EmitReport::default();
        for handler in handlers {
            report.delivered += 1;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&payload))) {
                let message = panic_message(panic.as_ref());
                tracing::error!(subject = %subject, error = %message, "event handler panicked");
                report.failures.push(message);
            }
        }
        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Editor Events
// ============================================================================

/// Lightweight reference to a block carried by events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub id: BlockId,
    pub tool: String,
}

/// Why a block was reported as changed.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeCause {
    /// Raw presentation records attributed to the block.
    Records(Vec<RawRecord>),
    /// The watcher reported a change it could not describe.
    Unknown,
    /// The tool asked for a notification via `dispatch_change`.
    Manual,
    /// The block was rebuilt or merged through a manager command.
    Content,
}

/// Kind-specific detail of a mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationDetail {
    Added { index: usize },
    Removed { index: usize },
    Moved { from: usize, to: usize },
    Changed { index: Option<usize>, cause: ChangeCause },
}

/// A semantic mutation of the block sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationEvent {
    pub block: BlockRef,
    pub detail: MutationDetail,
}

impl MutationEvent {
    pub fn kind(&self) -> MutationKind {
        match self.detail {
            MutationDetail::Added { .. } => MutationKind::Added,
            MutationDetail::Removed { .. } => MutationKind::Removed,
            MutationDetail::Moved { .. } => MutationKind::Moved,
            MutationDetail::Changed { .. } => MutationKind::Changed,
        }
    }

    pub fn added(block: BlockRef, index: usize) -> Self {
        Self {
            block,
            detail: MutationDetail::Added { index },
        }
    }

    pub fn removed(block: BlockRef, index: usize) -> Self {
        Self {
            block,
            detail: MutationDetail::Removed { index },
        }
    }

    pub fn moved(block: BlockRef, from: usize, to: usize) -> Self {
        Self {
            block,
            detail: MutationDetail::Moved { from, to },
        }
    }

    pub fn changed(block: BlockRef, index: Option<usize>, cause: ChangeCause) -> Self {
        Self {
            block,
            detail: MutationDetail::Changed { index, cause },
        }
    }
}

/// Everything published on the editor bus.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    /// A single block mutation, published as it happens.
    Mutation(MutationEvent),
    /// A coalesced batch flushed by the observer.
    Changed(Vec<MutationEvent>),
    /// A tool was moved to the unavailable set.
    ToolPreparationFailed { tool: String, reason: String },
    /// Read-only mode switched.
    ReadOnlyToggled(bool),
    /// The editor is being torn down.
    Destroyed,
}

impl HasSubject for EditorEvent {
    fn subject(&self) -> &str {
        match self {
            EditorEvent::Mutation(event) => event.kind().subject(),
            EditorEvent::Changed(_) => "editor.changed",
            EditorEvent::ToolPreparationFailed { .. } => "tools.prepare_failed",
            EditorEvent::ReadOnlyToggled(_) => "editor.read_only",
            EditorEvent::Destroyed => "editor.destroyed",
        }
    }
}

/// Shared editor bus.
pub type SharedEventBus = Arc<EventBus<EditorEvent>>;

/// Create a shared editor bus.
pub fn shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
