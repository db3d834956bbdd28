//! Mutation batching.
//!
//! The observer listens to every `block.*` event on the bus and queues it,
//! keyed by block and mutation kind, so a burst of edits to one block
//! collapses into its latest event. Each new event restarts the quiet
//! window; when it elapses the queue is flushed as one
//! [`EditorEvent::Changed`] in first-touched order.
//!
//! Raw presentation changes enter through [`ModificationsObserver::dom_changed`],
//! which attributes each record to the block owning its target and lets the
//! block announce the change.

use std::sync::{Arc, Weak};
use std::time::Duration;

use blocksmith_types::{BlockId, MutationKind};
use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::block_manager::BlockManager;
use crate::events::{ChangeCause, EditorEvent, EventBus, HandlerId, MutationEvent, SharedEventBus};
use crate::surface::{RawChange, RawRecord};

const SUBSCRIPTION: &str = "block.>";

#[derive(Debug)]
struct ObserverState {
    enabled: bool,
    queue: IndexMap<(BlockId, MutationKind), MutationEvent>,
    timer: Option<JoinHandle<()>>,
}

impl ObserverState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Batches block mutations into debounced `editor.changed` notifications.
#[derive(Debug)]
pub struct ModificationsObserver {
    state: Arc<Mutex<ObserverState>>,
    bus: Weak<EventBus<EditorEvent>>,
    batch_time: Duration,
    subscription: Option<HandlerId>,
}

impl ModificationsObserver {
    /// Subscribe to `bus`. The observer starts enabled.
    pub fn new(bus: &SharedEventBus, batch_time: Duration) -> Self {
        let state = Arc::new(Mutex::new(ObserverState {
            enabled: true,
            queue: IndexMap::new(),
            timer: None,
        }));
        let weak = Arc::downgrade(bus);

        let handler_state = state.clone();
        let handler_bus = weak.clone();
        let subscription = bus.on(SUBSCRIPTION, move |event| {
            if let EditorEvent::Mutation(mutation) = event {
                enqueue(&handler_state, &handler_bus, batch_time, mutation.clone());
            }
        });

        Self {
            state,
            bus: weak,
            batch_time,
            subscription: Some(subscription),
        }
    }

    pub fn batch_time(&self) -> Duration {
        self.batch_time
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Accept mutations again. Events kept while disabled get a fresh quiet
    /// window.
    pub fn enable(&self) {
        let mut guard = self.state.lock();
        guard.enabled = true;
        if !guard.queue.is_empty() && guard.timer.is_none() {
            schedule(guard, &self.state, &self.bus, self.batch_time);
        }
    }

    /// Ignore mutations until [`enable`](Self::enable). Queued events stay
    /// queued and are not delivered while disabled.
    pub fn disable(&self) {
        self.state.lock().enabled = false;
    }

    /// Drop queued events and cancel the pending flush.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.cancel_timer();
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Flush without waiting for the quiet window.
    pub fn flush_now(&self) {
        self.state.lock().cancel_timer();
        flush(&self.state, &self.bus);
    }

    /// Attribute a raw presentation change to blocks.
    ///
    /// Records whose target is outside every block are discarded. Records for
    /// one block are delivered together, blocks in first-touched order. An
    /// undescribed change is attributed to the current block.
    pub fn dom_changed(&self, manager: &mut BlockManager, change: RawChange) {
        if !self.is_enabled() {
            return;
        }
        match change {
            RawChange::Records(records) => {
                let mut by_block: IndexMap<BlockId, Vec<RawRecord>> = IndexMap::new();
                for record in records {
                    match manager.get_block_by_child_node(record.target) {
                        Some(block) => by_block.entry(block.id().clone()).or_default().push(record),
                        None => tracing::trace!(node = %record.target, "change outside any block"),
                    }
                }
                for (id, records) in by_block {
                    manager.block_did_mutate(&id, ChangeCause::Records(records));
                }
            }
            RawChange::Unknown => {
                let Some(id) = manager.current_block().map(|b| b.id().clone()) else {
                    tracing::debug!("unknown change with no current block");
                    return;
                };
                manager.block_did_mutate(&id, ChangeCause::Unknown);
            }
        }
    }

    /// Unsubscribe and drop pending work.
    pub fn destroy(&mut self) {
        self.clear();
        if let (Some(id), Some(bus)) = (self.subscription.take(), self.bus.upgrade()) {
            bus.off(SUBSCRIPTION, id);
        }
    }
}

impl Drop for ModificationsObserver {
    fn drop(&mut self) {
        self.state.lock().cancel_timer();
    }
}

fn enqueue(
    state: &Arc<Mutex<ObserverState>>,
    bus: &Weak<EventBus<EditorEvent>>,
    batch_time: Duration,
    event: MutationEvent,
) {
    let mut guard = state.lock();
    if !guard.enabled {
        return;
    }
    guard.queue.insert((event.block.id.clone(), event.kind()), event);
    guard.cancel_timer();
    schedule(guard, state, bus, batch_time);
}

/// Start the quiet window, or deliver at once when no runtime is running.
fn schedule(
    mut guard: MutexGuard<'_, ObserverState>,
    state: &Arc<Mutex<ObserverState>>,
    bus: &Weak<EventBus<EditorEvent>>,
    batch_time: Duration,
) {
    match Handle::try_current() {
        Ok(handle) => {
            let state = state.clone();
            let bus = bus.clone();
            guard.timer = Some(handle.spawn(async move {
                tokio::time::sleep(batch_time).await;
                flush(&state, &bus);
            }));
        }
        Err(_) => {
            // Outside a runtime there is no timer; deliver straight away.
            drop(guard);
            flush(state, bus);
        }
    }
}

/// Deliver the queue as one batch. A disabled observer keeps its queue.
fn flush(state: &Mutex<ObserverState>, bus: &Weak<EventBus<EditorEvent>>) {
    let events: Vec<MutationEvent> = {
        let mut guard = state.lock();
        guard.timer = None;
        if !guard.enabled {
            return;
        }
        guard.queue.drain(..).map(|(_, event)| event).collect()
    };
    if events.is_empty() {
        return;
    }
    tracing::debug!(count = events.len(), "flushing block changes");
    if let Some(bus) = bus.upgrade() {
        bus.emit(EditorEvent::Changed(events));
    }
}
