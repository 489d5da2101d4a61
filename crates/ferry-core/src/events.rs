//! Fan-out of progress/completion events to subscribers.
//!
//! Subscribers register callbacks with [`Dispatcher::subscribe`]; events are
//! delivered on a dedicated worker thread so a slow or panicking subscriber
//! never blocks the transfer path. Per the ownership note in the design:
//! the dispatcher holds the strong list of subscribers, the controller holds
//! only a `Dispatcher` handle, never the reverse, so there is no cycle to
//! break.

use crate::controller::State;
use crate::types::TransferId;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Events emitted by a [`crate::controller::TransferController`].
#[derive(Debug, Clone)]
pub enum Event {
    /// Throttled progress update.
    Progress {
        /// Transfer this event belongs to.
        id: TransferId,
        /// Bytes written so far.
        bytes_written: u64,
        /// Total bytes expected.
        total_bytes: u64,
    },
    /// The transfer finished successfully.
    TransferComplete {
        /// Transfer this event belongs to.
        id: TransferId,
    },
    /// The transfer failed with an unrecoverable error.
    TransferFailed {
        /// Transfer this event belongs to.
        id: TransferId,
        /// Human-readable failure description.
        message: String,
    },
    /// The controller's lifecycle state changed.
    StateChanged {
        /// Transfer this event belongs to.
        id: TransferId,
        /// The state just entered.
        state: State,
    },
}

type Subscriber = Box<dyn Fn(Event) + Send + 'static>;

enum WorkerMessage {
    Event(Event),
    Shutdown,
}

/// Multi-producer, fan-out event dispatcher.
///
/// Cloning a `Dispatcher` is cheap and shares the same worker thread and
/// subscriber list; the worker thread is joined when the last clone drops.
pub struct Dispatcher {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    tx: Sender<WorkerMessage>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            tx: self.tx.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Start a dispatcher with its own worker thread.
    #[must_use]
    pub fn new() -> Self {
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel::<WorkerMessage>();

        let worker_subscribers = Arc::clone(&subscribers);
        let handle = std::thread::Builder::new()
            .name("ferry-event-dispatch".into())
            .spawn(move || {
                for msg in rx {
                    let event = match msg {
                        WorkerMessage::Event(event) => event,
                        WorkerMessage::Shutdown => break,
                    };
                    let subs = worker_subscribers
                        .lock()
                        .expect("subscriber list mutex poisoned");
                    for sub in subs.iter() {
                        let event = event.clone();
                        let outcome =
                            panic::catch_unwind(AssertUnwindSafe(|| sub(event)));
                        if let Err(panic) = outcome {
                            let msg = panic
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "subscriber panicked".into());
                            tracing::warn!("event subscriber panicked: {msg}");
                        }
                    }
                }
            })
            .expect("failed to spawn event dispatch worker");

        Self {
            subscribers,
            tx,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Register a callback invoked for every subsequently emitted event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(Event) + Send + 'static,
    {
        self.subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .push(Box::new(callback));
    }

    /// Fire-and-forget an event to every current subscriber.
    ///
    /// If the worker has already shut down, the event is silently dropped —
    /// callers on the transfer path must never block waiting for delivery.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(WorkerMessage::Event(event));
    }

    /// Signal the worker thread to stop after draining pending events, and
    /// wait for it to exit. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.worker.lock().expect("worker mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}
