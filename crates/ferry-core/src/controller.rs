//! Per-transfer lifecycle state machine.
//!
//! ```text
//!         start            pause         resume
//! idle ─────────▶ active ◀──────▶ paused ─────┐
//!                   │ │                        │
//!         complete  │ │ cancel                 │
//!                   ▼ ▼                        │
//!              completed  cancelled ◀──────────┘
//!                   │
//!              failure from any non-terminal state => failed
//! ```

use crate::error::{Error, Result};
use crate::events::{Dispatcher, Event};
use crate::types::TransferId;
use std::sync::Mutex;

/// Lifecycle state of one transfer, on one side (sender or receiver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No transfer has been started yet.
    Idle,
    /// Actively sending/receiving chunks.
    Active,
    /// Paused; chunks are not being processed.
    Paused,
    /// Finished successfully.
    Completed,
    /// Cancelled by the caller.
    Cancelled,
    /// Failed with an unrecoverable error.
    Failed,
}

impl State {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Cancelled | State::Failed)
    }
}

/// One instance per transfer, on each side. Drives the splitter (sender) or
/// assembler (receiver) and mediates the client-visible API.
pub struct TransferController {
    id: TransferId,
    state: Mutex<State>,
    dispatcher: Dispatcher,
}

impl TransferController {
    /// Create a new controller in the `idle` state.
    #[must_use]
    pub fn new(id: TransferId, dispatcher: Dispatcher) -> Self {
        Self {
            id,
            state: Mutex::new(State::Idle),
            dispatcher,
        }
    }

    /// The transfer this controller drives.
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// `idle -> active`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the current state is `idle`.
    pub fn start(&self) -> Result<()> {
        self.transition(State::Idle, State::Active)
    }

    /// `active -> paused`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the current state is `active`.
    pub fn pause(&self) -> Result<()> {
        self.transition(State::Active, State::Paused)
    }

    /// `paused -> active`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the current state is `paused`.
    pub fn resume(&self) -> Result<()> {
        self.transition(State::Paused, State::Active)
    }

    /// `{idle, active, paused} -> cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the transfer is already terminal.
    pub fn cancel(&self) -> Result<()> {
        let mut guard = self.state.lock().expect("state mutex poisoned");
        if guard.is_terminal() {
            return Err(Error::InvalidState(format!(
                "cannot cancel from terminal state {:?}",
                *guard
            )));
        }
        *guard = State::Cancelled;
        drop(guard);
        self.dispatcher.emit(Event::StateChanged {
            id: self.id,
            state: State::Cancelled,
        });
        Ok(())
    }

    /// `active -> completed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the current state is `active`.
    pub fn complete(&self) -> Result<()> {
        self.transition(State::Active, State::Completed)?;
        self.dispatcher.emit(Event::TransferComplete { id: self.id });
        Ok(())
    }

    /// Any non-terminal state -> `failed`. Unlike the other transitions this
    /// never itself fails: a transfer that is already terminal simply stays
    /// terminal, since a failure report arriving after completion/cancel is
    /// not itself an error in the caller.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let mut guard = self.state.lock().expect("state mutex poisoned");
        if guard.is_terminal() {
            return;
        }
        *guard = State::Failed;
        drop(guard);
        self.dispatcher.emit(Event::TransferFailed {
            id: self.id,
            message,
        });
    }

    /// Emit a throttled progress event; callers decide the throttle cadence.
    pub fn report_progress(&self, bytes_written: u64, total_bytes: u64) {
        self.dispatcher.emit(Event::Progress {
            id: self.id,
            bytes_written,
            total_bytes,
        });
    }

    fn transition(&self, from: State, to: State) -> Result<()> {
        let mut guard = self.state.lock().expect("state mutex poisoned");
        if *guard != from {
            return Err(Error::InvalidState(format!(
                "cannot transition {:?} -> {:?} from current state {:?}",
                from, to, *guard
            )));
        }
        *guard = to;
        drop(guard);
        self.dispatcher
            .emit(Event::StateChanged { id: self.id, state: to });
        Ok(())
    }
}
