//! Lifecycle state machine.
//!
//! The lifecycle field and the session target live together behind one
//! mutex. Control operations and the emission loop only ever touch them
//! through [`Lifecycle`]'s methods, each of which takes and releases the
//! lock internally; no guard escapes and the lock is never held across an
//! `.await`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::GeneratorError;
use crate::sink::PacketSink;

/// Lifecycle of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created or fully stopped; no worker exists.
    Init,

    /// Worker emits one packet per interval.
    Running,

    /// Worker advances the packetizer silently; nothing is transmitted.
    Suspended,

    /// Teardown requested; the worker exits at its next tick.
    Stopped,
}

impl GeneratorState {
    /// Whether a worker is expected to be alive in this state.
    pub fn is_active(self) -> bool {
        matches!(self, GeneratorState::Running | GeneratorState::Suspended)
    }
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeneratorState::Init => "init",
            GeneratorState::Running => "running",
            GeneratorState::Suspended => "suspended",
            GeneratorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Where transmitted packets go: a sink plus the destination it sends to.
#[derive(Clone)]
pub struct Target {
    // ---
    /// Transmission sink
    pub sink: Arc<dyn PacketSink>,

    /// Remote address handed to the sink with every packet
    pub destination: SocketAddr,
}

impl Target {
    // ---
    pub fn new(sink: Arc<dyn PacketSink>, destination: SocketAddr) -> Self {
        // ---
        Self { sink, destination }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// What `start()` has to do after recording the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    /// No worker exists yet: build a session and spawn one.
    Spawn,

    /// A suspended worker was switched back to running.
    Resumed,

    /// A running worker will pick up the new target at its next tick.
    Retargeted,
}

struct Control {
    state: GeneratorState,
    target: Option<Target>,
}

/// Mutex-guarded lifecycle state and session target.
pub struct Lifecycle {
    // ---
    control: Mutex<Control>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    // ---
    pub fn new() -> Self {
        // ---
        Self {
            control: Mutex::new(Control {
                state: GeneratorState::Init,
                target: None,
            }),
        }
    }

    // Nothing guarded here spans more than one field write, so a
    // poisoned lock still holds a coherent value.
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> GeneratorState {
        // ---
        self.lock().state
    }

    /// Current state and target, read under a single lock acquisition.
    pub fn snapshot(&self) -> (GeneratorState, Option<Target>) {
        // ---
        let control = self.lock();
        (control.state, control.target.clone())
    }

    /// Records `target` and moves to `Running`.
    ///
    /// `Init` reports [`StartAction::Spawn`]; the caller owns spawning.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidStateTransition`] from `Stopped`:
    /// a previous worker may still be winding down and must be joined
    /// first. Nothing is changed.
    pub fn begin_start(&self, target: Target) -> Result<StartAction, GeneratorError> {
        // ---
        let mut control = self.lock();
        let action = match control.state {
            GeneratorState::Init => StartAction::Spawn,
            GeneratorState::Suspended => StartAction::Resumed,
            GeneratorState::Running => StartAction::Retargeted,
            state @ GeneratorState::Stopped => {
                return Err(GeneratorError::InvalidStateTransition {
                    operation: "start",
                    state,
                });
            }
        };
        control.target = Some(target);
        control.state = GeneratorState::Running;
        Ok(action)
    }

    /// `Running` → `Suspended`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidStateTransition`] from any other
    /// state, leaving it unchanged.
    pub fn suspend(&self) -> Result<(), GeneratorError> {
        // ---
        let mut control = self.lock();
        match control.state {
            GeneratorState::Running => {
                control.state = GeneratorState::Suspended;
                Ok(())
            }
            state => Err(GeneratorError::InvalidStateTransition {
                operation: "suspend",
                state,
            }),
        }
    }

    /// Moves an active generator to `Stopped` and returns the prior state.
    ///
    /// `Init` and `Stopped` are left untouched.
    pub fn request_stop(&self) -> GeneratorState {
        // ---
        let mut control = self.lock();
        let prior = control.state;
        if prior.is_active() {
            control.state = GeneratorState::Stopped;
        }
        prior
    }

    /// Drops the session target.
    pub fn clear_target(&self) {
        // ---
        self.lock().target = None;
    }

    /// Returns to `Init` after teardown.
    pub fn reset(&self) {
        // ---
        self.lock().state = GeneratorState::Init;
    }

    /// Called once by a freshly spawned worker.
    ///
    /// Returns `false` if a stop already landed, in which case the worker
    /// must exit without emitting anything. A suspend issued between
    /// `start()` and the worker's first poll is kept; anything else is
    /// forced to `Running`.
    pub fn enter_run(&self) -> bool {
        // ---
        let mut control = self.lock();
        match control.state {
            GeneratorState::Stopped => false,
            GeneratorState::Suspended => true,
            GeneratorState::Init | GeneratorState::Running => {
                control.state = GeneratorState::Running;
                true
            }
        }
    }
}
