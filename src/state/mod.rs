// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits typed change events to any number of listeners.

use crate::models::{AppState, InstallPhase, Operation};
use camino::Utf8PathBuf;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Listeners (a console, a GUI, a tray icon) subscribe instead of polling.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Installer moved to a new phase
    PhaseChanged {
        phase: InstallPhase,
    },

    /// Downloads became possible or impossible
    ReadinessChanged {
        is_ready: bool,
    },

    /// A long-running operation took the operation slot
    OperationStarted {
        operation: Operation,
        items: usize,
    },

    /// The operation slot was released
    OperationFinished {
        operation: Operation,
    },

    /// The user agreed to set up the helper from the not-found prompt
    SetupRequested,

    /// The helper depot cache was removed
    DepotCacheCleared,

    /// Removed items whose helper metadata must be purged
    ItemsPurged {
        ids: BTreeSet<String>,
    },

    /// State has been reset after a prefix change
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`publish()`](Self::publish) for events that carry no state
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100 event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state, safe to use without holding locks.
    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        // A poisoned lock only means a listener panicked mid-read; the data is plain values.
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, detects what changed and
    /// emits one event per change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Emit an event that is not derived from a state diff.
    pub fn publish(&self, event: StateChange) {
        tracing::debug!("Publishing {:?}", event);
        let _ = self.state_tx.send(event);
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged { phase: new.phase });
        }

        if old.is_ready != new.is_ready {
            changes.push(StateChange::ReadinessChanged {
                is_ready: new.is_ready,
            });
        }

        match (old.active_operation, new.active_operation) {
            (None, Some(operation)) => changes.push(StateChange::OperationStarted {
                operation,
                items: new.last_batch_size,
            }),
            (Some(operation), None) => changes.push(StateChange::OperationFinished { operation }),
            _ => {}
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn set_phase(&self, phase: InstallPhase) -> Vec<StateChange> {
        self.update(|state| state.phase = phase)
    }

    pub fn set_ready(&self, is_ready: bool) -> Vec<StateChange> {
        self.update(|state| state.is_ready = is_ready)
    }

    /// Take the operation slot.
    ///
    /// Returns the operation already running when the slot is taken, so the
    /// caller can tell the user why nothing happened.
    pub fn begin_operation(&self, operation: Operation, items: usize) -> Result<(), Operation> {
        let mut running = None;
        self.update(|state| match state.active_operation {
            Some(active) => running = Some(active),
            None => {
                state.active_operation = Some(operation);
                state.last_batch_size = items;
            }
        });

        match running {
            Some(active) => {
                tracing::warn!("Refusing {}: {} is already running", operation, active);
                Err(active)
            }
            None => Ok(()),
        }
    }

    /// Release the operation slot
    pub fn finish_operation(&self) -> Vec<StateChange> {
        self.update(|state| state.active_operation = None)
    }

    /// Reset installation state after the prefix changed
    pub fn reset_installation(&self, prefix: Utf8PathBuf) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.reset_installation();
            state.prefix = Some(prefix);
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.phase, InstallPhase::Uninitialized);
        assert!(!state.is_ready);
        assert!(!state.is_busy());
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = StateManager::new();

        let changes = manager.update(|state| {
            state.phase = InstallPhase::Linked;
            state.is_ready = true;
        });

        assert_eq!(changes.len(), 2);
        assert!(matches!(
            changes[0],
            StateChange::PhaseChanged {
                phase: InstallPhase::Linked
            }
        ));
        assert!(matches!(
            changes[1],
            StateChange::ReadinessChanged { is_ready: true }
        ));
    }

    #[test]
    fn test_no_events_without_change() {
        let manager = StateManager::new();
        let changes = manager.set_phase(InstallPhase::Uninitialized);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_operation_slot_is_exclusive() {
        let manager = StateManager::new();

        assert!(manager.begin_operation(Operation::Download, 2).is_ok());
        assert_eq!(
            manager.begin_operation(Operation::Setup, 0),
            Err(Operation::Download)
        );

        let changes = manager.finish_operation();
        assert_eq!(
            changes,
            vec![StateChange::OperationFinished {
                operation: Operation::Download
            }]
        );

        assert!(manager.begin_operation(Operation::Setup, 0).is_ok());
    }

    #[test]
    fn test_operation_started_carries_item_count() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.begin_operation(Operation::Download, 7).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::OperationStarted {
                operation: Operation::Download,
                items: 7
            }
        );
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.publish(StateChange::SetupRequested);

        assert_eq!(rx1.try_recv().unwrap(), StateChange::SetupRequested);
        assert_eq!(rx2.try_recv().unwrap(), StateChange::SetupRequested);
    }

    #[test]
    fn test_reset_installation() {
        let manager = StateManager::new();
        manager.update(|state| {
            state.phase = InstallPhase::Linked;
            state.is_ready = true;
        });

        let changes = manager.reset_installation(Utf8PathBuf::from("/new/prefix"));

        assert!(changes.iter().any(|c| matches!(c, StateChange::StateReset)));
        let state = manager.snapshot();
        assert!(!state.is_ready);
        assert_eq!(state.prefix, Some(Utf8PathBuf::from("/new/prefix")));
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_ready(true);

        assert!(manager2.read(|state| state.is_ready));
    }
}
