// jmap-engine/src/events.rs
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::types::SessionState;

/// A response reported a session state different from the cached session's
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutdated {
    pub username: String,
    /// Accounts addressed by the request that observed the change; empty when
    /// the request did not name any, in which case every account is affected.
    pub account_ids: Vec<String>,
    pub previous_state: SessionState,
    pub new_state: SessionState,
}

pub trait SessionEventListener: Send + Sync {
    fn on_session_outdated(&self, event: &SessionOutdated);
}

/// Registered listeners; safe to add to while a signal is being delivered
#[derive(Default)]
pub struct SessionListeners {
    listeners: RwLock<Vec<Arc<dyn SessionEventListener>>>,
}

impl SessionListeners {
    pub fn add(&self, listener: Arc<dyn SessionEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signal(&self, event: &SessionOutdated) {
        // Deliver outside the lock so listeners may register others.
        let snapshot = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!(
            username = %event.username,
            new_state = %event.new_state,
            listeners = snapshot.len(),
            "session outdated"
        );
        for listener in snapshot {
            listener.on_session_outdated(event);
        }
    }
}

impl fmt::Debug for SessionListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionListeners")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SessionOutdated>>,
    }

    impl SessionEventListener for Recorder {
        fn on_session_outdated(&self, event: &SessionOutdated) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    struct Registrar {
        listeners: Arc<SessionListeners>,
        late: Arc<Recorder>,
    }

    impl SessionEventListener for Registrar {
        fn on_session_outdated(&self, _event: &SessionOutdated) {
            self.listeners.add(self.late.clone());
        }
    }

    fn event() -> SessionOutdated {
        SessionOutdated {
            username: "alice".to_string(),
            account_ids: vec!["a".to_string()],
            previous_state: SessionState::from("1"),
            new_state: SessionState::from("2"),
        }
    }

    #[test]
    fn test_signal_reaches_every_listener_once() {
        let listeners = SessionListeners::default();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        listeners.add(first.clone());
        listeners.add(second.clone());

        listeners.signal(&event());

        assert_eq!(first.events.lock().unwrap().as_slice(), &[event()]);
        assert_eq!(second.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_may_register_during_signal() {
        let listeners = Arc::new(SessionListeners::default());
        let late = Arc::new(Recorder::default());
        listeners.add(Arc::new(Registrar {
            listeners: listeners.clone(),
            late: late.clone(),
        }));

        listeners.signal(&event());
        assert_eq!(listeners.len(), 2);
        assert!(late.events.lock().unwrap().is_empty());

        listeners.signal(&event());
        assert_eq!(late.events.lock().unwrap().len(), 1);
    }
}
