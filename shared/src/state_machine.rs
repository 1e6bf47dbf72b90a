//! Connection State Machine
//!
//! Defines the lifecycle of a single link session. A session runs through
//! the machine once: after it closes or fails, a new session is required.

use std::fmt;

/// Lifecycle state of a link session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    /// Session start requested
    Start,
    /// Transport handshake succeeded
    Established,
    /// Discovery or every connection strategy failed
    ConnectFailed,
    /// Read error or end of stream while running
    ConnectionLost,
    /// Explicit shutdown
    Stop,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid, carries the resulting state
    Success(ConnectionState),
    /// Trigger is not valid from the current state
    Invalid {
        from: ConnectionState,
        trigger: SessionTrigger,
    },
}

/// The state machine for one link session
#[derive(Debug)]
pub struct ConnectionStateMachine {
    current_state: ConnectionState,
    started: bool,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a state machine in the initial Disconnected state
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            started: false,
        }
    }

    /// Get current state
    pub fn state(&self) -> ConnectionState {
        self.current_state
    }

    /// True once the session has failed or closed after starting
    pub fn is_terminal(&self) -> bool {
        match self.current_state {
            ConnectionState::Failed => true,
            ConnectionState::Disconnected => self.started,
            _ => false,
        }
    }

    /// Process a trigger and return the transition result
    pub fn process_event(&mut self, trigger: SessionTrigger) -> TransitionResult {
        use ConnectionState::*;

        let next = match (self.current_state, trigger) {
            (Disconnected, SessionTrigger::Start) if !self.started => {
                self.started = true;
                Some(Connecting)
            }
            (Connecting, SessionTrigger::Established) => Some(Connected),
            (Connecting, SessionTrigger::ConnectFailed) => Some(Failed),
            (Connected, SessionTrigger::ConnectionLost) => Some(Disconnected),
            (Connecting | Connected, SessionTrigger::Stop) => Some(Disconnected),
            // Stopping an idle or finished session changes nothing
            (Disconnected | Failed, SessionTrigger::Stop) => Some(self.current_state),
            _ => None,
        };

        match next {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                trigger,
            },
        }
    }
}
