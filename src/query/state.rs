//! Per-query lifecycle state machine.
//!
//! `Running` is the initial state. `Terminated` is absorbing. `Resuming` is
//! only observable while a resume is loading its checkpoint; it either
//! completes to `Running` or falls back to `Paused`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a controlled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    Running,
    Paused,
    Resuming,
    Terminated,
}

/// Events that drive [`QueryState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    Pause,
    Resume,
    ResumeComplete,
    ResumeAborted,
    Terminate,
}

/// A rejected transition. Carries the state that rejected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: QueryState,
    pub event: QueryEvent,
}

impl QueryState {
    /// Compute the next state for `event`, or reject it without side effects.
    pub fn apply(self, event: QueryEvent) -> Result<QueryState, IllegalTransition> {
        use QueryEvent as E;
        use QueryState as S;

        let next = match (self, event) {
            (S::Running, E::Pause) => S::Paused,
            (S::Paused, E::Resume) => S::Resuming,
            (S::Resuming, E::ResumeComplete) => S::Running,
            (S::Resuming, E::ResumeAborted) => S::Paused,
            (S::Running | S::Paused, E::Terminate) => S::Terminated,
            (from, event) => return Err(IllegalTransition { from, event }),
        };
        Ok(next)
    }

    /// Whether model or permission assignments may still change.
    pub fn accepts_mutation(self) -> bool {
        self != QueryState::Terminated
    }

    pub fn is_terminal(self) -> bool {
        self == QueryState::Terminated
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Resuming => "resuming",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueryEvent {
    /// Operation name used in error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume | Self::ResumeComplete | Self::ResumeAborted => "resume",
            Self::Terminate => "terminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [QueryState; 4] = [
        QueryState::Running,
        QueryState::Paused,
        QueryState::Resuming,
        QueryState::Terminated,
    ];

    const ALL_EVENTS: [QueryEvent; 5] = [
        QueryEvent::Pause,
        QueryEvent::Resume,
        QueryEvent::ResumeComplete,
        QueryEvent::ResumeAborted,
        QueryEvent::Terminate,
    ];

    #[test]
    fn test_pause_resume_cycle() {
        let paused = QueryState::Running.apply(QueryEvent::Pause).unwrap();
        assert_eq!(paused, QueryState::Paused);
        let resuming = paused.apply(QueryEvent::Resume).unwrap();
        assert_eq!(resuming, QueryState::Resuming);
        assert_eq!(resuming.apply(QueryEvent::ResumeComplete).unwrap(), QueryState::Running);
        assert_eq!(resuming.apply(QueryEvent::ResumeAborted).unwrap(), QueryState::Paused);
    }

    #[test]
    fn test_terminate_from_running_and_paused() {
        assert_eq!(
            QueryState::Running.apply(QueryEvent::Terminate),
            Ok(QueryState::Terminated)
        );
        assert_eq!(
            QueryState::Paused.apply(QueryEvent::Terminate),
            Ok(QueryState::Terminated)
        );
    }

    #[test]
    fn test_terminated_is_absorbing() {
        for event in ALL_EVENTS {
            let err = QueryState::Terminated.apply(event).unwrap_err();
            assert_eq!(err.from, QueryState::Terminated);
        }
    }

    #[test]
    fn test_duplicate_pause_rejected() {
        let err = QueryState::Paused.apply(QueryEvent::Pause).unwrap_err();
        assert_eq!(err, IllegalTransition { from: QueryState::Paused, event: QueryEvent::Pause });
    }

    #[test]
    fn test_resume_on_running_rejected() {
        assert!(QueryState::Running.apply(QueryEvent::Resume).is_err());
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        let legal = ALL_STATES
            .iter()
            .flat_map(|s| ALL_EVENTS.iter().map(move |e| (*s, *e)))
            .filter(|(s, e)| s.apply(*e).is_ok())
            .count();
        assert_eq!(legal, 6);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&QueryState::Paused).unwrap(), "\"paused\"");
        let state: QueryState = serde_json::from_str("\"terminated\"").unwrap();
        assert!(state.is_terminal());
        assert!(!state.accepts_mutation());
    }
}
