// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Each declared entity is tracked through a run by a small Mealy machine.
//! Transitions are pure; [`Tracked`] applies them and keeps a timestamped
//! log, which the materializer uses to report how long provider calls took.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use stack_provision::state_machine::{EntityStatus, LifecycleInput, Tracked};
//!
//! let mut tracker = Tracked::new(EntityStatus::Declared);
//! tracker.apply(LifecycleInput::Begin, Utc::now()).unwrap();
//! tracker.apply(LifecycleInput::Succeed, Utc::now()).unwrap();
//! assert_eq!(*tracker.state(), EntityStatus::Created);
//! assert_eq!(tracker.log().len(), 2);
//! ```

pub mod lifecycle;

use chrono::{DateTime, Duration, Utc};

pub use lifecycle::{EntityStatus, LifecycleInput, TransitionOutput};

pub type TransitionResult<S> = Result<S, TransitionError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The state does not accept this input
    #[error("Invalid transition from {from} on {input}")]
    InvalidTransition { from: String, input: String },

    /// The state accepts no further input
    #[error("State {0} is terminal")]
    Terminal(String),
}

/// A finite state machine over `Self` as the state
pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    /// Next state and output for `input`, without side effects
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Inputs the current state accepts, when enumerable
    fn valid_inputs(&self) -> Vec<Self::Input> {
        Vec::new()
    }
}

/// One applied transition
#[derive(Debug, Clone)]
pub struct LogEntry<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub at: DateTime<Utc>,
}

/// A state machine and the log of every transition applied to it
#[derive(Debug, Clone)]
pub struct Tracked<S: StateMachine> {
    state: S,
    log: Vec<LogEntry<S, S::Input>>,
}

impl<S: StateMachine> Tracked<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: initial,
            log: Vec::new(),
        }
    }

    /// Apply `input` at `at`; the state is unchanged on error
    pub fn apply(&mut self, input: S::Input, at: DateTime<Utc>) -> TransitionResult<S::Output>
    where
        S::Input: Clone,
    {
        let (next, output) = self.state.transition(&input)?;
        self.log.push(LogEntry {
            from: self.state.clone(),
            to: next.clone(),
            input,
            at,
        });
        self.state = next;
        Ok(output)
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn log(&self) -> &[LogEntry<S, S::Input>] {
        &self.log
    }
}

impl<S: StateMachine + PartialEq> Tracked<S> {
    /// Time spent in the most recent state before the current one
    pub fn last_dwell(&self) -> Option<Duration> {
        let [.., entered, left] = self.log.as_slice() else {
            return None;
        };
        (entered.to == left.from).then(|| left.at - entered.at)
    }
}
