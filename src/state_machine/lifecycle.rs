// Copyright (c) 2025 - Cowboy AI, Inc.
//! Materialization Lifecycle State Machine
//!
//! Tracks one declared entity through a run.
//!
//! # States
//!
//! - Declared: registered, not yet started
//! - Creating / Updating / Replacing: provider call in flight
//! - Created: provider call succeeded, outputs available (terminal)
//! - Unchanged: reused from a prior run without a provider call (terminal)
//! - Failed: provider call failed (terminal)
//! - Skipped: run aborted before this entity started (terminal)
//!
//! # Inputs
//!
//! - Begin / BeginUpdate / BeginReplace: Declared → in flight
//! - Reuse: Declared → Unchanged
//! - Skip: Declared → Skipped
//! - Succeed: in flight → Created
//! - Fail: in flight → Failed

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Status of an entity within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Declared,
    Creating,
    Updating,
    Replacing,
    Created,
    Unchanged,
    Failed,
    Skipped,
}

impl EntityStatus {
    /// Check whether the entity's outputs are available to consumers
    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Created | Self::Unchanged)
    }

    /// Check whether the entity accepts no further input
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Unchanged | Self::Failed | Self::Skipped
        )
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Declared => "declared",
            Self::Creating => "creating",
            Self::Updating => "updating",
            Self::Replacing => "replacing",
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Lifecycle input (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleInput {
    /// Start a create call
    Begin,
    /// Start an in-place update call
    BeginUpdate,
    /// Start a delete-then-create call
    BeginReplace,
    /// Reuse outputs from a prior run
    Reuse,
    /// Run aborted before this entity started
    Skip,
    /// Provider call succeeded
    Succeed,
    /// Provider call failed
    Fail,
}

/// Transition output with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutput {
    /// Warnings generated during transition
    pub warnings: Vec<String>,

    /// Whether this is a critical transition
    pub is_critical: bool,
}

impl TransitionOutput {
    /// Create output with no warnings
    pub fn ok() -> Self {
        Self {
            warnings: Vec::new(),
            is_critical: false,
        }
    }

    /// Create output with warnings
    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: false,
        }
    }

    /// Create output for critical transition
    pub fn critical(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: true,
        }
    }
}

impl StateMachine for EntityStatus {
    type Input = LifecycleInput;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use EntityStatus::*;
        use LifecycleInput::*;

        match (self, input) {
            (Declared, Begin) => Ok((Creating, TransitionOutput::ok())),
            (Declared, BeginUpdate) => Ok((Updating, TransitionOutput::ok())),
            (Declared, BeginReplace) => Ok((
                Replacing,
                TransitionOutput::with_warnings(vec![
                    "Existing resource will be destroyed and recreated".to_string(),
                ]),
            )),
            (Declared, Reuse) => Ok((Unchanged, TransitionOutput::ok())),
            (Declared, Skip) => Ok((
                Skipped,
                TransitionOutput::with_warnings(vec!["Run aborted before start".to_string()]),
            )),

            (Creating | Updating | Replacing, Succeed) => Ok((Created, TransitionOutput::ok())),
            (Creating | Updating | Replacing, Fail) => Ok((
                Failed,
                TransitionOutput::critical(vec!["Provider call failed".to_string()]),
            )),

            (state, _) if state.is_terminal() => Err(TransitionError::Terminal(state.to_string())),

            (state, input) => Err(TransitionError::InvalidTransition {
                from: state.to_string(),
                input: format!("{:?}", input),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use EntityStatus::*;
        use LifecycleInput::*;

        match self {
            Declared => vec![Begin, BeginUpdate, BeginReplace, Reuse, Skip],
            Creating | Updating | Replacing => vec![Succeed, Fail],
            Created | Unchanged | Failed | Skipped => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_to_created() {
        let (state, _) = EntityStatus::Declared
            .transition(&LifecycleInput::Begin)
            .expect("Transition should succeed");
        assert_eq!(state, EntityStatus::Creating);

        let (state, output) = state
            .transition(&LifecycleInput::Succeed)
            .expect("Transition should succeed");
        assert_eq!(state, EntityStatus::Created);
        assert!(!output.is_critical);
        assert!(state.is_materialized());
    }

    #[test]
    fn test_failure_is_critical() {
        let (state, output) = EntityStatus::Replacing
            .transition(&LifecycleInput::Fail)
            .expect("Transition should succeed");
        assert_eq!(state, EntityStatus::Failed);
        assert!(output.is_critical);
    }

    #[test]
    fn test_replace_warns() {
        let (state, output) = EntityStatus::Declared
            .transition(&LifecycleInput::BeginReplace)
            .expect("Transition should succeed");
        assert_eq!(state, EntityStatus::Replacing);
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn test_cannot_succeed_before_begin() {
        let result = EntityStatus::Declared.transition(&LifecycleInput::Succeed);
        assert!(matches!(
            result,
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_terminal_states_reject_input() {
        for state in [
            EntityStatus::Created,
            EntityStatus::Unchanged,
            EntityStatus::Failed,
            EntityStatus::Skipped,
        ] {
            assert!(state.valid_inputs().is_empty());
            assert!(matches!(
                state.transition(&LifecycleInput::Begin),
                Err(TransitionError::Terminal(_))
            ));
        }
    }

    #[test]
    fn test_in_flight_cannot_be_skipped() {
        assert!(!EntityStatus::Creating.can_transition(&LifecycleInput::Skip));
    }
}
