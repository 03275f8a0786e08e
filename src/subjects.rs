// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for provisioning events
//!
//! # Subject Pattern
//!
//! ```text
//! provisioning.{stack}.{scope}.{operation}
//! ```
//!
//! where scope is `resource` or `run`. This allows for:
//! - Precise subscriptions (`provisioning.ecommerce.resource.failed`)
//! - Scope wildcards (`provisioning.ecommerce.run.>`)
//! - Stack wildcards (`provisioning.ecommerce.>`)
//! - Global subscriptions (`provisioning.>`)
//!
//! # Examples
//!
//! ```rust
//! use stack_provision::subjects::{Operation, Scope, SubjectBuilder};
//!
//! let subject = SubjectBuilder::new("ecommerce")
//!     .operation(Operation::Created)
//!     .build();
//! assert_eq!(subject, "provisioning.ecommerce.resource.created");
//!
//! let wildcard = SubjectBuilder::new("ecommerce").scope(Scope::Run).build();
//! assert_eq!(wildcard, "provisioning.ecommerce.run.>");
//! ```

use std::fmt;

/// Root namespace for all provisioning subjects
pub const PROVISIONING_ROOT: &str = "provisioning";

/// What an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A single declared resource
    Resource,
    /// The run as a whole
    Run,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Resource => write!(f, "resource"),
            Scope::Run => write!(f, "run"),
        }
    }
}

/// Provisioning operations (event types)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // Resource operations
    Creating,
    Created,
    Updated,
    Replaced,
    Unchanged,
    Failed,

    // Run operations
    Completed,
    Aborted,
}

impl Operation {
    /// Scope the operation belongs to
    pub fn scope(&self) -> Scope {
        match self {
            Operation::Completed | Operation::Aborted => Scope::Run,
            _ => Scope::Resource,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Creating => write!(f, "creating"),
            Operation::Created => write!(f, "created"),
            Operation::Updated => write!(f, "updated"),
            Operation::Replaced => write!(f, "replaced"),
            Operation::Unchanged => write!(f, "unchanged"),
            Operation::Failed => write!(f, "failed"),
            Operation::Completed => write!(f, "completed"),
            Operation::Aborted => write!(f, "aborted"),
        }
    }
}

/// Builder for provisioning NATS subjects
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    stack: String,
    scope: Option<Scope>,
    operation: Option<Operation>,
}

impl SubjectBuilder {
    /// Create a builder for `stack`
    ///
    /// Characters that are not valid inside a subject token are replaced
    /// with `_`.
    pub fn new(stack: &str) -> Self {
        Self {
            stack: sanitize_token(stack),
            scope: None,
            operation: None,
        }
    }

    /// Restrict to a scope
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the operation (implies its scope)
    pub fn operation(mut self, operation: Operation) -> Self {
        self.scope = Some(operation.scope());
        self.operation = Some(operation);
        self
    }

    /// Build the subject
    ///
    /// Without an operation the result is a wildcard over whatever was set.
    pub fn build(self) -> String {
        match (self.scope, self.operation) {
            (Some(scope), Some(operation)) => {
                format!("{}.{}.{}.{}", PROVISIONING_ROOT, self.stack, scope, operation)
            }
            (Some(scope), None) => format!("{}.{}.{}.>", PROVISIONING_ROOT, self.stack, scope),
            _ => format!("{}.{}.>", PROVISIONING_ROOT, self.stack),
        }
    }

    /// Build a subscription for all provisioning events
    pub fn build_all() -> String {
        format!("{}.>", PROVISIONING_ROOT)
    }
}

fn sanitize_token(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
