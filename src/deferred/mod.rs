// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deferred Values
//!
//! Provisioning declares resources before any of them exist, yet later
//! resources need attributes of earlier ones (a subnet needs its network's
//! identifier, an application instance needs the database's private IP).
//! This module provides the handle type used to express such values.
//!
//! # Core Concepts
//!
//! ## Deferred<T>
//!
//! A single-assignment value with exactly one producer set. It is resolved
//! once every producing entity has been materialized:
//!
//! ```text
//! declare ──────────── materialize(producer) ──────────→
//! Value:   (pending)   ●━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//! ```
//!
//! ## Implicit dependencies
//!
//! Every deferred value records its producers. When a resource argument
//! consumes a deferred value, the resolver adds an edge from that resource
//! to each producer, exactly as if it had been declared explicitly.
//!
//! # Combinator Laws
//!
//! ```text
//! d.map(id) = d
//! d.map(f).map(g) = d.map(g . f)
//! producers(d.zip(e)) = producers(d) ∪ producers(e)
//! ```

pub mod combinators;
pub mod value;

pub use combinators::{all, resolve};
pub use value::Deferred;
