// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deferred - Single-Assignment Values
//!
//! A `Deferred<T>` is a handle to a value that does not exist at declaration
//! time, typically an attribute a provider assigns when it creates a
//! resource (identifier, private address). It carries the set of entities
//! whose materialization produces it, so any resource whose arguments
//! consume a deferred value picks up an implicit dependency on those
//! producers.
//!
//! # Mathematical Model
//!
//! ```text
//! Deferred<T> ≅ (Producers, () → Option<T>)
//! ```
//!
//! Sampling before every producer has materialized yields `None`. The first
//! successful sample is cached: a deferred value is computed at most once
//! and never changes afterwards.
//!
//! # Examples
//!
//! ```rust
//! use stack_provision::deferred::Deferred;
//!
//! let host = Deferred::known("10.0.3.55".to_string());
//! let line = host.map(|ip| format!("{} database-host", ip));
//! assert_eq!(line.try_get().as_deref(), Some("10.0.3.55 database-host"));
//! ```

use std::collections::BTreeSet;
use std::fmt::{self, Debug};
use std::sync::{Arc, OnceLock};

use crate::resolver::EntityRef;

type Sampler<T> = Arc<dyn Fn() -> Option<T> + Send + Sync>;

/// Handle to a value resolved once its producers materialize
///
/// Cloning is cheap and clones share the same value slot.
pub struct Deferred<T> {
    /// Produces the value once all inputs are available
    sampler: Sampler<T>,
    /// Filled exactly once, by the first successful sample
    cache: Arc<OnceLock<T>>,
    /// Entities that must be created before the value exists
    producers: Arc<BTreeSet<EntityRef>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            sampler: Arc::clone(&self.sampler),
            cache: Arc::clone(&self.cache),
            producers: Arc::clone(&self.producers),
        }
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let producers: Vec<&str> = self.producers.iter().map(EntityRef::name).collect();
        f.debug_struct("Deferred")
            .field("type", &std::any::type_name::<T>())
            .field("resolved", &self.cache.get().is_some())
            .field("producers", &producers)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// Wrap a value that is already known at declaration time
    ///
    /// The result has no producers and never adds a dependency edge.
    pub fn known(value: T) -> Self {
        Self {
            sampler: Arc::new(|| None),
            cache: Arc::new(OnceLock::from(value)),
            producers: Arc::new(BTreeSet::new()),
        }
    }

    /// Create a deferred value from a sampling function and its producers
    pub(crate) fn from_fn<F>(producers: BTreeSet<EntityRef>, f: F) -> Self
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        Self {
            sampler: Arc::new(f),
            cache: Arc::new(OnceLock::new()),
            producers: Arc::new(producers),
        }
    }

    /// Sample the value
    ///
    /// Returns `None` while any producer is still unmaterialized. Once a
    /// value has been observed it is cached and returned unchanged.
    pub fn try_get(&self) -> Option<T> {
        if let Some(value) = self.cache.get() {
            return Some(value.clone());
        }
        let value = (self.sampler)()?;
        Some(self.cache.get_or_init(|| value).clone())
    }

    /// Check whether the value can be observed now
    pub fn is_resolved(&self) -> bool {
        self.try_get().is_some()
    }

    /// Entities whose materialization produces this value
    pub fn producers(&self) -> &BTreeSet<EntityRef> {
        &self.producers
    }

    /// Derive a new deferred value by applying `f` lazily
    ///
    /// `f` runs at most once, after every producer has materialized.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        Deferred::from_fn((*self.producers).clone(), move || source.try_get().map(&f))
    }

    /// Pair two deferred values; resolved once both are
    pub fn zip<U>(&self, other: &Deferred<U>) -> Deferred<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let producers = self.producers.union(&other.producers).cloned().collect();
        let left = self.clone();
        let right = other.clone();
        Deferred::from_fn(producers, move || Some((left.try_get()?, right.try_get()?)))
    }
}
