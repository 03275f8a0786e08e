// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deferred Combinators
//!
//! Free functions for composing many deferred values at once. All
//! combinators are lazy: they return immediately with a placeholder and
//! compute nothing until every input is resolved.

use std::collections::BTreeSet;

use super::value::Deferred;

/// Collect a list of deferred values into one deferred list
///
/// The result's producers are the union of every input's producers. Order
/// of the input list is preserved.
pub fn all<T, I>(values: I) -> Deferred<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let values: Vec<Deferred<T>> = values.into_iter().collect();
    let producers: BTreeSet<_> = values
        .iter()
        .flat_map(|value| value.producers().iter().cloned())
        .collect();

    Deferred::from_fn(producers, move || {
        values.iter().map(Deferred::try_get).collect::<Option<Vec<T>>>()
    })
}

/// Register a derived deferred value computed from `values` by `f`
///
/// Does not block: `f` runs on the first sample after all inputs resolve.
///
/// # Examples
///
/// ```rust
/// use stack_provision::deferred::{resolve, Deferred};
///
/// let hosts = vec![
///     Deferred::known("10.0.3.10".to_string()),
///     Deferred::known("10.0.4.10".to_string()),
/// ];
/// let joined = resolve(hosts, |ips| ips.join(","));
/// assert_eq!(joined.try_get().as_deref(), Some("10.0.3.10,10.0.4.10"));
/// ```
pub fn resolve<T, U, F>(values: Vec<Deferred<T>>, f: F) -> Deferred<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    F: Fn(Vec<T>) -> U + Send + Sync + 'static,
{
    all(values).map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_all_of_known_values() {
        let list = all(vec![Deferred::known(1), Deferred::known(2), Deferred::known(3)]);
        assert_eq!(list.try_get(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_all_of_nothing_is_resolved() {
        let list = all(Vec::<Deferred<u8>>::new());
        assert_eq!(list.try_get(), Some(vec![]));
    }

    #[test]
    fn test_resolve_waits_for_every_input() {
        let slot = Arc::new(Mutex::new(None::<String>));
        let reader = Arc::clone(&slot);
        let pending = Deferred::from_fn(BTreeSet::new(), move || reader.lock().unwrap().clone());

        let script = resolve(
            vec![Deferred::known("a".to_string()), pending],
            |parts| parts.concat(),
        );
        assert_eq!(script.try_get(), None);

        *slot.lock().unwrap() = Some("b".to_string());
        assert_eq!(script.try_get().as_deref(), Some("ab"));
    }
}
