// Copyright (c) 2025 - Cowboy AI, Inc.
//! Script Composition
//!
//! Binds template placeholders to deferred values and produces a deferred
//! script. The script resolves only once every bound value has, so a
//! partially substituted script is never observable; its producers become
//! implicit dependencies of whichever instance consumes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use super::template::{PlaceholderName, ScriptTemplate};
use crate::deferred::{self, Deferred};
use crate::errors::BootstrapError;

/// Typed placeholder bindings
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<PlaceholderName, Deferred<String>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a placeholder to a deferred value
    pub fn bind(mut self, name: &str, value: Deferred<String>) -> Result<Self, BootstrapError> {
        self.values.insert(PlaceholderName::new(name)?, value);
        Ok(self)
    }

    /// Bind a placeholder to a value known now
    pub fn bind_known(self, name: &str, value: impl Into<String>) -> Result<Self, BootstrapError> {
        self.bind(name, Deferred::known(value.into()))
    }

    pub fn get(&self, name: &PlaceholderName) -> Option<&Deferred<String>> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &PlaceholderName> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A fully substituted bootstrap script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedScript {
    text: String,
    fingerprint: String,
}

impl RenderedScript {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let fingerprint = hex::encode(hasher.finalize());
        Self { text, fingerprint }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the script text, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for RenderedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<RenderedScript> for Value {
    fn from(script: RenderedScript) -> Self {
        Value::String(script.text)
    }
}

/// Compose `prefix` and `template` into a deferred script
///
/// Fails at once if the template uses a placeholder without a binding.
/// Bindings the template never uses are ignored and add no dependency.
pub fn compose(
    prefix: &str,
    template: &ScriptTemplate,
    bindings: &Bindings,
) -> Result<Deferred<RenderedScript>, BootstrapError> {
    let mut names = Vec::new();
    let mut values = Vec::new();
    for placeholder in template.placeholders() {
        let value = bindings
            .get(placeholder)
            .ok_or_else(|| BootstrapError::Unbound(placeholder.to_string()))?;
        names.push(placeholder.clone());
        values.push(value.clone());
    }

    let used = template.placeholders();
    for unused in bindings.names().filter(|name| !used.contains(name)) {
        warn!("Binding {} is not used by the template", unused);
    }

    let prefix = prefix.to_string();
    let template = template.clone();
    Ok(deferred::resolve(values, move |resolved| {
        let substitutions: BTreeMap<PlaceholderName, String> =
            names.iter().cloned().zip(resolved).collect();
        let mut text = prefix.clone();
        text.push_str(&template.substitute(&substitutions));
        RenderedScript::new(text)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EntityRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unbound_placeholder_fails_immediately() {
        let template = ScriptTemplate::parse("echo \"{DATABASE_HOST}\"").unwrap();
        let err = compose("#!/bin/bash\n", &template, &Bindings::new()).unwrap_err();
        assert_eq!(err, BootstrapError::Unbound("DATABASE_HOST".into()));
    }

    #[test]
    fn test_known_bindings_resolve_immediately() {
        let template = ScriptTemplate::parse("echo \"{GREETING}\"\n").unwrap();
        let bindings = Bindings::new().bind_known("GREETING", "hello").unwrap();
        let script = compose("#!/bin/bash\n", &template, &bindings).unwrap();

        assert!(script.producers().is_empty());
        assert_eq!(
            script.try_get().unwrap().as_str(),
            "#!/bin/bash\necho \"hello\"\n"
        );
    }

    #[test]
    fn test_deferred_binding_carries_producer() {
        let database = EntityRef::new(0, "database");
        let template = ScriptTemplate::parse("export DATABASE_HOST=\"{DATABASE_HOST}\"").unwrap();
        let bindings = Bindings::new()
            .bind("DATABASE_HOST", database.private_ip())
            .unwrap()
            .bind_known("UNUSED", "x")
            .unwrap();

        let script = compose("", &template, &bindings).unwrap();
        assert!(script.producers().contains(&database));
        assert_eq!(script.producers().len(), 1);
        assert!(script.try_get().is_none());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = RenderedScript::new("echo a");
        assert_eq!(a.fingerprint(), RenderedScript::new("echo a").fingerprint());
        assert_ne!(a.fingerprint(), RenderedScript::new("echo b").fingerprint());
        assert_eq!(Value::from(a), Value::String("echo a".into()));
    }
}
