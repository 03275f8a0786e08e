// Copyright (c) 2025 - Cowboy AI, Inc.
//! Script Templates
//!
//! A template is shell text with `{NAME}` placeholders. Only identifiers in
//! single braces are placeholders:
//!
//! ```text
//! export DATABASE_HOST="{DATABASE_HOST}"   placeholder
//! echo "$DATABASE_HOST" / "${DATABASE_HOST}"  shell expansion, literal
//! awk '{print $1}'                          literal
//! ```
//!
//! Placeholders are expected inside double quotes; substituted values are
//! escaped for that context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::errors::BootstrapError;

const PLACEHOLDER_PATTERN: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Validated placeholder identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlaceholderName(String);

impl PlaceholderName {
    pub fn new(name: impl Into<String>) -> Result<Self, BootstrapError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
            && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
        if !valid {
            return Err(BootstrapError::InvalidPlaceholder(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlaceholderName {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PlaceholderName {
    type Error = BootstrapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlaceholderName> for String {
    fn from(name: PlaceholderName) -> Self {
        name.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(PlaceholderName),
}

/// Parsed script template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl ScriptTemplate {
    /// Split `source` into literal text and placeholders
    pub fn parse(source: impl Into<String>) -> Result<Self, BootstrapError> {
        let source = source.into();
        let pattern =
            Regex::new(PLACEHOLDER_PATTERN).map_err(|e| BootstrapError::Pattern(e.to_string()))?;

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut cursor = 0;
        for captures in pattern.captures_iter(&source) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            // `${NAME}` is a shell expansion
            if source[..whole.start()].ends_with('$') {
                continue;
            }
            literal.push_str(&source[cursor..whole.start()]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(PlaceholderName::new(name.as_str())?));
            cursor = whole.end();
        }
        literal.push_str(&source[cursor..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// Template text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholders in the template
    pub fn placeholders(&self) -> BTreeSet<&PlaceholderName> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder with its escaped value
    pub fn render(
        &self,
        values: &BTreeMap<PlaceholderName, String>,
    ) -> Result<String, BootstrapError> {
        let placeholders = self.placeholders();
        if let Some(missing) = placeholders.into_iter().find(|p| !values.contains_key(*p)) {
            return Err(BootstrapError::Unbound(missing.to_string()));
        }
        Ok(self.substitute(values))
    }

    /// Substitution over a value map already known to cover every placeholder
    pub(crate) fn substitute(&self, values: &BTreeMap<PlaceholderName, String>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match values.get(name) {
                    Some(value) => out.push_str(&escape_double_quoted(value)),
                    None => {
                        out.push('{');
                        out.push_str(name.as_str());
                        out.push('}');
                    }
                },
            }
        }
        out
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "._:/@+=,%-".contains(c)
}

/// Escape a value for a double-quoted shell context
///
/// Values made only of shell-safe characters are returned unchanged.
pub fn escape_double_quoted(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_shell_safe) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<PlaceholderName, String> {
        pairs
            .iter()
            .map(|(k, v)| (PlaceholderName::new(*k).unwrap(), v.to_string()))
            .collect()
    }

    #[test_case("DATABASE_HOST", true)]
    #[test_case("_private", true)]
    #[test_case("host2", true)]
    #[test_case("2host", false)]
    #[test_case("", false)]
    #[test_case("with space", false)]
    fn test_placeholder_names(name: &str, valid: bool) {
        assert_eq!(PlaceholderName::new(name).is_ok(), valid);
    }

    #[test]
    fn test_shell_syntax_stays_literal() {
        let template = ScriptTemplate::parse(
            "echo \"${HOME} $(hostname -I | awk '{print $1}')\" {HOST} {not-a-name}",
        )
        .unwrap();
        let placeholders = template.placeholders();
        let names: Vec<&str> = placeholders.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["HOST"]);
    }

    #[test]
    fn test_render_every_occurrence() {
        let template =
            ScriptTemplate::parse("export A=\"{A}\"\necho \"{A} a-host\"\n").unwrap();
        let rendered = template.render(&values(&[("A", "10.0.3.55")])).unwrap();
        assert_eq!(rendered, "export A=\"10.0.3.55\"\necho \"10.0.3.55 a-host\"\n");
    }

    #[test]
    fn test_render_unbound_fails() {
        let template = ScriptTemplate::parse("{A} {B}").unwrap();
        assert_eq!(
            template.render(&values(&[("A", "x")])),
            Err(BootstrapError::Unbound("B".into()))
        );
    }

    #[test_case("10.0.3.55", "10.0.3.55")]
    #[test_case("https://github.com/org/repo.git", "https://github.com/org/repo.git")]
    #[test_case("pa$$word", "pa\\$\\$word")]
    #[test_case("say \"hi\"", "say \\\"hi\\\"")]
    #[test_case("`rm -rf /`", "\\`rm -rf /\\`")]
    #[test_case("back\\slash", "back\\\\slash")]
    fn test_escape_double_quoted(input: &str, expected: &str) {
        assert_eq!(escape_double_quoted(input), expected);
    }
}
