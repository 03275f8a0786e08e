// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bootstrap Script Composer
//!
//! Builds instance startup scripts from a common prefix and a role template
//! whose placeholders are bound to deferred values.
//!
//! ```text
//! prefix ─┐
//!         ├─ compose ──▶ Deferred<RenderedScript> ──▶ instance user_data
//! template┤                    ▲
//! bindings┘   {DATABASE_HOST} ─┘ database.private_ip()
//! ```

pub mod compose;
pub mod readiness;
pub mod template;

pub use compose::{compose, Bindings, RenderedScript};
pub use readiness::{ProbeTarget, ReadinessGate};
pub use template::{escape_double_quoted, PlaceholderName, ScriptTemplate};
