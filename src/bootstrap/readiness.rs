// Copyright (c) 2025 - Cowboy AI, Inc.
//! Readiness Gates
//!
//! Instance creation completing says nothing about the services inside the
//! instance. A gate is the script fragment a dependent instance runs before
//! it starts using its peers.
//!
//! - [`ReadinessGate::PortProbe`] polls each peer port with `nc -z` until it
//!   answers or a deadline passes, then continues with a warning on stderr.
//! - [`ReadinessGate::FixedDelay`] sleeps for a fixed duration. Best effort
//!   only: a slow peer is not detected.
//!
//! Neither gate fails the instance. A peer that never becomes ready shows up
//! as a connection failure inside the guest.

use std::time::Duration;

use super::template::PlaceholderName;

/// Seconds between probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// A peer endpoint to wait for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Placeholder bound to the peer's address
    pub host: PlaceholderName,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: PlaceholderName, port: u16) -> Self {
        Self { host, port }
    }
}

/// How a bootstrap script waits for its peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessGate {
    /// Poll peer ports until they accept connections or `timeout` passes
    PortProbe {
        targets: Vec<ProbeTarget>,
        timeout: Duration,
        interval: Duration,
    },
    /// Sleep unconditionally
    FixedDelay(Duration),
}

impl ReadinessGate {
    pub fn port_probe(targets: Vec<ProbeTarget>, timeout: Duration) -> Self {
        ReadinessGate::PortProbe {
            targets,
            timeout,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Template fragment for this gate
    ///
    /// Probe hosts appear as placeholders, so the fragment must be composed
    /// with the same bindings as the rest of the template.
    pub fn render(&self) -> String {
        match self {
            ReadinessGate::FixedDelay(delay) => format!(
                "# Fixed wait for peers (best effort)\nsleep {}\n",
                delay.as_secs()
            ),
            ReadinessGate::PortProbe {
                targets,
                timeout,
                interval,
            } => {
                let mut out = format!(
                    "# Wait for peers to accept connections\n\
                     deadline=$(( $(date +%s) + {} ))\n",
                    timeout.as_secs()
                );
                for target in targets {
                    out.push_str(&probe_loop(target, *timeout, *interval));
                }
                out
            }
        }
    }

    /// Placeholders the fragment uses
    pub fn placeholders(&self) -> Vec<&PlaceholderName> {
        match self {
            ReadinessGate::PortProbe { targets, .. } => targets.iter().map(|t| &t.host).collect(),
            ReadinessGate::FixedDelay(_) => Vec::new(),
        }
    }
}

fn probe_loop(target: &ProbeTarget, timeout: Duration, interval: Duration) -> String {
    let host = &target.host;
    let port = target.port;
    format!(
        "until nc -z \"{{{host}}}\" {port}; do\n\
         \x20 if [ \"$(date +%s)\" -ge \"$deadline\" ]; then\n\
         \x20   echo \"WARNING: {{{host}}}:{port} not reachable after {}s, continuing\" >&2\n\
         \x20   break\n\
         \x20 fi\n\
         \x20 sleep {}\n\
         done\n",
        timeout.as_secs(),
        interval.as_secs().max(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::ScriptTemplate;

    fn host(name: &str) -> PlaceholderName {
        PlaceholderName::new(name).unwrap()
    }

    #[test]
    fn test_fixed_delay() {
        let gate = ReadinessGate::FixedDelay(Duration::from_secs(180));
        assert!(gate.render().contains("sleep 180\n"));
        assert!(gate.placeholders().is_empty());
    }

    #[test]
    fn test_port_check_uses_placeholders() {
        let gate = ReadinessGate::port_probe(
            vec![
                ProbeTarget::new(host("DATABASE_HOST"), 5432),
                ProbeTarget::new(host("MESSAGING_HOST"), 5672),
            ],
            Duration::from_secs(600),
        );
        let text = gate.render();
        assert!(text.contains("until nc -z \"{DATABASE_HOST}\" 5432; do"));
        assert!(text.contains("+ 600 ))"));

        let template = ScriptTemplate::parse(text).unwrap();
        let placeholders = template.placeholders();
        let names: Vec<&str> = placeholders.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["DATABASE_HOST", "MESSAGING_HOST"]);
    }
}
