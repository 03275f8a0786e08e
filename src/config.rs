// Copyright (c) 2025 - Cowboy AI, Inc.

//! Stack configuration
//!
//! Everything the e-commerce stack declaration needs that is not part of
//! its fixed topology. Defaults reproduce the reference deployment; the
//! SMTP credentials have no default and must come from the environment.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::resolver::materialize::DEFAULT_MAX_PARALLEL;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// How dependent instances wait for their peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessMode {
    /// Probe peer ports with a deadline
    Probe,
    /// Sleep for the configured duration
    FixedDelay,
}

/// Stack configuration
#[derive(Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Prefix of every resource name
    pub stack_name: String,
    /// Region the availability zones belong to; zones default to its `a`
    /// and `b` zones and must be named after it
    pub region: String,
    /// First zone hosts subnets 1, second zone subnets 2
    pub availability_zones: [String; 2],
    pub ami_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub git_repo_url: Url,
    pub smtp_user: String,
    pub smtp_password: String,
    /// `Environment` tag
    pub environment: String,
    /// `Project` tag
    pub project: String,
    /// Publish provisioning events here when set
    pub nats_url: Option<String>,
    pub max_parallel: usize,
    pub readiness: ReadinessMode,
    /// Readiness budget of the microservices instance
    pub microservices_wait: Duration,
    /// Readiness budget of the nginx instance
    pub nginx_wait: Duration,
}

impl StackConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::Missing(key.to_string()))
        };

        let region = text("AWS_REGION", "ap-southeast-1");
        let zones_raw = lookup("AVAILABILITY_ZONES")
            .unwrap_or_else(|| format!("{region}a,{region}b"));
        let zones: Vec<String> = zones_raw
            .split(',')
            .map(str::trim)
            .filter(|z| !z.is_empty())
            .map(str::to_string)
            .collect();
        let availability_zones: [String; 2] = zones
            .try_into()
            .map_err(|_| invalid("AVAILABILITY_ZONES", "exactly two zones are required"))?;
        for zone in &availability_zones {
            if !in_region(zone, &region) {
                return Err(invalid(
                    "AVAILABILITY_ZONES",
                    format!("{} is not a zone of {}", zone, region),
                ));
            }
        }

        let repo = text(
            "GIT_REPO_URL",
            "https://github.com/AhnafNabil/E-commerce-Microservices-AWS.git",
        );
        let git_repo_url = Url::parse(&repo).map_err(|e| invalid("GIT_REPO_URL", e.to_string()))?;

        let readiness = match text("READINESS_GATE", "probe").as_str() {
            "probe" => ReadinessMode::Probe,
            "fixed" => ReadinessMode::FixedDelay,
            other => {
                return Err(invalid(
                    "READINESS_GATE",
                    format!("{:?} is not probe or fixed", other),
                ))
            }
        };

        Ok(Self {
            stack_name: text("STACK_NAME", "ecommerce"),
            region,
            availability_zones,
            ami_id: text("AMI_ID", "ami-0de6806735058f3dc"),
            instance_type: text("INSTANCE_TYPE", "t2.micro"),
            key_name: text("KEY_NAME", "EcommerceKeyPair"),
            git_repo_url,
            smtp_user: required("SMTP_USER")?,
            smtp_password: required("SMTP_PASSWORD")?,
            environment: text("ENVIRONMENT", "Testing"),
            project: text("PROJECT", "EcommerceMicroservices"),
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            max_parallel: parse(&lookup, "MAX_PARALLEL", DEFAULT_MAX_PARALLEL)?.max(1),
            readiness,
            microservices_wait: Duration::from_secs(parse(&lookup, "MICROSERVICES_WAIT_SECS", 180)?),
            nginx_wait: Duration::from_secs(parse(&lookup, "NGINX_WAIT_SECS", 240)?),
        })
    }
}

impl fmt::Debug for StackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackConfig")
            .field("stack_name", &self.stack_name)
            .field("region", &self.region)
            .field("availability_zones", &self.availability_zones)
            .field("ami_id", &self.ami_id)
            .field("instance_type", &self.instance_type)
            .field("key_name", &self.key_name)
            .field("git_repo_url", &self.git_repo_url.as_str())
            .field("smtp_user", &self.smtp_user)
            .field("smtp_password", &"***")
            .field("environment", &self.environment)
            .field("project", &self.project)
            .field("nats_url", &self.nats_url)
            .field("max_parallel", &self.max_parallel)
            .field("readiness", &self.readiness)
            .field("microservices_wait", &self.microservices_wait)
            .field("nginx_wait", &self.nginx_wait)
            .finish()
    }
}

/// Zone names are the region name followed by one lowercase letter
fn in_region(zone: &str, region: &str) -> bool {
    zone.strip_prefix(region)
        .is_some_and(|suffix| suffix.len() == 1 && suffix.chars().all(|c| c.is_ascii_lowercase()))
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn with_smtp(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs = vec![("SMTP_USER", "mailer"), ("SMTP_PASSWORD", "s3cret")];
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = StackConfig::from_lookup(lookup(&with_smtp(&[]))).unwrap();
        assert_eq!(config.stack_name, "ecommerce");
        assert_eq!(config.region, "ap-southeast-1");
        assert_eq!(config.availability_zones[1], "ap-southeast-1b");
        assert_eq!(config.ami_id, "ami-0de6806735058f3dc");
        assert_eq!(config.key_name, "EcommerceKeyPair");
        assert_eq!(config.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(config.readiness, ReadinessMode::Probe);
        assert_eq!(config.nginx_wait, Duration::from_secs(240));
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_smtp_credentials_required() {
        assert_eq!(
            StackConfig::from_lookup(lookup(&[("SMTP_USER", "mailer")])),
            Err(ConfigError::Missing("SMTP_PASSWORD".into()))
        );
    }

    #[test]
    fn test_invalid_values() {
        for pair in [
            ("AVAILABILITY_ZONES", "only-one"),
            ("GIT_REPO_URL", "not a url"),
            ("READINESS_GATE", "hope"),
            ("MAX_PARALLEL", "many"),
        ] {
            let result = StackConfig::from_lookup(lookup(&with_smtp(&[pair])));
            assert!(
                matches!(result, Err(ConfigError::Invalid { ref key, .. }) if key == pair.0),
                "{:?}",
                pair
            );
        }
    }

    #[test]
    fn test_zones_follow_region() {
        let config =
            StackConfig::from_lookup(lookup(&with_smtp(&[("AWS_REGION", "eu-west-1")]))).unwrap();
        assert_eq!(config.availability_zones, ["eu-west-1a", "eu-west-1b"]);

        let result = StackConfig::from_lookup(lookup(&with_smtp(&[
            ("AWS_REGION", "eu-west-1"),
            ("AVAILABILITY_ZONES", "eu-west-1a,us-east-1b"),
        ])));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { ref key, ref reason })
                if key == "AVAILABILITY_ZONES" && reason.contains("us-east-1b")
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = StackConfig::from_lookup(lookup(&with_smtp(&[]))).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
