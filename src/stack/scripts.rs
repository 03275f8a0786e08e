// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bootstrap scripts of the e-commerce stack
//!
//! Every instance runs the common prefix (packages, container runtime, swap,
//! source checkout) followed by its role template. Role templates end by
//! running `deploy.sh <role>` from the checked out repository.

use std::collections::BTreeMap;
use url::Url;

use crate::bootstrap::{PlaceholderName, ProbeTarget, ReadinessGate, ScriptTemplate};
use crate::config::{ReadinessMode, StackConfig};
use crate::domain::Role;
use crate::errors::BootstrapError;

/// Shared prefix; `{GIT_REPO_URL}` is rendered at declaration time
pub const COMMON_PREFIX: &str = r#"#!/bin/bash
# Update system and install dependencies
apt-get update -y
apt-get install -y docker.io git curl netcat-openbsd jq awscli

# Setup Docker
systemctl start docker
systemctl enable docker
usermod -aG docker ubuntu

# Install Docker Compose
curl -L "https://github.com/docker/compose/releases/latest/download/docker-compose-$(uname -s)-$(uname -m)" -o /usr/local/bin/docker-compose
chmod +x /usr/local/bin/docker-compose

# Setup swap space for small instances
sudo mkdir -p /swap && cd /swap || exit
sudo fallocate -l 1G /swapfile
sudo chmod 600 /swapfile
sudo mkswap /swapfile
sudo swapon /swapfile
echo '/swapfile none swap sw defaults 0 0' | sudo tee -a /etc/fstab

# Clone repository
cd /home/ubuntu
git clone "{GIT_REPO_URL}" ecommerce
chown -R ubuntu:ubuntu /home/ubuntu/ecommerce
"#;

const MICROSERVICES_ENV: &str = r#"
# Export essential environment variables
export DATABASE_HOST="{DATABASE_HOST}"
export MESSAGING_HOST="{MESSAGING_HOST}"
export SMTP_USER="{SMTP_USER}"
export SMTP_PASSWORD="{SMTP_PASSWORD}"

echo "DATABASE_HOST set to: $DATABASE_HOST"
echo "MESSAGING_HOST set to: $MESSAGING_HOST"
echo "SMTP_USER set to: $SMTP_USER"

# Add database and messaging hosts to /etc/hosts
echo "{DATABASE_HOST} database-host" | tee -a /etc/hosts
echo "{MESSAGING_HOST} messaging-host" | tee -a /etc/hosts

# Persist the environment for later sessions
declare -p DATABASE_HOST MESSAGING_HOST SMTP_USER SMTP_PASSWORD | sed 's/^declare -x/export/' > /home/ubuntu/service_ips.env
chown ubuntu:ubuntu /home/ubuntu/service_ips.env

"#;

const NGINX_ENV: &str = r#"
# Export microservices host for nginx configuration
export MICROSERVICES_HOST="{MICROSERVICES_HOST}"

echo "MICROSERVICES_HOST set to: $MICROSERVICES_HOST"

# Add microservices host to /etc/hosts
echo "{MICROSERVICES_HOST} microservices-host" | tee -a /etc/hosts

"#;

/// Ports probed before the microservices start
const DATA_PORTS: [u16; 2] = [5432, 27017];
const MESSAGING_PORTS: [u16; 2] = [5672, 9092];
/// Port probed before nginx starts
const GATEWAY_PORT: u16 = 8000;

/// Render the common prefix for `repo`
pub fn common_prefix(repo: &Url) -> Result<String, BootstrapError> {
    let values = BTreeMap::from([(
        PlaceholderName::new("GIT_REPO_URL")?,
        repo.as_str().to_string(),
    )]);
    ScriptTemplate::parse(COMMON_PREFIX)?.render(&values)
}

fn deploy_step(role: Role, env: &[&str]) -> String {
    let label = role.as_str();
    let mut sudo = String::from("sudo -u ubuntu");
    if !env.is_empty() {
        sudo.push_str(" -E");
        for name in env {
            sudo.push_str(&format!(" {}=\"{{{}}}\"", name, name));
        }
    }
    format!(
        "# Run {label} setup\n\
         cd /home/ubuntu/ecommerce/deploy/aws\n\
         chmod +x deploy.sh\n\
         chmod +x scripts/*.sh\n\
         {sudo} bash deploy.sh {label}\n"
    )
}

/// Readiness gate of a dependent role
pub fn readiness_gate(
    config: &StackConfig,
    role: Role,
) -> Result<Option<ReadinessGate>, BootstrapError> {
    let (wait, targets) = match role {
        Role::Microservices => {
            let database = PlaceholderName::new("DATABASE_HOST")?;
            let messaging = PlaceholderName::new("MESSAGING_HOST")?;
            let targets = DATA_PORTS
                .iter()
                .map(|&port| ProbeTarget::new(database.clone(), port))
                .chain(
                    MESSAGING_PORTS
                        .iter()
                        .map(|&port| ProbeTarget::new(messaging.clone(), port)),
                )
                .collect();
            (config.microservices_wait, targets)
        }
        Role::Nginx => (
            config.nginx_wait,
            vec![ProbeTarget::new(
                PlaceholderName::new("MICROSERVICES_HOST")?,
                GATEWAY_PORT,
            )],
        ),
        Role::Database | Role::Messaging => return Ok(None),
    };

    Ok(Some(match config.readiness {
        ReadinessMode::Probe => ReadinessGate::port_probe(targets, wait),
        ReadinessMode::FixedDelay => ReadinessGate::FixedDelay(wait),
    }))
}

/// Role template for `role`
pub fn role_template(config: &StackConfig, role: Role) -> Result<ScriptTemplate, BootstrapError> {
    let gate = readiness_gate(config, role)?
        .map(|gate| gate.render())
        .unwrap_or_default();

    let source = match role {
        Role::Database | Role::Messaging => {
            let title = if role == Role::Database {
                "Database"
            } else {
                "Messaging"
            };
            format!(
                "\n# Output private IP for debugging\n\
                 echo \"{title} instance private IP: $(hostname -I | awk '{{print $1}}')\"\n\n{}",
                deploy_step(role, &[])
            )
        }
        Role::Microservices => format!(
            "{}{}\n{}",
            MICROSERVICES_ENV,
            gate,
            deploy_step(
                role,
                &["DATABASE_HOST", "MESSAGING_HOST", "SMTP_USER", "SMTP_PASSWORD"]
            )
        ),
        Role::Nginx => format!(
            "{}{}\n{}",
            NGINX_ENV,
            gate,
            deploy_step(role, &["MICROSERVICES_HOST"])
        ),
    };

    ScriptTemplate::parse(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(readiness: &str) -> StackConfig {
        let readiness = readiness.to_string();
        StackConfig::from_lookup(move |key| match key {
            "SMTP_USER" => Some("mailer".into()),
            "SMTP_PASSWORD" => Some("s3cret".into()),
            "READINESS_GATE" => Some(readiness.clone()),
            _ => None,
        })
        .unwrap()
    }

    fn names(template: &ScriptTemplate) -> Vec<String> {
        template
            .placeholders()
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    #[test]
    fn test_prefix_renders_repository() {
        let url = Url::parse("https://example.com/shop.git").unwrap();
        let prefix = common_prefix(&url).unwrap();
        assert!(prefix.starts_with("#!/bin/bash\n"));
        assert!(prefix.contains("git clone \"https://example.com/shop.git\" ecommerce"));
        assert!(prefix.contains("docker-compose-$(uname -s)-$(uname -m)"));
    }

    #[test]
    fn test_data_templates_have_no_placeholders() {
        let cfg = config("probe");
        let template = role_template(&cfg, Role::Database).unwrap();
        assert!(names(&template).is_empty());
        assert!(template.source().contains("awk '{print $1}'"));
        assert!(template.source().ends_with("sudo -u ubuntu bash deploy.sh database\n"));
    }

    #[test]
    fn test_microservices_template() {
        let template = role_template(&config("probe"), Role::Microservices).unwrap();
        assert_eq!(
            names(&template),
            vec!["DATABASE_HOST", "MESSAGING_HOST", "SMTP_PASSWORD", "SMTP_USER"]
        );
        assert!(template.source().contains("until nc -z \"{DATABASE_HOST}\" 5432; do"));
        assert!(template
            .source()
            .contains("sudo -u ubuntu -E DATABASE_HOST=\"{DATABASE_HOST}\""));
        assert!(!template.source().contains("sleep 180"));
    }

    #[test]
    fn test_fixed_delay_mode() {
        let template = role_template(&config("fixed"), Role::Nginx).unwrap();
        assert!(template.source().contains("sleep 240\n"));
        assert_eq!(names(&template), vec!["MICROSERVICES_HOST"]);
    }
}
