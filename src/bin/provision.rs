// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Provisioning CLI
//!
//! Declares the e-commerce stack from the environment and either prints its
//! materialization plan or materializes it against the in-memory provider.
//!
//! Run with:
//!   cargo run --bin provision -- plan
//!   cargo run --bin provision -- simulate
//!   cargo run --bin provision -- settings
//!
//! Configuration comes from the environment (see `StackConfig::from_env`).
//! `SMTP_USER` and `SMTP_PASSWORD` are required. When `NATS_URL` is set,
//! provisioning events are published there. When `STATE_OUT` is set, the
//! resulting stack state is written to that path as JSON.

use anyhow::{bail, Context, Result};
use stack_provision::{
    config::StackConfig,
    events::{EventSink, NatsEventSink, NullSink},
    nats::{NatsClient, NatsConfig},
    provider::InMemoryProvider,
    resolver::{Materializer, Resolver},
    settings::ServiceSettings,
    stack,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plan,
    Simulate,
    Settings,
}

impl Mode {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("simulate") => Ok(Mode::Simulate),
            Some("plan") => Ok(Mode::Plan),
            Some("settings") => Ok(Mode::Settings),
            Some(other) => bail!("Unknown mode {:?}, expected plan, simulate or settings", other),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let arg = std::env::args().nth(1);
    let mode = Mode::parse(arg.as_deref())?;

    if mode == Mode::Settings {
        let settings = ServiceSettings::from_env().context("Failed to load service settings")?;
        println!("{:#?}", settings);
        return Ok(());
    }

    let config = StackConfig::from_env().context("Failed to load stack configuration")?;
    info!("Configuration loaded:");
    info!("  - Stack: {}", config.stack_name);
    info!("  - Region: {}", config.region);
    info!("  - Zones: {}", config.availability_zones.join(", "));
    info!("  - Repository: {}", config.git_repo_url);

    let mut resolver = Resolver::new(config.stack_name.as_str());
    stack::declare(&config, &mut resolver).context("Failed to declare stack")?;

    let plan = resolver.plan().context("Failed to plan stack")?;
    if mode == Mode::Plan {
        for (depth, wave) in plan.waves.iter().enumerate() {
            let names: Vec<&str> = wave.iter().map(|entity| entity.name()).collect();
            println!("wave {}: {}", depth, names.join(", "));
        }
        return Ok(());
    }

    let nats_sink = match &config.nats_url {
        Some(url) => match NatsClient::new(NatsConfig::for_url(url.as_str())).await {
            Ok(client) => {
                info!("Publishing provisioning events to {}", url);
                Some(NatsEventSink::new(client))
            }
            Err(e) => {
                warn!("NATS unavailable at {}, events will not be published: {}", url, e);
                None
            }
        },
        None => None,
    };
    let sink: &dyn EventSink = match &nats_sink {
        Some(sink) => sink,
        None => &NullSink,
    };

    let provider = InMemoryProvider::new();
    let report = Materializer::new(&resolver, &provider)
        .with_sink(sink)
        .with_max_parallel(config.max_parallel)
        .run()
        .await
        .context("Materialization failed")?;
    info!(
        "Materialized {} resources with {} provider calls",
        report.order.len(),
        provider.calls().len()
    );

    if let Ok(path) = std::env::var("STATE_OUT") {
        let state = serde_json::to_string_pretty(&report.state)?;
        std::fs::write(&path, state).with_context(|| format!("Failed to write {}", path))?;
        info!("Stack state written to {}", path);
    }

    println!("{}", serde_json::to_string_pretty(&report.outputs)?);
    Ok(())
}
