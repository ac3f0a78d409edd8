//! Replay a scripted sequence of hub telemetry and commands against one shade
//!
//! Usage: `shade_replay <config.json> <script.jsonl> [shade-id]`
//!
//! Each script line is either `{"telemetry": {...}}` or `{"command": ...}`.
//! Emitted attribute events and hub requests are printed as JSON lines.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use shadelink_powerview::{spawn_shade, ChannelHub, ShadeCommand, ShadeConfig, ShadeId, ShadeTelemetry};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ScriptStep {
    Telemetry(ShadeTelemetry),
    Command(ShadeCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <config.json> <script.jsonl> [shade-id]", args[0]);
    }

    let config_text = std::fs::read_to_string(&args[1])
        .with_context(|| format!("failed to read config {}", args[1]))?;
    let config = ShadeConfig::from_json(&config_text).context("invalid shade config")?;

    let script = std::fs::read_to_string(&args[2])
        .with_context(|| format!("failed to read script {}", args[2]))?;

    let shade_id = match args.get(3) {
        Some(raw) => ShadeId(raw.parse().with_context(|| format!("invalid shade id {}", raw))?),
        None => ShadeId(1),
    };

    let (hub, mut hub_rx) = ChannelHub::new();
    let shade = spawn_shade(shade_id, config, hub, None);
    let mut events = shade.subscribe();
    tracing::info!("Replaying {} against shade {}", args[2], shade_id);

    for (index, line) in script.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid script step", index + 1))?;

        let result = match step {
            ScriptStep::Telemetry(telemetry) => shade.handle_telemetry(telemetry).await.map(|_| ()),
            ScriptStep::Command(command) => shade.execute(command).await,
        };
        if let Err(e) = result {
            tracing::warn!("line {}: {}", index + 1, e);
        }

        while let Ok(event) = events.try_recv() {
            println!("{}", json!({ "line": index + 1, "event": event }));
        }
        while let Ok(request) = hub_rx.try_recv() {
            println!("{}", json!({ "line": index + 1, "hub": request }));
        }
    }

    let snapshot = shade.snapshot().await?;
    tracing::info!(
        "Final capabilities: {}",
        snapshot
            .capabilities
            .map_or_else(|| "not reported".to_string(), |c| c.to_string())
    );
    println!("{}", json!({ "attributes": shade.attributes().await? }));

    Ok(())
}
