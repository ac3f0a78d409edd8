//! Per-shade worker task
//!
//! Each shade's device runs on its own task and is reached only through a
//! request channel, so its snapshot is never mutated concurrently even when
//! many shades are driven in parallel.

use crate::commands::ShadeCommand;
use crate::config::ShadeConfig;
use crate::device::ShadeDevice;
use crate::error::{ShadeError, ShadeResult};
use crate::events::{ShadeAttributes, ShadeEvent, DEFAULT_EVENT_BUFFER_SIZE};
use crate::hub::ShadeHub;
use crate::state::{ShadeId, ShadeSnapshot};
use crate::telemetry::ShadeTelemetry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

const REQUEST_QUEUE_DEPTH: usize = 32;

#[derive(Debug)]
enum ShadeRequest {
    Telemetry(Box<ShadeTelemetry>, oneshot::Sender<ShadeResult<Vec<ShadeEvent>>>),
    Command(ShadeCommand, oneshot::Sender<ShadeResult<()>>),
    Updated(ShadeConfig, oneshot::Sender<()>),
    GetSnapshot(oneshot::Sender<ShadeSnapshot>),
    GetAttributes(oneshot::Sender<ShadeAttributes>),
}

/// Clonable handle to a running shade worker
#[derive(Debug, Clone)]
pub struct ShadeHandle {
    id: ShadeId,
    sender: mpsc::Sender<ShadeRequest>,
    events: broadcast::Sender<ShadeEvent>,
    /// Reply timeout in milliseconds, shared by every clone of the handle
    reply_timeout_ms: Arc<AtomicU64>,
}

/// Start a worker task for one shade. Must be called inside a tokio runtime.
pub fn spawn_shade<H>(
    id: ShadeId,
    config: ShadeConfig,
    hub: H,
    snapshot: Option<ShadeSnapshot>,
) -> ShadeHandle
where
    H: ShadeHub + 'static,
{
    let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (events, _) = broadcast::channel(DEFAULT_EVENT_BUFFER_SIZE);
    let reply_timeout_ms = Arc::new(AtomicU64::new(config.reply_timeout.as_millis() as u64));

    let mut device = ShadeDevice::new(id, config, hub, events.clone());
    if let Some(snapshot) = snapshot {
        device = device.with_snapshot(snapshot);
    }

    tokio::spawn(async move {
        let mut attributes = ShadeAttributes::default();

        while let Some(request) = rx.recv().await {
            match request {
                ShadeRequest::Telemetry(telemetry, reply) => {
                    let result = device.handle_telemetry(&telemetry);
                    // Events reach the bus before a forced poll can fail
                    match &result {
                        Ok(events) => attributes.apply_all(events),
                        Err(e) => attributes.apply_all(e.emitted_events()),
                    }
                    let _ = reply.send(result);
                }
                ShadeRequest::Command(command, reply) => {
                    let _ = reply.send(device.execute(command));
                }
                ShadeRequest::Updated(config, reply) => {
                    device.updated(config);
                    let _ = reply.send(());
                }
                ShadeRequest::GetSnapshot(reply) => {
                    let _ = reply.send(device.snapshot().clone());
                }
                ShadeRequest::GetAttributes(reply) => {
                    let _ = reply.send(attributes.clone());
                }
            }
        }

        debug!("Shade {}: worker stopped", id);
    });

    ShadeHandle {
        id,
        sender: tx,
        events,
        reply_timeout_ms,
    }
}

impl ShadeHandle {
    pub fn id(&self) -> ShadeId {
        self.id
    }

    /// Timeout applied to each request sent to the worker
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms.load(Ordering::Relaxed))
    }

    /// Subscribe to the attribute events this shade emits
    pub fn subscribe(&self) -> broadcast::Receiver<ShadeEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        operation: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> ShadeRequest,
    ) -> ShadeResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ShadeError::worker_stopped(operation))?;

        let reply_timeout = self.reply_timeout();
        match tokio::time::timeout(reply_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_recv_err)) => Err(ShadeError::worker_stopped(operation)),
            Err(_elapsed) => Err(ShadeError::timeout(
                operation,
                reply_timeout.as_millis() as u64,
            )),
        }
    }

    pub async fn handle_telemetry(&self, telemetry: ShadeTelemetry) -> ShadeResult<Vec<ShadeEvent>> {
        self.request("handle_telemetry", |tx| {
            ShadeRequest::Telemetry(Box::new(telemetry), tx)
        })
        .await?
    }

    pub async fn execute(&self, command: ShadeCommand) -> ShadeResult<()> {
        self.request(command.as_str(), |tx| ShadeRequest::Command(command, tx))
            .await?
    }

    pub async fn open(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Open).await
    }

    pub async fn close(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Close).await
    }

    pub async fn set_position(&self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetPosition(position)).await
    }

    pub async fn set_level(&self, level: i32) -> ShadeResult<()> {
        self.set_position(level).await
    }

    pub async fn set_bottom_position(&self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetBottomPosition(position)).await
    }

    pub async fn set_top_position(&self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetTopPosition(position)).await
    }

    pub async fn preset_position(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::PresetPosition).await
    }

    pub async fn calibrate(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Calibrate).await
    }

    pub async fn jog(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Jog).await
    }

    pub async fn refresh(&self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Refresh).await
    }

    /// Apply saved preferences. The new reply timeout takes effect for every
    /// clone of this handle once the worker has accepted the update.
    pub async fn updated(&self, config: ShadeConfig) -> ShadeResult<()> {
        let reply_timeout_ms = config.reply_timeout.as_millis() as u64;
        self.request("updated", |tx| ShadeRequest::Updated(config, tx)).await?;
        self.reply_timeout_ms.store(reply_timeout_ms, Ordering::Relaxed);
        Ok(())
    }

    pub async fn snapshot(&self) -> ShadeResult<ShadeSnapshot> {
        self.request("snapshot", ShadeRequest::GetSnapshot).await
    }

    /// Latest attribute values emitted by this shade
    pub async fn attributes(&self) -> ShadeResult<ShadeAttributes> {
        self.request("attributes", ShadeRequest::GetAttributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{ChannelHub, HubRequest, PositionRequest};
    use crate::state::{ShadeCapabilities, WindowShadeState};

    #[tokio::test]
    async fn test_worker_applies_telemetry_and_tracks_attributes() {
        let (hub, _hub_rx) = ChannelHub::new();
        let shade = spawn_shade(ShadeId(9), ShadeConfig::default(), hub, None);
        let mut events = shade.subscribe();

        let telemetry = ShadeTelemetry::from_json(
            r#"{"id": 9, "capabilities": 7, "batteryStrength": 255,
                "positions": {"posKind1": 1, "position1": 65535, "posKind2": 2, "position2": 32768}}"#,
        )
        .unwrap();
        let emitted = shade.handle_telemetry(telemetry).await.unwrap();
        assert_eq!(emitted.len(), 7);
        assert_eq!(events.recv().await.unwrap(), ShadeEvent::BottomPosition(100));

        let attributes = shade.attributes().await.unwrap();
        assert_eq!(attributes.bottom_position, Some(100));
        assert_eq!(attributes.top_position, Some(50));
        assert_eq!(attributes.level, Some(50));
        assert_eq!(attributes.window_shade_state, Some(WindowShadeState::PartiallyOpen));
        assert_eq!(attributes.battery, Some(100));

        let snapshot = shade.snapshot().await.unwrap();
        assert_eq!(snapshot.capabilities, Some(ShadeCapabilities::TopDownBottomUp));
    }

    #[tokio::test]
    async fn test_worker_routes_commands() {
        let (hub, mut hub_rx) = ChannelHub::new();
        let snapshot = ShadeSnapshot {
            capabilities: Some(ShadeCapabilities::Standard),
            ..Default::default()
        };
        let shade = spawn_shade(ShadeId(2), ShadeConfig::default(), hub, Some(snapshot));

        shade.open().await.unwrap();
        shade.set_top_position(150).await.unwrap();

        assert_eq!(
            hub_rx.recv().await.unwrap(),
            HubRequest::SetPosition { shade: ShadeId(2), request: PositionRequest::unified(100) }
        );
        assert_eq!(
            hub_rx.recv().await.unwrap(),
            HubRequest::SetPosition { shade: ShadeId(2), request: PositionRequest::top(100) }
        );
    }

    #[tokio::test]
    async fn test_updated_config_changes_dual_rail_open() {
        let (hub, mut hub_rx) = ChannelHub::new();
        let shade = spawn_shade(ShadeId(4), ShadeConfig::default(), hub, None);

        shade
            .updated(ShadeConfig::default().with_open_top_by_default(true))
            .await
            .unwrap();
        shade.open().await.unwrap();

        assert_eq!(
            hub_rx.recv().await.unwrap(),
            HubRequest::SetPosition { shade: ShadeId(4), request: PositionRequest::rails(0, 100) }
        );
    }

    #[tokio::test]
    async fn test_hub_error_reaches_caller() {
        let (hub, hub_rx) = ChannelHub::new();
        drop(hub_rx);
        let shade = spawn_shade(ShadeId(1), ShadeConfig::default(), hub, None);

        let result = shade.jog().await;
        assert!(matches!(result, Err(ShadeError::HubUnavailable(_))));
    }

    #[tokio::test]
    async fn test_rejected_repoll_still_updates_attributes() {
        let (hub, hub_rx) = ChannelHub::new();
        drop(hub_rx);
        let shade = spawn_shade(ShadeId(3), ShadeConfig::default(), hub, None);
        let mut events = shade.subscribe();

        let telemetry = ShadeTelemetry::from_json(r#"{"id": 3, "batteryStrength": 255}"#).unwrap();
        let err = shade.handle_telemetry(telemetry).await.unwrap_err();
        assert!(matches!(err, ShadeError::RepollFailed { .. }));
        assert_eq!(events.recv().await.unwrap(), ShadeEvent::Battery(100));

        let attributes = shade.attributes().await.unwrap();
        assert_eq!(attributes.battery, Some(100));
        let snapshot = shade.snapshot().await.unwrap();
        assert_eq!(snapshot.last_poll_retry_at, None);
    }

    #[tokio::test]
    async fn test_updated_reply_timeout_reaches_every_clone() {
        let (hub, _hub_rx) = ChannelHub::new();
        let shade = spawn_shade(ShadeId(6), ShadeConfig::default(), hub, None);
        let clone = shade.clone();
        assert_eq!(clone.reply_timeout(), ShadeConfig::default().reply_timeout);

        let config = ShadeConfig {
            reply_timeout: Duration::from_millis(750),
            ..Default::default()
        };
        shade.updated(config).await.unwrap();

        assert_eq!(shade.reply_timeout(), Duration::from_millis(750));
        assert_eq!(clone.reply_timeout(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_concurrent_handles_serialize_access() {
        let (hub, mut hub_rx) = ChannelHub::new();
        let shade = spawn_shade(ShadeId(8), ShadeConfig::default(), hub, None);

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handle = shade.clone();
            tasks.push(tokio::spawn(async move {
                handle.handle_telemetry(ShadeTelemetry::default()).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Only the first missing-position report inside the window polls
        assert_eq!(
            hub_rx.recv().await.unwrap(),
            HubRequest::Poll { shade: ShadeId(8), force: true }
        );
        assert!(hub_rx.try_recv().is_err());
    }
}
