//! Shade device adapter
//!
//! Binds the telemetry normalizer and the command router to one shade's
//! snapshot, the parent hub and the host event sink.

use crate::commands::{route, HubAction, ShadeCommand};
use crate::config::ShadeConfig;
use crate::error::{ShadeError, ShadeResult};
use crate::events::{EventSink, ShadeEvent};
use crate::hub::ShadeHub;
use crate::logging::DebugLogging;
use crate::state::{ShadeId, ShadeSnapshot};
use crate::telemetry::{normalize, ShadeTelemetry};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

/// One logical shade on the host platform
pub struct ShadeDevice<H, S> {
    id: ShadeId,
    config: ShadeConfig,
    snapshot: ShadeSnapshot,
    logging: DebugLogging,
    hub: H,
    sink: S,
}

impl<H: ShadeHub, S: EventSink> ShadeDevice<H, S> {
    pub fn new(id: ShadeId, config: ShadeConfig, hub: H, sink: S) -> Self {
        let logging = DebugLogging::new(config.logging_enabled, config.logging_timeout, Instant::now());
        Self {
            id,
            config,
            snapshot: ShadeSnapshot::new(),
            logging,
            hub,
            sink,
        }
    }

    /// Restore a snapshot persisted by the host
    pub fn with_snapshot(mut self, snapshot: ShadeSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn id(&self) -> ShadeId {
        self.id
    }

    pub fn config(&self) -> &ShadeConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &ShadeSnapshot {
        &self.snapshot
    }

    /// Apply saved preferences; re-arms the debug logging timeout
    pub fn updated(&mut self, config: ShadeConfig) {
        info!("Shade {}: preferences updated", self.id);
        self.logging
            .rearm(config.logging_enabled, config.logging_timeout, Instant::now());
        self.config = config;
    }

    fn debug_enabled(&mut self) -> bool {
        self.logging.is_active(Instant::now())
    }

    // =========================================================================
    // Telemetry
    // =========================================================================

    pub fn handle_telemetry(&mut self, telemetry: &ShadeTelemetry) -> ShadeResult<Vec<ShadeEvent>> {
        self.handle_telemetry_at(telemetry, SystemTime::now())
    }

    /// Decode and apply a raw hub report
    pub fn handle_telemetry_json(&mut self, json: &str) -> ShadeResult<Vec<ShadeEvent>> {
        let telemetry = ShadeTelemetry::from_json(json)?;
        self.handle_telemetry(&telemetry)
    }

    /// Apply a telemetry report as of `now`, emitting the derived attributes.
    ///
    /// Reports addressed to a different shade are ignored. If the forced poll
    /// cannot be handed to the hub, the retry is not recorded and the events
    /// already emitted come back inside [`ShadeError::RepollFailed`].
    pub fn handle_telemetry_at(
        &mut self,
        telemetry: &ShadeTelemetry,
        now: SystemTime,
    ) -> ShadeResult<Vec<ShadeEvent>> {
        if let Some(other) = telemetry.id.filter(|id| *id != self.id) {
            warn!("Shade {}: ignoring telemetry addressed to shade {}", self.id, other);
            return Ok(Vec::new());
        }

        let previous_retry = self.snapshot.last_poll_retry_at;
        let outcome = normalize(&mut self.snapshot, telemetry, now, self.config.poll_retry_window);
        let trace = self.debug_enabled();

        for event in &outcome.events {
            if trace {
                debug!("Shade {}: {}", self.id, event);
            }
            self.sink.send_event(*event);
        }

        if outcome.repoll {
            info!("Shade {}: telemetry had no positions, requesting forced poll", self.id);
            if let Err(e) = self.hub.poll_shade(self.id, true) {
                warn!("Shade {}: forced poll failed: {}", self.id, e);
                self.snapshot.last_poll_retry_at = previous_retry;
                return Err(ShadeError::RepollFailed {
                    events: outcome.events,
                    source: Box::new(e),
                });
            }
        } else if trace && telemetry.usable_positions().is_none() {
            debug!("Shade {}: telemetry had no positions, poll retry suppressed", self.id);
        }

        Ok(outcome.events)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Route a command through the hub
    pub fn execute(&mut self, command: ShadeCommand) -> ShadeResult<()> {
        let action = route(
            command,
            self.snapshot.capabilities,
            self.config.open_top_by_default,
        );
        if self.debug_enabled() {
            debug!("Shade {}: {} -> {:?}", self.id, command, action);
        }

        let result = match action {
            HubAction::SetPosition(request) => self.hub.set_position(self.id, request),
            HubAction::Poll { force } => self.hub.poll_shade(self.id, force),
            HubAction::Calibrate => self.hub.calibrate_shade(self.id),
            HubAction::Jog => self.hub.jog_shade(self.id),
            HubAction::Ignored => {
                warn!("Shade {}: {} is not supported", self.id, command);
                Ok(())
            }
        };

        result.inspect_err(|e| warn!("Shade {}: {} failed: {}", self.id, command, e))
    }

    pub fn open(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Open)
    }

    pub fn close(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Close)
    }

    pub fn set_position(&mut self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetPosition(position))
    }

    pub fn set_level(&mut self, level: i32) -> ShadeResult<()> {
        self.set_position(level)
    }

    pub fn set_bottom_position(&mut self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetBottomPosition(position))
    }

    pub fn set_top_position(&mut self, position: i32) -> ShadeResult<()> {
        self.execute(ShadeCommand::SetTopPosition(position))
    }

    pub fn preset_position(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::PresetPosition)
    }

    pub fn calibrate(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Calibrate)
    }

    pub fn jog(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Jog)
    }

    /// Force a physical re-poll of the shade
    pub fn refresh(&mut self) -> ShadeResult<()> {
        self.execute(ShadeCommand::Refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{ChannelHub, HubRequest, PositionRequest};
    use crate::state::{ShadeCapabilities, WindowShadeState};
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    type TestDevice = ShadeDevice<ChannelHub, broadcast::Sender<ShadeEvent>>;

    fn device(config: ShadeConfig) -> (TestDevice, mpsc::UnboundedReceiver<HubRequest>, broadcast::Receiver<ShadeEvent>) {
        let (hub, hub_rx) = ChannelHub::new();
        let (events_tx, events_rx) = broadcast::channel(32);
        (ShadeDevice::new(ShadeId(5), config, hub, events_tx), hub_rx, events_rx)
    }

    fn set_position(request: PositionRequest) -> HubRequest {
        HubRequest::SetPosition { shade: ShadeId(5), request }
    }

    #[test]
    fn test_telemetry_emits_events_to_sink() {
        let (mut shade, _hub_rx, mut events) = device(ShadeConfig::default());
        let emitted = shade
            .handle_telemetry_json(r#"{"shade": {"id": 5, "positions": {"posKind1": 1, "position1": 0}, "capabilities": 0}}"#)
            .unwrap();

        assert_eq!(emitted.len(), 3);
        assert_eq!(events.try_recv().unwrap(), ShadeEvent::BottomPosition(0));
        assert_eq!(events.try_recv().unwrap(), ShadeEvent::Level(0));
        assert_eq!(
            events.try_recv().unwrap(),
            ShadeEvent::WindowShadeState(WindowShadeState::Closed)
        );
        assert_eq!(shade.snapshot().capabilities, Some(ShadeCapabilities::Standard));
    }

    #[test]
    fn test_missing_positions_polls_once_per_window() {
        let (mut shade, mut hub_rx, _events) = device(ShadeConfig::default());
        let telemetry = ShadeTelemetry::default();
        let start = SystemTime::now();

        shade.handle_telemetry_at(&telemetry, start).unwrap();
        shade
            .handle_telemetry_at(&telemetry, start + Duration::from_secs(120))
            .unwrap();

        assert_eq!(
            hub_rx.try_recv().unwrap(),
            HubRequest::Poll { shade: ShadeId(5), force: true }
        );
        assert!(hub_rx.try_recv().is_err());
    }

    #[test]
    fn test_telemetry_for_other_shade_ignored() {
        let (mut shade, mut hub_rx, _events) = device(ShadeConfig::default());
        let telemetry = ShadeTelemetry {
            id: Some(ShadeId(6)),
            capabilities: Some(ShadeCapabilities::TopDown),
            ..Default::default()
        };
        assert!(shade.handle_telemetry(&telemetry).unwrap().is_empty());
        assert_eq!(shade.snapshot().capabilities, None);
        assert!(hub_rx.try_recv().is_err());
    }

    #[test]
    fn test_open_close_follow_reported_capabilities() {
        let (mut shade, mut hub_rx, _events) = device(ShadeConfig::default());

        shade.open().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::rails(100, 0)));

        shade.handle_telemetry_json(r#"{"capabilities": 6}"#).unwrap();
        let _poll = hub_rx.try_recv().unwrap();

        shade.open().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::unified(0)));
        shade.close().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::unified(100)));
    }

    #[test]
    fn test_open_top_by_default_preference() {
        let (mut shade, mut hub_rx, _events) = device(ShadeConfig::default());
        shade.updated(ShadeConfig::default().with_open_top_by_default(true));

        shade.open().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::rails(0, 100)));
        shade.close().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::rails(0, 0)));
    }

    #[test]
    fn test_positions_and_maintenance() {
        let (mut shade, mut hub_rx, _events) = device(ShadeConfig::default().with_logging(false));

        shade.set_level(250).unwrap();
        shade.set_bottom_position(-5).unwrap();
        shade.set_top_position(42).unwrap();
        shade.preset_position().unwrap();
        shade.calibrate().unwrap();
        shade.jog().unwrap();
        shade.refresh().unwrap();

        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::unified(100)));
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::bottom(0)));
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::top(42)));
        assert_eq!(hub_rx.try_recv().unwrap(), HubRequest::Calibrate { shade: ShadeId(5) });
        assert_eq!(hub_rx.try_recv().unwrap(), HubRequest::Jog { shade: ShadeId(5) });
        assert_eq!(
            hub_rx.try_recv().unwrap(),
            HubRequest::Poll { shade: ShadeId(5), force: true }
        );
        assert!(hub_rx.try_recv().is_err());
    }

    #[test]
    fn test_hub_failure_is_reported() {
        let (mut shade, hub_rx, _events) = device(ShadeConfig::default());
        drop(hub_rx);
        assert!(matches!(shade.open(), Err(ShadeError::HubUnavailable(_))));
        match shade.handle_telemetry(&ShadeTelemetry::default()) {
            Err(ShadeError::RepollFailed { events, source }) => {
                assert!(events.is_empty());
                assert!(matches!(*source, ShadeError::HubUnavailable(_)));
            }
            other => panic!("expected RepollFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_rejected_repoll_keeps_events_and_retry_budget() {
        let (mut shade, hub_rx, mut events) = device(ShadeConfig::default());
        drop(hub_rx);
        let telemetry = ShadeTelemetry::from_json(r#"{"id": 5, "batteryStrength": 255}"#).unwrap();
        let start = SystemTime::now();

        let err = shade.handle_telemetry_at(&telemetry, start).unwrap_err();
        assert_eq!(err.emitted_events(), &[ShadeEvent::Battery(100)]);
        assert_eq!(events.try_recv().unwrap(), ShadeEvent::Battery(100));
        assert_eq!(shade.snapshot().last_poll_retry_at, None);

        // The next gap report retries right away instead of waiting out the window
        assert!(matches!(
            shade.handle_telemetry_at(&telemetry, start + Duration::from_secs(1)),
            Err(ShadeError::RepollFailed { .. })
        ));
    }

    #[test]
    fn test_rejected_repoll_restores_earlier_retry() {
        let (shade, hub_rx, _events) = device(ShadeConfig::default());
        let earlier = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut shade = shade.with_snapshot(ShadeSnapshot {
            last_poll_retry_at: Some(earlier),
            ..Default::default()
        });
        drop(hub_rx);

        let later = earlier + Duration::from_secs(3600);
        assert!(shade.handle_telemetry_at(&ShadeTelemetry::default(), later).is_err());
        assert_eq!(shade.snapshot().last_poll_retry_at, Some(earlier));
    }

    #[test]
    fn test_restored_snapshot_drives_routing() {
        let (shade, mut hub_rx, _events) = device(ShadeConfig::default());
        let mut shade = shade.with_snapshot(ShadeSnapshot {
            capabilities: Some(ShadeCapabilities::Standard),
            ..Default::default()
        });
        shade.close().unwrap();
        assert_eq!(hub_rx.try_recv().unwrap(), set_position(PositionRequest::unified(0)));
    }
}
