//! Telemetry decoding and normalization
//!
//! Hub telemetry is decoded once into [`ShadeTelemetry`] and then folded into
//! the shade snapshot by [`normalize`], which yields the attribute events to
//! emit and whether a forced re-poll is due.

use crate::error::{ShadeError, ShadeResult};
use crate::events::ShadeEvent;
use crate::state::{BatteryStatus, ShadeCapabilities, ShadeId, ShadeSnapshot, WindowShadeState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Full-scale raw position reported by the hub
pub const RAW_POSITION_MAX: u32 = 65535;

/// Battery strength ceiling for rechargeable wands, which plateau early
pub const RECHARGEABLE_STRENGTH_CEILING: u32 = 170;

/// Battery strength ceiling for every other battery kind
pub const DEFAULT_STRENGTH_CEILING: u32 = 255;

/// Which rail a position slot describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKind {
    Bottom,
    Top,
}

impl PositionKind {
    /// Tag 1 is the bottom rail; every other tag is the top rail
    pub fn from_tag(tag: u32) -> Self {
        if tag == 1 {
            PositionKind::Bottom
        } else {
            PositionKind::Top
        }
    }
}

/// Power source reported alongside battery strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub enum BatteryKind {
    HardWired,
    BatteryWand,
    Rechargeable,
    Other(u32),
}

impl From<u32> for BatteryKind {
    fn from(value: u32) -> Self {
        match value {
            1 => BatteryKind::HardWired,
            2 => BatteryKind::BatteryWand,
            3 => BatteryKind::Rechargeable,
            other => BatteryKind::Other(other),
        }
    }
}

impl BatteryKind {
    pub fn strength_ceiling(&self) -> u32 {
        match self {
            BatteryKind::Rechargeable => RECHARGEABLE_STRENGTH_CEILING,
            _ => DEFAULT_STRENGTH_CEILING,
        }
    }
}

/// Decode one optional field, treating a malformed value as absent
fn lenient_field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    let value = object.get(key).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!("Ignoring malformed telemetry field {}: {}", key, e);
            None
        }
    }
}

/// Raw position block; up to two tagged slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadePositions {
    pub pos_kind1: Option<u32>,
    pub position1: Option<u32>,
    pub pos_kind2: Option<u32>,
    pub position2: Option<u32>,
}

impl ShadePositions {
    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            pos_kind1: lenient_field(object, "posKind1"),
            position1: lenient_field(object, "position1"),
            pos_kind2: lenient_field(object, "posKind2"),
            position2: lenient_field(object, "position2"),
        }
    }

    /// Tagged slots in report order, skipping any without a kind or value
    pub fn slots(&self) -> impl Iterator<Item = (PositionKind, u32)> {
        [
            (self.pos_kind1, self.position1),
            (self.pos_kind2, self.position2),
        ]
        .into_iter()
        .filter_map(|(kind, raw)| Some((PositionKind::from_tag(kind?), raw?)))
    }

    pub fn has_slots(&self) -> bool {
        self.slots().next().is_some()
    }
}

/// One shade telemetry report from the hub.
///
/// Decoding is field by field: a malformed field is dropped on its own and
/// never takes the rest of the report down with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadeTelemetry {
    pub id: Option<ShadeId>,
    pub positions: Option<ShadePositions>,
    pub battery_strength: Option<u32>,
    pub battery_kind: Option<BatteryKind>,
    pub battery_status: Option<BatteryStatus>,
    pub shade_type: Option<u32>,
    pub capabilities: Option<ShadeCapabilities>,
}

impl ShadeTelemetry {
    /// Decode a hub report, either bare or wrapped as `{"shade": {...}}`
    pub fn from_json(json: &str) -> ShadeResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Decode an already-parsed hub report. Only a non-object document fails.
    pub fn from_value(value: &Value) -> ShadeResult<Self> {
        let document = value
            .as_object()
            .ok_or_else(|| ShadeError::Decode("telemetry must be a JSON object".to_string()))?;
        let shade = match document.get("shade") {
            Some(Value::Object(inner)) => inner,
            _ => document,
        };

        Ok(Self {
            id: lenient_field(shade, "id"),
            positions: shade
                .get("positions")
                .and_then(Value::as_object)
                .map(ShadePositions::from_object),
            battery_strength: lenient_field(shade, "batteryStrength"),
            battery_kind: lenient_field(shade, "batteryKind"),
            battery_status: lenient_field(shade, "batteryStatus"),
            shade_type: lenient_field(shade, "type"),
            capabilities: lenient_field(shade, "capabilities"),
        })
    }

    /// Position block with at least one usable slot
    pub fn usable_positions(&self) -> Option<&ShadePositions> {
        self.positions.as_ref().filter(|p| p.has_slots())
    }
}

impl<'de> Deserialize<'de> for ShadeTelemetry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Convert a raw hub position into a `[0,100]` percentage
pub fn raw_to_percent(raw: u32) -> u8 {
    let raw = raw.min(RAW_POSITION_MAX);
    (raw as f64 * 100.0 / RAW_POSITION_MAX as f64).round() as u8
}

/// Normalize battery strength into a `[0,100]` percentage
pub fn battery_percent(strength: u32, kind: Option<BatteryKind>) -> u8 {
    let ceiling = kind.map_or(DEFAULT_STRENGTH_CEILING, |k| k.strength_ceiling());
    (u64::from(strength) * 100 / u64::from(ceiling)).min(100) as u8
}

/// Outcome of folding one telemetry report into the snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryOutcome {
    pub events: Vec<ShadeEvent>,
    /// A forced physical re-poll should be requested
    pub repoll: bool,
}

/// Fold a telemetry report into `snapshot`.
///
/// Capability and battery metadata are captured unconditionally, even when
/// the report carries no usable positions.
pub fn normalize(
    snapshot: &mut ShadeSnapshot,
    telemetry: &ShadeTelemetry,
    now: SystemTime,
    retry_window: Duration,
) -> TelemetryOutcome {
    let mut outcome = TelemetryOutcome::default();

    match telemetry.usable_positions() {
        Some(positions) => {
            for (kind, raw) in positions.slots() {
                let percent = raw_to_percent(raw);
                outcome.events.push(match kind {
                    PositionKind::Bottom => ShadeEvent::BottomPosition(percent),
                    PositionKind::Top => ShadeEvent::TopPosition(percent),
                });
                outcome.events.push(ShadeEvent::Level(percent));
                outcome
                    .events
                    .push(ShadeEvent::WindowShadeState(WindowShadeState::from_percent(percent)));
            }
        }
        None => {
            if snapshot.poll_retry_due(now, retry_window) {
                snapshot.last_poll_retry_at = Some(now);
                outcome.repoll = true;
            }
        }
    }

    if let Some(strength) = telemetry.battery_strength {
        outcome
            .events
            .push(ShadeEvent::Battery(battery_percent(strength, telemetry.battery_kind)));
    }

    if let Some(status) = telemetry.battery_status {
        snapshot.battery_status = Some(status);
    }
    if let Some(shade_type) = telemetry.shade_type {
        snapshot.shade_type = Some(shade_type);
    }
    if let Some(capabilities) = telemetry.capabilities {
        snapshot.capabilities = Some(capabilities);
    }

    outcome
}
