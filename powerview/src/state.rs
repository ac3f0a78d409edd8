//! Per-shade persisted state
//!
//! The snapshot is the only state the adapter keeps between calls. It is
//! written by the telemetry normalizer and read by the command router; the
//! host platform persists it as an opaque record.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Hub-assigned shade identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShadeId(pub u32);

impl std::fmt::Display for ShadeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical rail configuration reported by the shade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum ShadeCapabilities {
    /// Single bottom-up rail
    Standard,
    /// Single top-down rail
    TopDown,
    /// Independent top and bottom rails
    TopDownBottomUp,
    /// Any tag this adapter does not know; routed like a dual-rail shade
    Other(u32),
}

impl From<u32> for ShadeCapabilities {
    fn from(value: u32) -> Self {
        match value {
            0 => ShadeCapabilities::Standard,
            6 => ShadeCapabilities::TopDown,
            7 => ShadeCapabilities::TopDownBottomUp,
            other => ShadeCapabilities::Other(other),
        }
    }
}

impl From<ShadeCapabilities> for u32 {
    fn from(value: ShadeCapabilities) -> Self {
        match value {
            ShadeCapabilities::Standard => 0,
            ShadeCapabilities::TopDown => 6,
            ShadeCapabilities::TopDownBottomUp => 7,
            ShadeCapabilities::Other(other) => other,
        }
    }
}

impl std::fmt::Display for ShadeCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShadeCapabilities::Standard => write!(f, "Standard"),
            ShadeCapabilities::TopDown => write!(f, "Top-Down"),
            ShadeCapabilities::TopDownBottomUp => write!(f, "Top-Down/Bottom-Up"),
            ShadeCapabilities::Other(tag) => write!(f, "Unknown ({})", tag),
        }
    }
}

/// Battery status as reported by the hub, kept verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum BatteryStatus {
    #[default]
    Unknown = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    PluggedIn = 4,
}

impl From<u32> for BatteryStatus {
    fn from(value: u32) -> Self {
        match value {
            1 => BatteryStatus::Low,
            2 => BatteryStatus::Medium,
            3 => BatteryStatus::High,
            4 => BatteryStatus::PluggedIn,
            _ => BatteryStatus::Unknown,
        }
    }
}

impl From<BatteryStatus> for u32 {
    fn from(value: BatteryStatus) -> Self {
        value as u32
    }
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryStatus::Unknown => write!(f, "Unknown"),
            BatteryStatus::Low => write!(f, "Low"),
            BatteryStatus::Medium => write!(f, "Medium"),
            BatteryStatus::High => write!(f, "High"),
            BatteryStatus::PluggedIn => write!(f, "Plugged In"),
        }
    }
}

/// Tri-state shade classification derived from a normalized position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowShadeState {
    Open,
    PartiallyOpen,
    Closed,
}

impl WindowShadeState {
    /// Classify a normalized `[0,100]` position
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0 => WindowShadeState::Closed,
            99..=u8::MAX => WindowShadeState::Open,
            _ => WindowShadeState::PartiallyOpen,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowShadeState::Open => "open",
            WindowShadeState::PartiallyOpen => "partiallyOpen",
            WindowShadeState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for WindowShadeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Most recent per-shade state needed between calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadeSnapshot {
    /// Absent until the first telemetry event reports it
    pub capabilities: Option<ShadeCapabilities>,
    /// Opaque hub shade type, retained for downstream consumers
    pub shade_type: Option<u32>,
    pub battery_status: Option<BatteryStatus>,
    pub last_poll_retry_at: Option<SystemTime>,
}

impl ShadeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a forced re-poll may be issued at `now`.
    ///
    /// A retry is allowed when none was recorded, when strictly more than
    /// `window` has elapsed since the recorded one, or when the wall clock
    /// moved backwards past the recorded retry.
    pub fn poll_retry_due(&self, now: SystemTime, window: Duration) -> bool {
        match self.last_poll_retry_at {
            None => true,
            Some(last) => match now.duration_since(last) {
                Ok(elapsed) => elapsed > window,
                Err(_) => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_tag() {
        assert_eq!(ShadeCapabilities::from(0), ShadeCapabilities::Standard);
        assert_eq!(ShadeCapabilities::from(6), ShadeCapabilities::TopDown);
        assert_eq!(ShadeCapabilities::from(7), ShadeCapabilities::TopDownBottomUp);
        assert_eq!(ShadeCapabilities::from(3), ShadeCapabilities::Other(3));
        assert_eq!(u32::from(ShadeCapabilities::Other(9)), 9);
        assert_eq!(ShadeCapabilities::from(300), ShadeCapabilities::Other(300));
    }

    #[test]
    fn test_battery_status_unknown_fallback() {
        assert_eq!(BatteryStatus::from(4), BatteryStatus::PluggedIn);
        assert_eq!(BatteryStatus::from(17), BatteryStatus::Unknown);
    }

    #[test]
    fn test_window_shade_state_thresholds() {
        assert_eq!(WindowShadeState::from_percent(0), WindowShadeState::Closed);
        assert_eq!(WindowShadeState::from_percent(1), WindowShadeState::PartiallyOpen);
        assert_eq!(WindowShadeState::from_percent(98), WindowShadeState::PartiallyOpen);
        assert_eq!(WindowShadeState::from_percent(99), WindowShadeState::Open);
        assert_eq!(WindowShadeState::from_percent(100), WindowShadeState::Open);
    }

    #[test]
    fn test_poll_retry_window() {
        let window = Duration::from_secs(600);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut snapshot = ShadeSnapshot::new();
        assert!(snapshot.poll_retry_due(start, window));

        snapshot.last_poll_retry_at = Some(start);
        assert!(!snapshot.poll_retry_due(start + Duration::from_secs(60), window));
        assert!(!snapshot.poll_retry_due(start + window, window));
        assert!(snapshot.poll_retry_due(start + window + Duration::from_secs(1), window));
    }

    #[test]
    fn test_poll_retry_after_clock_went_backwards() {
        let window = Duration::from_secs(600);
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let snapshot = ShadeSnapshot {
            last_poll_retry_at: Some(start),
            ..Default::default()
        };
        assert!(snapshot.poll_retry_due(start - Duration::from_secs(30), window));
    }

    #[test]
    fn test_snapshot_serializes_tags_as_integers() {
        let snapshot = ShadeSnapshot {
            capabilities: Some(ShadeCapabilities::TopDown),
            shade_type: Some(8),
            battery_status: Some(BatteryStatus::High),
            last_poll_retry_at: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["capabilities"], 6);
        assert_eq!(json["batteryStatus"], 3);
        assert_eq!(json["shadeType"], 8);

        let back: ShadeSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
