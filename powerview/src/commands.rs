//! Command routing
//!
//! Translates high-level shade intents into hub requests. Open and close
//! depend on the rail configuration last reported by the shade; explicit
//! positions are clamped and passed through unchanged.

use crate::hub::PositionRequest;
use crate::state::ShadeCapabilities;
use serde::Deserialize;

/// High-level command intents accepted from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShadeCommand {
    Open,
    Close,
    #[serde(alias = "setLevel")]
    SetPosition(i32),
    SetBottomPosition(i32),
    SetTopPosition(i32),
    PresetPosition,
    Calibrate,
    Jog,
    Refresh,
}

impl ShadeCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadeCommand::Open => "open",
            ShadeCommand::Close => "close",
            ShadeCommand::SetPosition(_) => "setPosition",
            ShadeCommand::SetBottomPosition(_) => "setBottomPosition",
            ShadeCommand::SetTopPosition(_) => "setTopPosition",
            ShadeCommand::PresetPosition => "presetPosition",
            ShadeCommand::Calibrate => "calibrate",
            ShadeCommand::Jog => "jog",
            ShadeCommand::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for ShadeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShadeCommand::SetPosition(v)
            | ShadeCommand::SetBottomPosition(v)
            | ShadeCommand::SetTopPosition(v) => write!(f, "{}({})", self.as_str(), v),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// What the hub should be asked to do for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubAction {
    SetPosition(PositionRequest),
    Poll { force: bool },
    Calibrate,
    Jog,
    /// Accepted but not implemented by this adapter
    Ignored,
}

/// Clamp a requested position into `[0,100]`
pub fn clamp_percent(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

/// Request that fully opens the shade
pub fn open_request(capabilities: Option<ShadeCapabilities>, open_top_by_default: bool) -> PositionRequest {
    match capabilities {
        Some(ShadeCapabilities::Standard) => PositionRequest::unified(100),
        Some(ShadeCapabilities::TopDown) => PositionRequest::unified(0),
        _ if open_top_by_default => PositionRequest::rails(0, 100),
        _ => PositionRequest::rails(100, 0),
    }
}

/// Request that fully closes the shade
pub fn close_request(capabilities: Option<ShadeCapabilities>) -> PositionRequest {
    match capabilities {
        Some(ShadeCapabilities::Standard) => PositionRequest::unified(0),
        Some(ShadeCapabilities::TopDown) => PositionRequest::unified(100),
        _ => PositionRequest::rails(0, 0),
    }
}

/// Route a command to the hub action it resolves to
pub fn route(
    command: ShadeCommand,
    capabilities: Option<ShadeCapabilities>,
    open_top_by_default: bool,
) -> HubAction {
    match command {
        ShadeCommand::Open => HubAction::SetPosition(open_request(capabilities, open_top_by_default)),
        ShadeCommand::Close => HubAction::SetPosition(close_request(capabilities)),
        ShadeCommand::SetPosition(v) => HubAction::SetPosition(PositionRequest::unified(clamp_percent(v))),
        ShadeCommand::SetBottomPosition(v) => HubAction::SetPosition(PositionRequest::bottom(clamp_percent(v))),
        ShadeCommand::SetTopPosition(v) => HubAction::SetPosition(PositionRequest::top(clamp_percent(v))),
        ShadeCommand::PresetPosition => HubAction::Ignored,
        ShadeCommand::Calibrate => HubAction::Calibrate,
        ShadeCommand::Jog => HubAction::Jog,
        ShadeCommand::Refresh => HubAction::Poll { force: true },
    }
}
