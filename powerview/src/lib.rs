//! PowerView Shade Adapter
//!
//! Translates between a hub integration that talks to motorized window
//! shades and a home-automation platform's shade abstraction.
//!
//! ## Features
//!
//! - Raw hub positions normalized into bottom/top/level percentages
//! - Open/partially-open/closed classification from the latest position
//! - Battery strength normalized per battery kind
//! - Rate-limited forced re-poll when a report carries no positions
//! - Open/close routing for standard, top-down and top-down/bottom-up rails
//! - Per-shade worker tasks and a registry for driving many shades at once

mod commands;
mod config;
mod device;
mod error;
mod events;
mod hub;
mod logging;
mod registry;
mod state;
mod telemetry;
mod worker;

pub use commands::{clamp_percent, close_request, open_request, route, HubAction, ShadeCommand};
pub use config::{ShadeConfig, DEFAULT_LOGGING_TIMEOUT, DEFAULT_POLL_RETRY_WINDOW, DEFAULT_REPLY_TIMEOUT};
pub use device::ShadeDevice;
pub use error::{ShadeError, ShadeResult};
pub use events::{EventSink, ShadeAttributes, ShadeEvent, DEFAULT_EVENT_BUFFER_SIZE};
pub use hub::{ChannelHub, HubRequest, PositionRequest, ShadeHub};
pub use logging::DebugLogging;
pub use registry::ShadeRegistry;
pub use state::{BatteryStatus, ShadeCapabilities, ShadeId, ShadeSnapshot, WindowShadeState};
pub use telemetry::{
    battery_percent, normalize, raw_to_percent, BatteryKind, PositionKind, ShadePositions,
    ShadeTelemetry, TelemetryOutcome, DEFAULT_STRENGTH_CEILING, RAW_POSITION_MAX,
    RECHARGEABLE_STRENGTH_CEILING,
};
pub use worker::{spawn_shade, ShadeHandle};
