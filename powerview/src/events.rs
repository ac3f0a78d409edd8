//! Normalized attribute events emitted to the host platform

use crate::state::WindowShadeState;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default attribute event buffer per shade
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// One attribute update for the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name", content = "value", rename_all = "camelCase")]
pub enum ShadeEvent {
    BottomPosition(u8),
    TopPosition(u8),
    Level(u8),
    WindowShadeState(WindowShadeState),
    Battery(u8),
}

impl ShadeEvent {
    /// Attribute name as exposed to the host
    pub fn name(&self) -> &'static str {
        match self {
            ShadeEvent::BottomPosition(_) => "bottomPosition",
            ShadeEvent::TopPosition(_) => "topPosition",
            ShadeEvent::Level(_) => "level",
            ShadeEvent::WindowShadeState(_) => "windowShadeState",
            ShadeEvent::Battery(_) => "battery",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            ShadeEvent::Battery(_) => Some("%"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShadeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = self.unit().unwrap_or("");
        match self {
            ShadeEvent::BottomPosition(v)
            | ShadeEvent::TopPosition(v)
            | ShadeEvent::Level(v)
            | ShadeEvent::Battery(v) => write!(f, "{} = {}{}", self.name(), v, unit),
            ShadeEvent::WindowShadeState(state) => write!(f, "{} = {}", self.name(), state),
        }
    }
}

/// Receiver of attribute events (the host's `sendEvent`)
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: ShadeEvent);
}

impl EventSink for broadcast::Sender<ShadeEvent> {
    fn send_event(&self, event: ShadeEvent) {
        // No subscribers is not an error for the host bus
        let _ = self.send(event);
    }
}

/// Latest value of every attribute, folded from emitted events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadeAttributes {
    pub bottom_position: Option<u8>,
    pub top_position: Option<u8>,
    pub level: Option<u8>,
    pub window_shade_state: Option<WindowShadeState>,
    pub battery: Option<u8>,
}

impl ShadeAttributes {
    pub fn apply(&mut self, event: &ShadeEvent) {
        match *event {
            ShadeEvent::BottomPosition(v) => self.bottom_position = Some(v),
            ShadeEvent::TopPosition(v) => self.top_position = Some(v),
            ShadeEvent::Level(v) => self.level = Some(v),
            ShadeEvent::WindowShadeState(state) => self.window_shade_state = Some(state),
            ShadeEvent::Battery(v) => self.battery = Some(v),
        }
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a ShadeEvent>) {
        for event in events {
            self.apply(event);
        }
    }
}
