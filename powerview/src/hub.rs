//! Parent hub interface
//!
//! The hub integration owns the network connection to the physical shade
//! controller. From the adapter's side every hub operation is fire-and-forget:
//! a successful return only means the request was handed over.

use crate::error::{ShadeError, ShadeResult};
use crate::state::ShadeId;
use serde::Serialize;
use tokio::sync::mpsc;

/// Fields of one set-position request; absent fields are left untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_position: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_position: Option<u8>,
}

impl PositionRequest {
    /// Single-rail position
    pub fn unified(position: u8) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn bottom(position: u8) -> Self {
        Self {
            bottom_position: Some(position),
            ..Default::default()
        }
    }

    pub fn top(position: u8) -> Self {
        Self {
            top_position: Some(position),
            ..Default::default()
        }
    }

    /// Both rails of a top-down/bottom-up shade
    pub fn rails(bottom: u8, top: u8) -> Self {
        Self {
            position: None,
            bottom_position: Some(bottom),
            top_position: Some(top),
        }
    }
}

/// Operations the adapter consumes from the parent hub integration
pub trait ShadeHub: Send + Sync {
    /// Request fresh telemetry; the result arrives later as telemetry
    fn poll_shade(&self, shade: ShadeId, force_refresh: bool) -> ShadeResult<()>;

    fn set_position(&self, shade: ShadeId, request: PositionRequest) -> ShadeResult<()>;

    fn calibrate_shade(&self, shade: ShadeId) -> ShadeResult<()>;

    fn jog_shade(&self, shade: ShadeId) -> ShadeResult<()>;
}

/// A request handed to the hub integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum HubRequest {
    Poll {
        shade: ShadeId,
        force: bool,
    },
    SetPosition {
        shade: ShadeId,
        #[serde(flatten)]
        request: PositionRequest,
    },
    Calibrate {
        shade: ShadeId,
    },
    Jog {
        shade: ShadeId,
    },
}

impl HubRequest {
    pub fn shade(&self) -> ShadeId {
        match self {
            HubRequest::Poll { shade, .. }
            | HubRequest::SetPosition { shade, .. }
            | HubRequest::Calibrate { shade }
            | HubRequest::Jog { shade } => *shade,
        }
    }
}

/// Hub implementation that queues requests for the task driving the real hub
#[derive(Debug, Clone)]
pub struct ChannelHub {
    sender: mpsc::UnboundedSender<HubRequest>,
}

impl ChannelHub {
    /// Create a hub and the receiver its requests are delivered to
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HubRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn submit(&self, request: HubRequest) -> ShadeResult<()> {
        self.sender
            .send(request)
            .map_err(|e| ShadeError::HubUnavailable(format!("hub request queue closed: {:?}", e.0)))
    }
}

impl ShadeHub for ChannelHub {
    fn poll_shade(&self, shade: ShadeId, force_refresh: bool) -> ShadeResult<()> {
        self.submit(HubRequest::Poll {
            shade,
            force: force_refresh,
        })
    }

    fn set_position(&self, shade: ShadeId, request: PositionRequest) -> ShadeResult<()> {
        self.submit(HubRequest::SetPosition { shade, request })
    }

    fn calibrate_shade(&self, shade: ShadeId) -> ShadeResult<()> {
        self.submit(HubRequest::Calibrate { shade })
    }

    fn jog_shade(&self, shade: ShadeId) -> ShadeResult<()> {
        self.submit(HubRequest::Jog { shade })
    }
}
