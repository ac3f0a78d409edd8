//! Registry of running shade workers, keyed by hub shade id

use crate::error::{ShadeError, ShadeResult};
use crate::events::ShadeEvent;
use crate::state::ShadeId;
use crate::telemetry::ShadeTelemetry;
use crate::worker::ShadeHandle;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// All shades known to one hub integration
#[derive(Debug, Default)]
pub struct ShadeRegistry {
    shades: RwLock<HashMap<ShadeId, ShadeHandle>>,
}

impl ShadeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shade, replacing any previous worker for the same id
    pub async fn register(&self, handle: ShadeHandle) {
        let id = handle.id();
        let mut shades = self.shades.write().await;
        if shades.insert(id, handle).is_some() {
            debug!("Shade {}: replaced existing registration", id);
        }
    }

    pub async fn remove(&self, id: ShadeId) -> Option<ShadeHandle> {
        let mut shades = self.shades.write().await;
        shades.remove(&id)
    }

    pub async fn get(&self, id: ShadeId) -> Option<ShadeHandle> {
        let shades = self.shades.read().await;
        shades.get(&id).cloned()
    }

    pub async fn ids(&self) -> Vec<ShadeId> {
        let shades = self.shades.read().await;
        let mut ids: Vec<ShadeId> = shades.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Deliver a telemetry report to the shade named by its `id`
    pub async fn route_telemetry(&self, telemetry: ShadeTelemetry) -> ShadeResult<Vec<ShadeEvent>> {
        let id = telemetry.id.ok_or(ShadeError::MissingShadeId)?;
        let handle = self.get(id).await.ok_or(ShadeError::UnknownShade(id))?;
        handle.handle_telemetry(telemetry).await
    }

    /// Decode a hub report and route it
    pub async fn route_telemetry_json(&self, json: &str) -> ShadeResult<Vec<ShadeEvent>> {
        self.route_telemetry(ShadeTelemetry::from_json(json)?).await
    }

    /// Force a re-poll of every registered shade, returning the ones that failed
    pub async fn refresh_all(&self) -> Vec<(ShadeId, ShadeError)> {
        let handles: Vec<ShadeHandle> = {
            let shades = self.shades.read().await;
            shades.values().cloned().collect()
        };

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(e) = handle.refresh().await {
                warn!("Shade {}: refresh failed: {}", handle.id(), e);
                failures.push((handle.id(), e));
            }
        }
        failures
    }
}
