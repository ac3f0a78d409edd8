//! Per-device debug logging that switches itself off

use std::time::{Duration, Instant};
use tracing::info;

/// Debug-trace gate for one shade
#[derive(Debug, Clone)]
pub struct DebugLogging {
    enabled: bool,
    expires_at: Option<Instant>,
}

impl DebugLogging {
    pub fn new(enabled: bool, timeout: Duration, now: Instant) -> Self {
        Self {
            enabled,
            expires_at: enabled.then(|| now + timeout),
        }
    }

    /// Re-apply the preference, restarting the timeout when enabled
    pub fn rearm(&mut self, enabled: bool, timeout: Duration, now: Instant) {
        *self = Self::new(enabled, timeout, now);
    }

    /// Whether debug traces should be written at `now`; lapses once
    pub fn is_active(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        match self.expires_at {
            Some(deadline) if now >= deadline => {
                self.enabled = false;
                self.expires_at = None;
                info!("Debug logging disabled after timeout");
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_stays_disabled() {
        let now = Instant::now();
        let mut logging = DebugLogging::new(false, Duration::from_secs(60), now);
        assert!(!logging.is_active(now));
    }

    #[test]
    fn test_lapses_after_timeout() {
        let now = Instant::now();
        let mut logging = DebugLogging::new(true, Duration::from_secs(60), now);
        assert!(logging.is_active(now + Duration::from_secs(59)));
        assert!(!logging.is_active(now + Duration::from_secs(60)));
        assert!(!logging.is_active(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_rearm_restarts_timeout() {
        let now = Instant::now();
        let mut logging = DebugLogging::new(true, Duration::from_secs(60), now);
        assert!(!logging.is_active(now + Duration::from_secs(120)));

        let later = now + Duration::from_secs(120);
        logging.rearm(true, Duration::from_secs(60), later);
        assert!(logging.is_active(later + Duration::from_secs(30)));
    }
}
